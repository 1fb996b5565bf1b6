use super::{checks, Error};

pub struct Settings {
    /// Version of the rule set used to verify jars
    ///
    /// Nodes of the same network must agree on this, since it decides which checks run. Only
    /// [`Settings::new`] sets it, so a `Settings` always names an existing rule set.
    version: u32,

    /// Is the jar being installed while the node is initialized?
    ///
    /// The base library installed at start-up is trusted: it can live in `io.takamaka.code` and
    /// can use synchronization.
    pub during_initialization: bool,

    /// Skip every check and accept all classes of the jar
    pub skips_verification: bool,

    /// Can `@SelfCharged` methods be declared?
    pub allow_self_charged: bool,

    /// Maximum number of distinct states a stack provenance query visits before giving up
    ///
    /// Queries that give up are treated as failures by the checks that issue them, so lowering
    /// this only ever rejects more code.
    pub max_pusher_states: usize,
}

impl Settings {
    /// Default bound on stack provenance queries
    pub const DEFAULT_MAX_PUSHER_STATES: usize = 1000;

    /// Settings for the given rule set version, or an error if there is no such rule set
    pub fn new(version: u32) -> Result<Settings, Error> {
        if checks::rule_set(version).is_none() {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok(Settings {
            version,
            during_initialization: false,
            skips_verification: false,
            allow_self_charged: false,
            max_pusher_states: Self::DEFAULT_MAX_PUSHER_STATES,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}
