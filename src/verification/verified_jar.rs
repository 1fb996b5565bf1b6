use super::{checks, Error, Settings, TakamakaClassLoader, VerificationError, VerifiedClass, WhiteListingWizard};
use std::collections::BTreeSet;

/// Outcome of the verification of a jar
///
/// Every class of the jar is kept, but only the accepted ones are meant to be instrumented and
/// installed. The errors of all classes are kept together, in their total order, so that the
/// same jar always reports the same problems in the same order.
pub struct VerifiedJar<'g> {
    classes: Vec<VerifiedClass<'g>>,
    errors: BTreeSet<VerificationError>,
    skipped: bool,
}

impl<'g> VerifiedJar<'g> {
    /// Verify the classes of the jar loaded by `loader`
    ///
    /// Only fatal conditions (an unknown type, a malformed class, an unsupported version) are
    /// returned as errors. Problems of the classes themselves end up in [`Self::errors`].
    pub fn verify(
        loader: &'g TakamakaClassLoader<'g>,
        settings: &Settings,
        wizard: &dyn WhiteListingWizard,
    ) -> Result<VerifiedJar<'g>, Error> {
        let rules = checks::rule_set(settings.version())
            .ok_or(Error::UnsupportedVersion(settings.version()))?;
        log::debug!("verifying with rule set version {}", rules.version);

        let mut classes = Vec::with_capacity(loader.package_classes().len());
        let mut errors = BTreeSet::new();

        for &decl in loader.package_classes() {
            let mut class = VerifiedClass::new(loader, decl, settings.max_pusher_states)?;
            if settings.skips_verification {
                class.accepted = true;
            } else {
                log::debug!("verifying {}", decl.name);
                let found = checks::run(rules, &class, settings, wizard)
                    .map_err(|error| error.in_entry(&decl.entry))?;
                class.accepted = found.is_empty();
                errors.extend(found);
            }
            classes.push(class);
        }

        let jar = VerifiedJar {
            classes,
            errors,
            skipped: settings.skips_verification,
        };
        if jar.skipped {
            log::info!("skipped verification of {} classes", jar.classes.len());
        } else {
            log::info!(
                "verified {} classes: {} accepted, {} errors",
                jar.classes.len(),
                jar.classes().count(),
                jar.errors.len()
            );
        }
        Ok(jar)
    }

    /// Classes that passed every check, sorted by name
    pub fn classes(&self) -> impl Iterator<Item = &VerifiedClass<'g>> {
        self.classes.iter().filter(|class| class.is_accepted())
    }

    /// Every class of the jar, accepted or not, sorted by name
    pub fn all_classes(&self) -> &[VerifiedClass<'g>] {
        &self.classes
    }

    /// Problems found, in their total order
    pub fn errors(&self) -> impl Iterator<Item = &VerificationError> {
        self.errors.iter()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&VerificationError> {
        self.errors.iter().next()
    }

    /// Was verification skipped (accepting every class)?
    pub fn skipped(&self) -> bool {
        self.skipped
    }
}
