//! Verification of the classes of a jar
//!
//! A [`TakamakaClassLoader`] gives access to the jar under verification, its dependencies, and the
//! runtime library. [`VerifiedJar::verify`] then runs the [rule set](checks::RuleSet) selected by
//! the [`Settings`] on every class of the jar, and collects the problems found.

mod annotations;
mod bootstraps;
pub mod checks;
mod class_loader;
mod errors;
mod pushers;
mod resolver;
mod settings;
mod verified_class;
mod verified_jar;
mod whitelist;

pub use annotations::*;
pub use bootstraps::*;
pub use class_loader::*;
pub use errors::*;
pub use pushers::*;
pub use resolver::*;
pub use settings::*;
pub use verified_class::*;
pub use verified_jar::*;
pub use whitelist::*;
