//! Static verifier for Takamaka smart-contract bytecode
//!
//! Classes of a jar are checked against the rules that make their execution on the blockchain
//! deterministic and safe: only white-listed library code may be called, storage classes can only
//! hold storable values, annotations must be used consistently, and so on. Verification is pure
//! and deterministic: the same jar, dependencies, and settings always produce the same ordered set
//! of errors.
//!
//! The crate is layered as follows:
//!
//!   - [`jvm`] parses class files and decodes method bodies
//!   - [`verification`] loads classes, resolves references, and runs the checks

pub mod jvm;
pub mod util;
pub mod verification;
