use crate::jvm;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Conditions that abort the verification of a whole jar
#[derive(Debug)]
pub enum Error {
    /// A type is referenced but neither the jar, its dependencies, nor the library define it
    UnknownType(String),

    /// An entry of a jar could not be parsed as a class file
    MalformedClass { entry: String, error: jvm::Error },

    /// No rule set exists for this verification version
    UnsupportedVersion(u32),

    /// Two entries of the jar under verification define the same class
    DuplicateClass(String),
}

impl Error {
    /// Attach the jar entry to a malformed class error that does not know it yet
    pub fn in_entry(self, entry: &str) -> Error {
        match self {
            Error::MalformedClass { entry: known, error } if known.is_empty() => {
                Error::MalformedClass {
                    entry: entry.to_owned(),
                    error,
                }
            }
            other => other,
        }
    }
}

impl From<jvm::Error> for Error {
    fn from(error: jvm::Error) -> Error {
        Error::MalformedClass {
            entry: String::new(),
            error,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownType(name) => write!(f, "unknown type {}", name),
            Error::MalformedClass { entry, error } => {
                write!(f, "malformed class file {}: {}", entry, error)
            }
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported verification version {}", version)
            }
            Error::DuplicateClass(name) => write!(f, "class {} is defined twice", name),
        }
    }
}

impl std::error::Error for Error {}

/// Kinds of problems found in a class
///
/// The kind takes part in the ordering of errors through its [name](ErrorKind::name).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    IllegalPackageName,
    IllegalFieldName,
    IllegalMethodName,
    IllegalBootstrapMethod,
    IllegalTypeForStorageField,
    IllegalCallToFromContract,
    IllegalCallToFromContractOnThis,
    IllegalCallToPayableConstructorOnThis,
    PayableWithoutAmount,
    ThrowsExceptionsOnNonPublic,
    PayableWithoutFromContract,
    FromContractNotInStorage,
    IllegalFromContractArgument,
    InconsistentFromContract,
    InconsistentPayable,
    InconsistentThrowsExceptions,
    IllegalStaticInitialization,
    IllegalNativeMethod,
    IllegalFinalizer,
    IllegalPutstaticInstruction,
    IllegalJsrInstruction,
    IllegalRetInstruction,
    IllegalUpdateOfLocal0,
    IllegalSynchronization,
    CallerOutsideFromContract,
    CallerNotOnThis,
    UncheckedExceptionHandler,
    IllegalAccessToNonWhiteListedField,
    IllegalCallToNonWhiteListedMethod,
    IllegalCallToNonWhiteListedConstructor,
    SelfChargedNotAllowed,
    IllegalSelfCharged,
    IllegalModificationOfAmount,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::IllegalPackageName => "IllegalPackageName",
            ErrorKind::IllegalFieldName => "IllegalFieldName",
            ErrorKind::IllegalMethodName => "IllegalMethodName",
            ErrorKind::IllegalBootstrapMethod => "IllegalBootstrapMethod",
            ErrorKind::IllegalTypeForStorageField => "IllegalTypeForStorageField",
            ErrorKind::IllegalCallToFromContract => "IllegalCallToFromContract",
            ErrorKind::IllegalCallToFromContractOnThis => "IllegalCallToFromContractOnThis",
            ErrorKind::IllegalCallToPayableConstructorOnThis => {
                "IllegalCallToPayableConstructorOnThis"
            }
            ErrorKind::PayableWithoutAmount => "PayableWithoutAmount",
            ErrorKind::ThrowsExceptionsOnNonPublic => "ThrowsExceptionsOnNonPublic",
            ErrorKind::PayableWithoutFromContract => "PayableWithoutFromContract",
            ErrorKind::FromContractNotInStorage => "FromContractNotInStorage",
            ErrorKind::IllegalFromContractArgument => "IllegalFromContractArgument",
            ErrorKind::InconsistentFromContract => "InconsistentFromContract",
            ErrorKind::InconsistentPayable => "InconsistentPayable",
            ErrorKind::InconsistentThrowsExceptions => "InconsistentThrowsExceptions",
            ErrorKind::IllegalStaticInitialization => "IllegalStaticInitialization",
            ErrorKind::IllegalNativeMethod => "IllegalNativeMethod",
            ErrorKind::IllegalFinalizer => "IllegalFinalizer",
            ErrorKind::IllegalPutstaticInstruction => "IllegalPutstaticInstruction",
            ErrorKind::IllegalJsrInstruction => "IllegalJsrInstruction",
            ErrorKind::IllegalRetInstruction => "IllegalRetInstruction",
            ErrorKind::IllegalUpdateOfLocal0 => "IllegalUpdateOfLocal0",
            ErrorKind::IllegalSynchronization => "IllegalSynchronization",
            ErrorKind::CallerOutsideFromContract => "CallerOutsideFromContract",
            ErrorKind::CallerNotOnThis => "CallerNotOnThis",
            ErrorKind::UncheckedExceptionHandler => "UncheckedExceptionHandler",
            ErrorKind::IllegalAccessToNonWhiteListedField => "IllegalAccessToNonWhiteListedField",
            ErrorKind::IllegalCallToNonWhiteListedMethod => "IllegalCallToNonWhiteListedMethod",
            ErrorKind::IllegalCallToNonWhiteListedConstructor => {
                "IllegalCallToNonWhiteListedConstructor"
            }
            ErrorKind::SelfChargedNotAllowed => "SelfChargedNotAllowed",
            ErrorKind::IllegalSelfCharged => "IllegalSelfCharged",
            ErrorKind::IllegalModificationOfAmount => "IllegalModificationOfAmount",
        }
    }
}

/// Problem found in a class during verification
///
/// Errors are ordered by location, then by the name of their kind, then by message. Equality and
/// hashing agree with that order.
#[derive(Debug, Clone)]
pub struct VerificationError {
    pub kind: ErrorKind,

    /// Where the problem is (source file, possibly line, and member)
    pub location: String,

    pub message: String,
}

impl VerificationError {
    pub fn new(kind: ErrorKind, location: String, message: impl Into<String>) -> Self {
        VerificationError {
            kind,
            location,
            message: message.into(),
        }
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.location, self.kind.name(), &self.message)
    }
}

impl PartialEq for VerificationError {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for VerificationError {}

impl PartialOrd for VerificationError {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VerificationError {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for VerificationError {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeSet;

    fn error(kind: ErrorKind, location: &str, message: &str) -> VerificationError {
        VerificationError::new(kind, location.to_owned(), message)
    }

    #[test]
    fn order_is_location_kind_message() {
        let errors = vec![
            error(ErrorKind::IllegalNativeMethod, "b/C.java method f", "native"),
            error(ErrorKind::IllegalFinalizer, "b/C.java method f", "finalizer"),
            error(ErrorKind::IllegalFinalizer, "b/C.java method f", "another"),
            error(ErrorKind::IllegalPackageName, "a/C.java", "package"),
        ];
        let mut forward: BTreeSet<_> = BTreeSet::new();
        let mut backward: BTreeSet<_> = BTreeSet::new();
        forward.extend(errors.iter().cloned());
        backward.extend(errors.iter().rev().cloned());

        let sorted: Vec<_> = forward.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(sorted, vec!["package", "another", "finalizer", "native"]);
        assert!(forward.iter().eq(backward.iter()));
    }

    #[test]
    fn equality_ignores_nothing_in_the_key() {
        let a = error(ErrorKind::IllegalJsrInstruction, "C.java:3 method m", "jsr");
        let b = error(ErrorKind::IllegalJsrInstruction, "C.java:3 method m", "jsr");
        let c = error(ErrorKind::IllegalRetInstruction, "C.java:3 method m", "jsr");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(format!("{}", a), "C.java:3 method m: jsr");
    }

    #[test]
    fn entries_are_attached_once() {
        let error = Error::from(jvm::Error::TrailingBytes("class file")).in_entry("a/B.class");
        let error = error.in_entry("c/D.class");
        match error {
            Error::MalformedClass { entry, .. } => assert_eq!(entry, "a/B.class"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
