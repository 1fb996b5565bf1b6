use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in their internal form (eg. `java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

/// Classes are displayed in their Java source form (eg. `java.lang.Object`)
impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(&self.to_dotted())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Is this the name of a constructor?
    pub fn is_constructor(&self) -> bool {
        self == &Self::INIT
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    pub const CALLER: Self = Self::name("caller");
    pub const FINALIZE: Self = Self::name("finalize");
    pub const HASHCODE: Self = Self::name("hashCode");
    pub const METAFACTORY: Self = Self::name("metafactory");
    pub const MAKECONCATWITHCONSTANTS: Self = Self::name("makeConcatWithConstants");
    pub const TOSTRING: Self = Self::name("toString");
    pub const VALUE: Self = Self::name("value");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Name in Java source form, with dots separating the package segments
    pub fn to_dotted(&self) -> String {
        self.as_str().replace('/', ".")
    }

    /// Package of the class, in Java source form (empty for the default package)
    pub fn package(&self) -> String {
        match self.as_str().rfind('/') {
            Some(idx) => self.as_str()[..idx].replace('/', "."),
            None => String::new(),
        }
    }

    /// Last segment of the name (eg. `Object` for `java/lang/Object`)
    pub fn simple_name(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[idx + 1..],
            None => self.as_str(),
        }
    }

    // JDK names
    pub const BIGINTEGER: Self = Self::name("java/math/BigInteger");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const LAMBDAMETAFACTORY: Self = Self::name("java/lang/invoke/LambdaMetafactory");
    pub const NOSUCHFIELDERROR: Self = Self::name("java/lang/NoSuchFieldError");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const OBJECTS: Self = Self::name("java/util/Objects");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const STRINGCONCATFACTORY: Self = Self::name("java/lang/invoke/StringConcatFactory");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");

    // Takamaka names
    pub const CONTRACT: Self = Self::name("io/takamaka/code/lang/Contract");
    pub const DUMMY: Self = Self::name("io/hotmoka/verification/Dummy");
    pub const EXPORTED: Self = Self::name("io/takamaka/code/lang/Exported");
    pub const FROM_CONTRACT: Self = Self::name("io/takamaka/code/lang/FromContract");
    pub const PAYABLE: Self = Self::name("io/takamaka/code/lang/Payable");
    pub const RED_PAYABLE: Self = Self::name("io/takamaka/code/lang/RedPayable");
    pub const SELF_CHARGED: Self = Self::name("io/takamaka/code/lang/SelfCharged");
    pub const STORAGE: Self = Self::name("io/takamaka/code/lang/Storage");
    pub const THROWS_EXCEPTIONS: Self = Self::name("io/takamaka/code/lang/ThrowsExceptions");
    pub const VIEW: Self = Self::name("io/takamaka/code/lang/View");
    pub const WHITE_LISTED_DURING_INITIALIZATION: Self =
        Self::name("io/takamaka/code/lang/WhiteListedDuringInitialization");
}
