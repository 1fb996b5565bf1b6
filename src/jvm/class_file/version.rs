use crate::jvm::class_file::{Deserialize, Serialize};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };

    /// JVM class file version corresponding to Java SE 11 (released September 2018)
    pub const JAVA11: Version = Version {
        minor_version: 0,
        major_version: 55,
    };
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Version {
            minor_version: u16::deserialize(reader)?,
            major_version: u16::deserialize(reader)?,
        })
    }
}
