use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Mirror of [`Serialize`], for reading class files back in
///
/// Deserialization can fail for reasons other than IO (eg. a malformed constant), so this
/// produces the richer class file [`Error`].
pub trait Deserialize: Sized {
    /// Deserialize construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error>;
}

macro_rules! primitive_format {
    ($typ:ty, $write:ident, $read:ident $(, $endian:ty)?) => {
        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write$(::<$endian>)?(*self)
            }
        }

        impl Deserialize for $typ {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
                Ok(reader.$read$(::<$endian>)?()?)
            }
        }
    };
}

primitive_format!(u8, write_u8, read_u8);
primitive_format!(u16, write_u16, read_u16, BigEndian);
primitive_format!(u32, write_u32, read_u32, BigEndian);
primitive_format!(u64, write_u64, read_u64, BigEndian);
primitive_format!(i8, write_i8, read_i8);
primitive_format!(i16, write_i16, read_i16, BigEndian);
primitive_format!(i32, write_i32, read_i32, BigEndian);
primitive_format!(i64, write_i64, read_i64, BigEndian);
primitive_format!(f32, write_f32, read_f32, BigEndian);
primitive_format!(f64, write_f64, read_f64, BigEndian);

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        (0..len).map(|_| A::deserialize(reader)).collect()
    }
}

/// Read exactly `len` raw bytes
pub fn read_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}
