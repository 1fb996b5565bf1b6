use super::ConstantIndex;
use std::fmt::{Display, Formatter};

/// Ways in which a class file can fail to parse
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// The file does not start with `0xCAFEBABE`
    BadMagic([u8; 4]),

    /// Constant pool entry with a tag we do not know about
    UnknownConstantTag { index: ConstantIndex, tag: u8 },

    /// An index points outside of the constant pool (or in the middle of a wide constant)
    MissingConstant(ConstantIndex),

    /// An index points to a constant of the wrong kind
    UnexpectedConstant {
        index: ConstantIndex,
        expected: &'static str,
    },

    /// A `CONSTANT_Utf8_info` does not contain valid modified UTF-8
    BadModifiedUtf8(Vec<u8>),

    /// Invalid class, method, or field name
    BadName(String),

    /// Invalid field or method descriptor
    BadDescriptor(String),

    /// Unrecognized opcode in a method body
    UnknownOpcode { offset: usize, opcode: u8 },

    /// A jump lands outside of the code array or in the middle of an instruction
    BadJumpTarget { offset: usize, target: i64 },

    /// An attribute is shorter or longer than its contents
    BadAttribute {
        name: &'static str,
        message: String,
    },

    /// Leftover bytes after the end of a structure
    TrailingBytes(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "{}", err),
            Error::BadMagic(magic) => write!(f, "bad magic number {:02X?}", magic),
            Error::UnknownConstantTag { index, tag } => {
                write!(f, "unknown constant tag {} at #{}", tag, index.0)
            }
            Error::MissingConstant(index) => write!(f, "missing constant #{}", index.0),
            Error::UnexpectedConstant { index, expected } => {
                write!(f, "constant #{} should be {}", index.0, expected)
            }
            Error::BadModifiedUtf8(bytes) => write!(f, "invalid modified utf8 {:?}", bytes),
            Error::BadName(msg) => write!(f, "bad name: {}", msg),
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode 0x{:02x} at {}", opcode, offset)
            }
            Error::BadJumpTarget { offset, target } => {
                write!(f, "jump at {} to invalid target {}", offset, target)
            }
            Error::BadAttribute { name, message } => {
                write!(f, "malformed {} attribute: {}", name, message)
            }
            Error::TrailingBytes(what) => write!(f, "trailing bytes after {}", what),
        }
    }
}
