//! Read JVM classes
//!
//! Everything here is about the class file format itself, with no knowledge of smart contracts:
//! the binary layout of classes (see [`class_file`]), names and descriptors, and the instructions
//! found in method bodies (see [`code`]).

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use class_file::{
    ClassConstantIndex, Constant, ConstantIndex, FieldRefConstantIndex, HandleKind,
    InvokeDynamicConstantIndex, MethodRefConstantIndex, NameAndTypeConstantIndex,
    StringConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
