//! Bytecode representation and analysis
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is the part of the class file the verifier cares most about: it contains the
//! actual executable instructions. We split up the [list of bytecode instructions][0] into two
//! groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may branch or end the method
//!
//! A decoded [`MethodBody`] is an ordered list of these, along with the control flow edges
//! between them (including the entry points of exception handlers) and the mapping back to
//! source lines.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod instruction;
mod method_body;
mod stack_effect;

pub use instruction::*;
pub use method_body::*;
pub use stack_effect::*;
