use super::{decode_instructions, CodeInstruction};
use crate::jvm::class_file::{ClassFile, Code, LineNumberTable};
use crate::jvm::{ClassConstantIndex, Error};
use crate::util::{Offset, OffsetVec};
use std::collections::BTreeSet;

/// Decoded body of a method
///
/// Instructions are addressed by their index in the body (not their byte offset). For each
/// instruction, the body knows which instructions can execute right before it.
#[derive(Debug)]
pub struct MethodBody {
    instructions: OffsetVec<CodeInstruction<usize>>,

    /// Exception handlers, in the order of the exception table
    pub exception_handlers: Vec<Handler>,

    line_numbers: Option<LineNumberTable>,

    /// Indices of instructions that can transfer control to each instruction (sorted)
    predecessors: Vec<Vec<usize>>,

    /// Indices of the first instruction of exception handlers
    handler_entries: BTreeSet<usize>,
}

/// Entry of the exception table, with offsets mapped to instruction indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    /// First covered instruction
    pub start: usize,

    /// First instruction past the covered range (may be the length of the body)
    pub end: usize,

    /// First instruction of the handler
    pub handler: usize,

    /// Byte offset of the first instruction of the handler
    pub handler_offset: usize,

    /// Caught exception class (`None` catches everything)
    pub catch_type: Option<ClassConstantIndex>,
}

impl MethodBody {
    /// Decode the `Code` attribute of a method of `class`
    pub fn from_code(class: &ClassFile, code: &Code) -> Result<MethodBody, Error> {
        let instructions = decode_instructions(&code.code_array.0)?;

        let index_of = |offset: u16, allow_end: bool| -> Result<usize, Error> {
            let offset = offset as usize;
            if allow_end && offset == instructions.offset_len().0 {
                return Ok(instructions.len());
            }
            instructions
                .get_offset(Offset(offset))
                .index()
                .ok_or_else(|| Error::BadAttribute {
                    name: "Code",
                    message: format!("exception table refers to invalid offset {}", offset),
                })
        };
        let exception_handlers = code
            .exception_table
            .iter()
            .map(|entry| -> Result<Handler, Error> {
                Ok(Handler {
                    start: index_of(entry.start_pc.0, false)?,
                    end: index_of(entry.end_pc.0, true)?,
                    handler: index_of(entry.handler_pc.0, false)?,
                    handler_offset: entry.handler_pc.0 as usize,
                    catch_type: entry.catch_type,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut predecessors: Vec<Vec<usize>> = vec![vec![]; instructions.len()];
        for (_, idx, insn) in instructions.iter() {
            if insn.falls_through() && idx + 1 < instructions.len() {
                predecessors[idx + 1].push(idx);
            }
            for target in insn.jump_targets().targets() {
                predecessors[*target].push(idx);
            }
        }
        for preds in &mut predecessors {
            preds.sort_unstable();
            preds.dedup();
        }

        let handler_entries = exception_handlers
            .iter()
            .map(|handler| handler.handler)
            .collect();
        let line_numbers = class.attribute::<LineNumberTable>(&code.attributes)?;

        Ok(MethodBody {
            instructions,
            exception_handlers,
            line_numbers,
            predecessors,
            handler_entries,
        })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&CodeInstruction<usize>> {
        self.instructions.get_index(idx).map(|(_, insn)| insn)
    }

    /// Byte offset of an instruction
    pub fn offset_of(&self, idx: usize) -> Option<usize> {
        self.instructions.get_index(idx).map(|(offset, _)| offset.0)
    }

    /// Iterate over instructions, along with their byte offset and index
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &CodeInstruction<usize>)> {
        self.instructions
            .iter()
            .map(|(offset, idx, insn)| (offset.0, idx, insn))
    }

    /// Instructions that can execute immediately before the given one
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        self.predecessors.get(idx).map_or(&[], |preds| preds.as_slice())
    }

    /// Is the instruction the entry point of some exception handler?
    pub fn is_handler_entry(&self, idx: usize) -> bool {
        self.handler_entries.contains(&idx)
    }

    /// Source line of the instruction, if the method has line numbers
    pub fn line_of(&self, idx: usize) -> Option<u16> {
        self.offset_of(idx).and_then(|offset| self.line_at_offset(offset))
    }

    /// Source line at a byte offset, if the method has line numbers
    pub fn line_at_offset(&self, offset: usize) -> Option<u16> {
        self.line_numbers
            .as_ref()
            .and_then(|table| table.line_of(offset))
    }
}
