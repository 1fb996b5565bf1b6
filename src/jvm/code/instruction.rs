//! This module contains the AST of JVM bytecode. The representation is slightly different from
//! the usual presentation to make it more convenient to analyze bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Short and long forms of the same instruction (`iload_0` and `iload 0`, `goto` and
//!     `goto_w`, `ldc` and `ldc_w`) are merged into one instruction
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//! Jump targets are a type parameter: raw decoding produces absolute byte offsets, which then get
//! mapped to indices into the instruction list.

use crate::jvm::class_file::{Deserialize, Serialize};
use crate::jvm::{
    BaseType, ClassConstantIndex, ConstantIndex, Error, FieldRefConstantIndex,
    InvokeDynamicConstantIndex, MethodRefConstantIndex,
};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantIndex), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantIndex),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRefConstantIndex),
    PutStatic(FieldRefConstantIndex),
    GetField(FieldRefConstantIndex),
    PutField(FieldRefConstantIndex),
    Invoke(InvokeType, MethodRefConstantIndex),
    InvokeDynamic(InvokeDynamicConstantIndex),
    New(ClassConstantIndex),
    NewArray(BaseType),
    ANewArray(ClassConstantIndex),
    ArrayLength,
    CheckCast(ClassConstantIndex),
    InstanceOf(ClassConstantIndex),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(ClassConstantIndex, u8),
}

/// Branching JVM bytecode instruction
///
/// `Lbl` is the representation of jump targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl),  // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl),  // covers `ifnull`, `ifnonnull`
    Goto(Lbl),                  // covers `goto` and `goto_w`
    Jsr(Lbl),                   // covers `jsr` and `jsr_w`
    Ret(u16),                   // covers `ret` and `wide ret`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

/// Any decoded instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeInstruction<Lbl> {
    Regular(Instruction),
    Branch(BranchInstruction<Lbl>),
}

impl<Lbl> From<Instruction> for CodeInstruction<Lbl> {
    fn from(instruction: Instruction) -> Self {
        CodeInstruction::Regular(instruction)
    }
}

impl<Lbl> From<BranchInstruction<Lbl>> for CodeInstruction<Lbl> {
    fn from(instruction: BranchInstruction<Lbl>) -> Self {
        CodeInstruction::Branch(instruction)
    }
}

/// Non-fallthrough jump targets of a `BranchInstruction`
pub enum JumpTargets<Lbl> {
    None,
    Regular(Lbl),
    Many(Vec<Lbl>),
}

impl<A> JumpTargets<A> {
    pub fn targets(&self) -> &[A] {
        match self {
            JumpTargets::None => &[],
            JumpTargets::Regular(a) => std::slice::from_ref(a),
            JumpTargets::Many(a_many) => a_many,
        }
    }
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Can execution continue with the next instruction?
    ///
    /// `jsr` is treated as falling through, since the subroutine returns to the next instruction.
    pub fn falls_through(&self) -> bool {
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _)
            | BranchInstruction::Jsr(_) => true,

            BranchInstruction::Goto(_)
            | BranchInstruction::Ret(_)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. }
            | BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => false,
        }
    }

    /// Statically known targets the instruction can jump to (other than falling through)
    pub fn jump_targets(&self) -> JumpTargets<Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::Jsr(lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                JumpTargets::Many(ts)
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                JumpTargets::Many(ts)
            }
            BranchInstruction::Ret(_)
            | BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => JumpTargets::None,
        }
    }
}

impl<Lbl> BranchInstruction<Lbl> {
    pub fn try_map_labels<Lbl2, E>(
        &self,
        map_label: impl Fn(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            Jsr(lbl) => Jsr(map_label(lbl)?),
            Ret(idx) => Ret(*idx),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets.iter().map(&map_label).collect::<Result<_, E>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| -> Result<(i32, Lbl2), E> { Ok((*key, map_label(lbl)?)) })
                    .collect::<Result<_, E>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        })
    }

    /// Width of the encoded instruction, given the offset at which it is placed (switches are
    /// padded to a 4-byte boundary)
    pub fn width_at(&self, offset: usize) -> usize {
        let padding = switch_padding(offset);
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _)
            | BranchInstruction::Goto(_)
            | BranchInstruction::Jsr(_) => 3,
            BranchInstruction::Ret(idx) => {
                if *idx <= u8::MAX as u16 {
                    2
                } else {
                    4
                }
            }
            BranchInstruction::TableSwitch { targets, .. } => 1 + padding + 12 + 4 * targets.len(),
            BranchInstruction::LookupSwitch { targets, .. } => 1 + padding + 8 + 8 * targets.len(),
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,
        }
    }
}

impl<Lbl: Copy> CodeInstruction<Lbl> {
    pub fn falls_through(&self) -> bool {
        match self {
            CodeInstruction::Regular(_) => true,
            CodeInstruction::Branch(branch) => branch.falls_through(),
        }
    }

    pub fn jump_targets(&self) -> JumpTargets<Lbl> {
        match self {
            CodeInstruction::Regular(_) => JumpTargets::None,
            CodeInstruction::Branch(branch) => branch.jump_targets(),
        }
    }
}

impl<Lbl> CodeInstruction<Lbl> {
    pub fn width_at(&self, offset: usize) -> usize {
        match self {
            CodeInstruction::Regular(insn) => insn.width(),
            CodeInstruction::Branch(branch) => branch.width_at(offset),
        }
    }
}

/// `tableswitch` and `lookupswitch` operands start at a multiple of four bytes from the start of
/// the method, so there must be a 0-3 inclusive byte padding after the opcode
fn switch_padding(offset: usize) -> usize {
    3 - (offset % 4)
}

fn local_width(idx: u16, short_forms: bool) -> usize {
    match idx {
        0..=3 if short_forms => 1,
        0..=255 => 2,
        _ => 4,
    }
}

impl Width for Instruction {
    fn width(&self) -> usize {
        match self {
            Instruction::BiPush(_) | Instruction::NewArray(_) => 2,
            Instruction::SiPush(_)
            | Instruction::Ldc2(_)
            | Instruction::GetStatic(_)
            | Instruction::PutStatic(_)
            | Instruction::GetField(_)
            | Instruction::PutField(_)
            | Instruction::Invoke(InvokeType::Virtual, _)
            | Instruction::Invoke(InvokeType::Special, _)
            | Instruction::Invoke(InvokeType::Static, _)
            | Instruction::New(_)
            | Instruction::ANewArray(_)
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_) => 3,
            Instruction::MultiANewArray(_, _) => 4,
            Instruction::Invoke(InvokeType::Interface(_), _) | Instruction::InvokeDynamic(_) => 5,
            Instruction::Ldc(ConstantIndex(idx)) => {
                if *idx <= u8::MAX as u16 {
                    2
                } else {
                    3
                }
            }
            Instruction::ILoad(idx)
            | Instruction::LLoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::LStore(idx)
            | Instruction::FStore(idx)
            | Instruction::DStore(idx)
            | Instruction::AStore(idx) => local_width(*idx, true),
            Instruction::IInc(idx, diff) => {
                if *idx <= u8::MAX as u16 && i8::try_from(*diff).is_ok() {
                    3
                } else {
                    6
                }
            }
            _ => 1,
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

const ORD_COMPARISONS: [OrdComparison; 6] = [
    OrdComparison::EQ,
    OrdComparison::NE,
    OrdComparison::LT,
    OrdComparison::GE,
    OrdComparison::GT,
    OrdComparison::LE,
];

fn ord_comparison_offset(comp: OrdComparison) -> u8 {
    match comp {
        OrdComparison::EQ => 0,
        OrdComparison::NE => 1,
        OrdComparison::LT => 2,
        OrdComparison::GE => 3,
        OrdComparison::GT => 4,
        OrdComparison::LE => 5,
    }
}

const ARRAY_TYPES: [BaseType; 8] = [
    BaseType::Boolean,
    BaseType::Char,
    BaseType::Float,
    BaseType::Double,
    BaseType::Byte,
    BaseType::Short,
    BaseType::Int,
    BaseType::Long,
];

/// Decode the code array of a method into a list of instructions, where jump targets are indices
/// into that same list
pub fn decode_instructions(code: &[u8]) -> Result<OffsetVec<CodeInstruction<usize>>, Error> {
    let mut raw: OffsetVec<CodeInstruction<i64>> = OffsetVec::new();
    let mut reader = code;
    while !reader.is_empty() {
        let offset = code.len() - reader.len();
        let insn = decode_at(offset, &mut reader)?;
        let width = code.len() - reader.len() - offset;
        raw.push_sized(insn, width);
    }

    let mut decoded = OffsetVec::new();
    let mut entries = raw.iter().peekable();
    while let Some((offset, _, insn)) = entries.next() {
        let next_offset = entries.peek().map_or(raw.offset_len(), |(next, _, _)| *next);
        let resolve = |target: &i64| -> Result<usize, Error> {
            usize::try_from(*target)
                .ok()
                .and_then(|target| raw.get_offset(Offset(target)).index())
                .ok_or(Error::BadJumpTarget {
                    offset: offset.0,
                    target: *target,
                })
        };
        let insn = match insn {
            CodeInstruction::Regular(regular) => CodeInstruction::Regular(regular.clone()),
            CodeInstruction::Branch(branch) => CodeInstruction::Branch(branch.try_map_labels(resolve)?),
        };
        decoded.push_sized(insn, next_offset.0 - offset.0);
    }
    Ok(decoded)
}

fn jump16<R: ReadBytesExt>(offset: usize, reader: &mut R) -> Result<i64, Error> {
    Ok(offset as i64 + i16::deserialize(reader)? as i64)
}

fn jump32<R: ReadBytesExt>(offset: usize, reader: &mut R) -> Result<i64, Error> {
    Ok(offset as i64 + i32::deserialize(reader)? as i64)
}

fn local<R: ReadBytesExt>(reader: &mut R, wide: bool) -> Result<u16, Error> {
    if wide {
        u16::deserialize(reader)
    } else {
        Ok(u8::deserialize(reader)? as u16)
    }
}

/// Decode one instruction, with jumps resolved to absolute offsets
fn decode_at<R: ReadBytesExt>(offset: usize, reader: &mut R) -> Result<CodeInstruction<i64>, Error> {
    use BranchInstruction as B;
    use Instruction as I;

    let mut opcode = u8::deserialize(reader)?;
    let wide = opcode == 0xc4;
    if wide {
        opcode = u8::deserialize(reader)?;
        match opcode {
            0x15..=0x19 | 0x36..=0x3a | 0x84 | 0xa9 => (),
            _ => return Err(Error::UnknownOpcode { offset, opcode }),
        }
    }

    let insn = match opcode {
        0x00 => I::Nop,
        0x01 => I::AConstNull,
        0x02 => I::IConstM1,
        0x03 => I::IConst0,
        0x04 => I::IConst1,
        0x05 => I::IConst2,
        0x06 => I::IConst3,
        0x07 => I::IConst4,
        0x08 => I::IConst5,
        0x09 => I::LConst0,
        0x0a => I::LConst1,
        0x0b => I::FConst0,
        0x0c => I::FConst1,
        0x0d => I::FConst2,
        0x0e => I::DConst0,
        0x0f => I::DConst1,
        0x10 => I::BiPush(i8::deserialize(reader)?),
        0x11 => I::SiPush(i16::deserialize(reader)?),
        0x12 => I::Ldc(ConstantIndex(u8::deserialize(reader)? as u16)),
        0x13 => I::Ldc(ConstantIndex::deserialize(reader)?),
        0x14 => I::Ldc2(ConstantIndex::deserialize(reader)?),
        0x15 => I::ILoad(local(reader, wide)?),
        0x16 => I::LLoad(local(reader, wide)?),
        0x17 => I::FLoad(local(reader, wide)?),
        0x18 => I::DLoad(local(reader, wide)?),
        0x19 => I::ALoad(local(reader, wide)?),
        0x1a..=0x1d => I::ILoad((opcode - 0x1a) as u16),
        0x1e..=0x21 => I::LLoad((opcode - 0x1e) as u16),
        0x22..=0x25 => I::FLoad((opcode - 0x22) as u16),
        0x26..=0x29 => I::DLoad((opcode - 0x26) as u16),
        0x2a..=0x2d => I::ALoad((opcode - 0x2a) as u16),
        0x2e => I::IALoad,
        0x2f => I::LALoad,
        0x30 => I::FALoad,
        0x31 => I::DALoad,
        0x32 => I::AALoad,
        0x33 => I::BALoad,
        0x34 => I::CALoad,
        0x35 => I::SALoad,
        0x36 => I::IStore(local(reader, wide)?),
        0x37 => I::LStore(local(reader, wide)?),
        0x38 => I::FStore(local(reader, wide)?),
        0x39 => I::DStore(local(reader, wide)?),
        0x3a => I::AStore(local(reader, wide)?),
        0x3b..=0x3e => I::IStore((opcode - 0x3b) as u16),
        0x3f..=0x42 => I::LStore((opcode - 0x3f) as u16),
        0x43..=0x46 => I::FStore((opcode - 0x43) as u16),
        0x47..=0x4a => I::DStore((opcode - 0x47) as u16),
        0x4b..=0x4e => I::AStore((opcode - 0x4b) as u16),
        0x4f => I::IAStore,
        0x50 => I::LAStore,
        0x51 => I::FAStore,
        0x52 => I::DAStore,
        0x53 => I::AAStore,
        0x54 => I::BAStore,
        0x55 => I::CAStore,
        0x56 => I::SAStore,
        0x57 => I::Pop,
        0x58 => I::Pop2,
        0x59 => I::Dup,
        0x5a => I::DupX1,
        0x5b => I::DupX2,
        0x5c => I::Dup2,
        0x5d => I::Dup2X1,
        0x5e => I::Dup2X2,
        0x5f => I::Swap,
        0x60 => I::IAdd,
        0x61 => I::LAdd,
        0x62 => I::FAdd,
        0x63 => I::DAdd,
        0x64 => I::ISub,
        0x65 => I::LSub,
        0x66 => I::FSub,
        0x67 => I::DSub,
        0x68 => I::IMul,
        0x69 => I::LMul,
        0x6a => I::FMul,
        0x6b => I::DMul,
        0x6c => I::IDiv,
        0x6d => I::LDiv,
        0x6e => I::FDiv,
        0x6f => I::DDiv,
        0x70 => I::IRem,
        0x71 => I::LRem,
        0x72 => I::FRem,
        0x73 => I::DRem,
        0x74 => I::INeg,
        0x75 => I::LNeg,
        0x76 => I::FNeg,
        0x77 => I::DNeg,
        0x78 => I::ISh(ShiftType::Left),
        0x79 => I::LSh(ShiftType::Left),
        0x7a => I::ISh(ShiftType::ArithmeticRight),
        0x7b => I::LSh(ShiftType::ArithmeticRight),
        0x7c => I::ISh(ShiftType::LogicalRight),
        0x7d => I::LSh(ShiftType::LogicalRight),
        0x7e => I::IAnd,
        0x7f => I::LAnd,
        0x80 => I::IOr,
        0x81 => I::LOr,
        0x82 => I::IXor,
        0x83 => I::LXor,
        0x84 if wide => I::IInc(u16::deserialize(reader)?, i16::deserialize(reader)?),
        0x84 => I::IInc(u8::deserialize(reader)? as u16, i8::deserialize(reader)? as i16),
        0x85 => I::I2L,
        0x86 => I::I2F,
        0x87 => I::I2D,
        0x88 => I::L2I,
        0x89 => I::L2F,
        0x8a => I::L2D,
        0x8b => I::F2I,
        0x8c => I::F2L,
        0x8d => I::F2D,
        0x8e => I::D2I,
        0x8f => I::D2L,
        0x90 => I::D2F,
        0x91 => I::I2B,
        0x92 => I::I2C,
        0x93 => I::I2S,
        0x94 => I::LCmp,
        0x95 => I::FCmp(CompareMode::L),
        0x96 => I::FCmp(CompareMode::G),
        0x97 => I::DCmp(CompareMode::L),
        0x98 => I::DCmp(CompareMode::G),
        0x99..=0x9e => {
            let comp = ORD_COMPARISONS[(opcode - 0x99) as usize];
            return Ok(B::If(comp, jump16(offset, reader)?).into());
        }
        0x9f..=0xa4 => {
            let comp = ORD_COMPARISONS[(opcode - 0x9f) as usize];
            return Ok(B::IfICmp(comp, jump16(offset, reader)?).into());
        }
        0xa5 => return Ok(B::IfACmp(EqComparison::EQ, jump16(offset, reader)?).into()),
        0xa6 => return Ok(B::IfACmp(EqComparison::NE, jump16(offset, reader)?).into()),
        0xa7 => return Ok(B::Goto(jump16(offset, reader)?).into()),
        0xa8 => return Ok(B::Jsr(jump16(offset, reader)?).into()),
        0xa9 => return Ok(B::Ret(local(reader, wide)?).into()),
        0xaa => {
            read_padding(offset, reader)?;
            let default = jump32(offset, reader)?;
            let low = i32::deserialize(reader)?;
            let high = i32::deserialize(reader)?;
            if high < low {
                return Err(Error::BadJumpTarget {
                    offset,
                    target: default,
                });
            }
            let targets = (low..=high)
                .map(|_| jump32(offset, reader))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(B::TableSwitch {
                default,
                low,
                targets,
            }
            .into());
        }
        0xab => {
            read_padding(offset, reader)?;
            let default = jump32(offset, reader)?;
            let npairs = i32::deserialize(reader)?.max(0);
            let targets = (0..npairs)
                .map(|_| -> Result<(i32, i64), Error> {
                    Ok((i32::deserialize(reader)?, jump32(offset, reader)?))
                })
                .collect::<Result<Vec<_>, Error>>()?;
            return Ok(B::LookupSwitch { default, targets }.into());
        }
        0xac => return Ok(B::IReturn.into()),
        0xad => return Ok(B::LReturn.into()),
        0xae => return Ok(B::FReturn.into()),
        0xaf => return Ok(B::DReturn.into()),
        0xb0 => return Ok(B::AReturn.into()),
        0xb1 => return Ok(B::Return.into()),
        0xb2 => I::GetStatic(FieldRefConstantIndex::deserialize(reader)?),
        0xb3 => I::PutStatic(FieldRefConstantIndex::deserialize(reader)?),
        0xb4 => I::GetField(FieldRefConstantIndex::deserialize(reader)?),
        0xb5 => I::PutField(FieldRefConstantIndex::deserialize(reader)?),
        0xb6 => I::Invoke(InvokeType::Virtual, MethodRefConstantIndex::deserialize(reader)?),
        0xb7 => I::Invoke(InvokeType::Special, MethodRefConstantIndex::deserialize(reader)?),
        0xb8 => I::Invoke(InvokeType::Static, MethodRefConstantIndex::deserialize(reader)?),
        0xb9 => {
            let method = MethodRefConstantIndex::deserialize(reader)?;
            let count = u8::deserialize(reader)?;
            let _zero = u8::deserialize(reader)?;
            I::Invoke(InvokeType::Interface(count), method)
        }
        0xba => {
            let call_site = InvokeDynamicConstantIndex::deserialize(reader)?;
            let _zero = u16::deserialize(reader)?;
            I::InvokeDynamic(call_site)
        }
        0xbb => I::New(ClassConstantIndex::deserialize(reader)?),
        0xbc => {
            let atype = u8::deserialize(reader)?;
            match atype.checked_sub(4).and_then(|idx| ARRAY_TYPES.get(idx as usize)) {
                Some(base_type) => I::NewArray(*base_type),
                None => return Err(Error::UnknownOpcode { offset, opcode }),
            }
        }
        0xbd => I::ANewArray(ClassConstantIndex::deserialize(reader)?),
        0xbe => I::ArrayLength,
        0xbf => return Ok(B::AThrow.into()),
        0xc0 => I::CheckCast(ClassConstantIndex::deserialize(reader)?),
        0xc1 => I::InstanceOf(ClassConstantIndex::deserialize(reader)?),
        0xc2 => I::MonitorEnter,
        0xc3 => I::MonitorExit,
        0xc5 => I::MultiANewArray(
            ClassConstantIndex::deserialize(reader)?,
            u8::deserialize(reader)?,
        ),
        0xc6 => return Ok(B::IfNull(EqComparison::EQ, jump16(offset, reader)?).into()),
        0xc7 => return Ok(B::IfNull(EqComparison::NE, jump16(offset, reader)?).into()),
        0xc8 => return Ok(B::Goto(jump32(offset, reader)?).into()),
        0xc9 => return Ok(B::Jsr(jump32(offset, reader)?).into()),
        _ => return Err(Error::UnknownOpcode { offset, opcode }),
    };
    Ok(CodeInstruction::Regular(insn))
}

fn read_padding<R: ReadBytesExt>(offset: usize, reader: &mut R) -> Result<(), Error> {
    for _ in 0..switch_padding(offset) {
        u8::deserialize(reader)?;
    }
    Ok(())
}

/// Encode a list of instructions (where jump targets are indices into the list) into a code
/// array
pub fn encode_instructions(instructions: &[CodeInstruction<usize>]) -> Result<Vec<u8>, Error> {
    let mut offsets: Vec<usize> = Vec::with_capacity(instructions.len());
    let mut offset = 0;
    for insn in instructions {
        offsets.push(offset);
        offset += insn.width_at(offset);
    }

    let mut code = vec![];
    for (insn, here) in instructions.iter().zip(offsets.iter().copied()) {
        match insn {
            CodeInstruction::Regular(regular) => regular.serialize(&mut code)?,
            CodeInstruction::Branch(branch) => {
                let relative = |target: &usize| -> Result<i32, Error> {
                    match offsets.get(*target) {
                        Some(there) => Ok(*there as i32 - here as i32),
                        None => Err(Error::BadJumpTarget {
                            offset: here,
                            target: *target as i64,
                        }),
                    }
                };
                branch.try_map_labels(relative)?.serialize_at(here, &mut code)?;
            }
        }
    }
    Ok(code)
}

impl BranchInstruction<i32> {
    /// Serialize with jumps given relative to the start of this instruction
    fn serialize_at<W: WriteBytesExt>(&self, offset: usize, writer: &mut W) -> Result<(), Error> {
        let short = |relative: i32| -> Result<i16, Error> {
            i16::try_from(relative).map_err(|_| Error::BadJumpTarget {
                offset,
                target: offset as i64 + relative as i64,
            })
        };
        match self {
            BranchInstruction::If(comp, lbl) => {
                (0x99 + ord_comparison_offset(*comp)).serialize(writer)?;
                short(*lbl)?.serialize(writer)?;
            }
            BranchInstruction::IfICmp(comp, lbl) => {
                (0x9f + ord_comparison_offset(*comp)).serialize(writer)?;
                short(*lbl)?.serialize(writer)?;
            }
            BranchInstruction::IfACmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xa5,
                    EqComparison::NE => 0xa6,
                };
                opcode.serialize(writer)?;
                short(*lbl)?.serialize(writer)?;
            }
            BranchInstruction::IfNull(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xc6,
                    EqComparison::NE => 0xc7,
                };
                opcode.serialize(writer)?;
                short(*lbl)?.serialize(writer)?;
            }
            BranchInstruction::Goto(lbl) => {
                0xa7u8.serialize(writer)?;
                short(*lbl)?.serialize(writer)?;
            }
            BranchInstruction::Jsr(lbl) => {
                0xa8u8.serialize(writer)?;
                short(*lbl)?.serialize(writer)?;
            }
            BranchInstruction::Ret(idx) => match u8::try_from(*idx) {
                Ok(idx) => {
                    0xa9u8.serialize(writer)?;
                    idx.serialize(writer)?;
                }
                Err(_) => {
                    0xc4u8.serialize(writer)?;
                    0xa9u8.serialize(writer)?;
                    idx.serialize(writer)?;
                }
            },
            BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                0xaau8.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for target in targets {
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                0xabu8.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                (targets.len() as i32).serialize(writer)?;
                for (key, target) in targets {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::IReturn => 0xacu8.serialize(writer)?,
            BranchInstruction::LReturn => 0xadu8.serialize(writer)?,
            BranchInstruction::FReturn => 0xaeu8.serialize(writer)?,
            BranchInstruction::DReturn => 0xafu8.serialize(writer)?,
            BranchInstruction::AReturn => 0xb0u8.serialize(writer)?,
            BranchInstruction::Return => 0xb1u8.serialize(writer)?,
            BranchInstruction::AThrow => 0xbfu8.serialize(writer)?,
        }
        Ok(())
    }
}

impl Serialize for Instruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        /* Serialize a load or store instruction
         *
         *   - short form (0-3) have special bytes
         *   - normal form (0-255) use `iload` plus a byte operand
         *   - wide form (255-65535) use `wide iload` plus two byte operands
         */
        fn serialize_load_or_store<W: WriteBytesExt>(
            idx: u16,
            short_form_start: u8,
            normal_form: u8,
            writer: &mut W,
        ) -> std::io::Result<()> {
            match u8::try_from(idx) {
                Ok(n @ 0..=3) => (short_form_start + n).serialize(writer),
                Ok(n) => {
                    normal_form.serialize(writer)?;
                    n.serialize(writer)
                }
                Err(_) => {
                    0xC4u8.serialize(writer)?;
                    normal_form.serialize(writer)?;
                    idx.serialize(writer)
                }
            }
        }

        let simple: u8 = match self {
            Instruction::Nop => 0x00,
            Instruction::AConstNull => 0x01,
            Instruction::IConstM1 => 0x02,
            Instruction::IConst0 => 0x03,
            Instruction::IConst1 => 0x04,
            Instruction::IConst2 => 0x05,
            Instruction::IConst3 => 0x06,
            Instruction::IConst4 => 0x07,
            Instruction::IConst5 => 0x08,
            Instruction::LConst0 => 0x09,
            Instruction::LConst1 => 0x0a,
            Instruction::FConst0 => 0x0b,
            Instruction::FConst1 => 0x0c,
            Instruction::FConst2 => 0x0d,
            Instruction::DConst0 => 0x0e,
            Instruction::DConst1 => 0x0f,
            Instruction::IALoad => 0x2e,
            Instruction::LALoad => 0x2f,
            Instruction::FALoad => 0x30,
            Instruction::DALoad => 0x31,
            Instruction::AALoad => 0x32,
            Instruction::BALoad => 0x33,
            Instruction::CALoad => 0x34,
            Instruction::SALoad => 0x35,
            Instruction::IAStore => 0x4f,
            Instruction::LAStore => 0x50,
            Instruction::FAStore => 0x51,
            Instruction::DAStore => 0x52,
            Instruction::AAStore => 0x53,
            Instruction::BAStore => 0x54,
            Instruction::CAStore => 0x55,
            Instruction::SAStore => 0x56,
            Instruction::Pop => 0x57,
            Instruction::Pop2 => 0x58,
            Instruction::Dup => 0x59,
            Instruction::DupX1 => 0x5a,
            Instruction::DupX2 => 0x5b,
            Instruction::Dup2 => 0x5c,
            Instruction::Dup2X1 => 0x5d,
            Instruction::Dup2X2 => 0x5e,
            Instruction::Swap => 0x5f,
            Instruction::IAdd => 0x60,
            Instruction::LAdd => 0x61,
            Instruction::FAdd => 0x62,
            Instruction::DAdd => 0x63,
            Instruction::ISub => 0x64,
            Instruction::LSub => 0x65,
            Instruction::FSub => 0x66,
            Instruction::DSub => 0x67,
            Instruction::IMul => 0x68,
            Instruction::LMul => 0x69,
            Instruction::FMul => 0x6a,
            Instruction::DMul => 0x6b,
            Instruction::IDiv => 0x6c,
            Instruction::LDiv => 0x6d,
            Instruction::FDiv => 0x6e,
            Instruction::DDiv => 0x6f,
            Instruction::IRem => 0x70,
            Instruction::LRem => 0x71,
            Instruction::FRem => 0x72,
            Instruction::DRem => 0x73,
            Instruction::INeg => 0x74,
            Instruction::LNeg => 0x75,
            Instruction::FNeg => 0x76,
            Instruction::DNeg => 0x77,
            Instruction::ISh(ShiftType::Left) => 0x78,
            Instruction::LSh(ShiftType::Left) => 0x79,
            Instruction::ISh(ShiftType::ArithmeticRight) => 0x7a,
            Instruction::LSh(ShiftType::ArithmeticRight) => 0x7b,
            Instruction::ISh(ShiftType::LogicalRight) => 0x7c,
            Instruction::LSh(ShiftType::LogicalRight) => 0x7d,
            Instruction::IAnd => 0x7e,
            Instruction::LAnd => 0x7f,
            Instruction::IOr => 0x80,
            Instruction::LOr => 0x81,
            Instruction::IXor => 0x82,
            Instruction::LXor => 0x83,
            Instruction::I2L => 0x85,
            Instruction::I2F => 0x86,
            Instruction::I2D => 0x87,
            Instruction::L2I => 0x88,
            Instruction::L2F => 0x89,
            Instruction::L2D => 0x8a,
            Instruction::F2I => 0x8b,
            Instruction::F2L => 0x8c,
            Instruction::F2D => 0x8d,
            Instruction::D2I => 0x8e,
            Instruction::D2L => 0x8f,
            Instruction::D2F => 0x90,
            Instruction::I2B => 0x91,
            Instruction::I2C => 0x92,
            Instruction::I2S => 0x93,
            Instruction::LCmp => 0x94,
            Instruction::FCmp(CompareMode::L) => 0x95,
            Instruction::FCmp(CompareMode::G) => 0x96,
            Instruction::DCmp(CompareMode::L) => 0x97,
            Instruction::DCmp(CompareMode::G) => 0x98,
            Instruction::ArrayLength => 0xbe,
            Instruction::MonitorEnter => 0xc2,
            Instruction::MonitorExit => 0xc3,

            Instruction::BiPush(b) => {
                0x10u8.serialize(writer)?;
                return b.serialize(writer);
            }
            Instruction::SiPush(s) => {
                0x11u8.serialize(writer)?;
                return s.serialize(writer);
            }
            Instruction::Ldc(ConstantIndex(idx)) => {
                return match u8::try_from(*idx) {
                    Ok(b) => {
                        0x12u8.serialize(writer)?;
                        b.serialize(writer)
                    }
                    Err(_) => {
                        0x13u8.serialize(writer)?;
                        idx.serialize(writer)
                    }
                }
            }
            Instruction::Ldc2(idx) => {
                0x14u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::ILoad(idx) => return serialize_load_or_store(*idx, 0x1A, 0x15, writer),
            Instruction::LLoad(idx) => return serialize_load_or_store(*idx, 0x1E, 0x16, writer),
            Instruction::FLoad(idx) => return serialize_load_or_store(*idx, 0x22, 0x17, writer),
            Instruction::DLoad(idx) => return serialize_load_or_store(*idx, 0x26, 0x18, writer),
            Instruction::ALoad(idx) => return serialize_load_or_store(*idx, 0x2A, 0x19, writer),
            Instruction::IStore(idx) => return serialize_load_or_store(*idx, 0x3B, 0x36, writer),
            Instruction::LStore(idx) => return serialize_load_or_store(*idx, 0x3F, 0x37, writer),
            Instruction::FStore(idx) => return serialize_load_or_store(*idx, 0x43, 0x38, writer),
            Instruction::DStore(idx) => return serialize_load_or_store(*idx, 0x47, 0x39, writer),
            Instruction::AStore(idx) => return serialize_load_or_store(*idx, 0x4B, 0x3A, writer),
            Instruction::IInc(idx, diff) => {
                return match (u8::try_from(*idx), i8::try_from(*diff)) {
                    (Ok(b), Ok(d)) => {
                        0x84u8.serialize(writer)?;
                        b.serialize(writer)?;
                        d.serialize(writer)
                    }
                    _ => {
                        0xc4u8.serialize(writer)?;
                        0x84u8.serialize(writer)?;
                        idx.serialize(writer)?;
                        diff.serialize(writer)
                    }
                }
            }
            Instruction::GetStatic(idx) => {
                0xb2u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::PutStatic(idx) => {
                0xb3u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::GetField(idx) => {
                0xb4u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::PutField(idx) => {
                0xb5u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Virtual, idx) => {
                0xb6u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Special, idx) => {
                0xb7u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Static, idx) => {
                0xb8u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Interface(cnt), idx) => {
                0xb9u8.serialize(writer)?;
                idx.serialize(writer)?;
                cnt.serialize(writer)?;
                return 0u8.serialize(writer);
            }
            Instruction::InvokeDynamic(idx) => {
                0xbau8.serialize(writer)?;
                idx.serialize(writer)?;
                return 0u16.serialize(writer);
            }
            Instruction::New(idx) => {
                0xbbu8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::NewArray(base_type) => {
                let atype = ARRAY_TYPES
                    .iter()
                    .position(|typ| typ == base_type)
                    .map_or(0, |pos| pos as u8 + 4);
                0xbcu8.serialize(writer)?;
                return atype.serialize(writer);
            }
            Instruction::ANewArray(idx) => {
                0xbdu8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::CheckCast(idx) => {
                0xc0u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::InstanceOf(idx) => {
                0xc1u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::MultiANewArray(idx, dimensions) => {
                0xc5u8.serialize(writer)?;
                idx.serialize(writer)?;
                return dimensions.serialize(writer);
            }
        };
        simple.serialize(writer)
    }
}
