use super::{BranchInstruction, CodeInstruction, Instruction, InvokeType};
use crate::jvm::class_file::ClassFile;
use crate::jvm::Error;
use crate::util::Width;

/// Operand stack slots consumed and produced by an instruction
///
/// Values of type `long` and `double` occupy two slots. The `dup` family is described as
/// consuming the values it copies and producing them back along with the copies, so `dup`
/// consumes 1 and produces 2.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackEffect {
    pub consumed: usize,
    pub produced: usize,
}

impl StackEffect {
    const fn new(consumed: usize, produced: usize) -> StackEffect {
        StackEffect { consumed, produced }
    }
}

impl Instruction {
    /// Stack effect of the instruction
    ///
    /// Field and method instructions need the class they occur in, to look up the descriptor
    /// of the referenced member.
    pub fn stack_effect(&self, class: &ClassFile) -> Result<StackEffect, Error> {
        use Instruction::*;

        let effect = match self {
            Nop | IInc(_, _) => StackEffect::new(0, 0),

            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) | Ldc(_) | ILoad(_)
            | FLoad(_) | ALoad(_) | New(_) => StackEffect::new(0, 1),
            LConst0 | LConst1 | DConst0 | DConst1 | Ldc2(_) | LLoad(_) | DLoad(_) => {
                StackEffect::new(0, 2)
            }

            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => StackEffect::new(2, 1),
            LALoad | DALoad => StackEffect::new(2, 2),

            IStore(_) | FStore(_) | AStore(_) | Pop | MonitorEnter | MonitorExit => {
                StackEffect::new(1, 0)
            }
            LStore(_) | DStore(_) | Pop2 => StackEffect::new(2, 0),
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => StackEffect::new(3, 0),
            LAStore | DAStore => StackEffect::new(4, 0),

            Dup => StackEffect::new(1, 2),
            DupX1 => StackEffect::new(2, 3),
            DupX2 => StackEffect::new(3, 4),
            Dup2 => StackEffect::new(2, 4),
            Dup2X1 => StackEffect::new(3, 5),
            Dup2X2 => StackEffect::new(4, 6),
            Swap => StackEffect::new(2, 2),

            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem | ISh(_)
            | IAnd | IOr | IXor | FCmp(_) => StackEffect::new(2, 1),
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem | LAnd | LOr
            | LXor => StackEffect::new(4, 2),
            LSh(_) => StackEffect::new(3, 2),
            LCmp | DCmp(_) => StackEffect::new(4, 1),

            INeg | FNeg | I2F | F2I | I2B | I2C | I2S => StackEffect::new(1, 1),
            LNeg | DNeg | L2D | D2L => StackEffect::new(2, 2),
            I2L | I2D | F2L | F2D => StackEffect::new(1, 2),
            L2I | L2F | D2I | D2F => StackEffect::new(2, 1),

            NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => {
                StackEffect::new(1, 1)
            }
            MultiANewArray(_, dimensions) => StackEffect::new(*dimensions as usize, 1),

            GetStatic(field) => StackEffect::new(0, class.field_ref(*field)?.descriptor.width()),
            PutStatic(field) => StackEffect::new(class.field_ref(*field)?.descriptor.width(), 0),
            GetField(field) => StackEffect::new(1, class.field_ref(*field)?.descriptor.width()),
            PutField(field) => {
                StackEffect::new(1 + class.field_ref(*field)?.descriptor.width(), 0)
            }

            Invoke(invoke_type, method) => {
                let descriptor = class.method_ref(*method)?.descriptor;
                let has_receiver = *invoke_type != InvokeType::Static;
                StackEffect::new(
                    descriptor.parameter_length(has_receiver),
                    descriptor.return_length(),
                )
            }
            InvokeDynamic(call_site) => {
                let descriptor = class.invoke_dynamic(*call_site)?.descriptor;
                StackEffect::new(descriptor.parameter_length(false), descriptor.return_length())
            }
        };
        Ok(effect)
    }
}

impl<Lbl> BranchInstruction<Lbl> {
    pub fn stack_effect(&self) -> StackEffect {
        use BranchInstruction::*;

        match self {
            If(_, _) | IfNull(_, _) | TableSwitch { .. } | LookupSwitch { .. } => {
                StackEffect::new(1, 0)
            }
            IfICmp(_, _) | IfACmp(_, _) => StackEffect::new(2, 0),
            Goto(_) | Ret(_) | Return => StackEffect::new(0, 0),
            Jsr(_) => StackEffect::new(0, 1),
            IReturn | FReturn | AReturn | AThrow => StackEffect::new(1, 0),
            LReturn | DReturn => StackEffect::new(2, 0),
        }
    }
}

impl<Lbl> CodeInstruction<Lbl> {
    pub fn stack_effect(&self, class: &ClassFile) -> Result<StackEffect, Error> {
        match self {
            CodeInstruction::Regular(insn) => insn.stack_effect(class),
            CodeInstruction::Branch(branch) => Ok(branch.stack_effect()),
        }
    }
}
