use crate::vm::Value;
use std::fmt::{self, Display};

/// One opcode with its operands. Branch targets stored in the global
/// instruction vector are absolute indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Nop,
    Line(u32),
    LoadConst(Value),
    PushNull,
    LoadLocal { slot: usize, name: String },
    StoreLocal { slot: usize, name: String },
    New { class: String },
    NewArray { elem: String, dims: usize },
    ArrayLength,
    ArrayLoad,
    ArrayStore,
    GetField { name: String },
    PutField { name: String },
    GetStatic { class: String, name: String },
    PutStatic { class: String, name: String },
    Dup,
    DupX1,
    Pop,
    Swap,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    And,
    Or,
    Not,
    Goto(usize),
    IfTrue(usize),
    IfFalse(usize),
    InvokeVirtual { method: String, argc: usize },
    InvokeInterface { method: String, argc: usize },
    InvokeSpecial { method: String, argc: usize },
    InvokeStatic { class: String, method: String, argc: usize },
    Return,
    ReturnValue,
    CheckCast { ty: String },
    InstanceOf { ty: String },
    LambdaCreate { info: String },
    LambdaInvoke,
    Print { newline: bool },
    Throw,
    MonitorEnter,
    MonitorExit,
}

impl Op {
    /// Branch-like opcodes manage the program counter themselves; every
    /// other opcode advances it by one after dispatch.
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Op::Goto(_)
                | Op::IfTrue(_)
                | Op::IfFalse(_)
                | Op::InvokeVirtual { .. }
                | Op::InvokeInterface { .. }
                | Op::InvokeSpecial { .. }
                | Op::InvokeStatic { .. }
                | Op::Return
                | Op::ReturnValue
                | Op::Throw
                | Op::MonitorEnter
        )
    }

    /// Rewrites a local label id into its resolved absolute target.
    pub(crate) fn retarget(&mut self, map: impl Fn(usize) -> usize) {
        match self {
            Op::Goto(target) | Op::IfTrue(target) | Op::IfFalse(target) => {
                *target = map(*target);
            }
            _ => {}
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Nop => write!(f, "NOP"),
            Op::Line(n) => write!(f, "LINE {}", n),
            Op::LoadConst(v) => write!(f, "LOAD_CONST {}", v.literal_text()),
            Op::PushNull => write!(f, "PUSH_NULL"),
            Op::LoadLocal { slot, name } => write!(f, "LOAD_LOCAL {} ({})", slot, name),
            Op::StoreLocal { slot, name } => write!(f, "STORE_LOCAL {} ({})", slot, name),
            Op::New { class } => write!(f, "NEW {}", class),
            Op::NewArray { elem, dims } => write!(f, "NEWARRAY {} dims={}", elem, dims),
            Op::ArrayLength => write!(f, "ARRAYLENGTH"),
            Op::ArrayLoad => write!(f, "ARRAYLOAD"),
            Op::ArrayStore => write!(f, "ARRAYSTORE"),
            Op::GetField { name } => write!(f, "GETFIELD {}", name),
            Op::PutField { name } => write!(f, "PUTFIELD {}", name),
            Op::GetStatic { class, name } => write!(f, "GETSTATIC {}.{}", class, name),
            Op::PutStatic { class, name } => write!(f, "PUTSTATIC {}.{}", class, name),
            Op::Dup => write!(f, "DUP"),
            Op::DupX1 => write!(f, "DUP_X1"),
            Op::Pop => write!(f, "POP"),
            Op::Swap => write!(f, "SWAP"),
            Op::Add => write!(f, "ADD"),
            Op::Sub => write!(f, "SUB"),
            Op::Mul => write!(f, "MUL"),
            Op::Div => write!(f, "DIV"),
            Op::Mod => write!(f, "MOD"),
            Op::Neg => write!(f, "NEG"),
            Op::CmpEq => write!(f, "CMP_EQ"),
            Op::CmpNe => write!(f, "CMP_NE"),
            Op::CmpLt => write!(f, "CMP_LT"),
            Op::CmpLe => write!(f, "CMP_LE"),
            Op::CmpGt => write!(f, "CMP_GT"),
            Op::CmpGe => write!(f, "CMP_GE"),
            Op::And => write!(f, "AND"),
            Op::Or => write!(f, "OR"),
            Op::Not => write!(f, "NOT"),
            Op::Goto(target) => write!(f, "GOTO {}", target),
            Op::IfTrue(target) => write!(f, "IF_TRUE {}", target),
            Op::IfFalse(target) => write!(f, "IF_FALSE {}", target),
            Op::InvokeVirtual { method, argc } => {
                write!(f, "INVOKE_VIRTUAL {}/{}", method, argc)
            }
            Op::InvokeInterface { method, argc } => {
                write!(f, "INVOKE_INTERFACE {}/{}", method, argc)
            }
            Op::InvokeSpecial { method, argc } => {
                write!(f, "INVOKE_SPECIAL {}/{}", method, argc)
            }
            Op::InvokeStatic {
                class,
                method,
                argc,
            } => write!(f, "INVOKE_STATIC {}.{}/{}", class, method, argc),
            Op::Return => write!(f, "RETURN"),
            Op::ReturnValue => write!(f, "RETURN_VALUE"),
            Op::CheckCast { ty } => write!(f, "CHECKCAST {}", ty),
            Op::InstanceOf { ty } => write!(f, "INSTANCEOF {}", ty),
            Op::LambdaCreate { info } => write!(f, "LAMBDA_CREATE {}", info),
            Op::LambdaInvoke => write!(f, "LAMBDA_INVOKE"),
            Op::Print { newline: true } => write!(f, "PRINTLN"),
            Op::Print { newline: false } => write!(f, "PRINT"),
            Op::Throw => write!(f, "THROW"),
            Op::MonitorEnter => write!(f, "MONITORENTER"),
            Op::MonitorExit => write!(f, "MONITOREXIT"),
        }
    }
}

/// One element of the flat global instruction vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub line: u32,
}

impl Instruction {
    pub fn new(op: Op, line: u32) -> Self {
        Self { op, line }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)
    }
}

/// Renders the instruction vector with offsets, one instruction per line.
pub fn disassemble(instructions: &[Instruction]) -> String {
    use itertools::Itertools;
    instructions
        .iter()
        .enumerate()
        .map(|(offset, instruction)| format!("{:5}  {}", offset, instruction))
        .join("\n")
}
