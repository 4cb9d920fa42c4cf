use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Default,
    EnumString,
    EnumIter,
    Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    #[default]
    Nop,
    Push,
    PushConst,
    LoadName,
    StoreName,
    LoadLocal,
    StoreLocal,
    Pop,
    Dup,
    Swap,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Inc,
    Dec,
    Not,
    Eq,
    Lt,
    Gt,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    PopJumpIfFalse,
    PopJumpIfTrue,
    Call,
    Return,
    Halt,
}

impl Opcode {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().parse::<Self>() {
            Ok(op) => Ok(op),
            Err(_) => Err(format!("Undefined opcode: {s}")),
        }
    }
}

/// What the operand slot of an instruction holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OperandKind {
    /// Signed immediate.
    Imm,
    /// Index into the constant pool.
    Const,
    /// Index into the name table.
    Name,
    /// Local slot number.
    Local,
    /// Argument count.
    Count,
    /// Jump target, encoded as a signed displacement from the end of the instruction.
    Label,
}

impl OperandKind {
    pub fn is_signed(self) -> bool {
        matches!(self, OperandKind::Imm | OperandKind::Label)
    }
}

impl Opcode {
    pub fn operand(&self) -> Option<OperandKind> {
        use Opcode::*;
        match self {
            Push => Some(OperandKind::Imm),
            PushConst => Some(OperandKind::Const),
            LoadName | StoreName => Some(OperandKind::Name),
            LoadLocal | StoreLocal => Some(OperandKind::Local),
            Jump | JumpIfFalse | JumpIfTrue | PopJumpIfFalse | PopJumpIfTrue => {
                Some(OperandKind::Label)
            }
            Call => Some(OperandKind::Count),
            Nop | Pop | Dup | Swap | Add | Sub | Mul | Div | Rem | Neg | Inc | Dec | Not | Eq
            | Lt | Gt | Return | Halt => None,
        }
    }

    pub fn flow(&self) -> Flow {
        use Opcode::*;
        match self {
            Jump => Flow::Jump,
            JumpIfFalse | JumpIfTrue | PopJumpIfFalse | PopJumpIfTrue => Flow::Branch,
            Return | Halt => Flow::Stop,
            _ => Flow::Next,
        }
    }

    pub fn effect(&self) -> StackEffect {
        use Opcode::*;
        let fixed = |pop, push| StackEffect::Fixed(Effect { pop, push });
        match self {
            Nop | Jump | Halt => fixed(0, 0),
            Push | PushConst | LoadName | LoadLocal => fixed(0, 1),
            StoreName | StoreLocal | Pop | Return => fixed(1, 0),
            Dup => fixed(1, 2),
            Swap => fixed(2, 2),
            Add | Sub | Mul | Div | Rem | Eq | Lt | Gt => fixed(2, 1),
            Neg | Inc | Dec | Not => fixed(1, 1),
            JumpIfFalse | JumpIfTrue => StackEffect::Branch {
                taken: Effect { pop: 1, push: 1 },
                fallthrough: Effect { pop: 1, push: 0 },
            },
            PopJumpIfFalse | PopJumpIfTrue => fixed(1, 0),
            Call => StackEffect::Call,
        }
    }
}

// ----------------------------------------------------------------------------
// Control flow & stack effect

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Falls through to the next instruction.
    Next,
    /// Always transfers to the label operand.
    Jump,
    /// Either transfers to the label operand or falls through.
    Branch,
    /// Ends execution of the unit.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Fallthrough,
    Taken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Effect {
    pub pop: u32,
    pub push: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    Fixed(Effect),
    /// Different effect per outgoing edge.
    Branch { taken: Effect, fallthrough: Effect },
    /// Pops the callee and `count` arguments, pushes the result.
    Call,
}

impl StackEffect {
    /// Effect along `edge`. `count` is the operand of `call`.
    pub fn on(&self, edge: Edge, count: u32) -> Effect {
        match (self, edge) {
            (StackEffect::Fixed(e), _) => *e,
            (StackEffect::Branch { taken, .. }, Edge::Taken) => *taken,
            (StackEffect::Branch { fallthrough, .. }, Edge::Fallthrough) => *fallthrough,
            (StackEffect::Call, _) => Effect {
                pop: count.saturating_add(1),
                push: 1,
            },
        }
    }
}
