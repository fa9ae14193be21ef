//! Abstract instruction stream handed to the backend
//!
//! Instructions refer to classes, members and constants symbolically and
//! to branch targets through [`Label`]s. The backend allocates constant
//! pool entries, picks instruction encodings and resolves offsets.

use crate::types::PrimitiveKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

/// Loadable constant for `ldc`/`ldc_w`/`ldc2_w`
#[derive(Debug, Clone, PartialEq)]
pub enum LdcConst {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Class constant: internal name or array descriptor
    Class(String),
}

impl LdcConst {
    pub fn is_wide(&self) -> bool {
        matches!(self, LdcConst::Long(_) | LdcConst::Double(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Binds a label to the next instruction's offset
    Label(Label),
    /// Source line for the next instruction
    Line(u16),
    /// Instruction without operands (arithmetic, array access, dup, return ...)
    Op(u8),
    /// Integer constant; encoded as iconst, bipush, sipush or ldc
    Push(i32),
    Ldc(LdcConst),
    /// Load or store; `op` is one of ILOAD..ALOAD or ISTORE..ASTORE
    Local { op: u8, slot: u16 },
    Iinc { slot: u16, delta: i16 },
    /// NEW, ANEWARRAY, CHECKCAST or INSTANCEOF
    Type { op: u8, class: String },
    Field { op: u8, owner: String, name: String, descriptor: String },
    Invoke { op: u8, owner: String, name: String, descriptor: String, interface: bool },
    NewArray(PrimitiveKind),
    MultiANewArray { descriptor: String, dims: u8 },
    /// Conditional or unconditional branch; widened automatically
    Jump { op: u8, target: Label },
    /// tableswitch or lookupswitch, chosen by the assembler
    Switch { default: Label, cases: Vec<(i32, Label)> },
}

impl Insn {
    /// Whether the instruction occupies bytes in the code array
    pub fn is_real(&self) -> bool {
        !matches!(self, Insn::Label(_) | Insn::Line(_))
    }
}
