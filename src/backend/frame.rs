//! StackMapTable frames and their compressed encoding

use super::analyzer::VType;
use super::constpool::ConstantPool;
use super::error::BackendResult;

/// VerificationTypeInfo as defined in JVMS 4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// cpool index to CONSTANT_Class
    Object(u16),
    /// offset of the `new` instruction
    Uninitialized(u16),
}

impl VerificationType {
    pub fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            VerificationType::Top => bytes.push(0),
            VerificationType::Integer => bytes.push(1),
            VerificationType::Float => bytes.push(2),
            VerificationType::Double => bytes.push(3),
            VerificationType::Long => bytes.push(4),
            VerificationType::Null => bytes.push(5),
            VerificationType::UninitializedThis => bytes.push(6),
            VerificationType::Object(cp_index) => {
                bytes.push(7);
                bytes.extend_from_slice(&cp_index.to_be_bytes());
            }
            VerificationType::Uninitialized(offset) => {
                bytes.push(8);
                bytes.extend_from_slice(&offset.to_be_bytes());
            }
        }
    }

    fn from_vtype(v: &VType, cp: &mut ConstantPool) -> BackendResult<Self> {
        Ok(match v {
            VType::Top => VerificationType::Top,
            VType::Int => VerificationType::Integer,
            VType::Float => VerificationType::Float,
            VType::Long => VerificationType::Long,
            VType::Double => VerificationType::Double,
            VType::Null => VerificationType::Null,
            VType::UninitThis => VerificationType::UninitializedThis,
            VType::Uninit(offset) => VerificationType::Uninitialized(*offset),
            VType::Object(name) => VerificationType::Object(cp.add_class(name)?),
        })
    }
}

/// StackMapFrame variants as defined in JVMS 4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same { offset_delta: u16 },
    SameLocals1StackItem { offset_delta: u16, stack: VerificationType },
    /// k in {1,2,3}
    Chop { k: u8, offset_delta: u16 },
    Append { offset_delta: u16, locals: Vec<VerificationType> },
    Full { offset_delta: u16, locals: Vec<VerificationType>, stack: Vec<VerificationType> },
}

impl StackMapFrame {
    pub fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            StackMapFrame::Same { offset_delta } => {
                if *offset_delta <= 63 {
                    bytes.push(*offset_delta as u8);
                } else {
                    bytes.push(251); // same_frame_extended
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
            }
            StackMapFrame::SameLocals1StackItem { offset_delta, stack } => {
                if *offset_delta <= 63 {
                    bytes.push(64 + *offset_delta as u8);
                } else {
                    bytes.push(247); // same_locals_1_stack_item_frame_extended
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
                stack.write_to(bytes);
            }
            StackMapFrame::Chop { k, offset_delta } => {
                bytes.push(251 - k);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
            }
            StackMapFrame::Append { offset_delta, locals } => {
                bytes.push(251 + locals.len() as u8);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                for l in locals {
                    l.write_to(bytes);
                }
            }
            StackMapFrame::Full { offset_delta, locals, stack } => {
                bytes.push(255);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                bytes.extend_from_slice(&(locals.len() as u16).to_be_bytes());
                for l in locals {
                    l.write_to(bytes);
                }
                bytes.extend_from_slice(&(stack.len() as u16).to_be_bytes());
                for s in stack {
                    s.write_to(bytes);
                }
            }
        }
    }
}

/// Frame state at one code offset, locals in slot order
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAt {
    pub offset: u32,
    pub locals: Vec<VType>,
    pub stack: Vec<VType>,
}

/// Locals as listed in a frame: wide values occupy one entry and trailing
/// tops are dropped
fn frame_locals(slots: &[VType]) -> Vec<VType> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < slots.len() {
        out.push(slots[i].clone());
        i += if slots[i].is_wide() { 2 } else { 1 };
    }
    while out.last() == Some(&VType::Top) {
        out.pop();
    }
    out
}

/// Compress absolute frames (sorted by offset) into StackMapTable entries
pub fn compress_frames(initial: &[VType], frames: &[FrameAt], cp: &mut ConstantPool) -> BackendResult<Vec<StackMapFrame>> {
    let convert = |vs: &[VType], cp: &mut ConstantPool| -> BackendResult<Vec<VerificationType>> {
        vs.iter().map(|v| VerificationType::from_vtype(v, cp)).collect()
    };
    let mut out = Vec::with_capacity(frames.len());
    let mut prev_locals = frame_locals(initial);
    let mut prev_offset: Option<u32> = None;
    for f in frames {
        let offset_delta = match prev_offset {
            None => f.offset,
            Some(p) => f.offset - p - 1,
        } as u16;
        let locals = frame_locals(&f.locals);
        let frame = if f.stack.is_empty() && locals == prev_locals {
            StackMapFrame::Same { offset_delta }
        } else if f.stack.len() == 1 && locals == prev_locals {
            StackMapFrame::SameLocals1StackItem { offset_delta, stack: VerificationType::from_vtype(&f.stack[0], cp)? }
        } else if f.stack.is_empty() && locals.len() > prev_locals.len() && locals.len() - prev_locals.len() <= 3
            && locals[..prev_locals.len()] == prev_locals[..]
        {
            StackMapFrame::Append { offset_delta, locals: convert(&locals[prev_locals.len()..], cp)? }
        } else if f.stack.is_empty() && locals.len() < prev_locals.len() && prev_locals.len() - locals.len() <= 3
            && prev_locals[..locals.len()] == locals[..]
        {
            StackMapFrame::Chop { k: (prev_locals.len() - locals.len()) as u8, offset_delta }
        } else {
            StackMapFrame::Full { offset_delta, locals: convert(&locals, cp)?, stack: convert(&f.stack, cp)? }
        };
        out.push(frame);
        prev_locals = locals;
        prev_offset = Some(f.offset);
    }
    Ok(out)
}

/// Encode a StackMapTable attribute payload
pub fn encode_table(frames: &[StackMapFrame]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(frames.len() as u16).to_be_bytes());
    for f in frames {
        f.write_to(&mut bytes);
    }
    bytes
}
