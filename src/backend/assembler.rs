//! Instruction layout and encoding
//!
//! Labels are resolved by iterative layout: every branch starts in its
//! short form and is widened when its displacement does not fit in 16
//! bits, until the layout is stable. A widened conditional branch becomes
//! the negated condition jumping over a `goto_w`.

use std::collections::{HashMap, HashSet};

use super::constpool::ConstantPool;
use super::error::{BackendError, BackendResult};
use super::insn::{Insn, Label, LdcConst};
use super::opcodes::{self, array_types};
use crate::types::PrimitiveKind;

/// Maximum size of a method's code array
pub const MAX_CODE_LENGTH: u32 = 65535;

#[derive(Debug, Clone)]
pub struct Assembled {
    pub code: Vec<u8>,
    /// Start offset of each instruction; labels and lines get the offset of
    /// the next real instruction. One extra entry holds the code length.
    pub offsets: Vec<u32>,
    /// Instruction index each label is bound to
    pub labels: HashMap<Label, usize>,
    /// Conditional branches that were widened
    pub widened: HashSet<usize>,
    /// (start_pc, line) pairs
    pub lines: Vec<(u16, u16)>,
}

impl Assembled {
    pub fn label_index(&self, label: Label) -> BackendResult<usize> {
        self.labels.get(&label).copied().ok_or(BackendError::UnresolvedLabel { label: label.0 })
    }

    pub fn label_offset(&self, label: Label) -> BackendResult<u32> {
        Ok(self.offsets[self.label_index(label)?])
    }
}

/// Switch encoding chosen by javac's cost heuristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchKind {
    Table { low: i32, high: i32 },
    Lookup,
}

pub fn choose_switch(keys: &[i32]) -> SwitchKind {
    let (Some(&low), Some(&high)) = (keys.iter().min(), keys.iter().max()) else {
        return SwitchKind::Lookup;
    };
    let n = keys.len() as i64;
    let table_space = 4 + (i64::from(high) - i64::from(low) + 1);
    let table_time = 3;
    let lookup_space = 3 + 2 * n;
    let lookup_time = n;
    if table_space + 3 * table_time <= lookup_space + 3 * lookup_time {
        SwitchKind::Table { low, high }
    } else {
        SwitchKind::Lookup
    }
}

fn is_wide_local(slot: u16) -> bool {
    slot > 255
}

fn local_short_form(op: u8, slot: u16) -> Option<u8> {
    if slot > 3 {
        return None;
    }
    let slot = slot as u8;
    match op {
        opcodes::ILOAD..=opcodes::ALOAD => Some(opcodes::ILOAD_0 + (op - opcodes::ILOAD) * 4 + slot),
        opcodes::ISTORE..=opcodes::ASTORE => Some(opcodes::ISTORE_0 + (op - opcodes::ISTORE) * 4 + slot),
        _ => None,
    }
}

fn array_type_code(kind: PrimitiveKind) -> u8 {
    match kind {
        PrimitiveKind::Boolean => array_types::T_BOOLEAN,
        PrimitiveKind::Char => array_types::T_CHAR,
        PrimitiveKind::Float => array_types::T_FLOAT,
        PrimitiveKind::Double => array_types::T_DOUBLE,
        PrimitiveKind::Byte => array_types::T_BYTE,
        PrimitiveKind::Short => array_types::T_SHORT,
        PrimitiveKind::Long => array_types::T_LONG,
        PrimitiveKind::Int | PrimitiveKind::Void => array_types::T_INT,
    }
}

fn push_fits_inline(v: i32) -> bool {
    i16::try_from(v).is_ok()
}

fn pad(offset: u32) -> u32 {
    (4 - (offset + 1) % 4) % 4
}

/// Sorted, deduplicated switch cases
fn sorted_cases(cases: &[(i32, Label)]) -> Vec<(i32, Label)> {
    let mut sorted = cases.to_vec();
    sorted.sort_by_key(|(k, _)| *k);
    sorted.dedup_by_key(|(k, _)| *k);
    sorted
}

/// Resolve constant pool operands ahead of layout so `ldc` widths are known
fn pool_operands(insns: &[Insn], cp: &mut ConstantPool) -> BackendResult<Vec<u16>> {
    insns
        .iter()
        .map(|insn| match insn {
            Insn::Push(v) if !push_fits_inline(*v) => cp.add_integer(*v),
            Insn::Ldc(c) => match c {
                LdcConst::Int(v) => cp.add_integer(*v),
                LdcConst::Float(v) => cp.add_float(*v),
                LdcConst::Long(v) => cp.add_long(*v),
                LdcConst::Double(v) => cp.add_double(*v),
                LdcConst::String(s) => cp.add_string(s),
                LdcConst::Class(name) => cp.add_class(name),
            },
            Insn::Type { class, .. } => cp.add_class(class),
            Insn::Field { owner, name, descriptor, .. } => cp.add_field_ref(owner, name, descriptor),
            Insn::Invoke { owner, name, descriptor, interface, .. } => cp.add_method_ref(owner, name, descriptor, *interface),
            Insn::MultiANewArray { descriptor, .. } => cp.add_class(descriptor),
            _ => Ok(0),
        })
        .collect()
}

fn insn_size(insn: &Insn, operand: u16, offset: u32, wide: bool) -> u32 {
    match insn {
        Insn::Label(_) | Insn::Line(_) => 0,
        Insn::Op(_) => 1,
        Insn::Push(v) => match *v {
            -1..=5 => 1,
            v if i8::try_from(v).is_ok() => 2,
            v if push_fits_inline(v) => 3,
            _ if operand < 256 => 2,
            _ => 3,
        },
        Insn::Ldc(c) if c.is_wide() => 3,
        Insn::Ldc(_) => if operand < 256 { 2 } else { 3 },
        Insn::Local { op, slot } => {
            if local_short_form(*op, *slot).is_some() {
                1
            } else if is_wide_local(*slot) {
                4
            } else {
                2
            }
        }
        Insn::Iinc { slot, delta } => {
            if is_wide_local(*slot) || i8::try_from(*delta).is_err() { 6 } else { 3 }
        }
        Insn::Type { .. } | Insn::Field { .. } => 3,
        Insn::Invoke { op, .. } => if *op == opcodes::INVOKEINTERFACE { 5 } else { 3 },
        Insn::NewArray(_) => 2,
        Insn::MultiANewArray { .. } => 4,
        Insn::Jump { op, .. } => match (*op == opcodes::GOTO, wide) {
            (_, false) => 3,
            (true, true) => 5,
            (false, true) => 8,
        },
        Insn::Switch { cases, .. } => {
            let keys: Vec<i32> = sorted_cases(cases).iter().map(|(k, _)| *k).collect();
            let body = match choose_switch(&keys) {
                SwitchKind::Table { low, high } => 12 + 4 * (i64::from(high) - i64::from(low) + 1) as u32,
                SwitchKind::Lookup => 8 + 8 * keys.len() as u32,
            };
            1 + pad(offset) + body
        }
    }
}

fn layout(insns: &[Insn], operands: &[u16], wide: &HashSet<usize>) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(insns.len() + 1);
    let mut offset = 0u32;
    for (i, insn) in insns.iter().enumerate() {
        offsets.push(offset);
        offset += insn_size(insn, operands[i], offset, wide.contains(&i));
    }
    offsets.push(offset);
    offsets
}

/// Lay out and encode one method's instructions
pub fn assemble(insns: &[Insn], cp: &mut ConstantPool, method: &str) -> BackendResult<Assembled> {
    let mut labels = HashMap::new();
    for (i, insn) in insns.iter().enumerate() {
        if let Insn::Label(l) = insn {
            labels.insert(*l, i);
        }
    }
    let resolve = |l: &Label| labels.get(l).copied().ok_or(BackendError::UnresolvedLabel { label: l.0 });
    for insn in insns {
        match insn {
            Insn::Jump { target, .. } => {
                resolve(target)?;
            }
            Insn::Switch { default, cases } => {
                resolve(default)?;
                for (_, l) in cases {
                    resolve(l)?;
                }
            }
            _ => {}
        }
    }

    let operands = pool_operands(insns, cp)?;
    let mut wide = HashSet::new();
    let offsets = loop {
        let offsets = layout(insns, &operands, &wide);
        let mut changed = false;
        for (i, insn) in insns.iter().enumerate() {
            if let Insn::Jump { target, .. } = insn {
                if wide.contains(&i) {
                    continue;
                }
                let disp = i64::from(offsets[resolve(target)?]) - i64::from(offsets[i]);
                if i16::try_from(disp).is_err() {
                    wide.insert(i);
                    changed = true;
                }
            }
        }
        if !changed {
            break offsets;
        }
    };
    let length = offsets[insns.len()];
    if length > MAX_CODE_LENGTH {
        return Err(BackendError::CodeTooLarge { method: method.to_string(), size: length as usize });
    }

    let mut code = Vec::with_capacity(length as usize);
    let mut lines = Vec::new();
    for (i, insn) in insns.iter().enumerate() {
        let here = offsets[i];
        let operand = operands[i];
        let target_disp = |l: &Label| -> BackendResult<i32> { Ok(offsets[resolve(l)?] as i32 - here as i32) };
        match insn {
            Insn::Label(_) => {}
            Insn::Line(line) => {
                let pc = here as u16;
                match lines.last_mut() {
                    Some((last_pc, last_line)) if *last_pc == pc => *last_line = *line,
                    _ => lines.push((pc, *line)),
                }
            }
            Insn::Op(op) => code.push(*op),
            Insn::Push(v) => match *v {
                -1..=5 => code.push((opcodes::ICONST_0 as i32 + v) as u8),
                v if i8::try_from(v).is_ok() => code.extend_from_slice(&[opcodes::BIPUSH, v as i8 as u8]),
                v if push_fits_inline(v) => {
                    code.push(opcodes::SIPUSH);
                    code.extend_from_slice(&(v as i16).to_be_bytes());
                }
                _ => encode_ldc(&mut code, operand, false),
            },
            Insn::Ldc(c) => encode_ldc(&mut code, operand, c.is_wide()),
            Insn::Local { op, slot } => {
                if let Some(short) = local_short_form(*op, *slot) {
                    code.push(short);
                } else if is_wide_local(*slot) {
                    code.extend_from_slice(&[opcodes::WIDE, *op]);
                    code.extend_from_slice(&slot.to_be_bytes());
                } else {
                    code.extend_from_slice(&[*op, *slot as u8]);
                }
            }
            Insn::Iinc { slot, delta } => {
                if is_wide_local(*slot) || i8::try_from(*delta).is_err() {
                    code.extend_from_slice(&[opcodes::WIDE, opcodes::IINC]);
                    code.extend_from_slice(&slot.to_be_bytes());
                    code.extend_from_slice(&delta.to_be_bytes());
                } else {
                    code.extend_from_slice(&[opcodes::IINC, *slot as u8, *delta as i8 as u8]);
                }
            }
            Insn::Type { op, .. } | Insn::Field { op, .. } => {
                code.push(*op);
                code.extend_from_slice(&operand.to_be_bytes());
            }
            Insn::Invoke { op, descriptor, .. } => {
                code.push(*op);
                code.extend_from_slice(&operand.to_be_bytes());
                if *op == opcodes::INVOKEINTERFACE {
                    code.push(interface_arg_count(descriptor)?);
                    code.push(0);
                }
            }
            Insn::NewArray(kind) => code.extend_from_slice(&[opcodes::NEWARRAY, array_type_code(*kind)]),
            Insn::MultiANewArray { dims, .. } => {
                code.push(opcodes::MULTIANEWARRAY);
                code.extend_from_slice(&operand.to_be_bytes());
                code.push(*dims);
            }
            Insn::Jump { op, target } => {
                let disp = target_disp(target)?;
                match (wide.contains(&i), *op == opcodes::GOTO) {
                    (false, _) => {
                        code.push(*op);
                        code.extend_from_slice(&(disp as i16).to_be_bytes());
                    }
                    (true, true) => {
                        code.push(opcodes::GOTO_W);
                        code.extend_from_slice(&disp.to_be_bytes());
                    }
                    (true, false) => {
                        code.push(opcodes::negate_branch(*op));
                        code.extend_from_slice(&8i16.to_be_bytes());
                        code.push(opcodes::GOTO_W);
                        code.extend_from_slice(&(disp - 3).to_be_bytes());
                    }
                }
            }
            Insn::Switch { default, cases } => {
                let cases = sorted_cases(cases);
                let keys: Vec<i32> = cases.iter().map(|(k, _)| *k).collect();
                let kind = choose_switch(&keys);
                code.push(match kind {
                    SwitchKind::Table { .. } => opcodes::TABLESWITCH,
                    SwitchKind::Lookup => opcodes::LOOKUPSWITCH,
                });
                code.extend(std::iter::repeat(0u8).take(pad(here) as usize));
                let default_disp = target_disp(default)?;
                code.extend_from_slice(&default_disp.to_be_bytes());
                match kind {
                    SwitchKind::Table { low, high } => {
                        code.extend_from_slice(&low.to_be_bytes());
                        code.extend_from_slice(&high.to_be_bytes());
                        let by_key: HashMap<i32, Label> = cases.iter().copied().collect();
                        for key in low..=high {
                            let disp = match by_key.get(&key) {
                                Some(l) => target_disp(l)?,
                                None => default_disp,
                            };
                            code.extend_from_slice(&disp.to_be_bytes());
                        }
                    }
                    SwitchKind::Lookup => {
                        code.extend_from_slice(&(cases.len() as u32).to_be_bytes());
                        for (key, l) in &cases {
                            code.extend_from_slice(&key.to_be_bytes());
                            code.extend_from_slice(&target_disp(l)?.to_be_bytes());
                        }
                    }
                }
            }
        }
        debug_assert_eq!(code.len() as u32, offsets[i + 1], "size mismatch encoding {insn:?}");
    }

    if !wide.is_empty() {
        log::debug!("{method}: widened {} branches", wide.len());
    }
    let widened = wide.into_iter().filter(|i| !matches!(insns[*i], Insn::Jump { op: opcodes::GOTO, .. })).collect();
    Ok(Assembled { code, offsets, labels, widened, lines })
}

fn encode_ldc(code: &mut Vec<u8>, index: u16, wide_value: bool) {
    if wide_value {
        code.push(opcodes::LDC2_W);
        code.extend_from_slice(&index.to_be_bytes());
    } else if index < 256 {
        code.extend_from_slice(&[opcodes::LDC, index as u8]);
    } else {
        code.push(opcodes::LDC_W);
        code.extend_from_slice(&index.to_be_bytes());
    }
}

/// `count` operand of invokeinterface: argument slots plus the receiver
fn interface_arg_count(descriptor: &str) -> BackendResult<u8> {
    let (params, _) = crate::types::parse_method_descriptor(descriptor)
        .ok_or_else(|| BackendError::MalformedDescriptor { descriptor: descriptor.to_string() })?;
    let slots: u16 = params.iter().map(|p| p.slot_size()).sum();
    Ok((slots + 1) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_choice_follows_cost_formula() {
        assert_eq!(choose_switch(&[1, 2, 3]), SwitchKind::Table { low: 1, high: 3 });
        assert_eq!(choose_switch(&[1, 1000]), SwitchKind::Lookup);
        assert_eq!(choose_switch(&[]), SwitchKind::Lookup);
        // 4 + 10 + 9 <= 3 + 8 + 12
        assert_eq!(choose_switch(&[0, 3, 6, 9]), SwitchKind::Table { low: 0, high: 9 });
    }

    #[test]
    fn test_push_and_local_forms() {
        let mut cp = ConstantPool::new();
        let insns = vec![
            Insn::Push(3),
            Insn::Push(100),
            Insn::Push(1000),
            Insn::Push(100_000),
            Insn::Local { op: opcodes::ISTORE, slot: 1 },
            Insn::Local { op: opcodes::ILOAD, slot: 7 },
            Insn::Local { op: opcodes::ILOAD, slot: 300 },
        ];
        let a = assemble(&insns, &mut cp, "m").unwrap();
        assert_eq!(
            a.code,
            vec![0x06, 0x10, 100, 0x11, 0x03, 0xe8, 0x12, 1, 0x3c, 0x15, 7, 0xc4, 0x15, 0x01, 0x2c]
        );
    }

    #[test]
    fn test_unresolved_label() {
        let mut cp = ConstantPool::new();
        let err = assemble(&[Insn::Jump { op: opcodes::GOTO, target: Label(9) }], &mut cp, "m").unwrap_err();
        assert_eq!(err, BackendError::UnresolvedLabel { label: 9 });
    }

    #[test]
    fn test_far_branches_are_widened() {
        let mut cp = ConstantPool::new();
        let mut insns = vec![Insn::Push(0), Insn::Jump { op: opcodes::IFEQ, target: Label(1) }];
        insns.extend(std::iter::repeat(Insn::Op(opcodes::NOP)).take(40_000));
        insns.push(Insn::Label(Label(1)));
        insns.push(Insn::Op(opcodes::RETURN));
        let a = assemble(&insns, &mut cp, "m").unwrap();
        assert!(a.widened.contains(&1));
        assert_eq!(&a.code[1..4], &[opcodes::IFNE, 0, 8]);
        assert_eq!(a.code[4], opcodes::GOTO_W);
        let disp = i32::from_be_bytes([a.code[5], a.code[6], a.code[7], a.code[8]]);
        assert_eq!(4 + disp as usize, a.code.len() - 1);
    }

    #[test]
    fn test_tableswitch_padding() {
        let mut cp = ConstantPool::new();
        let insns = vec![
            Insn::Push(1),
            Insn::Switch { default: Label(0), cases: vec![(1, Label(1)), (0, Label(0))] },
            Insn::Label(Label(0)),
            Insn::Label(Label(1)),
            Insn::Op(opcodes::RETURN),
        ];
        let a = assemble(&insns, &mut cp, "m").unwrap();
        assert_eq!(a.code[1], opcodes::TABLESWITCH);
        // opcode at 1, padding to offset 4
        assert_eq!(&a.code[2..4], &[0, 0]);
        assert_eq!(a.code.len(), 4 + 12 + 8 + 1);
    }
}
