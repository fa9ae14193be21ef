//! Synthesized nested classes for lambdas and anonymous classes
//!
//! Each anonymous body becomes `Host$N`. Captured variables are passed to
//! its constructor and copied into final fields before the superclass
//! constructor runs, so methods the superclass constructor calls already
//! see them.

use log::debug;

use crate::backend::classfile::access_flags::{ACC_FINAL, ACC_PUBLIC, ACC_SUPER, ACC_SYNTHETIC};
use crate::backend::opcodes::{ALOAD, INVOKESPECIAL, PUTFIELD, RETURN};
use crate::backend::{ClassRequest, CodeRequest, EnclosingMethod, FieldRequest, Insn, MethodRequest};
use crate::builder::Code;
use crate::error::Result;
use crate::ir::AnonId;
use crate::types::{method_descriptor, ClassInfo, Type};

use super::method::{load_op, MethodLowerer};
use super::slots::SlotAllocator;
use super::ClassContext;

pub(super) fn capture_field(index: usize) -> String {
    format!("cap${index}")
}

/// Constructor parameters: the superclass constructor's, then one per capture
pub(super) fn constructor_params(code: &Code, anon: AnonId) -> Vec<Type> {
    let node = &code.anons[anon.0];
    let mut params = node.super_ctor.params.clone();
    params.extend(node.captures.iter().map(|v| code.vars[v.0].ty.clone()));
    params
}

impl<'m> ClassContext<'m> {
    /// Name of the class implementing `anon`, lowering it on first use
    pub(super) fn anon_class(&mut self, code: &'m Code, anon: AnonId, enclosing: EnclosingMethod) -> Result<String> {
        let key = (self.code_id, anon.0);
        if let Some(name) = self.anon_names.get(&key) {
            return Ok(name.clone());
        }
        self.anon_count += 1;
        let name = format!("{}${}", self.host(), self.anon_count);
        self.anon_names.insert(key, name.clone());

        let node = &code.anons[anon.0];
        let super_name = node.super_ctor.owner.clone();
        let ifaces: Vec<&str> = node.interfaces.iter().map(String::as_str).collect();
        // methods of the class may create further instances of it
        self.registry.define(ClassInfo::class(&name, &super_name, &ifaces));
        debug!(
            "synthesizing {name} ({} {super_name}, {} captures)",
            if node.is_lambda { "lambda of" } else { "extends" },
            node.captures.len()
        );

        let fields = node
            .captures
            .iter()
            .enumerate()
            .map(|(i, v)| FieldRequest {
                access: ACC_FINAL | ACC_SYNTHETIC,
                name: capture_field(i),
                descriptor: code.vars[v.0].ty.descriptor(),
                ..Default::default()
            })
            .collect();

        let mut methods = vec![constructor(code, anon, &name)?];
        for m in &node.methods {
            let desc = method_descriptor(&m.params, &m.ret);
            debug!("lowering {name}.{}{desc}", m.name);
            let lowered = MethodLowerer::new(self, Some(code), &name, Some(anon), Some((m.name.clone(), desc.clone())))
                .lower_frame(m.frame)?;
            methods.push(MethodRequest {
                access: ACC_PUBLIC,
                name: m.name.clone(),
                descriptor: desc,
                code: Some(lowered),
                ..Default::default()
            });
        }

        let config = self.config();
        self.nested.push(ClassRequest {
            version: config.target_version,
            access: ACC_SUPER | ACC_FINAL | ACC_SYNTHETIC,
            name: name.clone(),
            super_name: Some(super_name),
            interfaces: node.interfaces.clone(),
            source_file: config.source_file.clone(),
            fields,
            methods,
            enclosing_method: Some(enclosing),
            emit_frames: config.emit_frames,
            ..Default::default()
        });
        Ok(name)
    }
}

fn constructor(code: &Code, anon: AnonId, name: &str) -> Result<MethodRequest> {
    let node = &code.anons[anon.0];
    let params = constructor_params(code, anon);
    let mut slots = SlotAllocator::new();
    slots.alloc(&Type::class(name))?;
    let mut param_slots = Vec::with_capacity(params.len());
    for p in &params {
        param_slots.push((slots.alloc(p)?, p));
    }

    let (super_params, captures) = param_slots.split_at(node.super_ctor.params.len());
    let mut insns = Vec::new();
    // fields of the class itself may be stored while `this` is uninitialized
    for (i, (slot, ty)) in captures.iter().enumerate() {
        insns.push(Insn::Local { op: ALOAD, slot: 0 });
        insns.push(Insn::Local { op: load_op(ty), slot: *slot });
        insns.push(Insn::Field { op: PUTFIELD, owner: name.to_string(), name: capture_field(i), descriptor: ty.descriptor() });
    }
    insns.push(Insn::Local { op: ALOAD, slot: 0 });
    insns.extend(super_params.iter().map(|(slot, ty)| Insn::Local { op: load_op(ty), slot: *slot }));
    insns.push(Insn::Invoke {
        op: INVOKESPECIAL,
        owner: node.super_ctor.owner.clone(),
        name: "<init>".to_string(),
        descriptor: node.super_ctor.descriptor(),
        interface: false,
    });
    insns.push(Insn::Op(RETURN));

    Ok(MethodRequest {
        access: 0,
        name: "<init>".to_string(),
        descriptor: method_descriptor(&params, &Type::void()),
        code: Some(CodeRequest { insns, ..Default::default() }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_field_names() {
        assert_eq!(capture_field(0), "cap$0");
        assert_eq!(capture_field(12), "cap$12");
    }
}
