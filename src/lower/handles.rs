//! `VarHandle` fields backing ordered and atomic memory accesses
//!
//! Every distinct field or array type accessed with a non-plain memory
//! order gets one static final `VarHandle` on the host class, created in
//! `<clinit>` before any user code runs.

use log::debug;

use crate::backend::classfile::access_flags::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC};
use crate::backend::classfile::major_versions;
use crate::backend::opcodes::{GETSTATIC, INVOKESTATIC, INVOKEVIRTUAL, PUTSTATIC};
use crate::backend::{FieldRequest, Insn, LdcConst};
use crate::error::{Error, Result};
use crate::ir::FieldRef;
use crate::types::Type;

pub(crate) const VAR_HANDLE: &str = "java/lang/invoke/VarHandle";
const METHOD_HANDLES: &str = "java/lang/invoke/MethodHandles";
const LOOKUP: &str = "java/lang/invoke/MethodHandles$Lookup";
const VAR_HANDLE_DESC: &str = "Ljava/lang/invoke/VarHandle;";
const FIND_DESC: &str = "(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/Class;)Ljava/lang/invoke/VarHandle;";

/// What a handle gives access to
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HandleKey {
    Field(FieldRef),
    /// Elements of arrays of this array type
    Array(Type),
}

#[derive(Debug, Default)]
pub(crate) struct VarHandles {
    keys: Vec<HandleKey>,
}

impl VarHandles {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Name of the static field holding the handle for `key`
    pub fn intern(&mut self, key: HandleKey, target_version: u16) -> Result<String> {
        if target_version < major_versions::JAVA_9 {
            return Err(Error::invalid_state(format!(
                "ordered memory access needs class file version {} or later, target is {target_version}",
                major_versions::JAVA_9
            )));
        }
        let index = match self.keys.iter().position(|k| *k == key) {
            Some(i) => i,
            None => {
                debug!("adding VarHandle for {key:?}");
                self.keys.push(key);
                self.keys.len() - 1
            }
        };
        Ok(field_name(index))
    }

    pub fn fields(&self, host_is_interface: bool) -> Vec<FieldRequest> {
        let mut access = ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC;
        if host_is_interface {
            access |= ACC_PUBLIC;
        }
        (0..self.keys.len())
            .map(|i| FieldRequest {
                access,
                name: field_name(i),
                descriptor: VAR_HANDLE_DESC.to_string(),
                ..Default::default()
            })
            .collect()
    }

    /// `<clinit>` code creating every handle
    pub fn init_insns(&self, host: &str) -> Vec<Insn> {
        let mut out = Vec::new();
        for (i, key) in self.keys.iter().enumerate() {
            match key {
                HandleKey::Field(field) => {
                    out.push(invoke(INVOKESTATIC, METHOD_HANDLES, "lookup", "()Ljava/lang/invoke/MethodHandles$Lookup;"));
                    out.push(Insn::Ldc(LdcConst::Class(field.owner.clone())));
                    out.push(Insn::Ldc(LdcConst::String(field.name.clone())));
                    out.push(class_literal(&field.ty));
                    let find = if field.is_static { "findStaticVarHandle" } else { "findVarHandle" };
                    out.push(invoke(INVOKEVIRTUAL, LOOKUP, find, FIND_DESC));
                }
                HandleKey::Array(array) => {
                    out.push(Insn::Ldc(LdcConst::Class(array.class_constant_name())));
                    out.push(invoke(
                        INVOKESTATIC,
                        METHOD_HANDLES,
                        "arrayElementVarHandle",
                        "(Ljava/lang/Class;)Ljava/lang/invoke/VarHandle;",
                    ));
                }
            }
            out.push(Insn::Field {
                op: PUTSTATIC,
                owner: host.to_string(),
                name: field_name(i),
                descriptor: VAR_HANDLE_DESC.to_string(),
            });
        }
        out
    }
}

fn field_name(index: usize) -> String {
    format!("$vh${index}")
}

fn invoke(op: u8, owner: &str, name: &str, descriptor: &str) -> Insn {
    Insn::Invoke { op, owner: owner.to_string(), name: name.to_string(), descriptor: descriptor.to_string(), interface: false }
}

/// `T.class`; primitives go through the wrapper's `TYPE` field
pub(crate) fn class_literal(ty: &Type) -> Insn {
    match ty.primitive() {
        Some(kind) => Insn::Field {
            op: GETSTATIC,
            owner: kind.box_class().to_string(),
            name: "TYPE".to_string(),
            descriptor: "Ljava/lang/Class;".to_string(),
        },
        None => Insn::Ldc(LdcConst::Class(ty.class_constant_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_shared_per_key() {
        let mut handles = VarHandles::default();
        let count = FieldRef::instance("demo/Counter", "count", Type::int());
        let a = handles.intern(HandleKey::Field(count.clone()), major_versions::JAVA_11).unwrap();
        let b = handles.intern(HandleKey::Array(Type::array_of(Type::long())), major_versions::JAVA_11).unwrap();
        let c = handles.intern(HandleKey::Field(count), major_versions::JAVA_11).unwrap();
        assert_eq!(a, "$vh$0");
        assert_eq!(b, "$vh$1");
        assert_eq!(a, c);
        assert_eq!(handles.fields(false).len(), 2);
    }

    #[test]
    fn test_old_targets_rejected() {
        let mut handles = VarHandles::default();
        let key = HandleKey::Array(Type::array_of(Type::int()));
        let err = handles.intern(key, major_versions::JAVA_8).unwrap_err();
        assert!(err.is_invalid_state());
        assert!(handles.is_empty());
    }

    #[test]
    fn test_static_field_handle_init() {
        let mut handles = VarHandles::default();
        let flag = FieldRef::of_static("demo/Host", "ready", Type::boolean());
        handles.intern(HandleKey::Field(flag), major_versions::JAVA_17).unwrap();
        let insns = handles.init_insns("demo/Host");
        assert_eq!(insns.len(), 6);
        assert!(matches!(&insns[3], Insn::Field { owner, name, .. } if owner == "java/lang/Boolean" && name == "TYPE"));
        assert!(matches!(&insns[4], Insn::Invoke { name, .. } if name == "findStaticVarHandle"));
        assert!(matches!(&insns[5], Insn::Field { op: PUTSTATIC, name, .. } if name == "$vh$0"));
    }
}
