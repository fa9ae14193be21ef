//! Structured method-body builder
//!
//! A [`Code`] is handed to the body closure of every method, constructor
//! and static initializer. Statements are appended to blocks identified by
//! [`Block`](crate::ir::Block) handles; nested constructs take closures
//! that receive the nested block, so the nesting of the generated code
//! mirrors the nesting of the builder calls.

mod block;
mod closure;
mod code;
mod control;

pub use block::BlockState;
pub use closure::AnonSpec;
pub use code::Code;
pub use control::{SwitchKey, TrySpec};

pub(crate) use block::{AnonNode, FrameNode, LoopNode, SwitchKind, SwitchNode, VarKind, VarNode};
pub(crate) use code::FrameSpec;

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{Type, TypeRegistry};

    fn spec(name: &str, params: Vec<(&str, Type)>, ret: Type, is_static: bool, is_ctor: bool) -> FrameSpec {
        FrameSpec {
            name: name.to_string(),
            is_static,
            is_ctor,
            params: params.into_iter().map(|(n, t)| (n.to_string(), t, None)).collect(),
            ret,
        }
    }

    /// Body of a static method on `demo/Sample`
    pub(crate) fn static_code(params: Vec<(&str, Type)>, ret: Type) -> Code {
        let reg = Arc::new(TypeRegistry::new());
        Code::new(reg, "demo/Sample", crate::types::OBJECT, false, vec![], spec("run", params, ret, true, false))
    }

    /// Body of a constructor of `demo/Sample`
    pub(crate) fn ctor_code(params: Vec<(&str, Type)>) -> Code {
        let reg = Arc::new(TypeRegistry::new());
        Code::new(reg, "demo/Sample", crate::types::OBJECT, false, vec![], spec("<init>", params, Type::void(), false, true))
    }
}
