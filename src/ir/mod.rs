//! Typed expression and statement IR
//!
//! Expressions are immutable values whose type is fixed when they are
//! built. Statements live inside blocks owned by the [`crate::builder::Code`]
//! arena and refer to nested blocks, loops and switches by handle.

pub mod constant;
pub mod expr;
pub mod ops;
pub mod stmt;

pub use constant::Constant;
pub use expr::{AtomicAccess, Expr, ExprKind};
pub use ops::{AtomicOp, BinaryOp, CompareOp, LogicalOp, MemoryOrder, UnaryOp};
pub use stmt::{CatchClause, Stmt};

use crate::types::{method_descriptor, Type};

/// Arena index of a local variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

/// Handle to a block in a method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block(pub(crate) usize);

/// Handle to a loop, used as the target of break/continue/redo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Loop(pub(crate) usize);

/// Handle to a switch construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Switch(pub(crate) usize);

/// Handle to a synthesized lambda or anonymous class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnonId(pub(crate) usize);

/// A local variable, parameter, or `this`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    pub(crate) id: VarId,
    pub(crate) ty: Type,
}

impl Var {
    /// Read the variable
    pub fn get(&self) -> Expr {
        Expr::new(self.ty.clone(), ExprKind::Local(self.id))
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn id(&self) -> VarId {
        self.id
    }
}

/// A resolved field reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
}

impl FieldRef {
    pub fn instance(owner: &str, name: &str, ty: Type) -> Self {
        Self { owner: crate::types::internal_name(owner), name: name.to_string(), ty, is_static: false }
    }

    pub fn of_static(owner: &str, name: &str, ty: Type) -> Self {
        Self { owner: crate::types::internal_name(owner), name: name.to_string(), ty, is_static: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    /// Constructors, private and super calls
    Special,
}

/// A resolved method reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub kind: InvokeKind,
    pub varargs: bool,
    /// Owner is an interface (affects `invokestatic`/`invokespecial` encoding)
    pub interface_owner: bool,
}

impl MethodRef {
    fn new(owner: &str, name: &str, params: Vec<Type>, ret: Type, kind: InvokeKind) -> Self {
        Self {
            owner: crate::types::internal_name(owner),
            name: name.to_string(),
            params,
            ret,
            kind,
            varargs: false,
            interface_owner: kind == InvokeKind::Interface,
        }
    }

    pub fn of_static(owner: &str, name: &str, params: Vec<Type>, ret: Type) -> Self {
        Self::new(owner, name, params, ret, InvokeKind::Static)
    }

    pub fn of_virtual(owner: &str, name: &str, params: Vec<Type>, ret: Type) -> Self {
        Self::new(owner, name, params, ret, InvokeKind::Virtual)
    }

    pub fn of_interface(owner: &str, name: &str, params: Vec<Type>, ret: Type) -> Self {
        Self::new(owner, name, params, ret, InvokeKind::Interface)
    }

    pub fn of_special(owner: &str, name: &str, params: Vec<Type>, ret: Type) -> Self {
        Self::new(owner, name, params, ret, InvokeKind::Special)
    }

    pub fn constructor(owner: &str, params: Vec<Type>) -> Self {
        Self::new(owner, "<init>", params, Type::void(), InvokeKind::Special)
    }

    /// Static method declared on an interface (`List.of`)
    pub fn of_interface_static(owner: &str, name: &str, params: Vec<Type>, ret: Type) -> Self {
        let mut m = Self::new(owner, name, params, ret, InvokeKind::Static);
        m.interface_owner = true;
        m
    }

    pub fn with_varargs(mut self) -> Self {
        self.varargs = true;
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind == InvokeKind::Static
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn descriptor(&self) -> String {
        method_descriptor(&self.params, &self.ret)
    }
}
