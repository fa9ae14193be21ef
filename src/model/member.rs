//! Field, method and parameter declarations

use crate::ir::{Constant, Expr};
use crate::types::{GenericType, Type, TypeParam};

use super::annotation::Annotation;
use super::flags::Modifiers;

/// A named method parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: GenericType,
    pub annotations: Vec<Annotation>,
}

impl Param {
    pub fn new(name: &str, ty: impl Into<GenericType>) -> Self {
        Self { name: name.to_string(), ty: ty.into(), annotations: Vec::new() }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// Field declaration
///
/// A `constant` on a `static final` field of primitive or `String` type is
/// written as a `ConstantValue` attribute; any other initial value runs in
/// `<clinit>` (static) or in every constructor after the superclass
/// constructor call (instance).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub mods: Modifiers,
    pub ty: GenericType,
    pub constant: Option<Constant>,
    pub init: Option<Expr>,
    pub annotations: Vec<Annotation>,
}

impl FieldDef {
    pub fn new(name: &str, ty: impl Into<GenericType>) -> Self {
        Self {
            name: name.to_string(),
            mods: Modifiers::NONE,
            ty: ty.into(),
            constant: None,
            init: None,
            annotations: Vec::new(),
        }
    }

    pub fn modifiers(mut self, mods: Modifiers) -> Self {
        self.mods = mods;
        self
    }

    pub fn constant(mut self, value: impl Into<Constant>) -> Self {
        self.constant = Some(value.into());
        self
    }

    pub fn init(mut self, value: Expr) -> Self {
        self.init = Some(value);
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// Method or constructor declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub mods: Modifiers,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: GenericType,
    pub throws: Vec<GenericType>,
    pub annotations: Vec<Annotation>,
}

impl MethodDef {
    pub fn new(name: &str, ret: impl Into<GenericType>) -> Self {
        Self {
            name: name.to_string(),
            mods: Modifiers::NONE,
            type_params: Vec::new(),
            params: Vec::new(),
            ret: ret.into(),
            throws: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Constructor declaration; the name and return type are fixed
    pub fn constructor() -> Self {
        Self::new("<init>", Type::void())
    }

    pub fn modifiers(mut self, mods: Modifiers) -> Self {
        self.mods = mods;
        self
    }

    pub fn param(mut self, name: &str, ty: impl Into<GenericType>) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn type_param(mut self, param: TypeParam) -> Self {
        self.type_params.push(param);
        self
    }

    pub fn throws(mut self, ty: impl Into<GenericType>) -> Self {
        self.throws.push(ty.into());
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_def_builder() {
        let def = MethodDef::new("add", Type::double())
            .modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
            .param("a", Type::int())
            .param("b", Type::double());
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[1].name, "b");
        assert!(def.mods.is_static());
        assert!(!def.is_constructor());
        assert!(MethodDef::constructor().is_constructor());
    }

    #[test]
    fn test_field_def_constant() {
        let def = FieldDef::new("MAX", Type::int()).modifiers(Modifiers::STATIC | Modifiers::FINAL).constant(10);
        assert_eq!(def.constant, Some(Constant::Int(10)));
    }
}
