//! Generic type trees with type-use annotations
//!
//! Type variables are stored by name and resolved against a [`TypeScope`],
//! so self-referential and mutually recursive bounds never form cycles in
//! the owned data.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::annotation::Annotation;

use super::{internal_name, PrimitiveKind, Type, OBJECT};

#[derive(Debug, Clone, PartialEq)]
pub struct GenericType {
    pub kind: GenericKind,
    /// Type-use annotations on this node
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenericKind {
    Primitive(PrimitiveKind),
    /// Class type; `outer` is set for inner classes of a parameterized outer type
    Class { name: String, args: Vec<GenericType>, outer: Option<Box<GenericType>> },
    Array(Box<GenericType>),
    TypeVar(String),
    Wildcard(WildcardBound),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WildcardBound {
    Unbounded,
    Extends(Box<GenericType>),
    Super(Box<GenericType>),
}

/// Declared type parameter with zero or more bounds
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<GenericType>,
    pub annotations: Vec<Annotation>,
}

impl TypeParam {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), bounds: Vec::new(), annotations: Vec::new() }
    }

    pub fn bound(mut self, bound: GenericType) -> Self {
        self.bounds.push(bound);
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

impl GenericType {
    fn of(kind: GenericKind) -> Self {
        Self { kind, annotations: Vec::new() }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::of(GenericKind::Primitive(kind))
    }

    pub fn class(name: &str) -> Self {
        Self::of(GenericKind::Class { name: internal_name(name), args: Vec::new(), outer: None })
    }

    pub fn parameterized(name: &str, args: Vec<GenericType>) -> Self {
        Self::of(GenericKind::Class { name: internal_name(name), args, outer: None })
    }

    /// Inner class `simple_name` of a (possibly parameterized) outer type
    pub fn inner(outer: GenericType, simple_name: &str, args: Vec<GenericType>) -> Result<Self> {
        let GenericKind::Class { name, .. } = &outer.kind else {
            return Err(Error::invalid_argument("the outer type of an inner class must be a class type"));
        };
        let name = format!("{name}${simple_name}");
        Ok(Self::of(GenericKind::Class { name, args, outer: Some(Box::new(outer)) }))
    }

    pub fn array(component: GenericType) -> Self {
        Self::of(GenericKind::Array(Box::new(component)))
    }

    pub fn var(name: &str) -> Self {
        Self::of(GenericKind::TypeVar(name.to_string()))
    }

    pub fn wildcard() -> Self {
        Self::of(GenericKind::Wildcard(WildcardBound::Unbounded))
    }

    pub fn extends(bound: GenericType) -> Self {
        Self::of(GenericKind::Wildcard(WildcardBound::Extends(Box::new(bound))))
    }

    pub fn super_of(bound: GenericType) -> Self {
        Self::of(GenericKind::Wildcard(WildcardBound::Super(Box::new(bound))))
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Whether a Signature attribute is needed to describe this type
    pub fn is_generic(&self) -> bool {
        match &self.kind {
            GenericKind::Primitive(_) => false,
            GenericKind::Class { args, outer, .. } => {
                !args.is_empty() || outer.as_ref().map(|o| o.is_generic()).unwrap_or(false)
            }
            GenericKind::Array(c) => c.is_generic(),
            GenericKind::TypeVar(_) | GenericKind::Wildcard(_) => true,
        }
    }

    /// Whether this node or any nested node carries type-use annotations
    pub fn has_annotations(&self) -> bool {
        if !self.annotations.is_empty() {
            return true;
        }
        match &self.kind {
            GenericKind::Primitive(_) | GenericKind::TypeVar(_) => false,
            GenericKind::Class { args, outer, .. } => {
                args.iter().any(|a| a.has_annotations()) || outer.as_ref().map(|o| o.has_annotations()).unwrap_or(false)
            }
            GenericKind::Array(c) => c.has_annotations(),
            GenericKind::Wildcard(WildcardBound::Unbounded) => false,
            GenericKind::Wildcard(WildcardBound::Extends(b) | WildcardBound::Super(b)) => b.has_annotations(),
        }
    }

    /// Visit every annotation in the tree
    pub fn for_each_annotation(&self, f: &mut dyn FnMut(&Annotation)) {
        self.annotations.iter().for_each(&mut *f);
        match &self.kind {
            GenericKind::Class { args, outer, .. } => {
                args.iter().for_each(|a| a.for_each_annotation(f));
                if let Some(o) = outer {
                    o.for_each_annotation(f);
                }
            }
            GenericKind::Array(c) => c.for_each_annotation(f),
            GenericKind::Wildcard(WildcardBound::Extends(b) | WildcardBound::Super(b)) => b.for_each_annotation(f),
            _ => {}
        }
    }

    /// Erased descriptor-level type
    pub fn erasure(&self, scope: &TypeScope<'_>) -> Result<Type> {
        self.erase(scope, &mut HashSet::new())
    }

    fn erase(&self, scope: &TypeScope<'_>, visiting: &mut HashSet<String>) -> Result<Type> {
        Ok(match &self.kind {
            GenericKind::Primitive(k) => Type::Primitive(*k),
            GenericKind::Class { name, .. } => Type::Class(name.clone()),
            GenericKind::Array(c) => Type::array_of(c.erase(scope, visiting)?),
            GenericKind::TypeVar(name) => {
                let param = scope
                    .resolve(name)
                    .ok_or_else(|| Error::invalid_argument(format!("undeclared type variable {name}")))?;
                if !visiting.insert(name.clone()) {
                    return Ok(Type::object());
                }
                let erased = match param.bounds.first() {
                    Some(bound) => bound.erase(scope, visiting)?,
                    None => Type::object(),
                };
                visiting.remove(name);
                erased
            }
            GenericKind::Wildcard(WildcardBound::Extends(b)) => b.erase(scope, visiting)?,
            GenericKind::Wildcard(_) => Type::Class(OBJECT.to_string()),
        })
    }
}

impl From<Type> for GenericType {
    fn from(ty: Type) -> Self {
        match ty {
            Type::Primitive(k) => GenericType::primitive(k),
            Type::Class(name) => GenericType::class(&name),
            Type::Array(c) => GenericType::array((*c).into()),
            Type::Null => GenericType::class(OBJECT),
        }
    }
}

impl From<&Type> for GenericType {
    fn from(ty: &Type) -> Self {
        ty.clone().into()
    }
}

/// Type parameters visible at a declaration, innermost level first
#[derive(Debug, Clone, Default)]
pub struct TypeScope<'a> {
    levels: Vec<&'a [TypeParam]>,
}

impl<'a> TypeScope<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(params: &'a [TypeParam]) -> Self {
        Self { levels: vec![params] }
    }

    /// Scope with `params` shadowing the current levels
    pub fn nested(&self, params: &'a [TypeParam]) -> Self {
        let mut levels = vec![params];
        levels.extend(self.levels.iter().copied());
        Self { levels }
    }

    pub fn resolve(&self, name: &str) -> Option<&'a TypeParam> {
        self.levels.iter().find_map(|level| level.iter().find(|p| p.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erasure_uses_first_bound() {
        let params = vec![TypeParam::new("T")
            .bound(GenericType::parameterized("java.lang.Comparable", vec![GenericType::var("T")]))
            .bound(GenericType::class("java.io.Serializable"))];
        let scope = TypeScope::of(&params);
        assert_eq!(GenericType::var("T").erasure(&scope).unwrap(), Type::class("java/lang/Comparable"));
        let list = GenericType::array(GenericType::var("T"));
        assert_eq!(list.erasure(&scope).unwrap(), Type::array_of(Type::class("java/lang/Comparable")));
    }

    #[test]
    fn test_mutually_recursive_bounds_terminate() {
        let params = vec![
            TypeParam::new("S").bound(GenericType::var("T")),
            TypeParam::new("T").bound(GenericType::var("S")),
        ];
        let scope = TypeScope::of(&params);
        assert_eq!(GenericType::var("S").erasure(&scope).unwrap(), Type::object());
    }

    #[test]
    fn test_undeclared_variable() {
        let err = GenericType::var("X").erasure(&TypeScope::new()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_shadowing() {
        let class_params = vec![TypeParam::new("T").bound(GenericType::class("java/lang/Number"))];
        let method_params = vec![TypeParam::new("T").bound(GenericType::class("java/lang/String"))];
        let scope = TypeScope::of(&class_params).nested(&method_params);
        assert_eq!(GenericType::var("T").erasure(&scope).unwrap(), Type::string());
    }

    #[test]
    fn test_inner_class_name() {
        let outer = GenericType::parameterized("com/example/Outer", vec![GenericType::var("T")]);
        let inner = GenericType::inner(outer, "Inner", vec![]).unwrap();
        assert!(inner.is_generic());
        let GenericKind::Class { name, .. } = &inner.kind else { panic!() };
        assert_eq!(name, "com/example/Outer$Inner");
    }
}
