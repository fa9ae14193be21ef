//! Type-use annotation placement
//!
//! Each annotation found inside a generic type tree becomes one entry with
//! the target it belongs to and the path from the root type to the
//! annotated node.

use crate::backend::insn::Label;
use crate::error::Result;
use crate::model::annotation::{Annotation, ElementKind};
use crate::types::{GenericKind, GenericType, TypeParam, WildcardBound};

/// One step of a `type_path`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStep {
    ArrayElement,
    Nested,
    WildcardBound,
    TypeArgument(u8),
}

impl PathStep {
    /// `(type_path_kind, type_argument_index)`
    pub fn encode(self) -> (u8, u8) {
        match self {
            PathStep::ArrayElement => (0, 0),
            PathStep::Nested => (1, 0),
            PathStep::WildcardBound => (2, 0),
            PathStep::TypeArgument(i) => (3, i),
        }
    }
}

/// Code range over which a local variable lives in one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRange {
    pub start: Label,
    pub end: Label,
    pub slot: u16,
}

/// The `target_info` of a type annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTarget {
    ClassTypeParameter(u8),
    MethodTypeParameter(u8),
    /// Superclass is 65535, interfaces are indexed from 0
    Supertype(u16),
    ClassTypeParameterBound { param: u8, bound: u8 },
    MethodTypeParameterBound { param: u8, bound: u8 },
    Field,
    Return,
    Receiver,
    FormalParameter(u8),
    Throws(u16),
    LocalVariable(Vec<LocalRange>),
}

impl TypeTarget {
    pub fn target_type(&self) -> u8 {
        match self {
            TypeTarget::ClassTypeParameter(_) => 0x00,
            TypeTarget::MethodTypeParameter(_) => 0x01,
            TypeTarget::Supertype(_) => 0x10,
            TypeTarget::ClassTypeParameterBound { .. } => 0x11,
            TypeTarget::MethodTypeParameterBound { .. } => 0x12,
            TypeTarget::Field => 0x13,
            TypeTarget::Return => 0x14,
            TypeTarget::Receiver => 0x15,
            TypeTarget::FormalParameter(_) => 0x16,
            TypeTarget::Throws(_) => 0x17,
            TypeTarget::LocalVariable(_) => 0x40,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub target: TypeTarget,
    pub path: Vec<PathStep>,
    pub annotation: Annotation,
}

/// Collect the annotations in `ty` for the given target
pub fn collect_type_annotations(ty: &GenericType, target: &TypeTarget, out: &mut Vec<TypeAnnotation>) -> Result<()> {
    walk(ty, &mut Vec::new(), target, out)
}

/// Annotations on type parameters and their bounds
pub fn collect_type_param_annotations(params: &[TypeParam], method: bool, out: &mut Vec<TypeAnnotation>) -> Result<()> {
    for (pi, p) in params.iter().enumerate() {
        let pi = pi as u8;
        for a in &p.annotations {
            a.check_target(ElementKind::TypeParameter)?;
            let target = if method { TypeTarget::MethodTypeParameter(pi) } else { TypeTarget::ClassTypeParameter(pi) };
            out.push(TypeAnnotation { target, path: Vec::new(), annotation: a.clone() });
        }
        for (bi, b) in p.bounds.iter().enumerate() {
            let bound = bi as u8;
            let target = if method {
                TypeTarget::MethodTypeParameterBound { param: pi, bound }
            } else {
                TypeTarget::ClassTypeParameterBound { param: pi, bound }
            };
            collect_type_annotations(b, &target, out)?;
        }
    }
    Ok(())
}

fn emit(annotations: &[Annotation], path: &[PathStep], target: &TypeTarget, out: &mut Vec<TypeAnnotation>) -> Result<()> {
    for a in annotations {
        a.check_target(ElementKind::TypeUse)?;
        out.push(TypeAnnotation { target: target.clone(), path: path.to_vec(), annotation: a.clone() });
    }
    Ok(())
}

fn walk(ty: &GenericType, path: &mut Vec<PathStep>, target: &TypeTarget, out: &mut Vec<TypeAnnotation>) -> Result<()> {
    match &ty.kind {
        GenericKind::Class { .. } => {
            // outermost enclosing type first; each level inward adds a Nested step
            let mut chain = vec![ty];
            let mut cur = ty;
            while let GenericKind::Class { outer: Some(o), .. } = &cur.kind {
                cur = o.as_ref();
                chain.push(cur);
            }
            chain.reverse();
            let base = path.len();
            for (depth, node) in chain.iter().enumerate() {
                path.truncate(base);
                path.extend(std::iter::repeat(PathStep::Nested).take(depth));
                emit(&node.annotations, path, target, out)?;
                if let GenericKind::Class { args, .. } = &node.kind {
                    for (i, arg) in args.iter().enumerate() {
                        path.push(PathStep::TypeArgument(i as u8));
                        walk(arg, path, target, out)?;
                        path.pop();
                    }
                }
            }
            path.truncate(base);
        }
        GenericKind::Array(c) => {
            emit(&ty.annotations, path, target, out)?;
            path.push(PathStep::ArrayElement);
            walk(c, path, target, out)?;
            path.pop();
        }
        GenericKind::Wildcard(bound) => {
            emit(&ty.annotations, path, target, out)?;
            if let WildcardBound::Extends(b) | WildcardBound::Super(b) = bound {
                path.push(PathStep::WildcardBound);
                walk(b, path, target, out)?;
                path.pop();
            }
        }
        GenericKind::Primitive(_) | GenericKind::TypeVar(_) => emit(&ty.annotations, path, target, out)?,
    }
    Ok(())
}
