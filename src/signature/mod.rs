//! Generic signature encoding
//!
//! Produces the `Signature` attribute grammar for classes, methods and
//! fields. Type variables are checked against the declaring [`TypeScope`]
//! so a signature never names a variable that is not in scope.

pub mod type_annotation;

pub use type_annotation::{
    collect_type_annotations, collect_type_param_annotations, LocalRange, PathStep, TypeAnnotation, TypeTarget,
};

use crate::error::{Error, Result};
use crate::types::{GenericKind, GenericType, TypeParam, TypeScope, WildcardBound};

/// Signature of a single type (`ReferenceTypeSignature` or base type)
pub fn type_signature(ty: &GenericType, scope: &TypeScope<'_>) -> Result<String> {
    let mut out = String::new();
    write_type(ty, scope, &mut out)?;
    Ok(out)
}

/// `<T:bound...>` section for declared type parameters
pub fn type_params_signature(params: &[TypeParam], scope: &TypeScope<'_>) -> Result<String> {
    if params.is_empty() {
        return Ok(String::new());
    }
    let mut out = String::from("<");
    for p in params {
        out.push_str(&p.name);
        if p.bounds.is_empty() {
            out.push_str(":Ljava/lang/Object;");
        }
        for bound in &p.bounds {
            if matches!(bound.kind, GenericKind::Primitive(_) | GenericKind::Wildcard(_)) {
                return Err(Error::invalid_argument(format!("illegal bound for type parameter {}", p.name)));
            }
            out.push(':');
            write_type(bound, scope, &mut out)?;
        }
    }
    out.push('>');
    Ok(out)
}

/// ClassSignature: type parameters, superclass, then interfaces
pub fn class_signature(
    params: &[TypeParam],
    super_class: &GenericType,
    interfaces: &[GenericType],
    scope: &TypeScope<'_>,
) -> Result<String> {
    let mut out = type_params_signature(params, scope)?;
    write_type(super_class, scope, &mut out)?;
    for i in interfaces {
        write_type(i, scope, &mut out)?;
    }
    Ok(out)
}

/// MethodSignature; throws clauses are only written when one of them is a
/// type variable, since the `Exceptions` attribute already lists the rest
pub fn method_signature(
    type_params: &[TypeParam],
    params: &[GenericType],
    ret: &GenericType,
    throws: &[GenericType],
    scope: &TypeScope<'_>,
) -> Result<String> {
    let mut out = type_params_signature(type_params, scope)?;
    out.push('(');
    for p in params {
        write_type(p, scope, &mut out)?;
    }
    out.push(')');
    write_type(ret, scope, &mut out)?;
    if throws.iter().any(|t| matches!(t.kind, GenericKind::TypeVar(_))) {
        for t in throws {
            out.push('^');
            write_type(t, scope, &mut out)?;
        }
    }
    Ok(out)
}

/// Whether a member with these types needs a `Signature` attribute
pub fn needs_signature<'t>(type_params: &[TypeParam], types: impl IntoIterator<Item = &'t GenericType>) -> bool {
    !type_params.is_empty() || types.into_iter().any(|t| t.is_generic())
}

fn write_type(ty: &GenericType, scope: &TypeScope<'_>, out: &mut String) -> Result<()> {
    match &ty.kind {
        GenericKind::Primitive(k) => out.push(k.descriptor()),
        GenericKind::Class { .. } => {
            write_class(ty, scope, out)?;
            out.push(';');
        }
        GenericKind::Array(c) => {
            out.push('[');
            write_type(c, scope, out)?;
        }
        GenericKind::TypeVar(name) => {
            if scope.resolve(name).is_none() {
                return Err(Error::invalid_argument(format!("type variable {name} is not declared in this scope")));
            }
            out.push('T');
            out.push_str(name);
            out.push(';');
        }
        GenericKind::Wildcard(_) => {
            return Err(Error::invalid_argument("a wildcard may only appear as a type argument"));
        }
    }
    Ok(())
}

/// Class type without the trailing `;`
fn write_class(ty: &GenericType, scope: &TypeScope<'_>, out: &mut String) -> Result<()> {
    let GenericKind::Class { name, args, outer } = &ty.kind else {
        return Err(Error::invalid_argument("expected a class type"));
    };
    match outer.as_deref() {
        Some(o @ GenericType { kind: GenericKind::Class { name: outer_name, .. }, .. }) if o.is_generic() => {
            write_class(o, scope, out)?;
            out.push('.');
            let simple = name.strip_prefix(outer_name.as_str()).and_then(|s| s.strip_prefix('$')).unwrap_or(name);
            out.push_str(simple);
        }
        _ => {
            out.push('L');
            out.push_str(name);
        }
    }
    if !args.is_empty() {
        out.push('<');
        for a in args {
            match &a.kind {
                GenericKind::Wildcard(WildcardBound::Unbounded) => out.push('*'),
                GenericKind::Wildcard(WildcardBound::Extends(b)) => {
                    out.push('+');
                    write_type(b, scope, out)?;
                }
                GenericKind::Wildcard(WildcardBound::Super(b)) => {
                    out.push('-');
                    write_type(b, scope, out)?;
                }
                GenericKind::Primitive(_) => {
                    return Err(Error::invalid_argument("primitive types cannot be type arguments"));
                }
                _ => write_type(a, scope, out)?,
            }
        }
        out.push('>');
    }
    Ok(())
}
