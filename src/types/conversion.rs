//! Implicit and explicit conversions between expression types
//!
//! Every IR construction site that accepts a value against a required type
//! goes through [`convert`]. The search order is identity, primitive
//! widening, boxing (plus reference widening), then unboxing (plus
//! primitive widening).

use crate::error::{Error, Result};
use crate::ir::{Constant, Expr, ExprKind};

use super::{PrimitiveKind, Type, TypeRegistry};

/// A conversion path found by [`find_conversion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    /// Primitive widening to the given kind
    Widen(PrimitiveKind),
    /// Widening reference conversion; no code is needed
    RefWiden,
    /// Boxing, optionally followed by reference widening
    Box,
    Unbox,
    /// Unboxing followed by primitive widening to the given kind
    UnboxWiden(PrimitiveKind),
}

impl Conversion {
    /// Whether the path needs boxing or unboxing (second overload phase)
    pub fn is_boxing(self) -> bool {
        matches!(self, Conversion::Box | Conversion::Unbox | Conversion::UnboxWiden(_))
    }
}

/// Find the conversion from `from` to `to`, if one exists
pub fn find_conversion(reg: &TypeRegistry, from: &Type, to: &Type) -> Option<Conversion> {
    if from == to {
        return Some(Conversion::Identity);
    }
    if from.is_void() || to.is_void() || to.is_null() {
        return None;
    }
    match (from, to) {
        (Type::Primitive(a), Type::Primitive(b)) => a.widens_to(*b).then_some(Conversion::Widen(*b)),
        (Type::Primitive(_), _) => {
            let boxed = from.boxed()?;
            reg.is_assignable(&boxed, to).then_some(Conversion::Box)
        }
        (_, Type::Primitive(target)) => {
            let source = from.unboxed()?;
            if source == *target {
                Some(Conversion::Unbox)
            } else if source.widens_to(*target) {
                Some(Conversion::UnboxWiden(*target))
            } else {
                None
            }
        }
        _ => reg.is_assignable(from, to).then_some(Conversion::RefWiden),
    }
}

/// Convert `expr` to `to`, wrapping it in conversion nodes as needed
pub fn convert(reg: &TypeRegistry, expr: Expr, to: &Type) -> Result<Expr> {
    if expr.ty().is_void() {
        return Err(Error::invalid_argument(format!("a void expression cannot be converted to {to}")));
    }
    match find_conversion(reg, expr.ty(), to) {
        Some(Conversion::Identity) | Some(Conversion::RefWiden) => Ok(expr),
        Some(Conversion::Widen(kind)) => Ok(widen(expr, kind)),
        Some(Conversion::Box) => box_value(expr),
        Some(Conversion::Unbox) => unbox_value(expr),
        Some(Conversion::UnboxWiden(kind)) => Ok(widen(unbox_value(expr)?, kind)),
        None => narrow_constant(&expr, to).ok_or_else(|| {
            if expr.ty().is_null() && to.is_primitive() {
                Error::invalid_argument(format!("cannot unbox null to {to}"))
            } else {
                Error::invalid_argument(format!("no conversion from {} to {to}", expr.ty()))
            }
        }),
    }
}

/// Assignment-context narrowing of `int` constants to byte/short/char (or their boxes)
fn narrow_constant(expr: &Expr, to: &Type) -> Option<Expr> {
    let ExprKind::Const(c) = expr.kind() else { return None };
    let (kind, boxed) = match to {
        Type::Primitive(k) => (*k, false),
        other => (other.unboxed()?, true),
    };
    let narrowed = Expr::new(Type::Primitive(kind), ExprKind::Const(c.narrow_int(kind)?));
    if boxed {
        box_value(narrowed).ok()
    } else {
        Some(narrowed)
    }
}

/// Primitive widening, folding constants
pub fn widen(expr: Expr, to: PrimitiveKind) -> Expr {
    if expr.ty() == &Type::Primitive(to) {
        return expr;
    }
    if let ExprKind::Const(c) = expr.kind() {
        if let Some(folded) = fold_numeric(c, to) {
            return Expr::new(Type::Primitive(to), ExprKind::Const(folded));
        }
    }
    Expr::new(Type::Primitive(to), ExprKind::Widen(Box::new(expr)))
}

/// Box a primitive value into its wrapper class
pub fn box_value(expr: Expr) -> Result<Expr> {
    match expr.ty() {
        Type::Primitive(PrimitiveKind::Void) => Err(Error::invalid_argument("cannot box void")),
        Type::Primitive(kind) => {
            let ty = Type::Class(kind.box_class().to_string());
            Ok(Expr::new(ty, ExprKind::Box(Box::new(expr))))
        }
        other => Err(Error::invalid_argument(format!("cannot box non-primitive type {other}"))),
    }
}

/// Unbox a wrapper-class value into its primitive
pub fn unbox_value(expr: Expr) -> Result<Expr> {
    match expr.ty() {
        Type::Null => Err(Error::invalid_argument("cannot unbox null")),
        Type::Class(name) if name == "java/lang/Void" => Err(Error::invalid_argument("cannot unbox java.lang.Void")),
        ty => match ty.unboxed() {
            Some(kind) => Ok(Expr::new(Type::Primitive(kind), ExprKind::Unbox(Box::new(expr)))),
            None => Err(Error::invalid_argument(format!("cannot unbox {ty}"))),
        },
    }
}

/// Binary numeric promotion of two numeric kinds
pub fn binary_promotion(a: PrimitiveKind, b: PrimitiveKind) -> PrimitiveKind {
    let wider = if a.promotion_rank() >= b.promotion_rank() { a } else { b };
    if wider.promotion_rank() == 0 {
        PrimitiveKind::Int
    } else {
        wider
    }
}

/// Unbox if needed, then widen to `kind`
pub fn promote(expr: Expr, kind: PrimitiveKind) -> Result<Expr> {
    let expr = if expr.ty().is_reference() { unbox_value(expr)? } else { expr };
    Ok(widen(expr, kind))
}

/// Explicit cast: primitive narrowing/widening, checkcast, and box/unbox combinations
pub fn cast(reg: &TypeRegistry, expr: Expr, to: &Type) -> Result<Expr> {
    let from = expr.ty().clone();
    if &from == to {
        return Ok(expr);
    }
    if from.is_void() || to.is_void() {
        return Err(Error::invalid_argument(format!("cannot cast {from} to {to}")));
    }
    match (&from, to) {
        (Type::Primitive(a), Type::Primitive(b)) => {
            if a.is_numeric() && b.is_numeric() {
                Ok(numeric_cast(expr, *b))
            } else {
                Err(Error::invalid_argument(format!("cannot cast {from} to {to}")))
            }
        }
        (Type::Primitive(a), _) => {
            // int -> Long casts through the matching primitive first
            let target_kind = to.unboxed().unwrap_or(*a);
            let value = if target_kind != *a && a.is_numeric() && target_kind.is_numeric() {
                numeric_cast(expr, target_kind)
            } else {
                expr
            };
            let boxed = box_value(value)?;
            if reg.is_assignable(boxed.ty(), to) {
                Ok(boxed)
            } else {
                Err(Error::invalid_argument(format!("cannot cast {from} to {to}")))
            }
        }
        (Type::Null, Type::Primitive(_)) => Err(Error::invalid_argument("cannot unbox null")),
        (_, Type::Primitive(b)) => {
            let value = match from.unboxed() {
                Some(_) => unbox_value(expr)?,
                None => {
                    let boxed = to.boxed().ok_or_else(|| Error::invalid_argument(format!("cannot cast {from} to {to}")))?;
                    if !reg.is_assignable(&boxed, &from) {
                        return Err(Error::invalid_argument(format!("cannot cast {from} to {to}")));
                    }
                    unbox_value(Expr::new(boxed, ExprKind::Cast(Box::new(expr))))?
                }
            };
            let source = value.ty().primitive().unwrap_or(*b);
            if source == *b {
                Ok(value)
            } else if source.is_numeric() && b.is_numeric() {
                Ok(numeric_cast(value, *b))
            } else {
                Err(Error::invalid_argument(format!("cannot cast {from} to {to}")))
            }
        }
        _ => {
            if reg.is_assignable(&from, to) && !from.is_null() {
                return Ok(expr);
            }
            if provably_distinct(reg, &from, to) {
                return Err(Error::invalid_argument(format!("inconvertible types {from} and {to}")));
            }
            Ok(Expr::new(to.clone(), ExprKind::Cast(Box::new(expr))))
        }
    }
}

fn numeric_cast(expr: Expr, to: PrimitiveKind) -> Expr {
    let from = expr.ty().primitive().unwrap_or(to);
    if from == to {
        return expr;
    }
    if from.widens_to(to) {
        return widen(expr, to);
    }
    if let ExprKind::Const(c) = expr.kind() {
        if let Some(folded) = fold_numeric(c, to) {
            return Expr::new(Type::Primitive(to), ExprKind::Const(folded));
        }
    }
    Expr::new(Type::Primitive(to), ExprKind::Cast(Box::new(expr)))
}

/// Two final-ish class types with no subtype relation can never be cast
/// between; only known, non-interface classes are rejected.
fn provably_distinct(reg: &TypeRegistry, from: &Type, to: &Type) -> bool {
    match (from, to) {
        (Type::Class(a), Type::Class(b)) => {
            reg.is_known(a)
                && reg.is_known(b)
                && !reg.is_interface(a)
                && !reg.is_interface(b)
                && !reg.is_subclass(a, b)
                && !reg.is_subclass(b, a)
        }
        (Type::Array(a), Type::Array(b)) => {
            (a.is_primitive() || b.is_primitive()) && a != b
        }
        (Type::Array(_), Type::Class(_)) => !reg.is_assignable(from, to),
        _ => false,
    }
}

/// Fold a numeric constant conversion with JVM semantics
pub(crate) fn fold_numeric(c: &Constant, to: PrimitiveKind) -> Option<Constant> {
    let as_int = |c: &Constant| -> Option<i32> {
        Some(match *c {
            Constant::Byte(v) => v as i32,
            Constant::Short(v) => v as i32,
            Constant::Char(v) => v as i32,
            Constant::Int(v) => v,
            Constant::Long(v) => v as i32,
            Constant::Float(v) => v as i32,
            Constant::Double(v) => v as i32,
            _ => return None,
        })
    };
    Some(match to {
        PrimitiveKind::Byte => Constant::Byte(as_int(c)? as i8),
        PrimitiveKind::Short => Constant::Short(as_int(c)? as i16),
        PrimitiveKind::Char => Constant::Char(as_int(c)? as u16),
        PrimitiveKind::Int => Constant::Int(as_int(c)?),
        PrimitiveKind::Long => Constant::Long(match *c {
            Constant::Long(v) => v,
            Constant::Float(v) => v as i64,
            Constant::Double(v) => v as i64,
            _ => as_int(c)? as i64,
        }),
        PrimitiveKind::Float => Constant::Float(match *c {
            Constant::Long(v) => v as f32,
            Constant::Float(v) => v,
            Constant::Double(v) => v as f32,
            _ => as_int(c)? as f32,
        }),
        PrimitiveKind::Double => Constant::Double(match *c {
            Constant::Long(v) => v as f64,
            Constant::Float(v) => v as f64,
            Constant::Double(v) => v,
            _ => as_int(c)? as f64,
        }),
        PrimitiveKind::Boolean | PrimitiveKind::Void => return None,
    })
}
