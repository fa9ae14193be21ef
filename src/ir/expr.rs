//! Expression nodes
//!
//! Every constructor resolves the node's type from its operands and applies
//! the conversion rules up front, so a malformed expression is rejected at
//! construction rather than by the verifier.

use crate::error::{Error, Result};
use crate::types::conversion::{self, promote, Conversion};
use crate::types::{PrimitiveKind, Type, TypeRegistry};

use super::{
    AnonId, AtomicOp, BinaryOp, CompareOp, Constant, FieldRef, LogicalOp, MemoryOrder, MethodRef, UnaryOp, VarId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    ty: Type,
    kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const(Constant),
    Local(VarId),
    Field { target: Option<Box<Expr>>, field: FieldRef, order: MemoryOrder },
    ArrayElem { array: Box<Expr>, index: Box<Expr>, order: MemoryOrder },
    ArrayLength(Box<Expr>),
    Invoke { method: MethodRef, target: Option<Box<Expr>>, args: Vec<Expr> },
    New { ctor: MethodRef, args: Vec<Expr> },
    /// Array creation; one length per created dimension
    NewArray { dims: Vec<Expr> },
    ArrayLiteral(Vec<Expr>),
    Widen(Box<Expr>),
    Box(Box<Expr>),
    Unbox(Box<Expr>),
    /// Narrowing primitive conversion or checkcast, to the node's type
    Cast(Box<Expr>),
    InstanceOf { operand: Box<Expr>, class: Type },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Not(Box<Expr>),
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
    Conditional { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Concat(Vec<Expr>),
    Atomic { op: AtomicOp, access: AtomicAccess, order: MemoryOrder, args: Vec<Expr> },
    /// Instance of a synthesized lambda or anonymous class
    AnonInstance { anon: AnonId, super_args: Vec<Expr> },
}

/// Location updated by an atomic operation
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicAccess {
    Field { target: Option<Box<Expr>>, field: FieldRef },
    Array { array: Box<Expr>, index: Box<Expr> },
}

impl AtomicAccess {
    pub fn field(target: Option<Expr>, field: &FieldRef) -> Result<Self> {
        check_receiver(field, target.as_ref())?;
        Ok(AtomicAccess::Field { target: target.map(Box::new), field: field.clone() })
    }

    pub fn array(array: Expr, index: Expr) -> Result<Self> {
        array_component(&array)?;
        Ok(AtomicAccess::Array { array: Box::new(array), index: Box::new(to_int(index)?) })
    }

    /// Type of the accessed variable
    pub fn value_type(&self) -> Type {
        match self {
            AtomicAccess::Field { field, .. } => field.ty.clone(),
            AtomicAccess::Array { array, .. } => array.ty().component().cloned().unwrap_or_else(Type::object),
        }
    }
}

fn non_void(e: &Expr, what: &str) -> Result<()> {
    if e.ty.is_void() {
        return Err(Error::invalid_argument(format!("{what} cannot be a void expression")));
    }
    Ok(())
}

fn boolean_operand(e: Expr) -> Result<Expr> {
    match e.ty() {
        t if t.is_boolean() => Ok(e),
        Type::Class(name) if name == "java/lang/Boolean" => conversion::unbox_value(e),
        other => Err(Error::invalid_argument(format!("expected a boolean, found {other}"))),
    }
}

fn is_booleanish(ty: &Type) -> bool {
    ty.is_boolean() || matches!(ty, Type::Class(n) if n == "java/lang/Boolean")
}

/// Promote an index or length operand to `int`
fn to_int(e: Expr) -> Result<Expr> {
    match e.ty().numeric_kind() {
        Some(k) if k.is_int_like() => promote(e, PrimitiveKind::Int),
        _ => Err(Error::invalid_argument(format!("expected an int index, found {}", e.ty()))),
    }
}

fn array_component(array: &Expr) -> Result<Type> {
    array
        .ty()
        .component()
        .cloned()
        .ok_or_else(|| Error::invalid_argument(format!("{} is not an array type", array.ty())))
}

fn check_receiver(field: &FieldRef, target: Option<&Expr>) -> Result<()> {
    match (field.is_static, target) {
        (true, Some(_)) => Err(Error::invalid_argument(format!("static field {} accessed through an instance", field.name))),
        (false, None) => Err(Error::invalid_argument(format!("instance field {} requires a receiver", field.name))),
        (false, Some(t)) if !t.ty().is_reference() => {
            Err(Error::invalid_argument(format!("field receiver must be a reference, found {}", t.ty())))
        }
        _ => Ok(()),
    }
}

impl Expr {
    pub(crate) fn new(ty: Type, kind: ExprKind) -> Self {
        Self { ty, kind }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    // ---- constants -------------------------------------------------------

    pub fn null() -> Self {
        Self::new(Type::Null, ExprKind::Const(Constant::Null))
    }

    pub fn boolean(v: bool) -> Self {
        Self::scalar(Constant::Boolean(v))
    }

    pub fn int(v: i32) -> Self {
        Self::scalar(Constant::Int(v))
    }

    pub fn long(v: i64) -> Self {
        Self::scalar(Constant::Long(v))
    }

    pub fn float(v: f32) -> Self {
        Self::scalar(Constant::Float(v))
    }

    pub fn double(v: f64) -> Self {
        Self::scalar(Constant::Double(v))
    }

    pub fn char(v: char) -> Self {
        Self::scalar(Constant::from(v))
    }

    pub fn string(v: &str) -> Self {
        Self::scalar(Constant::String(v.to_string()))
    }

    pub fn class_literal(ty: Type) -> Self {
        Self::scalar(Constant::Class(ty))
    }

    fn scalar(c: Constant) -> Self {
        Self::new(c.ty(), ExprKind::Const(c))
    }

    /// Any constant, including collection literals
    pub fn constant(c: impl Into<Constant>) -> Result<Self> {
        let c = c.into();
        c.validate()?;
        Ok(Self::scalar(c))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            ExprKind::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Const(Constant::Null))
    }

    // ---- fields and arrays -----------------------------------------------

    pub fn field(target: Option<Expr>, field: &FieldRef, order: MemoryOrder) -> Result<Self> {
        check_receiver(field, target.as_ref())?;
        Ok(Self::new(field.ty.clone(), ExprKind::Field { target: target.map(Box::new), field: field.clone(), order }))
    }

    pub fn get_field(target: Expr, field: &FieldRef) -> Result<Self> {
        Self::field(Some(target), field, MemoryOrder::Plain)
    }

    pub fn get_static(field: &FieldRef) -> Result<Self> {
        Self::field(None, field, MemoryOrder::Plain)
    }

    pub fn array_elem_ordered(array: Expr, index: Expr, order: MemoryOrder) -> Result<Self> {
        let component = array_component(&array)?;
        let index = to_int(index)?;
        Ok(Self::new(component, ExprKind::ArrayElem { array: Box::new(array), index: Box::new(index), order }))
    }

    pub fn array_elem(array: Expr, index: Expr) -> Result<Self> {
        Self::array_elem_ordered(array, index, MemoryOrder::Plain)
    }

    pub fn array_length(array: Expr) -> Result<Self> {
        array_component(&array)?;
        Ok(Self::new(Type::int(), ExprKind::ArrayLength(Box::new(array))))
    }

    // ---- arithmetic ------------------------------------------------------

    /// Binary arithmetic, bitwise or shift operator with numeric promotion
    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Result<Self> {
        non_void(&a, "operand")?;
        non_void(&b, "operand")?;
        let not_applicable =
            || Error::invalid_argument(format!("operator {} not applicable to {} and {}", op.symbol(), a.ty(), b.ty()));

        if op.is_shift() {
            let lk = a.ty().numeric_kind().filter(|k| k.is_integral()).ok_or_else(not_applicable)?;
            let rk = b.ty().numeric_kind().filter(|k| k.is_integral()).ok_or_else(not_applicable)?;
            let lk = if lk == PrimitiveKind::Long { lk } else { PrimitiveKind::Int };
            let left = promote(a, lk)?;
            let right = if rk == PrimitiveKind::Long {
                let r = promote(b, PrimitiveKind::Long)?;
                Self::new(Type::int(), ExprKind::Cast(Box::new(r)))
            } else {
                promote(b, PrimitiveKind::Int)?
            };
            return Ok(Self::new(Type::Primitive(lk), ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }));
        }

        if op.is_bitwise() && is_booleanish(a.ty()) && is_booleanish(b.ty()) {
            let left = boolean_operand(a)?;
            let right = boolean_operand(b)?;
            return Ok(Self::new(Type::boolean(), ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }));
        }

        let ak = a.ty().numeric_kind().ok_or_else(not_applicable)?;
        let bk = b.ty().numeric_kind().ok_or_else(not_applicable)?;
        if op.is_bitwise() && !(ak.is_integral() && bk.is_integral()) {
            return Err(not_applicable());
        }
        let kind = conversion::binary_promotion(ak, bk);
        let left = promote(a, kind)?;
        let right = promote(b, kind)?;
        Ok(Self::new(Type::Primitive(kind), ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }))
    }

    pub fn add(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Add, a, b)
    }

    pub fn sub(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Mul, a, b)
    }

    pub fn div(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Div, a, b)
    }

    pub fn rem(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Rem, a, b)
    }

    pub fn and(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::And, a, b)
    }

    pub fn or(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Or, a, b)
    }

    pub fn xor(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Xor, a, b)
    }

    pub fn shl(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Shl, a, b)
    }

    pub fn shr(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Shr, a, b)
    }

    pub fn ushr(a: Expr, b: Expr) -> Result<Self> {
        Self::binary(BinaryOp::Ushr, a, b)
    }

    pub fn neg(a: Expr) -> Result<Self> {
        let kind = a
            .ty()
            .numeric_kind()
            .ok_or_else(|| Error::invalid_argument(format!("cannot negate {}", a.ty())))?;
        let kind = conversion::binary_promotion(kind, kind);
        let operand = promote(a, kind)?;
        Ok(Self::new(Type::Primitive(kind), ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }))
    }

    /// Bitwise complement
    pub fn com(a: Expr) -> Result<Self> {
        let kind = a
            .ty()
            .numeric_kind()
            .filter(|k| k.is_integral())
            .ok_or_else(|| Error::invalid_argument(format!("cannot complement {}", a.ty())))?;
        let kind = conversion::binary_promotion(kind, kind);
        let operand = promote(a, kind)?;
        Ok(Self::new(Type::Primitive(kind), ExprKind::Unary { op: UnaryOp::Com, operand: Box::new(operand) }))
    }

    pub fn not(a: Expr) -> Result<Self> {
        let operand = boolean_operand(a)?;
        Ok(Self::new(Type::boolean(), ExprKind::Not(Box::new(operand))))
    }

    // ---- comparisons -----------------------------------------------------

    /// Comparison. `Eq`/`Ne` on two references compares identity.
    pub fn compare(op: CompareOp, a: Expr, b: Expr) -> Result<Self> {
        non_void(&a, "operand")?;
        non_void(&b, "operand")?;
        let (left, right) = if op.is_equality() && a.ty().is_reference() && b.ty().is_reference() {
            (a, b)
        } else if op.is_equality() && is_booleanish(a.ty()) && is_booleanish(b.ty()) {
            (boolean_operand(a)?, boolean_operand(b)?)
        } else {
            match (a.ty().numeric_kind(), b.ty().numeric_kind()) {
                (Some(ak), Some(bk)) => {
                    let kind = conversion::binary_promotion(ak, bk);
                    (promote(a, kind)?, promote(b, kind)?)
                }
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "cannot compare {} with {} using {op:?}",
                        a.ty(),
                        b.ty()
                    )))
                }
            }
        };
        Ok(Self::new(Type::boolean(), ExprKind::Compare { op, left: Box::new(left), right: Box::new(right) }))
    }

    pub fn eq(a: Expr, b: Expr) -> Result<Self> {
        Self::compare(CompareOp::Eq, a, b)
    }

    pub fn ne(a: Expr, b: Expr) -> Result<Self> {
        Self::compare(CompareOp::Ne, a, b)
    }

    pub fn lt(a: Expr, b: Expr) -> Result<Self> {
        Self::compare(CompareOp::Lt, a, b)
    }

    pub fn le(a: Expr, b: Expr) -> Result<Self> {
        Self::compare(CompareOp::Le, a, b)
    }

    pub fn gt(a: Expr, b: Expr) -> Result<Self> {
        Self::compare(CompareOp::Gt, a, b)
    }

    pub fn ge(a: Expr, b: Expr) -> Result<Self> {
        Self::compare(CompareOp::Ge, a, b)
    }

    /// Value equality: numeric comparison when both sides are numeric,
    /// otherwise `java.util.Objects.equals`.
    pub fn value_eq(a: Expr, b: Expr) -> Result<Self> {
        non_void(&a, "operand")?;
        non_void(&b, "operand")?;
        let numeric = a.ty().numeric_kind().is_some() && b.ty().numeric_kind().is_some();
        let booleans = is_booleanish(a.ty()) && is_booleanish(b.ty());
        if numeric || booleans {
            let a = if a.ty().is_reference() { conversion::unbox_value(a)? } else { a };
            let b = if b.ty().is_reference() { conversion::unbox_value(b)? } else { b };
            return Self::compare(CompareOp::Eq, a, b);
        }
        let boxed = |e: Expr| if e.ty().is_primitive() { conversion::box_value(e) } else { Ok(e) };
        let equals = MethodRef::of_static("java/util/Objects", "equals", vec![Type::object(), Type::object()], Type::boolean());
        Ok(Self::new(Type::boolean(), ExprKind::Invoke { method: equals, target: None, args: vec![boxed(a)?, boxed(b)?] }))
    }

    /// Short-circuit `&&`
    pub fn cond_and(a: Expr, b: Expr) -> Result<Self> {
        Self::logical(LogicalOp::And, a, b)
    }

    /// Short-circuit `||`
    pub fn cond_or(a: Expr, b: Expr) -> Result<Self> {
        Self::logical(LogicalOp::Or, a, b)
    }

    fn logical(op: LogicalOp, a: Expr, b: Expr) -> Result<Self> {
        let left = boolean_operand(a)?;
        let right = boolean_operand(b)?;
        Ok(Self::new(Type::boolean(), ExprKind::Logical { op, left: Box::new(left), right: Box::new(right) }))
    }

    pub fn instance_of(operand: Expr, class: Type) -> Result<Self> {
        if !operand.ty().is_reference() || !matches!(class, Type::Class(_) | Type::Array(_)) {
            return Err(Error::invalid_argument(format!("instanceof not applicable to {} and {class}", operand.ty())));
        }
        Ok(Self::new(Type::boolean(), ExprKind::InstanceOf { operand: Box::new(operand), class }))
    }

    /// String concatenation of any non-void values
    pub fn concat(parts: Vec<Expr>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::invalid_argument("concatenation needs at least one operand"));
        }
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            non_void(&part, "concatenation operand")?;
            match part.kind {
                ExprKind::Concat(inner) => flat.extend(inner),
                _ => flat.push(part),
            }
        }
        Ok(Self::new(Type::string(), ExprKind::Concat(flat)))
    }

    // ---- conversions -----------------------------------------------------

    pub fn convert(reg: &TypeRegistry, e: Expr, to: &Type) -> Result<Self> {
        conversion::convert(reg, e, to)
    }

    pub fn cast(reg: &TypeRegistry, e: Expr, to: &Type) -> Result<Self> {
        conversion::cast(reg, e, to)
    }

    /// `cond ? then : otherwise`, both arms converted to `ty`
    pub fn conditional(reg: &TypeRegistry, cond: Expr, then: Expr, otherwise: Expr, ty: &Type) -> Result<Self> {
        if ty.is_void() || ty.is_null() {
            return Err(Error::invalid_argument(format!("conditional expression cannot have type {ty}")));
        }
        let cond = boolean_operand(cond)?;
        let then = conversion::convert(reg, then, ty)?;
        let otherwise = conversion::convert(reg, otherwise, ty)?;
        Ok(Self::new(
            ty.clone(),
            ExprKind::Conditional { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise) },
        ))
    }

    // ---- invocation and construction -------------------------------------

    pub fn invoke(reg: &TypeRegistry, method: &MethodRef, target: Option<Expr>, args: Vec<Expr>) -> Result<Self> {
        let target = check_invoke_target(reg, method, target)?;
        let args = convert_args(reg, method, args)?;
        Ok(Self::new(method.ret.clone(), ExprKind::Invoke { method: method.clone(), target: target.map(Box::new), args }))
    }

    /// Pick the most specific applicable candidate: strict conversions
    /// first, then boxing, then variable arity.
    pub fn invoke_best(reg: &TypeRegistry, candidates: &[MethodRef], target: Option<Expr>, args: Vec<Expr>) -> Result<Self> {
        let arg_types: Vec<Type> = args.iter().map(|a| a.ty().clone()).collect();
        let eligible: Vec<&MethodRef> = candidates.iter().filter(|m| m.is_static() == target.is_none()).collect();
        for phase in 0..3 {
            let applicable: Vec<&MethodRef> =
                eligible.iter().copied().filter(|m| is_applicable(reg, m, &arg_types, phase)).collect();
            if applicable.is_empty() {
                continue;
            }
            let best: Vec<&MethodRef> = applicable
                .iter()
                .copied()
                .filter(|m| applicable.iter().all(|other| more_specific(reg, m, other)))
                .collect();
            return match best.as_slice() {
                [one] => Self::invoke(reg, one, target, args),
                _ => Err(Error::invalid_argument(format!(
                    "ambiguous invocation of {} with ({})",
                    applicable[0].name,
                    arg_types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
                ))),
            };
        }
        Err(Error::invalid_argument(format!(
            "no applicable method among {} candidates for ({})",
            candidates.len(),
            arg_types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
        )))
    }

    /// `new C(args)` through the given constructor reference
    pub fn new_instance(reg: &TypeRegistry, ctor: &MethodRef, args: Vec<Expr>) -> Result<Self> {
        if !ctor.is_constructor() {
            return Err(Error::invalid_argument(format!("{} is not a constructor", ctor.name)));
        }
        let args = convert_args(reg, ctor, args)?;
        Ok(Self::new(Type::Class(ctor.owner.clone()), ExprKind::New { ctor: ctor.clone(), args }))
    }

    /// New array of `array_ty`, giving lengths for the leading dimensions
    pub fn new_array(array_ty: Type, dims: Vec<Expr>) -> Result<Self> {
        let max = array_ty.dimensions();
        if max == 0 {
            return Err(Error::invalid_argument(format!("{array_ty} is not an array type")));
        }
        if dims.is_empty() || dims.len() > max || dims.len() > 255 {
            return Err(Error::invalid_argument(format!("{array_ty} cannot be created with {} dimensions", dims.len())));
        }
        let dims = dims.into_iter().map(to_int).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(array_ty, ExprKind::NewArray { dims }))
    }

    /// Array initialized with the given elements
    pub fn array_literal(reg: &TypeRegistry, component: Type, elements: Vec<Expr>) -> Result<Self> {
        if component.is_void() || component.is_null() {
            return Err(Error::invalid_argument(format!("illegal array component type {component}")));
        }
        let elements = elements
            .into_iter()
            .map(|e| conversion::convert(reg, e, &component))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(Type::array_of(component), ExprKind::ArrayLiteral(elements)))
    }

    /// Atomic read-modify-write at the given memory order
    pub fn atomic(reg: &TypeRegistry, op: AtomicOp, access: AtomicAccess, order: MemoryOrder, args: Vec<Expr>) -> Result<Self> {
        if args.len() != op.arity() {
            return Err(Error::invalid_argument(format!("{op:?} takes {} operands, got {}", op.arity(), args.len())));
        }
        let value_ty = access.value_type();
        let legal = match op {
            AtomicOp::GetAndAdd => value_ty.primitive().map(|k| k.is_numeric()).unwrap_or(false),
            AtomicOp::GetAndBitwiseOr | AtomicOp::GetAndBitwiseAnd | AtomicOp::GetAndBitwiseXor => {
                value_ty.primitive().map(|k| k.is_integral() || k == PrimitiveKind::Boolean).unwrap_or(false)
            }
            _ => true,
        };
        if !legal {
            return Err(Error::invalid_argument(format!("{op:?} is not supported on {value_ty}")));
        }
        let args = args
            .into_iter()
            .map(|a| conversion::convert(reg, a, &value_ty))
            .collect::<Result<Vec<_>>>()?;
        let ty = if op.returns_boolean() { Type::boolean() } else { value_ty };
        Ok(Self::new(ty, ExprKind::Atomic { op, access, order, args }))
    }

    /// Visit this expression and every sub-expression, pre-order
    pub(crate) fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Const(_) | ExprKind::Local(_) => {}
            ExprKind::Field { target, .. } => {
                if let Some(t) = target {
                    t.walk(f);
                }
            }
            ExprKind::ArrayElem { array, index, .. } => {
                array.walk(f);
                index.walk(f);
            }
            ExprKind::ArrayLength(e)
            | ExprKind::Widen(e)
            | ExprKind::Box(e)
            | ExprKind::Unbox(e)
            | ExprKind::Cast(e)
            | ExprKind::Not(e) => e.walk(f),
            ExprKind::InstanceOf { operand, .. } | ExprKind::Unary { operand, .. } => operand.walk(f),
            ExprKind::Invoke { target, args, .. } => {
                if let Some(t) = target {
                    t.walk(f);
                }
                args.iter().for_each(|a| a.walk(f));
            }
            ExprKind::New { args, .. } => args.iter().for_each(|a| a.walk(f)),
            ExprKind::NewArray { dims } => dims.iter().for_each(|a| a.walk(f)),
            ExprKind::ArrayLiteral(items) | ExprKind::Concat(items) => items.iter().for_each(|a| a.walk(f)),
            ExprKind::Binary { left, right, .. }
            | ExprKind::Compare { left, right, .. }
            | ExprKind::Logical { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Conditional { cond, then, otherwise } => {
                cond.walk(f);
                then.walk(f);
                otherwise.walk(f);
            }
            ExprKind::Atomic { access, args, .. } => {
                match access {
                    AtomicAccess::Field { target, .. } => {
                        if let Some(t) = target {
                            t.walk(f);
                        }
                    }
                    AtomicAccess::Array { array, index } => {
                        array.walk(f);
                        index.walk(f);
                    }
                }
                args.iter().for_each(|a| a.walk(f));
            }
            ExprKind::AnonInstance { super_args, .. } => super_args.iter().for_each(|a| a.walk(f)),
        }
    }
}

fn check_invoke_target(reg: &TypeRegistry, method: &MethodRef, target: Option<Expr>) -> Result<Option<Expr>> {
    match (method.is_static(), target) {
        (true, None) => Ok(None),
        (true, Some(_)) => Err(Error::invalid_argument(format!("static method {} invoked with a receiver", method.name))),
        (false, None) => Err(Error::invalid_argument(format!("instance method {} requires a receiver", method.name))),
        (false, Some(t)) => {
            let owner = Type::Class(method.owner.clone());
            if !t.ty().is_reference() {
                return Err(Error::invalid_argument(format!("cannot invoke {} on {}", method.name, t.ty())));
            }
            if !t.ty().is_null() && !reg.is_assignable(t.ty(), &owner) {
                return Err(Error::invalid_argument(format!(
                    "receiver of type {} is not a {owner}",
                    t.ty()
                )));
            }
            Ok(Some(t))
        }
    }
}

/// Convert arguments to parameter types, packing trailing variable-arity arguments
fn convert_args(reg: &TypeRegistry, method: &MethodRef, args: Vec<Expr>) -> Result<Vec<Expr>> {
    let params = &method.params;
    let arity_error = |n: usize| {
        Error::invalid_argument(format!("{} expects {} arguments, got {n}", method.name, params.len()))
    };
    let direct = args.len() == params.len()
        && args
            .last()
            .zip(params.last())
            .map(|(a, p)| conversion::find_conversion(reg, a.ty(), p).is_some())
            .unwrap_or(true);
    if method.varargs && !direct {
        let Some(Type::Array(component)) = params.last() else { return Err(arity_error(args.len())) };
        if args.len() + 1 < params.len() {
            return Err(arity_error(args.len()));
        }
        let mut args = args;
        let rest = args.split_off(params.len() - 1);
        args.push(Expr::array_literal(reg, (**component).clone(), rest)?);
        return args.into_iter().zip(params).map(|(a, p)| conversion::convert(reg, a, p)).collect();
    }
    if args.len() != params.len() {
        return Err(arity_error(args.len()));
    }
    args.into_iter().zip(params).map(|(a, p)| conversion::convert(reg, a, p)).collect()
}

fn is_applicable(reg: &TypeRegistry, m: &MethodRef, args: &[Type], phase: u8) -> bool {
    let fits = |a: &Type, p: &Type, allow_boxing: bool| match conversion::find_conversion(reg, a, p) {
        Some(c) => allow_boxing || !c.is_boxing(),
        None => false,
    };
    match phase {
        0 | 1 => args.len() == m.params.len() && args.iter().zip(&m.params).all(|(a, p)| fits(a, p, phase == 1)),
        _ => {
            let Some(Type::Array(component)) = m.params.last().filter(|_| m.varargs) else { return false };
            let fixed = m.params.len() - 1;
            args.len() >= fixed
                && args[..fixed].iter().zip(&m.params).all(|(a, p)| fits(a, p, true))
                && args[fixed..].iter().all(|a| fits(a, component, true))
        }
    }
}

fn more_specific(reg: &TypeRegistry, m: &MethodRef, other: &MethodRef) -> bool {
    m.params.len() == other.params.len()
        && m.params.iter().zip(&other.params).all(|(a, b)| {
            matches!(
                conversion::find_conversion(reg, a, b),
                Some(Conversion::Identity | Conversion::Widen(_) | Conversion::RefWiden)
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::InvokeKind;

    fn local(ty: Type) -> Expr {
        Expr::new(ty, ExprKind::Local(VarId(1)))
    }

    #[test]
    fn test_binary_promotion_widens_narrower_operand() {
        let e = Expr::add(local(Type::int()), local(Type::double())).unwrap();
        assert_eq!(e.ty(), &Type::double());
        let ExprKind::Binary { left, right, .. } = e.kind() else { panic!() };
        assert!(matches!(left.kind(), ExprKind::Widen(_)));
        assert_eq!(right.ty(), &Type::double());

        let e = Expr::mul(local(Type::byte()), local(Type::short())).unwrap();
        assert_eq!(e.ty(), &Type::int());
    }

    #[test]
    fn test_boxed_operands_are_unboxed() {
        let e = Expr::sub(local(Type::class("java/lang/Integer")), Expr::long(1)).unwrap();
        assert_eq!(e.ty(), &Type::long());
    }

    #[test]
    fn test_division_by_zero_builds() {
        assert!(Expr::div(Expr::int(1), Expr::int(0)).is_ok());
        assert!(Expr::rem(Expr::double(1.0), Expr::double(0.0)).is_ok());
    }

    #[test]
    fn test_bitwise_and_shift_rules() {
        assert!(Expr::and(Expr::double(1.0), Expr::int(1)).is_err());
        assert_eq!(Expr::xor(Expr::boolean(true), Expr::boolean(false)).unwrap().ty(), &Type::boolean());
        let e = Expr::shl(local(Type::int()), local(Type::long())).unwrap();
        assert_eq!(e.ty(), &Type::int());
        let e = Expr::shl(local(Type::long()), Expr::int(3)).unwrap();
        assert_eq!(e.ty(), &Type::long());
    }

    #[test]
    fn test_reference_equality_does_not_unbox() {
        let a = local(Type::class("java/lang/Integer"));
        let b = local(Type::class("java/lang/Integer"));
        let e = Expr::eq(a.clone(), b.clone()).unwrap();
        let ExprKind::Compare { left, .. } = e.kind() else { panic!() };
        assert_eq!(left.ty(), &Type::class("java/lang/Integer"));

        let v = Expr::value_eq(a, b).unwrap();
        let ExprKind::Compare { left, .. } = v.kind() else { panic!() };
        assert_eq!(left.ty(), &Type::int());

        let s = Expr::value_eq(local(Type::string()), Expr::string("x")).unwrap();
        assert!(matches!(s.kind(), ExprKind::Invoke { .. }));
    }

    #[test]
    fn test_invoke_checks_arity_and_converts() {
        let reg = TypeRegistry::new();
        let max = MethodRef::of_static("java/lang/Math", "max", vec![Type::long(), Type::long()], Type::long());
        let e = Expr::invoke(&reg, &max, None, vec![Expr::int(1), local(Type::int())]).unwrap();
        let ExprKind::Invoke { args, .. } = e.kind() else { panic!() };
        assert!(args.iter().all(|a| a.ty() == &Type::long()));

        let err = Expr::invoke(&reg, &max, None, vec![Expr::int(1)]).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(Expr::invoke(&reg, &max, Some(Expr::string("x")), vec![Expr::int(1), Expr::int(2)]).is_err());
    }

    #[test]
    fn test_varargs_packing() {
        let reg = TypeRegistry::new();
        let of = MethodRef::of_interface_static("java/util/List", "of", vec![Type::array_of(Type::object())], Type::class("java/util/List"))
            .with_varargs();
        let e = Expr::invoke(&reg, &of, None, vec![Expr::int(1), Expr::string("a")]).unwrap();
        let ExprKind::Invoke { args, .. } = e.kind() else { panic!() };
        assert_eq!(args.len(), 1);
        assert!(matches!(args[0].kind(), ExprKind::ArrayLiteral(items) if items.len() == 2));
    }

    #[test]
    fn test_invoke_best_prefers_strict_phase() {
        let reg = TypeRegistry::new();
        let owner = "java/io/PrintStream";
        let cands = vec![
            MethodRef::of_virtual(owner, "println", vec![Type::object()], Type::void()),
            MethodRef::of_virtual(owner, "println", vec![Type::long()], Type::void()),
            MethodRef::of_virtual(owner, "println", vec![Type::double()], Type::void()),
        ];
        let out = local(Type::class(owner));
        let e = Expr::invoke_best(&reg, &cands, Some(out.clone()), vec![Expr::int(1)]).unwrap();
        let ExprKind::Invoke { method, .. } = e.kind() else { panic!() };
        assert_eq!(method.params, vec![Type::long()]);
        assert_eq!(method.kind, InvokeKind::Virtual);

        let e = Expr::invoke_best(&reg, &cands, Some(out), vec![Expr::string("s")]).unwrap();
        let ExprKind::Invoke { method, .. } = e.kind() else { panic!() };
        assert_eq!(method.params, vec![Type::object()]);
    }

    #[test]
    fn test_atomic_validation() {
        let reg = TypeRegistry::new();
        let f = FieldRef::instance("com/example/C", "count", Type::int());
        let access = AtomicAccess::field(Some(local(Type::class("com/example/C"))), &f).unwrap();
        let e = Expr::atomic(&reg, AtomicOp::CompareAndSet, access.clone(), MemoryOrder::Volatile, vec![Expr::int(0), Expr::int(1)])
            .unwrap();
        assert_eq!(e.ty(), &Type::boolean());
        assert!(Expr::atomic(&reg, AtomicOp::GetAndAdd, access, MemoryOrder::Acquire, vec![]).is_err());

        let s = FieldRef::instance("com/example/C", "name", Type::string());
        let access = AtomicAccess::field(Some(local(Type::class("com/example/C"))), &s).unwrap();
        assert!(Expr::atomic(&reg, AtomicOp::GetAndAdd, access, MemoryOrder::Volatile, vec![Expr::string("x")]).is_err());
    }

    #[test]
    fn test_conditional_converts_arms() {
        let reg = TypeRegistry::new();
        let e = Expr::conditional(&reg, Expr::boolean(true), Expr::int(1), Expr::double(2.0), &Type::double()).unwrap();
        let ExprKind::Conditional { then, .. } = e.kind() else { panic!() };
        assert_eq!(then.ty(), &Type::double());
        assert!(Expr::conditional(&reg, Expr::int(1), Expr::int(1), Expr::int(2), &Type::int()).is_err());
    }
}
