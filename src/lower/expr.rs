//! Expression and condition lowering

use crate::backend::opcodes::*;
use crate::backend::{EnclosingMethod, Insn, LdcConst};
use crate::error::{Error, Result};
use crate::ir::{
    AnonId, AtomicAccess, BinaryOp, CompareOp, Constant, Expr, ExprKind, FieldRef, LogicalOp, MemoryOrder, MethodRef,
    UnaryOp, VarId,
};
use crate::types::{method_descriptor, PrimitiveKind, Type, OBJECT};

use super::handles::{class_literal, HandleKey, VAR_HANDLE};
use super::method::{array_load_op, array_store_op, kind_offset, load_op, MethodLowerer};

const STRING_BUILDER: &str = "java/lang/StringBuilder";
/// Largest arity of the fixed-argument `List.of`/`Set.of`/`Map.of` overloads
const MAX_FIXED_ARGS: usize = 10;

/// Location of an ordered or atomic access
enum Coords<'e> {
    Field { target: Option<&'e Expr>, field: &'e FieldRef },
    Array { array: &'e Expr, index: &'e Expr },
}

impl<'c, 'm> MethodLowerer<'c, 'm> {
    /// Push the value of `e` (nothing for `void` expressions)
    pub(super) fn expr(&mut self, e: &Expr) -> Result<()> {
        match e.kind() {
            ExprKind::Const(c) => self.constant(c),
            ExprKind::Local(v) => self.load_var(*v),
            ExprKind::Field { target, field, order } => {
                if *order == MemoryOrder::Plain {
                    if let Some(t) = target {
                        self.expr(t)?;
                    }
                    let op = if field.is_static { GETSTATIC } else { GETFIELD };
                    self.field_insn(op, field);
                    Ok(())
                } else {
                    let coords = Coords::Field { target: target.as_deref(), field };
                    self.var_handle_call(coords, order.get_method(), &[], e.ty())
                }
            }
            ExprKind::ArrayElem { array, index, order } => {
                if *order == MemoryOrder::Plain {
                    self.expr(array)?;
                    self.expr(index)?;
                    self.op(array_load_op(e.ty()));
                    Ok(())
                } else {
                    self.var_handle_call(Coords::Array { array, index }, order.get_method(), &[], e.ty())
                }
            }
            ExprKind::ArrayLength(array) => {
                self.expr(array)?;
                self.op(ARRAYLENGTH);
                Ok(())
            }
            ExprKind::Invoke { method, target, args } => {
                if let Some(t) = target {
                    self.expr(t)?;
                }
                for a in args {
                    self.expr(a)?;
                }
                self.invoke(method);
                Ok(())
            }
            ExprKind::New { ctor, args } => {
                self.emit(Insn::Type { op: NEW, class: ctor.owner.clone() });
                self.op(DUP);
                for a in args {
                    self.expr(a)?;
                }
                self.invoke(ctor);
                Ok(())
            }
            ExprKind::NewArray { dims } => {
                for d in dims {
                    self.expr(d)?;
                }
                if dims.len() == 1 {
                    self.new_array(e.ty())
                } else {
                    let dims = u8::try_from(dims.len()).map_err(|_| Error::invalid_argument("too many array dimensions"))?;
                    self.emit(Insn::MultiANewArray { descriptor: e.ty().descriptor(), dims });
                    Ok(())
                }
            }
            ExprKind::ArrayLiteral(items) => {
                let component = e.ty().component().cloned().unwrap_or_else(Type::object);
                self.emit(Insn::Push(array_len(items.len())?));
                self.new_array(e.ty())?;
                for (i, item) in items.iter().enumerate() {
                    self.op(DUP);
                    self.emit(Insn::Push(array_len(i)?));
                    self.expr(item)?;
                    self.op(array_store_op(&component));
                }
                Ok(())
            }
            ExprKind::Widen(x) | ExprKind::Cast(x) if e.ty().is_primitive() => {
                self.expr(x)?;
                let from = primitive_of(x)?;
                let to = primitive_of(e)?;
                for op in conversion_ops(from, to) {
                    self.op(op);
                }
                Ok(())
            }
            ExprKind::Widen(x) => self.expr(x),
            ExprKind::Cast(x) => {
                self.expr(x)?;
                if !x.ty().is_null() && x.ty() != e.ty() {
                    self.emit(Insn::Type { op: CHECKCAST, class: e.ty().class_constant_name() });
                }
                Ok(())
            }
            ExprKind::Box(x) => {
                self.expr(x)?;
                self.box_value(primitive_of(x)?);
                Ok(())
            }
            ExprKind::Unbox(x) => {
                self.expr(x)?;
                let kind = primitive_of(e)?;
                let owner = kind.box_class();
                if x.ty() != &Type::class(owner) {
                    self.emit(Insn::Type { op: CHECKCAST, class: owner.to_string() });
                }
                let name = format!("{}Value", kind.java_name());
                self.call(INVOKEVIRTUAL, owner, &name, &format!("(){}", kind.descriptor()), false);
                Ok(())
            }
            ExprKind::InstanceOf { operand, class } => {
                self.expr(operand)?;
                self.emit(Insn::Type { op: INSTANCEOF, class: class.class_constant_name() });
                Ok(())
            }
            ExprKind::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                self.op(binary_op(*op, e.ty())?);
                Ok(())
            }
            ExprKind::Unary { op: UnaryOp::Neg, operand } => {
                self.expr(operand)?;
                self.op(INEG + kind_offset(e.ty()));
                Ok(())
            }
            ExprKind::Unary { op: UnaryOp::Com, operand } => {
                self.expr(operand)?;
                if e.ty().primitive() == Some(PrimitiveKind::Long) {
                    self.ldc(LdcConst::Long(-1));
                    self.op(LXOR);
                } else {
                    self.emit(Insn::Push(-1));
                    self.op(IXOR);
                }
                Ok(())
            }
            ExprKind::Not(_) | ExprKind::Compare { .. } | ExprKind::Logical { .. } => self.boolean_value(e),
            ExprKind::Conditional { cond, then, otherwise } => {
                let (other, end) = (self.new_label(), self.new_label());
                self.cond_jump(cond, false, other)?;
                self.expr(then)?;
                self.jump(GOTO, end);
                self.place(other);
                self.expr(otherwise)?;
                self.place(end);
                Ok(())
            }
            ExprKind::Concat(parts) => self.concat(parts),
            ExprKind::Atomic { op, access, order, args } => {
                let coords = match access {
                    AtomicAccess::Field { target, field } => Coords::Field { target: target.as_deref(), field },
                    AtomicAccess::Array { array, index } => Coords::Array { array, index },
                };
                let values: Vec<&Expr> = args.iter().collect();
                self.var_handle_call(coords, &op.method_name(*order), &values, e.ty())
            }
            ExprKind::AnonInstance { anon, super_args } => self.anon_instance(*anon, super_args),
        }
    }

    /// Evaluate for side effects only
    pub(super) fn discard(&mut self, e: &Expr) -> Result<()> {
        self.expr(e)?;
        match e.ty().slot_size() {
            _ if e.ty().is_void() => {}
            2 => self.op(POP2),
            _ => self.op(POP),
        }
        Ok(())
    }

    fn field_insn(&mut self, op: u8, field: &FieldRef) {
        self.emit(Insn::Field {
            op,
            owner: field.owner.clone(),
            name: field.name.clone(),
            descriptor: field.ty.descriptor(),
        });
    }

    pub(super) fn put_field(&mut self, target: Option<&Expr>, field: &FieldRef, value: &Expr, order: MemoryOrder) -> Result<()> {
        if order != MemoryOrder::Plain {
            let coords = Coords::Field { target, field };
            return self.var_handle_call(coords, order.set_method(), &[value], &Type::void());
        }
        if let Some(t) = target {
            self.expr(t)?;
        }
        self.expr(value)?;
        let op = if field.is_static { PUTSTATIC } else { PUTFIELD };
        self.field_insn(op, field);
        Ok(())
    }

    pub(super) fn array_store(&mut self, array: &Expr, index: &Expr, value: &Expr, order: MemoryOrder) -> Result<()> {
        if order != MemoryOrder::Plain {
            return self.var_handle_call(Coords::Array { array, index }, order.set_method(), &[value], &Type::void());
        }
        let component = array.ty().component().cloned().unwrap_or_else(Type::object);
        self.expr(array)?;
        self.expr(index)?;
        self.expr(value)?;
        self.op(array_store_op(&component));
        Ok(())
    }

    pub(super) fn load_var(&mut self, var: VarId) -> Result<()> {
        let code = self.code()?;
        let ty = &code.vars[var.0].ty;
        if let Ok(slot) = self.slot_of(var) {
            self.emit(Insn::Local { op: load_op(ty), slot });
            return Ok(());
        }
        // a variable of an enclosing method, copied into a capture field
        let anon = self.anon.ok_or_else(|| Error::invalid_state(format!("variable {} has no slot", code.vars[var.0].name)))?;
        let index = code.anons[anon.0]
            .captures
            .iter()
            .position(|c| *c == var)
            .ok_or_else(|| Error::invalid_state(format!("{} is not captured", code.vars[var.0].name)))?;
        self.emit(Insn::Local { op: ALOAD, slot: 0 });
        self.emit(Insn::Field {
            op: GETFIELD,
            owner: self.class_name.clone(),
            name: super::nested::capture_field(index),
            descriptor: ty.descriptor(),
        });
        Ok(())
    }

    fn new_array(&mut self, array_ty: &Type) -> Result<()> {
        let component = array_ty
            .component()
            .ok_or_else(|| Error::invalid_state(format!("{array_ty} is not an array type")))?;
        match component.primitive() {
            Some(kind) => self.emit(Insn::NewArray(kind)),
            None => self.emit(Insn::Type { op: ANEWARRAY, class: component.class_constant_name() }),
        }
        Ok(())
    }

    fn box_value(&mut self, kind: PrimitiveKind) {
        let owner = kind.box_class();
        self.call(INVOKESTATIC, owner, "valueOf", &format!("({})L{owner};", kind.descriptor()), false);
    }

    fn concat(&mut self, parts: &[Expr]) -> Result<()> {
        self.emit(Insn::Type { op: NEW, class: STRING_BUILDER.to_string() });
        self.op(DUP);
        self.call(INVOKESPECIAL, STRING_BUILDER, "<init>", "()V", false);
        for part in parts {
            self.expr(part)?;
            let arg = match part.ty() {
                Type::Primitive(PrimitiveKind::Byte | PrimitiveKind::Short) => "I".to_string(),
                Type::Primitive(k) => k.descriptor().to_string(),
                t if t.is_string() => "Ljava/lang/String;".to_string(),
                _ => "Ljava/lang/Object;".to_string(),
            };
            self.call(INVOKEVIRTUAL, STRING_BUILDER, "append", &format!("({arg})Ljava/lang/StringBuilder;"), false);
        }
        self.call(INVOKEVIRTUAL, STRING_BUILDER, "toString", "()Ljava/lang/String;", false);
        Ok(())
    }

    // ---- constants -------------------------------------------------------

    fn constant(&mut self, c: &Constant) -> Result<()> {
        match c {
            Constant::Null => self.op(ACONST_NULL),
            Constant::Boolean(v) => self.emit(Insn::Push(i32::from(*v))),
            Constant::Byte(v) => self.emit(Insn::Push(i32::from(*v))),
            Constant::Char(v) => self.emit(Insn::Push(i32::from(*v))),
            Constant::Short(v) => self.emit(Insn::Push(i32::from(*v))),
            Constant::Int(v) => self.emit(Insn::Push(*v)),
            Constant::Long(0) => self.op(LCONST_0),
            Constant::Long(1) => self.op(LCONST_1),
            Constant::Long(v) => self.ldc(LdcConst::Long(*v)),
            Constant::Float(v) if v.to_bits() == 0.0f32.to_bits() => self.op(FCONST_0),
            Constant::Float(v) if *v == 1.0 => self.op(FCONST_1),
            Constant::Float(v) if *v == 2.0 => self.op(FCONST_2),
            Constant::Float(v) => self.ldc(LdcConst::Float(*v)),
            Constant::Double(v) if v.to_bits() == 0.0f64.to_bits() => self.op(DCONST_0),
            Constant::Double(v) if *v == 1.0 => self.op(DCONST_1),
            Constant::Double(v) => self.ldc(LdcConst::Double(*v)),
            Constant::String(s) => self.ldc(LdcConst::String(s.clone())),
            Constant::Class(ty) => self.emit(class_literal(ty)),
            Constant::List(_) | Constant::Set(_) | Constant::Map(_) => return self.collection(c),
        }
        Ok(())
    }

    fn boxed_constant(&mut self, c: &Constant) -> Result<()> {
        self.constant(c)?;
        if let Some(kind) = c.primitive_kind() {
            self.box_value(kind);
        }
        Ok(())
    }

    /// Immutable collection literal, inline or from the resource blob
    fn collection(&mut self, c: &Constant) -> Result<()> {
        let ty = c.ty();
        if c.element_count() >= self.cx.config().resource_constant_threshold && !c.requires_inline() {
            let name = self.cx.resources.intern(c)?;
            let host = self.cx.host().to_string();
            self.emit(Insn::Field { op: GETSTATIC, owner: host, name, descriptor: ty.descriptor() });
            return Ok(());
        }
        let owner = ty.class_constant_name();
        match c {
            Constant::List(items) | Constant::Set(items) => {
                let desc = if items.len() <= MAX_FIXED_ARGS {
                    for item in items {
                        self.boxed_constant(item)?;
                    }
                    format!("({})L{owner};", "Ljava/lang/Object;".repeat(items.len()))
                } else {
                    self.emit(Insn::Push(array_len(items.len())?));
                    self.emit(Insn::Type { op: ANEWARRAY, class: OBJECT.to_string() });
                    for (i, item) in items.iter().enumerate() {
                        self.op(DUP);
                        self.emit(Insn::Push(array_len(i)?));
                        self.boxed_constant(item)?;
                        self.op(AASTORE);
                    }
                    format!("([Ljava/lang/Object;)L{owner};")
                };
                self.call(INVOKESTATIC, &owner, "of", &desc, true);
            }
            Constant::Map(entries) => {
                if entries.len() <= MAX_FIXED_ARGS {
                    for (k, v) in entries {
                        self.boxed_constant(k)?;
                        self.boxed_constant(v)?;
                    }
                    let desc = format!("({})Ljava/util/Map;", "Ljava/lang/Object;".repeat(entries.len() * 2));
                    self.call(INVOKESTATIC, &owner, "of", &desc, true);
                } else {
                    self.emit(Insn::Push(array_len(entries.len())?));
                    self.emit(Insn::Type { op: ANEWARRAY, class: "java/util/Map$Entry".to_string() });
                    for (i, (k, v)) in entries.iter().enumerate() {
                        self.op(DUP);
                        self.emit(Insn::Push(array_len(i)?));
                        self.boxed_constant(k)?;
                        self.boxed_constant(v)?;
                        self.call(
                            INVOKESTATIC,
                            &owner,
                            "entry",
                            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/util/Map$Entry;",
                            true,
                        );
                        self.op(AASTORE);
                    }
                    self.call(INVOKESTATIC, &owner, "ofEntries", "([Ljava/util/Map$Entry;)Ljava/util/Map;", true);
                }
            }
            _ => return Err(Error::invalid_state("not a collection literal")),
        }
        Ok(())
    }

    // ---- conditions ------------------------------------------------------

    /// Materialize a condition as 0 or 1
    fn boolean_value(&mut self, e: &Expr) -> Result<()> {
        let (no, end) = (self.new_label(), self.new_label());
        self.cond_jump(e, false, no)?;
        self.emit(Insn::Push(1));
        self.jump(GOTO, end);
        self.place(no);
        self.emit(Insn::Push(0));
        self.place(end);
        Ok(())
    }

    /// Jump to `target` when `e` evaluates to `jump_if`, otherwise fall through
    pub(super) fn cond_jump(&mut self, e: &Expr, jump_if: bool, target: crate::backend::Label) -> Result<()> {
        match e.kind() {
            ExprKind::Const(Constant::Boolean(v)) => {
                if *v == jump_if {
                    self.jump(GOTO, target);
                }
                Ok(())
            }
            ExprKind::Not(x) => self.cond_jump(x, !jump_if, target),
            ExprKind::Logical { op, left, right } => {
                let short_circuits = matches!((op, jump_if), (LogicalOp::And, true) | (LogicalOp::Or, false));
                if short_circuits {
                    let skip = self.new_label();
                    self.cond_jump(left, !jump_if, skip)?;
                    self.cond_jump(right, jump_if, target)?;
                    self.place(skip);
                } else {
                    self.cond_jump(left, jump_if, target)?;
                    self.cond_jump(right, jump_if, target)?;
                }
                Ok(())
            }
            ExprKind::Compare { op, left, right } => self.compare_jump(*op, left, right, jump_if, target),
            _ => {
                self.expr(e)?;
                self.jump(if jump_if { IFNE } else { IFEQ }, target);
                Ok(())
            }
        }
    }

    fn compare_jump(
        &mut self,
        op: CompareOp,
        left: &Expr,
        right: &Expr,
        jump_if: bool,
        target: crate::backend::Label,
    ) -> Result<()> {
        let effective = if jump_if { op } else { op.negate() };
        if left.ty().is_reference() || right.ty().is_reference() {
            if !op.is_equality() {
                return Err(Error::invalid_state("references only compare for identity"));
            }
            let eq = effective == CompareOp::Eq;
            if right.is_null_constant() || left.is_null_constant() {
                let operand = if right.is_null_constant() { left } else { right };
                self.expr(operand)?;
                self.jump(if eq { IFNULL } else { IFNONNULL }, target);
            } else {
                self.expr(left)?;
                self.expr(right)?;
                self.jump(if eq { IF_ACMPEQ } else { IF_ACMPNE }, target);
            }
            return Ok(());
        }

        self.expr(left)?;
        match left.ty().primitive() {
            Some(PrimitiveKind::Long) => {
                self.expr(right)?;
                self.op(LCMP);
            }
            // NaN makes every ordered comparison false
            Some(PrimitiveKind::Float) => {
                self.expr(right)?;
                self.op(if matches!(op, CompareOp::Lt | CompareOp::Le) { FCMPG } else { FCMPL });
            }
            Some(PrimitiveKind::Double) => {
                self.expr(right)?;
                self.op(if matches!(op, CompareOp::Lt | CompareOp::Le) { DCMPG } else { DCMPL });
            }
            _ => {
                if !matches!(right.as_constant(), Some(Constant::Int(0) | Constant::Boolean(false))) {
                    self.expr(right)?;
                    self.jump(IF_ICMPEQ + compare_offset(effective), target);
                    return Ok(());
                }
            }
        }
        self.jump(IFEQ + compare_offset(effective), target);
        Ok(())
    }

    // ---- ordered access --------------------------------------------------

    /// `VarHandle` access-mode call on the handle for `coords`
    fn var_handle_call(&mut self, coords: Coords<'_>, method: &str, values: &[&Expr], ret: &Type) -> Result<()> {
        let (key, value_ty) = match &coords {
            Coords::Field { field, .. } => (HandleKey::Field((*field).clone()), field.ty.clone()),
            Coords::Array { array, .. } => {
                let component = array
                    .ty()
                    .component()
                    .cloned()
                    .ok_or_else(|| Error::invalid_state(format!("{} is not an array type", array.ty())))?;
                (HandleKey::Array(array.ty().clone()), component)
            }
        };
        let version = self.cx.config().target_version;
        let name = self.cx.handles.intern(key, version)?;
        let host = self.cx.host().to_string();
        self.emit(Insn::Field { op: GETSTATIC, owner: host, name, descriptor: format!("L{VAR_HANDLE};") });

        let mut params = Vec::new();
        match coords {
            Coords::Field { target, field } => {
                if let Some(t) = target {
                    self.expr(t)?;
                    params.push(Type::Class(field.owner.clone()));
                }
            }
            Coords::Array { array, index } => {
                self.expr(array)?;
                self.expr(index)?;
                params.push(array.ty().clone());
                params.push(Type::int());
            }
        }
        for v in values {
            self.expr(v)?;
            params.push(value_ty.clone());
        }
        self.call(INVOKEVIRTUAL, VAR_HANDLE, method, &method_descriptor(&params, ret), false);
        Ok(())
    }

    // ---- synthesized classes ---------------------------------------------

    fn anon_instance(&mut self, anon: AnonId, super_args: &[Expr]) -> Result<()> {
        let code = self.code()?;
        let enclosing = EnclosingMethod { class: self.class_name.clone(), method: self.method.clone() };
        let name = self.cx.anon_class(code, anon, enclosing)?;
        let node = &code.anons[anon.0];
        self.emit(Insn::Type { op: NEW, class: name.clone() });
        self.op(DUP);
        for a in super_args {
            self.expr(a)?;
        }
        for v in &node.captures {
            self.load_var(*v)?;
        }
        let ctor = MethodRef::constructor(&name, super::nested::constructor_params(code, anon));
        self.invoke(&ctor);
        Ok(())
    }
}

fn primitive_of(e: &Expr) -> Result<PrimitiveKind> {
    e.ty().primitive().ok_or_else(|| Error::invalid_state(format!("expected a primitive operand, found {}", e.ty())))
}

fn array_len(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::invalid_argument("array literal is too large"))
}

fn compare_offset(op: CompareOp) -> u8 {
    match op {
        CompareOp::Eq => 0,
        CompareOp::Ne => 1,
        CompareOp::Lt => 2,
        CompareOp::Ge => 3,
        CompareOp::Gt => 4,
        CompareOp::Le => 5,
    }
}

fn binary_op(op: BinaryOp, ty: &Type) -> Result<u8> {
    let offset = kind_offset(ty);
    if offset > 3 {
        return Err(Error::invalid_state(format!("arithmetic on {ty}")));
    }
    let base = match op {
        BinaryOp::Add => IADD,
        BinaryOp::Sub => ISUB,
        BinaryOp::Mul => IMUL,
        BinaryOp::Div => IDIV,
        BinaryOp::Rem => IREM,
        BinaryOp::Shl => ISHL,
        BinaryOp::Shr => ISHR,
        BinaryOp::Ushr => IUSHR,
        BinaryOp::And => IAND,
        BinaryOp::Or => IOR,
        BinaryOp::Xor => IXOR,
    };
    // shifts and bitwise ops only come in int and long flavours
    if (op.is_shift() || op.is_bitwise()) && offset > 1 {
        return Err(Error::invalid_state(format!("{} on {ty}", op.symbol())));
    }
    Ok(base + offset)
}

/// Instructions converting a value of kind `from` to kind `to`
pub(super) fn conversion_ops(from: PrimitiveKind, to: PrimitiveKind) -> Vec<u8> {
    use PrimitiveKind::*;
    let mut ops = Vec::new();
    let mut from = from;
    match (from, to) {
        (Long, Long) | (Float, Float) | (Double, Double) => return ops,
        (Long, Float) => ops.push(L2F),
        (Long, Double) => ops.push(L2D),
        (Float, Long) => ops.push(F2L),
        (Float, Double) => ops.push(F2D),
        (Double, Long) => ops.push(D2L),
        (Double, Float) => ops.push(D2F),
        (_, Long) => ops.push(I2L),
        (_, Float) => ops.push(I2F),
        (_, Double) => ops.push(I2D),
        (Long, _) | (Float, _) | (Double, _) => {
            ops.push(match from {
                Long => L2I,
                Float => F2I,
                _ => D2I,
            });
            from = Int;
        }
        _ => {}
    }
    match to {
        Byte if from != Byte => ops.push(I2B),
        Short if !matches!(from, Byte | Short) => ops.push(I2S),
        Char if from != Char => ops.push(I2C),
        _ => {}
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveKind::*;

    #[test]
    fn test_conversion_chains() {
        assert_eq!(conversion_ops(Int, Long), vec![I2L]);
        assert_eq!(conversion_ops(Char, Double), vec![I2D]);
        assert_eq!(conversion_ops(Long, Byte), vec![L2I, I2B]);
        assert_eq!(conversion_ops(Double, Char), vec![D2I, I2C]);
        assert_eq!(conversion_ops(Float, Int), vec![F2I]);
        assert_eq!(conversion_ops(Byte, Short), Vec::<u8>::new());
        assert_eq!(conversion_ops(Short, Char), vec![I2C]);
        assert_eq!(conversion_ops(Int, Int), Vec::<u8>::new());
    }

    #[test]
    fn test_binary_opcodes() {
        assert_eq!(binary_op(BinaryOp::Add, &Type::double()).unwrap(), IADD + 3);
        assert_eq!(binary_op(BinaryOp::Ushr, &Type::long()).unwrap(), LUSHR);
        assert_eq!(binary_op(BinaryOp::Xor, &Type::boolean()).unwrap(), IXOR);
        assert!(binary_op(BinaryOp::Shl, &Type::float()).is_err());
    }

    #[test]
    fn test_compare_offsets_follow_opcode_order() {
        assert_eq!(IFEQ + compare_offset(CompareOp::Le), IFLE);
        assert_eq!(IF_ICMPEQ + compare_offset(CompareOp::Ge), IF_ICMPGE);
    }
}
