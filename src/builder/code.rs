//! Method body arena: variables, simple statements and completion checks

use std::sync::Arc;

use log::trace;

use crate::error::{Error, Result};
use crate::ir::{AnonId, Block, Expr, ExprKind, FieldRef, MemoryOrder, MethodRef, Stmt, Var, VarId};
use crate::types::{conversion, GenericType, Type, TypeParam, TypeRegistry, TypeScope, THROWABLE};

use super::block::{AnonNode, BlockNode, FrameNode, LoopNode, Open, SwitchNode, VarKind, VarNode};

/// Shape of the method a [`Code`] builds
#[derive(Debug, Clone)]
pub(crate) struct FrameSpec {
    pub name: String,
    pub is_static: bool,
    pub is_ctor: bool,
    pub params: Vec<(String, Type, Option<GenericType>)>,
    pub ret: Type,
}

/// Builder for one method body
///
/// Blocks, variables, loops and switches are arena entries addressed by
/// the handles in [`crate::ir`]. Statements can only be added to the
/// innermost active block; everything else fails with an
/// `InvalidState` error.
#[derive(Debug)]
pub struct Code {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) host: String,
    pub(crate) super_name: String,
    pub(crate) host_is_interface: bool,
    /// Method type parameters first, then the class's
    pub(crate) type_params: Vec<TypeParam>,
    pub(crate) blocks: Vec<BlockNode>,
    pub(crate) vars: Vec<VarNode>,
    pub(crate) loops: Vec<LoopNode>,
    pub(crate) switches: Vec<SwitchNode>,
    pub(crate) frames: Vec<FrameNode>,
    pub(crate) anons: Vec<AnonNode>,
    pub(crate) current: Option<Block>,
    pub(crate) open: Vec<Open>,
    pub(crate) finished: bool,
    hidden_count: usize,
}

impl Code {
    pub(crate) fn new(
        registry: Arc<TypeRegistry>,
        host: &str,
        super_name: &str,
        host_is_interface: bool,
        type_params: Vec<TypeParam>,
        spec: FrameSpec,
    ) -> Self {
        let mut code = Code {
            registry,
            host: host.to_string(),
            super_name: super_name.to_string(),
            host_is_interface,
            type_params,
            blocks: Vec::new(),
            vars: Vec::new(),
            loops: Vec::new(),
            switches: Vec::new(),
            frames: Vec::new(),
            anons: Vec::new(),
            current: None,
            open: Vec::new(),
            finished: false,
            hidden_count: 0,
        };
        let this_ty = if spec.is_static { None } else { Some(Type::Class(code.host.clone())) };
        let root = code.new_frame(None, spec.name, this_ty, spec.params, spec.ret, spec.is_ctor, None);
        code.current = Some(root);
        code
    }

    /// Create a frame with its root block, `this` and parameter variables
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_frame(
        &mut self,
        anon: Option<AnonId>,
        name: String,
        this_ty: Option<Type>,
        params: Vec<(String, Type, Option<GenericType>)>,
        ret: Type,
        is_ctor: bool,
        parent: Option<Block>,
    ) -> Block {
        let frame = self.frames.len();
        let root = self.new_block(parent, frame);
        let is_static = this_ty.is_none();
        let this_var = this_ty.map(|ty| self.add_var("this", ty, None, root, VarKind::This, true, false));
        let params = params
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty, generic))| self.add_var(&name, ty, generic, root, VarKind::Param(i), true, false))
            .collect();
        self.frames.push(FrameNode { anon, name, root, this_var, params, is_static, is_ctor, ret, chained: false });
        root
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_var(
        &mut self,
        name: &str,
        ty: Type,
        generic: Option<GenericType>,
        scope: Block,
        kind: VarKind,
        assigned: bool,
        hidden: bool,
    ) -> VarId {
        let frame = self.blocks[scope.0].frame;
        self.vars.push(VarNode { name: name.to_string(), ty, generic, scope, frame, kind, assigned, hidden });
        VarId(self.vars.len() - 1)
    }

    fn var(&self, id: VarId) -> Var {
        Var { id, ty: self.vars[id.0].ty.clone() }
    }

    /// Root block of the method body
    pub fn root(&self) -> Block {
        self.frames[0].root
    }

    /// Class hierarchy used to check conversions and calls
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Internal name of the class being built
    pub fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn frame_of(&self, blk: Block) -> &FrameNode {
        &self.frames[self.blocks[blk.0].frame]
    }

    /// The receiver of the method that owns `blk`
    pub fn this(&self, blk: Block) -> Result<Var> {
        let node = self.blocks.get(blk.0).ok_or_else(|| Error::invalid_argument("unknown block"))?;
        let frame = &self.frames[node.frame];
        frame
            .this_var
            .map(|id| self.var(id))
            .ok_or_else(|| Error::invalid_state(format!("static method {} has no receiver", frame.name)))
    }

    /// Parameter `index` of the method that owns `blk`
    pub fn param(&self, blk: Block, index: usize) -> Result<Var> {
        let node = self.blocks.get(blk.0).ok_or_else(|| Error::invalid_argument("unknown block"))?;
        let frame = &self.frames[node.frame];
        frame
            .params
            .get(index)
            .map(|id| self.var(*id))
            .ok_or_else(|| Error::invalid_argument(format!("{} has no parameter {index}", frame.name)))
    }

    pub fn params(&self, blk: Block) -> Result<Vec<Var>> {
        let node = self.blocks.get(blk.0).ok_or_else(|| Error::invalid_argument("unknown block"))?;
        Ok(self.frames[node.frame].params.iter().map(|id| self.var(*id)).collect())
    }

    // ---- declarations ----------------------------------------------------

    /// Declare an unassigned local in `blk`
    pub fn declare(&mut self, blk: Block, name: &str, ty: Type) -> Result<Var> {
        self.declare_var(blk, name, ty, None, false)
    }

    /// Declare a local of a generic type; the erasure is its runtime type
    pub fn declare_generic(&mut self, blk: Block, name: &str, ty: GenericType) -> Result<Var> {
        let erased = ty.erasure(&TypeScope::of(&self.type_params))?;
        self.declare_var(blk, name, erased, Some(ty), false)
    }

    /// Declare a local and assign its initial value
    pub fn declare_init(&mut self, blk: Block, name: &str, ty: Type, value: Expr) -> Result<Var> {
        self.guard(blk)?;
        let value = conversion::convert(&self.registry, value, &ty)?;
        self.check_expr(blk, &value)?;
        let var = self.declare_var(blk, name, ty, None, false)?;
        self.push(blk, Stmt::Store { var: var.id, value });
        self.vars[var.id.0].assigned = true;
        Ok(var)
    }

    fn declare_var(&mut self, blk: Block, name: &str, ty: Type, generic: Option<GenericType>, hidden: bool) -> Result<Var> {
        self.guard(blk)?;
        if ty.is_void() || ty.is_null() {
            return Err(Error::invalid_argument(format!("local {name} cannot have type {ty}")));
        }
        if name.is_empty() {
            return Err(Error::invalid_argument("local variable name is empty"));
        }
        let id = self.add_var(name, ty, generic, blk, VarKind::Local, false, hidden);
        trace!("declare {name} as v{} in block {}", id.0, blk.0);
        self.push(blk, Stmt::Declare(id));
        Ok(self.var(id))
    }

    /// Compiler-generated local holding `value`
    pub(crate) fn hidden_local(&mut self, blk: Block, what: &str, value: Expr) -> Result<Var> {
        self.guard(blk)?;
        self.check_expr(blk, &value)?;
        self.hidden_count += 1;
        let name = format!("${what}{}", self.hidden_count);
        let ty = value.ty().clone();
        let var = self.declare_var(blk, &name, ty, None, true)?;
        self.push(blk, Stmt::Store { var: var.id, value });
        self.vars[var.id.0].assigned = true;
        Ok(var)
    }

    /// Compiler-generated local assigned later, as by a switch expression
    pub(crate) fn hidden_unassigned(&mut self, blk: Block, what: &str, ty: Type) -> Result<Var> {
        self.hidden_count += 1;
        let name = format!("${what}{}", self.hidden_count);
        self.declare_var(blk, &name, ty, None, true)
    }

    // ---- simple statements -----------------------------------------------

    /// Assign a local or parameter
    pub fn set(&mut self, blk: Block, var: &Var, value: Expr) -> Result<()> {
        self.guard(blk)?;
        self.check_write(blk, var.id)?;
        let ty = self.vars[var.id.0].ty.clone();
        let value = conversion::convert(&self.registry, value, &ty)?;
        self.check_expr(blk, &value)?;
        self.push(blk, Stmt::Store { var: var.id, value });
        self.vars[var.id.0].assigned = true;
        Ok(())
    }

    /// `var += amount`, with the compound-assignment narrowing cast
    pub fn inc(&mut self, blk: Block, var: &Var, amount: Expr) -> Result<()> {
        self.guard(blk)?;
        self.check_write(blk, var.id)?;
        self.check_expr(blk, &var.get())?;
        let ty = self.vars[var.id.0].ty.clone();
        if ty == Type::int() {
            if let Some(crate::ir::Constant::Int(v)) = amount.as_constant() {
                if let Ok(delta) = i16::try_from(*v) {
                    self.push(blk, Stmt::Inc { var: var.id, amount: delta });
                    return Ok(());
                }
            }
        }
        let sum = if ty.is_string() { Expr::concat(vec![var.get(), amount])? } else { Expr::add(var.get(), amount)? };
        let value = conversion::cast(&self.registry, sum, &ty)?;
        self.check_expr(blk, &value)?;
        self.push(blk, Stmt::Store { var: var.id, value });
        Ok(())
    }

    /// Evaluate for side effects
    pub fn eval(&mut self, blk: Block, e: Expr) -> Result<()> {
        self.guard(blk)?;
        self.check_expr(blk, &e)?;
        self.push(blk, Stmt::Eval(e));
        Ok(())
    }

    pub fn put_field(&mut self, blk: Block, target: Option<Expr>, field: &FieldRef, value: Expr) -> Result<()> {
        self.put_field_ordered(blk, target, field, value, MemoryOrder::Plain)
    }

    pub fn put_static(&mut self, blk: Block, field: &FieldRef, value: Expr) -> Result<()> {
        self.put_field_ordered(blk, None, field, value, MemoryOrder::Plain)
    }

    /// Field store at the given memory order
    pub fn put_field_ordered(
        &mut self,
        blk: Block,
        target: Option<Expr>,
        field: &FieldRef,
        value: Expr,
        order: MemoryOrder,
    ) -> Result<()> {
        self.guard(blk)?;
        // reuse the read-side receiver check
        let probe = Expr::field(target, field, order)?;
        let ExprKind::Field { target, .. } = probe.kind() else {
            return Err(Error::invalid_state("field access lost its shape"));
        };
        let target = target.as_deref().cloned();
        let value = conversion::convert(&self.registry, value, &field.ty)?;
        if let Some(t) = &target {
            self.check_expr(blk, t)?;
        }
        self.check_expr(blk, &value)?;
        self.push(blk, Stmt::PutField { target, field: field.clone(), value, order });
        Ok(())
    }

    pub fn array_store(&mut self, blk: Block, array: Expr, index: Expr, value: Expr) -> Result<()> {
        self.array_store_ordered(blk, array, index, value, MemoryOrder::Plain)
    }

    pub fn array_store_ordered(
        &mut self,
        blk: Block,
        array: Expr,
        index: Expr,
        value: Expr,
        order: MemoryOrder,
    ) -> Result<()> {
        self.guard(blk)?;
        let probe = Expr::array_elem_ordered(array, index, order)?;
        let ExprKind::ArrayElem { array, index, .. } = probe.kind() else {
            return Err(Error::invalid_state("array access lost its shape"));
        };
        let value = conversion::convert(&self.registry, value, probe.ty())?;
        let (array, index) = ((**array).clone(), (**index).clone());
        for e in [&array, &index, &value] {
            self.check_expr(blk, e)?;
        }
        self.push(blk, Stmt::ArrayStore { array, index, value, order });
        Ok(())
    }

    /// `return;` from a void method or constructor
    pub fn return_void(&mut self, blk: Block) -> Result<()> {
        self.guard(blk)?;
        let ret = &self.frame_of(blk).ret;
        if !ret.is_void() {
            return Err(Error::invalid_argument(format!("method returning {ret} needs a return value")));
        }
        self.push(blk, Stmt::Return(None));
        Ok(())
    }

    /// `return value;`, converted to the method's return type
    pub fn return_value(&mut self, blk: Block, value: Expr) -> Result<()> {
        self.guard(blk)?;
        let ret = self.frame_of(blk).ret.clone();
        if ret.is_void() {
            return Err(Error::invalid_argument("void method cannot return a value"));
        }
        let value = conversion::convert(&self.registry, value, &ret)?;
        self.check_expr(blk, &value)?;
        self.push(blk, Stmt::Return(Some(value)));
        Ok(())
    }

    pub fn throw_(&mut self, blk: Block, exception: Expr) -> Result<()> {
        self.guard(blk)?;
        let throwable = Type::class(THROWABLE);
        if exception.ty().is_null() || !self.registry.is_assignable(exception.ty(), &throwable) {
            return Err(Error::invalid_argument(format!("cannot throw {}", exception.ty())));
        }
        self.check_expr(blk, &exception)?;
        self.push(blk, Stmt::Throw(exception));
        Ok(())
    }

    /// Source line of the following statements
    pub fn line(&mut self, blk: Block, line: u16) -> Result<()> {
        self.guard(blk)?;
        self.push(blk, Stmt::Line(line));
        Ok(())
    }

    pub fn nop(&mut self, blk: Block) -> Result<()> {
        self.guard(blk)?;
        self.push(blk, Stmt::Nop);
        Ok(())
    }

    pub(crate) fn monitor_exit(&mut self, blk: Block, monitor: Expr) -> Result<()> {
        self.guard(blk)?;
        self.push(blk, Stmt::MonitorExit(monitor));
        Ok(())
    }

    // ---- constructor chaining --------------------------------------------

    /// `super(args)`; only as a statement of a constructor's root block
    pub fn invoke_super_ctor(&mut self, blk: Block, params: Vec<Type>, args: Vec<Expr>) -> Result<()> {
        let ctor = MethodRef::constructor(&self.super_name, params);
        self.chain_ctor(blk, ctor, args)
    }

    /// `this(args)`, delegating to another constructor of this class
    pub fn invoke_this_ctor(&mut self, blk: Block, params: Vec<Type>, args: Vec<Expr>) -> Result<()> {
        let ctor = MethodRef::constructor(&self.host, params);
        self.chain_ctor(blk, ctor, args)
    }

    fn chain_ctor(&mut self, blk: Block, ctor: MethodRef, args: Vec<Expr>) -> Result<()> {
        self.guard(blk)?;
        let frame_idx = self.blocks[blk.0].frame;
        let frame = &self.frames[frame_idx];
        if !frame.is_ctor {
            return Err(Error::invalid_state("constructor chaining outside a constructor"));
        }
        if frame.root != blk {
            return Err(Error::invalid_state("constructor chaining must be a top-level statement of the constructor"));
        }
        if frame.chained {
            return Err(Error::invalid_state("constructor already invokes super(..) or this(..)"));
        }
        // the receiver is not yet initialized, so no argument may read it
        let this_var = frame.this_var;
        let mut reads_this = false;
        for a in &args {
            a.walk(&mut |x| reads_this |= matches!(x.kind(), ExprKind::Local(v) if Some(*v) == this_var));
        }
        if reads_this {
            return Err(Error::invalid_argument("constructor chaining arguments cannot reference this"));
        }
        let probe = Expr::new_instance(&self.registry, &ctor, args)?;
        let ExprKind::New { args, .. } = probe.kind() else {
            return Err(Error::invalid_state("constructor call lost its shape"));
        };
        for a in args {
            self.check_expr(blk, a)?;
        }
        let args = args.clone();
        self.frames[frame_idx].chained = true;
        self.push(blk, Stmt::InitChain { ctor, args });
        Ok(())
    }

    // ---- expression shortcuts --------------------------------------------

    pub fn invoke(&self, method: &MethodRef, target: Option<Expr>, args: Vec<Expr>) -> Result<Expr> {
        Expr::invoke(&self.registry, method, target, args)
    }

    pub fn invoke_best(&self, candidates: &[MethodRef], target: Option<Expr>, args: Vec<Expr>) -> Result<Expr> {
        Expr::invoke_best(&self.registry, candidates, target, args)
    }

    pub fn new_instance(&self, ctor: &MethodRef, args: Vec<Expr>) -> Result<Expr> {
        Expr::new_instance(&self.registry, ctor, args)
    }

    pub fn convert(&self, e: Expr, to: &Type) -> Result<Expr> {
        Expr::convert(&self.registry, e, to)
    }

    pub fn cast(&self, e: Expr, to: &Type) -> Result<Expr> {
        Expr::cast(&self.registry, e, to)
    }

    pub fn conditional(&self, cond: Expr, then: Expr, otherwise: Expr, ty: &Type) -> Result<Expr> {
        Expr::conditional(&self.registry, cond, then, otherwise, ty)
    }

    // ---- completion ------------------------------------------------------

    /// Close the body: checks that every path of a value-returning method
    /// returns, and gives a constructor without an explicit chaining call
    /// an implicit `super()`.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state("method body is already finished"));
        }
        let root = self.root();
        if self.current != Some(root) || !self.open.is_empty() {
            return Err(Error::invalid_state("method body still has an open nested construct"));
        }
        let frame = &self.frames[0];
        if !frame.ret.is_void() && !self.is_terminal(root) {
            return Err(Error::invalid_state(format!("missing return statement in {}", frame.name)));
        }
        if frame.is_ctor && !frame.chained {
            if self.host_is_interface {
                return Err(Error::invalid_state("interfaces have no constructors"));
            }
            let ctor = MethodRef::constructor(&self.super_name, Vec::new());
            self.blocks[root.0].stmts.insert(0, Stmt::InitChain { ctor, args: Vec::new() });
            self.frames[0].chained = true;
        }
        let node = &mut self.blocks[root.0];
        if node.state == super::BlockState::Active {
            node.state = super::BlockState::Finished;
        }
        self.current = None;
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tests::{ctor_code, static_code};
    use crate::ir::FieldRef;

    #[test]
    fn test_read_before_assignment_rejected() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        let x = code.declare(root, "x", Type::int()).unwrap();
        let err = code.eval(root, Expr::add(x.get(), Expr::int(1)).unwrap()).unwrap_err();
        assert!(err.is_invalid_state());
        code.set(root, &x, Expr::int(3)).unwrap();
        assert!(code.eval(root, Expr::add(x.get(), Expr::int(1)).unwrap()).is_ok());
    }

    #[test]
    fn test_out_of_scope_local_rejected() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        let mut inner = None;
        code.scope(root, |c, b| {
            inner = Some(c.declare_init(b, "y", Type::int(), Expr::int(1))?);
            Ok(())
        })
        .unwrap();
        let y = inner.unwrap();
        assert!(code.eval(root, y.get()).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_missing_return_detected() {
        let mut code = static_code(vec![("x", Type::int())], Type::int());
        let root = code.root();
        let x = code.param(root, 0).unwrap();
        code.if_(root, Expr::gt(x.get(), Expr::int(0)).unwrap(), |c, b| c.return_value(b, Expr::int(1))).unwrap();
        assert!(code.finish().unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_return_value_is_converted() {
        let mut code = static_code(vec![("x", Type::int())], Type::double());
        let root = code.root();
        let x = code.param(root, 0).unwrap();
        code.return_value(root, x.get()).unwrap();
        let Stmt::Return(Some(v)) = &code.blocks[root.0].stmts[0] else { panic!("expected a return") };
        assert_eq!(v.ty(), &Type::double());
        code.finish().unwrap();
    }

    #[test]
    fn test_inc_uses_iinc_for_small_int_constants() {
        let mut code = static_code(vec![("i", Type::int()), ("l", Type::long())], Type::void());
        let root = code.root();
        let i = code.param(root, 0).unwrap();
        let l = code.param(root, 1).unwrap();
        code.inc(root, &i, Expr::int(-1)).unwrap();
        code.inc(root, &i, Expr::int(100_000)).unwrap();
        code.inc(root, &l, Expr::int(1)).unwrap();
        let stmts = &code.blocks[root.0].stmts;
        assert!(matches!(stmts[0], Stmt::Inc { amount: -1, .. }));
        assert!(matches!(&stmts[1], Stmt::Store { value, .. } if value.ty() == &Type::int()));
        assert!(matches!(&stmts[2], Stmt::Store { value, .. } if value.ty() == &Type::long()));
    }

    #[test]
    fn test_implicit_super_call_inserted() {
        let mut code = ctor_code(vec![]);
        let root = code.root();
        code.nop(root).unwrap();
        code.finish().unwrap();
        let stmts = &code.blocks[root.0].stmts;
        assert!(matches!(&stmts[0], Stmt::InitChain { ctor, .. } if ctor.owner == "java/lang/Object"));
    }

    #[test]
    fn test_chaining_only_once_and_at_top_level() {
        let mut code = ctor_code(vec![]);
        let root = code.root();
        code.invoke_super_ctor(root, vec![], vec![]).unwrap();
        assert!(code.invoke_this_ctor(root, vec![Type::int()], vec![Expr::int(1)]).unwrap_err().is_invalid_state());

        let mut code = ctor_code(vec![]);
        let root = code.root();
        code.scope(root, |c, b| {
            assert!(c.invoke_super_ctor(b, vec![], vec![]).unwrap_err().is_invalid_state());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_put_field_requires_receiver() {
        let mut code = ctor_code(vec![]);
        let root = code.root();
        let field = FieldRef::instance("demo/Sample", "count", Type::int());
        assert!(code.put_field(root, None, &field, Expr::int(1)).unwrap_err().is_invalid_argument());
        let this = code.this(root).unwrap();
        code.put_field(root, Some(this.get()), &field, Expr::int(1)).unwrap();
    }

    #[test]
    fn test_throw_requires_throwable() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        assert!(code.throw_(root, Expr::string("boom")).unwrap_err().is_invalid_argument());
    }
}
