//! Structured control flow: conditionals, loops, switches and exception regions

use log::trace;

use crate::error::{Error, Result};
use crate::ir::{Block, CatchClause, Expr, Loop, MethodRef, Stmt, Switch, Var};
use crate::types::{conversion, PrimitiveKind, Type, THROWABLE};

use super::block::{LoopNode, Open, SwitchArm, SwitchKind, SwitchNode, VarKind};
use super::Code;

const ITERABLE: &str = "java/lang/Iterable";
const ITERATOR: &str = "java/util/Iterator";
const LOCK: &str = "java/util/concurrent/locks/Lock";

type BodyFn<'a> = Box<dyn FnOnce(&mut Code, Block) -> Result<()> + 'a>;
type CatchFn<'a> = Box<dyn FnOnce(&mut Code, Block, Var) -> Result<()> + 'a>;

/// Case label of a switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchKey {
    Int(i32),
    String(String),
    /// Internal name of a class, matched by identity against a `Class` selector
    Class(String),
}

impl SwitchKey {
    pub fn class(name: &str) -> Self {
        SwitchKey::Class(crate::types::internal_name(name))
    }

    fn kind(&self) -> SwitchKind {
        match self {
            SwitchKey::Int(_) => SwitchKind::Int,
            SwitchKey::String(_) => SwitchKind::String,
            SwitchKey::Class(_) => SwitchKind::Class,
        }
    }
}

impl From<i32> for SwitchKey {
    fn from(v: i32) -> Self {
        SwitchKey::Int(v)
    }
}

impl From<char> for SwitchKey {
    fn from(v: char) -> Self {
        SwitchKey::Int(v as i32)
    }
}

impl From<&str> for SwitchKey {
    fn from(v: &str) -> Self {
        SwitchKey::String(v.to_string())
    }
}

impl From<String> for SwitchKey {
    fn from(v: String) -> Self {
        SwitchKey::String(v)
    }
}

/// Catch clauses and finally block of a `try`
///
/// Clauses are tested in the order they are added.
#[derive(Default)]
pub struct TrySpec<'a> {
    catches: Vec<(Vec<String>, CatchFn<'a>)>,
    finally: Option<BodyFn<'a>>,
}

impl<'a> TrySpec<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catch any of `types`; the body receives the caught exception
    pub fn catch(mut self, types: &[&str], body: impl FnOnce(&mut Code, Block, Var) -> Result<()> + 'a) -> Self {
        let types = types.iter().map(|t| crate::types::internal_name(t)).collect();
        self.catches.push((types, Box::new(body)));
        self
    }

    pub fn finally(mut self, body: impl FnOnce(&mut Code, Block) -> Result<()> + 'a) -> Self {
        self.finally = Some(Box::new(body));
        self
    }
}

fn boolean_cond(reg: &crate::types::TypeRegistry, cond: Expr) -> Result<Expr> {
    conversion::convert(reg, cond, &Type::boolean())
        .map_err(|_| Error::invalid_argument("condition must be a boolean expression"))
}

impl Code {
    /// Run `body` in a fresh child of `blk`; returns whether it ended in a jump
    fn nested(&mut self, blk: Block, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<(Block, bool)> {
        let child = self.enter(blk);
        body(self, child)?;
        let terminal = self.leave(child)?;
        Ok((child, terminal))
    }

    pub fn if_(&mut self, blk: Block, cond: Expr, then: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<()> {
        self.guard(blk)?;
        let cond = boolean_cond(&self.registry, cond)?;
        self.check_expr(blk, &cond)?;
        let base = self.assigned_state();
        self.suspend(blk);
        let (arm, _) = self.nested(blk, then)?;
        self.restore_assigned(&base);
        self.push(blk, Stmt::If { cond, then: arm, otherwise: None });
        self.resume(blk, false);
        Ok(())
    }

    pub fn if_not(&mut self, blk: Block, cond: Expr, then: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<()> {
        self.if_(blk, Expr::not(cond)?, then)
    }

    pub fn if_else(
        &mut self,
        blk: Block,
        cond: Expr,
        then: impl FnOnce(&mut Code, Block) -> Result<()>,
        otherwise: impl FnOnce(&mut Code, Block) -> Result<()>,
    ) -> Result<()> {
        self.guard(blk)?;
        let cond = boolean_cond(&self.registry, cond)?;
        self.check_expr(blk, &cond)?;
        let base = self.assigned_state();
        self.suspend(blk);
        let mut paths = Vec::new();

        let (then_blk, then_terminal) = self.nested(blk, then)?;
        if !then_terminal {
            paths.push(self.assigned_state());
        }
        self.restore_assigned(&base);
        let (else_blk, else_terminal) = self.nested(blk, otherwise)?;
        if !else_terminal {
            paths.push(self.assigned_state());
        }
        self.join_assigned(&base, &paths);

        self.push(blk, Stmt::If { cond, then: then_blk, otherwise: Some(else_blk) });
        self.resume(blk, then_terminal && else_terminal);
        Ok(())
    }

    /// Plain nested scope
    pub fn scope(&mut self, blk: Block, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<()> {
        self.guard(blk)?;
        self.suspend(blk);
        let (inner, terminal) = self.nested(blk, body)?;
        self.push(blk, Stmt::Scope(inner));
        self.resume(blk, terminal);
        Ok(())
    }

    // ---- loops -----------------------------------------------------------

    fn build_loop(
        &mut self,
        blk: Block,
        cond: Option<Expr>,
        test_first: bool,
        step: Option<BodyFn<'_>>,
        body: impl FnOnce(&mut Code, Block, Loop) -> Result<()>,
    ) -> Result<()> {
        self.guard(blk)?;
        let cond = cond.map(|c| boolean_cond(&self.registry, c)).transpose()?;
        if test_first {
            if let Some(c) = &cond {
                self.check_expr(blk, c)?;
            }
        }
        let base = self.assigned_state();
        self.suspend(blk);
        let frame = self.blocks[blk.0].frame;
        let body_blk = self.enter(blk);
        self.loops.push(LoopNode { frame, body: body_blk, cond: None, test_first, step: None, has_break: false });
        let lp = Loop(self.loops.len() - 1);
        trace!("loop {} with body block {}", lp.0, body_blk.0);

        body(self, body_blk, lp)?;
        self.leave(body_blk)?;
        let after_body = self.assigned_state();

        if let Some(step) = step {
            let (step_blk, _) = self.nested(blk, step)?;
            self.loops[lp.0].step = Some(step_blk);
        }
        if !test_first {
            if let Some(c) = &cond {
                self.restore_assigned(&after_body);
                self.check_expr(blk, c)?;
            }
        }
        // a do-while body always runs once; other bodies may not run at all
        if test_first {
            self.restore_assigned(&base);
        } else {
            self.restore_assigned(&after_body);
        }

        self.loops[lp.0].cond = cond;
        let node = &self.loops[lp.0];
        let terminal = node.is_infinite() && !node.has_break;
        self.push(blk, Stmt::Loop(lp));
        self.resume(blk, terminal);
        Ok(())
    }

    /// Infinite loop, left through `break`, `return` or `throw`
    pub fn loop_(&mut self, blk: Block, body: impl FnOnce(&mut Code, Block, Loop) -> Result<()>) -> Result<()> {
        self.build_loop(blk, None, true, None, body)
    }

    pub fn while_(
        &mut self,
        blk: Block,
        cond: Expr,
        body: impl FnOnce(&mut Code, Block, Loop) -> Result<()>,
    ) -> Result<()> {
        self.build_loop(blk, Some(cond), true, None, body)
    }

    /// Body first, then the test; `cond` is evaluated in the scope of `blk`
    pub fn do_while(
        &mut self,
        blk: Block,
        cond: Expr,
        body: impl FnOnce(&mut Code, Block, Loop) -> Result<()>,
    ) -> Result<()> {
        self.build_loop(blk, Some(cond), false, None, body)
    }

    /// `for (; cond; step) body`; declare the loop variable in `blk` first
    pub fn for_<'a>(
        &mut self,
        blk: Block,
        cond: Expr,
        step: impl FnOnce(&mut Code, Block) -> Result<()> + 'a,
        body: impl FnOnce(&mut Code, Block, Loop) -> Result<()>,
    ) -> Result<()> {
        self.build_loop(blk, Some(cond), true, Some(Box::new(step)), body)
    }

    /// Enhanced for over an array or an `Iterable`; the element is
    /// converted (arrays) or cast (iterables) to `elem_ty`
    pub fn for_each(
        &mut self,
        blk: Block,
        iterable: Expr,
        name: &str,
        elem_ty: Type,
        body: impl FnOnce(&mut Code, Block, Loop, Var) -> Result<()>,
    ) -> Result<()> {
        self.guard(blk)?;
        self.check_expr(blk, &iterable)?;
        let reg = self.registry.clone();
        match iterable.ty().clone() {
            Type::Array(_) => {
                let array = self.hidden_local(blk, "arr", iterable)?;
                let index = self.hidden_local(blk, "i", Expr::int(0))?;
                let cond = Expr::lt(index.get(), Expr::array_length(array.get())?)?;
                let elem = conversion::convert(&reg, Expr::array_elem(array.get(), index.get())?, &elem_ty)?;
                let step_index = index.clone();
                self.for_(
                    blk,
                    cond,
                    move |c, b| c.inc(b, &step_index, Expr::int(1)),
                    |c, b, lp| {
                        let var = c.declare_init(b, name, elem_ty, elem)?;
                        body(c, b, lp, var)
                    },
                )
            }
            ty @ Type::Class(_) if reg.is_assignable(&ty, &Type::class(ITERABLE)) => {
                let iterator_m = MethodRef::of_interface(ITERABLE, "iterator", vec![], Type::class(ITERATOR));
                let has_next_m = MethodRef::of_interface(ITERATOR, "hasNext", vec![], Type::boolean());
                let next_m = MethodRef::of_interface(ITERATOR, "next", vec![], Type::object());
                let it = self.hidden_local(blk, "it", Expr::invoke(&reg, &iterator_m, Some(iterable), vec![])?)?;
                let has_next = Expr::invoke(&reg, &has_next_m, Some(it.get()), vec![])?;
                let next = conversion::cast(&reg, Expr::invoke(&reg, &next_m, Some(it.get()), vec![])?, &elem_ty)?;
                self.while_(blk, has_next, |c, b, lp| {
                    let var = c.declare_init(b, name, elem_ty, next)?;
                    body(c, b, lp, var)
                })
            }
            other => Err(Error::invalid_argument(format!("cannot iterate over {other}"))),
        }
    }

    pub fn break_(&mut self, blk: Block, lp: Loop) -> Result<()> {
        self.guard(blk)?;
        self.enclosing_loop(blk, lp)?;
        self.loops[lp.0].has_break = true;
        self.push(blk, Stmt::Break(lp));
        Ok(())
    }

    /// Jump to the loop's step and test
    pub fn continue_(&mut self, blk: Block, lp: Loop) -> Result<()> {
        self.guard(blk)?;
        self.enclosing_loop(blk, lp)?;
        self.push(blk, Stmt::Continue(lp));
        Ok(())
    }

    /// Restart the loop body without running the step or the test
    pub fn redo(&mut self, blk: Block, lp: Loop) -> Result<()> {
        self.guard(blk)?;
        self.enclosing_loop(blk, lp)?;
        self.push(blk, Stmt::Redo(lp));
        Ok(())
    }

    // ---- switches --------------------------------------------------------

    fn switch_selector(&self, selector: Expr) -> Result<(Expr, SwitchKind)> {
        let ty = selector.ty().clone();
        if ty.is_string() {
            return Ok((selector, SwitchKind::String));
        }
        if matches!(&ty, Type::Class(n) if n == crate::types::CLASS) {
            return Ok((selector, SwitchKind::Class));
        }
        match ty.numeric_kind() {
            Some(k) if k.is_int_like() => {
                let selector = conversion::convert(&self.registry, selector, &Type::Primitive(PrimitiveKind::Int))?;
                Ok((selector, SwitchKind::Int))
            }
            _ => Err(Error::invalid_argument(format!("cannot switch on {ty}"))),
        }
    }

    fn open_switch(&mut self, blk: Block, selector: Expr, result: Option<Var>) -> Result<Switch> {
        let (selector, kind) = self.switch_selector(selector)?;
        self.check_expr(blk, &selector)?;
        let frame = self.blocks[blk.0].frame;
        let base_assigned = self.assigned_state();
        self.switches.push(SwitchNode {
            frame,
            parent: blk,
            selector,
            kind,
            arms: Vec::new(),
            default: None,
            result: result.map(|v| v.id),
            base_assigned,
            arm_assigned: Vec::new(),
        });
        let sw = Switch(self.switches.len() - 1);
        self.suspend(blk);
        self.open.push(Open::Switch(sw));
        Ok(sw)
    }

    fn close_switch(&mut self, sw: Switch) -> Result<()> {
        if self.current.is_some() || self.open.last() != Some(&Open::Switch(sw)) {
            return Err(Error::invalid_state("switch closed while a nested construct is open"));
        }
        self.open.pop();
        Ok(())
    }

    /// Switch statement over an int-like, `String` or `Class` selector;
    /// `build` adds the arms with [`Code::case`] and [`Code::default`]
    pub fn switch(
        &mut self,
        blk: Block,
        selector: Expr,
        build: impl FnOnce(&mut Code, Switch) -> Result<()>,
    ) -> Result<()> {
        self.guard(blk)?;
        let sw = self.open_switch(blk, selector, None)?;
        build(self, sw)?;
        self.close_switch(sw)?;

        let node = &self.switches[sw.0];
        let mut paths = node.arm_assigned.clone();
        if node.default.is_none() {
            paths.push(node.base_assigned.clone());
        }
        let base = node.base_assigned.clone();
        let terminal = node.default.is_some()
            && node.arms.iter().all(|a| self.is_terminal(a.body))
            && node.default.map(|d| self.is_terminal(d)).unwrap_or(false);
        self.join_assigned(&base, &paths);
        self.push(blk, Stmt::Switch(sw));
        self.resume(blk, terminal);
        Ok(())
    }

    /// Switch expression producing a value of type `ty`
    ///
    /// Every arm must end in [`Code::yield_`], `return`, `throw` or a jump
    /// out of the expression. Without a default arm, an unmatched selector
    /// throws `IncompatibleClassChangeError`.
    pub fn switch_expr(
        &mut self,
        blk: Block,
        selector: Expr,
        ty: &Type,
        build: impl FnOnce(&mut Code, Switch) -> Result<()>,
    ) -> Result<Expr> {
        self.guard(blk)?;
        if ty.is_void() || ty.is_null() {
            return Err(Error::invalid_argument(format!("switch expression cannot have type {ty}")));
        }
        let result = self.hidden_unassigned(blk, "switch", ty.clone())?;
        let sw = self.open_switch(blk, selector, Some(result.clone()))?;
        build(self, sw)?;
        self.close_switch(sw)?;

        if self.switches[sw.0].default.is_none() {
            let arm = self.new_block(Some(blk), self.blocks[blk.0].frame);
            self.blocks[arm.0].arm_of = Some(sw);
            let icce = MethodRef::constructor("java/lang/IncompatibleClassChangeError", vec![]);
            let err = Expr::new_instance(&self.registry, &icce, vec![])?;
            self.push(arm, Stmt::Throw(err));
            self.switches[sw.0].default = Some(arm);
        }
        let base = self.switches[sw.0].base_assigned.clone();
        self.restore_assigned(&base);
        self.vars[result.id.0].assigned = true;
        self.push(blk, Stmt::Switch(sw));
        self.resume(blk, false);
        Ok(result.get())
    }

    fn check_keys(&self, sw: Switch, keys: &[SwitchKey]) -> Result<()> {
        let node = &self.switches[sw.0];
        if keys.is_empty() {
            return Err(Error::invalid_argument("a case needs at least one key"));
        }
        for (i, key) in keys.iter().enumerate() {
            if key.kind() != node.kind {
                return Err(Error::invalid_argument(format!("case key {key:?} does not match the selector")));
            }
            let seen = keys[..i].contains(key) || node.arms.iter().any(|a| a.keys.contains(key));
            if seen {
                return Err(Error::invalid_argument(format!("duplicate case key {key:?}")));
            }
        }
        Ok(())
    }

    fn build_arm(&mut self, sw: Switch, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<Block> {
        let node = &self.switches[sw.0];
        let (parent, frame) = (node.parent, node.frame);
        let base = node.base_assigned.clone();
        self.restore_assigned(&base);
        let arm = self.new_block(Some(parent), frame);
        self.blocks[arm.0].arm_of = Some(sw);
        self.current = Some(arm);
        body(self, arm)?;
        let terminal = self.leave(arm)?;
        if self.switches[sw.0].result.is_some() && !terminal {
            return Err(Error::invalid_state("switch expression arm completes without yielding a value"));
        }
        if !terminal {
            let state = self.assigned_state();
            self.switches[sw.0].arm_assigned.push(state);
        }
        Ok(arm)
    }

    /// Arm for `keys`; arms never fall through
    pub fn case<K: Into<SwitchKey>>(
        &mut self,
        sw: Switch,
        keys: impl IntoIterator<Item = K>,
        body: impl FnOnce(&mut Code, Block) -> Result<()>,
    ) -> Result<()> {
        self.guard_construct(Open::Switch(sw))?;
        let keys: Vec<SwitchKey> = keys.into_iter().map(Into::into).collect();
        self.check_keys(sw, &keys)?;
        let arm = self.build_arm(sw, body)?;
        self.switches[sw.0].arms.push(SwitchArm { keys, body: arm });
        Ok(())
    }

    pub fn default(&mut self, sw: Switch, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<()> {
        self.guard_construct(Open::Switch(sw))?;
        if self.switches[sw.0].default.is_some() {
            return Err(Error::invalid_argument("switch already has a default arm"));
        }
        let arm = self.build_arm(sw, body)?;
        self.switches[sw.0].default = Some(arm);
        Ok(())
    }

    /// Value of the innermost enclosing switch expression
    pub fn yield_(&mut self, blk: Block, value: Expr) -> Result<()> {
        self.guard(blk)?;
        let sw = self
            .enclosing_switch_expr(blk)
            .ok_or_else(|| Error::invalid_state("yield outside a switch expression"))?;
        let result = self.switches[sw.0].result.ok_or_else(|| Error::invalid_state("switch has no result"))?;
        let ty = self.vars[result.0].ty.clone();
        let value = conversion::convert(&self.registry, value, &ty)?;
        self.check_expr(blk, &value)?;
        self.push(blk, Stmt::Yield { switch: sw, value });
        Ok(())
    }

    // ---- exception regions -----------------------------------------------

    /// `try { body } catch .. finally ..` as described by `spec`
    pub fn try_(
        &mut self,
        blk: Block,
        body: impl FnOnce(&mut Code, Block) -> Result<()>,
        spec: TrySpec<'_>,
    ) -> Result<()> {
        self.guard(blk)?;
        if spec.catches.is_empty() && spec.finally.is_none() {
            return Err(Error::invalid_argument("try needs a catch clause or a finally block"));
        }
        let throwable = Type::class(THROWABLE);
        for (types, _) in &spec.catches {
            if types.is_empty() {
                return Err(Error::invalid_argument("catch clause without exception types"));
            }
            for t in types {
                if !self.registry.is_assignable(&Type::class(t), &throwable) {
                    return Err(Error::invalid_argument(format!("{t} is not a Throwable")));
                }
            }
        }

        let base = self.assigned_state();
        self.suspend(blk);
        let mut paths = Vec::new();
        let (body_blk, body_terminal) = self.nested(blk, body)?;
        let mut terminal = body_terminal;
        if !body_terminal {
            paths.push(self.assigned_state());
        }

        let mut catches = Vec::with_capacity(spec.catches.len());
        for (types, handler) in spec.catches {
            self.restore_assigned(&base);
            let var_ty = types[1..]
                .iter()
                .fold(types[0].clone(), |acc, t| self.registry.common_super_class(&acc, t));
            let catch_blk = self.enter(blk);
            let var_id = self.add_var("e", Type::Class(var_ty), None, catch_blk, VarKind::Catch, true, false);
            let var = Var { id: var_id, ty: self.vars[var_id.0].ty.clone() };
            handler(self, catch_blk, var)?;
            let catch_terminal = self.leave(catch_blk)?;
            terminal &= catch_terminal;
            if !catch_terminal {
                paths.push(self.assigned_state());
            }
            catches.push(CatchClause { types, var: var_id, body: catch_blk });
        }

        let finally = match spec.finally {
            Some(fin) => {
                self.restore_assigned(&base);
                let (fin_blk, fin_terminal) = self.nested(blk, fin)?;
                let after_finally = self.assigned_state();
                self.join_assigned(&base, &paths);
                for (i, assigned) in after_finally.iter().enumerate().take(base.len()) {
                    if *assigned {
                        self.vars[i].assigned = true;
                    }
                }
                terminal |= fin_terminal;
                Some(fin_blk)
            }
            None => {
                self.join_assigned(&base, &paths);
                None
            }
        };

        self.push(blk, Stmt::Try { body: body_blk, catches, finally });
        self.resume(blk, terminal);
        Ok(())
    }

    /// `synchronized (monitor) { body }`
    pub fn synchronized(
        &mut self,
        blk: Block,
        monitor: Expr,
        body: impl FnOnce(&mut Code, Block) -> Result<()>,
    ) -> Result<()> {
        self.guard(blk)?;
        if !monitor.ty().is_reference() || monitor.ty().is_null() {
            return Err(Error::invalid_argument(format!("cannot synchronize on {}", monitor.ty())));
        }
        let held = self.hidden_local(blk, "monitor", monitor)?;
        self.push(blk, Stmt::MonitorEnter(held.get()));
        self.try_(blk, body, TrySpec::new().finally(move |c, b| c.monitor_exit(b, held.get())))
    }

    /// `lock.lock(); try { body } finally { lock.unlock(); }`
    pub fn locked(&mut self, blk: Block, lock: Expr, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<()> {
        self.guard(blk)?;
        if lock.ty().is_null() || !self.registry.is_assignable(lock.ty(), &Type::class(LOCK)) {
            return Err(Error::invalid_argument(format!("{} is not a java.util.concurrent.locks.Lock", lock.ty())));
        }
        let lock_m = MethodRef::of_interface(LOCK, "lock", vec![], Type::void());
        let unlock_m = MethodRef::of_interface(LOCK, "unlock", vec![], Type::void());
        let held = self.hidden_local(blk, "lock", lock)?;
        let acquire = Expr::invoke(&self.registry, &lock_m, Some(held.get()), vec![])?;
        let release = Expr::invoke(&self.registry, &unlock_m, Some(held.get()), vec![])?;
        self.eval(blk, acquire)?;
        self.try_(blk, body, TrySpec::new().finally(move |c, b| c.eval(b, release)))
    }

    /// Throw `AssertionError` with `message` when `cond` is false
    pub fn assert_(&mut self, blk: Block, cond: Expr, message: Option<Expr>) -> Result<()> {
        let (params, args) = match message {
            Some(m) => (vec![Type::object()], vec![m]),
            None => (vec![], vec![]),
        };
        let ctor = MethodRef::constructor("java/lang/AssertionError", params);
        let error = Expr::new_instance(&self.registry, &ctor, args)?;
        self.if_not(blk, cond, |c, b| c.throw_(b, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::block::BlockState;
    use crate::builder::tests::static_code;
    use crate::ir::Constant;

    #[test]
    fn test_conditional_assignment_is_not_definite() {
        let mut code = static_code(vec![("flag", Type::boolean())], Type::int());
        let root = code.root();
        let flag = code.param(root, 0).unwrap();
        let x = code.declare(root, "x", Type::int()).unwrap();
        let target = x.clone();
        code.if_(root, flag.get(), move |c, b| c.set(b, &target, Expr::int(1))).unwrap();
        assert!(code.return_value(root, x.get()).unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_assignment_on_both_branches_is_definite() {
        let mut code = static_code(vec![("flag", Type::boolean())], Type::int());
        let root = code.root();
        let flag = code.param(root, 0).unwrap();
        let x = code.declare(root, "x", Type::int()).unwrap();
        let target = x.clone();
        code.if_else(
            root,
            flag.get(),
            move |c, b| c.set(b, &target, Expr::int(1)),
            |c, b| {
                let ctor = MethodRef::constructor("java/lang/IllegalStateException", vec![]);
                let err = c.new_instance(&ctor, vec![])?;
                c.throw_(b, err)
            },
        )
        .unwrap();
        code.return_value(root, x.get()).unwrap();
    }

    #[test]
    fn test_infinite_loop_without_break_is_terminal() {
        let mut code = static_code(vec![], Type::int());
        let root = code.root();
        code.loop_(root, |c, b, _| c.nop(b)).unwrap();
        assert!(code.is_terminal(root));
        code.finish().unwrap();

        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        code.loop_(root, |c, b, lp| c.break_(b, lp)).unwrap();
        assert!(!code.is_terminal(root));
    }

    #[test]
    fn test_break_outside_target_loop_rejected() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        let mut first = None;
        code.loop_(root, |c, b, lp| {
            first = Some(lp);
            c.break_(b, lp)
        })
        .unwrap();
        let first = first.unwrap();
        code.loop_(root, |c, b, _| {
            assert!(c.break_(b, first).unwrap_err().is_invalid_argument());
            c.return_void(b)
        })
        .unwrap();
    }

    #[test]
    fn test_switch_with_default_and_terminal_arms_is_terminal() {
        let mut code = static_code(vec![("k", Type::int())], Type::int());
        let root = code.root();
        let k = code.param(root, 0).unwrap();
        code.switch(root, k.get(), |c, sw| {
            c.case(sw, [1, 2], |c, b| c.return_value(b, Expr::int(10)))?;
            c.default(sw, |c, b| c.return_value(b, Expr::int(0)))
        })
        .unwrap();
        assert!(code.is_terminal(root));
    }

    #[test]
    fn test_duplicate_and_mismatched_keys_rejected() {
        let mut code = static_code(vec![("k", Type::int())], Type::void());
        let root = code.root();
        let k = code.param(root, 0).unwrap();
        code.switch(root, k.get(), |c, sw| {
            c.case(sw, [1], |c, b| c.nop(b))?;
            assert!(c.case(sw, [1], |c, b| c.nop(b)).unwrap_err().is_invalid_argument());
            assert!(c.case(sw, ["one"], |c, b| c.nop(b)).unwrap_err().is_invalid_argument());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_switch_expression_synthesizes_default() {
        let mut code = static_code(vec![("s", Type::string())], Type::int());
        let root = code.root();
        let s = code.param(root, 0).unwrap();
        let value = code
            .switch_expr(root, s.get(), &Type::int(), |c, sw| {
                c.case(sw, ["one"], |c, b| c.yield_(b, Expr::int(1)))?;
                c.case(sw, ["two"], |c, b| c.yield_(b, Expr::int(2)))
            })
            .unwrap();
        let sw = &code.switches[0];
        let default = sw.default.unwrap();
        assert!(matches!(code.blocks[default.0].stmts[0], Stmt::Throw(_)));
        code.return_value(root, value).unwrap();
        code.finish().unwrap();
    }

    #[test]
    fn test_switch_expression_arm_must_yield() {
        let mut code = static_code(vec![("k", Type::int())], Type::int());
        let root = code.root();
        let k = code.param(root, 0).unwrap();
        let err = code
            .switch_expr(root, k.get(), &Type::int(), |c, sw| c.case(sw, [1], |c, b| c.nop(b)))
            .unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_yield_outside_switch_expression_rejected() {
        let mut code = static_code(vec![], Type::int());
        let root = code.root();
        assert!(code.yield_(root, Expr::int(1)).unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_multi_catch_variable_type_is_common_super() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        let mut caught = None;
        code.try_(
            root,
            |c, b| c.nop(b),
            TrySpec::new().catch(&["java/lang/IllegalArgumentException", "java/lang/IllegalStateException"], |c, b, e| {
                caught = Some(e.ty().clone());
                c.nop(b)
            }),
        )
        .unwrap();
        assert_eq!(caught, Some(Type::class("java/lang/RuntimeException")));
    }

    #[test]
    fn test_catch_of_non_throwable_rejected() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        let err = code.try_(root, |c, b| c.nop(b), TrySpec::new().catch(&["java/lang/String"], |c, b, _| c.nop(b)));
        assert!(err.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_for_each_over_array_desugars_to_indexed_loop() {
        let mut code = static_code(vec![("xs", Type::array_of(Type::int()))], Type::int());
        let root = code.root();
        let xs = code.param(root, 0).unwrap();
        let sum = code.declare_init(root, "sum", Type::int(), Expr::int(0)).unwrap();
        let acc = sum.clone();
        code.for_each(root, xs.get(), "x", Type::long(), move |c, b, _, x| {
            let total = c.cast(Expr::add(acc.get(), x.get())?, &Type::int())?;
            c.set(b, &acc, total)
        })
        .unwrap();
        assert_eq!(code.loops.len(), 1);
        assert!(code.loops[0].step.is_some());
        code.return_value(root, sum.get()).unwrap();
        code.finish().unwrap();
    }

    #[test]
    fn test_locked_requires_lock() {
        let mut code = static_code(vec![("s", Type::string())], Type::void());
        let root = code.root();
        let s = code.param(root, 0).unwrap();
        assert!(code.locked(root, s.get(), |c, b| c.nop(b)).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_block_state_after_try_with_terminal_finally() {
        let mut code = static_code(vec![], Type::int());
        let root = code.root();
        code.try_(root, |c, b| c.nop(b), TrySpec::new().finally(|c, b| c.return_value(b, Expr::int(3)))).unwrap();
        assert_eq!(code.blocks[root.0].state, BlockState::Terminal);
    }

    #[test]
    fn test_constant_true_while_is_infinite() {
        let mut code = static_code(vec![], Type::int());
        let root = code.root();
        code.while_(root, Expr::constant(Constant::Boolean(true)).unwrap(), |c, b, _| c.nop(b)).unwrap();
        assert!(code.is_terminal(root));
    }
}
