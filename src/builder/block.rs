//! Arena nodes behind the builder handles, and the single-active-block guard

use crate::error::{Error, Result};
use crate::ir::{AnonId, Block, Expr, ExprKind, Loop, MethodRef, Stmt, Switch, VarId};
use crate::types::{GenericType, Type};

use super::{Code, SwitchKey};

/// Lifecycle of a block
///
/// Exactly one block per method body is `Active` at a time: the innermost
/// one accepting statements. Opening a nested construct suspends the
/// parent until the construct is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Active,
    Suspended,
    /// Ended by a jump; control never falls out of it
    Terminal,
    /// Closed normally
    Finished,
}

#[derive(Debug, Clone)]
pub(crate) struct BlockNode {
    pub parent: Option<Block>,
    pub frame: usize,
    pub stmts: Vec<Stmt>,
    pub state: BlockState,
    /// Set on the arms of a switch
    pub arm_of: Option<Switch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VarKind {
    This,
    Param(usize),
    Local,
    Catch,
}

#[derive(Debug, Clone)]
pub(crate) struct VarNode {
    pub name: String,
    pub ty: Type,
    /// Declared generic type, for the LocalVariableTypeTable and type annotations
    pub generic: Option<GenericType>,
    pub scope: Block,
    pub frame: usize,
    pub kind: VarKind,
    pub assigned: bool,
    /// Synthesized by a desugared construct; not listed in debug tables
    pub hidden: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct LoopNode {
    pub frame: usize,
    pub body: Block,
    /// `None` loops forever
    pub cond: Option<Expr>,
    /// `while`/`for` test before the body, `do-while` after it
    pub test_first: bool,
    /// Runs before every re-test, including after `continue`
    pub step: Option<Block>,
    pub has_break: bool,
}

impl LoopNode {
    pub fn is_infinite(&self) -> bool {
        match &self.cond {
            None => true,
            Some(c) => matches!(c.as_constant(), Some(crate::ir::Constant::Boolean(true))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchKind {
    Int,
    String,
    Class,
}

#[derive(Debug, Clone)]
pub(crate) struct SwitchArm {
    pub keys: Vec<SwitchKey>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub(crate) struct SwitchNode {
    pub frame: usize,
    pub parent: Block,
    pub selector: Expr,
    pub kind: SwitchKind,
    pub arms: Vec<SwitchArm>,
    pub default: Option<Block>,
    /// Result variable of a switch expression
    pub result: Option<VarId>,
    /// Definite-assignment state before the switch, and after each arm
    /// that completes normally
    pub base_assigned: Vec<bool>,
    pub arm_assigned: Vec<Vec<bool>>,
}

/// Activation context of a method body, lambda body or anonymous class method
#[derive(Debug, Clone)]
pub(crate) struct FrameNode {
    pub anon: Option<AnonId>,
    pub name: String,
    pub root: Block,
    pub this_var: Option<VarId>,
    pub params: Vec<VarId>,
    pub is_static: bool,
    pub is_ctor: bool,
    pub ret: Type,
    pub chained: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct AnonMethod {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub frame: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct AnonNode {
    pub super_ctor: MethodRef,
    pub interfaces: Vec<String>,
    pub methods: Vec<AnonMethod>,
    /// Outer variables copied into the instance, in field order
    pub captures: Vec<VarId>,
    pub parent_frame: usize,
    pub parent_block: Block,
    pub is_lambda: bool,
}

impl AnonNode {
    /// Static type of the instance and of `this` inside its methods
    pub fn view_type(&self) -> Type {
        match self.interfaces.first() {
            Some(iface) if self.super_ctor.owner == crate::types::OBJECT => Type::Class(iface.clone()),
            _ => Type::Class(self.super_ctor.owner.clone()),
        }
    }
}

/// Construct that is open but has no active block of its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Open {
    Switch(Switch),
    Anon(AnonId),
}

impl Code {
    /// Fail unless `blk` is the innermost active block
    pub(crate) fn guard(&self, blk: Block) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state("method body is already finished"));
        }
        let node = self
            .blocks
            .get(blk.0)
            .ok_or_else(|| Error::invalid_argument(format!("block {} does not belong to this method", blk.0)))?;
        match node.state {
            BlockState::Terminal => Err(Error::invalid_state(
                "block is terminal: nothing may follow a return, throw, break, continue, redo or yield",
            )),
            BlockState::Suspended => {
                Err(Error::invalid_state("block is suspended by a nested construct; use the innermost block"))
            }
            BlockState::Finished => Err(Error::invalid_state("block is already closed")),
            BlockState::Active if self.current != Some(blk) => {
                Err(Error::invalid_state("block is not the innermost active block"))
            }
            BlockState::Active => Ok(()),
        }
    }

    /// Fail unless `open` is the innermost open construct and none of its
    /// members is being built
    pub(crate) fn guard_construct(&self, open: Open) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state("method body is already finished"));
        }
        if self.current.is_some() || self.open.last() != Some(&open) {
            return Err(Error::invalid_state(format!("{open:?} is not the innermost open construct")));
        }
        Ok(())
    }

    pub(crate) fn new_block(&mut self, parent: Option<Block>, frame: usize) -> Block {
        self.blocks.push(BlockNode { parent, frame, stmts: Vec::new(), state: BlockState::Active, arm_of: None });
        Block(self.blocks.len() - 1)
    }

    pub(crate) fn suspend(&mut self, blk: Block) {
        self.blocks[blk.0].state = BlockState::Suspended;
        self.current = None;
    }

    /// Create a child of `parent` and make it the active block
    pub(crate) fn enter(&mut self, parent: Block) -> Block {
        let frame = self.blocks[parent.0].frame;
        let child = self.new_block(Some(parent), frame);
        self.current = Some(child);
        child
    }

    /// Close the active child; returns whether it ended in a jump
    pub(crate) fn leave(&mut self, child: Block) -> Result<bool> {
        if self.current != Some(child) {
            return Err(Error::invalid_state("nested block closed out of order"));
        }
        self.current = None;
        let node = &mut self.blocks[child.0];
        if node.state == BlockState::Active {
            node.state = BlockState::Finished;
        }
        Ok(node.state == BlockState::Terminal)
    }

    /// Reactivate `blk` after a construct, or make it terminal when every
    /// path out of the construct jumped
    pub(crate) fn resume(&mut self, blk: Block, terminal: bool) {
        self.blocks[blk.0].state = if terminal { BlockState::Terminal } else { BlockState::Active };
        self.current = Some(blk);
    }

    pub(crate) fn is_terminal(&self, blk: Block) -> bool {
        self.blocks[blk.0].state == BlockState::Terminal
    }

    /// Append to a block that has already been guarded
    pub(crate) fn push(&mut self, blk: Block, stmt: Stmt) {
        let node = &mut self.blocks[blk.0];
        if stmt.is_jump() {
            node.state = BlockState::Terminal;
        }
        node.stmts.push(stmt);
    }

    /// Whether `scope` is `blk` or one of its ancestors
    pub(crate) fn in_scope(&self, blk: Block, scope: Block) -> bool {
        let mut cur = Some(blk);
        while let Some(b) = cur {
            if b == scope {
                return true;
            }
            cur = self.blocks[b.0].parent;
        }
        false
    }

    pub(crate) fn var_node(&self, var: VarId) -> Result<&VarNode> {
        self.vars
            .get(var.0)
            .ok_or_else(|| Error::invalid_argument(format!("variable {} does not belong to this method", var.0)))
    }

    fn check_read(&self, blk: Block, var: VarId) -> Result<()> {
        let node = self.var_node(var)?;
        if !self.in_scope(blk, node.scope) {
            return Err(Error::invalid_argument(format!("variable {} is not in scope", node.name)));
        }
        if !node.assigned {
            return Err(Error::invalid_state(format!("variable {} is read before it is assigned", node.name)));
        }
        Ok(())
    }

    /// Captured variables are loaded where the instance is created, so
    /// they must still be in scope there
    fn check_captures(&self, blk: Block, captures: &[VarId]) -> Result<()> {
        for &var in captures {
            let node = self.var_node(var)?;
            if !self.in_scope(blk, node.scope) {
                return Err(Error::invalid_state(format!(
                    "captured variable {} is no longer in scope where the instance is created",
                    node.name
                )));
            }
        }
        Ok(())
    }

    /// Scope and definite-assignment check of every local read in `e`
    pub(crate) fn check_expr(&self, blk: Block, e: &Expr) -> Result<()> {
        let mut failure = None;
        e.walk(&mut |x| {
            if failure.is_some() {
                return;
            }
            let checked = match x.kind() {
                ExprKind::Local(v) => self.check_read(blk, *v),
                ExprKind::AnonInstance { anon, .. } => match self.anons.get(anon.0) {
                    Some(node) => self.check_captures(blk, &node.captures),
                    None => Err(Error::invalid_argument("anonymous class does not belong to this method")),
                },
                _ => Ok(()),
            };
            if let Err(e) = checked {
                failure = Some(e);
            }
        });
        failure.map_or(Ok(()), Err)
    }

    /// Check a variable that is about to be written from `blk`
    pub(crate) fn check_write(&self, blk: Block, var: VarId) -> Result<()> {
        let node = self.var_node(var)?;
        if !self.in_scope(blk, node.scope) {
            return Err(Error::invalid_argument(format!("variable {} is not in scope", node.name)));
        }
        if node.frame != self.blocks[blk.0].frame {
            return Err(Error::invalid_argument(format!(
                "captured variable {} cannot be assigned inside a lambda or anonymous class",
                node.name
            )));
        }
        Ok(())
    }

    /// Definite-assignment state of every variable
    pub(crate) fn assigned_state(&self) -> Vec<bool> {
        self.vars.iter().map(|v| v.assigned).collect()
    }

    pub(crate) fn restore_assigned(&mut self, state: &[bool]) {
        for (var, assigned) in self.vars.iter_mut().zip(state) {
            var.assigned = *assigned;
        }
    }

    /// Join the states of the paths leaving a construct: a variable is
    /// assigned after it when it is assigned on every path that completes
    /// normally. With no such path the construct is terminal and anything
    /// goes.
    pub(crate) fn join_assigned(&mut self, base: &[bool], paths: &[Vec<bool>]) {
        for (i, var) in self.vars.iter_mut().enumerate().take(base.len()) {
            var.assigned = base[i] || paths.iter().all(|p| p.get(i).copied().unwrap_or(false));
        }
    }

    /// Loop whose body encloses `blk` within the same frame
    pub(crate) fn enclosing_loop(&self, blk: Block, lp: Loop) -> Result<()> {
        let node = self
            .loops
            .get(lp.0)
            .ok_or_else(|| Error::invalid_argument(format!("loop {} does not belong to this method", lp.0)))?;
        let frame = self.blocks[blk.0].frame;
        let mut cur = Some(blk);
        while let Some(b) = cur {
            if self.blocks[b.0].frame != frame {
                break;
            }
            if b == node.body {
                return Ok(());
            }
            cur = self.blocks[b.0].parent;
        }
        Err(Error::invalid_argument("break, continue or redo target does not enclose this block"))
    }

    /// Innermost switch expression whose arm encloses `blk`
    pub(crate) fn enclosing_switch_expr(&self, blk: Block) -> Option<Switch> {
        let frame = self.blocks[blk.0].frame;
        let mut cur = Some(blk);
        while let Some(b) = cur {
            let node = &self.blocks[b.0];
            if node.frame != frame {
                return None;
            }
            if let Some(sw) = node.arm_of {
                if self.switches[sw.0].result.is_some() {
                    return Some(sw);
                }
            }
            cur = node.parent;
        }
        None
    }

    /// Visit every expression evaluated directly in `frame`
    pub(crate) fn for_each_frame_expr(&self, frame: usize, f: &mut dyn FnMut(&Expr)) {
        for node in self.blocks.iter().filter(|b| b.frame == frame) {
            for stmt in &node.stmts {
                stmt.for_each_expr(&mut |e| e.walk(f));
            }
        }
        for lp in self.loops.iter().filter(|l| l.frame == frame) {
            if let Some(c) = &lp.cond {
                c.walk(f);
            }
        }
        for sw in self.switches.iter().filter(|s| s.frame == frame) {
            sw.selector.walk(f);
        }
    }

    /// Visit every expression in the body, across all frames
    pub(crate) fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        for frame in 0..self.frames.len() {
            self.for_each_frame_expr(frame, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tests::static_code;
    use crate::types::Type;

    #[test]
    fn test_outer_block_rejected_while_nested_is_open() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        code.if_(root, Expr::boolean(true), |c, _then| {
            let err = c.nop(root).unwrap_err();
            assert!(err.is_invalid_state());
            Ok(())
        })
        .unwrap();
        assert!(code.nop(root).is_ok());
    }

    #[test]
    fn test_terminal_block_rejects_statements() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        code.return_void(root).unwrap();
        assert!(code.is_terminal(root));
        assert!(code.nop(root).unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_closed_block_handle_rejected() {
        let mut code = static_code(vec![], Type::void());
        let root = code.root();
        let mut inner = None;
        code.scope(root, |_, b| {
            inner = Some(b);
            Ok(())
        })
        .unwrap();
        let inner = inner.unwrap();
        assert!(code.nop(inner).unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_if_else_both_terminal_propagates() {
        let mut code = static_code(vec![("x", Type::int())], Type::int());
        let root = code.root();
        let x = code.param(root, 0).unwrap();
        let cond = Expr::gt(x.get(), Expr::int(0)).unwrap();
        code.if_else(root, cond, |c, b| c.return_value(b, Expr::int(1)), |c, b| c.return_value(b, Expr::int(-1)))
            .unwrap();
        assert!(code.is_terminal(root));
    }
}
