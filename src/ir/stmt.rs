//! Statements stored in builder blocks

use super::{Block, Expr, FieldRef, Loop, MemoryOrder, MethodRef, Switch, VarId};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Scope start of a local; slots are assigned when this is lowered
    Declare(VarId),
    Store { var: VarId, value: Expr },
    /// `iinc` on an `int` local
    Inc { var: VarId, amount: i16 },
    /// Evaluate for side effects, discarding the result
    Eval(Expr),
    PutField { target: Option<Expr>, field: FieldRef, value: Expr, order: MemoryOrder },
    ArrayStore { array: Expr, index: Expr, value: Expr, order: MemoryOrder },
    Return(Option<Expr>),
    Throw(Expr),
    If { cond: Expr, then: Block, otherwise: Option<Block> },
    Loop(Loop),
    Break(Loop),
    Continue(Loop),
    Redo(Loop),
    Switch(Switch),
    /// Produce the value of the innermost switch expression and leave it
    Yield { switch: Switch, value: Expr },
    Try { body: Block, catches: Vec<CatchClause>, finally: Option<Block> },
    /// Plain nested scope
    Scope(Block),
    /// `super(..)` or `this(..)` at the start of a constructor
    InitChain { ctor: MethodRef, args: Vec<Expr> },
    MonitorEnter(Expr),
    MonitorExit(Expr),
    Line(u16),
    Nop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Internal names of the caught exception types (multi-catch when > 1)
    pub types: Vec<String>,
    pub var: VarId,
    pub body: Block,
}

impl Stmt {
    /// Visit the expressions this statement evaluates directly, not those of
    /// nested blocks
    pub(crate) fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Stmt::Store { value, .. } | Stmt::Eval(value) | Stmt::Throw(value) | Stmt::Yield { value, .. } => f(value),
            Stmt::MonitorEnter(e) | Stmt::MonitorExit(e) => f(e),
            Stmt::PutField { target, value, .. } => {
                if let Some(t) = target {
                    f(t);
                }
                f(value);
            }
            Stmt::ArrayStore { array, index, value, .. } => {
                f(array);
                f(index);
                f(value);
            }
            Stmt::Return(Some(e)) => f(e),
            Stmt::If { cond, .. } => f(cond),
            Stmt::InitChain { args, .. } => args.iter().for_each(|a| f(a)),
            Stmt::Declare(_)
            | Stmt::Inc { .. }
            | Stmt::Return(None)
            | Stmt::Loop(_)
            | Stmt::Break(_)
            | Stmt::Continue(_)
            | Stmt::Redo(_)
            | Stmt::Switch(_)
            | Stmt::Try { .. }
            | Stmt::Scope(_)
            | Stmt::Line(_)
            | Stmt::Nop => {}
        }
    }

    /// Whether control never continues to the next statement
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Stmt::Return(_) | Stmt::Throw(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Redo(_) | Stmt::Yield { .. }
        )
    }
}
