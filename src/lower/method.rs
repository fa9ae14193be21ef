//! Statement lowering
//!
//! A [`MethodLowerer`] walks the block tree of one frame and appends
//! abstract instructions. Reachability is tracked the way a single-pass
//! code generator does it: after a jump, return or throw the lowerer is
//! not `alive` and drops instructions until a label somebody jumps to is
//! placed.
//!
//! Structured exits (`break`, `continue`, `yield`, `return`) leaving a
//! `try` with a `finally` block get a copy of that block inlined on the
//! way out. The inlined copy is cut out of the protected range, so an
//! exception it throws is not caught by the same `try` again.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::backend::opcodes::*;
use crate::backend::{CodeRequest, HandlerRequest, Insn, Label, LdcConst, LocalVarRequest};
use crate::builder::{Code, SwitchKind, SwitchKey, VarKind};
use crate::error::{Error, Result};
use crate::ir::{AnonId, Block, CatchClause, Loop, MethodRef, Stmt, Switch, VarId};
use crate::model::class::FieldEntry;
use crate::signature::{collect_type_annotations, type_signature, LocalRange, TypeAnnotation, TypeTarget};
use crate::types::{PrimitiveKind, Type, TypeScope, THROWABLE};

use super::slots::SlotAllocator;
use super::ClassContext;

/// Code range protected by one `try`, minus the gaps where finally
/// blocks were inlined
#[derive(Debug)]
pub(super) struct Region {
    ranges: Vec<(Label, Label)>,
    open: Label,
}

impl Region {
    fn new(start: Label) -> Self {
        Self { ranges: Vec::new(), open: start }
    }

    fn close(mut self, end: Label) -> Vec<(Label, Label)> {
        self.ranges.push((self.open, end));
        self.ranges.retain(|(s, e)| s != e);
        self.ranges
    }
}

/// Enclosing construct a jump can leave
#[derive(Debug)]
pub(super) enum Exit {
    Loop { lp: Loop, brk: Label, cont: Label, redo: Label },
    Switch { sw: Switch, end: Label },
    Protected { region: Region, finally: Option<Block> },
}

#[derive(Debug, Clone, Copy)]
enum LoopJump {
    Break,
    Continue,
    Redo,
}

pub(crate) struct MethodLowerer<'c, 'm> {
    pub(super) cx: &'c mut ClassContext<'m>,
    pub(super) code: Option<&'m Code>,
    /// Class the lowered method belongs to
    pub(super) class_name: String,
    /// Set when lowering a method of a synthesized class
    pub(super) anon: Option<AnonId>,
    /// Name and descriptor of the lowered method; `None` for `<clinit>`
    pub(super) method: Option<(String, String)>,
    /// Instance field initializers run after the superclass constructor
    pub(super) field_inits: Vec<&'m FieldEntry>,
    pub(super) insns: Vec<Insn>,
    handlers: Vec<HandlerRequest>,
    locals: Vec<LocalVarRequest>,
    type_annotations: Vec<TypeAnnotation>,
    slots: SlotAllocator,
    var_slots: HashMap<VarId, u16>,
    /// Declared but not yet stored; their debug range starts at the first store
    pending: HashSet<VarId>,
    var_start: HashMap<VarId, Label>,
    scopes: Vec<Vec<VarId>>,
    exits: Vec<Exit>,
    jumped: HashSet<Label>,
    next_label: u32,
    pub(super) alive: bool,
    /// Target of `return` inside a static initializer chunk
    return_label: Option<Label>,
}

impl<'c, 'm> MethodLowerer<'c, 'm> {
    pub(super) fn new(
        cx: &'c mut ClassContext<'m>,
        code: Option<&'m Code>,
        class_name: &str,
        anon: Option<AnonId>,
        method: Option<(String, String)>,
    ) -> Self {
        Self {
            cx,
            code,
            class_name: class_name.to_string(),
            anon,
            method,
            field_inits: Vec::new(),
            insns: Vec::new(),
            handlers: Vec::new(),
            locals: Vec::new(),
            type_annotations: Vec::new(),
            slots: SlotAllocator::new(),
            var_slots: HashMap::new(),
            pending: HashSet::new(),
            var_start: HashMap::new(),
            scopes: Vec::new(),
            exits: Vec::new(),
            jumped: HashSet::new(),
            next_label: 0,
            alive: true,
            return_label: None,
        }
    }

    pub(super) fn code(&self) -> Result<&'m Code> {
        self.code.ok_or_else(|| Error::invalid_state("expression refers to a method body outside of one"))
    }

    // ---- instruction stream ----------------------------------------------

    pub(super) fn new_label(&mut self) -> Label {
        self.next_label += 1;
        Label(self.next_label)
    }

    /// Bind `label` here; code after it is reachable if anything jumps to it
    pub(super) fn place(&mut self, label: Label) {
        self.insns.push(Insn::Label(label));
        if self.jumped.contains(&label) {
            self.alive = true;
        }
    }

    /// Bind an exception handler entry, which is always reachable
    fn place_entry(&mut self, label: Label) {
        self.insns.push(Insn::Label(label));
        self.alive = true;
    }

    pub(super) fn emit(&mut self, insn: Insn) {
        if self.alive {
            self.insns.push(insn);
        }
    }

    pub(super) fn op(&mut self, op: u8) {
        self.emit(Insn::Op(op));
    }

    /// Return or throw
    pub(super) fn terminal(&mut self, op: u8) {
        self.emit(Insn::Op(op));
        self.alive = false;
    }

    pub(super) fn jump(&mut self, op: u8, target: Label) {
        if !self.alive {
            return;
        }
        self.insns.push(Insn::Jump { op, target });
        self.jumped.insert(target);
        if op == GOTO {
            self.alive = false;
        }
    }

    pub(super) fn switch_insn(&mut self, default: Label, cases: Vec<(i32, Label)>) {
        if !self.alive {
            return;
        }
        self.jumped.insert(default);
        self.jumped.extend(cases.iter().map(|(_, l)| *l));
        self.insns.push(Insn::Switch { default, cases });
        self.alive = false;
    }

    pub(super) fn invoke(&mut self, m: &MethodRef) {
        let op = match m.kind {
            crate::ir::InvokeKind::Static => INVOKESTATIC,
            crate::ir::InvokeKind::Virtual => INVOKEVIRTUAL,
            crate::ir::InvokeKind::Interface => INVOKEINTERFACE,
            crate::ir::InvokeKind::Special => INVOKESPECIAL,
        };
        self.emit(Insn::Invoke {
            op,
            owner: m.owner.clone(),
            name: m.name.clone(),
            descriptor: m.descriptor(),
            interface: m.interface_owner,
        });
    }

    pub(super) fn call(&mut self, op: u8, owner: &str, name: &str, descriptor: &str, interface: bool) {
        self.emit(Insn::Invoke {
            op,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        });
    }

    pub(super) fn ldc(&mut self, c: LdcConst) {
        self.emit(Insn::Ldc(c));
    }

    // ---- frames ----------------------------------------------------------

    /// Lower frame `frame` of the current body into a complete method body
    pub(super) fn lower_frame(mut self, frame: usize) -> Result<CodeRequest> {
        let code = self.code()?;
        let node = &code.frames[frame];
        let start = self.new_label();
        self.place(start);
        let mut params = Vec::with_capacity(node.params.len() + 1);
        for v in node.this_var.iter().chain(&node.params) {
            let slot = self.slots.alloc(&code.vars[v.0].ty)?;
            self.var_slots.insert(*v, slot);
            params.push(*v);
        }
        self.lower_block(node.root)?;
        if self.alive {
            if !node.ret.is_void() {
                return Err(Error::invalid_state(format!("control reaches the end of {} without a return", node.name)));
            }
            self.terminal(RETURN);
        }
        let end = self.new_label();
        self.place(end);
        for v in params {
            self.record_local(v, start, end)?;
        }
        Ok(self.into_code())
    }

    pub(super) fn into_code(self) -> CodeRequest {
        trace!("lowered {} instructions, {} local slots", self.insns.len(), self.slots.max());
        CodeRequest {
            insns: self.insns,
            handlers: self.handlers,
            locals: self.locals,
            type_annotations: self.type_annotations,
        }
    }

    /// Lower one user static initializer into the shared `<clinit>` body;
    /// its `return` continues with the next chunk
    pub(super) fn static_chunk(&mut self, code: &'m Code) -> Result<()> {
        self.code = Some(code);
        self.var_slots.clear();
        self.slots = SlotAllocator::new();
        let end = self.new_label();
        self.return_label = Some(end);
        self.lower_block(code.frames[0].root)?;
        self.place(end);
        self.return_label = None;
        Ok(())
    }

    // ---- blocks and locals -----------------------------------------------

    pub(super) fn lower_block(&mut self, blk: Block) -> Result<()> {
        let code = self.code()?;
        let mark = self.slots.mark();
        self.scopes.push(Vec::new());
        for stmt in &code.blocks[blk.0].stmts {
            self.stmt(stmt)?;
        }
        let declared = self.scopes.pop().unwrap_or_default();
        let started: Vec<(VarId, Label)> =
            declared.iter().filter_map(|v| self.var_start.remove(v).map(|l| (*v, l))).collect();
        for v in &declared {
            self.pending.remove(v);
        }
        if !started.is_empty() {
            let end = self.new_label();
            self.place(end);
            for (v, start) in started {
                self.record_local(v, start, end)?;
            }
        }
        self.slots.release(mark);
        Ok(())
    }

    fn declare(&mut self, var: VarId) -> Result<()> {
        let code = self.code()?;
        let node = &code.vars[var.0];
        let slot = self.slots.alloc(&node.ty)?;
        trace!("{} -> slot {slot}", node.name);
        self.var_slots.insert(var, slot);
        self.pending.insert(var);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(var);
        }
        Ok(())
    }

    pub(super) fn slot_of(&self, var: VarId) -> Result<u16> {
        self.var_slots
            .get(&var)
            .copied()
            .ok_or_else(|| Error::invalid_state(format!("variable {} used outside its scope", var.0)))
    }

    pub(super) fn store_var(&mut self, var: VarId) -> Result<()> {
        let code = self.code()?;
        let slot = self.slot_of(var)?;
        self.emit(Insn::Local { op: store_op(&code.vars[var.0].ty), slot });
        if self.pending.remove(&var) {
            let start = self.new_label();
            self.place(start);
            self.var_start.insert(var, start);
        }
        Ok(())
    }

    /// Debug table and type annotation entries for a variable live over
    /// `start..end`
    fn record_local(&mut self, var: VarId, start: Label, end: Label) -> Result<()> {
        let code = self.code()?;
        let node = &code.vars[var.0];
        let slot = self.slot_of(var)?;
        if node.hidden {
            return Ok(());
        }
        if self.cx.config().debug {
            let signature = match &node.generic {
                Some(g) if g.is_generic() => Some(type_signature(g, &TypeScope::of(&code.type_params))?),
                _ => None,
            };
            self.locals.push(LocalVarRequest {
                start,
                end,
                slot,
                name: node.name.clone(),
                descriptor: node.ty.descriptor(),
                signature,
            });
        }
        if matches!(node.kind, VarKind::Local | VarKind::Catch) {
            if let Some(g) = &node.generic {
                let target = TypeTarget::LocalVariable(vec![LocalRange { start, end, slot }]);
                collect_type_annotations(g, &target, &mut self.type_annotations)?;
            }
        }
        Ok(())
    }

    // ---- statements ------------------------------------------------------

    fn stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Declare(v) => self.declare(*v),
            Stmt::Store { var, value } => {
                self.expr(value)?;
                self.store_var(*var)
            }
            Stmt::Inc { var, amount } => {
                let slot = self.slot_of(*var)?;
                self.emit(Insn::Iinc { slot, delta: *amount });
                Ok(())
            }
            Stmt::Eval(e) => self.discard(e),
            Stmt::PutField { target, field, value, order } => self.put_field(target.as_ref(), field, value, *order),
            Stmt::ArrayStore { array, index, value, order } => self.array_store(array, index, value, *order),
            Stmt::Return(value) => self.return_(value.as_ref()),
            Stmt::Throw(e) => {
                self.expr(e)?;
                self.terminal(ATHROW);
                Ok(())
            }
            Stmt::If { cond, then, otherwise } => self.if_(cond, *then, *otherwise),
            Stmt::Loop(lp) => self.loop_(*lp),
            Stmt::Break(lp) => self.leave_loop(*lp, LoopJump::Break),
            Stmt::Continue(lp) => self.leave_loop(*lp, LoopJump::Continue),
            Stmt::Redo(lp) => self.leave_loop(*lp, LoopJump::Redo),
            Stmt::Switch(sw) => self.switch(*sw),
            Stmt::Yield { switch, value } => self.yield_(*switch, value),
            Stmt::Try { body, catches, finally } => self.try_(*body, catches, *finally),
            Stmt::Scope(b) => self.lower_block(*b),
            Stmt::InitChain { ctor, args } => self.init_chain(ctor, args),
            Stmt::MonitorEnter(e) => {
                self.expr(e)?;
                self.op(MONITORENTER);
                Ok(())
            }
            Stmt::MonitorExit(e) => {
                self.expr(e)?;
                self.op(MONITOREXIT);
                Ok(())
            }
            Stmt::Line(line) => {
                if self.cx.config().debug {
                    self.emit(Insn::Line(*line));
                }
                Ok(())
            }
            Stmt::Nop => {
                self.op(NOP);
                Ok(())
            }
        }
    }

    fn init_chain(&mut self, ctor: &MethodRef, args: &[crate::ir::Expr]) -> Result<()> {
        self.emit(Insn::Local { op: ALOAD, slot: 0 });
        for a in args {
            self.expr(a)?;
        }
        self.invoke(ctor);
        // this(..) leaves field initialization to the delegate
        if ctor.owner != self.class_name {
            for f in std::mem::take(&mut self.field_inits) {
                if let Some(init) = &f.init {
                    self.emit(Insn::Local { op: ALOAD, slot: 0 });
                    self.expr(init)?;
                    self.emit(Insn::Field {
                        op: PUTFIELD,
                        owner: self.class_name.clone(),
                        name: f.name.clone(),
                        descriptor: f.ty.descriptor(),
                    });
                }
            }
        }
        Ok(())
    }

    /// `putstatic` of a static field's initializer in `<clinit>`
    pub(super) fn static_field_init(&mut self, field: &FieldEntry) -> Result<()> {
        if let Some(init) = &field.init {
            self.expr(init)?;
            self.emit(Insn::Field {
                op: PUTSTATIC,
                owner: self.class_name.clone(),
                name: field.name.clone(),
                descriptor: field.ty.descriptor(),
            });
        }
        Ok(())
    }

    fn return_(&mut self, value: Option<&crate::ir::Expr>) -> Result<()> {
        if let Some(end) = self.return_label {
            let gap = self.begin_exit(0)?;
            self.jump(GOTO, end);
            self.end_exit(gap);
            return Ok(());
        }
        let Some(value) = value else {
            let gap = self.begin_exit(0)?;
            self.terminal(RETURN);
            self.end_exit(gap);
            return Ok(());
        };
        self.expr(value)?;
        let ty = value.ty().clone();
        if self.finally_pending(0) {
            let slot = self.slots.alloc(&ty)?;
            self.emit(Insn::Local { op: store_op(&ty), slot });
            let gap = self.begin_exit(0)?;
            self.emit(Insn::Local { op: load_op(&ty), slot });
            self.terminal(return_op(&ty));
            self.end_exit(gap);
        } else {
            self.terminal(return_op(&ty));
        }
        Ok(())
    }

    fn if_(&mut self, cond: &crate::ir::Expr, then: Block, otherwise: Option<Block>) -> Result<()> {
        match otherwise {
            None => {
                let end = self.new_label();
                self.cond_jump(cond, false, end)?;
                self.lower_block(then)?;
                self.place(end);
            }
            Some(otherwise) => {
                let (other, end) = (self.new_label(), self.new_label());
                self.cond_jump(cond, false, other)?;
                self.lower_block(then)?;
                self.jump(GOTO, end);
                self.place(other);
                self.lower_block(otherwise)?;
                self.place(end);
            }
        }
        Ok(())
    }

    // ---- loops -----------------------------------------------------------

    fn loop_(&mut self, lp: Loop) -> Result<()> {
        let code = self.code()?;
        let node = &code.loops[lp.0];
        let (top, brk, cont) = (self.new_label(), self.new_label(), self.new_label());
        self.place(top);
        let redo = if node.test_first {
            if let Some(cond) = &node.cond {
                self.cond_jump(cond, false, brk)?;
            }
            let redo = self.new_label();
            self.place(redo);
            redo
        } else {
            top
        };

        self.exits.push(Exit::Loop { lp, brk, cont, redo });
        self.lower_block(node.body)?;
        self.exits.pop();

        self.place(cont);
        if let Some(step) = node.step {
            self.lower_block(step)?;
        }
        match (&node.cond, node.test_first) {
            (Some(cond), false) => self.cond_jump(cond, true, top)?,
            _ => self.jump(GOTO, top),
        }
        self.place(brk);
        Ok(())
    }

    fn leave_loop(&mut self, lp: Loop, how: LoopJump) -> Result<()> {
        let found = self.exits.iter().enumerate().rev().find_map(|(i, e)| match e {
            Exit::Loop { lp: l, brk, cont, redo } if *l == lp => Some((i, *brk, *cont, *redo)),
            _ => None,
        });
        let (depth, brk, cont, redo) = found.ok_or_else(|| Error::invalid_state("jump to a loop that is not open"))?;
        let target = match how {
            LoopJump::Break => brk,
            LoopJump::Continue => cont,
            LoopJump::Redo => redo,
        };
        let gap = self.begin_exit(depth + 1)?;
        self.jump(GOTO, target);
        self.end_exit(gap);
        Ok(())
    }

    // ---- switches --------------------------------------------------------

    fn switch(&mut self, sw: Switch) -> Result<()> {
        let code = self.code()?;
        let node = &code.switches[sw.0];
        let end = self.new_label();
        let default = if node.default.is_some() { self.new_label() } else { end };
        let arm_labels: Vec<Label> = node.arms.iter().map(|_| self.new_label()).collect();

        match node.kind {
            SwitchKind::Int => {
                self.expr(&node.selector)?;
                let mut cases = Vec::new();
                for (arm, label) in node.arms.iter().zip(&arm_labels) {
                    for key in &arm.keys {
                        if let SwitchKey::Int(k) = key {
                            cases.push((*k, *label));
                        }
                    }
                }
                self.switch_insn(default, cases);
            }
            SwitchKind::String => {
                let keys: Vec<(String, usize)> = node
                    .arms
                    .iter()
                    .enumerate()
                    .flat_map(|(i, arm)| {
                        arm.keys.iter().filter_map(move |k| match k {
                            SwitchKey::String(s) => Some((s.clone(), i)),
                            _ => None,
                        })
                    })
                    .collect();
                self.string_dispatch(&node.selector, &keys, &arm_labels, default)?;
            }
            SwitchKind::Class => {
                let slot = self.slots.alloc(node.selector.ty())?;
                self.expr(&node.selector)?;
                self.emit(Insn::Local { op: ASTORE, slot });
                for (arm, label) in node.arms.iter().zip(&arm_labels) {
                    for key in &arm.keys {
                        if let SwitchKey::Class(name) = key {
                            self.emit(Insn::Local { op: ALOAD, slot });
                            self.ldc(LdcConst::Class(name.clone()));
                            self.jump(IF_ACMPEQ, *label);
                        }
                    }
                }
                self.jump(GOTO, default);
            }
        }

        self.exits.push(Exit::Switch { sw, end });
        for (arm, label) in node.arms.iter().zip(&arm_labels) {
            self.place(*label);
            self.lower_block(arm.body)?;
            self.jump(GOTO, end);
        }
        if let Some(d) = node.default {
            self.place(default);
            self.lower_block(d)?;
        }
        self.exits.pop();
        self.place(end);
        Ok(())
    }

    /// Switch on `hashCode()`, confirm with `equals`, then switch on the
    /// index of the matched arm
    fn string_dispatch(
        &mut self,
        selector: &crate::ir::Expr,
        keys: &[(String, usize)],
        arm_labels: &[Label],
        default: Label,
    ) -> Result<()> {
        let text = self.slots.alloc(&Type::string())?;
        let index = self.slots.alloc(&Type::int())?;
        self.expr(selector)?;
        self.emit(Insn::Local { op: ASTORE, slot: text });
        self.emit(Insn::Push(-1));
        self.emit(Insn::Local { op: ISTORE, slot: index });

        let mut buckets: std::collections::BTreeMap<i32, Vec<(&str, usize)>> = Default::default();
        for (key, arm) in keys {
            buckets.entry(java_hash(key)).or_default().push((key.as_str(), *arm));
        }
        let second = self.new_label();
        let bucket_labels: Vec<(i32, Label)> = buckets.keys().map(|h| (*h, self.new_label())).collect();
        self.emit(Insn::Local { op: ALOAD, slot: text });
        self.call(INVOKEVIRTUAL, "java/lang/String", "hashCode", "()I", false);
        self.switch_insn(second, bucket_labels.clone());

        for ((_, label), entries) in bucket_labels.iter().zip(buckets.values()) {
            self.place(*label);
            for (key, arm) in entries {
                let next = self.new_label();
                self.emit(Insn::Local { op: ALOAD, slot: text });
                self.ldc(LdcConst::String(key.to_string()));
                self.call(INVOKEVIRTUAL, "java/lang/String", "equals", "(Ljava/lang/Object;)Z", false);
                self.jump(IFEQ, next);
                self.emit(Insn::Push(*arm as i32));
                self.emit(Insn::Local { op: ISTORE, slot: index });
                self.jump(GOTO, second);
                self.place(next);
            }
            self.jump(GOTO, second);
        }

        self.place(second);
        self.emit(Insn::Local { op: ILOAD, slot: index });
        let cases = (0..arm_labels.len()).map(|i| (i as i32, arm_labels[i])).collect();
        self.switch_insn(default, cases);
        Ok(())
    }

    fn yield_(&mut self, sw: Switch, value: &crate::ir::Expr) -> Result<()> {
        let code = self.code()?;
        let result = code.switches[sw.0].result.ok_or_else(|| Error::invalid_state("yield from a switch statement"))?;
        let found = self.exits.iter().enumerate().rev().find_map(|(i, e)| match e {
            Exit::Switch { sw: s, end } if *s == sw => Some((i, *end)),
            _ => None,
        });
        let (depth, end) = found.ok_or_else(|| Error::invalid_state("yield outside its switch"))?;
        self.expr(value)?;
        self.store_var(result)?;
        let gap = self.begin_exit(depth + 1)?;
        self.jump(GOTO, end);
        self.end_exit(gap);
        Ok(())
    }

    // ---- exception regions -----------------------------------------------

    fn try_(&mut self, body: Block, catches: &[CatchClause], finally: Option<Block>) -> Result<()> {
        let code = self.code()?;
        let start = self.new_label();
        self.place(start);
        self.exits.push(Exit::Protected { region: Region::new(start), finally });
        self.lower_block(body)?;
        let body_end = self.new_label();
        self.place(body_end);
        let covered = self.close_region(body_end)?;

        let done = self.new_label();
        self.inline_finally(finally)?;
        self.jump(GOTO, done);

        let mut any_ranges = covered.clone();
        for clause in catches {
            let handler = self.new_label();
            self.place_entry(handler);
            let mark = self.slots.mark();
            let var = clause.var;
            let slot = self.slots.alloc(&code.vars[var.0].ty)?;
            self.var_slots.insert(var, slot);
            self.emit(Insn::Local { op: ASTORE, slot });
            let var_start = self.new_label();
            self.place(var_start);
            if finally.is_some() {
                self.exits.push(Exit::Protected { region: Region::new(handler), finally });
            }
            self.lower_block(clause.body)?;
            let catch_end = self.new_label();
            self.place(catch_end);
            if finally.is_some() {
                any_ranges.extend(self.close_region(catch_end)?);
            }
            self.record_local(var, var_start, catch_end)?;
            self.inline_finally(finally)?;
            self.jump(GOTO, done);
            self.slots.release(mark);

            for ty in &clause.types {
                for (s, e) in &covered {
                    self.handlers.push(HandlerRequest { start: *s, end: *e, handler, catch_type: Some(ty.clone()) });
                }
            }
        }

        if let Some(fin) = finally {
            let handler = self.new_label();
            self.place_entry(handler);
            let mark = self.slots.mark();
            let slot = self.slots.alloc(&Type::class(THROWABLE))?;
            self.emit(Insn::Local { op: ASTORE, slot });
            trace!("finally block {} inlined into its catch-all handler", fin.0);
            self.lower_block(fin)?;
            self.emit(Insn::Local { op: ALOAD, slot });
            self.terminal(ATHROW);
            self.slots.release(mark);
            for (s, e) in any_ranges {
                self.handlers.push(HandlerRequest { start: s, end: e, handler, catch_type: None });
            }
        }
        self.place(done);
        Ok(())
    }

    /// Run `finally` on the normal path out of a try or catch body
    fn inline_finally(&mut self, finally: Option<Block>) -> Result<()> {
        if let Some(fin) = finally {
            if self.alive {
                trace!("finally block {} inlined on fall-through", fin.0);
                self.lower_block(fin)?;
            }
        }
        Ok(())
    }

    fn close_region(&mut self, end: Label) -> Result<Vec<(Label, Label)>> {
        match self.exits.pop() {
            Some(Exit::Protected { region, .. }) => Ok(region.close(end)),
            _ => Err(Error::invalid_state("unbalanced exception region")),
        }
    }

    /// Whether leaving every construct above `depth` runs a finally block
    fn finally_pending(&self, depth: usize) -> bool {
        self.exits[depth.min(self.exits.len())..]
            .iter()
            .any(|e| matches!(e, Exit::Protected { finally: Some(_), .. }))
    }

    /// Inline the finally blocks of every protected region above `depth`,
    /// innermost first. The caller emits the actual jump, then passes the
    /// returned gaps to [`Self::end_exit`].
    ///
    /// Each region's gap opens right before its own finally copy, so the
    /// copies of inner finally blocks stay covered by the outer regions.
    fn begin_exit(&mut self, depth: usize) -> Result<Option<Vec<(usize, Label)>>> {
        if !self.finally_pending(depth) || !self.alive {
            return Ok(None);
        }
        let protected: Vec<usize> =
            (depth..self.exits.len()).filter(|i| matches!(self.exits[*i], Exit::Protected { .. })).collect();
        let mut gaps = Vec::with_capacity(protected.len());
        for &i in protected.iter().rev() {
            let gap_start = self.new_label();
            self.place(gap_start);
            gaps.push((i, gap_start));
            let fin = match &self.exits[i] {
                Exit::Protected { finally: Some(f), .. } => *f,
                _ => continue,
            };
            if !self.alive {
                continue;
            }
            trace!("finally block {} inlined on a jump out of its try", fin.0);
            // the finally body runs outside of its own try and everything nested in it
            let hidden = self.exits.split_off(i);
            let result = self.lower_block(fin);
            self.exits.extend(hidden);
            result?;
        }
        Ok(Some(gaps))
    }

    fn end_exit(&mut self, gaps: Option<Vec<(usize, Label)>>) {
        let Some(gaps) = gaps else {
            return;
        };
        let gap_end = self.new_label();
        self.place(gap_end);
        for (i, gap_start) in gaps {
            if let Some(Exit::Protected { region, .. }) = self.exits.get_mut(i) {
                region.ranges.push((region.open, gap_start));
                region.open = gap_end;
            }
        }
    }
}

/// `String.hashCode` of `s`
pub(super) fn java_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Offset of a type's opcode within an I/L/F/D/A opcode family
pub(super) fn kind_offset(ty: &Type) -> u8 {
    match ty.primitive() {
        Some(PrimitiveKind::Long) => 1,
        Some(PrimitiveKind::Float) => 2,
        Some(PrimitiveKind::Double) => 3,
        Some(_) => 0,
        None => 4,
    }
}

pub(super) fn load_op(ty: &Type) -> u8 {
    ILOAD + kind_offset(ty)
}

pub(super) fn store_op(ty: &Type) -> u8 {
    ISTORE + kind_offset(ty)
}

pub(super) fn return_op(ty: &Type) -> u8 {
    if ty.is_void() {
        RETURN
    } else {
        IRETURN + kind_offset(ty)
    }
}

pub(super) fn array_load_op(component: &Type) -> u8 {
    match component.primitive() {
        Some(PrimitiveKind::Boolean | PrimitiveKind::Byte) => BALOAD,
        Some(PrimitiveKind::Char) => CALOAD,
        Some(PrimitiveKind::Short) => SALOAD,
        Some(_) => IALOAD + kind_offset(component),
        None => AALOAD,
    }
}

pub(super) fn array_store_op(component: &Type) -> u8 {
    match component.primitive() {
        Some(PrimitiveKind::Boolean | PrimitiveKind::Byte) => BASTORE,
        Some(PrimitiveKind::Char) => CASTORE,
        Some(PrimitiveKind::Short) => SASTORE,
        Some(_) => IASTORE + kind_offset(component),
        None => AASTORE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_string_hash() {
        assert_eq!(java_hash(""), 0);
        assert_eq!(java_hash("one"), 110182);
        assert_eq!(java_hash("Aa"), java_hash("BB"));
        assert_eq!(java_hash("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn test_opcode_families() {
        assert_eq!(load_op(&Type::boolean()), ILOAD);
        assert_eq!(load_op(&Type::double()), DLOAD);
        assert_eq!(store_op(&Type::string()), ASTORE);
        assert_eq!(return_op(&Type::long()), LRETURN);
        assert_eq!(return_op(&Type::void()), RETURN);
        assert_eq!(array_load_op(&Type::boolean()), BALOAD);
        assert_eq!(array_store_op(&Type::float()), FASTORE);
        assert_eq!(array_load_op(&Type::object()), AALOAD);
    }

    #[test]
    fn test_region_drops_empty_ranges() {
        let region = Region { ranges: vec![(Label(1), Label(2)), (Label(3), Label(3))], open: Label(4) };
        assert_eq!(region.close(Label(4)), vec![(Label(1), Label(2))]);
    }
}
