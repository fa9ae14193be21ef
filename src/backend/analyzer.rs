//! Dataflow analysis over an assembled instruction stream
//!
//! Computes the verifier type state before every reachable instruction,
//! merging at join points with common-superclass lookups. The results
//! drive stack-map frames, `max_stack`, and dead-code patching.

use std::collections::{BTreeSet, HashMap, VecDeque};

use super::assembler::Assembled;
use super::error::{BackendError, BackendResult};
use super::insn::{Insn, LdcConst};
use super::opcodes::*;
use crate::types::{parse_method_descriptor, PrimitiveKind, Type, TypeRegistry, OBJECT, THROWABLE};

/// Verification type of one local slot or stack entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VType {
    Top,
    Int,
    Float,
    Long,
    Double,
    Null,
    UninitThis,
    /// Result of the `new` at this code offset, before its constructor ran
    Uninit(u16),
    /// Class internal name or array descriptor
    Object(String),
}

impl VType {
    pub fn is_wide(&self) -> bool {
        matches!(self, VType::Long | VType::Double)
    }

    pub fn size(&self) -> u16 {
        if self.is_wide() { 2 } else { 1 }
    }

    pub fn of_type(ty: &Type) -> VType {
        match ty {
            Type::Primitive(k) => match k {
                PrimitiveKind::Long => VType::Long,
                PrimitiveKind::Float => VType::Float,
                PrimitiveKind::Double => VType::Double,
                PrimitiveKind::Void => VType::Top,
                _ => VType::Int,
            },
            Type::Null => VType::Null,
            other => VType::Object(other.class_constant_name()),
        }
    }

    fn of_descriptor(desc: &str) -> BackendResult<VType> {
        Type::from_descriptor(desc)
            .map(|t| VType::of_type(&t))
            .ok_or_else(|| BackendError::MalformedDescriptor { descriptor: desc.to_string() })
    }

    fn object(name: &str) -> VType {
        VType::Object(name.to_string())
    }
}

/// Locals (slot-indexed, wide values followed by `Top`) and operand stack
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub locals: Vec<VType>,
    pub stack: Vec<VType>,
}

impl State {
    fn stack_size(&self) -> u16 {
        self.stack.iter().map(VType::size).sum()
    }

    fn set_local(&mut self, slot: usize, v: VType) {
        let needed = slot + v.size() as usize;
        if self.locals.len() < needed {
            self.locals.resize(needed, VType::Top);
        }
        if slot > 0 && self.locals[slot - 1].is_wide() {
            self.locals[slot - 1] = VType::Top;
        }
        let wide = v.is_wide();
        self.locals[slot] = v;
        if wide {
            self.locals[slot + 1] = VType::Top;
        }
    }

    fn replace(&mut self, from: &VType, to: &VType) {
        for v in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if v == from {
                *v = to.clone();
            }
        }
    }
}

/// Exception handler with instruction-index bounds
#[derive(Debug, Clone)]
pub struct Handler {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    pub catch_type: Option<String>,
}

#[derive(Debug)]
pub struct Analysis {
    /// State before each instruction; `None` for unreachable ones
    pub states: Vec<Option<State>>,
    /// Instructions that need a stack-map frame
    pub frame_points: BTreeSet<usize>,
    /// Maximal runs `[start, end)` of unreachable real instructions
    pub dead: Vec<(usize, usize)>,
    pub max_stack: u16,
    pub max_locals: u16,
}

pub struct Analyzer<'a> {
    insns: &'a [Insn],
    asm: &'a Assembled,
    types: &'a TypeRegistry,
    this_class: &'a str,
    method: &'a str,
    /// Index of the first real instruction at or after each position
    next_real: Vec<usize>,
    new_types: HashMap<u16, String>,
}

impl<'a> Analyzer<'a> {
    pub fn new(insns: &'a [Insn], asm: &'a Assembled, types: &'a TypeRegistry, this_class: &'a str, method: &'a str) -> Self {
        let mut next_real = vec![insns.len(); insns.len() + 1];
        for i in (0..insns.len()).rev() {
            next_real[i] = if insns[i].is_real() { i } else { next_real[i + 1] };
        }
        let new_types = insns
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Insn::Type { op: NEW, class } => Some((asm.offsets[i] as u16, class.clone())),
                _ => None,
            })
            .collect();
        Self { insns, asm, types, this_class, method, next_real, new_types }
    }

    fn fail(&self, index: usize, reason: impl Into<String>) -> BackendError {
        BackendError::Verify { method: self.method.to_string(), index, reason: reason.into() }
    }

    fn target(&self, label: &super::insn::Label) -> BackendResult<usize> {
        Ok(self.next_real[self.asm.label_index(*label)?])
    }

    pub fn analyze(&self, initial: Vec<VType>, handlers: &[Handler]) -> BackendResult<Analysis> {
        let n = self.insns.len();
        let mut states: Vec<Option<State>> = vec![None; n + 1];
        let mut frame_points = BTreeSet::new();
        let mut work = VecDeque::new();
        let mut max_stack = 0u16;

        let entry = self.next_real[0];
        states[entry] = Some(State { locals: initial.clone(), stack: Vec::new() });
        work.push_back(entry);
        let handlers: Vec<Handler> = handlers
            .iter()
            .map(|h| Handler { handler: self.next_real[h.handler], ..h.clone() })
            .collect();

        while let Some(i) = work.pop_front() {
            if i >= n {
                return Err(self.fail(i, "execution falls off the end of the code"));
            }
            let Some(state) = states[i].clone() else { continue };
            max_stack = max_stack.max(state.stack_size());
            let (out, succs) = self.execute(i, state.clone())?;
            max_stack = max_stack.max(out.stack_size());

            for h in handlers.iter().filter(|h| h.start <= i && i < h.end) {
                let catch = VType::object(h.catch_type.as_deref().unwrap_or(THROWABLE));
                for locals in [&state.locals, &out.locals] {
                    let incoming = State { locals: locals.clone(), stack: vec![catch.clone()] };
                    if self.merge_into(&mut states[h.handler], &incoming, h.handler)? {
                        work.push_back(h.handler);
                    }
                }
                frame_points.insert(h.handler);
            }
            for (succ, is_branch) in succs {
                if is_branch {
                    frame_points.insert(succ);
                }
                if self.merge_into(&mut states[succ], &out, succ)? {
                    work.push_back(succ);
                }
            }
        }

        let mut dead = Vec::new();
        let mut run: Option<usize> = None;
        for i in 0..n {
            if !self.insns[i].is_real() {
                continue;
            }
            match (states[i].is_some(), run) {
                (false, None) => run = Some(i),
                (true, Some(start)) => {
                    dead.push((start, i));
                    run = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run {
            dead.push((start, n));
        }
        if !dead.is_empty() {
            max_stack = max_stack.max(1);
        }

        let mut max_locals = initial.len() as u16;
        for insn in self.insns {
            let used = match insn {
                Insn::Local { op, slot } => {
                    let wide = matches!(*op, LLOAD | DLOAD | LSTORE | DSTORE);
                    slot + if wide { 2 } else { 1 }
                }
                Insn::Iinc { slot, .. } => slot + 1,
                _ => 0,
            };
            max_locals = max_locals.max(used);
        }

        states.truncate(n);
        Ok(Analysis { states, frame_points, dead, max_stack, max_locals })
    }

    fn merge_into(&self, slot: &mut Option<State>, incoming: &State, index: usize) -> BackendResult<bool> {
        let Some(existing) = slot.as_mut() else {
            *slot = Some(incoming.clone());
            return Ok(true);
        };
        if existing.stack.len() != incoming.stack.len() {
            return Err(self.fail(index, format!(
                "inconsistent stack height: {} vs {}",
                existing.stack.len(),
                incoming.stack.len()
            )));
        }
        let mut changed = false;
        for (a, b) in existing.stack.iter_mut().zip(&incoming.stack) {
            let m = self.merge_value(a, b);
            if m == VType::Top {
                return Err(self.fail(index, format!("incompatible stack values {a:?} and {b:?}")));
            }
            if m != *a {
                *a = m;
                changed = true;
            }
        }
        let len = existing.locals.len().min(incoming.locals.len());
        if existing.locals.len() > len {
            existing.locals.truncate(len);
            changed = true;
        }
        for (a, b) in existing.locals.iter_mut().zip(&incoming.locals) {
            let m = self.merge_value(a, b);
            if m != *a {
                *a = m;
                changed = true;
            }
        }
        while existing.locals.last() == Some(&VType::Top) {
            existing.locals.pop();
        }
        Ok(changed)
    }

    fn merge_value(&self, a: &VType, b: &VType) -> VType {
        match (a, b) {
            _ if a == b => a.clone(),
            (VType::Null, VType::Object(_)) => b.clone(),
            (VType::Object(_), VType::Null) => a.clone(),
            (VType::Object(x), VType::Object(y)) => VType::Object(self.common_super(x, y)),
            _ => VType::Top,
        }
    }

    fn common_super(&self, a: &str, b: &str) -> String {
        match (a.strip_prefix('['), b.strip_prefix('[')) {
            (Some(ca), Some(cb)) => {
                let class_of = |c: &str| -> Option<String> {
                    if c.starts_with('[') {
                        Some(c.to_string())
                    } else {
                        c.strip_prefix('L').and_then(|s| s.strip_suffix(';')).map(str::to_string)
                    }
                };
                match (class_of(ca), class_of(cb)) {
                    (Some(x), Some(y)) => {
                        let common = self.common_super(&x, &y);
                        if common.starts_with('[') {
                            format!("[{common}")
                        } else {
                            format!("[L{common};")
                        }
                    }
                    _ => OBJECT.to_string(),
                }
            }
            (None, None) => self.types.common_super_class(a, b),
            _ => OBJECT.to_string(),
        }
    }

    fn pop(&self, i: usize, s: &mut State) -> BackendResult<VType> {
        s.stack.pop().ok_or_else(|| self.fail(i, "operand stack underflow"))
    }

    /// Pop one category-2 value or two category-1 values
    fn pop_pair(&self, i: usize, s: &mut State) -> BackendResult<Vec<VType>> {
        let top = self.pop(i, s)?;
        if top.is_wide() {
            Ok(vec![top])
        } else {
            let below = self.pop(i, s)?;
            Ok(vec![below, top])
        }
    }

    fn pop_n(&self, i: usize, s: &mut State, n: usize) -> BackendResult<()> {
        for _ in 0..n {
            self.pop(i, s)?;
        }
        Ok(())
    }

    /// Transfer function; returns the state after `i` and its successors,
    /// flagged when reached by a branch rather than fallthrough
    fn execute(&self, i: usize, mut s: State) -> BackendResult<(State, Vec<(usize, bool)>)> {
        let next = self.next_real[i + 1];
        let mut succs = vec![(next, false)];
        match &self.insns[i] {
            Insn::Label(_) | Insn::Line(_) => {}
            Insn::Op(op) => {
                let op = *op;
                match op {
                    NOP => {}
                    ACONST_NULL => s.stack.push(VType::Null),
                    0x02..=0x08 => s.stack.push(VType::Int),
                    LCONST_0 | LCONST_1 => s.stack.push(VType::Long),
                    FCONST_0..=FCONST_2 => s.stack.push(VType::Float),
                    DCONST_0 | DCONST_1 => s.stack.push(VType::Double),
                    IALOAD..=SALOAD => {
                        self.pop(i, &mut s)?;
                        let array = self.pop(i, &mut s)?;
                        s.stack.push(match op {
                            LALOAD => VType::Long,
                            FALOAD => VType::Float,
                            DALOAD => VType::Double,
                            AALOAD => match array {
                                VType::Object(desc) => match desc.strip_prefix('[') {
                                    Some(c) => VType::of_descriptor(c)?,
                                    None => VType::object(OBJECT),
                                },
                                _ => VType::Null,
                            },
                            _ => VType::Int,
                        });
                    }
                    IASTORE..=SASTORE => self.pop_n(i, &mut s, 3)?,
                    POP => {
                        self.pop(i, &mut s)?;
                    }
                    POP2 => {
                        self.pop_pair(i, &mut s)?;
                    }
                    DUP => {
                        let v = self.pop(i, &mut s)?;
                        s.stack.extend([v.clone(), v]);
                    }
                    DUP_X1 => {
                        let v1 = self.pop(i, &mut s)?;
                        let v2 = self.pop(i, &mut s)?;
                        s.stack.extend([v1.clone(), v2, v1]);
                    }
                    DUP_X2 => {
                        let v1 = self.pop(i, &mut s)?;
                        let under = self.pop_pair(i, &mut s)?;
                        s.stack.push(v1.clone());
                        s.stack.extend(under);
                        s.stack.push(v1);
                    }
                    DUP2 => {
                        let top = self.pop_pair(i, &mut s)?;
                        s.stack.extend(top.iter().cloned());
                        s.stack.extend(top);
                    }
                    DUP2_X1 => {
                        let top = self.pop_pair(i, &mut s)?;
                        let v = self.pop(i, &mut s)?;
                        s.stack.extend(top.iter().cloned());
                        s.stack.push(v);
                        s.stack.extend(top);
                    }
                    DUP2_X2 => {
                        let top = self.pop_pair(i, &mut s)?;
                        let under = self.pop_pair(i, &mut s)?;
                        s.stack.extend(top.iter().cloned());
                        s.stack.extend(under);
                        s.stack.extend(top);
                    }
                    SWAP => {
                        let v1 = self.pop(i, &mut s)?;
                        let v2 = self.pop(i, &mut s)?;
                        s.stack.extend([v1, v2]);
                    }
                    0x60..=0x73 => {
                        self.pop_n(i, &mut s, 2)?;
                        s.stack.push(arith_kind((op - 0x60) % 4));
                    }
                    INEG..=DNEG => {
                        let v = self.pop(i, &mut s)?;
                        s.stack.push(v);
                    }
                    ISHL..=LUSHR => {
                        self.pop(i, &mut s)?;
                        let v = self.pop(i, &mut s)?;
                        s.stack.push(v);
                    }
                    IAND..=LXOR => {
                        self.pop_n(i, &mut s, 2)?;
                        s.stack.push(arith_kind((op - IAND) % 2));
                    }
                    I2L..=I2S => {
                        self.pop(i, &mut s)?;
                        s.stack.push(match op {
                            I2L | F2L | D2L => VType::Long,
                            I2F | L2F | D2F => VType::Float,
                            I2D | L2D | F2D => VType::Double,
                            _ => VType::Int,
                        });
                    }
                    LCMP..=DCMPG => {
                        self.pop_n(i, &mut s, 2)?;
                        s.stack.push(VType::Int);
                    }
                    IRETURN..=ARETURN => {
                        self.pop(i, &mut s)?;
                        succs.clear();
                    }
                    RETURN => succs.clear(),
                    ARRAYLENGTH => {
                        self.pop(i, &mut s)?;
                        s.stack.push(VType::Int);
                    }
                    ATHROW => {
                        self.pop(i, &mut s)?;
                        succs.clear();
                    }
                    MONITORENTER | MONITOREXIT => {
                        self.pop(i, &mut s)?;
                    }
                    other => return Err(self.fail(i, format!("unsupported opcode 0x{other:02x}"))),
                }
            }
            Insn::Push(_) => s.stack.push(VType::Int),
            Insn::Ldc(c) => s.stack.push(match c {
                LdcConst::Int(_) => VType::Int,
                LdcConst::Float(_) => VType::Float,
                LdcConst::Long(_) => VType::Long,
                LdcConst::Double(_) => VType::Double,
                LdcConst::String(_) => VType::object("java/lang/String"),
                LdcConst::Class(_) => VType::object("java/lang/Class"),
            }),
            Insn::Local { op, slot } => {
                let slot = *slot as usize;
                if (ILOAD..=ALOAD).contains(op) {
                    let v = match *op {
                        ILOAD => VType::Int,
                        LLOAD => VType::Long,
                        FLOAD => VType::Float,
                        DLOAD => VType::Double,
                        _ => s.locals.get(slot).cloned().unwrap_or(VType::Top),
                    };
                    if *op == ALOAD && !matches!(v, VType::Object(_) | VType::Null | VType::UninitThis | VType::Uninit(_)) {
                        return Err(self.fail(i, format!("aload of slot {slot} holding {v:?}")));
                    }
                    s.stack.push(v);
                } else {
                    let v = self.pop(i, &mut s)?;
                    s.set_local(slot, v);
                }
            }
            Insn::Iinc { .. } => {}
            Insn::Type { op, class } => match *op {
                NEW => s.stack.push(VType::Uninit(self.asm.offsets[i] as u16)),
                ANEWARRAY => {
                    self.pop(i, &mut s)?;
                    let desc = if class.starts_with('[') { format!("[{class}") } else { format!("[L{class};") };
                    s.stack.push(VType::Object(desc));
                }
                CHECKCAST => {
                    self.pop(i, &mut s)?;
                    s.stack.push(VType::object(class));
                }
                _ => {
                    self.pop(i, &mut s)?;
                    s.stack.push(VType::Int);
                }
            },
            Insn::Field { op, descriptor, .. } => {
                let v = VType::of_descriptor(descriptor)?;
                match *op {
                    GETSTATIC => s.stack.push(v),
                    PUTSTATIC => {
                        self.pop(i, &mut s)?;
                    }
                    GETFIELD => {
                        self.pop(i, &mut s)?;
                        s.stack.push(v);
                    }
                    _ => self.pop_n(i, &mut s, 2)?,
                }
            }
            Insn::Invoke { op, name, descriptor, .. } => {
                let (params, ret) = parse_method_descriptor(descriptor)
                    .ok_or_else(|| BackendError::MalformedDescriptor { descriptor: descriptor.clone() })?;
                self.pop_n(i, &mut s, params.len())?;
                if *op != INVOKESTATIC {
                    let receiver = self.pop(i, &mut s)?;
                    if name == "<init>" {
                        let init = match &receiver {
                            VType::UninitThis => Some(VType::object(self.this_class)),
                            VType::Uninit(off) => self.new_types.get(off).map(|c| VType::object(c)),
                            _ => None,
                        };
                        if let Some(init) = init {
                            s.replace(&receiver, &init);
                        }
                    }
                }
                if !ret.is_void() {
                    s.stack.push(VType::of_type(&ret));
                }
            }
            Insn::NewArray(kind) => {
                self.pop(i, &mut s)?;
                s.stack.push(VType::Object(format!("[{}", kind.descriptor())));
            }
            Insn::MultiANewArray { descriptor, dims } => {
                self.pop_n(i, &mut s, *dims as usize)?;
                s.stack.push(VType::Object(descriptor.clone()));
            }
            Insn::Jump { op, target } => {
                match *op {
                    GOTO => succs.clear(),
                    IF_ICMPEQ..=IF_ACMPNE => self.pop_n(i, &mut s, 2)?,
                    _ => {
                        self.pop(i, &mut s)?;
                    }
                }
                if self.asm.widened.contains(&i) {
                    succs = vec![(next, true)];
                }
                succs.push((self.target(target)?, true));
            }
            Insn::Switch { default, cases } => {
                self.pop(i, &mut s)?;
                succs.clear();
                succs.push((self.target(default)?, true));
                for (_, l) in cases {
                    succs.push((self.target(l)?, true));
                }
            }
        }
        Ok((s, succs))
    }
}

fn arith_kind(k: u8) -> VType {
    match k {
        0 => VType::Int,
        1 => VType::Long,
        2 => VType::Float,
        _ => VType::Double,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::assembler::assemble;
    use crate::backend::constpool::ConstantPool;
    use crate::backend::insn::Label;

    fn run(insns: &[Insn], initial: Vec<VType>, handlers: &[Handler]) -> BackendResult<Analysis> {
        let mut cp = ConstantPool::new();
        let asm = assemble(insns, &mut cp, "test")?;
        let reg = TypeRegistry::new();
        Analyzer::new(insns, &asm, &reg, "Test", "test").analyze(initial, handlers)
    }

    #[test]
    fn test_branch_merge_uses_common_superclass() {
        let insns = vec![
            Insn::Local { op: ILOAD, slot: 0 },
            Insn::Jump { op: IFEQ, target: Label(1) },
            Insn::Type { op: NEW, class: "java/lang/IllegalStateException".into() },
            Insn::Local { op: ASTORE, slot: 1 },
            Insn::Jump { op: GOTO, target: Label(2) },
            Insn::Label(Label(1)),
            Insn::Type { op: NEW, class: "java/lang/IllegalArgumentException".into() },
            Insn::Op(DUP),
            Insn::Invoke {
                op: INVOKESPECIAL,
                owner: "java/lang/IllegalArgumentException".into(),
                name: "<init>".into(),
                descriptor: "()V".into(),
                interface: false,
            },
            Insn::Local { op: ASTORE, slot: 1 },
            Insn::Label(Label(2)),
            Insn::Op(RETURN),
        ];
        let a = run(&insns, vec![VType::Int], &[]).unwrap();
        assert!(a.frame_points.contains(&6));
        let at_join = a.states[11].as_ref().unwrap();
        // an uninitialized value merged with an initialized one is unusable
        assert_eq!(at_join.locals, vec![VType::Int]);
        assert_eq!(a.max_stack, 2);
        assert_eq!(a.max_locals, 2);
    }

    #[test]
    fn test_dead_code_is_reported() {
        let insns = vec![
            Insn::Op(RETURN),
            Insn::Push(1),
            Insn::Op(POP),
            Insn::Label(Label(0)),
        ];
        let a = run(&insns, vec![], &[]).unwrap();
        assert_eq!(a.dead, vec![(1, 4)]);
    }

    #[test]
    fn test_handler_entry_state() {
        let insns = vec![
            Insn::Label(Label(0)),
            Insn::Push(1),
            Insn::Local { op: ISTORE, slot: 0 },
            Insn::Label(Label(1)),
            Insn::Op(RETURN),
            Insn::Label(Label(2)),
            Insn::Local { op: ASTORE, slot: 1 },
            Insn::Op(RETURN),
        ];
        let handlers = [Handler { start: 0, end: 3, handler: 5, catch_type: Some("java/lang/Exception".into()) }];
        let a = run(&insns, vec![], &handlers).unwrap();
        let h = a.states[6].as_ref().unwrap();
        assert_eq!(h.stack, vec![VType::object("java/lang/Exception")]);
        assert!(h.locals.is_empty());
        assert!(a.frame_points.contains(&6));
    }

    #[test]
    fn test_stack_height_mismatch_fails() {
        let insns = vec![
            Insn::Local { op: ILOAD, slot: 0 },
            Insn::Jump { op: IFEQ, target: Label(1) },
            Insn::Push(1),
            Insn::Label(Label(1)),
            Insn::Op(RETURN),
        ];
        let err = run(&insns, vec![VType::Int], &[]).unwrap_err();
        assert!(matches!(err, BackendError::Verify { .. }));
    }
}
