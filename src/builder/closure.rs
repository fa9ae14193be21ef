//! Lambdas and anonymous classes
//!
//! Both become synthesized nested classes. Their methods are extra frames
//! in the same arena, so they can read the enclosing method's variables;
//! every such read becomes a captured constructor argument.

use std::collections::HashSet;

use log::debug;

use crate::error::{Error, Result};
use crate::ir::{AnonId, Block, Expr, ExprKind, InvokeKind, MethodRef, VarId};
use crate::types::{conversion, Type};

use super::block::{AnonMethod, AnonNode, Open};
use super::Code;

/// Supertypes of an anonymous class
#[derive(Debug, Clone)]
pub struct AnonSpec {
    /// Superclass constructor invoked with the creation arguments
    pub super_ctor: MethodRef,
    pub interfaces: Vec<String>,
}

impl AnonSpec {
    /// Subclass of the constructor's owner
    pub fn extending(super_ctor: MethodRef) -> Self {
        Self { super_ctor, interfaces: Vec::new() }
    }

    /// `Object` subclass implementing `iface`
    pub fn implementing(iface: &str) -> Self {
        Self {
            super_ctor: MethodRef::constructor(crate::types::OBJECT, Vec::new()),
            interfaces: vec![crate::types::internal_name(iface)],
        }
    }

    pub fn interface(mut self, iface: &str) -> Self {
        self.interfaces.push(crate::types::internal_name(iface));
        self
    }
}

impl Code {
    /// Instance of `sam`'s interface whose single abstract method runs `body`
    pub fn lambda(
        &mut self,
        blk: Block,
        sam: &MethodRef,
        body: impl FnOnce(&mut Code, Block) -> Result<()>,
    ) -> Result<Expr> {
        if sam.kind != InvokeKind::Interface || (self.registry.is_known(&sam.owner) && !self.registry.is_interface(&sam.owner)) {
            return Err(Error::invalid_argument(format!("{} is not an interface method", sam.name)));
        }
        let sam = sam.clone();
        let expr = self.build_anon(blk, AnonSpec::implementing(&sam.owner), Vec::new(), true, |c, anon| {
            c.anon_method(anon, &sam.name, sam.params.clone(), sam.ret.clone(), body)
        })?;
        Ok(expr)
    }

    /// Anonymous class instance; `build` adds its methods with
    /// [`Code::anon_method`]
    pub fn anon_class(
        &mut self,
        blk: Block,
        spec: AnonSpec,
        super_args: Vec<Expr>,
        build: impl FnOnce(&mut Code, AnonId) -> Result<()>,
    ) -> Result<Expr> {
        if self.registry.is_interface(&spec.super_ctor.owner) {
            return Err(Error::invalid_argument(format!(
                "{} is an interface; use AnonSpec::implementing",
                spec.super_ctor.owner
            )));
        }
        if let Some(iface) = spec.interfaces.iter().find(|i| self.registry.is_known(i) && !self.registry.is_interface(i)) {
            return Err(Error::invalid_argument(format!("{iface} is not an interface")));
        }
        self.build_anon(blk, spec, super_args, false, build)
    }

    fn build_anon(
        &mut self,
        blk: Block,
        spec: AnonSpec,
        super_args: Vec<Expr>,
        is_lambda: bool,
        build: impl FnOnce(&mut Code, AnonId) -> Result<()>,
    ) -> Result<Expr> {
        self.guard(blk)?;
        if !spec.super_ctor.is_constructor() {
            return Err(Error::invalid_argument(format!("{} is not a constructor", spec.super_ctor.name)));
        }
        if super_args.len() != spec.super_ctor.params.len() {
            return Err(Error::invalid_argument(format!(
                "superclass constructor expects {} arguments, got {}",
                spec.super_ctor.params.len(),
                super_args.len()
            )));
        }
        let super_args = super_args
            .into_iter()
            .zip(&spec.super_ctor.params)
            .map(|(a, p)| conversion::convert(&self.registry, a, p))
            .collect::<Result<Vec<_>>>()?;
        for a in &super_args {
            self.check_expr(blk, a)?;
        }

        let base = self.assigned_state();
        self.anons.push(AnonNode {
            super_ctor: spec.super_ctor,
            interfaces: spec.interfaces,
            methods: Vec::new(),
            captures: Vec::new(),
            parent_frame: self.blocks[blk.0].frame,
            parent_block: blk,
            is_lambda,
        });
        let anon = AnonId(self.anons.len() - 1);
        self.suspend(blk);
        self.open.push(Open::Anon(anon));

        build(self, anon)?;

        if self.current.is_some() || self.open.last() != Some(&Open::Anon(anon)) {
            return Err(Error::invalid_state("anonymous class closed while a nested construct is open"));
        }
        self.open.pop();
        if self.anons[anon.0].methods.is_empty() {
            return Err(Error::invalid_state("anonymous class has no methods"));
        }
        let captures = self.compute_captures(anon);
        debug!("anonymous class {} captures {} variables", anon.0, captures.len());
        self.anons[anon.0].captures = captures;
        self.restore_assigned(&base);
        self.resume(blk, false);

        let ty = self.anons[anon.0].view_type();
        Ok(Expr::new(ty, ExprKind::AnonInstance { anon, super_args }))
    }

    /// Add a method to the innermost open anonymous class
    ///
    /// Parameters are named `arg0`, `arg1`, ..; `this` is the new instance.
    pub fn anon_method(
        &mut self,
        anon: AnonId,
        name: &str,
        params: Vec<Type>,
        ret: Type,
        body: impl FnOnce(&mut Code, Block) -> Result<()>,
    ) -> Result<()> {
        self.guard_construct(Open::Anon(anon))?;
        let node = &self.anons[anon.0];
        if name.starts_with('<') {
            return Err(Error::invalid_argument(format!("{name} cannot be declared in an anonymous class")));
        }
        if node.methods.iter().any(|m| m.name == name && m.params == params) {
            return Err(Error::invalid_argument(format!("duplicate method {name} in anonymous class")));
        }
        let this_ty = node.view_type();
        let parent = node.parent_block;
        let named = params.iter().enumerate().map(|(i, t)| (format!("arg{i}"), t.clone(), None)).collect();
        let root = self.new_frame(Some(anon), name.to_string(), Some(this_ty), named, ret.clone(), false, Some(parent));
        let frame = self.blocks[root.0].frame;
        self.current = Some(root);

        body(self, root)?;

        if self.current != Some(root) {
            return Err(Error::invalid_state("anonymous class method closed while a nested construct is open"));
        }
        if !ret.is_void() && !self.is_terminal(root) {
            return Err(Error::invalid_state(format!("missing return statement in {name}")));
        }
        self.leave(root)?;
        self.anons[anon.0].methods.push(AnonMethod { name: name.to_string(), params, ret, frame });
        Ok(())
    }

    /// Variables of enclosing frames read by `anon`'s methods, including
    /// those nested anonymous classes pass through
    fn compute_captures(&self, anon: AnonId) -> Vec<VarId> {
        let frames: HashSet<usize> = self.anons[anon.0].methods.iter().map(|m| m.frame).collect();
        let mut captures = Vec::new();
        for frame in frames.iter().copied().collect::<std::collections::BTreeSet<_>>() {
            self.for_each_frame_expr(frame, &mut |e| match e.kind() {
                ExprKind::Local(v) => {
                    if !frames.contains(&self.vars[v.0].frame) && !captures.contains(v) {
                        captures.push(*v);
                    }
                }
                ExprKind::AnonInstance { anon: inner, .. } => {
                    for v in &self.anons[inner.0].captures {
                        if !frames.contains(&self.vars[v.0].frame) && !captures.contains(v) {
                            captures.push(*v);
                        }
                    }
                }
                _ => {}
            });
        }
        captures
    }
}
