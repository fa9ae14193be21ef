//! Class and interface builder

use std::sync::Arc;

use log::debug;

use crate::backend::classfile::access_flags::{ACC_FINAL, ACC_STATIC};
use crate::backend::{ClassBackend, ClassFileBackend};
use crate::builder::{Code, FrameSpec};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{Block, Constant, Expr, ExprKind, FieldRef, MethodRef};
use crate::output::ClassOutput;
use crate::signature::{self, collect_type_annotations, collect_type_param_annotations, TypeAnnotation, TypeTarget};
use crate::types::{conversion, internal_name, ClassInfo, GenericType, Type, TypeParam, TypeRegistry, TypeScope, OBJECT};

use super::annotation::{Annotation, AnnotationSet, ElementKind};
use super::flags::{class_access, field_access, method_access, ContainerKind, MethodKind, Modifiers};
use super::member::{FieldDef, MethodDef};

/// A field as it will be written
#[derive(Debug, Clone)]
pub(crate) struct FieldEntry {
    pub name: String,
    pub access: u16,
    pub ty: Type,
    pub signature: Option<String>,
    /// `ConstantValue` attribute
    pub constant_value: Option<Constant>,
    /// Initial value assigned in `<clinit>` or the constructors
    pub init: Option<Expr>,
    pub annotations: AnnotationSet,
    pub type_annotations: Vec<TypeAnnotation>,
}

impl FieldEntry {
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }
}

/// A method, constructor or static initializer as it will be written
#[derive(Debug)]
pub(crate) struct MethodEntry {
    pub name: String,
    pub access: u16,
    pub kind: MethodKind,
    pub params: Vec<Type>,
    pub ret: Type,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub annotations: AnnotationSet,
    pub parameter_annotations: Vec<AnnotationSet>,
    pub type_annotations: Vec<TypeAnnotation>,
    pub code: Option<Code>,
}

impl MethodEntry {
    pub fn descriptor(&self) -> String {
        crate::types::method_descriptor(&self.params, &self.ret)
    }
}

/// Builds one class or interface, plus the nested classes its lambdas and
/// anonymous classes need
///
/// Members are checked as they are added; bodies are built eagerly by the
/// closure passed with each method. [`ClassMaker::finish`] lowers
/// everything and hands the class files to a [`ClassOutput`].
#[derive(Debug)]
pub struct ClassMaker {
    pub(crate) config: Config,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) name: String,
    pub(crate) container: ContainerKind,
    pub(crate) mods: Modifiers,
    pub(crate) super_type: GenericType,
    pub(crate) interfaces: Vec<GenericType>,
    pub(crate) type_params: Vec<TypeParam>,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) fields: Vec<FieldEntry>,
    pub(crate) methods: Vec<MethodEntry>,
    finished: bool,
}

impl ClassMaker {
    /// Public class extending `java.lang.Object`
    pub fn new(name: &str) -> Self {
        Self::with_config(name, ContainerKind::Class, Config::default())
    }

    /// Public interface
    pub fn new_interface(name: &str) -> Self {
        Self::with_config(name, ContainerKind::Interface, Config::default())
    }

    pub fn with_config(name: &str, container: ContainerKind, config: Config) -> Self {
        let name = internal_name(name);
        let mut maker = ClassMaker {
            config,
            registry: Arc::new(TypeRegistry::new()),
            name,
            container,
            mods: Modifiers::PUBLIC,
            super_type: GenericType::class(OBJECT),
            interfaces: Vec::new(),
            type_params: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            finished: false,
        };
        maker.register_self();
        maker
    }

    fn register_self(&mut self) {
        let scope = TypeScope::of(&self.type_params);
        let erase = |t: &GenericType| t.erasure(&scope).ok().and_then(|t| t.class_name().map(str::to_string));
        let info = ClassInfo {
            name: self.name.clone(),
            super_name: erase(&self.super_type).or_else(|| Some(OBJECT.to_string())),
            interfaces: self.interfaces.iter().filter_map(erase).collect(),
            is_interface: self.container == ContainerKind::Interface,
        };
        Arc::make_mut(&mut self.registry).define(info);
    }

    fn check_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state(format!("class {} is already finished", self.name)));
        }
        Ok(())
    }

    /// Supertypes and type parameters are fixed once bodies exist
    fn check_no_members(&self, what: &str) -> Result<()> {
        self.check_open()?;
        if !self.methods.is_empty() {
            return Err(Error::invalid_state(format!("{what} must be set before methods are added")));
        }
        Ok(())
    }

    /// Internal name of the class
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn this_type(&self) -> Type {
        Type::Class(self.name.clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Class hierarchy used by this class; define referenced classes here
    /// before building bodies that depend on them
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        Arc::make_mut(&mut self.registry)
    }

    pub fn set_modifiers(&mut self, mods: Modifiers) -> Result<()> {
        self.check_open()?;
        class_access(self.container, mods)?;
        self.mods = mods;
        Ok(())
    }

    /// Set the superclass
    pub fn extend(&mut self, super_type: impl Into<GenericType>) -> Result<()> {
        self.check_no_members("the superclass")?;
        if self.container == ContainerKind::Interface {
            return Err(Error::invalid_argument("an interface cannot extend a class"));
        }
        let super_type = super_type.into();
        let erased = super_type.erasure(&TypeScope::of(&self.type_params))?;
        match erased.class_name() {
            Some(n) if self.registry.is_interface(n) => {
                return Err(Error::invalid_argument(format!("{n} is an interface")))
            }
            Some(_) => {}
            None => return Err(Error::invalid_argument(format!("cannot extend {erased}"))),
        }
        self.super_type = super_type;
        self.register_self();
        Ok(())
    }

    pub fn implement(&mut self, iface: impl Into<GenericType>) -> Result<()> {
        self.check_no_members("implemented interfaces")?;
        let iface = iface.into();
        let erased = iface.erasure(&TypeScope::of(&self.type_params))?;
        match erased.class_name() {
            Some(n) if self.registry.is_known(n) && !self.registry.is_interface(n) => {
                return Err(Error::invalid_argument(format!("{n} is not an interface")))
            }
            Some(_) => {}
            None => return Err(Error::invalid_argument(format!("cannot implement {erased}"))),
        }
        self.interfaces.push(iface);
        self.register_self();
        Ok(())
    }

    pub fn type_param(&mut self, param: TypeParam) -> Result<()> {
        self.check_no_members("type parameters")?;
        if self.type_params.iter().any(|p| p.name == param.name) {
            return Err(Error::invalid_argument(format!("duplicate type parameter {}", param.name)));
        }
        self.type_params.push(param);
        Ok(())
    }

    pub fn annotate(&mut self, annotation: Annotation) -> Result<()> {
        self.check_open()?;
        annotation.check_target(ElementKind::Type)?;
        self.annotations.push(annotation);
        Ok(())
    }

    fn super_name(&self) -> String {
        self.registry
            .lookup(&self.name)
            .and_then(|info| info.super_name.clone())
            .unwrap_or_else(|| OBJECT.to_string())
    }

    // ---- fields ----------------------------------------------------------

    pub fn add_field(&mut self, def: FieldDef) -> Result<FieldRef> {
        self.check_open()?;
        if def.name.is_empty() {
            return Err(Error::invalid_argument("field name is empty"));
        }
        if self.fields.iter().any(|f| f.name == def.name) {
            return Err(Error::invalid_argument(format!("duplicate field {}", def.name)));
        }
        let access = field_access(self.container, def.mods)?;
        let is_static = access & ACC_STATIC != 0;
        let scope = TypeScope::of(&self.type_params);
        let ty = def.ty.erasure(&scope)?;
        if ty.is_void() {
            return Err(Error::invalid_argument(format!("field {} cannot be void", def.name)));
        }
        let signature = if def.ty.is_generic() { Some(signature::type_signature(&def.ty, &scope)?) } else { None };
        for a in &def.annotations {
            a.check_target(ElementKind::Field)?;
        }
        let mut type_annotations = Vec::new();
        collect_type_annotations(&def.ty, &TypeTarget::Field, &mut type_annotations)?;

        let (constant_value, init) = match (def.constant, def.init) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_argument(format!("field {} has both a constant and an initializer", def.name)))
            }
            (Some(c), None) => {
                let value = conversion::convert(&self.registry, Expr::constant(c)?, &ty)?;
                let constant_attr = is_static
                    && access & ACC_FINAL != 0
                    && (ty.is_primitive() || ty.is_string())
                    && value.as_constant().is_some();
                if constant_attr {
                    (value.as_constant().cloned(), None)
                } else {
                    (None, Some(value))
                }
            }
            (None, Some(e)) => {
                let value = conversion::convert(&self.registry, e, &ty)?;
                let mut local = false;
                value.walk(&mut |x| local |= matches!(x.kind(), ExprKind::Local(_) | ExprKind::AnonInstance { .. }));
                if local {
                    return Err(Error::invalid_argument(format!(
                        "initializer of field {} cannot refer to local variables or anonymous classes",
                        def.name
                    )));
                }
                (None, Some(value))
            }
            (None, None) => (None, None),
        };
        if init.is_some() && !is_static && self.container == ContainerKind::Interface {
            return Err(Error::invalid_state("interface fields are static"));
        }

        let field = if is_static {
            FieldRef::of_static(&self.name, &def.name, ty.clone())
        } else {
            FieldRef::instance(&self.name, &def.name, ty.clone())
        };
        self.fields.push(FieldEntry {
            name: def.name,
            access,
            ty,
            signature,
            constant_value,
            init,
            annotations: AnnotationSet::from_annotations(&def.annotations),
            type_annotations,
        });
        Ok(field)
    }

    // ---- methods ---------------------------------------------------------

    /// Add a method with a body
    pub fn method(&mut self, def: MethodDef, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<MethodRef> {
        if def.is_constructor() {
            return Err(Error::invalid_argument("use ClassMaker::constructor for constructors"));
        }
        self.add_method(MethodKind::Method, def, Some(body))
    }

    /// Add a method without a body; in a class it is made abstract unless
    /// it is native
    pub fn abstract_method(&mut self, mut def: MethodDef) -> Result<MethodRef> {
        if def.is_constructor() {
            return Err(Error::invalid_argument("constructors need a body"));
        }
        if self.container == ContainerKind::Class && !def.mods.contains(Modifiers::NATIVE) {
            if !self.mods.contains(Modifiers::ABSTRACT) {
                return Err(Error::invalid_state(format!(
                    "abstract method {} in non-abstract class {}",
                    def.name, self.name
                )));
            }
            def.mods |= Modifiers::ABSTRACT;
        }
        self.add_method(MethodKind::Method, def, None::<fn(&mut Code, Block) -> Result<()>>)
    }

    pub fn constructor(&mut self, def: MethodDef, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<MethodRef> {
        if !def.is_constructor() {
            return Err(Error::invalid_argument("constructor definitions come from MethodDef::constructor"));
        }
        self.add_method(MethodKind::Constructor, def, Some(body))
    }

    /// No-argument constructor that only calls `super()`
    pub fn default_constructor(&mut self, mods: Modifiers) -> Result<MethodRef> {
        self.constructor(MethodDef::constructor().modifiers(mods), |_, _| Ok(()))
    }

    /// Static initializer; several run in the order they were added
    pub fn static_init(&mut self, body: impl FnOnce(&mut Code, Block) -> Result<()>) -> Result<()> {
        let def = MethodDef::new("<clinit>", Type::void()).modifiers(Modifiers::STATIC);
        self.add_method(MethodKind::StaticInit, def, Some(body))?;
        Ok(())
    }

    fn add_method<F>(&mut self, kind: MethodKind, def: MethodDef, body: Option<F>) -> Result<MethodRef>
    where
        F: FnOnce(&mut Code, Block) -> Result<()>,
    {
        self.check_open()?;
        if def.name.is_empty() || (kind == MethodKind::Method && def.name.starts_with('<')) {
            return Err(Error::invalid_argument(format!("illegal method name {:?}", def.name)));
        }
        let access = method_access(self.container, kind, def.mods, body.is_some())?;
        let is_static = access & ACC_STATIC != 0;

        let mut code_type_params = def.type_params.clone();
        code_type_params.extend(self.type_params.iter().cloned());
        let class_scope = TypeScope::of(&self.type_params);
        let scope = if is_static { TypeScope::of(&def.type_params) } else { class_scope.nested(&def.type_params) };

        let params = def.params.iter().map(|p| p.ty.erasure(&scope)).collect::<Result<Vec<_>>>()?;
        if params.iter().any(|t| t.is_void()) {
            return Err(Error::invalid_argument(format!("parameter of {} cannot be void", def.name)));
        }
        let ret = def.ret.erasure(&scope)?;
        if def.mods.contains(Modifiers::VARARGS) && !matches!(params.last(), Some(Type::Array(_))) {
            return Err(Error::invalid_argument(format!("varargs method {} must end with an array parameter", def.name)));
        }
        let descriptor = crate::types::method_descriptor(&params, &ret);
        if self.methods.iter().any(|m| m.kind != MethodKind::StaticInit && m.name == def.name && m.descriptor() == descriptor)
        {
            return Err(Error::invalid_argument(format!("duplicate method {}{descriptor}", def.name)));
        }

        let mut exceptions = Vec::with_capacity(def.throws.len());
        for t in &def.throws {
            let erased = t.erasure(&scope)?;
            let throwable = Type::class(crate::types::THROWABLE);
            if !self.registry.is_assignable(&erased, &throwable) {
                return Err(Error::invalid_argument(format!("{erased} is not a Throwable")));
            }
            exceptions.push(erased.class_constant_name());
        }

        let param_generics: Vec<GenericType> = def.params.iter().map(|p| p.ty.clone()).collect();
        let signature = if signature::needs_signature(&def.type_params, param_generics.iter().chain([&def.ret]).chain(&def.throws)) {
            Some(signature::method_signature(&def.type_params, &param_generics, &def.ret, &def.throws, &scope)?)
        } else {
            None
        };

        let element = if kind == MethodKind::Constructor { ElementKind::Constructor } else { ElementKind::Method };
        for a in &def.annotations {
            a.check_target(element)?;
        }
        let mut parameter_annotations = Vec::with_capacity(def.params.len());
        for p in &def.params {
            for a in &p.annotations {
                a.check_target(ElementKind::Parameter)?;
            }
            parameter_annotations.push(AnnotationSet::from_annotations(&p.annotations));
        }
        if parameter_annotations.iter().all(AnnotationSet::is_empty) {
            parameter_annotations.clear();
        }

        let mut type_annotations = Vec::new();
        collect_type_param_annotations(&def.type_params, true, &mut type_annotations)?;
        if kind == MethodKind::Method {
            collect_type_annotations(&def.ret, &TypeTarget::Return, &mut type_annotations)?;
        }
        for (i, p) in def.params.iter().enumerate() {
            let index = u8::try_from(i).map_err(|_| Error::invalid_argument("too many parameters"))?;
            collect_type_annotations(&p.ty, &TypeTarget::FormalParameter(index), &mut type_annotations)?;
        }
        for (i, t) in def.throws.iter().enumerate() {
            collect_type_annotations(t, &TypeTarget::Throws(i as u16), &mut type_annotations)?;
        }

        let code = match body {
            Some(body) => {
                debug!("building {}.{}{descriptor}", self.name, def.name);
                let spec = FrameSpec {
                    name: def.name.clone(),
                    is_static,
                    is_ctor: kind == MethodKind::Constructor,
                    params: def
                        .params
                        .iter()
                        .zip(&params)
                        .map(|(p, t)| (p.name.clone(), t.clone(), p.ty.is_generic().then(|| p.ty.clone())))
                        .collect(),
                    ret: ret.clone(),
                };
                let super_name = self.super_name();
                let mut code = Code::new(
                    self.registry.clone(),
                    &self.name,
                    &super_name,
                    self.container == ContainerKind::Interface,
                    code_type_params,
                    spec,
                );
                let root = code.root();
                body(&mut code, root)?;
                code.finish()?;
                Some(code)
            }
            None => None,
        };

        let method_ref = method_ref(self, &def.name, params.clone(), ret.clone(), access, kind);
        self.methods.push(MethodEntry {
            name: def.name,
            access,
            kind,
            params,
            ret,
            signature,
            exceptions,
            annotations: AnnotationSet::from_annotations(&def.annotations),
            parameter_annotations,
            type_annotations,
            code,
        });
        Ok(method_ref)
    }

    // ---- completion ------------------------------------------------------

    /// Lower and assemble with the default class file backend
    pub fn finish_to(&mut self, output: &mut dyn ClassOutput) -> Result<()> {
        let mut backend = ClassFileBackend::new();
        self.finish(&mut backend, output)
    }

    /// Lower every member, assemble the host class and its synthesized
    /// nested classes, then hand them to `output`
    ///
    /// Nothing reaches `output` unless every class assembles. Nested
    /// classes are delivered before the host.
    pub fn finish(&mut self, backend: &mut dyn ClassBackend, output: &mut dyn ClassOutput) -> Result<()> {
        self.check_open()?;
        self.finished = true;
        let lowered = crate::lower::lower_class(self)?;
        let mut assembled = Vec::with_capacity(lowered.classes.len());
        for request in &lowered.classes {
            let bytes = backend.assemble(request, &lowered.registry)?;
            debug!("assembled {} ({} bytes)", request.name, bytes.len());
            assembled.push((crate::types::dotted_name(&request.name), bytes));
        }
        for (name, bytes) in assembled {
            output.accept(&name, bytes)?;
        }
        Ok(())
    }
}

fn method_ref(maker: &ClassMaker, name: &str, params: Vec<Type>, ret: Type, access: u16, kind: MethodKind) -> MethodRef {
    use crate::backend::classfile::access_flags::{ACC_PRIVATE, ACC_VARARGS};
    let owner = maker.name.as_str();
    let interface = maker.container == ContainerKind::Interface;
    let m = match kind {
        MethodKind::Constructor => MethodRef::constructor(owner, params),
        MethodKind::StaticInit => MethodRef::of_static(owner, name, params, ret),
        MethodKind::Method if access & ACC_STATIC != 0 => {
            if interface {
                MethodRef::of_interface_static(owner, name, params, ret)
            } else {
                MethodRef::of_static(owner, name, params, ret)
            }
        }
        MethodKind::Method if interface => MethodRef::of_interface(owner, name, params, ret),
        MethodKind::Method if access & ACC_PRIVATE != 0 => MethodRef::of_special(owner, name, params, ret),
        MethodKind::Method => MethodRef::of_virtual(owner, name, params, ret),
    };
    if access & ACC_VARARGS != 0 {
        m.with_varargs()
    } else {
        m
    }
}
