//! Lowering of a finished class model into backend requests
//!
//! Method bodies are walked once, in declaration order. Lowering may add
//! members to the host (VarHandle fields, resource constants and their
//! decoder) and produce extra classes for lambdas and anonymous classes;
//! those are collected in a [`ClassContext`] while the bodies are lowered
//! and attached at the end.

mod expr;
mod handles;
mod method;
mod nested;
mod resource;
mod slots;

use std::collections::HashMap;

use log::{debug, warn};

use crate::backend::classfile::access_flags::ACC_STATIC;
use crate::backend::classfile::major_versions;
use crate::backend::opcodes::RETURN;
use crate::backend::{ClassRequest, FieldRequest, InnerClassEntry, Insn, LdcConst, MethodRequest};
use crate::config::Config;
use crate::error::Result;
use crate::ir::Constant;
use crate::model::annotation::AnnotationSet;
use crate::model::class::{ClassMaker, MethodEntry};
use crate::model::flags::{class_access, ContainerKind, MethodKind};
use crate::signature::{class_signature, collect_type_annotations, collect_type_param_annotations, needs_signature, TypeTarget};
use crate::types::{ClassInfo, TypeRegistry, TypeScope};

use handles::VarHandles;
use method::MethodLowerer;
use resource::ResourcePool;

/// Everything one `finish` produces
pub(crate) struct Lowered {
    /// Synthesized nested classes first, the host last
    pub classes: Vec<ClassRequest>,
    /// The maker's registry plus the synthesized classes
    pub registry: TypeRegistry,
}

/// Per-class state shared by every method lowerer
pub(crate) struct ClassContext<'m> {
    maker: &'m ClassMaker,
    pub(super) handles: VarHandles,
    pub(super) resources: ResourcePool,
    nested: Vec<ClassRequest>,
    registry: TypeRegistry,
    /// (method index, anonymous body) -> class name
    anon_names: HashMap<(usize, usize), String>,
    anon_count: usize,
    /// Index of the method whose body is being lowered
    code_id: usize,
}

impl<'m> ClassContext<'m> {
    fn new(maker: &'m ClassMaker) -> Self {
        Self {
            maker,
            handles: VarHandles::default(),
            resources: ResourcePool::default(),
            nested: Vec::new(),
            registry: (*maker.registry).clone(),
            anon_names: HashMap::new(),
            anon_count: 0,
            code_id: 0,
        }
    }

    pub(super) fn config(&self) -> &'m Config {
        &self.maker.config
    }

    pub(super) fn host(&self) -> &'m str {
        &self.maker.name
    }

    pub(super) fn host_is_interface(&self) -> bool {
        self.maker.container == ContainerKind::Interface
    }
}

pub(crate) fn lower_class(maker: &ClassMaker) -> Result<Lowered> {
    let config = &maker.config;
    debug!("lowering class {} ({} fields, {} methods)", maker.name, maker.fields.len(), maker.methods.len());
    let mut cx = ClassContext::new(maker);

    let mut methods = Vec::with_capacity(maker.methods.len() + 2);
    for (index, entry) in maker.methods.iter().enumerate() {
        if entry.kind == MethodKind::StaticInit {
            continue;
        }
        cx.code_id = index;
        methods.push(lower_method(&mut cx, entry)?);
    }
    if let Some(clinit) = lower_static_init(&mut cx)? {
        methods.push(clinit);
    }
    if !cx.resources.is_empty() {
        methods.push(cx.resources.decoder());
    }

    let host_is_interface = cx.host_is_interface();
    let mut fields: Vec<FieldRequest> = maker
        .fields
        .iter()
        .map(|f| {
            Ok(FieldRequest {
                access: f.access,
                name: f.name.clone(),
                descriptor: f.ty.descriptor(),
                signature: f.signature.clone(),
                constant_value: f.constant_value.as_ref().map(constant_value).transpose()?,
                annotations: f.annotations.clone(),
                type_annotations: f.type_annotations.clone(),
            })
        })
        .collect::<Result<_>>()?;
    fields.extend(cx.handles.fields(host_is_interface));
    fields.extend(cx.resources.fields(host_is_interface));

    let scope = TypeScope::of(&maker.type_params);
    let super_name = maker.super_type.erasure(&scope)?.class_constant_name();
    let interfaces = maker
        .interfaces
        .iter()
        .map(|i| Ok(i.erasure(&scope)?.class_constant_name()))
        .collect::<Result<Vec<_>>>()?;
    let signature = if needs_signature(&maker.type_params, std::iter::once(&maker.super_type).chain(&maker.interfaces)) {
        Some(class_signature(&maker.type_params, &maker.super_type, &maker.interfaces, &scope)?)
    } else {
        None
    };
    let mut type_annotations = Vec::new();
    collect_type_param_annotations(&maker.type_params, false, &mut type_annotations)?;
    collect_type_annotations(&maker.super_type, &TypeTarget::Supertype(u16::MAX), &mut type_annotations)?;
    for (i, iface) in maker.interfaces.iter().enumerate() {
        collect_type_annotations(iface, &TypeTarget::Supertype(i as u16), &mut type_annotations)?;
    }

    if !config.emit_frames && config.requires_frames() {
        warn!(
            "{}: stack map frames are disabled but class file version {} requires them; the JVM will reject branching methods",
            maker.name, config.target_version
        );
    }

    let host = ClassRequest {
        version: config.target_version,
        access: class_access(maker.container, maker.mods)?,
        name: maker.name.clone(),
        super_name: if host_is_interface { Some(crate::types::OBJECT.to_string()) } else { Some(super_name) },
        interfaces,
        signature,
        source_file: config.source_file.clone(),
        annotations: AnnotationSet::from_annotations(&maker.annotations),
        type_annotations,
        fields,
        methods,
        emit_frames: config.emit_frames,
        ..Default::default()
    };

    let ClassContext { mut nested, mut registry, .. } = cx;
    registry.define(host_info(maker, &host));
    let classes = link_nest(host, &mut nested, config.target_version);
    Ok(Lowered { classes, registry })
}

fn host_info(maker: &ClassMaker, host: &ClassRequest) -> ClassInfo {
    let ifaces: Vec<&str> = host.interfaces.iter().map(String::as_str).collect();
    match maker.container {
        ContainerKind::Interface => ClassInfo::interface(&host.name, &ifaces),
        ContainerKind::Class => {
            ClassInfo::class(&host.name, host.super_name.as_deref().unwrap_or(crate::types::OBJECT), &ifaces)
        }
    }
}

/// Tie the synthesized classes to the host and order the output
fn link_nest(mut host: ClassRequest, nested: &mut Vec<ClassRequest>, target: u16) -> Vec<ClassRequest> {
    if nested.is_empty() {
        return vec![host];
    }
    let entries: Vec<InnerClassEntry> = nested
        .iter()
        .map(|c| InnerClassEntry { inner: c.name.clone(), outer: None, simple_name: None, access: 0 })
        .collect();
    let nestmates = target >= major_versions::JAVA_11;
    if !nestmates {
        debug!("{}: target {target} predates nestmates, NestHost/NestMembers omitted", host.name);
    }
    for class in nested.iter_mut() {
        class.inner_classes = entries.clone();
        if nestmates {
            class.nest_host = Some(host.name.clone());
        }
    }
    host.inner_classes = entries;
    if nestmates {
        host.nest_members = nested.iter().map(|c| c.name.clone()).collect();
    }
    let mut classes = std::mem::take(nested);
    classes.push(host);
    classes
}

fn lower_method<'m>(cx: &mut ClassContext<'m>, entry: &'m MethodEntry) -> Result<MethodRequest> {
    let descriptor = entry.descriptor();
    debug!("lowering method {}.{}{}", cx.host(), entry.name, descriptor);
    let code = match &entry.code {
        Some(code) => {
            let host = cx.host();
            let maker = cx.maker;
            let mut lowerer = MethodLowerer::new(cx, Some(code), host, None, Some((entry.name.clone(), descriptor.clone())));
            if entry.kind == MethodKind::Constructor {
                lowerer.field_inits = maker.fields.iter().filter(|f| !f.is_static() && f.init.is_some()).collect();
            }
            Some(lowerer.lower_frame(0)?)
        }
        None => None,
    };
    Ok(MethodRequest {
        access: entry.access,
        name: entry.name.clone(),
        descriptor,
        signature: entry.signature.clone(),
        exceptions: entry.exceptions.clone(),
        annotations: entry.annotations.clone(),
        parameter_annotations: entry.parameter_annotations.clone(),
        type_annotations: entry.type_annotations.clone(),
        code,
    })
}

/// One `<clinit>` made of the static field initializers followed by every
/// static initializer in declaration order
fn lower_static_init(cx: &mut ClassContext<'_>) -> Result<Option<MethodRequest>> {
    let maker = cx.maker;
    let host = cx.host();
    let mut lowerer = MethodLowerer::new(cx, None, host, None, None);
    for field in maker.fields.iter().filter(|f| f.is_static() && f.constant_value.is_none()) {
        lowerer.static_field_init(field)?;
    }
    for (index, entry) in maker.methods.iter().enumerate() {
        if entry.kind != MethodKind::StaticInit {
            continue;
        }
        if let Some(code) = &entry.code {
            debug!("lowering static initializer #{index} of {host}");
            lowerer.cx.code_id = index;
            lowerer.static_chunk(code)?;
        }
    }

    // handles and resource constants must exist before user code runs
    let mut prelude = lowerer.cx.handles.init_insns(host);
    prelude.extend(lowerer.cx.resources.init_insns(host, lowerer.cx.host_is_interface())?);
    let body = std::mem::take(&mut lowerer.insns);
    if prelude.is_empty() && body.is_empty() {
        return Ok(None);
    }
    lowerer.insns = prelude;
    lowerer.insns.extend(body);
    if lowerer.alive {
        lowerer.insns.push(Insn::Op(RETURN));
    }
    Ok(Some(MethodRequest {
        access: ACC_STATIC,
        name: "<clinit>".to_string(),
        descriptor: "()V".to_string(),
        code: Some(lowerer.into_code()),
        ..Default::default()
    }))
}

/// `ConstantValue` attribute contents for a field constant
fn constant_value(c: &Constant) -> Result<LdcConst> {
    Ok(match c {
        Constant::Boolean(v) => LdcConst::Int(i32::from(*v)),
        Constant::Byte(v) => LdcConst::Int(i32::from(*v)),
        Constant::Char(v) => LdcConst::Int(i32::from(*v)),
        Constant::Short(v) => LdcConst::Int(i32::from(*v)),
        Constant::Int(v) => LdcConst::Int(*v),
        Constant::Long(v) => LdcConst::Long(*v),
        Constant::Float(v) => LdcConst::Float(*v),
        Constant::Double(v) => LdcConst::Double(*v),
        Constant::String(s) => LdcConst::String(s.clone()),
        other => {
            return Err(crate::error::Error::invalid_argument(format!(
                "{other:?} cannot be a ConstantValue attribute"
            )))
        }
    })
}
