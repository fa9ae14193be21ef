//! Class file backend
//!
//! The lowering engine describes each class as a [`ClassRequest`]: symbolic
//! members, attribute data and per-method instruction streams. A
//! [`ClassBackend`] turns the request into class file bytes, owning the
//! constant pool, instruction encoding, and stack-map frames.

pub mod analyzer;
pub mod annotations;
pub mod assembler;
pub mod classfile;
pub mod constpool;
pub mod error;
pub mod frame;
pub mod insn;
pub mod opcodes;
pub mod writer;

pub use error::{BackendError, BackendResult};
pub use insn::{Insn, Label, LdcConst};
pub use writer::ClassFileBackend;

use crate::model::annotation::AnnotationSet;
use crate::signature::TypeAnnotation;
use crate::types::TypeRegistry;

/// Turns finished class descriptions into class file bytes
pub trait ClassBackend {
    fn assemble(&mut self, class: &ClassRequest, types: &TypeRegistry) -> BackendResult<Vec<u8>>;
}

#[derive(Debug, Clone, Default)]
pub struct ClassRequest {
    pub version: u16,
    pub access: u16,
    /// Internal name
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub annotations: AnnotationSet,
    pub type_annotations: Vec<TypeAnnotation>,
    pub fields: Vec<FieldRequest>,
    pub methods: Vec<MethodRequest>,
    pub inner_classes: Vec<InnerClassEntry>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub nest_host: Option<String>,
    pub nest_members: Vec<String>,
    pub emit_frames: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FieldRequest {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub constant_value: Option<LdcConst>,
    pub annotations: AnnotationSet,
    pub type_annotations: Vec<TypeAnnotation>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodRequest {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    /// Internal names for the `Exceptions` attribute
    pub exceptions: Vec<String>,
    pub annotations: AnnotationSet,
    /// One entry per declared parameter
    pub parameter_annotations: Vec<AnnotationSet>,
    pub type_annotations: Vec<TypeAnnotation>,
    pub code: Option<CodeRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct CodeRequest {
    pub insns: Vec<Insn>,
    pub handlers: Vec<HandlerRequest>,
    pub locals: Vec<LocalVarRequest>,
    /// Local-variable type annotations, resolved to code ranges
    pub type_annotations: Vec<TypeAnnotation>,
}

/// Exception table entry; `catch_type` of `None` catches everything
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerRequest {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<String>,
}

/// `LocalVariableTable` entry, plus a `LocalVariableTypeTable` entry when
/// `signature` is set
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVarRequest {
    pub start: Label,
    pub end: Label,
    pub slot: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClassEntry {
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnclosingMethod {
    pub class: String,
    /// Name and descriptor of the enclosing method, if any
    pub method: Option<(String, String)>,
}
