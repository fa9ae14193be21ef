//! classmaker
//!
//! Programmatic generation of JVM class files. A class is described
//! member by member through [`ClassMaker`]; method bodies are built as
//! typed expression and statement trees through [`Code`], then lowered to
//! bytecode with computed stack map frames.
//!
//! ## Architecture
//!
//! - **types**: primitive/class/array types, generic types, the class hierarchy registry
//! - **ir**: typed expressions, statements and constants
//! - **builder**: the structured method-body builder
//! - **model**: class, field and method definitions; modifier validation; annotations
//! - **signature**: generic `Signature` strings and type annotation targets
//! - **lower**: expression/statement trees to abstract instructions
//! - **backend**: constant pool, instruction assembly, frame analysis, class file writer
//! - **output**: sinks receiving the finished class files
//!
//! ## Generation Flow
//!
//! ```text
//! ClassMaker → Code (Expr/Stmt trees) → lower → ClassRequest → backend → ClassOutput
//!                                          ↓
//!                     VarHandles, resource constants, lambda classes
//! ```
//!
//! ```no_run
//! use classmaker::{ClassMaker, Expr, MemoryOutput, MethodDef, Modifiers, Type};
//!
//! let mut maker = ClassMaker::new("demo/Adder");
//! maker.default_constructor(Modifiers::PUBLIC)?;
//! maker.method(
//!     MethodDef::new("add", Type::double())
//!         .modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
//!         .param("a", Type::int())
//!         .param("b", Type::double()),
//!     |code, blk| {
//!         let a = code.param(blk, 0)?.get();
//!         let b = code.param(blk, 1)?.get();
//!         let sum = Expr::add(a, b)?;
//!         code.return_value(blk, sum)
//!     },
//! )?;
//! let mut out = MemoryOutput::new();
//! maker.finish_to(&mut out)?;
//! # Ok::<(), classmaker::Error>(())
//! ```

pub mod backend;
pub mod builder;
pub mod config;
pub mod error;
pub mod ir;
mod lower;
pub mod model;
pub mod output;
pub mod signature;
pub mod types;

pub use builder::{AnonSpec, Code, SwitchKey, TrySpec};
pub use config::Config;
pub use error::{Error, Result};
pub use ir::{
    AtomicAccess, AtomicOp, BinaryOp, Block, CompareOp, Constant, Expr, FieldRef, Loop, MemoryOrder, MethodRef, Switch,
    Var,
};
pub use model::{Annotation, AnnotationValue, ClassMaker, ContainerKind, FieldDef, MethodDef, Modifiers, Param, Retention};
pub use output::{ClassOutput, DirectoryOutput, MemoryOutput};
pub use types::{GenericType, PrimitiveKind, Type, TypeParam, TypeRegistry};
