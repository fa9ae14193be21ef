//! Member and class model
//!
//! [`ClassMaker`] collects fields, methods and annotations for one class
//! or interface. Access flags are validated against the container kind as
//! members are added.

pub mod annotation;
pub mod class;
pub mod flags;
pub mod member;

pub use annotation::{Annotation, AnnotationSet, AnnotationValue, ElementKind, Retention};
pub use class::ClassMaker;
pub use flags::{ContainerKind, MethodKind, Modifiers};
pub use member::{FieldDef, MethodDef, Param};
