//! Declaration and type-use annotations

use crate::error::{Error, Result};
use crate::types::{internal_name, Type};

/// Where an annotation is retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Retention {
    /// Written to the `RuntimeVisible*` attributes
    Runtime,
    /// Written to the `RuntimeInvisible*` attributes
    #[default]
    Class,
    /// Dropped when the class is written
    Source,
}

/// Program element an annotation is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Type,
    Field,
    Method,
    Parameter,
    Constructor,
    LocalVariable,
    TypeParameter,
    TypeUse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum { type_name: String, constant: String },
    Class(Type),
    Annotation(Annotation),
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    pub fn enum_constant(type_name: &str, constant: &str) -> Self {
        AnnotationValue::Enum { type_name: internal_name(type_name), constant: constant.to_string() }
    }
}

impl From<bool> for AnnotationValue {
    fn from(v: bool) -> Self {
        AnnotationValue::Boolean(v)
    }
}

impl From<i32> for AnnotationValue {
    fn from(v: i32) -> Self {
        AnnotationValue::Int(v)
    }
}

impl From<i64> for AnnotationValue {
    fn from(v: i64) -> Self {
        AnnotationValue::Long(v)
    }
}

impl From<f64> for AnnotationValue {
    fn from(v: f64) -> Self {
        AnnotationValue::Double(v)
    }
}

impl From<&str> for AnnotationValue {
    fn from(v: &str) -> Self {
        AnnotationValue::String(v.to_string())
    }
}

impl From<Annotation> for AnnotationValue {
    fn from(v: Annotation) -> Self {
        AnnotationValue::Annotation(v)
    }
}

impl From<Vec<AnnotationValue>> for AnnotationValue {
    fn from(v: Vec<AnnotationValue>) -> Self {
        AnnotationValue::Array(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Internal name of the annotation interface
    pub type_name: String,
    pub retention: Retention,
    /// Declared `@Target`; `None` means every declaration context
    pub targets: Option<Vec<ElementKind>>,
    pub values: Vec<(String, AnnotationValue)>,
}

impl Annotation {
    pub fn new(type_name: &str) -> Self {
        Self { type_name: internal_name(type_name), retention: Retention::default(), targets: None, values: Vec::new() }
    }

    pub fn retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn targets(mut self, kinds: &[ElementKind]) -> Self {
        self.targets = Some(kinds.to_vec());
        self
    }

    pub fn value(mut self, name: &str, value: impl Into<AnnotationValue>) -> Self {
        self.values.push((name.to_string(), value.into()));
        self
    }

    pub fn descriptor(&self) -> String {
        format!("L{};", self.type_name)
    }

    pub fn is_applicable(&self, kind: ElementKind) -> bool {
        match &self.targets {
            None => !matches!(kind, ElementKind::TypeParameter | ElementKind::TypeUse),
            Some(targets) => {
                targets.contains(&kind)
                    || (targets.contains(&ElementKind::TypeUse)
                        && matches!(kind, ElementKind::Type | ElementKind::TypeParameter))
            }
        }
    }

    /// Reject an annotation applied to an element kind it does not target
    pub fn check_target(&self, kind: ElementKind) -> Result<()> {
        if self.is_applicable(kind) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "annotation @{} is not applicable to {kind:?}",
                self.type_name.replace('/', ".")
            )))
        }
    }
}

/// Annotations split by retention, as written to the class file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSet {
    pub visible: Vec<Annotation>,
    pub invisible: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn from_annotations<'a>(annotations: impl IntoIterator<Item = &'a Annotation>) -> Self {
        let mut set = Self::default();
        for a in annotations {
            match a.retention {
                Retention::Runtime => set.visible.push(a.clone()),
                Retention::Class => set.invisible.push(a.clone()),
                Retention::Source => {}
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.invisible.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets() {
        let a = Annotation::new("com.example.Marker");
        assert_eq!(a.type_name, "com/example/Marker");
        assert!(a.check_target(ElementKind::Method).is_ok());
        assert!(a.check_target(ElementKind::TypeUse).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_explicit_targets() {
        let a = Annotation::new("com/example/NonNull").targets(&[ElementKind::TypeUse]);
        assert!(a.check_target(ElementKind::TypeUse).is_ok());
        assert!(a.check_target(ElementKind::TypeParameter).is_ok());
        assert!(a.check_target(ElementKind::Field).is_err());

        let f = Annotation::new("com/example/Column").targets(&[ElementKind::Field]);
        assert!(f.check_target(ElementKind::Method).is_err());
    }

    #[test]
    fn test_retention_split() {
        let anns = vec![
            Annotation::new("a/Visible").retention(Retention::Runtime),
            Annotation::new("a/Invisible"),
            Annotation::new("a/Dropped").retention(Retention::Source),
        ];
        let set = AnnotationSet::from_annotations(&anns);
        assert_eq!(set.visible.len(), 1);
        assert_eq!(set.invisible.len(), 1);
        assert_eq!(set.invisible[0].type_name, "a/Invisible");
    }
}
