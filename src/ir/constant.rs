//! Literal values, including immutable collection literals

use crate::error::{Error, Result};
use crate::types::{PrimitiveKind, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Class literal (`String.class`, `int.class`)
    Class(Type),
    List(Vec<Constant>),
    Set(Vec<Constant>),
    /// Map literal, entries in declaration order
    Map(Vec<(Constant, Constant)>),
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Null => Type::Null,
            Constant::Boolean(_) => Type::boolean(),
            Constant::Byte(_) => Type::byte(),
            Constant::Char(_) => Type::char(),
            Constant::Short(_) => Type::short(),
            Constant::Int(_) => Type::int(),
            Constant::Long(_) => Type::long(),
            Constant::Float(_) => Type::float(),
            Constant::Double(_) => Type::double(),
            Constant::String(_) => Type::string(),
            Constant::Class(_) => Type::class("java/lang/Class"),
            Constant::List(_) => Type::class("java/util/List"),
            Constant::Set(_) => Type::class("java/util/Set"),
            Constant::Map(_) => Type::class("java/util/Map"),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Constant::List(_) | Constant::Set(_) | Constant::Map(_))
    }

    /// Number of elements (entries for maps); zero for scalars
    pub fn element_count(&self) -> usize {
        match self {
            Constant::List(items) | Constant::Set(items) => items.len(),
            Constant::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    /// Collections holding nested collections or class literals can't be
    /// flattened into the resource blob and are always built inline.
    pub fn requires_inline(&self) -> bool {
        let nested = |c: &Constant| c.is_collection() || matches!(c, Constant::Class(_));
        match self {
            Constant::List(items) | Constant::Set(items) => items.iter().any(nested),
            Constant::Map(entries) => entries.iter().any(|(k, v)| nested(k) || nested(v)),
            _ => true,
        }
    }

    /// Immutable collections reject nulls and duplicate keys at runtime, so
    /// such literals are rejected while building.
    pub fn validate(&self) -> Result<()> {
        match self {
            Constant::Class(ty) if ty.is_null() => Err(Error::invalid_argument("no class literal for the null type")),
            Constant::List(items) => items.iter().try_for_each(Constant::validate_element),
            Constant::Set(items) => {
                items.iter().try_for_each(Constant::validate_element)?;
                if let Some(dup) = first_duplicate(items.iter()) {
                    return Err(Error::invalid_argument(format!("duplicate set element {dup:?}")));
                }
                Ok(())
            }
            Constant::Map(entries) => {
                for (k, v) in entries {
                    k.validate_element()?;
                    v.validate_element()?;
                }
                if let Some(dup) = first_duplicate(entries.iter().map(|(k, _)| k)) {
                    return Err(Error::invalid_argument(format!("duplicate map key {dup:?}")));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn validate_element(&self) -> Result<()> {
        if matches!(self, Constant::Null) {
            return Err(Error::invalid_argument("immutable collection literals cannot contain null"));
        }
        self.validate()
    }

    /// Primitive kind of a scalar constant, if any
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        self.ty().primitive()
    }

    /// Narrow an `int` constant into `byte`/`short`/`char` when the value fits
    pub(crate) fn narrow_int(&self, to: PrimitiveKind) -> Option<Constant> {
        let Constant::Int(v) = *self else { return None };
        match to {
            PrimitiveKind::Byte => i8::try_from(v).ok().map(Constant::Byte),
            PrimitiveKind::Short => i16::try_from(v).ok().map(Constant::Short),
            PrimitiveKind::Char => u16::try_from(v).ok().map(Constant::Char),
            _ => None,
        }
    }
}

fn first_duplicate<'a>(items: impl Iterator<Item = &'a Constant>) -> Option<&'a Constant> {
    let mut seen: Vec<&Constant> = Vec::new();
    for item in items {
        if seen.contains(&item) {
            return Some(item);
        }
        seen.push(item);
    }
    None
}

impl From<bool> for Constant {
    fn from(v: bool) -> Self {
        Constant::Boolean(v)
    }
}

impl From<i8> for Constant {
    fn from(v: i8) -> Self {
        Constant::Byte(v)
    }
}

impl From<i16> for Constant {
    fn from(v: i16) -> Self {
        Constant::Short(v)
    }
}

impl From<i32> for Constant {
    fn from(v: i32) -> Self {
        Constant::Int(v)
    }
}

impl From<i64> for Constant {
    fn from(v: i64) -> Self {
        Constant::Long(v)
    }
}

impl From<f32> for Constant {
    fn from(v: f32) -> Self {
        Constant::Float(v)
    }
}

impl From<f64> for Constant {
    fn from(v: f64) -> Self {
        Constant::Double(v)
    }
}

impl From<char> for Constant {
    fn from(c: char) -> Self {
        Constant::Char(u16::try_from(c as u32).unwrap_or(0xFFFD))
    }
}

impl From<&str> for Constant {
    fn from(v: &str) -> Self {
        Constant::String(v.to_string())
    }
}

impl From<String> for Constant {
    fn from(v: String) -> Self {
        Constant::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_types() {
        assert_eq!(Constant::from(3).ty(), Type::int());
        assert_eq!(Constant::from('x').ty(), Type::char());
        assert_eq!(Constant::List(vec![]).ty(), Type::class("java/util/List"));
        assert!(Constant::Null.ty().is_null());
    }

    #[test]
    fn test_collections_reject_null_and_duplicates() {
        let list = Constant::List(vec![Constant::Int(1), Constant::Null]);
        assert!(list.validate().unwrap_err().is_invalid_argument());

        let set = Constant::Set(vec![Constant::from("a"), Constant::from("a")]);
        assert!(set.validate().is_err());

        let map = Constant::Map(vec![(Constant::Int(1), Constant::from("one")), (Constant::Int(2), Constant::from("two"))]);
        assert!(map.validate().is_ok());
        assert_eq!(map.element_count(), 2);
    }

    #[test]
    fn test_requires_inline() {
        let flat = Constant::List(vec![Constant::Int(1), Constant::from("x")]);
        assert!(!flat.requires_inline());
        let nested = Constant::List(vec![Constant::List(vec![])]);
        assert!(nested.requires_inline());
        let classes = Constant::Set(vec![Constant::Class(Type::int())]);
        assert!(classes.requires_inline());
    }

    #[test]
    fn test_narrow_int() {
        assert_eq!(Constant::Int(100).narrow_int(PrimitiveKind::Byte), Some(Constant::Byte(100)));
        assert_eq!(Constant::Int(300).narrow_int(PrimitiveKind::Byte), None);
        assert_eq!(Constant::Int(-1).narrow_int(PrimitiveKind::Char), None);
        assert_eq!(Constant::Long(1).narrow_int(PrimitiveKind::Short), None);
    }
}
