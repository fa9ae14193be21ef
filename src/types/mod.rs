//! Canonical type descriptors for generated code
//!
//! [`Type`] is the erased, descriptor-level view of a JVM type. Generic
//! information lives in [`generic::GenericType`] and is erased to a `Type`
//! whenever a descriptor is needed.

pub mod conversion;
pub mod generic;
pub mod registry;

use std::fmt;

pub use conversion::{binary_promotion, find_conversion, Conversion};
pub use generic::{GenericKind, GenericType, TypeParam, TypeScope, WildcardBound};
pub use registry::{ClassInfo, TypeRegistry};

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";
pub const CLASS: &str = "java/lang/Class";
pub const THROWABLE: &str = "java/lang/Throwable";

/// Primitive kinds, including `void` for return types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl PrimitiveKind {
    pub fn descriptor(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
            PrimitiveKind::Void => 'V',
        }
    }

    pub fn from_descriptor(c: char) -> Option<Self> {
        Some(match c {
            'Z' => PrimitiveKind::Boolean,
            'B' => PrimitiveKind::Byte,
            'C' => PrimitiveKind::Char,
            'S' => PrimitiveKind::Short,
            'I' => PrimitiveKind::Int,
            'J' => PrimitiveKind::Long,
            'F' => PrimitiveKind::Float,
            'D' => PrimitiveKind::Double,
            'V' => PrimitiveKind::Void,
            _ => return None,
        })
    }

    pub fn java_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Void => "void",
        }
    }

    /// Internal name of the wrapper class; `java/lang/Void` for void
    pub fn box_class(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "java/lang/Boolean",
            PrimitiveKind::Byte => "java/lang/Byte",
            PrimitiveKind::Char => "java/lang/Character",
            PrimitiveKind::Short => "java/lang/Short",
            PrimitiveKind::Int => "java/lang/Integer",
            PrimitiveKind::Long => "java/lang/Long",
            PrimitiveKind::Float => "java/lang/Float",
            PrimitiveKind::Double => "java/lang/Double",
            PrimitiveKind::Void => "java/lang/Void",
        }
    }

    pub fn from_box_class(name: &str) -> Option<Self> {
        Some(match name {
            "java/lang/Boolean" => PrimitiveKind::Boolean,
            "java/lang/Byte" => PrimitiveKind::Byte,
            "java/lang/Character" => PrimitiveKind::Char,
            "java/lang/Short" => PrimitiveKind::Short,
            "java/lang/Integer" => PrimitiveKind::Int,
            "java/lang/Long" => PrimitiveKind::Long,
            "java/lang/Float" => PrimitiveKind::Float,
            "java/lang/Double" => PrimitiveKind::Double,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Boolean | PrimitiveKind::Void)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Byte | PrimitiveKind::Char | PrimitiveKind::Short | PrimitiveKind::Int | PrimitiveKind::Long
        )
    }

    /// Types the JVM represents as `int` on the operand stack
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Boolean | PrimitiveKind::Byte | PrimitiveKind::Char | PrimitiveKind::Short | PrimitiveKind::Int
        )
    }

    pub fn slot_size(self) -> u16 {
        match self {
            PrimitiveKind::Long | PrimitiveKind::Double => 2,
            PrimitiveKind::Void => 0,
            _ => 1,
        }
    }

    /// Whether primitive widening (JLS 5.1.2) converts `self` into `to`
    pub fn widens_to(self, to: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        match self {
            Byte => matches!(to, Short | Int | Long | Float | Double),
            Short | Char => matches!(to, Int | Long | Float | Double),
            Int => matches!(to, Long | Float | Double),
            Long => matches!(to, Float | Double),
            Float => matches!(to, Double),
            _ => false,
        }
    }

    /// Width ordering used by binary numeric promotion
    pub fn promotion_rank(self) -> u8 {
        match self {
            PrimitiveKind::Long => 1,
            PrimitiveKind::Float => 2,
            PrimitiveKind::Double => 3,
            _ => 0,
        }
    }
}

/// An erased JVM type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveKind),
    /// Class or interface, by internal name (`java/lang/String`)
    Class(String),
    Array(Box<Type>),
    /// Type of the `null` literal
    Null,
}

impl Type {
    pub fn boolean() -> Self {
        Type::Primitive(PrimitiveKind::Boolean)
    }

    pub fn byte() -> Self {
        Type::Primitive(PrimitiveKind::Byte)
    }

    pub fn char() -> Self {
        Type::Primitive(PrimitiveKind::Char)
    }

    pub fn short() -> Self {
        Type::Primitive(PrimitiveKind::Short)
    }

    pub fn int() -> Self {
        Type::Primitive(PrimitiveKind::Int)
    }

    pub fn long() -> Self {
        Type::Primitive(PrimitiveKind::Long)
    }

    pub fn float() -> Self {
        Type::Primitive(PrimitiveKind::Float)
    }

    pub fn double() -> Self {
        Type::Primitive(PrimitiveKind::Double)
    }

    pub fn void() -> Self {
        Type::Primitive(PrimitiveKind::Void)
    }

    pub fn object() -> Self {
        Type::Class(OBJECT.to_string())
    }

    pub fn string() -> Self {
        Type::Class(STRING.to_string())
    }

    /// Class type from either a dotted (`java.util.List`) or internal name
    pub fn class(name: &str) -> Self {
        Type::Class(internal_name(name))
    }

    pub fn array_of(component: Type) -> Self {
        Type::Array(Box::new(component))
    }

    /// Parse a field descriptor such as `[Ljava/lang/String;`
    pub fn from_descriptor(desc: &str) -> Option<Self> {
        let (ty, rest) = parse_descriptor_prefix(desc)?;
        rest.is_empty().then_some(ty)
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    pub fn write_descriptor(&self, out: &mut String) {
        match self {
            Type::Primitive(kind) => out.push(kind.descriptor()),
            Type::Class(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            Type::Array(component) => {
                out.push('[');
                component.write_descriptor(out);
            }
            Type::Null => out.push_str("Ljava/lang/Object;"),
        }
    }

    /// Name usable in a CONSTANT_Class entry: internal name, or descriptor for arrays
    pub fn class_constant_name(&self) -> String {
        match self {
            Type::Class(name) => name.clone(),
            Type::Null => OBJECT.to_string(),
            _ => self.descriptor(),
        }
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<&Type> {
        match self {
            Type::Array(component) => Some(component),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            Type::Array(component) => 1 + component.dimensions(),
            _ => 0,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveKind::Void))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(kind) if *kind != PrimitiveKind::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Class(_) | Type::Array(_) | Type::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Type::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveKind::Boolean))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::Class(n) if n == STRING)
    }

    pub fn slot_size(&self) -> u16 {
        match self {
            Type::Primitive(kind) => kind.slot_size(),
            _ => 1,
        }
    }

    /// Wrapper type for a primitive
    pub fn boxed(&self) -> Option<Type> {
        match self {
            Type::Primitive(kind) if *kind != PrimitiveKind::Void => Some(Type::Class(kind.box_class().to_string())),
            _ => None,
        }
    }

    /// Primitive type of a wrapper class
    pub fn unboxed(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Class(name) => PrimitiveKind::from_box_class(name),
            _ => None,
        }
    }

    /// Numeric primitive kind after unboxing, if any
    pub fn numeric_kind(&self) -> Option<PrimitiveKind> {
        let kind = self.primitive().or_else(|| self.unboxed())?;
        kind.is_numeric().then_some(kind)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(kind) => f.write_str(kind.java_name()),
            Type::Class(name) => f.write_str(&name.replace('/', ".")),
            Type::Array(component) => write!(f, "{component}[]"),
            Type::Null => f.write_str("null"),
        }
    }
}

impl From<PrimitiveKind> for Type {
    fn from(kind: PrimitiveKind) -> Self {
        Type::Primitive(kind)
    }
}

/// Convert a dotted class name to its internal form
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// Convert an internal class name to its dotted form
pub fn dotted_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Build a method descriptor from parameter and return types
pub fn method_descriptor(params: &[Type], ret: &Type) -> String {
    let mut out = String::from("(");
    for p in params {
        p.write_descriptor(&mut out);
    }
    out.push(')');
    ret.write_descriptor(&mut out);
    out
}

fn parse_descriptor_prefix(desc: &str) -> Option<(Type, &str)> {
    let mut chars = desc.chars();
    let first = chars.next()?;
    match first {
        'L' => {
            let end = desc.find(';')?;
            Some((Type::Class(desc[1..end].to_string()), &desc[end + 1..]))
        }
        '[' => {
            let (component, rest) = parse_descriptor_prefix(&desc[1..])?;
            Some((Type::array_of(component), rest))
        }
        c => {
            let kind = PrimitiveKind::from_descriptor(c)?;
            Some((Type::Primitive(kind), &desc[1..]))
        }
    }
}

/// Split a method descriptor into parameter and return types
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<Type>, Type)> {
    let mut rest = desc.strip_prefix('(')?;
    let mut params = Vec::new();
    while !rest.starts_with(')') {
        let (ty, tail) = parse_descriptor_prefix(rest)?;
        params.push(ty);
        rest = tail;
    }
    let (ret, tail) = parse_descriptor_prefix(&rest[1..])?;
    tail.is_empty().then_some((params, ret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors() {
        assert_eq!(Type::int().descriptor(), "I");
        assert_eq!(Type::class("java.lang.String").descriptor(), "Ljava/lang/String;");
        assert_eq!(Type::array_of(Type::array_of(Type::long())).descriptor(), "[[J");
        assert_eq!(method_descriptor(&[Type::int(), Type::double()], &Type::double()), "(ID)D");
    }

    #[test]
    fn test_parse_descriptors() {
        assert_eq!(Type::from_descriptor("[Ljava/util/List;"), Some(Type::array_of(Type::class("java/util/List"))));
        assert_eq!(Type::from_descriptor("Q"), None);
        let (params, ret) = parse_method_descriptor("(J[ILjava/lang/Object;)V").unwrap();
        assert_eq!(params, vec![Type::long(), Type::array_of(Type::int()), Type::object()]);
        assert!(ret.is_void());
    }

    #[test]
    fn test_boxing_helpers() {
        assert_eq!(Type::int().boxed(), Some(Type::class("java/lang/Integer")));
        assert_eq!(Type::void().boxed(), None);
        assert_eq!(Type::class("java/lang/Character").unboxed(), Some(PrimitiveKind::Char));
        assert_eq!(Type::string().unboxed(), None);
        assert_eq!(Type::class("java/lang/Long").numeric_kind(), Some(PrimitiveKind::Long));
    }

    #[test]
    fn test_widening_table() {
        use PrimitiveKind::*;
        assert!(Int.widens_to(Long));
        assert!(Char.widens_to(Int));
        assert!(!Char.widens_to(Short));
        assert!(!Long.widens_to(Int));
        assert!(!Boolean.widens_to(Int));
        assert_eq!(Type::long().slot_size(), 2);
        assert_eq!(Type::string().slot_size(), 1);
    }
}
