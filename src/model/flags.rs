//! Access flag legality
//!
//! Builder-facing [`Modifiers`] use one bit per keyword, so `volatile` and
//! `bridge` (which share a class file bit) never alias. The functions here
//! check a modifier set against the kind of container and member and
//! produce the class file access word.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::backend::classfile::access_flags::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const PUBLIC: Modifiers = Modifiers(1 << 0);
    pub const PRIVATE: Modifiers = Modifiers(1 << 1);
    pub const PROTECTED: Modifiers = Modifiers(1 << 2);
    pub const STATIC: Modifiers = Modifiers(1 << 3);
    pub const FINAL: Modifiers = Modifiers(1 << 4);
    pub const SYNCHRONIZED: Modifiers = Modifiers(1 << 5);
    pub const VOLATILE: Modifiers = Modifiers(1 << 6);
    pub const TRANSIENT: Modifiers = Modifiers(1 << 7);
    pub const NATIVE: Modifiers = Modifiers(1 << 8);
    pub const ABSTRACT: Modifiers = Modifiers(1 << 9);
    pub const STRICT: Modifiers = Modifiers(1 << 10);
    pub const SYNTHETIC: Modifiers = Modifiers(1 << 11);
    pub const VARARGS: Modifiers = Modifiers(1 << 12);
    pub const BRIDGE: Modifiers = Modifiers(1 << 13);

    const VISIBILITY: Modifiers = Modifiers(0b111);

    const NAMES: [(Modifiers, &'static str); 14] = [
        (Self::PUBLIC, "public"),
        (Self::PRIVATE, "private"),
        (Self::PROTECTED, "protected"),
        (Self::STATIC, "static"),
        (Self::FINAL, "final"),
        (Self::SYNCHRONIZED, "synchronized"),
        (Self::VOLATILE, "volatile"),
        (Self::TRANSIENT, "transient"),
        (Self::NATIVE, "native"),
        (Self::ABSTRACT, "abstract"),
        (Self::STRICT, "strictfp"),
        (Self::SYNTHETIC, "synthetic"),
        (Self::VARARGS, "varargs"),
        (Self::BRIDGE, "bridge"),
    ];

    pub fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Modifiers) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn without(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 & !other.0)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    fn only(self, allowed: Modifiers) -> Modifiers {
        Modifiers(self.0 & !allowed.0)
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Modifiers) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> =
            Self::NAMES.iter().filter(|(m, _)| self.contains(*m)).map(|(_, name)| *name).collect();
        f.write_str(&names.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Constructor,
    StaticInit,
}

fn illegal(what: &str, mods: Modifiers) -> Error {
    Error::invalid_argument(format!("illegal modifier combination for {what}: {mods}"))
}

fn check_visibility(what: &str, mods: Modifiers) -> Result<()> {
    let vis = mods.0 & Modifiers::VISIBILITY.0;
    if vis.count_ones() > 1 {
        return Err(illegal(what, mods));
    }
    Ok(())
}

fn visibility_bits(mods: Modifiers) -> u16 {
    let mut acc = 0;
    if mods.contains(Modifiers::PUBLIC) {
        acc |= ACC_PUBLIC;
    }
    if mods.contains(Modifiers::PRIVATE) {
        acc |= ACC_PRIVATE;
    }
    if mods.contains(Modifiers::PROTECTED) {
        acc |= ACC_PROTECTED;
    }
    acc
}

/// Access word for a class or interface declaration
pub fn class_access(container: ContainerKind, mods: Modifiers) -> Result<u16> {
    let allowed = Modifiers::PUBLIC | Modifiers::FINAL | Modifiers::ABSTRACT | Modifiers::SYNTHETIC;
    if !mods.only(allowed).is_empty() {
        return Err(illegal("a class", mods));
    }
    let mut acc = visibility_bits(mods);
    if mods.contains(Modifiers::SYNTHETIC) {
        acc |= ACC_SYNTHETIC;
    }
    match container {
        ContainerKind::Class => {
            if mods.contains(Modifiers::FINAL | Modifiers::ABSTRACT) {
                return Err(illegal("a class", mods));
            }
            acc |= ACC_SUPER;
            if mods.contains(Modifiers::FINAL) {
                acc |= ACC_FINAL;
            }
            if mods.contains(Modifiers::ABSTRACT) {
                acc |= ACC_ABSTRACT;
            }
        }
        ContainerKind::Interface => {
            if mods.contains(Modifiers::FINAL) {
                return Err(illegal("an interface", mods));
            }
            acc |= ACC_INTERFACE | ACC_ABSTRACT;
        }
    }
    Ok(acc)
}

/// Access word for a field
pub fn field_access(container: ContainerKind, mods: Modifiers) -> Result<u16> {
    check_visibility("a field", mods)?;
    let allowed = Modifiers::VISIBILITY
        | Modifiers::STATIC
        | Modifiers::FINAL
        | Modifiers::VOLATILE
        | Modifiers::TRANSIENT
        | Modifiers::SYNTHETIC;
    if !mods.only(allowed).is_empty() {
        return Err(illegal("a field", mods));
    }
    let synthetic = if mods.contains(Modifiers::SYNTHETIC) { ACC_SYNTHETIC } else { 0 };
    match container {
        ContainerKind::Class => {
            if mods.contains(Modifiers::FINAL | Modifiers::VOLATILE) {
                return Err(illegal("a field", mods));
            }
            let mut acc = visibility_bits(mods) | synthetic;
            for (m, bit) in [
                (Modifiers::STATIC, ACC_STATIC),
                (Modifiers::FINAL, ACC_FINAL),
                (Modifiers::VOLATILE, ACC_VOLATILE),
                (Modifiers::TRANSIENT, ACC_TRANSIENT),
            ] {
                if mods.contains(m) {
                    acc |= bit;
                }
            }
            Ok(acc)
        }
        ContainerKind::Interface => {
            if mods.intersects(Modifiers::PRIVATE | Modifiers::PROTECTED | Modifiers::VOLATILE | Modifiers::TRANSIENT) {
                return Err(illegal("an interface field", mods));
            }
            Ok(ACC_PUBLIC | ACC_STATIC | ACC_FINAL | synthetic)
        }
    }
}

/// Access word for a method, constructor or static initializer
pub fn method_access(container: ContainerKind, kind: MethodKind, mods: Modifiers, has_body: bool) -> Result<u16> {
    check_visibility("a method", mods)?;
    if mods.intersects(Modifiers::VOLATILE | Modifiers::TRANSIENT) {
        return Err(illegal("a method", mods));
    }
    let mut acc = visibility_bits(mods);
    for (m, bit) in [
        (Modifiers::STATIC, ACC_STATIC),
        (Modifiers::FINAL, ACC_FINAL),
        (Modifiers::SYNCHRONIZED, ACC_SYNCHRONIZED),
        (Modifiers::NATIVE, ACC_NATIVE),
        (Modifiers::ABSTRACT, ACC_ABSTRACT),
        (Modifiers::STRICT, ACC_STRICT),
        (Modifiers::SYNTHETIC, ACC_SYNTHETIC),
        (Modifiers::VARARGS, ACC_VARARGS),
        (Modifiers::BRIDGE, ACC_BRIDGE),
    ] {
        if mods.contains(m) {
            acc |= bit;
        }
    }

    match kind {
        MethodKind::StaticInit => {
            if !mods.only(Modifiers::STATIC).is_empty() || !has_body {
                return Err(illegal("a static initializer", mods));
            }
            return Ok(ACC_STATIC);
        }
        MethodKind::Constructor => {
            let allowed = Modifiers::VISIBILITY | Modifiers::VARARGS | Modifiers::SYNTHETIC | Modifiers::STRICT;
            if container == ContainerKind::Interface {
                return Err(Error::invalid_argument("an interface cannot declare a constructor"));
            }
            if !mods.only(allowed).is_empty() || !has_body {
                return Err(illegal("a constructor", mods));
            }
            return Ok(acc);
        }
        MethodKind::Method => {}
    }

    let abstract_conflicts =
        Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::FINAL | Modifiers::SYNCHRONIZED | Modifiers::NATIVE | Modifiers::STRICT;
    match container {
        ContainerKind::Class => {
            if mods.contains(Modifiers::ABSTRACT) && (has_body || mods.intersects(abstract_conflicts)) {
                return Err(illegal("an abstract method", mods));
            }
            if mods.contains(Modifiers::NATIVE) && (has_body || mods.contains(Modifiers::STRICT)) {
                return Err(illegal("a native method", mods));
            }
            if !has_body && !mods.intersects(Modifiers::ABSTRACT | Modifiers::NATIVE) {
                return Err(Error::invalid_argument("a method without a body must be abstract or native"));
            }
            Ok(acc)
        }
        ContainerKind::Interface => {
            let forbidden = Modifiers::PROTECTED | Modifiers::FINAL | Modifiers::SYNCHRONIZED | Modifiers::NATIVE;
            if mods.intersects(forbidden) {
                return Err(illegal("an interface method", mods));
            }
            if has_body {
                if mods.contains(Modifiers::ABSTRACT) {
                    return Err(illegal("an interface method with a body", mods));
                }
            } else if mods.intersects(Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::STRICT) {
                return Err(illegal("an abstract interface method", mods));
            } else {
                acc |= ACC_ABSTRACT;
            }
            if !mods.contains(Modifiers::PRIVATE) {
                acc |= ACC_PUBLIC;
            }
            Ok(acc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_field_flags() {
        let acc = field_access(ContainerKind::Class, Modifiers::PRIVATE | Modifiers::VOLATILE).unwrap();
        assert_eq!(acc, ACC_PRIVATE | ACC_VOLATILE);
        assert!(field_access(ContainerKind::Class, Modifiers::PUBLIC | Modifiers::PRIVATE).is_err());
        assert!(field_access(ContainerKind::Class, Modifiers::FINAL | Modifiers::VOLATILE).is_err());
        assert!(field_access(ContainerKind::Class, Modifiers::SYNCHRONIZED).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_interface_field_is_forced_static_final() {
        let acc = field_access(ContainerKind::Interface, Modifiers::NONE).unwrap();
        assert_eq!(acc, ACC_PUBLIC | ACC_STATIC | ACC_FINAL);
        let redundant = field_access(ContainerKind::Interface, Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL);
        assert_eq!(redundant.unwrap(), acc);
        assert!(field_access(ContainerKind::Interface, Modifiers::VOLATILE).is_err());
        assert!(field_access(ContainerKind::Interface, Modifiers::PRIVATE).is_err());
    }

    #[test]
    fn test_interface_methods_default_to_public_abstract() {
        let acc = method_access(ContainerKind::Interface, MethodKind::Method, Modifiers::NONE, false).unwrap();
        assert_eq!(acc, ACC_PUBLIC | ACC_ABSTRACT);
        let acc = method_access(ContainerKind::Interface, MethodKind::Method, Modifiers::ABSTRACT, false).unwrap();
        assert_eq!(acc, ACC_PUBLIC | ACC_ABSTRACT);
        let default = method_access(ContainerKind::Interface, MethodKind::Method, Modifiers::NONE, true).unwrap();
        assert_eq!(default, ACC_PUBLIC);
        let private = method_access(ContainerKind::Interface, MethodKind::Method, Modifiers::PRIVATE, true).unwrap();
        assert_eq!(private, ACC_PRIVATE);
    }

    #[test]
    fn test_synchronized_interface_method_is_rejected() {
        let err = method_access(ContainerKind::Interface, MethodKind::Method, Modifiers::SYNCHRONIZED, true).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(method_access(ContainerKind::Interface, MethodKind::Method, Modifiers::FINAL, true).is_err());
    }

    #[test]
    fn test_class_method_body_rules() {
        let mods = Modifiers::PUBLIC | Modifiers::ABSTRACT;
        assert!(method_access(ContainerKind::Class, MethodKind::Method, mods, false).is_ok());
        assert!(method_access(ContainerKind::Class, MethodKind::Method, mods, true).is_err());
        assert!(method_access(ContainerKind::Class, MethodKind::Method, mods | Modifiers::STATIC, false).is_err());
        assert!(method_access(ContainerKind::Class, MethodKind::Method, Modifiers::PUBLIC, false).is_err());
        assert!(method_access(ContainerKind::Class, MethodKind::Method, Modifiers::NATIVE, false).is_ok());

        let acc = method_access(ContainerKind::Class, MethodKind::Method, Modifiers::STATIC | Modifiers::VARARGS, true);
        assert_eq!(acc.unwrap(), ACC_STATIC | ACC_VARARGS);
    }

    #[test]
    fn test_constructor_and_static_init() {
        assert!(method_access(ContainerKind::Class, MethodKind::Constructor, Modifiers::STATIC, true).is_err());
        assert!(method_access(ContainerKind::Interface, MethodKind::Constructor, Modifiers::PUBLIC, true).is_err());
        assert_eq!(method_access(ContainerKind::Class, MethodKind::StaticInit, Modifiers::NONE, true).unwrap(), ACC_STATIC);
    }

    #[test]
    fn test_class_access() {
        assert_eq!(class_access(ContainerKind::Class, Modifiers::PUBLIC).unwrap(), ACC_PUBLIC | ACC_SUPER);
        assert!(class_access(ContainerKind::Class, Modifiers::FINAL | Modifiers::ABSTRACT).is_err());
        let acc = class_access(ContainerKind::Interface, Modifiers::PUBLIC | Modifiers::ABSTRACT).unwrap();
        assert_eq!(acc, ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
    }

    #[test]
    fn test_display() {
        assert_eq!((Modifiers::PUBLIC | Modifiers::STATIC).to_string(), "public static");
    }
}
