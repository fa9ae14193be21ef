//! Class hierarchy knowledge used for reference widening and frame merging
//!
//! The registry knows a core subset of the JDK out of the box and learns
//! every class the caller builds. Unknown classes are treated as direct
//! subclasses of `java/lang/Object`.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use super::{Type, OBJECT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
}

impl ClassInfo {
    pub fn class(name: &str, super_name: &str, interfaces: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some(super_name.to_string()),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            is_interface: false,
        }
    }

    pub fn interface(name: &str, interfaces: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some(OBJECT.to_string()),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            is_interface: true,
        }
    }
}

const SER: &str = "java/io/Serializable";
const CMP: &str = "java/lang/Comparable";

static JDK_CLASSES: Lazy<HashMap<String, ClassInfo>> = Lazy::new(|| {
    let classes = vec![
        ClassInfo { name: OBJECT.to_string(), super_name: None, interfaces: vec![], is_interface: false },
        // java.lang interfaces
        ClassInfo::interface(SER, &[]),
        ClassInfo::interface(CMP, &[]),
        ClassInfo::interface("java/lang/CharSequence", &[]),
        ClassInfo::interface("java/lang/Cloneable", &[]),
        ClassInfo::interface("java/lang/Runnable", &[]),
        ClassInfo::interface("java/lang/Iterable", &[]),
        ClassInfo::interface("java/lang/AutoCloseable", &[]),
        ClassInfo::interface("java/lang/Appendable", &[]),
        ClassInfo::interface("java/io/Closeable", &["java/lang/AutoCloseable"]),
        ClassInfo::interface("java/io/Flushable", &[]),
        // java.lang classes
        ClassInfo::class("java/lang/String", OBJECT, &[SER, CMP, "java/lang/CharSequence"]),
        ClassInfo::class("java/lang/Number", OBJECT, &[SER]),
        ClassInfo::class("java/lang/Integer", "java/lang/Number", &[CMP]),
        ClassInfo::class("java/lang/Long", "java/lang/Number", &[CMP]),
        ClassInfo::class("java/lang/Short", "java/lang/Number", &[CMP]),
        ClassInfo::class("java/lang/Byte", "java/lang/Number", &[CMP]),
        ClassInfo::class("java/lang/Float", "java/lang/Number", &[CMP]),
        ClassInfo::class("java/lang/Double", "java/lang/Number", &[CMP]),
        ClassInfo::class("java/lang/Boolean", OBJECT, &[SER, CMP]),
        ClassInfo::class("java/lang/Character", OBJECT, &[SER, CMP]),
        ClassInfo::class("java/lang/Void", OBJECT, &[]),
        ClassInfo::class("java/lang/Class", OBJECT, &[SER]),
        ClassInfo::class("java/lang/Enum", OBJECT, &[CMP, SER]),
        ClassInfo::class("java/lang/Math", OBJECT, &[]),
        ClassInfo::class("java/lang/System", OBJECT, &[]),
        ClassInfo::class("java/lang/AbstractStringBuilder", OBJECT, &["java/lang/Appendable", "java/lang/CharSequence"]),
        ClassInfo::class("java/lang/StringBuilder", "java/lang/AbstractStringBuilder", &[SER, CMP, "java/lang/CharSequence"]),
        // throwables
        ClassInfo::class("java/lang/Throwable", OBJECT, &[SER]),
        ClassInfo::class("java/lang/Exception", "java/lang/Throwable", &[]),
        ClassInfo::class("java/lang/Error", "java/lang/Throwable", &[]),
        ClassInfo::class("java/lang/RuntimeException", "java/lang/Exception", &[]),
        ClassInfo::class("java/lang/ArithmeticException", "java/lang/RuntimeException", &[]),
        ClassInfo::class("java/lang/NullPointerException", "java/lang/RuntimeException", &[]),
        ClassInfo::class("java/lang/ClassCastException", "java/lang/RuntimeException", &[]),
        ClassInfo::class("java/lang/IllegalArgumentException", "java/lang/RuntimeException", &[]),
        ClassInfo::class("java/lang/NumberFormatException", "java/lang/IllegalArgumentException", &[]),
        ClassInfo::class("java/lang/IllegalStateException", "java/lang/RuntimeException", &[]),
        ClassInfo::class("java/lang/UnsupportedOperationException", "java/lang/RuntimeException", &[]),
        ClassInfo::class("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException", &[]),
        ClassInfo::class("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException", &[]),
        ClassInfo::class("java/lang/ReflectiveOperationException", "java/lang/Exception", &[]),
        ClassInfo::class("java/lang/NoSuchFieldException", "java/lang/ReflectiveOperationException", &[]),
        ClassInfo::class("java/lang/IllegalAccessException", "java/lang/ReflectiveOperationException", &[]),
        ClassInfo::class("java/lang/AssertionError", "java/lang/Error", &[]),
        ClassInfo::class("java/lang/LinkageError", "java/lang/Error", &[]),
        ClassInfo::class("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError", &[]),
        ClassInfo::class("java/io/IOException", "java/lang/Exception", &[]),
        // java.io
        ClassInfo::class("java/io/OutputStream", OBJECT, &["java/io/Closeable", "java/io/Flushable"]),
        ClassInfo::class("java/io/FilterOutputStream", "java/io/OutputStream", &[]),
        ClassInfo::class("java/io/PrintStream", "java/io/FilterOutputStream", &["java/lang/Appendable", "java/io/Closeable"]),
        // java.util
        ClassInfo::interface("java/util/Collection", &["java/lang/Iterable"]),
        ClassInfo::interface("java/util/List", &["java/util/Collection"]),
        ClassInfo::interface("java/util/Set", &["java/util/Collection"]),
        ClassInfo::interface("java/util/Map", &[]),
        ClassInfo::interface("java/util/Map$Entry", &[]),
        ClassInfo::interface("java/util/Iterator", &[]),
        ClassInfo::interface("java/util/RandomAccess", &[]),
        ClassInfo::class("java/util/AbstractCollection", OBJECT, &["java/util/Collection"]),
        ClassInfo::class("java/util/AbstractList", "java/util/AbstractCollection", &["java/util/List"]),
        ClassInfo::class(
            "java/util/ArrayList",
            "java/util/AbstractList",
            &["java/util/List", "java/util/RandomAccess", "java/lang/Cloneable", SER],
        ),
        ClassInfo::class("java/util/Objects", OBJECT, &[]),
        ClassInfo::class("java/util/Arrays", OBJECT, &[]),
        // functional interfaces
        ClassInfo::interface("java/util/function/Supplier", &[]),
        ClassInfo::interface("java/util/function/Function", &[]),
        ClassInfo::interface("java/util/function/Consumer", &[]),
        ClassInfo::interface("java/util/function/Predicate", &[]),
        ClassInfo::interface("java/util/function/BiFunction", &[]),
        ClassInfo::interface("java/util/function/IntUnaryOperator", &[]),
        ClassInfo::interface("java/util/function/IntBinaryOperator", &[]),
        ClassInfo::interface("java/util/concurrent/Callable", &[]),
        // concurrency
        ClassInfo::interface("java/util/concurrent/locks/Lock", &[]),
        ClassInfo::class("java/util/concurrent/locks/ReentrantLock", OBJECT, &["java/util/concurrent/locks/Lock", SER]),
        ClassInfo::class("java/lang/invoke/VarHandle", OBJECT, &[]),
        ClassInfo::class("java/lang/invoke/MethodHandles", OBJECT, &[]),
        ClassInfo::class("java/lang/invoke/MethodHandles$Lookup", OBJECT, &[]),
    ];
    classes.into_iter().map(|c| (c.name.clone(), c)).collect()
});

/// Class hierarchy lookup: the JDK subset plus classes defined by the caller
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    classes: HashMap<String, ClassInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a class definition
    pub fn define(&mut self, info: ClassInfo) {
        log::trace!("registering class {}", info.name);
        self.classes.insert(info.name.clone(), info);
    }

    pub fn lookup(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name).or_else(|| JDK_CLASSES.get(name))
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn is_interface(&self, name: &str) -> bool {
        self.lookup(name).map(|c| c.is_interface).unwrap_or(false)
    }

    fn super_of(&self, name: &str) -> Option<String> {
        match self.lookup(name) {
            Some(info) => info.super_name.clone(),
            None if name == OBJECT => None,
            None => Some(OBJECT.to_string()),
        }
    }

    /// Whether class `sub` is `sup` or inherits from it (classes and interfaces)
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT {
            return true;
        }
        let mut seen = HashSet::new();
        let mut pending = vec![sub.to_string()];
        while let Some(name) = pending.pop() {
            if name == sup {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(info) = self.lookup(&name) {
                pending.extend(info.interfaces.iter().cloned());
                if let Some(s) = &info.super_name {
                    pending.push(s.clone());
                }
            }
        }
        false
    }

    /// Reference assignability (identity or widening reference conversion)
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (Type::Null, t) => t.is_reference() && !t.is_null(),
            (Type::Class(a), Type::Class(b)) => self.is_subclass(a, b),
            (Type::Array(_), Type::Class(b)) => {
                b == OBJECT || b == "java/lang/Cloneable" || b == "java/io/Serializable"
            }
            (Type::Array(a), Type::Array(b)) => {
                a.is_reference() && b.is_reference() && self.is_assignable(a, b)
            }
            _ => false,
        }
    }

    /// Nearest common superclass, used when merging verifier frames.
    /// Interfaces merge to `java/lang/Object`, as the verifier treats them.
    pub fn common_super_class(&self, a: &str, b: &str) -> String {
        if a == b {
            return a.to_string();
        }
        if self.is_interface(a) || self.is_interface(b) {
            return OBJECT.to_string();
        }
        if self.is_subclass(b, a) {
            return a.to_string();
        }
        if self.is_subclass(a, b) {
            return b.to_string();
        }
        let mut current = a.to_string();
        while let Some(s) = self.super_of(&current) {
            if self.is_subclass(b, &s) {
                return s;
            }
            current = s;
        }
        OBJECT.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jdk_hierarchy() {
        let reg = TypeRegistry::new();
        assert!(reg.is_subclass("java/lang/ArithmeticException", "java/lang/RuntimeException"));
        assert!(reg.is_subclass("java/util/ArrayList", "java/lang/Iterable"));
        assert!(reg.is_subclass("java/lang/Integer", "java/lang/Comparable"));
        assert!(!reg.is_subclass("java/lang/RuntimeException", "java/lang/ArithmeticException"));
    }

    #[test]
    fn test_assignability() {
        let reg = TypeRegistry::new();
        assert!(reg.is_assignable(&Type::Null, &Type::string()));
        assert!(!reg.is_assignable(&Type::Null, &Type::int()));
        assert!(reg.is_assignable(&Type::class("java/lang/Integer"), &Type::class("java/lang/Number")));
        assert!(reg.is_assignable(&Type::array_of(Type::string()), &Type::array_of(Type::object())));
        assert!(!reg.is_assignable(&Type::array_of(Type::int()), &Type::array_of(Type::long())));
        assert!(reg.is_assignable(&Type::array_of(Type::int()), &Type::object()));
    }

    #[test]
    fn test_user_classes_and_common_super() {
        let mut reg = TypeRegistry::new();
        reg.define(ClassInfo::class("com/example/Base", OBJECT, &[]));
        reg.define(ClassInfo::class("com/example/A", "com/example/Base", &[]));
        reg.define(ClassInfo::class("com/example/B", "com/example/Base", &[]));
        assert_eq!(reg.common_super_class("com/example/A", "com/example/B"), "com/example/Base");
        assert_eq!(reg.common_super_class("java/lang/Integer", "java/lang/Long"), "java/lang/Number");
        assert_eq!(reg.common_super_class("java/util/List", "java/lang/String"), OBJECT);
        assert_eq!(reg.common_super_class("com/example/Unknown", "com/example/A"), OBJECT);
    }
}
