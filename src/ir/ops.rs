//! Operators and access modes carried by expression nodes

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl BinaryOp {
    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    /// Bitwise complement
    Com,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

/// Memory ordering of a field or array access in the generated program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryOrder {
    #[default]
    Plain,
    Opaque,
    Acquire,
    Release,
    Volatile,
}

impl MemoryOrder {
    /// `VarHandle` method used for an ordered read
    pub fn get_method(self) -> &'static str {
        match self {
            MemoryOrder::Plain => "get",
            MemoryOrder::Opaque => "getOpaque",
            MemoryOrder::Acquire => "getAcquire",
            MemoryOrder::Release | MemoryOrder::Volatile => "getVolatile",
        }
    }

    /// `VarHandle` method used for an ordered write
    pub fn set_method(self) -> &'static str {
        match self {
            MemoryOrder::Plain => "set",
            MemoryOrder::Opaque => "setOpaque",
            MemoryOrder::Release => "setRelease",
            MemoryOrder::Acquire | MemoryOrder::Volatile => "setVolatile",
        }
    }
}

/// Atomic read-modify-write operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    GetAndSet,
    GetAndAdd,
    GetAndBitwiseOr,
    GetAndBitwiseAnd,
    GetAndBitwiseXor,
    CompareAndSet,
    WeakCompareAndSet,
    CompareAndExchange,
}

impl AtomicOp {
    /// Number of value operands after the access coordinates
    pub fn arity(self) -> usize {
        match self {
            AtomicOp::CompareAndSet | AtomicOp::WeakCompareAndSet | AtomicOp::CompareAndExchange => 2,
            _ => 1,
        }
    }

    /// Whether the operation yields a success flag instead of the previous value
    pub fn returns_boolean(self) -> bool {
        matches!(self, AtomicOp::CompareAndSet | AtomicOp::WeakCompareAndSet)
    }

    /// `VarHandle` access-mode method for this operation at the given order.
    /// Acquire/release variants are used where the access mode family has
    /// them; everything else falls back to the volatile form.
    pub fn method_name(self, order: MemoryOrder) -> String {
        let base = match self {
            AtomicOp::GetAndSet => "getAndSet",
            AtomicOp::GetAndAdd => "getAndAdd",
            AtomicOp::GetAndBitwiseOr => "getAndBitwiseOr",
            AtomicOp::GetAndBitwiseAnd => "getAndBitwiseAnd",
            AtomicOp::GetAndBitwiseXor => "getAndBitwiseXor",
            AtomicOp::CompareAndSet => return "compareAndSet".to_string(),
            AtomicOp::WeakCompareAndSet => {
                return match order {
                    MemoryOrder::Plain => "weakCompareAndSetPlain",
                    MemoryOrder::Acquire => "weakCompareAndSetAcquire",
                    MemoryOrder::Release => "weakCompareAndSetRelease",
                    MemoryOrder::Opaque | MemoryOrder::Volatile => "weakCompareAndSet",
                }
                .to_string()
            }
            AtomicOp::CompareAndExchange => "compareAndExchange",
        };
        match order {
            MemoryOrder::Acquire => format!("{base}Acquire"),
            MemoryOrder::Release => format!("{base}Release"),
            _ => base.to_string(),
        }
    }
}
