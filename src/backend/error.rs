//! Errors raised while assembling class files

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("constant pool is out of space")]
    ConstPoolOverflow,
    #[error("string constant of {len} bytes exceeds the 65535-byte limit")]
    Utf8TooLong { len: usize },
    #[error("unresolved label {label}")]
    UnresolvedLabel { label: u32 },
    #[error("method {method} is too large: {size} bytes of code")]
    CodeTooLarge { method: String, size: usize },
    #[error("malformed descriptor: {descriptor}")]
    MalformedDescriptor { descriptor: String },
    #[error("verification failed in {method} at instruction {index}: {reason}")]
    Verify { method: String, index: usize, reason: String },
    #[error("failed to serialize class file: {reason}")]
    Serialize { reason: String },
    #[error("too many {what}: {count}")]
    TooMany { what: &'static str, count: usize },
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
