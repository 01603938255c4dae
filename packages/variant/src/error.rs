use thiserror::Error;

/// Errors produced by variant operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VariantError {
    /// The operation was applied to a variant of the wrong kind.
    #[error("invalid value: expected {expected}, got {found}")]
    InvalidValue {
        expected: &'static str,
        found: &'static str,
    },

    /// A non-silent query for a key that is not present.
    #[error("no such key: {0}")]
    NotExists(String),

    /// A malformed argument to a dynamic or native method.
    #[error("bad argument: {0}")]
    BadArg(&'static str),

    /// Kept for wire parity with the original protocol; never constructed
    /// by this crate (allocation failure aborts in Rust).
    #[error("out of memory")]
    OutOfMemory,

    /// The target kind does not support the operation at all.
    #[error("not allowed on {0}")]
    NotAllowed(&'static str),
}

impl VariantError {
    pub fn invalid(expected: &'static str, found: &'static str) -> Self {
        VariantError::InvalidValue { expected, found }
    }
}
