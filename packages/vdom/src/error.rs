use thiserror::Error;

/// Document or expression syntax errors, with byte offsets into the source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("unexpected character {found:?} at offset {at} (expected {expected})")]
    UnexpectedChar {
        at: usize,
        found: char,
        expected: &'static str,
    },

    #[error("mismatched close tag at offset {at}: opened <{opened}>, closed </{closed}>")]
    MismatchedClose {
        at: usize,
        opened: String,
        closed: String,
    },

    #[error("document has no root element")]
    MissingRoot,

    #[error("malformed number literal {0:?}")]
    BadNumber(String),
}

/// Errors raised while evaluating a value-construction tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// A variable or symbol reference that resolved to nothing.
    #[error("no such variable: {0}")]
    NoSuchVariable(String),

    /// A member access on a value that has no such member.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// An HVML-level exception raised from inside an expression
    /// (e.g. `raise('BadName')`). The atom names the exception.
    #[error("exception: {atom}")]
    Exception { atom: String, info: Option<String> },

    /// A variant-layer failure surfaced through the expression.
    #[error("{0}")]
    Variant(#[from] hvml_variant::VariantError),

    #[error("operation not supported on {0}")]
    Unsupported(&'static str),
}
