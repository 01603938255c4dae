//! The interpreter's error model.
//!
//! Every fallible operation returns `Result<_, HvmlError>`; the C
//! original's thread-local error slot does not survive the port. At the
//! top of each phase transition the scheduler moves a returned error into
//! the coroutine's exception slot (see `schedule::capture_exception`), so
//! the exception travels with the coroutine until a `<catch>` consumes it
//! or termination dumps it.

use hvml_variant::{Atom, Variant, VariantError};
use hvml_vdom::{EvalError, ParseError};
use thiserror::Error;

/// The abstract error kinds of the wire protocol and exception surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OutOfMemory,
    InvalidValue,
    BadArg,
    NotExists,
    NotAllowed,
    NotImplemented,
    WrongStage,
    ServerRefused,
    ExternalFailure,
}

impl ErrorKind {
    /// The HVML exception atom this kind raises when uncaught.
    pub fn default_atom(self) -> Atom {
        Atom::intern(match self {
            ErrorKind::OutOfMemory => "MemoryFailure",
            ErrorKind::InvalidValue => "InvalidValue",
            ErrorKind::BadArg => "ArgumentMissed",
            ErrorKind::NotExists => "NoSuchKey",
            ErrorKind::NotAllowed => "NotAllowed",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::WrongStage => "WrongStage",
            ErrorKind::ServerRefused => "ServerRefused",
            ErrorKind::ExternalFailure => "ExternalFailure",
        })
    }
}

/// A failed operation: an abstract kind plus the HVML exception identity.
#[derive(Debug, Clone, Error)]
#[error("{atom}: {message}")]
pub struct HvmlError {
    pub kind: ErrorKind,
    /// The interned exception name (`BadName`, `NoSuchKey`, ...).
    pub atom: Atom,
    /// Optional structured payload attached by `raise(name, info)`.
    pub info: Option<Variant>,
    pub message: String,
}

impl HvmlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        HvmlError {
            kind,
            atom: kind.default_atom(),
            info: None,
            message: message.into(),
        }
    }

    /// An HVML-level exception with an explicit atom.
    pub fn exception(atom: &str, info: Option<Variant>) -> Self {
        HvmlError {
            kind: ErrorKind::ExternalFailure,
            atom: Atom::intern(atom),
            info,
            message: format!("exception {atom} raised"),
        }
    }

    pub fn not_implemented(what: &str) -> Self {
        Self::new(ErrorKind::NotImplemented, format!("{what} is not implemented"))
    }

    pub fn bad_arg(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadArg, message)
    }
}

pub type Result<T, E = HvmlError> = std::result::Result<T, E>;

/// What sits in a coroutine's exception slot: the error plus the call
/// site that produced it.
#[derive(Debug, Clone)]
pub struct Exception {
    pub error: HvmlError,
    /// A formatted description of where the error was captured
    /// (tag path of the frame that was current).
    pub callsite: String,
}

impl Exception {
    pub fn atom(&self) -> Atom {
        self.error.atom
    }
}

impl From<VariantError> for HvmlError {
    fn from(err: VariantError) -> Self {
        let kind = match &err {
            VariantError::InvalidValue { .. } => ErrorKind::InvalidValue,
            VariantError::NotExists(_) => ErrorKind::NotExists,
            VariantError::BadArg(_) => ErrorKind::BadArg,
            VariantError::OutOfMemory => ErrorKind::OutOfMemory,
            VariantError::NotAllowed(_) => ErrorKind::NotAllowed,
        };
        HvmlError::new(kind, err.to_string())
    }
}

impl From<EvalError> for HvmlError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Exception { atom, info } => {
                HvmlError::exception(&atom, info.map(Variant::string))
            }
            EvalError::NoSuchVariable(name) => HvmlError {
                kind: ErrorKind::NotExists,
                atom: Atom::intern("BadName"),
                info: None,
                message: format!("no such variable: {name}"),
            },
            EvalError::NoSuchKey(key) => {
                HvmlError::new(ErrorKind::NotExists, format!("no such key: {key}"))
            }
            EvalError::Variant(inner) => inner.into(),
            EvalError::Unsupported(what) => {
                HvmlError::new(ErrorKind::NotAllowed, format!("unsupported: {what}"))
            }
        }
    }
}

impl From<ParseError> for HvmlError {
    fn from(err: ParseError) -> Self {
        HvmlError::new(ErrorKind::InvalidValue, err.to_string())
    }
}

impl From<hvml_dom::DomError> for HvmlError {
    fn from(err: hvml_dom::DomError) -> Self {
        HvmlError::new(ErrorKind::InvalidValue, err.to_string())
    }
}

impl From<hvml_renderer::RendererError> for HvmlError {
    fn from(err: hvml_renderer::RendererError) -> Self {
        HvmlError::new(ErrorKind::ServerRefused, err.to_string())
    }
}

impl From<hvml_executors::ExecutorError> for HvmlError {
    fn from(err: hvml_executors::ExecutorError) -> Self {
        HvmlError::new(ErrorKind::InvalidValue, err.to_string())
    }
}
