//! The immutable side of the interpreter: parsed HVML documents.
//!
//! A document parses once into a [`VDocument`] - an arena of nodes that is
//! never mutated afterwards. Coroutines walk it; all mutable state lives in
//! their frames and in the output DOM. Attribute values and text content
//! are stored as value-construction ([`VcmNode`]) trees and evaluated
//! against a frame each time a frame needs them.

mod document;
mod error;
mod parser;
mod tags;
mod vcm;

pub use document::{ContentPart, VAttribute, VDocument, VElement, VNodeData, VNodeId};
pub use error::{EvalError, ParseError};
pub use parser::parse_document;
pub use tags::{AttrOp, TagName};
pub use vcm::{eval_vcm, parse_expression, VcmEvalCtx, VcmNode};
