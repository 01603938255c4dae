//! Executors: the embedded mini-grammars behind `by`-style attributes.
//!
//! Four grammars - FILTER, KEY, FORMULA, MATCH - each parse into an AST
//! whose `Display` form re-prints the canonical token stream (parse ∘
//! print is the identity on ASTs). An [`Executor`] wraps one parsed spec
//! and answers the interpreter's `choose`/`iterate`/`reduce` calls; the C
//! original's `create`/`destroy` pair is the constructor and `Drop`.

mod ast;
mod exec;
mod parser;

pub use ast::{
    ForClause, FilterRules, FilterSpec, FormulaExpr, FormulaSpec, KeyRule, KeySpec, Logical,
    MatchSpec, MatchingRule, NumberComparator, NumberRule, Pattern, ValueComparison,
};
pub use exec::{make_executor, Executor, FilterExecutor, FormulaExecutor, KeyExecutor, MatchExecutor};
pub use parser::{parse_filter, parse_formula, parse_key, parse_match};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutorError {
    #[error("syntax error in rule at token {at}: {message}")]
    Syntax { at: usize, message: String },

    #[error("bad regex pattern: {0}")]
    BadPattern(String),

    #[error("unknown pattern flag {0:?}")]
    BadFlag(char),

    #[error("rule cannot be applied to a {0} value")]
    BadInput(&'static str),

    #[error("{0}")]
    Variant(#[from] hvml_variant::VariantError),
}
