//! ASTs for the four rule grammars, with canonical printing.
//!
//! Printing is the round-trip anchor: `parse(print(ast)) == ast` for every
//! grammar. Nested formula expressions print fully parenthesized so the
//! reparse cannot re-associate them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForClause {
    Kv,
    Key,
    Value,
}

impl fmt::Display for ForClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ForClause::Kv => "KV",
            ForClause::Key => "KEY",
            ForClause::Value => "VALUE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberComparator {
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Eq,
}

impl fmt::Display for NumberComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NumberComparator::Lt => "LT",
            NumberComparator::Gt => "GT",
            NumberComparator::Le => "LE",
            NumberComparator::Ge => "GE",
            NumberComparator::Ne => "NE",
            NumberComparator::Eq => "EQ",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberRule {
    pub comparator: NumberComparator,
    pub operand: f64,
}

impl fmt::Display for NumberRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.comparator, format_number(self.operand))
    }
}

/// A LIKE pattern: a literal wildcard string or a `/regex/flags` form,
/// either optionally bounded by `MAX n` (compare at most n characters).
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Literal { text: String, max: Option<usize> },
    Regex {
        source: String,
        flags: String,
        max: Option<usize>,
    },
}

impl Pattern {
    pub fn max(&self) -> Option<usize> {
        match self {
            Pattern::Literal { max, .. } | Pattern::Regex { max, .. } => *max,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal { text, max } => {
                write!(f, "'{text}'")?;
                if let Some(max) = max {
                    write!(f, " MAX {max}")?;
                }
                Ok(())
            }
            Pattern::Regex { source, flags, max } => {
                write!(f, "'/{source}/{flags}'")?;
                if let Some(max) = max {
                    write!(f, " MAX {max}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchingRule {
    Like(Pattern),
    As(String),
}

impl fmt::Display for MatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingRule::Like(pattern) => write!(f, "LIKE {pattern}"),
            MatchingRule::As(literal) => write!(f, "AS '{literal}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterRules {
    All,
    Numbers(Vec<NumberRule>),
    Matching(Vec<MatchingRule>),
}

/// `FILTER: (ALL | number-rules | matching-rules) [, FOR for-clause]`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub rules: FilterRules,
    pub for_clause: Option<ForClause>,
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FILTER: ")?;
        match &self.rules {
            FilterRules::All => f.write_str("ALL")?,
            FilterRules::Numbers(rules) => write_joined(f, rules)?,
            FilterRules::Matching(rules) => write_joined(f, rules)?,
        }
        if let Some(clause) = &self.for_clause {
            write!(f, ", FOR {clause}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyRule {
    All,
    Like(Pattern),
    As(String),
}

/// `KEY: (ALL | LIKE pattern | AS literal) [, FOR for-clause]`
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    pub rule: KeyRule,
    pub for_clause: Option<ForClause>,
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KEY: ")?;
        match &self.rule {
            KeyRule::All => f.write_str("ALL")?,
            KeyRule::Like(pattern) => write!(f, "LIKE {pattern}")?,
            KeyRule::As(literal) => write!(f, "AS '{literal}'")?,
        }
        if let Some(clause) = &self.for_clause {
            write!(f, ", FOR {clause}")?;
        }
        Ok(())
    }
}

/// AND/OR tree over number comparisons of the iteration variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Logical {
    Cmp(NumberRule),
    And(Box<Logical>, Box<Logical>),
    Or(Box<Logical>, Box<Logical>),
}

impl fmt::Display for Logical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logical::Cmp(rule) => write!(f, "{rule}"),
            Logical::And(lhs, rhs) => write!(f, "({lhs} AND {rhs})"),
            Logical::Or(lhs, rhs) => write!(f, "({lhs} OR {rhs})"),
        }
    }
}

/// Arithmetic over the iteration variable.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    Number(f64),
    Variable(String),
    Neg(Box<FormulaExpr>),
    Add(Box<FormulaExpr>, Box<FormulaExpr>),
    Sub(Box<FormulaExpr>, Box<FormulaExpr>),
    Mul(Box<FormulaExpr>, Box<FormulaExpr>),
    Div(Box<FormulaExpr>, Box<FormulaExpr>),
}

impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaExpr::Number(n) => f.write_str(&format_number(*n)),
            FormulaExpr::Variable(name) => f.write_str(name),
            FormulaExpr::Neg(inner) => write!(f, "-({inner})"),
            FormulaExpr::Add(lhs, rhs) => write!(f, "({lhs} + {rhs})"),
            FormulaExpr::Sub(lhs, rhs) => write!(f, "({lhs} - {rhs})"),
            FormulaExpr::Mul(lhs, rhs) => write!(f, "({lhs} * {rhs})"),
            FormulaExpr::Div(lhs, rhs) => write!(f, "({lhs} / {rhs})"),
        }
    }
}

/// `FORMULA: condition BY expression`
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaSpec {
    pub condition: Logical,
    pub by: FormulaExpr,
}

impl fmt::Display for FormulaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FORMULA: {} BY {}", self.condition, self.by)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueComparison {
    Number(NumberRule),
    Like(Pattern),
    As(String),
}

impl fmt::Display for ValueComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueComparison::Number(rule) => write!(f, "{rule}"),
            ValueComparison::Like(pattern) => write!(f, "LIKE {pattern}"),
            ValueComparison::As(literal) => write!(f, "AS '{literal}'"),
        }
    }
}

/// `MATCH: value-comparison [, FOR for-clause]`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSpec {
    pub comparison: ValueComparison,
    pub for_clause: Option<ForClause>,
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MATCH: {}", self.comparison)?;
        if let Some(clause) = &self.for_clause {
            write!(f, ", FOR {clause}")?;
        }
        Ok(())
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Numbers print without a trailing `.0` when integral, so printed rules
/// tokenize the way they were written.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
