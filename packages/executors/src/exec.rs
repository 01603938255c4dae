//! Executor implementations over parsed rule specs.
//!
//! The interpreter drives these through the [`Executor`] trait: `choose`
//! picks the matching portion of the input, `iterate` yields the items an
//! iterating tag visits, `reduce` aggregates. Construction compiles any
//! regex patterns once; dropping the executor releases them.

use crate::ast::*;
use crate::parser::{parse_filter, parse_formula, parse_key, parse_match};
use crate::ExecutorError;
use hvml_variant::Variant;
use regex::Regex;

/// Iteration guard for runaway formulas.
const MAX_FORMULA_STEPS: usize = 100_000;

pub trait Executor {
    /// Select the matching portion of `input`.
    fn choose(&self, input: &Variant) -> Result<Variant, ExecutorError>;

    /// The items an iterating tag visits, in order.
    fn iterate(&self, input: &Variant) -> Result<Vec<Variant>, ExecutorError>;

    /// Aggregate the matching items into `{count, sum, avg}`.
    fn reduce(&self, input: &Variant) -> Result<Variant, ExecutorError> {
        let items = self.iterate(input)?;
        let out = Variant::object();
        out.object_set("count", Variant::ulongint(items.len() as u64))?;
        let numbers: Vec<f64> = items.iter().filter_map(|v| v.coerce_number().ok()).collect();
        if !numbers.is_empty() {
            let sum: f64 = numbers.iter().sum();
            out.object_set("sum", Variant::number(sum))?;
            out.object_set("avg", Variant::number(sum / numbers.len() as f64))?;
        }
        Ok(out)
    }
}

/// Parse a rule string and build the matching executor. The grammar is
/// chosen by the head keyword (`FILTER:`, `KEY:`, `FORMULA:`, `MATCH:`).
pub fn make_executor(src: &str) -> Result<Box<dyn Executor>, ExecutorError> {
    let head = src
        .trim_start()
        .split([':', ' '])
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    match head.as_str() {
        "FILTER" => Ok(Box::new(FilterExecutor::new(parse_filter(src)?)?)),
        "KEY" => Ok(Box::new(KeyExecutor::new(parse_key(src)?)?)),
        "FORMULA" => Ok(Box::new(FormulaExecutor::new(parse_formula(src)?))),
        "MATCH" => Ok(Box::new(MatchExecutor::new(parse_match(src)?)?)),
        _ => Err(ExecutorError::Syntax {
            at: 0,
            message: format!("unknown rule grammar {head:?}"),
        }),
    }
}

/// A pattern with its regex compiled up front.
struct CompiledPattern {
    regex: Regex,
    max: Option<usize>,
}

impl CompiledPattern {
    fn compile(pattern: &Pattern) -> Result<Self, ExecutorError> {
        let (source, max) = match pattern {
            Pattern::Regex { source, flags, max } => {
                let mut prefix = String::new();
                for flag in flags.chars() {
                    match flag {
                        'i' => prefix.push_str("(?i)"),
                        'm' => prefix.push_str("(?m)"),
                        's' => prefix.push_str("(?s)"),
                        // unicode mode is the regex crate default
                        'u' => {}
                        other => return Err(ExecutorError::BadFlag(other)),
                    }
                }
                (format!("{prefix}{source}"), *max)
            }
            Pattern::Literal { text, max } => (wildcard_to_regex(text), *max),
        };
        let regex = Regex::new(&source)
            .map_err(|err| ExecutorError::BadPattern(err.to_string()))?;
        Ok(CompiledPattern { regex, max })
    }

    fn matches(&self, text: &str) -> bool {
        match self.max {
            Some(max) => {
                let clipped: String = text.chars().take(max).collect();
                self.regex.is_match(&clipped)
            }
            None => self.regex.is_match(text),
        }
    }
}

/// Translate a `*`/`?` wildcard literal into an anchored regex.
fn wildcard_to_regex(literal: &str) -> String {
    let mut out = String::from("^");
    for c in literal.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

enum CompiledMatching {
    Like(CompiledPattern),
    As(String),
}

impl CompiledMatching {
    fn compile(rule: &MatchingRule) -> Result<Self, ExecutorError> {
        Ok(match rule {
            MatchingRule::Like(pattern) => CompiledMatching::Like(CompiledPattern::compile(pattern)?),
            MatchingRule::As(literal) => CompiledMatching::As(literal.clone()),
        })
    }

    fn matches(&self, value: &Variant) -> bool {
        let text = value.to_string();
        match self {
            CompiledMatching::Like(pattern) => pattern.matches(&text),
            CompiledMatching::As(literal) => text == *literal,
        }
    }
}

fn number_rule_matches(rule: &NumberRule, value: &Variant) -> bool {
    let Ok(n) = value.coerce_number() else {
        return false;
    };
    compare(rule.comparator, n, rule.operand)
}

fn compare(comparator: NumberComparator, lhs: f64, rhs: f64) -> bool {
    match comparator {
        NumberComparator::Lt => lhs < rhs,
        NumberComparator::Gt => lhs > rhs,
        NumberComparator::Le => lhs <= rhs,
        NumberComparator::Ge => lhs >= rhs,
        NumberComparator::Ne => lhs != rhs,
        NumberComparator::Eq => lhs == rhs,
    }
}

/// What a for-clause tests and yields when walking an object.
fn subject_matches(
    clause: Option<ForClause>,
    key: &Variant,
    value: &Variant,
    test: &dyn Fn(&Variant) -> bool,
) -> bool {
    match clause.unwrap_or(ForClause::Value) {
        ForClause::Key => test(key),
        ForClause::Value => test(value),
        ForClause::Kv => test(key) || test(value),
    }
}

// ------------------------------------------------------------------ FILTER

pub struct FilterExecutor {
    spec: FilterSpec,
    matching: Vec<CompiledMatching>,
}

impl FilterExecutor {
    pub fn new(spec: FilterSpec) -> Result<Self, ExecutorError> {
        let matching = match &spec.rules {
            FilterRules::Matching(rules) => rules
                .iter()
                .map(CompiledMatching::compile)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        Ok(FilterExecutor { spec, matching })
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    fn test(&self, value: &Variant) -> bool {
        match &self.spec.rules {
            FilterRules::All => true,
            FilterRules::Numbers(rules) => rules.iter().all(|r| number_rule_matches(r, value)),
            FilterRules::Matching(_) => self.matching.iter().any(|r| r.matches(value)),
        }
    }

    fn select(&self, input: &Variant) -> Vec<Variant> {
        if input.kind_name() == "object" {
            let clause = self.spec.for_clause;
            let mut out = Vec::new();
            for key in input.object_keys() {
                let value = input.object_get(&key).unwrap_or_else(Variant::undefined);
                let key_v = Variant::string(key);
                if subject_matches(clause, &key_v, &value, &|v| self.test(v)) {
                    match clause.unwrap_or(ForClause::Value) {
                        ForClause::Key => out.push(key_v.clone()),
                        ForClause::Value => out.push(value),
                        ForClause::Kv => {
                            out.push(Variant::object_with([("k", key_v.clone()), ("v", value)]))
                        }
                    }
                }
            }
            out
        } else {
            input.members().into_iter().filter(|m| self.test(m)).collect()
        }
    }
}

impl Executor for FilterExecutor {
    fn choose(&self, input: &Variant) -> Result<Variant, ExecutorError> {
        Ok(Variant::array(self.select(input)))
    }

    fn iterate(&self, input: &Variant) -> Result<Vec<Variant>, ExecutorError> {
        Ok(self.select(input))
    }
}

// --------------------------------------------------------------------- KEY

pub struct KeyExecutor {
    spec: KeySpec,
    pattern: Option<CompiledPattern>,
}

impl KeyExecutor {
    pub fn new(spec: KeySpec) -> Result<Self, ExecutorError> {
        let pattern = match &spec.rule {
            KeyRule::Like(pattern) => Some(CompiledPattern::compile(pattern)?),
            _ => None,
        };
        Ok(KeyExecutor { spec, pattern })
    }

    fn key_matches(&self, key: &str) -> bool {
        match &self.spec.rule {
            KeyRule::All => true,
            KeyRule::Like(_) => self.pattern.as_ref().map(|p| p.matches(key)).unwrap_or(false),
            KeyRule::As(literal) => key == literal,
        }
    }

    fn select(&self, input: &Variant) -> Vec<(String, Variant)> {
        input
            .object_keys()
            .into_iter()
            .filter(|k| self.key_matches(k))
            .map(|k| {
                let v = input.object_get(&k).unwrap_or_else(Variant::undefined);
                (k, v)
            })
            .collect()
    }
}

impl Executor for KeyExecutor {
    fn choose(&self, input: &Variant) -> Result<Variant, ExecutorError> {
        // KEY selects by key; the result shape follows the for-clause
        let selected = self.select(input);
        match self.spec.for_clause.unwrap_or(ForClause::Kv) {
            ForClause::Key => Ok(Variant::array(
                selected.into_iter().map(|(k, _)| Variant::string(k)).collect(),
            )),
            ForClause::Value => Ok(Variant::array(
                selected.into_iter().map(|(_, v)| v).collect(),
            )),
            ForClause::Kv => Ok(Variant::object_with(selected)),
        }
    }

    fn iterate(&self, input: &Variant) -> Result<Vec<Variant>, ExecutorError> {
        Ok(match self.spec.for_clause.unwrap_or(ForClause::Value) {
            ForClause::Key => self
                .select(input)
                .into_iter()
                .map(|(k, _)| Variant::string(k))
                .collect(),
            _ => self.select(input).into_iter().map(|(_, v)| v).collect(),
        })
    }
}

// ----------------------------------------------------------------- FORMULA

pub struct FormulaExecutor {
    spec: FormulaSpec,
}

impl FormulaExecutor {
    pub fn new(spec: FormulaSpec) -> Self {
        FormulaExecutor { spec }
    }

    fn condition_holds(&self, x: f64) -> bool {
        eval_logical(&self.spec.condition, x)
    }

    fn step(&self, x: f64) -> f64 {
        eval_formula(&self.spec.by, x)
    }
}

fn eval_logical(node: &Logical, x: f64) -> bool {
    match node {
        Logical::Cmp(rule) => compare(rule.comparator, x, rule.operand),
        Logical::And(lhs, rhs) => eval_logical(lhs, x) && eval_logical(rhs, x),
        Logical::Or(lhs, rhs) => eval_logical(lhs, x) || eval_logical(rhs, x),
    }
}

fn eval_formula(node: &FormulaExpr, x: f64) -> f64 {
    match node {
        FormulaExpr::Number(n) => *n,
        FormulaExpr::Variable(_) => x,
        FormulaExpr::Neg(inner) => -eval_formula(inner, x),
        FormulaExpr::Add(lhs, rhs) => eval_formula(lhs, x) + eval_formula(rhs, x),
        FormulaExpr::Sub(lhs, rhs) => eval_formula(lhs, x) - eval_formula(rhs, x),
        FormulaExpr::Mul(lhs, rhs) => eval_formula(lhs, x) * eval_formula(rhs, x),
        FormulaExpr::Div(lhs, rhs) => eval_formula(lhs, x) / eval_formula(rhs, x),
    }
}

impl Executor for FormulaExecutor {
    fn choose(&self, input: &Variant) -> Result<Variant, ExecutorError> {
        Ok(Variant::array(self.iterate(input)?))
    }

    /// Generate the sequence seeded by the input value: yield while the
    /// condition holds, advancing through the BY expression.
    fn iterate(&self, input: &Variant) -> Result<Vec<Variant>, ExecutorError> {
        let mut x = input.coerce_number()?;
        let mut out = Vec::new();
        while self.condition_holds(x) {
            out.push(Variant::number(x));
            x = self.step(x);
            if out.len() >= MAX_FORMULA_STEPS {
                log::warn!("formula iteration clipped at {MAX_FORMULA_STEPS} steps");
                break;
            }
        }
        Ok(out)
    }
}

// ------------------------------------------------------------------- MATCH

pub struct MatchExecutor {
    spec: MatchSpec,
    pattern: Option<CompiledPattern>,
}

impl MatchExecutor {
    pub fn new(spec: MatchSpec) -> Result<Self, ExecutorError> {
        let pattern = match &spec.comparison {
            ValueComparison::Like(pattern) => Some(CompiledPattern::compile(pattern)?),
            _ => None,
        };
        Ok(MatchExecutor { spec, pattern })
    }

    /// Whether a single value satisfies the comparison. This is what the
    /// `<match>` tag asks.
    pub fn matches(&self, value: &Variant) -> bool {
        match &self.spec.comparison {
            ValueComparison::Number(rule) => number_rule_matches(rule, value),
            ValueComparison::Like(_) => self
                .pattern
                .as_ref()
                .map(|p| p.matches(&value.to_string()))
                .unwrap_or(false),
            ValueComparison::As(literal) => value.to_string() == *literal,
        }
    }
}

impl Executor for MatchExecutor {
    fn choose(&self, input: &Variant) -> Result<Variant, ExecutorError> {
        Ok(Variant::boolean(self.matches(input)))
    }

    fn iterate(&self, input: &Variant) -> Result<Vec<Variant>, ExecutorError> {
        Ok(input
            .members()
            .into_iter()
            .filter(|m| self.matches(m))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_numbers_over_array() {
        let exec = make_executor("FILTER: GE 2, LT 10").unwrap();
        let input = Variant::array(
            [1i64, 2, 5, 10, 12]
                .into_iter()
                .map(Variant::longint)
                .collect(),
        );
        let picked = exec.iterate(&input).unwrap();
        let picked: Vec<i64> = picked.iter().map(|v| v.coerce_i64().unwrap()).collect();
        assert_eq!(picked, vec![2, 5]);
    }

    #[test]
    fn filter_like_over_object_keys() {
        let exec = make_executor("FILTER: LIKE '/^foo/i', FOR KEY").unwrap();
        let input = Variant::object_with([
            ("FooBar", Variant::longint(1)),
            ("other", Variant::longint(2)),
            ("foox", Variant::longint(3)),
        ]);
        let picked = exec.choose(&input).unwrap();
        assert_eq!(picked.array_len(), 2);
        assert_eq!(picked.array_get(0).unwrap().to_string(), "FooBar");
    }

    #[test]
    fn wildcard_literal_pattern() {
        let exec = make_executor("FILTER: LIKE 'a*c'").unwrap();
        let input = Variant::array(vec![
            Variant::string("abc"),
            Variant::string("ac"),
            Variant::string("abd"),
        ]);
        assert_eq!(exec.iterate(&input).unwrap().len(), 2);
    }

    #[test]
    fn formula_sequence() {
        let exec = make_executor("FORMULA: LT 100 BY X * 2").unwrap();
        let seq = exec.iterate(&Variant::number(3.0)).unwrap();
        let seq: Vec<f64> = seq.iter().map(|v| v.coerce_number().unwrap()).collect();
        assert_eq!(seq, vec![3.0, 6.0, 12.0, 24.0, 48.0, 96.0]);
    }

    #[test]
    fn match_executor_answers_choose() {
        let exec = make_executor("MATCH: EQ 5").unwrap();
        assert_eq!(exec.choose(&Variant::longint(5)).unwrap().as_bool(), Some(true));
        assert_eq!(exec.choose(&Variant::longint(6)).unwrap().as_bool(), Some(false));
    }

    #[test]
    fn reduce_aggregates() {
        let exec = make_executor("FILTER: ALL").unwrap();
        let input = Variant::array(vec![
            Variant::longint(2),
            Variant::longint(4),
            Variant::longint(6),
        ]);
        let out = exec.reduce(&input).unwrap();
        assert_eq!(out.object_get("count").unwrap().coerce_i64().unwrap(), 3);
        assert_eq!(out.object_get("sum").unwrap().coerce_number().unwrap(), 12.0);
        assert_eq!(out.object_get("avg").unwrap().coerce_number().unwrap(), 4.0);
    }
}
