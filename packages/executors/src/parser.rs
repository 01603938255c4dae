//! Tokenizer and recursive-descent parsers for the rule grammars.

use crate::ast::*;
use crate::ExecutorError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(f64),
    Quoted(String),
    Comma,
    Colon,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExecutorError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ExecutorError::Syntax {
                                at: tokens.len(),
                                message: "unterminated string".into(),
                            })
                        }
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                                i += 2;
                            } else {
                                i += 1;
                            }
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while matches!(chars.get(i), Some(d) if d.is_ascii_digit() || *d == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| ExecutorError::Syntax {
                    at: tokens.len(),
                    message: format!("bad number {text:?}"),
                })?;
                tokens.push(Token::Number(value));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while matches!(chars.get(i), Some(d) if d.is_ascii_alphanumeric() || *d == '_') {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            _ => {
                return Err(ExecutorError::Syntax {
                    at: tokens.len(),
                    message: format!("unexpected character {c:?}"),
                })
            }
        }
    }
    Ok(tokens)
}

struct RuleParser {
    tokens: Vec<Token>,
    idx: usize,
}

impl RuleParser {
    fn new(src: &str) -> Result<Self, ExecutorError> {
        Ok(RuleParser {
            tokens: tokenize(src)?,
            idx: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.idx).cloned();
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ExecutorError {
        ExecutorError::Syntax {
            at: self.idx,
            message: message.into(),
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(word)) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(word))
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ExecutorError> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.error(format!("expected {word}")))
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExecutorError> {
        if self.peek() == Some(&token) {
            self.idx += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}")))
        }
    }

    fn head(&mut self, name: &str) -> Result<(), ExecutorError> {
        self.expect_word(name)?;
        self.expect(Token::Colon)
    }

    fn finish(&self) -> Result<(), ExecutorError> {
        if self.idx == self.tokens.len() {
            Ok(())
        } else {
            Err(self.error("trailing tokens"))
        }
    }

    fn comparator(&mut self) -> Option<NumberComparator> {
        let comparator = match self.peek() {
            Some(Token::Word(w)) => match w.to_ascii_uppercase().as_str() {
                "LT" => NumberComparator::Lt,
                "GT" => NumberComparator::Gt,
                "LE" => NumberComparator::Le,
                "GE" => NumberComparator::Ge,
                "NE" => NumberComparator::Ne,
                "EQ" => NumberComparator::Eq,
                _ => return None,
            },
            _ => return None,
        };
        self.idx += 1;
        Some(comparator)
    }

    fn number(&mut self) -> Result<f64, ExecutorError> {
        let negative = self.peek() == Some(&Token::Minus);
        if negative {
            self.idx += 1;
        }
        match self.bump() {
            Some(Token::Number(n)) => Ok(if negative { -n } else { n }),
            _ => Err(self.error("expected a number")),
        }
    }

    fn number_rule(&mut self) -> Result<NumberRule, ExecutorError> {
        let comparator = self
            .comparator()
            .ok_or_else(|| self.error("expected a comparator"))?;
        let operand = self.number()?;
        Ok(NumberRule {
            comparator,
            operand,
        })
    }

    /// A quoted pattern, optionally `/regex/flags`, with an optional
    /// trailing `MAX n`.
    fn pattern(&mut self) -> Result<Pattern, ExecutorError> {
        let text = match self.bump() {
            Some(Token::Quoted(text)) => text,
            _ => return Err(self.error("expected a quoted pattern")),
        };

        let max = if self.eat_word("MAX") {
            Some(self.number()? as usize)
        } else {
            None
        };

        if let Some(rest) = text.strip_prefix('/') {
            if let Some(split) = rest.rfind('/') {
                let source = rest[..split].to_owned();
                let flags = rest[split + 1..].to_owned();
                for flag in flags.chars() {
                    if !"imsu".contains(flag) {
                        return Err(ExecutorError::BadFlag(flag));
                    }
                }
                return Ok(Pattern::Regex { source, flags, max });
            }
        }
        Ok(Pattern::Literal { text, max })
    }

    fn quoted(&mut self) -> Result<String, ExecutorError> {
        match self.bump() {
            Some(Token::Quoted(text)) => Ok(text),
            _ => Err(self.error("expected a quoted literal")),
        }
    }

    fn for_clause(&mut self) -> Result<Option<ForClause>, ExecutorError> {
        if !self.eat_word("FOR") {
            return Ok(None);
        }
        if self.eat_word("KV") {
            Ok(Some(ForClause::Kv))
        } else if self.eat_word("KEY") {
            Ok(Some(ForClause::Key))
        } else if self.eat_word("VALUE") {
            Ok(Some(ForClause::Value))
        } else {
            Err(self.error("expected KV, KEY or VALUE"))
        }
    }

    /// Consume a rule-separating comma; the comma before FOR belongs to
    /// the for-clause, so peek past it.
    fn rule_separator(&mut self) -> bool {
        if self.peek() == Some(&Token::Comma) {
            if matches!(self.tokens.get(self.idx + 1), Some(Token::Word(w)) if w.eq_ignore_ascii_case("FOR"))
            {
                self.idx += 1; // comma; FOR stays for for_clause()
                return false;
            }
            self.idx += 1;
            return true;
        }
        false
    }

    // --------------------------------------------------------- formulas

    fn logical(&mut self) -> Result<Logical, ExecutorError> {
        let mut lhs = self.logical_and()?;
        while self.eat_word("OR") {
            let rhs = self.logical_and()?;
            lhs = Logical::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<Logical, ExecutorError> {
        let mut lhs = self.logical_term()?;
        while self.eat_word("AND") {
            let rhs = self.logical_term()?;
            lhs = Logical::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn logical_term(&mut self) -> Result<Logical, ExecutorError> {
        if self.peek() == Some(&Token::LParen) {
            self.idx += 1;
            let inner = self.logical()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        Ok(Logical::Cmp(self.number_rule()?))
    }

    fn formula_expr(&mut self) -> Result<FormulaExpr, ExecutorError> {
        let mut lhs = self.formula_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.idx += 1;
                    let rhs = self.formula_term()?;
                    lhs = FormulaExpr::Add(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.idx += 1;
                    let rhs = self.formula_term()?;
                    lhs = FormulaExpr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn formula_term(&mut self) -> Result<FormulaExpr, ExecutorError> {
        let mut lhs = self.formula_factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.idx += 1;
                    let rhs = self.formula_factor()?;
                    lhs = FormulaExpr::Mul(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.idx += 1;
                    let rhs = self.formula_factor()?;
                    lhs = FormulaExpr::Div(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn formula_factor(&mut self) -> Result<FormulaExpr, ExecutorError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.idx += 1;
                let inner = self.formula_factor()?;
                Ok(FormulaExpr::Neg(Box::new(inner)))
            }
            Some(Token::LParen) => {
                self.idx += 1;
                let inner = self.formula_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Number(n)) => {
                let n = *n;
                self.idx += 1;
                Ok(FormulaExpr::Number(n))
            }
            Some(Token::Word(name)) => {
                let name = name.clone();
                self.idx += 1;
                Ok(FormulaExpr::Variable(name))
            }
            _ => Err(self.error("expected a formula term")),
        }
    }
}

/// `FILTER: (ALL | number-rules | matching-rules) [, FOR clause]`
pub fn parse_filter(src: &str) -> Result<FilterSpec, ExecutorError> {
    let mut p = RuleParser::new(src)?;
    p.head("FILTER")?;

    let rules = if p.eat_word("ALL") {
        FilterRules::All
    } else if p.peek_word("LIKE") || p.peek_word("AS") {
        let mut rules = Vec::new();
        loop {
            if p.eat_word("LIKE") {
                rules.push(MatchingRule::Like(p.pattern()?));
            } else if p.eat_word("AS") {
                rules.push(MatchingRule::As(p.quoted()?));
            } else {
                return Err(p.error("expected LIKE or AS"));
            }
            if !p.rule_separator() {
                break;
            }
        }
        FilterRules::Matching(rules)
    } else {
        let mut rules = Vec::new();
        loop {
            rules.push(p.number_rule()?);
            if !p.rule_separator() {
                break;
            }
        }
        FilterRules::Numbers(rules)
    };

    let for_clause = p.for_clause()?;
    p.finish()?;
    Ok(FilterSpec { rules, for_clause })
}

/// `KEY: (ALL | LIKE pattern | AS literal) [, FOR clause]`
pub fn parse_key(src: &str) -> Result<KeySpec, ExecutorError> {
    let mut p = RuleParser::new(src)?;
    p.head("KEY")?;

    let rule = if p.eat_word("ALL") {
        KeyRule::All
    } else if p.eat_word("LIKE") {
        KeyRule::Like(p.pattern()?)
    } else if p.eat_word("AS") {
        KeyRule::As(p.quoted()?)
    } else {
        return Err(p.error("expected ALL, LIKE or AS"));
    };

    // tolerate the comma before FOR
    p.rule_separator();
    let for_clause = p.for_clause()?;
    p.finish()?;
    Ok(KeySpec { rule, for_clause })
}

/// `FORMULA: condition BY expression`
pub fn parse_formula(src: &str) -> Result<FormulaSpec, ExecutorError> {
    let mut p = RuleParser::new(src)?;
    p.head("FORMULA")?;
    let condition = p.logical()?;
    p.expect_word("BY")?;
    let by = p.formula_expr()?;
    p.finish()?;
    Ok(FormulaSpec { condition, by })
}

/// `MATCH: value-comparison [, FOR clause]`
pub fn parse_match(src: &str) -> Result<MatchSpec, ExecutorError> {
    let mut p = RuleParser::new(src)?;
    p.head("MATCH")?;

    let comparison = if p.eat_word("LIKE") {
        ValueComparison::Like(p.pattern()?)
    } else if p.eat_word("AS") {
        ValueComparison::As(p.quoted()?)
    } else {
        ValueComparison::Number(p.number_rule()?)
    };

    p.rule_separator();
    let for_clause = p.for_clause()?;
    p.finish()?;
    Ok(MatchSpec {
        comparison,
        for_clause,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_regex_rule_with_max_and_for() {
        let spec = parse_filter("FILTER: LIKE '/^foo/i' MAX 16, FOR KV").unwrap();
        assert_eq!(
            spec,
            FilterSpec {
                rules: FilterRules::Matching(vec![MatchingRule::Like(Pattern::Regex {
                    source: "^foo".into(),
                    flags: "i".into(),
                    max: Some(16),
                })]),
                for_clause: Some(ForClause::Kv),
            }
        );
    }

    #[test]
    fn filter_number_rules() {
        let spec = parse_filter("FILTER: GE 2, LT 10").unwrap();
        match spec.rules {
            FilterRules::Numbers(rules) => {
                assert_eq!(rules.len(), 2);
                assert_eq!(rules[0].comparator, NumberComparator::Ge);
                assert_eq!(rules[1].operand, 10.0);
            }
            other => panic!("unexpected rules: {other:?}"),
        }
    }

    #[test]
    fn bad_flag_is_rejected() {
        assert_eq!(
            parse_filter("FILTER: LIKE '/x/q'").unwrap_err(),
            ExecutorError::BadFlag('q')
        );
    }

    #[test]
    fn formula_precedence() {
        let spec = parse_formula("FORMULA: LT 100 BY X * 2 + 1").unwrap();
        assert_eq!(
            spec.by,
            FormulaExpr::Add(
                Box::new(FormulaExpr::Mul(
                    Box::new(FormulaExpr::Variable("X".into())),
                    Box::new(FormulaExpr::Number(2.0)),
                )),
                Box::new(FormulaExpr::Number(1.0)),
            )
        );
    }

    #[test]
    fn match_with_for_clause() {
        let spec = parse_match("MATCH: AS 'yes', FOR VALUE").unwrap();
        assert_eq!(spec.comparison, ValueComparison::As("yes".into()));
        assert_eq!(spec.for_clause, Some(ForClause::Value));
    }
}
