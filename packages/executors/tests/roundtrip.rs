//! Parse(print(ast)) == ast for every rule grammar.

use hvml_executors::*;

#[test]
fn filter_regex_with_max_and_for_kv() {
    // the E2E scenario rule: one regex matching rule, case-insensitive,
    // max-length 16, for-clause KV
    let src = "FILTER: LIKE '/^foo/i' MAX 16, FOR KV";
    let spec = parse_filter(src).unwrap();

    match &spec.rules {
        FilterRules::Matching(rules) => {
            assert_eq!(rules.len(), 1);
            match &rules[0] {
                MatchingRule::Like(Pattern::Regex { source, flags, max }) => {
                    assert_eq!(source, "^foo");
                    assert_eq!(flags, "i");
                    assert_eq!(*max, Some(16));
                }
                other => panic!("unexpected rule: {other:?}"),
            }
        }
        other => panic!("unexpected rules: {other:?}"),
    }
    assert_eq!(spec.for_clause, Some(ForClause::Kv));

    // printing reproduces the token stream, and reparsing reproduces the AST
    assert_eq!(spec.to_string(), src);
    assert_eq!(parse_filter(&spec.to_string()).unwrap(), spec);
}

#[test]
fn filter_round_trips() {
    for src in [
        "FILTER: ALL",
        "FILTER: ALL, FOR VALUE",
        "FILTER: LT 5",
        "FILTER: GE 2, LT 10, FOR KEY",
        "FILTER: LIKE 'a*', AS 'exact'",
        "FILTER: LIKE '/^x$/im' MAX 8",
    ] {
        let spec = parse_filter(src).unwrap();
        assert_eq!(parse_filter(&spec.to_string()).unwrap(), spec, "{src}");
    }
}

#[test]
fn key_round_trips() {
    for src in [
        "KEY: ALL",
        "KEY: LIKE '/^t/i', FOR KEY",
        "KEY: AS 'id', FOR VALUE",
    ] {
        let spec = parse_key(src).unwrap();
        assert_eq!(parse_key(&spec.to_string()).unwrap(), spec, "{src}");
    }
}

#[test]
fn formula_round_trips() {
    for src in [
        "FORMULA: LT 100 BY X * 2",
        "FORMULA: GE 0 AND LT 10 BY X + 1",
        "FORMULA: LT 64 OR EQ 100 BY X * X - 1",
        "FORMULA: GT 1 BY -(X) / 2",
    ] {
        let spec = parse_formula(src).unwrap();
        assert_eq!(parse_formula(&spec.to_string()).unwrap(), spec, "{src}");
    }
}

#[test]
fn match_round_trips() {
    for src in ["MATCH: EQ 5", "MATCH: LIKE '/ok/'", "MATCH: AS 'yes', FOR KV"] {
        let spec = parse_match(src).unwrap();
        assert_eq!(parse_match(&spec.to_string()).unwrap(), spec, "{src}");
    }
}
