//! Integration tests for the read-only safety gate.
//!
//! These tests verify that mutating statements are rejected however they are
//! spelled, and that row bounding is applied exactly once.

use erp_query_agent::error::AgentError;
use erp_query_agent::safety::{FORBIDDEN_KEYWORDS, QueryGate, bound, validate};
use rand::Rng;

/// Randomly flip the case of each letter.
fn mix_case(text: &str, rng: &mut impl Rng) -> String {
    text.chars()
        .map(|c| {
            if rng.gen_bool(0.5) {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

/// Test that every forbidden keyword is rejected in any case mix.
#[test]
fn test_forbidden_keywords_rejected_in_any_case() {
    let mut rng = rand::thread_rng();

    for keyword in FORBIDDEN_KEYWORDS {
        for _ in 0..25 {
            let spelled = mix_case(keyword, &mut rng);
            let sql = format!("SELECT * FROM sale_order; {} something", spelled);

            let err = validate(&sql).unwrap_err();
            assert!(
                matches!(err, AgentError::ForbiddenOperation { .. }),
                "{} should be rejected, got: {:?}",
                sql,
                err
            );
        }
    }
}

/// Test that a keyword buried in an identifier or comment still rejects.
#[test]
fn test_forbidden_keyword_anywhere_rejects() {
    for sql in [
        "SELECT write_date, create_uid FROM res_partner",
        "SELECT 1 -- drop me",
        "WITH updated AS (SELECT 1) SELECT * FROM updated",
        "select * from account_move where ref = 'Insert Coin'",
    ] {
        assert!(
            matches!(validate(sql), Err(AgentError::ForbiddenOperation { .. })),
            "{} should be rejected",
            sql
        );
    }
}

/// Test that statements not starting with SELECT or WITH are rejected.
#[test]
fn test_non_read_only_prefix_rejected() {
    for sql in [
        "EXPLAIN SELECT * FROM sale_order",
        "VACUUM sale_order",
        "COPY res_partner TO STDOUT",
        "(SELECT 1)",
        "SET statement_timeout = 0",
        "",
    ] {
        let err = validate(sql).unwrap_err();
        assert!(
            matches!(err, AgentError::NotReadOnly),
            "{:?} should be NotReadOnly, got: {:?}",
            sql,
            err
        );
    }
}

/// Test that read-only prefixes are accepted in any case and after whitespace.
#[test]
fn test_read_only_prefix_accepted_in_any_case() {
    let mut rng = rand::thread_rng();

    for _ in 0..25 {
        let select = format!("  \n{} name FROM res_partner", mix_case("select", &mut rng));
        assert!(validate(&select).is_ok(), "{} should pass", select);

        let with = format!(
            "{} t AS (SELECT 1 AS x) SELECT x FROM t",
            mix_case("with", &mut rng)
        );
        assert!(validate(&with).is_ok(), "{} should pass", with);
    }
}

/// Test that bound appends exactly one limit and keeps the terminator.
#[test]
fn test_bound_appends_single_limit() {
    for (sql, expected) in [
        ("SELECT * FROM sale_order", "SELECT * FROM sale_order\nLIMIT 100;"),
        ("SELECT * FROM sale_order;", "SELECT * FROM sale_order\nLIMIT 100;"),
        ("SELECT * FROM sale_order ;\n\n", "SELECT * FROM sale_order\nLIMIT 100;"),
    ] {
        let bounded = bound(sql, 100);
        assert_eq!(bounded, expected);
        assert_eq!(bounded.to_uppercase().matches("LIMIT").count(), 1);
        assert!(bounded.ends_with(';'));
    }
}

/// Test that repeated terminators still produce a single runnable statement.
#[test]
fn test_bound_drops_every_trailing_terminator() {
    let gate = QueryGate::new(10);
    let query = gate.validate_and_bound("SELECT 1 AS x;;").unwrap();
    assert_eq!(query.as_str(), "SELECT 1 AS x\nLIMIT 10;");
    assert_eq!(query.as_str().matches(';').count(), 1);
}

/// Test that a column named like a limit does not suppress bounding.
#[test]
fn test_bound_applies_to_credit_limit_column() {
    let sql = "SELECT g AS credit_limit FROM generate_series(1, 500) g";
    let bounded = bound(sql, 100);
    assert_eq!(bounded, format!("{}\nLIMIT 100;", sql));
    assert_eq!(bound(&bounded, 100), bounded);
}

/// Test that bound leaves already limited text alone, and is idempotent.
#[test]
fn test_bound_is_idempotent() {
    let limited = "SELECT name FROM res_partner ORDER BY name LIMIT 5";
    assert_eq!(bound(limited, 100), limited);
    assert_eq!(bound(&bound(limited, 100), 100), limited);

    let unlimited = "SELECT name FROM res_partner";
    let once = bound(unlimited, 100);
    assert_eq!(bound(&once, 100), once);
    assert_eq!(bound(&once, 7), once);
}

/// Test the full gate with a randomized limit.
#[test]
fn test_gate_uses_configured_limit() {
    let limit: u32 = rand::thread_rng().gen_range(1..10_000);
    let gate = QueryGate::new(limit);

    let query = gate
        .validate_and_bound("SELECT id FROM stock_picking;")
        .unwrap();
    assert_eq!(
        query.as_str(),
        format!("SELECT id FROM stock_picking\nLIMIT {};", limit)
    );
}

/// Test that strict parsing only adds rejections.
#[test]
fn test_strict_gate_never_accepts_what_lexical_rejects() {
    let gate = QueryGate::new(100).with_strict_parsing(true);

    assert!(matches!(
        gate.validate_and_bound("DROP TABLE sale_order"),
        Err(AgentError::ForbiddenOperation { .. })
    ));
    assert!(matches!(
        gate.validate_and_bound("SELECT 1; SELECT 2"),
        Err(AgentError::NotReadOnly)
    ));
    assert!(gate.validate_and_bound("SELECT name FROM res_partner").is_ok());
}
