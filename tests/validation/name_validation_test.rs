use aggsql::validation::{
    is_valid_field_name, is_valid_table_name, validate_field_name, validate_table_name,
    INVALID_FIELD, INVALID_TABLE,
};
use aggsql::{parse_filter, parse_stage, Expression, TranslateError};
use serde_json::json;

fn issue_code(err: TranslateError) -> String {
    match err {
        TranslateError::Validation(issues) => {
            assert_eq!(issues.len(), 1);
            issues[0].code.clone()
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_accepts_ordinary_paths() {
    for name in ["status", "_id", "customer.address.city", "items.0.sku", "a_1.b_2"] {
        assert!(is_valid_field_name(name), "{} should be valid", name);
    }
}

#[test]
fn test_rejects_injection_attempts() {
    for name in [
        "",
        "a b",
        "a..b",
        ".a",
        "a.",
        "x'||'y",
        "a;drop",
        "a\"b",
        "0.sku",
        "$where",
    ] {
        assert!(!is_valid_field_name(name), "{:?} should be rejected", name);
    }
}

#[test]
fn test_field_length_limit() {
    assert!(is_valid_field_name(&"a".repeat(128)));
    assert!(!is_valid_field_name(&"a".repeat(129)));
}

#[test]
fn test_error_codes() {
    assert_eq!(issue_code(validate_field_name("bad name").unwrap_err()), INVALID_FIELD);
    assert_eq!(issue_code(validate_table_name("bad-table").unwrap_err()), INVALID_TABLE);
    assert!(validate_table_name("orders").is_ok());
}

#[test]
fn test_table_names() {
    assert!(is_valid_table_name("orders"));
    assert!(is_valid_table_name("ORDERS_2024"));
    assert!(!is_valid_table_name("2024_orders"));
    assert!(!is_valid_table_name("orders.items"));
    assert!(!is_valid_table_name(&format!("t{}", "x".repeat(128))));
}

#[test]
fn test_error_message_is_sanitized() {
    let err = validate_field_name("bad\nname").unwrap_err();
    let message = err.to_string();
    assert!(!message.contains('\n'));
    assert!(message.contains("bad?name"));
}

#[test]
fn test_constructors_check_names() {
    assert!(matches!(
        Expression::field("ok.path"),
        Ok(Expression::FieldPath(_))
    ));
    assert!(matches!(Expression::field("no way"), Err(TranslateError::Validation(_))));
    assert!(matches!(
        parse_filter(&json!({"bad key": 1})),
        Err(TranslateError::Validation(_))
    ));
    assert!(matches!(
        parse_stage(&json!({"$lookup": {"from": "inv; --", "localField": "a", "foreignField": "b", "as": "c"}})),
        Err(TranslateError::Validation(_))
    ));
}
