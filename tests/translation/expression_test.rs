use aggsql::{
    parse_expression, parse_filter, translate_json, Literal, OracleConfiguration, TranslateError,
    TranslationOptions,
};
use serde_json::{json, Value};

fn translate(pipeline: Value) -> aggsql::TranslationResult {
    translate_json(
        &pipeline,
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default(),
    )
    .unwrap()
}

fn project(expr: Value) -> String {
    translate(json!([{"$project": {"out": expr}}])).sql
}

#[test]
fn test_equality_with_null_is_null_check() {
    let result = translate(json!([{"$match": {"f": null}}]));
    assert!(result.sql.ends_with("WHERE base.data.f.string() IS NULL"));
    assert!(result.binds.is_empty());

    let result = translate(json!([{"$match": {"f": {"$ne": null}}}]));
    assert!(result.sql.ends_with("WHERE base.data.f.string() IS NOT NULL"));
}

#[test]
fn test_comparison_type_follows_literal() {
    let result = translate(json!([{"$match": {"qty": {"$gt": 5}}}]));
    assert!(result.sql.contains("base.data.qty.number() > :1"));
    assert_eq!(result.binds, vec![Literal::Int(5)]);

    let result = translate(json!([{"$match": {"status": {"$gte": "b"}}}]));
    assert!(result.sql.contains("base.data.status.string() >= :1"));
}

#[test]
fn test_in_list_keeps_value_order() {
    let result = translate(json!([{"$match": {"status": {"$in": ["b", "a"]}}}]));
    assert!(result.sql.contains("base.data.status.string() IN (:1, :2)"));
    assert_eq!(
        result.binds,
        vec![Literal::String("b".into()), Literal::String("a".into())]
    );
}

#[test]
fn test_empty_in_list_is_structural() {
    let err = parse_filter(&json!({"status": {"$in": []}})).unwrap_err();
    assert!(matches!(err, TranslateError::Structural(_)));
}

#[test]
fn test_array_elem_at_counts_from_end() {
    let sql = project(json!({"$arrayElemAt": ["$items", -1]}));
    assert!(sql.contains("JSON_VALUE(base.data, '$.items[last]')"));

    let sql = project(json!({"$arrayElemAt": ["$items", -2]}));
    assert!(sql.contains("JSON_VALUE(base.data, '$.items[last-1]')"));

    let sql = project(json!({"$arrayElemAt": ["$items", 0]}));
    assert!(sql.contains("JSON_VALUE(base.data, '$.items[0]')"));
}

#[test]
fn test_slice_becomes_path_range() {
    let sql = project(json!({"$slice": ["$items", -3]}));
    assert!(sql.contains("JSON_QUERY(base.data, '$.items[last-2 to last]' WITH ARRAY WRAPPER)"));

    let sql = project(json!({"$slice": ["$items", 3]}));
    assert!(sql.contains("'$.items[0 to 2]'"));

    let sql = project(json!({"$slice": ["$items", 2, 3]}));
    assert!(sql.contains("'$.items[2 to 4]'"));
}

#[test]
fn test_logical_operators() {
    let result = translate(json!([{"$match": {"$nor": [{"a": 1}, {"b": {"$lt": 2}}]}}]));
    assert!(result
        .sql
        .contains("NOT (base.data.a.number() = :1 OR base.data.b.number() < :2)"));
    assert_eq!(result.binds, vec![Literal::Int(1), Literal::Int(2)]);
}

#[test]
fn test_exists_filter() {
    let result = translate(json!([{"$match": {"email": {"$exists": false}}}]));
    assert!(result.sql.contains("NOT JSON_EXISTS(base.data, '$.email')"));
}

#[test]
fn test_arithmetic_in_projection() {
    let sql = project(json!({"$add": ["$a", 2]}));
    assert!(sql.contains("(base.data.a.number() + :1)"));

    let sql = project(json!({"$log10": "$a"}));
    assert!(sql.contains("LOG(10, base.data.a.number())"));
}

#[test]
fn test_expr_filter_compares_fields() {
    let result = translate(json!([{"$match": {"$expr": {"$gt": ["$spent", "$budget"]}}}]));
    assert!(result.sql.contains("WHERE"));
    assert!(result.sql.contains("spent"));
    assert!(result.sql.contains("budget"));
}

#[test]
fn test_unknown_operator() {
    let err = parse_expression(&json!({"$frobnicate": [1, 2]})).unwrap_err();
    assert!(matches!(err, TranslateError::UnknownOperator(ref op) if op == "$frobnicate"));

    let err = translate_json(
        &json!([{"$project": {"x": {"$frobnicate": "$a"}}}]),
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::UnknownOperator(_)));
}

#[test]
fn test_unsafe_field_name_is_rejected() {
    let err = parse_expression(&json!("$a'||'b")).unwrap_err();
    assert!(matches!(err, TranslateError::Validation(_)));
}

#[test]
fn test_inline_binds_escape_quotes() {
    let result = translate_json(
        &json!([{"$match": {"name": "O'Brien"}}]),
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default().with_inline_binds(true),
    )
    .unwrap();
    assert!(result.sql.contains("'O''Brien'"));
    assert!(result.binds.is_empty());
}
