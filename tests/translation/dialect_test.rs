use aggsql::{
    translate_json, Dialect, OracleConfiguration, SqlDialect, TranslateError,
    TranslationCapability, TranslationOptions,
};
use serde_json::{json, Value};

fn run(dialect: Dialect, pipeline: Value) -> Result<aggsql::TranslationResult, TranslateError> {
    translate_json(
        &pipeline,
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default().with_dialect(dialect),
    )
}

#[test]
fn test_dialect_names() {
    assert_eq!(Dialect::Oracle19c.name(), "oracle19c");
    assert_eq!(Dialect::Oracle23ai.to_string(), "oracle23ai");
    assert_eq!(Dialect::default(), Dialect::Oracle26ai);
    assert_eq!("oracle19c".parse::<Dialect>().unwrap(), Dialect::Oracle19c);
}

#[test]
fn test_bind_placeholders_are_positional() {
    for dialect in [Dialect::Oracle19c, Dialect::Oracle23ai, Dialect::Oracle26ai] {
        assert_eq!(dialect.bind_placeholder(3), ":3");
    }
}

#[test]
fn test_booleans_per_release() {
    let pipeline = json!([{"$match": {"active": true}}]);

    let sql = run(Dialect::Oracle26ai, pipeline.clone()).unwrap().sql;
    assert!(sql.contains("base.data.active.boolean() = TRUE"));

    let sql = run(Dialect::Oracle19c, pipeline).unwrap().sql;
    assert!(sql.contains("base.data.active.string() = 'true'"));
}

#[test]
fn test_add_fields_without_json_transform_merges_patch() {
    let pipeline = json!([{"$addFields": {"n": {"$add": ["$a", 1]}}}]);

    let sql = run(Dialect::Oracle26ai, pipeline.clone()).unwrap().sql;
    assert!(sql.contains("JSON_TRANSFORM(base.data, SET '$.n' = "));

    let sql = run(Dialect::Oracle19c, pipeline).unwrap().sql;
    assert!(sql.contains("JSON_MERGEPATCH(base.data, "));
    assert!(!sql.contains("JSON_TRANSFORM"));
}

#[test]
fn test_unset_needs_json_transform() {
    let pipeline = json!([{"$unset": "secret"}]);

    let sql = run(Dialect::Oracle23ai, pipeline.clone()).unwrap().sql;
    assert!(sql.contains("REMOVE '$.secret'"));

    let err = run(Dialect::Oracle19c, pipeline).unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedFeature { .. }));
}

#[test]
fn test_sort_on_19c_does_not_order_by_json_type() {
    let sql = run(Dialect::Oracle19c, json!([{"$sort": {"score": -1}}])).unwrap().sql;
    assert!(sql.contains("ORDER BY "));
    assert!(sql.ends_with("DESC NULLS LAST"));
    assert!(!sql.contains("base.data.score DESC"));
}

#[test]
fn test_strict_mode_rejects_partial_translations() {
    let options = TranslationOptions::default().with_strict(true);
    let err = translate_json(
        &json!([{"$out": "archive"}]),
        &OracleConfiguration::new("orders"),
        &options,
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedFeature { ref feature, .. } if feature == "$out"));
}

#[test]
fn test_strict_mode_accepts_emulations() {
    let options = TranslationOptions::default().with_strict(true);
    let result = translate_json(
        &json!([{"$group": {"_id": "$k", "tags": {"$addToSet": "$tag"}}}]),
        &OracleConfiguration::new("orders"),
        &options,
    )
    .unwrap();
    assert_eq!(result.capability, TranslationCapability::Emulated);
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_pretty_output_breaks_lines() {
    let pipeline = json!([{"$match": {"status": "a"}}, {"$sort": {"qty": 1}}]);
    let options = TranslationOptions::default().with_pretty(true);
    let pretty = translate_json(&pipeline, &OracleConfiguration::new("orders"), &options).unwrap();
    let compact = translate_json(
        &pipeline,
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default(),
    )
    .unwrap();

    assert!(pretty.sql.contains('\n'));
    assert!(!compact.sql.contains('\n'));
    assert_eq!(pretty.binds, compact.binds);
}

#[test]
fn test_result_reports_dialect() {
    let result = run(Dialect::Oracle23ai, json!([])).unwrap();
    assert_eq!(result.dialect, Dialect::Oracle23ai);
}
