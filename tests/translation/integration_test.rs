use aggsql::{translate_json, Literal, OracleConfiguration, TranslateError, TranslationCapability, TranslationOptions};
use serde_json::json;

fn orders() -> OracleConfiguration {
    OracleConfiguration::new("orders")
}

fn translate(pipeline: serde_json::Value) -> aggsql::TranslationResult {
    translate_json(&pipeline, &orders(), &TranslationOptions::default()).unwrap()
}

#[test]
fn test_match_then_group() {
    let result = translate(json!([
        {"$match": {"status": "active"}},
        {"$group": {"_id": "$grp", "total": {"$sum": "$value"}}}
    ]));

    insta::assert_snapshot!(result.sql, @r#"SELECT base.data.grp.string() AS "_id", NVL(SUM(base.data.value.number()), 0) AS total FROM orders base WHERE base.data.status.string() = :1 GROUP BY base.data.grp.string()"#);
    assert_eq!(result.binds, vec![Literal::String("active".into())]);
    assert!(result.warnings.is_empty());
    assert_eq!(result.capability, TranslationCapability::FullSupport);
}

#[test]
fn test_sort_then_limit_is_single_fetch() {
    let result = translate(json!([
        {"$sort": {"score": -1}},
        {"$limit": 3}
    ]));

    insta::assert_snapshot!(result.sql, @"SELECT base.data FROM orders base ORDER BY base.data.score DESC NULLS LAST FETCH FIRST 3 ROWS ONLY");
    assert!(!result.sql.contains("OFFSET"));
}

#[test]
fn test_empty_pipeline_returns_documents() {
    let result = translate(json!([]));
    insta::assert_snapshot!(result.sql, @"SELECT base.data FROM orders base");
    assert!(result.binds.is_empty());
}

#[test]
fn test_lookup_then_size_counts_matches() {
    let result = translate(json!([
        {"$lookup": {"from": "inventory", "localField": "item", "foreignField": "sku", "as": "inv"}},
        {"$project": {"c": {"$size": "$inv"}}}
    ]));

    assert!(result.sql.contains("SELECT COUNT(*) FROM inventory"));
    assert!(!result.sql.contains(".size()"));
}

#[test]
fn test_out_after_match_is_insert() {
    let result = translate(json!([
        {"$match": {"status": "done"}},
        {"$out": "archive"}
    ]));

    insta::assert_snapshot!(result.sql, @"INSERT INTO archive (data) SELECT base.data FROM orders base WHERE base.data.status.string() = :1");
    assert_eq!(result.capability, TranslationCapability::Partial);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].feature, "$out");
}

#[test]
fn test_merge_by_id() {
    let result = translate(json!([{"$merge": "totals"}]));
    insta::assert_snapshot!(result.sql, @r#"MERGE INTO totals tgt USING ( SELECT base.data FROM orders base ) src ON (tgt.id = JSON_VALUE(src.data, '$."_id"')) WHEN MATCHED THEN UPDATE SET tgt.data = JSON_MERGEPATCH(tgt.data, src.data) WHEN NOT MATCHED THEN INSERT (id, data) VALUES (JSON_VALUE(src.data, '$."_id"'), src.data)"#);
}

#[test]
fn test_pipeline_on_schema_qualified_collection() {
    let config = OracleConfiguration::new("orders").with_schema("sales");
    let result = translate_json(&json!([]), &config, &TranslationOptions::default()).unwrap();
    assert_eq!(result.sql, "SELECT base.data FROM sales.orders base");
}

#[test]
fn test_binds_are_numbered_in_text_order() {
    let result = translate(json!([
        {"$match": {"status": "active", "qty": {"$gt": 5}}}
    ]));

    let first = result.sql.find(":1").unwrap();
    let second = result.sql.find(":2").unwrap();
    assert!(first < second);
    assert_eq!(
        result.binds,
        vec![Literal::String("active".into()), Literal::Int(5)]
    );
}

#[test]
fn test_translation_is_deterministic() {
    let pipeline = json!([
        {"$match": {"a": {"$in": [1, 2, 3]}}},
        {"$unwind": "$items"},
        {"$group": {"_id": "$items.sku", "n": {"$sum": 1}, "avg": {"$avg": "$items.qty"}}},
        {"$sort": {"n": -1, "_id": 1}},
        {"$limit": 10}
    ]);
    let first = translate(pipeline.clone());
    for _ in 0..5 {
        let again = translate(pipeline.clone());
        assert_eq!(again.sql, first.sql);
        assert_eq!(again.binds, first.binds);
    }
}

#[test]
fn test_malformed_pipeline_is_structural() {
    let err = translate_json(&json!({"$match": {}}), &orders(), &TranslationOptions::default())
        .unwrap_err();
    assert!(matches!(err, TranslateError::Structural(_)));

    let err = translate_json(
        &json!([{"$match": {}, "$limit": 1}]),
        &orders(),
        &TranslationOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::Structural(_)));
}

#[test]
fn test_unknown_stage() {
    let err = translate_json(&json!([{"$teleport": {}}]), &orders(), &TranslationOptions::default())
        .unwrap_err();
    assert!(matches!(err, TranslateError::UnknownOperator(ref op) if op.contains("$teleport")));
}

#[test]
fn test_result_serializes() {
    let result = translate(json!([{"$match": {"qty": {"$gte": 2}}}]));
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["capability"], "full_support");
    assert_eq!(value["binds"], json!([2]));
}
