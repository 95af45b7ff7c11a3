use aggsql::{
    parse_stage, translate_json, OracleConfiguration, Stage, TranslateError,
    TranslationCapability, TranslationOptions,
};
use serde_json::{json, Value};

fn run(pipeline: Value) -> Result<aggsql::TranslationResult, TranslateError> {
    translate_json(
        &pipeline,
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default(),
    )
}

fn sql(pipeline: Value) -> String {
    run(pipeline).unwrap().sql
}

#[test]
fn test_limit_then_match_keeps_order_without_optimizer() {
    let result = translate_json(
        &json!([{"$limit": 5}, {"$match": {"status": "a"}}]),
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default().with_optimize(false),
    )
    .unwrap();
    insta::assert_snapshot!(result.sql, @"SELECT q_1.data FROM ( SELECT base.data FROM orders base FETCH FIRST 5 ROWS ONLY ) q_1 WHERE q_1.data.status.string() = :1");
}

#[test]
fn test_skip_and_limit() {
    let sql = sql(json!([{"$skip": 10}, {"$limit": 5}]));
    assert!(sql.ends_with("OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"));
}

#[test]
fn test_group_without_key() {
    let sql = sql(json!([{"$group": {"_id": null, "n": {"$sum": "$qty"}}}]));
    insta::assert_snapshot!(sql, @r#"SELECT NULL AS "_id", NVL(SUM(base.data.qty.number()), 0) AS n FROM orders base HAVING COUNT(*) > 0"#);
}

#[test]
fn test_match_after_group_filters_groups() {
    let sql = sql(json!([
        {"$group": {"_id": "$grp", "total": {"$sum": "$value"}}},
        {"$match": {"total": {"$gt": 10}}}
    ]));
    assert!(sql.ends_with(
        "GROUP BY base.data.grp.string() HAVING NVL(SUM(base.data.value.number()), 0) > :1"
    ));
}

#[test]
fn test_sort_after_group_orders_by_alias() {
    let sql = sql(json!([
        {"$group": {"_id": "$grp", "total": {"$sum": "$value"}}},
        {"$sort": {"total": -1}}
    ]));
    assert!(sql.ends_with("ORDER BY total DESC NULLS LAST"));
}

#[test]
fn test_count_stage() {
    let sql = sql(json!([{"$count": "total"}]));
    insta::assert_snapshot!(sql, @"SELECT COUNT(*) AS total FROM orders base HAVING COUNT(*) > 0");
}

#[test]
fn test_sample() {
    let sql = sql(json!([{"$sample": {"size": 4}}]));
    insta::assert_snapshot!(sql, @"SELECT base.data FROM orders base ORDER BY DBMS_RANDOM.VALUE FETCH FIRST 4 ROWS ONLY");
}

#[test]
fn test_add_fields_uses_json_transform() {
    let sql = sql(json!([{"$addFields": {"flag": true}}]));
    insta::assert_snapshot!(sql, @"SELECT JSON_TRANSFORM(base.data, SET '$.flag' = TRUE) AS data FROM orders base");
}

#[test]
fn test_unwind_with_index() {
    let sql = sql(json!([{"$unwind": {"path": "$tags", "includeArrayIndex": "pos"}}]));
    assert!(sql.contains("CROSS JOIN JSON_TABLE(base.data, '$.tags[*]' COLUMNS (idx FOR ORDINALITY, value JSON PATH '$')) unwind_1"));
    assert!(sql.contains("SET '$.pos' = unwind_1.idx - 1"));
}

#[test]
fn test_lookup_joins_foreign_documents() {
    let sql = sql(json!([{"$lookup": {
        "from": "inventory",
        "localField": "item",
        "foreignField": "sku",
        "as": "inv"
    }}]));
    assert!(sql.contains("LEFT OUTER JOIN"));
    assert!(sql.contains("JSON_ARRAYAGG(inventory_2.data FORMAT JSON) AS docs"));
    assert!(sql.contains("ON inventory_1.k = base.data.item.string()"));
}

#[test]
fn test_top_n_then_lookup_stays_sorted() {
    let sql = sql(json!([
        {"$sort": {"score": -1}},
        {"$limit": 3},
        {"$lookup": {"from": "inventory", "localField": "item", "foreignField": "sku", "as": "inv"}}
    ]));
    assert!(sql.contains("FETCH FIRST 3 ROWS ONLY ) q_1 LEFT OUTER JOIN"));
    assert!(sql.ends_with("ORDER BY q_1.data.score DESC NULLS LAST"));
}

#[test]
fn test_lookup_with_pipeline_is_unsupported() {
    let err = run(json!([{"$lookup": {
        "from": "inventory",
        "let": {"item": "$item"},
        "pipeline": [{"$match": {"$expr": {"$eq": ["$sku", "$$item"]}}}],
        "as": "inv"
    }}]))
    .unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedFeature { ref feature, .. } if feature == "$lookup"));
}

#[test]
fn test_union_with() {
    let sql = sql(json!([{"$unionWith": "archive"}]));
    insta::assert_snapshot!(sql, @"SELECT q_1.data FROM ( SELECT base.data FROM orders base UNION ALL SELECT archive_1.data FROM archive archive_1 ) q_1");
}

#[test]
fn test_facet_builds_one_document() {
    let sql = sql(json!([{"$facet": {
        "all": [{"$sort": {"qty": 1}}],
        "top": [{"$limit": 1}]
    }}]));
    assert!(sql.starts_with("WITH facet_1 AS ( SELECT base.data FROM orders base )"));
    assert!(sql.contains("'all' VALUE"));
    assert!(sql.contains("'top' VALUE"));
    assert!(sql.ends_with("FROM DUAL"));
}

#[test]
fn test_facet_with_empty_branch_is_rejected() {
    let err = run(json!([{"$facet": {"all": [], "top": [{"$limit": 1}]}}])).unwrap_err();
    let TranslateError::Validation(issues) = err else {
        panic!("expected validation error");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, aggsql::validation::EMPTY_PIPELINE_FIELD);
}

#[test]
fn test_graph_lookup_is_recursive_and_emulated() {
    let result = run(json!([{"$graphLookup": {
        "from": "employees",
        "startWith": "$reportsTo",
        "connectFromField": "reportsTo",
        "connectToField": "name",
        "as": "chain",
        "maxDepth": 2
    }}]))
    .unwrap();
    assert!(result.sql.contains("WHERE g_1.depth < 2"));
    assert!(result.sql.contains("CYCLE start_k, doc_id SET is_cycle TO 'Y' DEFAULT 'N'"));
    assert_eq!(result.capability, TranslationCapability::Emulated);
}

#[test]
fn test_bucket_groups_by_case() {
    let sql = sql(json!([{"$bucket": {
        "groupBy": "$price",
        "boundaries": [0, 100, 200],
        "default": "other"
    }}]));
    assert!(sql.contains("CASE WHEN"));
    assert!(sql.contains("ELSE"));
    assert!(sql.contains("GROUP BY CASE"));
    assert!(sql.contains("AS count"));
}

#[test]
fn test_bucket_with_text_ids_orders_by_position() {
    let result = run(json!([{"$bucket": {
        "groupBy": "$price",
        "boundaries": [0, 5, 10],
        "default": "other"
    }}]))
    .unwrap();
    assert_eq!(result.capability, TranslationCapability::Emulated);
    assert!(result.sql.contains("THEN '5'"));
    assert!(result.sql.contains(
        "ORDER BY MIN(CASE WHEN base.data.price.number() >= 0 AND base.data.price.number() < 5 THEN 1 \
         WHEN base.data.price.number() >= 5 AND base.data.price.number() < 10 THEN 2 ELSE 3 END)"
    ));
    assert!(!result.sql.contains("ORDER BY CASE"));
}

#[test]
fn test_bucket_with_numeric_ids_orders_by_id() {
    let sql = sql(json!([{"$bucket": {"groupBy": "$price", "boundaries": [0, 5, 10]}}]));
    assert!(sql.contains("ORDER BY CASE WHEN"));
}

#[test]
fn test_bucket_boundaries_must_ascend() {
    let err = parse_stage(&json!({"$bucket": {"groupBy": "$price", "boundaries": [10, 5]}})).unwrap_err();
    assert!(matches!(err, TranslateError::Structural(_)));
}

#[test]
fn test_bucket_auto_uses_ntile() {
    let result = run(json!([{"$bucketAuto": {"groupBy": "$price", "buckets": 4}}])).unwrap();
    assert!(result.sql.contains("NTILE(4) OVER (ORDER BY base.data.price.number() NULLS FIRST)"));
    assert!(result.sql.contains("JSON_OBJECT('min' VALUE MIN("));
    assert_eq!(result.capability, TranslationCapability::Emulated);
}

#[test]
fn test_window_running_total() {
    let sql = sql(json!([{"$setWindowFields": {
        "partitionBy": "$state",
        "sortBy": {"date": 1},
        "output": {
            "total": {"$sum": "$amount", "window": {"documents": ["unbounded", "current"]}},
            "rank": {"$rank": {}}
        }
    }}]));
    assert!(sql.contains("SUM(base.data.amount.number()) OVER (PARTITION BY "));
    assert!(sql.contains("ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW"));
    assert!(sql.contains("RANK() OVER ("));
}

#[test]
fn test_rank_without_sort_is_structural() {
    let err = parse_stage(&json!({"$setWindowFields": {
        "output": {"rank": {"$rank": {}}}
    }}))
    .unwrap_err();
    assert!(matches!(err, TranslateError::Structural(_)));
}

#[test]
fn test_replace_root() {
    let sql = sql(json!([{"$replaceRoot": {"newRoot": "$profile"}}]));
    assert!(sql.contains("profile"));
    assert!(sql.contains("FROM orders base"));
}

#[test]
fn test_redact_is_partial() {
    let result = run(json!([{"$redact": {"$cond": [{"$eq": ["$level", 1]}, "$$KEEP", "$$PRUNE"]}}]));
    let result = result.unwrap();
    assert_eq!(result.capability, TranslationCapability::Partial);
    assert_eq!(result.warnings[0].stage.as_deref(), Some("$redact"));
}

#[test]
fn test_merge_on_other_field_is_unsupported() {
    let err = run(json!([{"$merge": {"into": "totals", "on": "sku"}}])).unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedFeature { .. }));
}

#[test]
fn test_merge_that_writes_nothing_is_structural() {
    let err = run(json!([{"$merge": {
        "into": "totals",
        "whenMatched": "keepExisting",
        "whenNotMatched": "discard"
    }}]))
    .unwrap_err();
    assert!(matches!(err, TranslateError::Structural(_)));
}

#[test]
fn test_parse_stage_names() {
    let stage = parse_stage(&json!({"$set": {"a": 1}})).unwrap();
    assert_eq!(stage.name(), "$addFields");
    assert!(matches!(parse_stage(&json!({"$limit": 3})).unwrap(), Stage::Limit(3)));
    assert!(parse_stage(&json!({"$limit": -1})).is_err());
}
