use aggsql::validation::{self, DUPLICATE_FIELD, EMPTY_PIPELINE_FIELD, INVALID_TABLE, STAGE_ORDER};
use aggsql::{parse_pipeline, translate_json, OracleConfiguration, TranslateError, TranslationOptions};
use serde_json::{json, Value};

fn issues(pipeline: Value) -> Vec<String> {
    let pipeline = parse_pipeline(&pipeline).unwrap();
    match validation::validate(&pipeline, "orders") {
        Ok(()) => Vec::new(),
        Err(issues) => issues.into_iter().map(|i| i.code).collect(),
    }
}

#[test]
fn test_valid_pipeline_has_no_issues() {
    assert!(issues(json!([
        {"$match": {"a": 1}},
        {"$group": {"_id": "$k", "n": {"$sum": 1}}},
        {"$out": "summary"}
    ]))
    .is_empty());
}

#[test]
fn test_write_stage_must_be_last() {
    assert_eq!(issues(json!([{"$out": "x"}, {"$limit": 1}])), vec![STAGE_ORDER]);
    assert_eq!(issues(json!([{"$merge": "x"}, {"$match": {}}])), vec![STAGE_ORDER]);
}

#[test]
fn test_write_stage_inside_sub_pipeline() {
    let codes = issues(json!([
        {"$unionWith": {"coll": "archive", "pipeline": [{"$out": "x"}]}}
    ]));
    assert_eq!(codes, vec![STAGE_ORDER]);
}

#[test]
fn test_empty_facet() {
    let codes = issues(json!([{"$facet": {"a": [], "b": [{"$limit": 1}]}}]));
    assert_eq!(codes, vec![EMPTY_PIPELINE_FIELD]);
}

#[test]
fn test_facet_sub_pipelines_are_checked() {
    let codes = issues(json!([{"$facet": {
        "a": [{"$skip": 1}, {"$group": {"_id": null, "n": {"$sum": 1}}}]
    }}]));
    assert!(codes.is_empty());
}

#[test]
fn test_duplicate_output_names() {
    let pipeline = aggsql::Pipeline::new(vec![aggsql::Stage::add_fields(vec![
        ("a".into(), aggsql::Expression::literal(1)),
        ("a".into(), aggsql::Expression::literal(2)),
    ])
    .unwrap()]);
    let issues = validation::validate(&pipeline, "orders").unwrap_err();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, DUPLICATE_FIELD);
}

#[test]
fn test_invalid_collection() {
    let pipeline = parse_pipeline(&json!([])).unwrap();
    let issues = validation::validate(&pipeline, "1orders").unwrap_err();
    assert_eq!(issues[0].code, INVALID_TABLE);
}

#[test]
fn test_every_issue_is_reported() {
    let err = translate_json(
        &json!([{"$out": "a"}, {"$out": "b"}, {"$facet": {"x": []}}]),
        &OracleConfiguration::new("orders"),
        &TranslationOptions::default(),
    )
    .unwrap_err();
    let TranslateError::Validation(issues) = err else {
        panic!("expected validation error");
    };
    let codes: Vec<&str> = issues.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec![STAGE_ORDER, STAGE_ORDER, EMPTY_PIPELINE_FIELD]);
}

#[test]
fn test_issue_display() {
    let issue = aggsql::ValidationIssue::new(STAGE_ORDER, "$out must be last");
    assert_eq!(issue.to_string(), "[STAGE_ORDER] $out must be last");
}
