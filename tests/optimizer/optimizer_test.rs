use aggsql::optimizer::{OptimizationChain, PipelineOptimizer, PredicatePushdown, SortLimitFusion};
use aggsql::{parse_pipeline, Pipeline, Stage};
use serde_json::{json, Value};

fn pipeline(value: Value) -> Pipeline {
    parse_pipeline(&value).unwrap()
}

#[test]
fn test_standard_chain_order() {
    let chain = OptimizationChain::standard();
    assert_eq!(chain.len(), 2);
    assert!(OptimizationChain::new().is_empty());
}

#[test]
fn test_match_moves_ahead_of_sort() {
    let out = OptimizationChain::standard().optimize(&pipeline(json!([
        {"$sort": {"a": 1}},
        {"$match": {"b": 2}}
    ])));
    assert_eq!(out.stage_names(), vec!["$match", "$sort"]);
}

#[test]
fn test_match_stays_after_group_and_lookup() {
    let p = pipeline(json!([
        {"$group": {"_id": "$k", "n": {"$sum": 1}}},
        {"$match": {"n": {"$gt": 1}}}
    ]));
    assert_eq!(OptimizationChain::standard().optimize(&p), p);

    let p = pipeline(json!([
        {"$lookup": {"from": "inv", "localField": "a", "foreignField": "b", "as": "c"}},
        {"$match": {"a": 1}}
    ]));
    assert_eq!(PredicatePushdown.optimize(&p), p);
}

#[test]
fn test_match_passes_preserving_projection_only() {
    let out = PredicatePushdown.optimize(&pipeline(json!([
        {"$project": {"a": 1, "b": 1}},
        {"$match": {"a": 1}}
    ])));
    assert_eq!(out.stage_names(), vec!["$match", "$project"]);

    let p = pipeline(json!([
        {"$project": {"a": "$b"}},
        {"$match": {"a": 1}}
    ]));
    assert_eq!(PredicatePushdown.optimize(&p), p);
}

#[test]
fn test_adjacent_matches_merge() {
    let out = PredicatePushdown.optimize(&pipeline(json!([
        {"$match": {"a": 1}},
        {"$sort": {"x": 1}},
        {"$match": {"b": 2}}
    ])));
    assert_eq!(out.stage_names(), vec!["$match", "$sort"]);
}

#[test]
fn test_sort_limit_fusion_keeps_limit() {
    let out = SortLimitFusion.optimize(&pipeline(json!([
        {"$sort": {"score": -1}},
        {"$limit": 3}
    ])));
    assert_eq!(out.len(), 2);
    match &out.stages()[0] {
        Stage::Sort(sort) => assert_eq!(sort.limit_hint, Some(3)),
        other => panic!("expected $sort, got {:?}", other),
    }
    assert_eq!(out.stages()[1], Stage::Limit(3));
}

#[test]
fn test_sort_skip_limit_hint_covers_skipped_rows() {
    let out = SortLimitFusion.optimize(&pipeline(json!([
        {"$sort": {"score": -1}},
        {"$skip": 10},
        {"$limit": 5}
    ])));
    match &out.stages()[0] {
        Stage::Sort(sort) => assert_eq!(sort.limit_hint, Some(15)),
        other => panic!("expected $sort, got {:?}", other),
    }
}

#[test]
fn test_consecutive_limits_and_skips_collapse() {
    let out = SortLimitFusion.optimize(&pipeline(json!([
        {"$skip": 2},
        {"$skip": 3},
        {"$limit": 10},
        {"$limit": 4}
    ])));
    assert_eq!(out.stages(), &[Stage::Skip(5), Stage::Limit(4)]);
}

#[test]
fn test_chain_reaches_fixpoint() {
    let inputs = [
        json!([
            {"$limit": 10},
            {"$sort": {"a": -1}},
            {"$match": {"b": 1}},
            {"$skip": 2},
            {"$match": {"c": {"$lt": 3}}},
            {"$limit": 4}
        ]),
        json!([
            {"$project": {"a": 1}},
            {"$sort": {"a": 1}},
            {"$match": {"a": {"$gt": 0}}},
            {"$group": {"_id": "$a", "n": {"$sum": 1}}},
            {"$match": {"n": 2}}
        ]),
    ];
    let chain = OptimizationChain::standard();
    for input in inputs {
        let once = chain.optimize(&pipeline(input));
        assert_eq!(chain.optimize(&once), once);
    }
}

#[test]
fn test_custom_chain() {
    let chain = OptimizationChain::new().with(SortLimitFusion);
    let p = pipeline(json!([{"$limit": 1}, {"$match": {"a": 1}}]));
    assert_eq!(chain.optimize(&p), p);
}
