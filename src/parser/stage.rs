//! Stage documents and pipelines.

use serde_json::Value;
use tracing::trace;

use super::expr::parse_accumulator;
use super::{
    array, boolean, integer, known_keys, literal, object, required, single_entry, string,
    truthy_flag, Object,
};
use super::{parse_expression, parse_filter};
use crate::ast::{
    Bucket, BucketAuto, Expression, FieldPath, GraphLookup, Group, Literal, Lookup, Merge, Out,
    Pipeline, ProjectField, Projection, SetWindowFields, Sort, SortKey, SortOrder, Stage,
    UnionWith, Unwind, WhenMatched, WhenNotMatched, WindowFrame, WindowFrameKind, WindowOp,
    WindowOutput,
};
use crate::error::{TranslateError, TranslateResult};

/// Parse a pipeline array: `[{$match: ...}, {$group: ...}]`.
pub fn parse_pipeline(value: &Value) -> TranslateResult<Pipeline> {
    let stages = array(value, "pipeline")?
        .iter()
        .map(parse_stage)
        .collect::<TranslateResult<Vec<_>>>()?;
    Ok(Pipeline::new(stages))
}

/// Parse one `{$stage: spec}` document.
pub fn parse_stage(value: &Value) -> TranslateResult<Stage> {
    let doc = object(value, "stage")?;
    let (name, spec) = single_entry(doc, "stage")?;
    trace!(stage = name, "parse stage");
    match name {
        "$match" => Ok(Stage::Match(parse_filter(spec)?)),
        "$project" => project(spec),
        "$addFields" | "$set" => Stage::add_fields(fields(object(spec, name)?)?),
        "$group" => group(spec),
        "$sort" => Ok(Stage::Sort(Sort::new(sort_keys(spec, "$sort")?)?)),
        "$limit" => Stage::limit(integer(spec, "$limit")?),
        "$skip" => Stage::skip(integer(spec, "$skip")?),
        "$lookup" => lookup(spec),
        "$unwind" => unwind(spec),
        "$replaceRoot" => {
            let doc = object(spec, name)?;
            known_keys(doc, &["newRoot"], name)?;
            Ok(Stage::ReplaceRoot(parse_expression(required(doc, "newRoot", name)?)?))
        }
        "$replaceWith" => Ok(Stage::ReplaceRoot(parse_expression(spec)?)),
        "$unset" => Stage::unset(names(spec, name)?),
        "$count" => Stage::count(string(spec, name)?),
        "$bucket" => bucket(spec),
        "$bucketAuto" => bucket_auto(spec),
        "$facet" => facet(spec),
        "$graphLookup" => graph_lookup(spec),
        "$setWindowFields" => set_window_fields(spec),
        "$redact" => Ok(Stage::Redact(parse_expression(spec)?)),
        "$merge" => merge(spec),
        "$out" => out(spec),
        "$unionWith" => union_with(spec),
        "$sample" => {
            let doc = object(spec, name)?;
            known_keys(doc, &["size"], name)?;
            Stage::sample(integer(required(doc, "size", name)?, "$sample size")?)
        }
        other => Err(TranslateError::UnknownOperator(other.to_string())),
    }
}

/// Name/expression pairs of `$addFields`.
fn fields(doc: &Object) -> TranslateResult<Vec<(String, Expression)>> {
    doc.iter()
        .map(|(name, value)| Ok((name.clone(), parse_expression(value)?)))
        .collect()
}

/// Accumulator outputs of `$group`, `$bucket` and `$bucketAuto`.
fn accumulators<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) -> TranslateResult<Vec<(String, Expression)>> {
    entries
        .map(|(name, value)| Ok((name.clone(), parse_accumulator(name, value)?)))
        .collect()
}

/// A field name or an array of field names.
fn names(value: &Value, what: &str) -> TranslateResult<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        other => array(other, what)?
            .iter()
            .map(|v| string(v, what).map(str::to_string))
            .collect(),
    }
}

/// Required string option.
fn name<'a>(doc: &'a Object, key: &str, what: &str) -> TranslateResult<&'a str> {
    string(required(doc, key, what)?, &format!("{} '{}'", what, key))
}

fn sort_keys(value: &Value, what: &str) -> TranslateResult<Vec<SortKey>> {
    object(value, what)?
        .iter()
        .map(|(path, direction)| {
            if direction.is_object() {
                return Err(TranslateError::unsupported(
                    what,
                    format!("'{}': $meta sort keys are not supported", path),
                ));
            }
            Ok(SortKey {
                field: FieldPath::new(path)?,
                order: SortOrder::from_mongo(integer(direction, what)?)?,
            })
        })
        .collect()
}

fn project(spec: &Value) -> TranslateResult<Stage> {
    let doc = object(spec, "$project")?;
    let mut fields = Vec::with_capacity(doc.len());
    for (name, value) in doc {
        let field = match (value, truthy_flag(value)) {
            (Value::Bool(_) | Value::Number(_), Some(true)) => ProjectField::Include,
            (Value::Bool(_) | Value::Number(_), Some(false)) => ProjectField::Exclude,
            _ => ProjectField::Computed(parse_expression(value)?),
        };
        fields.push((name.clone(), field));
    }
    Ok(Stage::Project(Projection::new(fields)?))
}

fn group(spec: &Value) -> TranslateResult<Stage> {
    let doc = object(spec, "$group")?;
    let id = match required(doc, "_id", "$group")? {
        Value::Null => None,
        Value::Object(keys) if keys.keys().all(|k| !k.starts_with('$')) && !keys.is_empty() => {
            Some(Expression::compound_id(fields(keys)?)?)
        }
        other => Some(parse_expression(other)?),
    };
    let outputs = accumulators(doc.iter().filter(|(name, _)| name.as_str() != "_id"))?;
    Ok(Stage::Group(Group::new(id, outputs)?))
}

fn lookup(spec: &Value) -> TranslateResult<Stage> {
    let doc = object(spec, "$lookup")?;
    let from = name(doc, "from", "$lookup")?;
    let as_field = name(doc, "as", "$lookup")?;

    if let Some(pipeline) = doc.get("pipeline") {
        known_keys(doc, &["from", "let", "pipeline", "as"], "$lookup")?;
        let let_vars = match doc.get("let") {
            Some(vars) => fields(object(vars, "$lookup 'let'")?)?,
            None => Vec::new(),
        };
        let lookup = Lookup::correlated(from, let_vars, parse_pipeline(pipeline)?, as_field)?;
        return Ok(Stage::Lookup(lookup));
    }

    known_keys(doc, &["from", "localField", "foreignField", "as"], "$lookup")?;
    let local = name(doc, "localField", "$lookup")?;
    let foreign = name(doc, "foreignField", "$lookup")?;
    Ok(Stage::Lookup(Lookup::equality(from, local, foreign, as_field)?))
}

/// `{$unwind: "$path"}` or the document form.
fn unwind(spec: &Value) -> TranslateResult<Stage> {
    let doc = match spec {
        Value::String(path) => return Ok(Stage::Unwind(Unwind::new(path)?)),
        other => object(other, "$unwind")?,
    };
    known_keys(
        doc,
        &["path", "includeArrayIndex", "preserveNullAndEmptyArrays"],
        "$unwind",
    )?;
    let mut unwind = Unwind::new(string(required(doc, "path", "$unwind")?, "$unwind path")?)?;
    if let Some(index) = doc.get("includeArrayIndex") {
        unwind = unwind.with_array_index(string(index, "includeArrayIndex")?)?;
    }
    if let Some(preserve) = doc.get("preserveNullAndEmptyArrays") {
        unwind = unwind.preserving(boolean(preserve, "preserveNullAndEmptyArrays")?);
    }
    Ok(Stage::Unwind(unwind))
}

fn bucket(spec: &Value) -> TranslateResult<Stage> {
    let doc = object(spec, "$bucket")?;
    known_keys(doc, &["groupBy", "boundaries", "default", "output"], "$bucket")?;
    let boundaries = match literal(required(doc, "boundaries", "$bucket")?, "$bucket boundaries")? {
        Literal::Array(items) => items,
        _ => return Err(TranslateError::structural("$bucket boundaries must be an array")),
    };
    let default = doc
        .get("default")
        .map(|v| literal(v, "$bucket default"))
        .transpose()?;
    let output = output(doc, "$bucket")?;
    Ok(Stage::Bucket(Bucket::new(
        parse_expression(required(doc, "groupBy", "$bucket")?)?,
        boundaries,
        default,
        output,
    )?))
}

fn bucket_auto(spec: &Value) -> TranslateResult<Stage> {
    let doc = object(spec, "$bucketAuto")?;
    known_keys(doc, &["groupBy", "buckets", "output", "granularity"], "$bucketAuto")?;
    let granularity = doc
        .get("granularity")
        .map(|v| string(v, "$bucketAuto granularity").map(str::to_string))
        .transpose()?;
    Ok(Stage::BucketAuto(BucketAuto::new(
        parse_expression(required(doc, "groupBy", "$bucketAuto")?)?,
        integer(required(doc, "buckets", "$bucketAuto")?, "$bucketAuto buckets")?,
        output(doc, "$bucketAuto")?,
        granularity,
    )?))
}

fn output(doc: &Object, what: &str) -> TranslateResult<Vec<(String, Expression)>> {
    match doc.get("output") {
        Some(spec) => accumulators(object(spec, &format!("{} output", what))?.iter()),
        None => Ok(Vec::new()),
    }
}

fn facet(spec: &Value) -> TranslateResult<Stage> {
    let facets = object(spec, "$facet")?
        .iter()
        .map(|(name, pipeline)| Ok((name.clone(), parse_pipeline(pipeline)?)))
        .collect::<TranslateResult<Vec<_>>>()?;
    Stage::facet(facets)
}

fn graph_lookup(spec: &Value) -> TranslateResult<Stage> {
    const WHAT: &str = "$graphLookup";
    let doc = object(spec, WHAT)?;
    known_keys(
        doc,
        &[
            "from",
            "startWith",
            "connectFromField",
            "connectToField",
            "as",
            "maxDepth",
            "depthField",
            "restrictSearchWithMatch",
        ],
        WHAT,
    )?;
    let mut graph = GraphLookup::new(
        name(doc, "from", WHAT)?,
        parse_expression(required(doc, "startWith", WHAT)?)?,
        name(doc, "connectFromField", WHAT)?,
        name(doc, "connectToField", WHAT)?,
        name(doc, "as", WHAT)?,
    )?;
    if let Some(depth) = doc.get("maxDepth") {
        graph = graph.with_max_depth(integer(depth, "maxDepth")?)?;
    }
    if let Some(depth_field) = doc.get("depthField") {
        graph = graph.with_depth_field(string(depth_field, "depthField")?)?;
    }
    if let Some(filter) = doc.get("restrictSearchWithMatch") {
        graph = graph.with_restrict_search(parse_filter(filter)?);
    }
    Ok(Stage::GraphLookup(graph))
}

fn set_window_fields(spec: &Value) -> TranslateResult<Stage> {
    const WHAT: &str = "$setWindowFields";
    let doc = object(spec, WHAT)?;
    known_keys(doc, &["partitionBy", "sortBy", "output"], WHAT)?;
    let partition_by = doc.get("partitionBy").map(parse_expression).transpose()?;
    let sort_by = match doc.get("sortBy") {
        Some(keys) => sort_keys(keys, "sortBy")?,
        None => Vec::new(),
    };
    let output = object(required(doc, "output", WHAT)?, "$setWindowFields output")?
        .iter()
        .map(|(name, spec)| Ok((name.clone(), window_output(name, spec)?)))
        .collect::<TranslateResult<Vec<_>>>()?;
    Ok(Stage::SetWindowFields(SetWindowFields::new(
        partition_by,
        sort_by,
        output,
    )?))
}

/// `{$sum: "$qty", window: {documents: ["unbounded", "current"]}}`.
fn window_output(name: &str, spec: &Value) -> TranslateResult<WindowOutput> {
    let what = format!("window output '{}'", name);
    let doc = object(spec, &what)?;
    let mut ops = doc.iter().filter(|(key, _)| key.as_str() != "window");
    let (op_name, arg) = match (ops.next(), ops.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(TranslateError::structural(format!(
                "{} must have exactly one operator",
                what
            )))
        }
    };
    let op = WindowOp::from_mongo(op_name)?;

    let mut output = match op {
        WindowOp::Shift => {
            let shift = object(arg, "$shift")?;
            known_keys(shift, &["output", "by", "default"], "$shift")?;
            let default = match shift.get("default") {
                Some(v) => literal(v, "$shift default")?,
                None => Literal::Null,
            };
            WindowOutput::new(op, Some(parse_expression(required(shift, "output", "$shift")?)?))?
                .with_shift(integer(required(shift, "by", "$shift")?, "$shift by")?, default)
        }
        _ if op.is_ranking() || op == WindowOp::Count => match arg {
            Value::Object(empty) if empty.is_empty() => WindowOutput::new(op, None)?,
            _ => {
                return Err(TranslateError::structural(format!(
                    "{} takes '{{}}'",
                    op.mongo_name()
                )))
            }
        },
        _ => WindowOutput::new(op, Some(parse_expression(arg)?))?,
    };

    if let Some(window) = doc.get("window") {
        output = output.with_frame(window_frame(window)?);
    }
    Ok(output)
}

fn window_frame(value: &Value) -> TranslateResult<WindowFrame> {
    let doc = object(value, "window")?;
    if doc.contains_key("unit") {
        return Err(TranslateError::unsupported(
            "$setWindowFields",
            "time-unit range windows are not supported",
        ));
    }
    let (kind, bounds) = single_entry(doc, "window")?;
    let kind = match kind {
        "documents" => WindowFrameKind::Rows,
        "range" => WindowFrameKind::Range,
        other => {
            return Err(TranslateError::structural(format!(
                "window: unrecognized option '{}'",
                other
            )))
        }
    };
    match array(bounds, "window bounds")?.as_slice() {
        [lower, upper] => WindowFrame::from_mongo(
            kind,
            &literal(lower, "window bound")?,
            &literal(upper, "window bound")?,
        ),
        _ => Err(TranslateError::structural(
            "window bounds must be [lower, upper]",
        )),
    }
}

/// `{db, coll}` or a bare collection name.
fn target(value: &Value, what: &str) -> TranslateResult<(Option<String>, String)> {
    match value {
        Value::String(coll) => Ok((None, coll.clone())),
        other => {
            let doc = object(other, what)?;
            known_keys(doc, &["db", "coll"], what)?;
            let db = doc
                .get("db")
                .map(|v| string(v, what).map(str::to_string))
                .transpose()?;
            let coll = string(required(doc, "coll", what)?, what)?;
            Ok((db, coll.to_string()))
        }
    }
}

fn merge(spec: &Value) -> TranslateResult<Stage> {
    const WHAT: &str = "$merge";
    let doc = match spec {
        Value::String(into) => return Ok(Stage::Merge(Merge::new(None, into)?)),
        other => object(other, WHAT)?,
    };
    known_keys(doc, &["into", "on", "let", "whenMatched", "whenNotMatched"], WHAT)?;
    if doc.contains_key("let") {
        return Err(TranslateError::unsupported(WHAT, "'let' variables are not supported"));
    }
    let (db, into) = target(required(doc, "into", WHAT)?, "$merge 'into'")?;
    let mut merge = Merge::new(db.as_deref(), &into)?;
    if let Some(on) = doc.get("on") {
        merge = merge.with_on(names(on, "$merge 'on'")?)?;
    }
    if let Some(when) = doc.get("whenMatched") {
        if when.is_array() {
            return Err(TranslateError::unsupported(
                WHAT,
                "pipeline whenMatched is not supported",
            ));
        }
        merge = merge.with_when_matched(WhenMatched::from_mongo(string(when, "whenMatched")?)?);
    }
    if let Some(when) = doc.get("whenNotMatched") {
        merge = merge
            .with_when_not_matched(WhenNotMatched::from_mongo(string(when, "whenNotMatched")?)?);
    }
    Ok(Stage::Merge(merge))
}

fn out(spec: &Value) -> TranslateResult<Stage> {
    let (db, coll) = target(spec, "$out")?;
    Ok(Stage::Out(Out::new(db.as_deref(), &coll)?))
}

fn union_with(spec: &Value) -> TranslateResult<Stage> {
    let doc = match spec {
        Value::String(coll) => return Ok(Stage::UnionWith(UnionWith::new(coll, None)?)),
        other => object(other, "$unionWith")?,
    };
    known_keys(doc, &["coll", "pipeline"], "$unionWith")?;
    let coll = name(doc, "coll", "$unionWith")?;
    let pipeline = doc.get("pipeline").map(parse_pipeline).transpose()?;
    Ok(Stage::UnionWith(UnionWith::new(coll, pipeline)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AccumulatorOp, ComparisonOp, LookupKind, WindowFrameBound};
    use serde_json::json;

    fn stage(v: Value) -> Stage {
        parse_stage(&v).unwrap()
    }

    #[test]
    fn test_pipeline_of_match_and_group() {
        let pipeline = parse_pipeline(&json!([
            {"$match": {"status": "active"}},
            {"$group": {"_id": "$grp", "total": {"$sum": "$value"}}}
        ]))
        .unwrap();
        assert_eq!(pipeline.stage_names(), vec!["$match", "$group"]);
        let Stage::Group(group) = &pipeline.stages()[1] else {
            panic!("expected $group");
        };
        assert_eq!(group.id, Some(Expression::field("grp").unwrap()));
        assert_eq!(
            group.accumulators,
            vec![(
                "total".to_string(),
                Expression::accumulator(AccumulatorOp::Sum, Some(Expression::field("value").unwrap()))
                    .unwrap()
            )]
        );
    }

    #[test]
    fn test_unknown_stage() {
        let err = parse_stage(&json!({"$densify": {}})).unwrap_err();
        assert_eq!(err, TranslateError::UnknownOperator("$densify".into()));
    }

    #[test]
    fn test_stage_document_needs_one_key() {
        let err = parse_stage(&json!({"$limit": 1, "$skip": 2})).unwrap_err();
        assert!(matches!(err, TranslateError::Structural(_)));
    }

    #[test]
    fn test_limit_must_be_positive() {
        assert_eq!(stage(json!({"$limit": 5})), Stage::Limit(5));
        assert!(matches!(
            parse_stage(&json!({"$limit": 0})),
            Err(TranslateError::Structural(_))
        ));
        assert!(parse_stage(&json!({"$skip": "3"})).is_err());
    }

    #[test]
    fn test_group_id_forms() {
        let Stage::Group(g) = stage(json!({"$group": {"_id": null, "n": {"$count": {}}}})) else {
            panic!("expected $group");
        };
        assert_eq!(g.id, None);

        let Stage::Group(g) = stage(json!({"$group": {"_id": {"y": "$year", "m": "$month"}}})) else {
            panic!("expected $group");
        };
        assert!(matches!(g.id, Some(Expression::CompoundId(ref f)) if f.len() == 2));

        let err = parse_stage(&json!({"$group": {"total": {"$sum": 1}}})).unwrap_err();
        assert!(matches!(err, TranslateError::Structural(_)));
    }

    #[test]
    fn test_project_modes() {
        let Stage::Project(p) = stage(json!({"$project": {"name": 1, "_id": 0, "n": "$qty"}})) else {
            panic!("expected $project");
        };
        assert_eq!(
            p.fields(),
            &[
                ("name".to_string(), ProjectField::Include),
                ("_id".to_string(), ProjectField::Exclude),
                (
                    "n".to_string(),
                    ProjectField::Computed(Expression::field("qty").unwrap())
                ),
            ]
        );
        assert!(parse_stage(&json!({"$project": {"a": 1, "b": 0}})).is_err());
    }

    #[test]
    fn test_set_and_replace_with_aliases() {
        assert_eq!(
            stage(json!({"$set": {"x": 1}})),
            stage(json!({"$addFields": {"x": 1}}))
        );
        assert_eq!(
            stage(json!({"$replaceWith": "$inner"})),
            stage(json!({"$replaceRoot": {"newRoot": "$inner"}}))
        );
    }

    #[test]
    fn test_lookup_forms() {
        let Stage::Lookup(l) = stage(json!({"$lookup": {
            "from": "inventory", "localField": "item", "foreignField": "sku", "as": "inv"
        }})) else {
            panic!("expected $lookup");
        };
        assert!(matches!(l.kind, LookupKind::Equality { .. }));

        let Stage::Lookup(l) = stage(json!({"$lookup": {
            "from": "stock", "let": {"qty": "$ordered"},
            "pipeline": [{"$match": {"$expr": {"$gte": ["$instock", "$$qty"]}}}],
            "as": "matches"
        }})) else {
            panic!("expected $lookup");
        };
        assert!(matches!(l.kind, LookupKind::Correlated { ref let_vars, .. } if let_vars.len() == 1));

        let err = parse_stage(&json!({"$lookup": {"from": "x", "localField": "a", "as": "b"}})).unwrap_err();
        assert!(matches!(err, TranslateError::Structural(_)));
    }

    #[test]
    fn test_unwind_forms() {
        assert_eq!(
            stage(json!({"$unwind": "$tags"})),
            Stage::Unwind(Unwind::new("$tags").unwrap())
        );
        let Stage::Unwind(u) = stage(json!({"$unwind": {
            "path": "$tags", "includeArrayIndex": "idx", "preserveNullAndEmptyArrays": true
        }})) else {
            panic!("expected $unwind");
        };
        assert_eq!(u.include_array_index.as_deref(), Some("idx"));
        assert!(u.preserve_null_and_empty);
        assert!(parse_stage(&json!({"$unwind": "tags"})).is_err());
    }

    #[test]
    fn test_sort_and_unset() {
        let Stage::Sort(s) = stage(json!({"$sort": {"score": -1, "name": 1}})) else {
            panic!("expected $sort");
        };
        assert_eq!(s.keys[0].order, SortOrder::Desc);
        assert_eq!(s.keys[1].field.path(), "name");
        assert!(parse_stage(&json!({"$sort": {"score": 2}})).is_err());

        assert_eq!(
            stage(json!({"$unset": "a"})),
            Stage::Unset(vec!["a".into()])
        );
        assert_eq!(
            stage(json!({"$unset": ["a", "b.c"]})),
            Stage::Unset(vec!["a".into(), "b.c".into()])
        );
    }

    #[test]
    fn test_bucket() {
        let Stage::Bucket(b) = stage(json!({"$bucket": {
            "groupBy": "$price", "boundaries": [0, 100, 200], "default": "Other",
            "output": {"count": {"$sum": 1}}
        }})) else {
            panic!("expected $bucket");
        };
        assert_eq!(b.boundaries.len(), 3);
        assert_eq!(b.default, Some(Literal::String("Other".into())));
        assert!(parse_stage(&json!({"$bucket": {"groupBy": "$p", "boundaries": [5, 1]}})).is_err());
    }

    #[test]
    fn test_facet_rejects_nested_out() {
        let Stage::Facet(f) = stage(json!({"$facet": {
            "byTag": [{"$unwind": "$tags"}, {"$count": "n"}],
            "top": [{"$sort": {"x": -1}}, {"$limit": 1}]
        }})) else {
            panic!("expected $facet");
        };
        assert_eq!(f.len(), 2);
        assert!(parse_stage(&json!({"$facet": {"bad": [{"$out": "t"}]}})).is_err());
    }

    #[test]
    fn test_graph_lookup() {
        let Stage::GraphLookup(g) = stage(json!({"$graphLookup": {
            "from": "employees", "startWith": "$reportsTo", "connectFromField": "reportsTo",
            "connectToField": "name", "as": "hierarchy", "maxDepth": 2, "depthField": "level",
            "restrictSearchWithMatch": {"active": true}
        }})) else {
            panic!("expected $graphLookup");
        };
        assert_eq!(g.max_depth, Some(2));
        assert_eq!(g.depth_field.as_deref(), Some("level"));
        assert!(matches!(
            g.restrict_search_with_match,
            Some(Expression::Comparison { op: ComparisonOp::Eq, .. })
        ));
    }

    #[test]
    fn test_set_window_fields() {
        let Stage::SetWindowFields(w) = stage(json!({"$setWindowFields": {
            "partitionBy": "$state",
            "sortBy": {"orderDate": 1},
            "output": {
                "running": {"$sum": "$qty", "window": {"documents": ["unbounded", "current"]}},
                "rank": {"$rank": {}},
                "prev": {"$shift": {"output": "$qty", "by": -1, "default": 0}}
            }
        }})) else {
            panic!("expected $setWindowFields");
        };
        let running = &w.output[0].1;
        let frame = running.frame.as_ref().unwrap();
        assert_eq!(frame.start, WindowFrameBound::UnboundedPreceding);
        assert_eq!(w.output[1].1.op, WindowOp::Rank);
        let shift = w.output[2].1.shift.as_ref().unwrap();
        assert_eq!((shift.by, &shift.default), (-1, &Literal::Int(0)));

        let err = parse_stage(&json!({"$setWindowFields": {
            "sortBy": {"t": 1},
            "output": {"s": {"$sum": "$x", "window": {"range": [-1, 0], "unit": "day"}}}
        }}))
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_merge_out_and_union_with() {
        let Stage::Merge(m) = stage(json!({"$merge": {
            "into": {"db": "reporting", "coll": "totals"}, "on": "region",
            "whenMatched": "replace", "whenNotMatched": "discard"
        }})) else {
            panic!("expected $merge");
        };
        assert_eq!(m.db.as_deref(), Some("reporting"));
        assert_eq!(m.on, vec!["region".to_string()]);
        assert_eq!(m.when_matched, WhenMatched::Replace);
        assert_eq!(m.when_not_matched, WhenNotMatched::Discard);
        assert_eq!(
            stage(json!({"$merge": "totals"})),
            Stage::Merge(Merge::new(None, "totals").unwrap())
        );

        assert_eq!(
            stage(json!({"$out": "archive"})),
            Stage::Out(Out::new(None, "archive").unwrap())
        );
        let Stage::UnionWith(u) = stage(json!({"$unionWith": {"coll": "old", "pipeline": [{"$limit": 1}]}})) else {
            panic!("expected $unionWith");
        };
        assert_eq!(u.pipeline.map(|p| p.len()), Some(1));
    }

    #[test]
    fn test_sample_and_count() {
        assert_eq!(stage(json!({"$sample": {"size": 3}})), Stage::Sample(3));
        assert_eq!(stage(json!({"$count": "total"})), Stage::Count("total".into()));
        assert!(parse_stage(&json!({"$count": "a.b"})).is_err());
    }
}
