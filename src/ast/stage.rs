//! Stage AST.
//!
//! Each variant is one pipeline step. Constructors enforce structural
//! validity (positive counts, non-empty lists, consistent projections), so a
//! `Stage` that exists is always well-formed.

use super::expr::Expression;
use super::literal::{FieldPath, Literal};
use super::pipeline::Pipeline;
use super::window::WindowOutput;
use crate::error::{TranslateError, TranslateResult};
use crate::validation;

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Expression),
    Project(Projection),
    /// `$addFields` / `$set`
    AddFields(Vec<(String, Expression)>),
    Group(Group),
    Sort(Sort),
    Limit(u64),
    Skip(u64),
    Lookup(Lookup),
    Unwind(Unwind),
    /// `$replaceRoot` / `$replaceWith`
    ReplaceRoot(Expression),
    Unset(Vec<String>),
    /// `$count` with its output field name.
    Count(String),
    Bucket(Bucket),
    BucketAuto(BucketAuto),
    Facet(Vec<(String, Pipeline)>),
    GraphLookup(GraphLookup),
    SetWindowFields(SetWindowFields),
    Redact(Expression),
    Merge(Merge),
    Out(Out),
    UnionWith(UnionWith),
    /// `$sample` size.
    Sample(u64),
}

// ============================================================================
// Stage payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// Listed fields (and `_id`) are kept; computed fields are added.
    Inclusion,
    /// Listed fields are removed from the document.
    Exclusion,
}

/// `$project` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields: Vec<(String, ProjectField)>,
    mode: ProjectionMode,
}

impl Projection {
    pub fn new(fields: Vec<(String, ProjectField)>) -> TranslateResult<Self> {
        if fields.is_empty() {
            return Err(TranslateError::structural(
                "$project requires at least one field",
            ));
        }
        for (name, _) in &fields {
            validation::validate_field_name(name)?;
        }
        let has_exclusion = fields
            .iter()
            .any(|(name, f)| *f == ProjectField::Exclude && name != "_id");
        let has_inclusion = fields
            .iter()
            .any(|(_, f)| !matches!(f, ProjectField::Exclude));
        if has_exclusion && has_inclusion {
            return Err(TranslateError::structural(
                "$project cannot mix inclusion and exclusion (except _id)",
            ));
        }
        let mode = if has_inclusion {
            ProjectionMode::Inclusion
        } else {
            ProjectionMode::Exclusion
        };
        Ok(Self { fields, mode })
    }

    pub fn fields(&self) -> &[(String, ProjectField)] {
        &self.fields
    }

    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    /// Whether `path` passes through unchanged under its own name.
    pub fn preserves(&self, path: &str) -> bool {
        if self.mode == ProjectionMode::Exclusion {
            return !self.fields.iter().any(|(name, _)| {
                name == path || path.starts_with(&format!("{}.", name))
            });
        }
        let root = path.split('.').next().unwrap_or(path);
        if root == "_id" && !self.fields.iter().any(|(name, _)| name == "_id") {
            return true;
        }
        self.fields.iter().any(|(name, field)| {
            let covers = name == path || path.starts_with(&format!("{}.", name));
            covers
                && match field {
                    ProjectField::Include => true,
                    ProjectField::Computed(Expression::FieldPath(fp)) => fp.path() == name,
                    _ => false,
                }
        })
    }
}

/// `$group` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// `None` (or a literal) groups the whole input into one document.
    pub id: Option<Expression>,
    pub accumulators: Vec<(String, Expression)>,
}

impl Group {
    pub fn new(id: Option<Expression>, accumulators: Vec<(String, Expression)>) -> TranslateResult<Self> {
        for (name, expr) in &accumulators {
            validation::validate_field_name(name)?;
            if name == "_id" {
                return Err(TranslateError::structural(
                    "$group accumulator cannot be named _id",
                ));
            }
            if !matches!(expr, Expression::Accumulator { .. }) {
                return Err(TranslateError::structural(format!(
                    "$group field '{}' must be an accumulator",
                    name
                )));
            }
        }
        Ok(Self { id, accumulators })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_mongo(value: i64) -> TranslateResult<Self> {
        match value {
            1 => Ok(SortOrder::Asc),
            -1 => Ok(SortOrder::Desc),
            other => Err(TranslateError::structural(format!(
                "sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: FieldPath,
    pub order: SortOrder,
}

/// `$sort` specification. `limit_hint` is attached by sort/limit fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub keys: Vec<SortKey>,
    pub limit_hint: Option<u64>,
}

impl Sort {
    pub fn new(keys: Vec<SortKey>) -> TranslateResult<Self> {
        if keys.is_empty() {
            return Err(TranslateError::structural("$sort requires at least one key"));
        }
        Ok(Self {
            keys,
            limit_hint: None,
        })
    }

    pub fn with_limit_hint(mut self, limit: u64) -> Self {
        self.limit_hint = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupKind {
    /// `localField` / `foreignField` equality join.
    Equality {
        local_field: FieldPath,
        foreign_field: FieldPath,
    },
    /// `let` + `pipeline` correlated subquery.
    Correlated {
        let_vars: Vec<(String, Expression)>,
        pipeline: Pipeline,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub from: String,
    pub as_field: String,
    pub kind: LookupKind,
}

impl Lookup {
    pub fn equality(from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> TranslateResult<Self> {
        validation::validate_table_name(from)?;
        validation::validate_field_name(as_field)?;
        Ok(Self {
            from: from.to_string(),
            as_field: as_field.to_string(),
            kind: LookupKind::Equality {
                local_field: FieldPath::new(local_field)?,
                foreign_field: FieldPath::new(foreign_field)?,
            },
        })
    }

    pub fn correlated(
        from: &str,
        let_vars: Vec<(String, Expression)>,
        pipeline: Pipeline,
        as_field: &str,
    ) -> TranslateResult<Self> {
        validation::validate_table_name(from)?;
        validation::validate_field_name(as_field)?;
        Ok(Self {
            from: from.to_string(),
            as_field: as_field.to_string(),
            kind: LookupKind::Correlated { let_vars, pipeline },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unwind {
    pub path: FieldPath,
    pub include_array_index: Option<String>,
    pub preserve_null_and_empty: bool,
}

impl Unwind {
    pub fn new(path: &str) -> TranslateResult<Self> {
        if !path.starts_with('$') {
            return Err(TranslateError::structural(format!(
                "$unwind path must start with '$', got '{}'",
                path
            )));
        }
        Ok(Self {
            path: FieldPath::new(path)?,
            include_array_index: None,
            preserve_null_and_empty: false,
        })
    }

    pub fn with_array_index(mut self, field: &str) -> TranslateResult<Self> {
        validation::validate_field_name(field)?;
        self.include_array_index = Some(field.to_string());
        Ok(self)
    }

    pub fn preserving(mut self, preserve: bool) -> Self {
        self.preserve_null_and_empty = preserve;
        self
    }
}

/// `$bucket` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub group_by: Expression,
    pub boundaries: Vec<Literal>,
    pub default: Option<Literal>,
    /// Accumulators; empty means the default `{count: {$sum: 1}}`.
    pub output: Vec<(String, Expression)>,
}

impl Bucket {
    pub fn new(
        group_by: Expression,
        boundaries: Vec<Literal>,
        default: Option<Literal>,
        output: Vec<(String, Expression)>,
    ) -> TranslateResult<Self> {
        if boundaries.len() < 2 {
            return Err(TranslateError::structural(
                "$bucket requires at least two boundaries",
            ));
        }
        let numeric = boundaries.iter().all(Literal::is_numeric);
        let strings = boundaries.iter().all(|b| b.as_str().is_some());
        if !numeric && !strings {
            return Err(TranslateError::structural(
                "$bucket boundaries must all be numbers or all be strings",
            ));
        }
        let ascending = boundaries.windows(2).all(|w| match (&w[0], &w[1]) {
            (Literal::String(a), Literal::String(b)) => a < b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
        });
        if !ascending {
            return Err(TranslateError::structural(
                "$bucket boundaries must be sorted in ascending order",
            ));
        }
        check_accumulators("$bucket", &output)?;
        Ok(Self {
            group_by,
            boundaries,
            default,
            output,
        })
    }
}

/// `$bucketAuto` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAuto {
    pub group_by: Expression,
    pub buckets: u64,
    pub output: Vec<(String, Expression)>,
    pub granularity: Option<String>,
}

impl BucketAuto {
    pub fn new(
        group_by: Expression,
        buckets: i64,
        output: Vec<(String, Expression)>,
        granularity: Option<String>,
    ) -> TranslateResult<Self> {
        if buckets <= 0 {
            return Err(TranslateError::structural(format!(
                "$bucketAuto buckets must be positive, got {}",
                buckets
            )));
        }
        check_accumulators("$bucketAuto", &output)?;
        Ok(Self {
            group_by,
            buckets: buckets as u64,
            output,
            granularity,
        })
    }
}

fn check_accumulators(stage: &str, output: &[(String, Expression)]) -> TranslateResult<()> {
    for (name, expr) in output {
        validation::validate_field_name(name)?;
        if !matches!(expr, Expression::Accumulator { .. }) {
            return Err(TranslateError::structural(format!(
                "{} output '{}' must be an accumulator",
                stage, name
            )));
        }
    }
    Ok(())
}

/// `$graphLookup` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphLookup {
    pub from: String,
    pub start_with: Expression,
    pub connect_from_field: FieldPath,
    pub connect_to_field: FieldPath,
    pub as_field: String,
    pub max_depth: Option<u64>,
    pub depth_field: Option<String>,
    pub restrict_search_with_match: Option<Expression>,
}

impl GraphLookup {
    pub fn new(
        from: &str,
        start_with: Expression,
        connect_from_field: &str,
        connect_to_field: &str,
        as_field: &str,
    ) -> TranslateResult<Self> {
        validation::validate_table_name(from)?;
        validation::validate_field_name(as_field)?;
        Ok(Self {
            from: from.to_string(),
            start_with,
            connect_from_field: FieldPath::new(connect_from_field)?,
            connect_to_field: FieldPath::new(connect_to_field)?,
            as_field: as_field.to_string(),
            max_depth: None,
            depth_field: None,
            restrict_search_with_match: None,
        })
    }

    pub fn with_max_depth(mut self, depth: i64) -> TranslateResult<Self> {
        if depth < 0 {
            return Err(TranslateError::structural(format!(
                "$graphLookup maxDepth must be non-negative, got {}",
                depth
            )));
        }
        self.max_depth = Some(depth as u64);
        Ok(self)
    }

    pub fn with_depth_field(mut self, field: &str) -> TranslateResult<Self> {
        validation::validate_field_name(field)?;
        self.depth_field = Some(field.to_string());
        Ok(self)
    }

    pub fn with_restrict_search(mut self, filter: Expression) -> Self {
        self.restrict_search_with_match = Some(filter);
        self
    }
}

/// `$setWindowFields` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SetWindowFields {
    pub partition_by: Option<Expression>,
    pub sort_by: Vec<SortKey>,
    pub output: Vec<(String, WindowOutput)>,
}

impl SetWindowFields {
    pub fn new(
        partition_by: Option<Expression>,
        sort_by: Vec<SortKey>,
        output: Vec<(String, WindowOutput)>,
    ) -> TranslateResult<Self> {
        if output.is_empty() {
            return Err(TranslateError::structural(
                "$setWindowFields requires at least one output",
            ));
        }
        for (name, out) in &output {
            validation::validate_field_name(name)?;
            let needs_order = out.op.is_ranking() || out.shift.is_some();
            if needs_order && sort_by.is_empty() {
                return Err(TranslateError::structural(format!(
                    "{} requires sortBy",
                    out.op.mongo_name()
                )));
            }
        }
        Ok(Self {
            partition_by,
            sort_by,
            output,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhenMatched {
    Replace,
    #[default]
    Merge,
    KeepExisting,
    Fail,
}

impl WhenMatched {
    pub fn from_mongo(s: &str) -> TranslateResult<Self> {
        match s {
            "replace" => Ok(WhenMatched::Replace),
            "merge" => Ok(WhenMatched::Merge),
            "keepExisting" => Ok(WhenMatched::KeepExisting),
            "fail" => Ok(WhenMatched::Fail),
            other => Err(TranslateError::structural(format!(
                "$merge: invalid whenMatched '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhenNotMatched {
    #[default]
    Insert,
    Discard,
    Fail,
}

impl WhenNotMatched {
    pub fn from_mongo(s: &str) -> TranslateResult<Self> {
        match s {
            "insert" => Ok(WhenNotMatched::Insert),
            "discard" => Ok(WhenNotMatched::Discard),
            "fail" => Ok(WhenNotMatched::Fail),
            other => Err(TranslateError::structural(format!(
                "$merge: invalid whenNotMatched '{}'",
                other
            ))),
        }
    }
}

/// `$merge` target and match behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub db: Option<String>,
    pub into: String,
    pub on: Vec<String>,
    pub when_matched: WhenMatched,
    pub when_not_matched: WhenNotMatched,
}

impl Merge {
    pub fn new(db: Option<&str>, into: &str) -> TranslateResult<Self> {
        if let Some(db) = db {
            validation::validate_table_name(db)?;
        }
        validation::validate_table_name(into)?;
        Ok(Self {
            db: db.map(str::to_string),
            into: into.to_string(),
            on: vec!["_id".to_string()],
            when_matched: WhenMatched::default(),
            when_not_matched: WhenNotMatched::default(),
        })
    }

    pub fn with_on(mut self, on: Vec<String>) -> TranslateResult<Self> {
        if on.is_empty() {
            return Err(TranslateError::structural("$merge 'on' must not be empty"));
        }
        for field in &on {
            validation::validate_field_name(field)?;
        }
        self.on = on;
        Ok(self)
    }

    pub fn with_when_matched(mut self, when: WhenMatched) -> Self {
        self.when_matched = when;
        self
    }

    pub fn with_when_not_matched(mut self, when: WhenNotMatched) -> Self {
        self.when_not_matched = when;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Out {
    pub db: Option<String>,
    pub coll: String,
}

impl Out {
    pub fn new(db: Option<&str>, coll: &str) -> TranslateResult<Self> {
        if let Some(db) = db {
            validation::validate_table_name(db)?;
        }
        validation::validate_table_name(coll)?;
        Ok(Self {
            db: db.map(str::to_string),
            coll: coll.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionWith {
    pub coll: String,
    pub pipeline: Option<Pipeline>,
}

impl UnionWith {
    pub fn new(coll: &str, pipeline: Option<Pipeline>) -> TranslateResult<Self> {
        validation::validate_table_name(coll)?;
        Ok(Self {
            coll: coll.to_string(),
            pipeline,
        })
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Stage {
    pub fn limit(n: i64) -> TranslateResult<Self> {
        if n <= 0 {
            return Err(TranslateError::structural(format!(
                "$limit must be positive, got {}",
                n
            )));
        }
        Ok(Stage::Limit(n as u64))
    }

    pub fn skip(n: i64) -> TranslateResult<Self> {
        if n <= 0 {
            return Err(TranslateError::structural(format!(
                "$skip must be positive, got {}",
                n
            )));
        }
        Ok(Stage::Skip(n as u64))
    }

    pub fn sample(size: i64) -> TranslateResult<Self> {
        if size <= 0 {
            return Err(TranslateError::structural(format!(
                "$sample size must be positive, got {}",
                size
            )));
        }
        Ok(Stage::Sample(size as u64))
    }

    pub fn count(field: &str) -> TranslateResult<Self> {
        if field.is_empty() || field.starts_with('$') || field.contains('.') {
            return Err(TranslateError::structural(format!(
                "$count field '{}' must be a non-empty name without '$' or '.'",
                field
            )));
        }
        validation::validate_field_name(field)?;
        Ok(Stage::Count(field.to_string()))
    }

    pub fn add_fields(fields: Vec<(String, Expression)>) -> TranslateResult<Self> {
        if fields.is_empty() {
            return Err(TranslateError::structural(
                "$addFields requires at least one field",
            ));
        }
        for (name, _) in &fields {
            validation::validate_field_name(name)?;
        }
        Ok(Stage::AddFields(fields))
    }

    pub fn unset(fields: Vec<String>) -> TranslateResult<Self> {
        if fields.is_empty() {
            return Err(TranslateError::structural(
                "$unset requires at least one field",
            ));
        }
        for name in &fields {
            validation::validate_field_name(name)?;
        }
        Ok(Stage::Unset(fields))
    }

    pub fn facet(facets: Vec<(String, Pipeline)>) -> TranslateResult<Self> {
        if facets.is_empty() {
            return Err(TranslateError::structural(
                "$facet requires at least one sub-pipeline",
            ));
        }
        for (name, pipeline) in &facets {
            validation::validate_field_name(name)?;
            if let Some(bad) = pipeline
                .stages()
                .iter()
                .find(|s| matches!(s, Stage::Out(_) | Stage::Merge(_) | Stage::Facet(_)))
            {
                return Err(TranslateError::structural(format!(
                    "{} is not allowed inside $facet '{}'",
                    bad.name(),
                    name
                )));
            }
        }
        Ok(Stage::Facet(facets))
    }

    /// MongoDB stage name, e.g. `$match`.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::AddFields(_) => "$addFields",
            Stage::Group(_) => "$group",
            Stage::Sort(_) => "$sort",
            Stage::Limit(_) => "$limit",
            Stage::Skip(_) => "$skip",
            Stage::Lookup(_) => "$lookup",
            Stage::Unwind(_) => "$unwind",
            Stage::ReplaceRoot(_) => "$replaceRoot",
            Stage::Unset(_) => "$unset",
            Stage::Count(_) => "$count",
            Stage::Bucket(_) => "$bucket",
            Stage::BucketAuto(_) => "$bucketAuto",
            Stage::Facet(_) => "$facet",
            Stage::GraphLookup(_) => "$graphLookup",
            Stage::SetWindowFields(_) => "$setWindowFields",
            Stage::Redact(_) => "$redact",
            Stage::Merge(_) => "$merge",
            Stage::Out(_) => "$out",
            Stage::UnionWith(_) => "$unionWith",
            Stage::Sample(_) => "$sample",
        }
    }

    /// `$out` and `$merge` must be the last stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Out(_) | Stage::Merge(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(p: &str) -> Expression {
        Expression::field(p).unwrap()
    }

    #[test]
    fn test_non_positive_limit_and_skip() {
        assert!(matches!(Stage::limit(0), Err(TranslateError::Structural(_))));
        assert!(Stage::limit(-3).is_err());
        assert!(Stage::skip(0).is_err());
        assert_eq!(Stage::limit(5).unwrap(), Stage::Limit(5));
    }

    #[test]
    fn test_projection_modes() {
        let p = Projection::new(vec![
            ("_id".into(), ProjectField::Exclude),
            ("name".into(), ProjectField::Include),
        ])
        .unwrap();
        assert_eq!(p.mode(), ProjectionMode::Inclusion);

        let p = Projection::new(vec![("secret".into(), ProjectField::Exclude)]).unwrap();
        assert_eq!(p.mode(), ProjectionMode::Exclusion);

        assert!(Projection::new(vec![
            ("a".into(), ProjectField::Include),
            ("b".into(), ProjectField::Exclude),
        ])
        .is_err());
    }

    #[test]
    fn test_projection_preserves() {
        let p = Projection::new(vec![
            ("status".into(), ProjectField::Include),
            ("amount".into(), ProjectField::Computed(field("amount"))),
            ("total".into(), ProjectField::Computed(field("price"))),
        ])
        .unwrap();
        assert!(p.preserves("status"));
        assert!(p.preserves("amount"));
        assert!(!p.preserves("total"));
        assert!(!p.preserves("other"));
    }

    #[test]
    fn test_bucket_boundaries_validated() {
        assert!(Bucket::new(field("price"), vec![Literal::Int(0)], None, vec![]).is_err());
        assert!(Bucket::new(
            field("price"),
            vec![Literal::Int(10), Literal::Int(0)],
            None,
            vec![]
        )
        .is_err());
        assert!(Bucket::new(
            field("price"),
            vec![Literal::Int(0), Literal::Double(9.5), Literal::Int(100)],
            None,
            vec![]
        )
        .is_ok());
    }

    #[test]
    fn test_bucket_auto_requires_positive_buckets() {
        assert!(BucketAuto::new(field("price"), 0, vec![], None).is_err());
        assert!(BucketAuto::new(field("price"), 4, vec![], None).is_ok());
    }

    #[test]
    fn test_count_field_rules() {
        assert!(Stage::count("total").is_ok());
        assert!(Stage::count("$total").is_err());
        assert!(Stage::count("a.b").is_err());
        assert!(Stage::count("").is_err());
    }

    #[test]
    fn test_facet_rejects_out() {
        let sub = Pipeline::new(vec![Stage::Out(Out::new(None, "archive").unwrap())]);
        assert!(Stage::facet(vec![("a".into(), sub)]).is_err());
    }
}
