//! Stage compiler.
//!
//! Walks an optimized pipeline and builds one Oracle statement. Each stage
//! does one of three things to the query under construction:
//!
//! - refines it in place (`$match`, `$sort`, `$limit`, `$skip`, `$lookup`,
//!   `$unwind`)
//! - replaces its SELECT list (`$project`, `$group`, `$replaceRoot`, ...)
//! - needs a statement shape of its own (`$facet`, `$graphLookup`,
//!   `$unionWith`, `$out`, `$merge`, see [`super::composite`])
//!
//! When a stage cannot extend the current query (filtering rows that were
//! already grouped, joining after a row limit, ...) the query is wrapped as
//! `( ... ) q_n` and compilation continues against the wrapper. Stages are
//! never reordered here.

use tracing::trace;

use super::composite;
use super::context::GenerationContext;
use super::expr;
use super::scope::{
    json_object, qualified, ColumnBinding, ColumnValue, DocSource, Entry, ForeignKey,
    LookupBinding, Resolved, Scope, UnwindBinding, DOCS_COLUMN, INDEX_COLUMN, KEY_COLUMN,
};
use crate::ast::{
    json_path_of, Bucket, BucketAuto, Expression, FieldPath, Group, Literal, Lookup, LookupKind,
    Pipeline, ProjectField, Projection, ProjectionMode, SetWindowFields, Sort, SortKey, SortOrder, Stage,
    Unwind,
};
use crate::error::{TranslateError, TranslateResult};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::query::{
    Join, JoinType, LimitOffset, OrderByItem, Query, SelectItem, Source, Statement, TableRef,
};
use crate::sql::token::{Token, TokenStream};
use crate::translate::TranslationCapability;

/// Alias of the source collection in the innermost query.
pub const BASE_ALIAS: &str = "base";

/// `NTILE` bucket number selected below a `$bucketAuto` grouping.
const BUCKET_COLUMN: &str = "bucket";
/// Value a `$bucketAuto` row was bucketed by.
const BUCKET_KEY_COLUMN: &str = "bucket_key";

/// The query under construction.
#[derive(Debug)]
pub(super) struct Block {
    pub query: Query,
    /// GROUP BY (or an aggregate-only SELECT list) is in place.
    pub grouped: bool,
    /// The row carries analytic function values.
    pub windowed: bool,
    /// ORDER BY names output columns of this query.
    pub sorted_by_alias: bool,
    /// `$sort` keys behind the current ORDER BY, re-applied when the
    /// query is wrapped.
    pub ordering: Vec<SortKey>,
}

impl Block {
    pub fn over(source: Source) -> Self {
        Self {
            query: Query::new().from(source),
            grouped: false,
            windowed: false,
            sorted_by_alias: false,
            ordering: Vec::new(),
        }
    }

    /// Rows can still be joined or filtered in WHERE.
    fn accepts_rows(&self) -> bool {
        !self.grouped && !self.windowed && !self.query.is_row_limited()
    }

    /// The whole input can be aggregated by this query.
    fn accepts_grouping(&self) -> bool {
        self.accepts_rows() && self.query.order_by.is_empty()
    }

    /// The SELECT list can be replaced without changing what ORDER BY,
    /// GROUP BY or analytic functions see.
    fn accepts_reshape(&self) -> bool {
        !self.grouped && !self.windowed && !self.sorted_by_alias
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Compile `pipeline` into a single statement.
///
/// Hoisted CTEs (from `$graphLookup` and `$facet`) are attached to the
/// outermost query.
pub fn compile(ctx: &mut GenerationContext, pipeline: &Pipeline) -> TranslateResult<Statement> {
    let collection = pipeline
        .source()
        .unwrap_or(ctx.config().collection.as_str())
        .to_string();
    let (stages, terminal) = match pipeline.stages().split_last() {
        Some((last, rest)) if last.is_terminal() => (rest, Some(last)),
        _ => (pipeline.stages(), None),
    };

    let block = base_block(ctx, &collection, BASE_ALIAS);
    let block = compile_stages(ctx, block, stages)?;

    let statement = match terminal {
        None => {
            let mut query = finish(ctx, block);
            query.with = ctx.take_ctes();
            Statement::Query(query)
        }
        Some(stage) => {
            ctx.set_stage(Some(stage.name()));
            trace!(stage = stage.name(), "compile terminal stage");
            match stage {
                Stage::Out(out) => composite::out_statement(ctx, block, out)?,
                Stage::Merge(merge) => composite::merge_statement(ctx, block, merge)?,
                other => return Err(misplaced(other)),
            }
        }
    };
    ctx.set_stage(None);
    Ok(statement)
}

/// `SELECT alias.data FROM collection alias`
pub(super) fn base_block(ctx: &mut GenerationContext, collection: &str, alias: &str) -> Block {
    let table = TableRef::new(collection)
        .with_schema(ctx.config().schema.as_deref())
        .with_alias(alias);
    let scope = Scope::document(alias, ctx.data_column());
    ctx.replace_scope(scope);
    Block::over(Source::Table(table))
}

pub(super) fn compile_stages(
    ctx: &mut GenerationContext,
    mut block: Block,
    stages: &[Stage],
) -> TranslateResult<Block> {
    for stage in stages {
        ctx.set_stage(Some(stage.name()));
        trace!(stage = stage.name(), "compile stage");
        block = compile_stage(ctx, block, stage)?;
    }
    Ok(block)
}

fn compile_stage(ctx: &mut GenerationContext, block: Block, stage: &Stage) -> TranslateResult<Block> {
    match stage {
        Stage::Match(filter) => match_stage(ctx, block, filter),
        Stage::Sort(sort) => sort_stage(ctx, block, sort),
        Stage::Limit(n) => Ok(limit_stage(block, *n)),
        Stage::Skip(n) => Ok(skip_stage(block, *n)),
        Stage::Sample(n) => sample_stage(ctx, block, *n),
        Stage::Lookup(lookup) => lookup_stage(ctx, block, lookup),
        Stage::Unwind(unwind) => unwind_stage(ctx, block, unwind),
        Stage::Redact(decision) => redact_stage(ctx, block, decision),
        Stage::Project(projection) => project_stage(ctx, block, projection),
        Stage::AddFields(fields) => add_fields_stage(ctx, block, fields),
        Stage::Unset(fields) => {
            let block = reshape_ready(ctx, block)?;
            exclude(ctx, block, fields, "$unset")
        }
        Stage::ReplaceRoot(root) => replace_root_stage(ctx, block, root),
        Stage::Group(group) => group_stage(ctx, block, group),
        Stage::Count(field) => Ok(count_stage(ctx, block, field)),
        Stage::Bucket(bucket) => bucket_stage(ctx, block, bucket),
        Stage::BucketAuto(spec) => bucket_auto_stage(ctx, block, spec),
        Stage::SetWindowFields(spec) => window_stage(ctx, block, spec),
        Stage::Facet(facets) => composite::facet_stage(ctx, block, facets),
        Stage::GraphLookup(spec) => composite::graph_lookup_stage(ctx, block, spec),
        Stage::UnionWith(spec) => composite::union_with_stage(ctx, block, spec),
        Stage::Out(_) | Stage::Merge(_) => Err(misplaced(stage)),
    }
}

fn misplaced(stage: &Stage) -> TranslateError {
    TranslateError::structural(format!("{} must be the last stage", stage.name()))
}

// =============================================================================
// Scope boundaries
// =============================================================================

/// Wrap the current query as a subquery and continue against it.
///
/// Rows keep the order the wrapped query gave them.
pub(super) fn materialize(ctx: &mut GenerationContext, block: Block) -> TranslateResult<Block> {
    let ordering = block.ordering.clone();
    let (mut block, _) = materialize_as(ctx, block);
    if !ordering.is_empty() {
        let mut items = Vec::with_capacity(ordering.len());
        for key in &ordering {
            let (expr, _) = sort_key(ctx, &key.field, false)?;
            items.push(order_item(expr, key.order));
        }
        trace!(keys = items.len(), "re-apply order after materialize");
        block.query.order_by = items;
        block.ordering = ordering;
    }
    Ok(block)
}

fn materialize_as(ctx: &mut GenerationContext, block: Block) -> (Block, String) {
    let alias = ctx.alias("q");
    let mut query = block.query;
    query.select = ctx.scope().select_items(ctx.dialect(), ctx.data_column());
    let scope = ctx.scope().materialized(&alias, ctx.data_column());
    trace!(%alias, "materialize scope");
    ctx.replace_scope(scope);
    (Block::over(Source::subquery(query, &alias)), alias)
}

fn rows_ready(ctx: &mut GenerationContext, block: Block) -> TranslateResult<Block> {
    if block.accepts_rows() {
        Ok(block)
    } else {
        materialize(ctx, block)
    }
}

/// Grouping discards row order, so the wrapper is left unordered.
fn grouping_ready(ctx: &mut GenerationContext, block: Block) -> Block {
    if block.accepts_grouping() {
        block
    } else {
        materialize_as(ctx, block).0
    }
}

fn reshape_ready(ctx: &mut GenerationContext, block: Block) -> TranslateResult<Block> {
    if block.accepts_reshape() {
        Ok(block)
    } else {
        materialize(ctx, block)
    }
}

/// The finished query with the scope's SELECT list.
pub(super) fn finish(ctx: &GenerationContext, block: Block) -> Query {
    let mut query = block.query;
    query.select = ctx.scope().select_items(ctx.dialect(), ctx.data_column());
    query
}

/// The finished query selecting the row as one document column.
pub(super) fn document_query(ctx: &GenerationContext, block: Block) -> Query {
    let scope = ctx.scope();
    let data = ctx.data_column();
    let doc = scope.document_expr(ctx.dialect());
    let item = match &scope.doc {
        Some(DocSource::Column { column, .. }) if column == data && !scope.has_pending() => {
            SelectItem::new(doc)
        }
        _ => SelectItem::aliased(doc, data),
    };
    let mut query = block.query;
    query.select = vec![item];
    query
}

/// Whether `expr` reads a field computed earlier in this query.
fn references_pending(scope: &Scope, expr: &Expression) -> bool {
    let related = |a: &str, b: &str| {
        a == b || a.starts_with(&format!("{}.", b)) || b.starts_with(&format!("{}.", a))
    };
    expr.referenced_fields().iter().any(|path| {
        path == "$$ROOT"
            || scope
                .virtual_fields
                .iter()
                .any(|v| related(path, &v.name))
    })
}

// =============================================================================
// Clause stages
// =============================================================================

/// `$match`: WHERE, or HAVING directly over grouped output.
fn match_stage(ctx: &mut GenerationContext, block: Block, filter: &Expression) -> TranslateResult<Block> {
    if block.grouped && !block.windowed && !block.query.is_row_limited() {
        let mut block = block;
        let condition = ctx.capture(|c| expr::condition(c, filter))?;
        block.query.push_having(condition);
        return Ok(block);
    }
    let mut block = rows_ready(ctx, block)?;
    let condition = ctx.capture(|c| expr::condition(c, filter))?;
    block.query.push_filter(condition);
    Ok(block)
}

fn order_item(expr: TokenStream, order: SortOrder) -> OrderByItem {
    // MongoDB orders null and missing values before everything else.
    match order {
        SortOrder::Asc => OrderByItem::asc(expr).nulls(true),
        SortOrder::Desc => OrderByItem::desc(expr).nulls(false),
    }
}

/// ORDER BY expression for `field`, and whether it names an output column.
///
/// Untyped document fields sort as JSON values where the release can
/// compare them, so numbers order numerically.
pub(super) fn sort_key(
    ctx: &mut GenerationContext,
    field: &FieldPath,
    allow_alias: bool,
) -> TranslateResult<(TokenStream, bool)> {
    match ctx.scope().resolve(field.path(), allow_alias) {
        Resolved::Value { expr, .. } => {
            let alias = matches!(expr.tokens(), [Token::Ident(_)]);
            Ok((expr, alias))
        }
        Resolved::Json(location)
            if location.dot_notation
                && !location.rest.is_empty()
                && field.return_type().is_none()
                && ctx.dialect().supports_json_type() =>
        {
            Ok((location.dotted(ctx.dialect()), false))
        }
        _ => {
            let expr = Expression::FieldPath(field.clone());
            let key = ctx.capture(|c| expr::value(c, &expr))?;
            Ok((key, false))
        }
    }
}

/// `$sort`: ORDER BY, with a fused Top-N fetch when the optimizer left a hint.
fn sort_stage(ctx: &mut GenerationContext, block: Block, sort: &Sort) -> TranslateResult<Block> {
    let mut block = if block.query.is_row_limited() {
        materialize(ctx, block)?
    } else {
        block
    };
    let mut items = Vec::with_capacity(sort.keys.len());
    let mut by_alias = false;
    for key in &sort.keys {
        let (expr, alias) = sort_key(ctx, &key.field, true)?;
        by_alias |= alias;
        items.push(order_item(expr, key.order));
    }
    block.query.order_by = items;
    block.sorted_by_alias = by_alias;
    block.ordering = sort.keys.clone();
    if let Some(n) = sort.limit_hint {
        block
            .query
            .limit_offset
            .get_or_insert_with(LimitOffset::default)
            .limit = Some(n);
    }
    Ok(block)
}

/// `$limit`: FETCH, narrowing any fetch already in place.
fn limit_stage(mut block: Block, n: u64) -> Block {
    let window = block.query.limit_offset.get_or_insert_with(LimitOffset::default);
    window.limit = Some(window.limit.map_or(n, |limit| limit.min(n)));
    block
}

/// `$skip`: OFFSET. Skipping after a fetch shrinks the fetch.
fn skip_stage(mut block: Block, n: u64) -> Block {
    let window = block.query.limit_offset.get_or_insert_with(LimitOffset::default);
    window.offset = Some(window.offset.unwrap_or(0) + n);
    if let Some(limit) = window.limit {
        window.limit = Some(limit.saturating_sub(n));
    }
    block
}

/// `$sample`: random order, first `n` rows.
fn sample_stage(ctx: &mut GenerationContext, block: Block, n: u64) -> TranslateResult<Block> {
    let mut block = if block.query.is_row_limited() {
        materialize(ctx, block)?
    } else {
        block
    };
    let random = TokenStream::raw(ctx.dialect().random_order_expr());
    block.query.order_by = vec![OrderByItem::new(random)];
    block.sorted_by_alias = false;
    block.ordering.clear();
    Ok(limit_stage(block, n))
}

/// `JSON_VALUE(doc, '$.path')`
pub(super) fn json_value_of(doc: &TokenStream, path: &str) -> TokenStream {
    let mut ts = TokenStream::raw("JSON_VALUE(");
    ts.append(doc)
        .comma()
        .space()
        .push(Token::LitString(json_path_of(path)))
        .rparen();
    ts
}

/// `JSON_ARRAYAGG(doc FORMAT JSON)`, returning a LOB where there is no JSON type.
pub(super) fn json_arrayagg(dialect: Dialect, doc: &TokenStream) -> TokenStream {
    let mut ts = TokenStream::raw("JSON_ARRAYAGG(");
    ts.append(doc).raw_sql(" FORMAT JSON");
    if !dialect.supports_json_type() {
        ts.raw_sql(" RETURNING ")
            .raw_sql(dialect.json_return_type(crate::ast::JsonReturnType::Json));
    }
    ts.rparen();
    ts
}

/// `$lookup` (equality form): LEFT OUTER JOIN to the foreign documents
/// aggregated per join key.
///
/// ```sql
/// LEFT OUTER JOIN (
///   SELECT JSON_VALUE(inventory_2.data, '$.sku') AS k,
///          JSON_ARRAYAGG(inventory_2.data FORMAT JSON) AS docs
///   FROM inventory inventory_2
///   GROUP BY JSON_VALUE(inventory_2.data, '$.sku')
/// ) inventory_1 ON inventory_1.k = base.data.item.string()
/// ```
fn lookup_stage(ctx: &mut GenerationContext, block: Block, lookup: &Lookup) -> TranslateResult<Block> {
    let (local_field, foreign_field) = match &lookup.kind {
        LookupKind::Equality {
            local_field,
            foreign_field,
        } => (local_field, foreign_field),
        LookupKind::Correlated { .. } => {
            return Err(TranslateError::unsupported(
                "$lookup",
                "the let/pipeline form needs a correlated subquery per document",
            ))
        }
    };
    let mut block = rows_ready(ctx, block)?;

    let alias = ctx.alias(&lookup.from);
    let inner = ctx.alias(&lookup.from);
    let data = qualified(&inner, ctx.data_column());
    let key = json_value_of(&data, foreign_field.path());
    let mut derived = Query::new()
        .select(vec![
            SelectItem::aliased(key.clone(), KEY_COLUMN),
            SelectItem::aliased(json_arrayagg(ctx.dialect(), &data), DOCS_COLUMN),
        ])
        .from(Source::Table(
            TableRef::new(&lookup.from)
                .with_schema(ctx.config().schema.as_deref())
                .with_alias(&inner),
        ));
    derived.group_by = vec![key];

    let local = Expression::FieldPath(local_field.clone());
    let local = ctx.capture(|c| expr::value(c, &local))?;
    let mut on = qualified(&alias, KEY_COLUMN);
    on.raw_sql(" = ").append(&local);
    block.query.joins.push(Join {
        join_type: JoinType::LeftOuter,
        source: Source::subquery(derived, &alias),
        on: Some(on),
    });

    ctx.scope_mut().lookups.push(LookupBinding {
        as_field: lookup.as_field.clone(),
        alias,
        foreign: Some(ForeignKey {
            from: lookup.from.clone(),
            local_field: local_field.clone(),
            foreign_field: foreign_field.clone(),
        }),
    });
    Ok(block)
}

/// `$unwind`: join a `JSON_TABLE` over the array, one row per element.
fn unwind_stage(ctx: &mut GenerationContext, block: Block, unwind: &Unwind) -> TranslateResult<Block> {
    let mut block = rows_ready(ctx, block)?;
    let path = unwind.path.path();
    let (doc, json_path) = match ctx.scope().resolve(path, false) {
        Resolved::Json(location) => (location.doc.clone(), location.json_path()),
        Resolved::Value { expr, json: true } => (expr, "$".to_string()),
        Resolved::Value { json: false, .. } | Resolved::Missing => {
            return Err(TranslateError::unsupported(
                "$unwind",
                format!("'{}' does not hold an array at this point", path),
            ))
        }
    };

    let alias = ctx.alias("unwind");
    let mut table = TokenStream::raw("JSON_TABLE(");
    table
        .append(&doc)
        .comma()
        .space()
        .push(Token::LitString(format!("{}[*]", json_path)))
        .raw_sql(" COLUMNS (")
        .push(Token::Ident(INDEX_COLUMN.to_string()))
        .raw_sql(" FOR ORDINALITY, ")
        .raw_sql(ctx.dialect().unwind_value_column())
        .raw_sql("))");
    let source = Source::Expr {
        expr: table,
        alias: alias.clone(),
    };
    let join = if unwind.preserve_null_and_empty {
        Join {
            join_type: JoinType::LeftOuter,
            source,
            on: Some(TokenStream::raw("1 = 1")),
        }
    } else {
        Join {
            join_type: JoinType::Cross,
            source,
            on: None,
        }
    };
    block.query.joins.push(join);

    ctx.scope_mut().unwinds.push(UnwindBinding {
        path: path.to_string(),
        alias,
        index_field: unwind.include_array_index.clone(),
    });
    Ok(block)
}

/// `$redact`: keep documents whose decision is `$$KEEP` or `$$DESCEND`.
fn redact_stage(ctx: &mut GenerationContext, block: Block, decision: &Expression) -> TranslateResult<Block> {
    ctx.warn(
        "$redact",
        "decided once per document; $$DESCEND keeps the whole document",
        TranslationCapability::Partial,
    )?;
    let mut block = rows_ready(ctx, block)?;
    let value = ctx.capture(|c| expr::value(c, decision))?;
    let mut condition = TokenStream::raw("NVL(");
    condition.append(&value).raw_sql(", 'PRUNE') <> 'PRUNE'");
    block.query.push_filter(condition);
    Ok(block)
}

// =============================================================================
// Reshaping stages
// =============================================================================

fn project_stage(
    ctx: &mut GenerationContext,
    block: Block,
    projection: &Projection,
) -> TranslateResult<Block> {
    let block = reshape_ready(ctx, block)?;
    match projection.mode() {
        ProjectionMode::Inclusion => include(ctx, block, projection),
        ProjectionMode::Exclusion => {
            let names: Vec<String> = projection.fields().iter().map(|(n, _)| n.clone()).collect();
            exclude(ctx, block, &names, "$project")
        }
    }
}

fn output_column(ctx: &mut GenerationContext, name: &str, value: &Expression) -> TranslateResult<ColumnBinding> {
    let mut json = false;
    let rendered = ctx.capture(|c| {
        json = expr::json(c, value)?;
        Ok(())
    })?;
    Ok(ColumnBinding {
        name: name.to_string(),
        value: ColumnValue::Output(rendered),
        json,
    })
}

/// Inclusion projection: one output column per kept or computed field,
/// `_id` first unless excluded.
fn include(ctx: &mut GenerationContext, block: Block, projection: &Projection) -> TranslateResult<Block> {
    let mut columns = Vec::new();
    let explicit_id = projection.fields().iter().any(|(name, _)| name == "_id");
    if !explicit_id && ctx.scope().resolve("_id", false) != Resolved::Missing {
        columns.push(output_column(ctx, "_id", &Expression::field("_id")?)?);
    }
    for (name, field) in projection.fields() {
        let value = match field {
            ProjectField::Exclude => continue,
            ProjectField::Include => Expression::field(name)?,
            ProjectField::Computed(e) => e.clone(),
        };
        columns.push(output_column(ctx, name, &value)?);
    }
    ctx.replace_scope(Scope {
        columns,
        ..Default::default()
    });
    Ok(block)
}

/// Remove `names` from the row (exclusion `$project`, `$unset`).
fn exclude(
    ctx: &mut GenerationContext,
    block: Block,
    names: &[String],
    stage: &str,
) -> TranslateResult<Block> {
    let removed = |field: &str| {
        names
            .iter()
            .any(|n| field == n || field.starts_with(&format!("{}.", n)))
    };

    if !ctx.scope().is_document() {
        let columns = ctx
            .scope()
            .entries()
            .into_iter()
            .filter(|e| !removed(&e.name))
            .map(|e| ColumnBinding {
                name: e.name,
                value: ColumnValue::Output(e.expr),
                json: e.json,
            })
            .collect();
        ctx.replace_scope(Scope {
            columns,
            ..Default::default()
        });
        return Ok(block);
    }

    let dialect = ctx.dialect();
    if !dialect.supports_json_transform() {
        return Err(TranslateError::unsupported(
            stage,
            format!("removing document fields needs JSON_TRANSFORM, which {} lacks", dialect),
        ));
    }
    let mut doc = TokenStream::raw("JSON_TRANSFORM(");
    doc.append(&ctx.scope().document_expr(dialect));
    for name in names {
        doc.comma()
            .space()
            .raw_sql("REMOVE ")
            .push(Token::LitString(json_path_of(name)));
    }
    doc.rparen();
    ctx.replace_scope(Scope {
        doc: Some(DocSource::Expr(doc)),
        ..Default::default()
    });
    Ok(block)
}

/// `$addFields` / `$set`. Values are computed against the input row, then
/// added together.
fn add_fields_stage(
    ctx: &mut GenerationContext,
    block: Block,
    fields: &[(String, Expression)],
) -> TranslateResult<Block> {
    let pending = fields
        .iter()
        .any(|(_, value)| references_pending(ctx.scope(), value));
    let block = if pending { materialize(ctx, block)? } else { block };

    let mut added = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        let mut json = false;
        let rendered = ctx.capture(|c| {
            json = expr::json(c, value)?;
            Ok(())
        })?;
        added.push((name, rendered, json));
    }
    for (name, rendered, json) in added {
        ctx.scope_mut().add_virtual(name, rendered, json);
    }
    Ok(block)
}

/// `$replaceRoot` / `$replaceWith`
fn replace_root_stage(ctx: &mut GenerationContext, block: Block, root: &Expression) -> TranslateResult<Block> {
    let block = reshape_ready(ctx, block)?;
    let doc = ctx.capture(|c| expr::json(c, root).map(|_| ()))?;
    ctx.replace_scope(Scope {
        doc: Some(DocSource::Expr(doc)),
        ..Default::default()
    });
    Ok(block)
}

// =============================================================================
// Grouping stages
// =============================================================================

struct GroupKey {
    id: TokenStream,
    json: bool,
    group_by: Vec<TokenStream>,
}

/// Render the `_id` expression and its GROUP BY terms, values inline so the
/// SELECT and GROUP BY texts match.
fn group_key(ctx: &mut GenerationContext, id: Option<&Expression>) -> TranslateResult<GroupKey> {
    ctx.inline(|c| match id {
        None => {
            let mut null = TokenStream::new();
            null.push(Token::LitNull);
            Ok(GroupKey {
                id: null,
                json: false,
                group_by: Vec::new(),
            })
        }
        Some(Expression::Literal(lit)) => {
            let id = c.capture(|c| {
                c.bind(lit);
                Ok(())
            })?;
            Ok(GroupKey {
                id,
                json: matches!(lit, Literal::Array(_)),
                group_by: Vec::new(),
            })
        }
        Some(Expression::CompoundId(fields)) | Some(Expression::Document(fields)) => {
            let mut group_by = Vec::with_capacity(fields.len());
            let mut entries = Vec::with_capacity(fields.len());
            for (name, value) in fields {
                let rendered = c.capture(|c| expr::value(c, value))?;
                group_by.push(rendered.clone());
                entries.push(Entry {
                    name: name.clone(),
                    expr: rendered,
                    json: false,
                    passthrough: false,
                });
            }
            Ok(GroupKey {
                id: json_object(&entries),
                json: true,
                group_by,
            })
        }
        Some(value) => {
            let rendered = c.capture(|c| expr::value(c, value))?;
            Ok(GroupKey {
                id: rendered.clone(),
                json: false,
                group_by: vec![rendered],
            })
        }
    })
}

fn accumulator_columns(
    ctx: &mut GenerationContext,
    stage: &str,
    output: &[(String, Expression)],
) -> TranslateResult<Vec<ColumnBinding>> {
    let mut columns = Vec::with_capacity(output.len());
    for (name, acc) in output {
        let Expression::Accumulator { op, arg } = acc else {
            return Err(TranslateError::structural(format!(
                "{} field '{}' must be an accumulator",
                stage, name
            )));
        };
        let mut json = false;
        let rendered = ctx.capture(|c| {
            json = expr::aggregate(c, *op, arg.as_deref())?;
            Ok(())
        })?;
        columns.push(ColumnBinding {
            name: name.clone(),
            value: ColumnValue::Output(rendered),
            json,
        });
    }
    Ok(columns)
}

fn count_column(name: &str) -> ColumnBinding {
    ColumnBinding {
        name: name.to_string(),
        value: ColumnValue::Output(TokenStream::raw("COUNT(*)")),
        json: false,
    }
}

fn id_column(id: TokenStream, json: bool) -> ColumnBinding {
    ColumnBinding {
        name: "_id".to_string(),
        value: ColumnValue::Output(id),
        json,
    }
}

/// An ungrouped aggregate returns one row even for empty input; MongoDB
/// returns none.
fn require_rows(block: &mut Block) {
    block.query.push_having(TokenStream::raw("COUNT(*) > 0"));
}

/// `$group`
fn group_stage(ctx: &mut GenerationContext, block: Block, group: &Group) -> TranslateResult<Block> {
    let mut block = grouping_ready(ctx, block);
    let key = group_key(ctx, group.id.as_ref())?;
    let mut columns = vec![id_column(key.id, key.json)];
    columns.extend(accumulator_columns(ctx, "$group", &group.accumulators)?);

    if key.group_by.is_empty() {
        require_rows(&mut block);
    }
    block.query.group_by = key.group_by;
    block.grouped = true;
    ctx.replace_scope(Scope {
        columns,
        ..Default::default()
    });
    Ok(block)
}

/// `$count`
fn count_stage(ctx: &mut GenerationContext, block: Block, field: &str) -> Block {
    let mut block = grouping_ready(ctx, block);
    require_rows(&mut block);
    block.grouped = true;
    ctx.replace_scope(Scope {
        columns: vec![count_column(field)],
        ..Default::default()
    });
    block
}

/// Bucket `_id` literal; `text` renders numbers as strings so every CASE
/// branch has one type.
fn bucket_id(ctx: &mut GenerationContext, id: &Literal, text: bool) {
    match id {
        Literal::Int(_) | Literal::Double(_) if text => {
            ctx.push(Token::LitString(id.to_json_string()));
        }
        _ => {
            ctx.bind(id);
        }
    }
}

/// `$bucket`: GROUP BY a CASE over the boundaries.
fn bucket_stage(ctx: &mut GenerationContext, block: Block, bucket: &Bucket) -> TranslateResult<Block> {
    let mut block = grouping_ready(ctx, block);
    let numeric = bucket.boundaries.iter().all(Literal::is_numeric);
    let text = bucket
        .default
        .as_ref()
        .is_some_and(|d| !d.is_null() && d.is_numeric() != numeric);
    if text {
        ctx.warn(
            "$bucket",
            "numeric bucket ids are returned as strings next to a string default",
            TranslationCapability::Emulated,
        )?;
    }

    let (key, in_range, rank) = ctx.inline(|c| {
        let subject = c.capture(|c| {
            if numeric {
                expr::numeric(c, &bucket.group_by)
            } else {
                expr::value(c, &bucket.group_by)
            }
        })?;
        let key = c.capture(|c| {
            c.raw("CASE");
            for bounds in bucket.boundaries.windows(2) {
                c.raw(" WHEN ")
                    .append(&subject)
                    .raw(" >= ")
                    .bind(&bounds[0])
                    .raw(" AND ")
                    .append(&subject)
                    .raw(" < ")
                    .bind(&bounds[1])
                    .raw(" THEN ");
                bucket_id(c, &bounds[0], text);
            }
            if let Some(default) = &bucket.default {
                c.raw(" ELSE ");
                bucket_id(c, default, text);
            }
            c.raw(" END");
            Ok(())
        })?;
        let in_range = c.capture(|c| {
            let (first, last) = (&bucket.boundaries[0], &bucket.boundaries[bucket.boundaries.len() - 1]);
            c.append(&subject)
                .raw(" >= ")
                .bind(first)
                .raw(" AND ")
                .append(&subject)
                .raw(" < ")
                .bind(last);
            Ok(())
        })?;
        // Text ids sort by bucket position; every row of a group shares it.
        let rank = if text {
            let default_rank = if numeric { bucket.boundaries.len() } else { 0 };
            Some(c.capture(|c| {
                c.raw("MIN(CASE");
                for (i, bounds) in bucket.boundaries.windows(2).enumerate() {
                    c.raw(" WHEN ")
                        .append(&subject)
                        .raw(" >= ")
                        .bind(&bounds[0])
                        .raw(" AND ")
                        .append(&subject)
                        .raw(" < ")
                        .bind(&bounds[1])
                        .raw(&format!(" THEN {}", i + 1));
                }
                c.raw(&format!(" ELSE {} END)", default_rank));
                Ok(())
            })?)
        } else {
            None
        };
        Ok((key, in_range, rank))
    })?;

    if bucket.default.is_none() {
        block.query.push_filter(in_range);
    }
    let mut columns = vec![id_column(key.clone(), false)];
    if bucket.output.is_empty() {
        columns.push(count_column("count"));
    } else {
        columns.extend(accumulator_columns(ctx, "$bucket", &bucket.output)?);
    }
    block.query.group_by = vec![key.clone()];
    match rank {
        Some(rank) => block.query.order_by = vec![OrderByItem::asc(rank)],
        None => {
            block.query.order_by = vec![OrderByItem::asc(key)];
            block.ordering = vec![SortKey {
                field: FieldPath::new("_id")?,
                order: SortOrder::Asc,
            }];
        }
    }
    block.grouped = true;
    ctx.replace_scope(Scope {
        columns,
        ..Default::default()
    });
    Ok(block)
}

/// `$bucketAuto`: number rows into `NTILE` buckets below, group above.
fn bucket_auto_stage(ctx: &mut GenerationContext, block: Block, spec: &BucketAuto) -> TranslateResult<Block> {
    ctx.warn(
        "$bucketAuto",
        "bucket bounds are the smallest and largest value in each bucket",
        TranslationCapability::Emulated,
    )?;
    if let Some(granularity) = &spec.granularity {
        ctx.warn(
            "$bucketAuto",
            format!("granularity '{}' is ignored", granularity),
            TranslationCapability::Partial,
        )?;
    }
    let block = grouping_ready(ctx, block);

    let subject = ctx.capture(|c| expr::numeric(c, &spec.group_by))?;
    let mut ntile = TokenStream::raw(format!("NTILE({}) OVER (ORDER BY ", spec.buckets));
    ntile.append(&subject).raw_sql(" NULLS FIRST)");
    ctx.scope_mut()
        .extras
        .push(SelectItem::aliased(ntile, BUCKET_COLUMN));
    ctx.scope_mut()
        .extras
        .push(SelectItem::aliased(subject, BUCKET_KEY_COLUMN));
    let (mut block, alias) = materialize_as(ctx, block);

    let bucket = qualified(&alias, BUCKET_COLUMN);
    let key = qualified(&alias, BUCKET_KEY_COLUMN);
    let mut id = TokenStream::raw("JSON_OBJECT('min' VALUE MIN(");
    id.append(&key)
        .raw_sql("), 'max' VALUE MAX(")
        .append(&key)
        .raw_sql("))");

    let mut columns = vec![id_column(id, true)];
    if spec.output.is_empty() {
        columns.push(count_column("count"));
    } else {
        columns.extend(accumulator_columns(ctx, "$bucketAuto", &spec.output)?);
    }
    block.query.group_by = vec![bucket.clone()];
    block.query.order_by = vec![OrderByItem::asc(bucket)];
    block.grouped = true;
    ctx.replace_scope(Scope {
        columns,
        ..Default::default()
    });
    Ok(block)
}

/// `$setWindowFields`: analytic columns added to every row.
fn window_stage(ctx: &mut GenerationContext, block: Block, spec: &SetWindowFields) -> TranslateResult<Block> {
    let pending = spec
        .partition_by
        .iter()
        .chain(spec.output.iter().filter_map(|(_, out)| out.arg.as_ref()))
        .any(|e| references_pending(ctx.scope(), e));
    let block = if block.grouped || block.query.is_row_limited() || pending {
        materialize(ctx, block)?
    } else {
        block
    };
    let mut block = block;

    let mut over = TokenStream::new();
    if let Some(partition) = &spec.partition_by {
        let rendered = ctx.capture(|c| expr::value(c, partition))?;
        over.push(Token::PartitionBy).space().append(&rendered);
    }
    if !spec.sort_by.is_empty() {
        if !over.is_empty() {
            over.space();
        }
        over.push(Token::OrderBy).space();
        for (i, key) in spec.sort_by.iter().enumerate() {
            if i > 0 {
                over.comma().space();
            }
            let (expr, _) = sort_key(ctx, &key.field, false)?;
            over.append(&order_item(expr, key.order).to_tokens());
        }
    }

    let ordered = !spec.sort_by.is_empty();
    let mut outputs = Vec::with_capacity(spec.output.len());
    for (name, output) in &spec.output {
        let rendered = ctx.capture(|c| expr::window_function(c, output, &over, ordered))?;
        outputs.push((name, rendered));
    }
    for (name, rendered) in outputs {
        ctx.scope_mut().add_virtual(name, rendered, false);
    }
    block.windowed = true;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AccumulatorOp, ComparisonOp};
    use crate::config::{OracleConfiguration, TranslationOptions};

    fn compile_sql(stages: Vec<Stage>) -> (String, Vec<Literal>) {
        let config = OracleConfiguration::new("orders");
        let options = TranslationOptions::default();
        let mut ctx = GenerationContext::new(&config, &options);
        let statement = compile(&mut ctx, &Pipeline::new(stages)).unwrap();
        let tokens = statement.to_tokens_for_dialect(options.dialect);
        let (numbered, binds) = tokens.number_binds(ctx.binds());
        (numbered.serialize(options.dialect), binds)
    }

    fn f(p: &str) -> Expression {
        Expression::field(p).unwrap()
    }

    fn eq(p: &str, v: impl Into<Literal>) -> Expression {
        Expression::comparison(ComparisonOp::Eq, f(p), Expression::literal(v)).unwrap()
    }

    fn sum(p: &str) -> Expression {
        Expression::accumulator(AccumulatorOp::Sum, Some(f(p))).unwrap()
    }

    fn sort_desc(p: &str) -> Sort {
        Sort::new(vec![SortKey {
            field: FieldPath::new(p).unwrap(),
            order: SortOrder::Desc,
        }])
        .unwrap()
    }

    #[test]
    fn test_empty_pipeline_selects_documents() {
        let (sql, binds) = compile_sql(vec![]);
        assert_eq!(sql, "SELECT base.data FROM orders base");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_match_then_group() {
        let group = Group::new(Some(f("grp")), vec![("total".into(), sum("value"))]).unwrap();
        let (sql, binds) = compile_sql(vec![
            Stage::Match(eq("status", "active")),
            Stage::Group(group),
        ]);
        assert_eq!(
            sql,
            "SELECT base.data.grp.string() AS \"_id\", NVL(SUM(base.data.value.number()), 0) AS total \
             FROM orders base WHERE base.data.status.string() = :1 GROUP BY base.data.grp.string()"
        );
        assert_eq!(binds, vec![Literal::from("active")]);
    }

    #[test]
    fn test_match_after_group_is_having() {
        let group = Group::new(Some(f("grp")), vec![("total".into(), sum("value"))]).unwrap();
        let filter = Expression::comparison(ComparisonOp::Gt, f("total"), Expression::literal(10)).unwrap();
        let (sql, _) = compile_sql(vec![Stage::Group(group), Stage::Match(filter)]);
        assert!(sql.ends_with(
            "GROUP BY base.data.grp.string() HAVING NVL(SUM(base.data.value.number()), 0) > :1"
        ));
    }

    #[test]
    fn test_sort_after_group_uses_alias() {
        let group = Group::new(Some(f("grp")), vec![("total".into(), sum("value"))]).unwrap();
        let (sql, _) = compile_sql(vec![Stage::Group(group), Stage::Sort(sort_desc("total"))]);
        assert!(sql.ends_with("ORDER BY total DESC NULLS LAST"));
    }

    #[test]
    fn test_sort_limit_hint_is_one_fetch() {
        let (sql, _) = compile_sql(vec![
            Stage::Sort(sort_desc("score").with_limit_hint(3)),
            Stage::Limit(3),
        ]);
        assert_eq!(
            sql,
            "SELECT base.data FROM orders base ORDER BY base.data.score DESC NULLS LAST FETCH FIRST 3 ROWS ONLY"
        );
    }

    #[test]
    fn test_order_survives_join_after_fetch() {
        let lookup = Lookup::equality("inventory", "item", "sku", "inv").unwrap();
        let (sql, _) = compile_sql(vec![
            Stage::Sort(sort_desc("score").with_limit_hint(3)),
            Stage::Limit(3),
            Stage::Lookup(lookup),
        ]);
        assert!(sql.contains(
            "FROM ( SELECT base.data FROM orders base ORDER BY base.data.score DESC NULLS LAST FETCH FIRST 3 ROWS ONLY ) q_1 LEFT OUTER JOIN"
        ));
        assert!(sql.ends_with("ORDER BY q_1.data.score DESC NULLS LAST"));
    }

    #[test]
    fn test_order_by_alias_survives_reshape() {
        let group = Group::new(Some(f("grp")), vec![("total".into(), sum("value"))]).unwrap();
        let projection = Projection::new(vec![("total".into(), ProjectField::Include)]).unwrap();
        let (sql, _) = compile_sql(vec![
            Stage::Group(group),
            Stage::Sort(sort_desc("total")),
            Stage::Project(projection),
        ]);
        assert!(sql.contains(") q_1 ORDER BY q_1.total DESC NULLS LAST"));
    }

    #[test]
    fn test_grouping_drops_carried_order() {
        let group = Group::new(Some(f("grp")), vec![("n".into(), sum("qty"))]).unwrap();
        let (sql, _) = compile_sql(vec![
            Stage::Sort(sort_desc("score")),
            Stage::Limit(10),
            Stage::Group(group),
        ]);
        assert!(sql.ends_with("GROUP BY q_1.data.grp.string()"));
    }

    #[test]
    fn test_skip_then_limit() {
        let (sql, _) = compile_sql(vec![Stage::Skip(10), Stage::Limit(5)]);
        assert!(sql.ends_with("OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"));
    }

    #[test]
    fn test_limit_then_skip_shrinks_fetch() {
        let (sql, _) = compile_sql(vec![Stage::Limit(5), Stage::Skip(2)]);
        assert!(sql.ends_with("OFFSET 2 ROWS FETCH NEXT 3 ROWS ONLY"));
    }

    #[test]
    fn test_match_after_limit_materializes() {
        let (sql, _) = compile_sql(vec![Stage::Limit(5), Stage::Match(eq("status", "a"))]);
        assert_eq!(
            sql,
            "SELECT q_1.data FROM ( SELECT base.data FROM orders base FETCH FIRST 5 ROWS ONLY ) q_1 \
             WHERE q_1.data.status.string() = :1"
        );
    }

    #[test]
    fn test_group_without_key_requires_rows() {
        let group = Group::new(None, vec![("n".into(), sum("qty"))]).unwrap();
        let (sql, _) = compile_sql(vec![Stage::Group(group)]);
        assert_eq!(
            sql,
            "SELECT NULL AS \"_id\", NVL(SUM(base.data.qty.number()), 0) AS n FROM orders base HAVING COUNT(*) > 0"
        );
    }

    #[test]
    fn test_count_stage() {
        let (sql, _) = compile_sql(vec![Stage::count("total").unwrap()]);
        assert_eq!(sql, "SELECT COUNT(*) AS total FROM orders base HAVING COUNT(*) > 0");
    }

    #[test]
    fn test_inclusion_project_keeps_id() {
        let projection = Projection::new(vec![
            ("name".into(), ProjectField::Include),
            (
                "double".into(),
                ProjectField::Computed(
                    Expression::arithmetic(crate::ast::ArithmeticOp::Multiply, vec![f("qty"), Expression::literal(2)])
                        .unwrap(),
                ),
            ),
        ])
        .unwrap();
        let (sql, _) = compile_sql(vec![Stage::Project(projection)]);
        assert_eq!(
            sql,
            "SELECT base.data.\"_id\" AS \"_id\", base.data.name AS name, \
             (base.data.qty.number() * :1) AS double FROM orders base"
        );
    }

    #[test]
    fn test_add_fields_merges_into_document() {
        let stage = Stage::add_fields(vec![("flag".into(), Expression::literal(true))]).unwrap();
        let (sql, _) = compile_sql(vec![stage]);
        assert_eq!(
            sql,
            "SELECT JSON_TRANSFORM(base.data, SET '$.flag' = TRUE) AS data FROM orders base"
        );
    }

    #[test]
    fn test_unwind_joins_json_table() {
        let unwind = Unwind::new("$tags").unwrap().with_array_index("pos").unwrap();
        let (sql, _) = compile_sql(vec![Stage::Unwind(unwind)]);
        assert_eq!(
            sql,
            "SELECT JSON_TRANSFORM(base.data, SET '$.tags' = unwind_1.value FORMAT JSON, SET '$.pos' = unwind_1.idx - 1) AS data \
             FROM orders base CROSS JOIN JSON_TABLE(base.data, '$.tags[*]' COLUMNS (idx FOR ORDINALITY, value JSON PATH '$')) unwind_1"
        );
    }

    #[test]
    fn test_lookup_joins_aggregated_documents() {
        let lookup = Lookup::equality("inventory", "item", "sku", "inv").unwrap();
        let (sql, _) = compile_sql(vec![Stage::Lookup(lookup)]);
        assert!(sql.contains(
            "LEFT OUTER JOIN ( SELECT JSON_VALUE(inventory_2.data, '$.sku') AS k, \
             JSON_ARRAYAGG(inventory_2.data FORMAT JSON) AS docs FROM inventory inventory_2 \
             GROUP BY JSON_VALUE(inventory_2.data, '$.sku') ) inventory_1 \
             ON inventory_1.k = base.data.item.string()"
        ));
    }

    #[test]
    fn test_correlated_lookup_is_unsupported() {
        let lookup = Lookup::correlated("inventory", vec![], Pipeline::default(), "inv").unwrap();
        let config = OracleConfiguration::new("orders");
        let options = TranslationOptions::default();
        let mut ctx = GenerationContext::new(&config, &options);
        let err = compile(&mut ctx, &Pipeline::new(vec![Stage::Lookup(lookup)])).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::UnsupportedFeature { ref feature, .. } if feature == "$lookup"
        ));
    }

    #[test]
    fn test_sample() {
        let (sql, _) = compile_sql(vec![Stage::sample(4).unwrap()]);
        assert_eq!(
            sql,
            "SELECT base.data FROM orders base ORDER BY DBMS_RANDOM.VALUE FETCH FIRST 4 ROWS ONLY"
        );
    }

    #[test]
    fn test_references_pending_sees_nested_names() {
        let mut scope = Scope::document("base", "data");
        scope.add_virtual("a", TokenStream::raw("1"), false);
        assert!(references_pending(&scope, &f("a.b")));
        assert!(!references_pending(&scope, &f("ab")));
    }
}
