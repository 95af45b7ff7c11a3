//! Stages that need a statement shape of their own: CTEs, set operations
//! and DML.

use tracing::trace;

use super::context::GenerationContext;
use super::expr;
use super::pipeline::{
    base_block, compile_stages, document_query, finish, json_arrayagg, json_value_of,
    materialize, Block,
};
use super::scope::{json_object, qualified, DocSource, Entry, LookupBinding, Scope, DOCS_COLUMN, KEY_COLUMN};
use crate::ast::{GraphLookup, Merge, Out, Pipeline, UnionWith, WhenMatched, WhenNotMatched};
use crate::error::{TranslateError, TranslateResult};
use crate::sql::query::{
    CycleClause, Cte, Join, JoinType, MergeStatement, Query, SelectItem, SetOperation, Source,
    Statement, TableRef,
};
use crate::sql::token::{Token, TokenStream};
use crate::translate::TranslationCapability;

const START_COLUMN: &str = "start_k";
const DOC_ID_COLUMN: &str = "doc_id";
const DOC_COLUMN: &str = "doc";
const NEXT_COLUMN: &str = "next_k";
const DEPTH_COLUMN: &str = "depth";
const CYCLE_COLUMN: &str = "is_cycle";
const RANK_COLUMN: &str = "rn";

/// Target and source aliases of a `$merge`.
const TARGET_ALIAS: &str = "tgt";
const SOURCE_ALIAS: &str = "src";

fn ident(name: &str) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Ident(name.to_string()));
    ts
}

fn parenthesized(query: &Query, ctx: &GenerationContext) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.lparen()
        .append(&query.to_tokens_for_dialect(ctx.dialect()))
        .rparen();
    ts
}

// =============================================================================
// $facet
// =============================================================================

/// `$facet`: the input becomes a CTE; every sub-pipeline runs over it and is
/// folded into one array-valued field of a single output document.
pub(super) fn facet_stage(
    ctx: &mut GenerationContext,
    block: Block,
    facets: &[(String, Pipeline)],
) -> TranslateResult<Block> {
    let data = ctx.data_column().to_string();
    let input_scope = ctx.scope().clone();
    let cte_name = ctx.alias("facet");
    let input = finish(ctx, block);
    ctx.add_cte(Cte::new(&cte_name, input));

    let mut entries = Vec::with_capacity(facets.len());
    for (name, pipeline) in facets {
        trace!(facet = %name, stages = pipeline.len(), "compile facet");
        let alias = ctx.alias(&cte_name);
        ctx.replace_scope(input_scope.materialized(&alias, &data));
        let sub = Block::over(Source::Table(TableRef::new(&cte_name).with_alias(&alias)));
        let sub = compile_stages(ctx, sub, pipeline.stages())?;
        ctx.set_stage(Some("$facet"));
        let sub = finish(ctx, sub);

        let wrapper = ctx.alias("q");
        let doc = ctx
            .scope()
            .materialized(&wrapper, &data)
            .document_expr(ctx.dialect());
        let folded = Query::new()
            .select(vec![SelectItem::new(json_arrayagg(ctx.dialect(), &doc))])
            .from(Source::subquery(sub, &wrapper));
        entries.push(Entry {
            name: name.clone(),
            expr: parenthesized(&folded, ctx),
            json: true,
            passthrough: false,
        });
    }

    ctx.replace_scope(Scope {
        doc: Some(DocSource::Expr(json_object(&entries))),
        ..Default::default()
    });
    Ok(Block::over(Source::Dual))
}

// =============================================================================
// $graphLookup
// =============================================================================

/// Recursive CTE over the foreign collection.
///
/// Every foreign document is an anchor for the value of its `connectToField`;
/// each step follows `connectFromField` to the documents whose
/// `connectToField` matches. `CYCLE` stops revisits per start value.
fn graph_cte(ctx: &mut GenerationContext, spec: &GraphLookup, name: &str) -> TranslateResult<Cte> {
    let data = ctx.data_column().to_string();
    let schema = ctx.config().schema.clone();
    let to = spec.connect_to_field.path();
    let from = spec.connect_from_field.path();
    let restrict = |ctx: &mut GenerationContext, alias: &str| -> TranslateResult<Option<TokenStream>> {
        match &spec.restrict_search_with_match {
            None => Ok(None),
            Some(filter) => ctx
                .with_scope(Scope::document(alias, &data), |c| {
                    c.capture(|c| expr::condition(c, filter))
                })
                .map(Some),
        }
    };

    let anchor_alias = ctx.alias(&spec.from);
    let anchor_doc = qualified(&anchor_alias, &data);
    let mut anchor = Query::new()
        .select(vec![
            SelectItem::new(json_value_of(&anchor_doc, to)),
            SelectItem::new(json_value_of(&anchor_doc, "_id")),
            SelectItem::new(anchor_doc.clone()),
            SelectItem::new(json_value_of(&anchor_doc, from)),
            SelectItem::new(TokenStream::raw("0")),
        ])
        .from(Source::Table(
            TableRef::new(&spec.from)
                .with_schema(schema.as_deref())
                .with_alias(&anchor_alias),
        ));
    if let Some(condition) = restrict(ctx, &anchor_alias)? {
        anchor.push_filter(condition);
    }

    let graph_alias = ctx.alias("g");
    let step_alias = ctx.alias(&spec.from);
    let step_doc = qualified(&step_alias, &data);
    let mut on = json_value_of(&step_doc, to);
    on.raw_sql(" = ").append(&qualified(&graph_alias, NEXT_COLUMN));
    let mut depth = qualified(&graph_alias, DEPTH_COLUMN);
    depth.raw_sql(" + 1");
    let mut step = Query::new()
        .select(vec![
            SelectItem::new(qualified(&graph_alias, START_COLUMN)),
            SelectItem::new(json_value_of(&step_doc, "_id")),
            SelectItem::new(step_doc.clone()),
            SelectItem::new(json_value_of(&step_doc, from)),
            SelectItem::new(depth),
        ])
        .from(Source::Table(TableRef::new(name).with_alias(&graph_alias)))
        .join(
            JoinType::Inner,
            Source::Table(
                TableRef::new(&spec.from)
                    .with_schema(schema.as_deref())
                    .with_alias(&step_alias),
            ),
            Some(on),
        );
    if let Some(max) = spec.max_depth {
        let mut bound = qualified(&graph_alias, DEPTH_COLUMN);
        bound.raw_sql(&format!(" < {}", max));
        step.push_filter(bound);
    }
    if let Some(condition) = restrict(ctx, &step_alias)? {
        step.push_filter(condition);
    }

    Ok(
        Cte::recursive(name, Query::from_set_op(SetOperation::union_all(anchor, step)))
            .with_columns(&[START_COLUMN, DOC_ID_COLUMN, DOC_COLUMN, NEXT_COLUMN, DEPTH_COLUMN])
            .with_cycle(CycleClause {
                columns: vec![START_COLUMN.to_string(), DOC_ID_COLUMN.to_string()],
                mark_column: CYCLE_COLUMN.to_string(),
                cycle_value: "Y".to_string(),
                default_value: "N".to_string(),
            }),
    )
}

/// `$graphLookup`: join the reachable documents, aggregated per start value.
pub(super) fn graph_lookup_stage(
    ctx: &mut GenerationContext,
    block: Block,
    spec: &GraphLookup,
) -> TranslateResult<Block> {
    ctx.warn(
        "$graphLookup",
        "the traversal is computed for every start value of the foreign collection",
        TranslationCapability::Emulated,
    )?;
    let mut block = if block.query.is_row_limited() || block.grouped || block.windowed {
        materialize(ctx, block)?
    } else {
        block
    };
    let start = ctx.capture(|c| expr::value(c, &spec.start_with))?;

    let cte_name = ctx.alias("graph");
    let cte = graph_cte(ctx, spec, &cte_name)?;
    ctx.add_cte(cte);

    // Shortest path to each document wins when it is reachable several ways.
    let ranked_alias = ctx.alias("q");
    let mut rank = TokenStream::raw("ROW_NUMBER() OVER (PARTITION BY ");
    rank.push(Token::Ident(START_COLUMN.to_string()))
        .comma()
        .space()
        .push(Token::Ident(DOC_ID_COLUMN.to_string()))
        .raw_sql(" ORDER BY ")
        .push(Token::Ident(DEPTH_COLUMN.to_string()))
        .rparen();
    let ranked = Query::new()
        .select(vec![
            SelectItem::new(ident(START_COLUMN)),
            SelectItem::new(ident(DOC_COLUMN)),
            SelectItem::new(ident(DEPTH_COLUMN)),
            SelectItem::aliased(rank, RANK_COLUMN),
        ])
        .from(Source::Table(TableRef::new(&cte_name)));

    let mut reached = Scope::document(&ranked_alias, DOC_COLUMN);
    if let Some(depth_field) = &spec.depth_field {
        reached.add_virtual(depth_field, qualified(&ranked_alias, DEPTH_COLUMN), false);
    }
    let doc = reached.document_expr(ctx.dialect());
    let key = qualified(&ranked_alias, START_COLUMN);
    let mut first = qualified(&ranked_alias, RANK_COLUMN);
    first.raw_sql(" = 1");
    let mut derived = Query::new()
        .select(vec![
            SelectItem::aliased(key.clone(), KEY_COLUMN),
            SelectItem::aliased(json_arrayagg(ctx.dialect(), &doc), DOCS_COLUMN),
        ])
        .from(Source::subquery(ranked, &ranked_alias))
        .filter(first);
    derived.group_by = vec![key];

    let alias = ctx.alias(&spec.from);
    let mut on = qualified(&alias, KEY_COLUMN);
    on.raw_sql(" = ").append(&start);
    block.query.joins.push(Join {
        join_type: JoinType::LeftOuter,
        source: Source::subquery(derived, &alias),
        on: Some(on),
    });
    ctx.scope_mut().lookups.push(LookupBinding {
        as_field: spec.as_field.clone(),
        alias,
        foreign: None,
    });
    Ok(block)
}

// =============================================================================
// $unionWith
// =============================================================================

/// `$unionWith`: UNION ALL with another collection's documents.
pub(super) fn union_with_stage(
    ctx: &mut GenerationContext,
    block: Block,
    spec: &UnionWith,
) -> TranslateResult<Block> {
    let data = ctx.data_column().to_string();
    let left = document_query(ctx, block);

    let alias = ctx.alias(&spec.coll);
    let mut right = base_block(ctx, &spec.coll, &alias);
    if let Some(pipeline) = &spec.pipeline {
        right = compile_stages(ctx, right, pipeline.stages())?;
        ctx.set_stage(Some("$unionWith"));
    }
    let right = document_query(ctx, right);

    let wrapper = ctx.alias("q");
    let union = Query::from_set_op(SetOperation::union_all(left, right));
    ctx.replace_scope(Scope::document(&wrapper, &data));
    Ok(Block::over(Source::subquery(union, &wrapper)))
}

// =============================================================================
// $out / $merge
// =============================================================================

/// `$out`: INSERT the documents into the target table.
pub(super) fn out_statement(ctx: &mut GenerationContext, block: Block, out: &Out) -> TranslateResult<Statement> {
    ctx.warn(
        "$out",
        "rows are appended; existing rows are kept",
        TranslationCapability::Partial,
    )?;
    let mut query = document_query(ctx, block);
    query.with = ctx.take_ctes();
    let schema = out.db.as_deref().or(ctx.config().schema.as_deref());
    let table = TableRef::new(&out.coll).with_schema(schema);
    Ok(Statement::Insert {
        table,
        columns: vec![ctx.data_column().to_string()],
        query,
    })
}

fn merge_condition(ctx: &GenerationContext, field: &str) -> TokenStream {
    let source = qualified(SOURCE_ALIAS, ctx.data_column());
    let mut ts = if field == "_id" {
        qualified(TARGET_ALIAS, &ctx.config().id_column)
    } else {
        json_value_of(&qualified(TARGET_ALIAS, ctx.data_column()), field)
    };
    ts.raw_sql(" = ").append(&json_value_of(&source, field));
    ts
}

/// `$merge`: MERGE the documents into the target table.
///
/// Matching on `_id` compares the target's key column; other keys compare
/// document values and so cannot be combined with an updating
/// `whenMatched` (Oracle rejects updates to columns referenced in ON).
pub(super) fn merge_statement(
    ctx: &mut GenerationContext,
    block: Block,
    merge: &Merge,
) -> TranslateResult<Statement> {
    let mut source = document_query(ctx, block);
    source.with = ctx.take_ctes();

    let by_id = merge.on.iter().all(|f| f == "_id");
    let mut on = TokenStream::new();
    for (i, field) in merge.on.iter().enumerate() {
        if i > 0 {
            on.raw_sql(" AND ");
        }
        on.append(&merge_condition(ctx, field));
    }

    let data = ctx.data_column().to_string();
    let target_doc = qualified(TARGET_ALIAS, &data);
    let source_doc = qualified(SOURCE_ALIAS, &data);
    let when_matched = match merge.when_matched {
        WhenMatched::KeepExisting => None,
        WhenMatched::Fail => {
            return Err(TranslateError::unsupported(
                "$merge",
                "whenMatched 'fail' has no MERGE equivalent",
            ))
        }
        WhenMatched::Replace | WhenMatched::Merge if !by_id => {
            return Err(TranslateError::unsupported(
                "$merge",
                "updating documents matched on fields other than _id",
            ))
        }
        WhenMatched::Replace => {
            let mut ts = TokenStream::raw("UPDATE SET ");
            ts.append(&target_doc).raw_sql(" = ").append(&source_doc);
            Some(ts)
        }
        WhenMatched::Merge => {
            let mut ts = TokenStream::raw("UPDATE SET ");
            ts.append(&target_doc)
                .raw_sql(" = JSON_MERGEPATCH(")
                .append(&target_doc)
                .comma()
                .space()
                .append(&source_doc)
                .rparen();
            Some(ts)
        }
    };

    let when_not_matched = match merge.when_not_matched {
        WhenNotMatched::Discard => None,
        WhenNotMatched::Fail => {
            return Err(TranslateError::unsupported(
                "$merge",
                "whenNotMatched 'fail' has no MERGE equivalent",
            ))
        }
        WhenNotMatched::Insert => {
            let mut ts = TokenStream::raw("INSERT (");
            if by_id {
                ts.push(Token::Ident(ctx.config().id_column.clone()))
                    .comma()
                    .space()
                    .push(Token::Ident(data.clone()))
                    .raw_sql(") VALUES (")
                    .append(&json_value_of(&source_doc, "_id"))
                    .comma()
                    .space();
            } else {
                ts.push(Token::Ident(data.clone())).raw_sql(") VALUES (");
            }
            ts.append(&source_doc).rparen();
            Some(ts)
        }
    };

    if when_matched.is_none() && when_not_matched.is_none() {
        return Err(TranslateError::structural(
            "$merge with whenMatched 'keepExisting' and whenNotMatched 'discard' writes nothing",
        ));
    }

    let schema = merge.db.as_deref().or(ctx.config().schema.as_deref());
    let target = TableRef::new(&merge.into)
        .with_schema(schema)
        .with_alias(TARGET_ALIAS);
    Ok(Statement::Merge(Box::new(MergeStatement {
        target,
        source,
        source_alias: SOURCE_ALIAS.to_string(),
        on,
        when_matched,
        when_not_matched,
    })))
}
