//! Array operators.
//!
//! Positional access (`$arrayElemAt`, `$slice`, `$first`, `$last`) becomes
//! a JSON path step. Everything that iterates elements expands the array
//! with `JSON_TABLE` and aggregates it back inside a scalar subquery.

use super::{json_query, json_value, numeric, GenerationContext};
use crate::ast::{json_path_of, ArrayExpr, ArrayOp, Expression, JsonReturnType, Literal};
use crate::error::{TranslateError, TranslateResult};
use crate::generator::scope::{qualified, Resolved};
use crate::sql::dialect::SqlDialect;
use crate::sql::token::{Token, TokenStream};
use crate::translate::TranslationCapability;

/// A JSON array addressed by `path` inside `doc`.
pub(super) struct ArraySource {
    doc: TokenStream,
    path: String,
    /// `path` already yields the elements (`$[*].qty` over a lookup result).
    each: bool,
}

impl ArraySource {
    fn elements_path(&self) -> String {
        if self.each {
            self.path.clone()
        } else {
            format!("{}[*]", self.path)
        }
    }

    fn step(&self, step: &str) -> String {
        format!("{}{}", self.path, step)
    }
}

pub(super) fn source(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<ArraySource> {
    match expr {
        Expression::FieldPath(fp) => Ok(field_source(ctx, fp.path())),
        Expression::Variable { name, path } => {
            if let Some(alias) = ctx.element(name) {
                return Ok(ArraySource {
                    doc: qualified(alias, "value"),
                    path: json_path_of(path.as_deref().unwrap_or("")),
                    each: false,
                });
            }
            match (name.as_str(), path) {
                ("ROOT" | "CURRENT", Some(p)) => Ok(field_source(ctx, p)),
                _ => computed_source(ctx, expr),
            }
        }
        Expression::Literal(lit @ Literal::Array(_)) => {
            let mut doc = TokenStream::new();
            doc.push(Token::literal(lit));
            Ok(ArraySource {
                doc,
                path: "$".to_string(),
                each: false,
            })
        }
        _ => computed_source(ctx, expr),
    }
}

fn field_source(ctx: &GenerationContext, path: &str) -> ArraySource {
    match ctx.scope().resolve(path, false) {
        Resolved::Json(location) => ArraySource {
            path: location.json_path(),
            each: location.each,
            doc: location.doc,
        },
        Resolved::Value { expr, .. } => ArraySource {
            doc: expr,
            path: "$".to_string(),
            each: false,
        },
        Resolved::Missing => {
            let mut doc = TokenStream::new();
            doc.push(Token::LitNull);
            ArraySource {
                doc,
                path: "$".to_string(),
                each: false,
            }
        }
    }
}

fn computed_source(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<ArraySource> {
    let doc = ctx.capture(|c| super::json(c, expr).map(|_| ()))?;
    Ok(ArraySource {
        doc,
        path: "$".to_string(),
        each: false,
    })
}

/// `JSON_TABLE(doc, 'path[*]' COLUMNS (...)) alias`
///
/// Every element row exposes `rn` (1-based position), `value` (the element
/// as JSON), `s` (its string form) and `n` (its numeric form).
fn table(ctx: &mut GenerationContext, src: &ArraySource, alias: &str) {
    let value_column = ctx.dialect().unwind_value_column();
    ctx.raw("JSON_TABLE(")
        .append(&src.doc)
        .raw(", ")
        .string(&src.elements_path())
        .raw(" COLUMNS (rn FOR ORDINALITY, ")
        .raw(value_column)
        .raw(", s VARCHAR2(4000) PATH '$', n NUMBER PATH '$')) ")
        .ident(alias);
}

/// Element variable reference: `$$this` or `$$this.price`.
pub(super) fn element(ctx: &mut GenerationContext, alias: &str, path: Option<&str>, ty: Option<JsonReturnType>) {
    match path {
        None => {
            let column = match ty {
                Some(JsonReturnType::Number) => "n",
                Some(JsonReturnType::Json) => "value",
                _ => "s",
            };
            ctx.qualified(alias, column);
        }
        Some(p) => {
            let value = qualified(alias, "value");
            json_value(ctx, &value, &json_path_of(p), ty);
        }
    }
}

fn input(a: &ArrayExpr) -> TranslateResult<&Expression> {
    a.array.as_deref().ok_or_else(|| {
        TranslateError::structural(format!("{} requires an input array", a.op.mongo_name()))
    })
}

/// Largest array subscript written into a JSON path.
const MAX_SUBSCRIPT: u64 = i32::MAX as u64;

fn subscript(i: u64) -> u64 {
    i.min(MAX_SUBSCRIPT)
}

fn position(index: i64) -> String {
    match index {
        i if i >= 0 => format!("[{}]", subscript(i.unsigned_abs())),
        i => format!("[{}]", last_offset(i.unsigned_abs() - 1)),
    }
}

fn last_offset(k: u64) -> String {
    if k == 0 {
        "last".to_string()
    } else {
        format!("last-{}", subscript(k))
    }
}

/// JSON path range for a literal `$slice`, or `None` when it selects nothing.
fn slice_range(skip: Option<i64>, count: i64) -> Option<(String, String)> {
    let taken = count.unsigned_abs();
    match skip {
        None if count > 0 => Some(("0".to_string(), subscript(taken - 1).to_string())),
        None if count < 0 => Some((last_offset(taken - 1), "last".to_string())),
        None => None,
        Some(_) if count <= 0 => None,
        Some(s) if s >= 0 => {
            let start = s.unsigned_abs();
            let end = start.saturating_add(taken - 1);
            Some((subscript(start).to_string(), subscript(end).to_string()))
        }
        Some(s) => {
            let start = s.unsigned_abs() - 1;
            let end = start.saturating_sub(taken - 1);
            Some((last_offset(start), last_offset(end)))
        }
    }
}

pub(super) fn value(ctx: &mut GenerationContext, a: &ArrayExpr, ty: Option<JsonReturnType>) -> TranslateResult<()> {
    match a.op {
        ArrayOp::ArrayElemAt => {
            let index = a.index.as_deref().ok_or_else(|| {
                TranslateError::structural("$arrayElemAt requires an index")
            })?;
            elem_at(ctx, input(a)?, index, ty)
        }
        ArrayOp::First => {
            let src = source(ctx, input(a)?)?;
            json_value(ctx, &src.doc, &src.step("[0]"), ty);
            Ok(())
        }
        ArrayOp::Last => {
            let src = source(ctx, input(a)?)?;
            json_value(ctx, &src.doc, &src.step("[last]"), ty);
            Ok(())
        }
        ArrayOp::Size => size(ctx, input(a)?),
        ArrayOp::Slice => slice(ctx, a),
        ArrayOp::ConcatArrays => concat(ctx, &a.args),
        ArrayOp::SetUnion => set_union(ctx, &a.args),
        ArrayOp::SetIntersection => set_filter(ctx, &a.args, true),
        ArrayOp::SetDifference => set_filter(ctx, &a.args, false),
        ArrayOp::IndexOfArray => index_of(ctx, input(a)?, &a.args),
        ArrayOp::ReverseArray => {
            let src = source(ctx, input(a)?)?;
            let alias = ctx.alias("elem");
            ctx.raw("(SELECT JSON_ARRAYAGG(")
                .qualified(&alias, "value")
                .raw(" FORMAT JSON ORDER BY ")
                .qualified(&alias, "rn")
                .raw(" DESC) FROM ");
            table(ctx, &src, &alias);
            ctx.raw(")");
            Ok(())
        }
        ArrayOp::SortArray => sort_array(ctx, input(a)?, &a.args[0]),
        ArrayOp::Filter => filter(ctx, a),
        ArrayOp::Map => map(ctx, a),
        ArrayOp::Reduce => reduce(ctx, a),
        ArrayOp::In
        | ArrayOp::IsArray
        | ArrayOp::SetEquals
        | ArrayOp::SetIsSubset
        | ArrayOp::AnyElementTrue
        | ArrayOp::AllElementsTrue => Err(TranslateError::structural(format!(
            "{} is a condition",
            a.op.mongo_name()
        ))),
    }
}

pub(super) fn condition(ctx: &mut GenerationContext, a: &ArrayExpr) -> TranslateResult<()> {
    match a.op {
        ArrayOp::In => {
            let needle = a.args.first().ok_or_else(|| {
                TranslateError::structural("$in requires a value and an array")
            })?;
            contains(ctx, input(a)?, needle)
        }
        ArrayOp::IsArray => {
            let src = source(ctx, input(a)?)?;
            json_value(ctx, &src.doc, &src.step(".type()"), None);
            ctx.raw(" = 'array'");
            Ok(())
        }
        ArrayOp::SetIsSubset => subset(ctx, &a.args[0], &a.args[1]),
        ArrayOp::SetEquals => {
            ctx.raw("(");
            for (i, other) in a.args[1..].iter().enumerate() {
                if i > 0 {
                    ctx.raw(" AND ");
                }
                subset(ctx, &a.args[0], other)?;
                ctx.raw(" AND ");
                subset(ctx, other, &a.args[0])?;
            }
            ctx.raw(")");
            Ok(())
        }
        ArrayOp::AnyElementTrue | ArrayOp::AllElementsTrue => {
            let any = a.op == ArrayOp::AnyElementTrue;
            let src = source(ctx, input(a)?)?;
            let alias = ctx.alias("elem");
            let s = qualified(&alias, "s");
            ctx.raw(if any { "EXISTS (SELECT 1 FROM " } else { "NOT EXISTS (SELECT 1 FROM " });
            table(ctx, &src, &alias);
            if any {
                ctx.raw(" WHERE ")
                    .append(&s)
                    .raw(" IS NOT NULL AND LOWER(")
                    .append(&s)
                    .raw(") NOT IN ('0', 'false'))");
            } else {
                ctx.raw(" WHERE ")
                    .append(&s)
                    .raw(" IS NULL OR LOWER(")
                    .append(&s)
                    .raw(") IN ('0', 'false'))");
            }
            Ok(())
        }
        _ => Err(TranslateError::structural(format!(
            "{} is not a condition",
            a.op.mongo_name()
        ))),
    }
}

fn elem_at(
    ctx: &mut GenerationContext,
    array: &Expression,
    index: &Expression,
    ty: Option<JsonReturnType>,
) -> TranslateResult<()> {
    let src = source(ctx, array)?;
    if let Some(i) = index.as_literal().and_then(Literal::as_i64) {
        json_value(ctx, &src.doc, &src.step(&position(i)), ty);
        return Ok(());
    }
    let alias = ctx.alias("elem");
    ctx.raw("(SELECT ");
    element(ctx, &alias, None, ty);
    ctx.raw(" FROM ");
    table(ctx, &src, &alias);
    ctx.raw(" WHERE ").qualified(&alias, "rn").raw(" = ");
    numeric(ctx, index)?;
    ctx.raw(" + 1)");
    Ok(())
}

fn size(ctx: &mut GenerationContext, array: &Expression) -> TranslateResult<()> {
    if let Expression::FieldPath(fp) = array {
        let foreign = ctx.scope().lookup(fp.path()).and_then(|l| l.foreign.clone());
        if let Some(fk) = foreign {
            return super::lookup_size(ctx, &fk.from, fk.local_field.path(), fk.foreign_field.path());
        }
    }
    let src = source(ctx, array)?;
    json_value(
        ctx,
        &src.doc,
        &src.step(".size()"),
        Some(JsonReturnType::Number),
    );
    Ok(())
}

fn slice(ctx: &mut GenerationContext, a: &ArrayExpr) -> TranslateResult<()> {
    let array = input(a)?;
    let second = a
        .index
        .as_deref()
        .ok_or_else(|| TranslateError::structural("$slice requires a count"))?;
    let (skip, count) = match a.args.first() {
        Some(count) => (Some(second), count),
        None => (None, second),
    };
    let literal_skip = match skip {
        None => Some(None),
        Some(s) => s.as_literal().and_then(Literal::as_i64).map(Some),
    };
    let literal_count = count.as_literal().and_then(Literal::as_i64);

    let src = source(ctx, array)?;
    if let (Some(skip), Some(count)) = (literal_skip, literal_count) {
        match slice_range(skip, count) {
            Some((from, to)) => {
                json_query(ctx, &src.doc, &src.step(&format!("[{} to {}]", from, to)), true)
            }
            None => {
                ctx.raw("JSON_ARRAY()");
            }
        }
        return Ok(());
    }

    ctx.warn(
        "$slice",
        "computed bounds are assumed to be non-negative",
        TranslationCapability::Partial,
    )?;
    let alias = ctx.alias("elem");
    let rn = qualified(&alias, "rn");
    ctx.raw("(SELECT JSON_ARRAYAGG(")
        .qualified(&alias, "value")
        .raw(" FORMAT JSON ORDER BY ")
        .append(&rn)
        .raw(") FROM ");
    table(ctx, &src, &alias);
    ctx.raw(" WHERE ");
    match skip {
        None => {
            ctx.append(&rn).raw(" <= ");
            numeric(ctx, count)?;
        }
        Some(skip) => {
            let skip = ctx.capture(|c| numeric(c, skip))?;
            ctx.append(&rn)
                .raw(" > ")
                .append(&skip)
                .raw(" AND ")
                .append(&rn)
                .raw(" <= ")
                .append(&skip)
                .raw(" + ");
            numeric(ctx, count)?;
        }
    }
    ctx.raw(")");
    Ok(())
}

/// Element rows of every argument, tagged with the argument ordinal.
fn tagged_union(ctx: &mut GenerationContext, args: &[Expression], column: &str) -> TranslateResult<()> {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            ctx.raw(" UNION ALL ");
        }
        let src = source(ctx, arg)?;
        let alias = ctx.alias("elem");
        ctx.raw(&format!("SELECT {} AS src, ", i + 1))
            .qualified(&alias, "rn")
            .raw(", ")
            .qualified(&alias, column)
            .raw(" FROM ");
        table(ctx, &src, &alias);
    }
    Ok(())
}

fn concat(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<()> {
    let u = ctx.alias("arr");
    ctx.raw("(SELECT JSON_ARRAYAGG(")
        .qualified(&u, "value")
        .raw(" FORMAT JSON ORDER BY ")
        .qualified(&u, "src")
        .raw(", ")
        .qualified(&u, "rn")
        .raw(") FROM (");
    tagged_union(ctx, args, "value")?;
    ctx.raw(") ").ident(&u).raw(")");
    Ok(())
}

fn set_union(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<()> {
    ctx.warn(
        "$setUnion",
        "elements are compared and returned as strings",
        TranslationCapability::Emulated,
    )?;
    let u = ctx.alias("arr");
    let d = ctx.alias("arr");
    ctx.raw("(SELECT JSON_ARRAYAGG(")
        .qualified(&d, "s")
        .raw(" ORDER BY ")
        .qualified(&d, "src")
        .raw(", ")
        .qualified(&d, "rn")
        .raw(") FROM (SELECT ")
        .qualified(&u, "s")
        .raw(", MIN(")
        .qualified(&u, "src")
        .raw(") AS src, MIN(")
        .qualified(&u, "rn")
        .raw(") AS rn FROM (");
    tagged_union(ctx, args, "s")?;
    ctx.raw(") ")
        .ident(&u)
        .raw(" GROUP BY ")
        .qualified(&u, "s")
        .raw(") ")
        .ident(&d)
        .raw(")");
    Ok(())
}

/// `EXISTS (SELECT 1 FROM JSON_TABLE(other) o WHERE o.s = <s>)`
fn member_of(ctx: &mut GenerationContext, s: &TokenStream, other: &Expression) -> TranslateResult<()> {
    let src = source(ctx, other)?;
    let alias = ctx.alias("elem");
    ctx.raw("EXISTS (SELECT 1 FROM ");
    table(ctx, &src, &alias);
    ctx.raw(" WHERE ")
        .qualified(&alias, "s")
        .raw(" = ")
        .append(s)
        .raw(")");
    Ok(())
}

/// `$setIntersection` keeps elements present in every other argument,
/// `$setDifference` those absent from the second.
fn set_filter(ctx: &mut GenerationContext, args: &[Expression], intersect: bool) -> TranslateResult<()> {
    let feature = if intersect { "$setIntersection" } else { "$setDifference" };
    ctx.warn(
        feature,
        "elements are compared and returned as strings",
        TranslationCapability::Emulated,
    )?;
    let src = source(ctx, &args[0])?;
    let alias = ctx.alias("elem");
    let d = ctx.alias("arr");
    let s = qualified(&alias, "s");
    ctx.raw("(SELECT JSON_ARRAYAGG(")
        .qualified(&d, "s")
        .raw(") FROM (SELECT DISTINCT ")
        .append(&s)
        .raw(" FROM ");
    table(ctx, &src, &alias);
    for (i, other) in args[1..].iter().enumerate() {
        ctx.raw(if i == 0 { " WHERE " } else { " AND " });
        if !intersect {
            ctx.raw("NOT ");
        }
        member_of(ctx, &s, other)?;
    }
    ctx.raw(") ").ident(&d).raw(")");
    Ok(())
}

/// Every element of `a` is an element of `b`.
fn subset(ctx: &mut GenerationContext, a: &Expression, b: &Expression) -> TranslateResult<()> {
    let src = source(ctx, a)?;
    let alias = ctx.alias("elem");
    let s = qualified(&alias, "s");
    ctx.raw("NOT EXISTS (SELECT 1 FROM ");
    table(ctx, &src, &alias);
    ctx.raw(" WHERE NOT ");
    member_of(ctx, &s, b)?;
    ctx.raw(")");
    Ok(())
}

/// `$in: [value, array]`
fn contains(ctx: &mut GenerationContext, array: &Expression, needle: &Expression) -> TranslateResult<()> {
    if let Some(items) = array.as_literal().and_then(Literal::as_array) {
        if items.is_empty() {
            ctx.raw("1 = 0");
            return Ok(());
        }
        return super::in_list(ctx, needle, items, false);
    }
    let numeric_needle = needle.as_literal().is_some_and(Literal::is_numeric);
    let src = source(ctx, array)?;
    let alias = ctx.alias("elem");
    ctx.raw("EXISTS (SELECT 1 FROM ");
    table(ctx, &src, &alias);
    ctx.raw(" WHERE ");
    if numeric_needle {
        ctx.qualified(&alias, "n").raw(" = ");
        numeric(ctx, needle)?;
    } else {
        ctx.qualified(&alias, "s").raw(" = ");
        super::typed(ctx, needle, JsonReturnType::Varchar)?;
    }
    ctx.raw(")");
    Ok(())
}

/// `$indexOfArray: [array, value, start?, end?]`, -1 when absent.
fn index_of(ctx: &mut GenerationContext, array: &Expression, args: &[Expression]) -> TranslateResult<()> {
    let needle = &args[0];
    let numeric_needle = needle.as_literal().is_some_and(Literal::is_numeric);
    let src = source(ctx, array)?;
    let alias = ctx.alias("elem");
    ctx.raw("(SELECT NVL(MIN(")
        .qualified(&alias, "rn")
        .raw(") - 1, -1) FROM ");
    table(ctx, &src, &alias);
    ctx.raw(" WHERE ");
    if numeric_needle {
        ctx.qualified(&alias, "n").raw(" = ");
        numeric(ctx, needle)?;
    } else {
        ctx.qualified(&alias, "s").raw(" = ");
        super::typed(ctx, needle, JsonReturnType::Varchar)?;
    }
    if let Some(start) = args.get(1) {
        ctx.raw(" AND ").qualified(&alias, "rn").raw(" > ");
        numeric(ctx, start)?;
    }
    if let Some(end) = args.get(2) {
        ctx.raw(" AND ").qualified(&alias, "rn").raw(" <= ");
        numeric(ctx, end)?;
    }
    ctx.raw(")");
    Ok(())
}

fn sort_array(ctx: &mut GenerationContext, array: &Expression, sort_by: &Expression) -> TranslateResult<()> {
    let src = source(ctx, array)?;
    let alias = ctx.alias("elem");
    let direction = |n: Option<i64>| if n == Some(-1) { " DESC" } else { " ASC" };

    let order = ctx.capture(|c| {
        match sort_by {
            Expression::Literal(lit) => {
                let dir = direction(lit.as_i64());
                c.qualified(&alias, "n")
                    .raw(dir)
                    .raw(", ")
                    .qualified(&alias, "s")
                    .raw(dir);
            }
            Expression::Document(fields) => {
                let value = qualified(&alias, "value");
                for (i, (key, dir)) in fields.iter().enumerate() {
                    if i > 0 {
                        c.raw(", ");
                    }
                    json_value(c, &value, &json_path_of(key), None);
                    c.raw(direction(dir.as_literal().and_then(Literal::as_i64)));
                }
            }
            _ => {
                return Err(TranslateError::structural(
                    "$sortArray sortBy must be 1, -1 or a document of directions",
                ))
            }
        }
        Ok(())
    })?;

    ctx.raw("(SELECT JSON_ARRAYAGG(")
        .qualified(&alias, "value")
        .raw(" FORMAT JSON ORDER BY ")
        .append(&order)
        .raw(") FROM ");
    table(ctx, &src, &alias);
    ctx.raw(")");
    Ok(())
}

/// Render `body` with `var` bound to the rows of `alias`.
fn with_element<T, F>(ctx: &mut GenerationContext, var: &str, alias: &str, f: F) -> TranslateResult<T>
where
    F: FnOnce(&mut GenerationContext) -> TranslateResult<T>,
{
    ctx.push_element(var, alias);
    let result = f(ctx);
    ctx.pop_element();
    result
}

fn filter(ctx: &mut GenerationContext, a: &ArrayExpr) -> TranslateResult<()> {
    let src = source(ctx, input(a)?)?;
    let alias = ctx.alias("elem");
    let var = a.var.as_deref().unwrap_or("this");
    let cond = with_element(ctx, var, &alias, |c| c.capture(|c| super::condition(c, &a.args[0])))?;

    let limit = match a.index.as_deref() {
        None => None,
        Some(expr) => match expr.as_literal().and_then(Literal::as_i64) {
            Some(n) if n > 0 => Some(n as u64),
            _ => {
                return Err(TranslateError::unsupported(
                    "$filter",
                    "limit must be a positive integer literal",
                ))
            }
        },
    };

    match limit {
        None => {
            ctx.raw("(SELECT JSON_ARRAYAGG(")
                .qualified(&alias, "value")
                .raw(" FORMAT JSON ORDER BY ")
                .qualified(&alias, "rn")
                .raw(") FROM ");
            table(ctx, &src, &alias);
            ctx.raw(" WHERE ").append(&cond).raw(")");
        }
        Some(n) => {
            let f = ctx.alias("arr");
            let fetch = ctx.dialect().emit_limit_offset(Some(n), None);
            ctx.raw("(SELECT JSON_ARRAYAGG(")
                .qualified(&f, "value")
                .raw(" FORMAT JSON ORDER BY ")
                .qualified(&f, "rn")
                .raw(") FROM (SELECT ")
                .qualified(&alias, "rn")
                .raw(", ")
                .qualified(&alias, "value")
                .raw(" FROM ");
            table(ctx, &src, &alias);
            ctx.raw(" WHERE ")
                .append(&cond)
                .raw(" ORDER BY ")
                .qualified(&alias, "rn")
                .raw(" ")
                .append(&fetch)
                .raw(") ")
                .ident(&f)
                .raw(")");
        }
    }
    Ok(())
}

fn map(ctx: &mut GenerationContext, a: &ArrayExpr) -> TranslateResult<()> {
    let src = source(ctx, input(a)?)?;
    let alias = ctx.alias("elem");
    let var = a.var.as_deref().unwrap_or("this");
    let (body, json) = with_element(ctx, var, &alias, |c| {
        let mut json = false;
        let body = c.capture(|c| {
            json = super::json(c, &a.args[0])?;
            Ok(())
        })?;
        Ok((body, json))
    })?;

    ctx.raw("(SELECT JSON_ARRAYAGG(").append(&body);
    if json {
        ctx.raw(" FORMAT JSON");
    }
    ctx.raw(" ORDER BY ").qualified(&alias, "rn").raw(") FROM ");
    table(ctx, &src, &alias);
    ctx.raw(")");
    Ok(())
}

fn references_accumulator_value(expr: &Expression) -> bool {
    let mut found = false;
    expr.walk(&mut |e| {
        if matches!(e, Expression::Variable { name, .. } if name == "value") {
            found = true;
        }
    });
    found
}

fn is_value_var(expr: &Expression) -> bool {
    matches!(expr, Expression::Variable { name, path: None } if name == "value")
}

/// `$reduce` folds translate when the body is `$add` or `$concat` with
/// `$$value` as one operand.
fn reduce(ctx: &mut GenerationContext, a: &ArrayExpr) -> TranslateResult<()> {
    let (initial, body) = (&a.args[0], &a.args[1]);
    let src = source(ctx, input(a)?)?;
    let alias = ctx.alias("elem");

    let (op, rest): (&str, Vec<&Expression>) = match body {
        Expression::Arithmetic {
            op: crate::ast::ArithmeticOp::Add,
            operands,
        } if operands.iter().filter(|e| is_value_var(e)).count() == 1 => {
            ("+", operands.iter().filter(|e| !is_value_var(e)).collect())
        }
        Expression::String {
            op: crate::ast::StringOp::Concat,
            args,
        } if args.first().is_some_and(is_value_var) => ("||", args[1..].iter().collect()),
        _ => {
            return Err(TranslateError::unsupported(
                "$reduce",
                "only $add and $concat folds over $$value translate to SQL",
            ))
        }
    };
    if rest.is_empty() || rest.iter().any(|e| references_accumulator_value(e)) {
        return Err(TranslateError::unsupported(
            "$reduce",
            "$$value may appear only once, as a direct operand",
        ));
    }

    let step = with_element(ctx, "this", &alias, |c| {
        c.capture(|c| {
            for (i, e) in rest.iter().enumerate() {
                if i > 0 {
                    c.raw(if op == "+" { " + " } else { " || " });
                }
                if op == "+" {
                    numeric(c, e)?;
                } else {
                    super::value(c, e)?;
                }
            }
            Ok(())
        })
    })?;

    ctx.raw("(SELECT ");
    if op == "+" {
        numeric(ctx, initial)?;
        ctx.raw(" + NVL(SUM(").append(&step).raw("), 0)");
    } else {
        super::value(ctx, initial)?;
        ctx.raw(" || LISTAGG(")
            .append(&step)
            .raw(", '') WITHIN GROUP (ORDER BY ")
            .qualified(&alias, "rn")
            .raw(")");
    }
    ctx.raw(" FROM ");
    table(ctx, &src, &alias);
    ctx.raw(")");
    Ok(())
}

/// `$max`/`$min` (and the accumulators) applied to a single array operand.
pub(super) fn aggregate(ctx: &mut GenerationContext, array: &Expression, function: &str) -> TranslateResult<()> {
    let src = source(ctx, array)?;
    let alias = ctx.alias("elem");
    ctx.raw("(SELECT ")
        .raw(function)
        .raw("(")
        .qualified(&alias, "n")
        .raw(") FROM ");
    table(ctx, &src, &alias);
    ctx.raw(")");
    Ok(())
}

/// `$min`/`$max` over the elements of `array`, ordering numbers before strings.
pub(super) fn extreme(ctx: &mut GenerationContext, array: &Expression, max: bool) -> TranslateResult<()> {
    ctx.warn(
        if max { "$max" } else { "$min" },
        "element types are unknown; numbers order before strings and the result is text",
        TranslationCapability::Emulated,
    )?;
    let src = source(ctx, array)?;
    let alias = ctx.alias("elem");
    let n = ctx.capture(|c| {
        c.qualified(&alias, "n");
        Ok(())
    })?;
    let s = ctx.capture(|c| {
        c.qualified(&alias, "s");
        Ok(())
    })?;
    ctx.raw("(SELECT ");
    super::accumulator::mixed_extreme(ctx, &n, &s, max, &TokenStream::new());
    ctx.raw(" FROM ");
    table(ctx, &src, &alias);
    ctx.raw(")");
    Ok(())
}

/// `$arrayToObject` over `[k, v]` pairs or `{k, v}` documents.
pub(super) fn to_object(ctx: &mut GenerationContext, array: &Expression) -> TranslateResult<()> {
    ctx.warn(
        "$arrayToObject",
        "values are rebuilt as strings",
        TranslationCapability::Emulated,
    )?;
    let src = source(ctx, array)?;
    let alias = ctx.alias("pair");
    ctx.raw("(SELECT JSON_OBJECTAGG(KEY COALESCE(")
        .qualified(&alias, "k")
        .raw(", ")
        .qualified(&alias, "k0")
        .raw(") VALUE COALESCE(")
        .qualified(&alias, "v")
        .raw(", ")
        .qualified(&alias, "v1")
        .raw(")) FROM JSON_TABLE(")
        .append(&src.doc)
        .raw(", ")
        .string(&src.elements_path())
        .raw(
            " COLUMNS (k VARCHAR2(4000) PATH '$.k', v VARCHAR2(4000) PATH '$.v', \
             k0 VARCHAR2(4000) PATH '$[0]', v1 VARCHAR2(4000) PATH '$[1]')) ",
        )
        .ident(&alias)
        .raw(")");
    Ok(())
}
