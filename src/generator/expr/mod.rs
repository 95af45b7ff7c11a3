//! Expression translator.
//!
//! Every expression renders in one of three contexts:
//!
//! - [`value`]: an SQL scalar (optionally of a requested type, see [`typed`])
//! - [`condition`]: an SQL boolean condition
//! - [`json`]: a value embedded in a JSON document
//!
//! A condition used as a value becomes a `CASE` over the dialect's boolean
//! literals; a value used as a condition is checked for MongoDB truthiness.

mod accumulator;
mod array;
mod convert;
mod string;

pub use accumulator::{aggregate, window_function};

use super::context::GenerationContext;
use super::scope::{JsonRef, Resolved};
use crate::ast::{
    json_path_of, ArithmeticOp, ComparisonOp, Conditional, DateOp, Expression, JsonReturnType,
    Literal, LogicalOp, ObjectOp, TypeConversionOp,
};
use crate::error::{TranslateError, TranslateResult};
use crate::sql::dialect::SqlDialect;
use crate::sql::query::TableRef;
use crate::sql::token::{Token, TokenStream};
use crate::translate::TranslationCapability;
use tracing::trace;

/// Render `expr` as an SQL scalar.
pub fn value(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<()> {
    render(ctx, expr, None)
}

/// Render `expr` as a scalar, extracting JSON fields as `ty`.
pub fn typed(ctx: &mut GenerationContext, expr: &Expression, ty: JsonReturnType) -> TranslateResult<()> {
    render(ctx, expr, Some(ty))
}

pub fn numeric(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<()> {
    render(ctx, expr, Some(JsonReturnType::Number))
}

/// Render `expr` for embedding in a JSON document.
///
/// Returns whether the rendered SQL is JSON (and needs `FORMAT JSON`).
pub fn json(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<bool> {
    expr.check_shape()?;
    match expr {
        Expression::FieldPath(fp) => field_json(ctx, fp.path()),
        Expression::Variable { name, path } => {
            if let Some(alias) = ctx.element(name).map(str::to_string) {
                return match path {
                    None => {
                        ctx.qualified(&alias, "value");
                        Ok(true)
                    }
                    Some(p) => {
                        let value = super::scope::qualified(&alias, "value");
                        json_query(ctx, &value, &json_path_of(p), false);
                        Ok(true)
                    }
                };
            }
            match (name.as_str(), path) {
                ("ROOT" | "CURRENT", None) => {
                    let doc = ctx.scope().document_expr(ctx.dialect());
                    ctx.append(&doc);
                    Ok(true)
                }
                ("ROOT" | "CURRENT", Some(p)) => field_json(ctx, p),
                _ => {
                    render(ctx, expr, None)?;
                    Ok(false)
                }
            }
        }
        Expression::Literal(lit @ Literal::Array(_)) => {
            ctx.push(Token::literal(lit));
            Ok(true)
        }
        _ => {
            render(ctx, expr, None)?;
            Ok(returns_json(expr))
        }
    }
}

/// Render `expr` as an SQL condition.
pub fn condition(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<()> {
    expr.check_shape()?;
    match expr {
        Expression::Comparison { op, left, right } => comparison(ctx, *op, left, right),
        Expression::Logical { op, operands } => logical(ctx, *op, operands),
        Expression::Exists { field, exists } => exists_condition(ctx, field.path(), *exists),
        Expression::Literal(lit) => {
            constant_condition(ctx, is_truthy(lit));
            Ok(())
        }
        Expression::String { op, args } if *op == crate::ast::StringOp::RegexMatch => {
            string::regex_match(ctx, args)
        }
        Expression::Array(a) if expr.is_condition() => array::condition(ctx, a),
        Expression::TypeConversion(tc) if tc.op == TypeConversionOp::IsNumber => {
            convert::is_number(ctx, &tc.arg)
        }
        _ => truthiness(ctx, expr),
    }
}

/// Whether `expr` renders as JSON text in a value context.
pub fn returns_json(expr: &Expression) -> bool {
    use crate::ast::{AccumulatorOp, ArrayOp, StringOp};
    match expr {
        Expression::Literal(Literal::Array(_))
        | Expression::Document(_)
        | Expression::CompoundId(_) => true,
        Expression::Array(a) => matches!(
            a.op,
            ArrayOp::Filter
                | ArrayOp::Map
                | ArrayOp::ConcatArrays
                | ArrayOp::Slice
                | ArrayOp::ReverseArray
                | ArrayOp::SortArray
                | ArrayOp::SetUnion
                | ArrayOp::SetIntersection
                | ArrayOp::SetDifference
        ),
        Expression::String { op, .. } => matches!(op, StringOp::Split | StringOp::RegexFind),
        Expression::Object { op, .. } => {
            matches!(op, ObjectOp::MergeObjects | ObjectOp::ArrayToObject)
        }
        Expression::Accumulator { op, .. } => {
            matches!(op, AccumulatorOp::Push | AccumulatorOp::AddToSet)
        }
        Expression::Conditional(Conditional::Cond { then, .. }) => returns_json(then),
        Expression::Conditional(Conditional::IfNull(args)) => args.first().is_some_and(returns_json),
        _ => false,
    }
}

fn render(ctx: &mut GenerationContext, expr: &Expression, ty: Option<JsonReturnType>) -> TranslateResult<()> {
    expr.check_shape()?;
    if expr.is_condition() {
        return bool_value(ctx, expr);
    }
    match expr {
        Expression::FieldPath(fp) => field(ctx, fp.path(), fp.return_type(), ty),
        Expression::Variable { name, path } => variable(ctx, name, path.as_deref(), ty),
        Expression::Literal(lit @ Literal::Array(_)) => {
            ctx.push(Token::literal(lit));
            Ok(())
        }
        Expression::Literal(lit) => {
            ctx.bind(lit);
            Ok(())
        }
        Expression::Comparison { .. } | Expression::Logical { .. } | Expression::Exists { .. } => {
            bool_value(ctx, expr)
        }
        Expression::Arithmetic { op, operands } => arithmetic(ctx, *op, operands),
        Expression::Array(a) => array::value(ctx, a, ty),
        Expression::String { op, args } => string::render(ctx, *op, args),
        Expression::Date { op, arg } => date(ctx, *op, arg),
        Expression::Conditional(Conditional::Cond {
            condition: cond,
            then,
            otherwise,
        }) => {
            ctx.push(Token::Case).raw(" ").push(Token::When).raw(" ");
            condition(ctx, cond)?;
            ctx.raw(" ").push(Token::Then).raw(" ");
            render(ctx, then, ty)?;
            ctx.raw(" ").push(Token::Else).raw(" ");
            render(ctx, otherwise, ty)?;
            ctx.raw(" ").push(Token::End);
            Ok(())
        }
        Expression::Conditional(Conditional::IfNull(args)) => {
            ctx.raw("COALESCE(");
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    ctx.raw(", ");
                }
                render(ctx, arg, ty)?;
            }
            ctx.raw(")");
            Ok(())
        }
        Expression::Switch { branches, default } => {
            ctx.push(Token::Case);
            for (case, then) in branches {
                ctx.raw(" ").push(Token::When).raw(" ");
                condition(ctx, case)?;
                ctx.raw(" ").push(Token::Then).raw(" ");
                render(ctx, then, ty)?;
            }
            if let Some(default) = default {
                ctx.raw(" ").push(Token::Else).raw(" ");
                render(ctx, default, ty)?;
            }
            ctx.raw(" ").push(Token::End);
            Ok(())
        }
        Expression::Accumulator { op, arg } => accumulator::over_array(ctx, *op, arg.as_deref()),
        Expression::CompoundId(fields) | Expression::Document(fields) => document(ctx, fields),
        Expression::TypeConversion(tc) => convert::render(ctx, tc),
        Expression::LookupSize {
            from,
            local_field,
            foreign_field,
        } => lookup_size(ctx, from, local_field, foreign_field),
        Expression::Object { op, args } => object(ctx, *op, args),
    }
}

// =============================================================================
// Fields and variables
// =============================================================================

fn field(
    ctx: &mut GenerationContext,
    path: &str,
    declared: Option<JsonReturnType>,
    ty: Option<JsonReturnType>,
) -> TranslateResult<()> {
    let ty = declared.or(ty);
    match ctx.scope().resolve(path, false) {
        Resolved::Value { expr, json } => match ty {
            Some(t) if json && t != JsonReturnType::Json => json_value(ctx, &expr, "$", Some(t)),
            _ => {
                ctx.append(&expr);
            }
        },
        Resolved::Json(location) => json_ref(ctx, &location, ty),
        // A field no earlier stage produced is missing, which compares as null.
        Resolved::Missing => {
            trace!(field = path, "unresolved field rendered as NULL");
            ctx.push(Token::LitNull);
        }
    }
    Ok(())
}

fn field_json(ctx: &mut GenerationContext, path: &str) -> TranslateResult<bool> {
    match ctx.scope().resolve(path, false) {
        Resolved::Value { expr, json } => {
            ctx.append(&expr);
            Ok(json)
        }
        Resolved::Json(location) => {
            if location.dot_notation {
                let dotted = location.dotted(ctx.dialect());
                ctx.append(&dotted);
                Ok(ctx.dialect().supports_json_type())
            } else if location.rest.is_empty() && !location.each {
                ctx.append(&location.doc);
                Ok(true)
            } else {
                json_query(ctx, &location.doc, &location.json_path(), location.each);
                Ok(true)
            }
        }
        Resolved::Missing => {
            ctx.push(Token::LitNull);
            Ok(false)
        }
    }
}

/// Extract a scalar from a resolved JSON location.
pub fn json_ref(ctx: &mut GenerationContext, location: &JsonRef, ty: Option<JsonReturnType>) {
    if location.each {
        json_query(ctx, &location.doc, &location.json_path(), true);
        return;
    }
    if location.dot_notation && !location.rest.is_empty() {
        let dotted = location.dotted(ctx.dialect());
        ctx.append(&dotted);
        if let Some(method) = item_method(ty.unwrap_or(JsonReturnType::Varchar)) {
            ctx.raw(method);
        }
        return;
    }
    json_value(ctx, &location.doc, &location.json_path(), ty);
}

fn item_method(ty: JsonReturnType) -> Option<&'static str> {
    match ty {
        JsonReturnType::Varchar => Some(".string()"),
        JsonReturnType::Number => Some(".number()"),
        JsonReturnType::Date => Some(".date()"),
        JsonReturnType::Timestamp => Some(".timestamp()"),
        JsonReturnType::Boolean => Some(".boolean()"),
        JsonReturnType::Json => None,
    }
}

/// `JSON_VALUE(doc, 'path' RETURNING ty)`
pub(crate) fn json_value(
    ctx: &mut GenerationContext,
    doc: &TokenStream,
    path: &str,
    ty: Option<JsonReturnType>,
) {
    if ty == Some(JsonReturnType::Json) {
        json_query(ctx, doc, path, false);
        return;
    }
    ctx.raw("JSON_VALUE(").append(doc).raw(", ").string(path);
    if let Some(t) = ty.filter(|t| *t != JsonReturnType::Varchar) {
        let keyword = ctx.dialect().json_return_type(t);
        ctx.raw(" RETURNING ").raw(keyword);
    }
    ctx.raw(")");
}

/// `JSON_QUERY(doc, 'path' [WITH ARRAY WRAPPER])`
pub(crate) fn json_query(ctx: &mut GenerationContext, doc: &TokenStream, path: &str, wrapper: bool) {
    ctx.raw("JSON_QUERY(").append(doc).raw(", ").string(path);
    if wrapper {
        ctx.raw(" WITH ARRAY WRAPPER");
    }
    ctx.raw(")");
}

/// JSON value and path holding `path`, when it lives inside a JSON value.
pub(crate) fn json_location(ctx: &GenerationContext, path: &str) -> Option<(TokenStream, String)> {
    match ctx.scope().resolve(path, false) {
        Resolved::Json(location) => Some((location.doc.clone(), location.json_path())),
        Resolved::Value { expr, json: true } => Some((expr, "$".to_string())),
        _ => None,
    }
}

fn variable(
    ctx: &mut GenerationContext,
    name: &str,
    path: Option<&str>,
    ty: Option<JsonReturnType>,
) -> TranslateResult<()> {
    if let Some(alias) = ctx.element(name).map(str::to_string) {
        array::element(ctx, &alias, path, ty);
        return Ok(());
    }
    match name {
        "ROOT" | "CURRENT" => match path {
            Some(p) => field(ctx, p, None, ty),
            None => {
                let doc = ctx.scope().document_expr(ctx.dialect());
                ctx.append(&doc);
                Ok(())
            }
        },
        "REMOVE" => {
            ctx.push(Token::LitNull);
            Ok(())
        }
        "NOW" => {
            ctx.raw("SYSTIMESTAMP");
            Ok(())
        }
        "KEEP" | "PRUNE" | "DESCEND" => {
            ctx.string(name);
            Ok(())
        }
        other => Err(TranslateError::unsupported(
            format!("$${}", other),
            "variable is not bound in this context",
        )),
    }
}

// =============================================================================
// Conditions
// =============================================================================

fn constant_condition(ctx: &mut GenerationContext, truth: bool) {
    ctx.raw(if truth { "1 = 1" } else { "1 = 0" });
}

fn is_truthy(lit: &Literal) -> bool {
    match lit {
        Literal::Null => false,
        Literal::Bool(b) => *b,
        Literal::Int(i) => *i != 0,
        Literal::Double(f) => *f != 0.0,
        Literal::String(_) | Literal::Array(_) => true,
    }
}

/// `CASE WHEN cond THEN TRUE ELSE FALSE END`
fn bool_value(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<()> {
    let (t, f) = (ctx.dialect().format_bool(true), ctx.dialect().format_bool(false));
    ctx.push(Token::Case).raw(" ").push(Token::When).raw(" ");
    condition(ctx, expr)?;
    ctx.raw(" ")
        .push(Token::Then)
        .raw(" ")
        .raw(t)
        .raw(" ")
        .push(Token::Else)
        .raw(" ")
        .raw(f)
        .raw(" ")
        .push(Token::End);
    Ok(())
}

/// MongoDB truthiness: null, missing, false and 0 are false.
fn truthiness(ctx: &mut GenerationContext, expr: &Expression) -> TranslateResult<()> {
    let v = ctx.capture(|c| value(c, expr))?;
    ctx.raw("CASE WHEN ")
        .append(&v)
        .raw(" IS NULL THEN 0 WHEN LOWER(TO_CHAR(")
        .append(&v)
        .raw(")) IN ('0', 'false') THEN 0 ELSE 1 END = 1");
    Ok(())
}

fn literal_type(ctx: &GenerationContext, lit: &Literal) -> Option<JsonReturnType> {
    match lit {
        Literal::Null => None,
        Literal::Int(_) | Literal::Double(_) => Some(JsonReturnType::Number),
        Literal::String(_) => Some(JsonReturnType::Varchar),
        Literal::Bool(_) => Some(if ctx.dialect().supports_boolean() {
            JsonReturnType::Boolean
        } else {
            JsonReturnType::Varchar
        }),
        Literal::Array(items) => items.iter().find_map(|l| literal_type(ctx, l)),
    }
}

fn comparison(
    ctx: &mut GenerationContext,
    op: ComparisonOp,
    left: &Expression,
    right: &Expression,
) -> TranslateResult<()> {
    if op.is_membership() {
        let items = match right.as_literal().and_then(Literal::as_array) {
            Some(items) => items,
            None => {
                return Err(TranslateError::structural(format!(
                    "{} requires an array of literal values",
                    op.mongo_name()
                )))
            }
        };
        return in_list(ctx, left, items, op == ComparisonOp::Nin);
    }

    if left.is_null_literal() || right.is_null_literal() {
        let other = if right.is_null_literal() { left } else { right };
        if matches!(op, ComparisonOp::Gt | ComparisonOp::Lt) {
            constant_condition(ctx, false);
            return Ok(());
        }
        value(ctx, other)?;
        ctx.raw(" ").push(if op == ComparisonOp::Ne {
            Token::IsNotNull
        } else {
            Token::IsNull
        });
        return Ok(());
    }

    if let (Expression::FieldPath(fp), Expression::Literal(Literal::Array(items))) = (left, right) {
        if items.is_empty() && matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
            return empty_array_check(ctx, fp.path(), op == ComparisonOp::Ne);
        }
        if matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
            if op == ComparisonOp::Ne {
                ctx.raw("NOT ");
            }
            ctx.raw("JSON_EQUAL(");
            field_json(ctx, fp.path())?;
            ctx.raw(", ").push(Token::literal(right.as_literal().unwrap_or(&Literal::Null)));
            ctx.raw(")");
            return Ok(());
        }
    }

    let ty = right
        .as_literal()
        .and_then(|l| literal_type(ctx, l))
        .or_else(|| left.as_literal().and_then(|l| literal_type(ctx, l)));
    let l = ctx.capture(|c| render(c, left, ty))?;
    let r = ctx.capture(|c| render(c, right, ty))?;

    if op == ComparisonOp::Ne {
        // $ne also matches documents where the field is absent.
        ctx.raw("(")
            .append(&l)
            .raw(" IS NULL OR ")
            .append(&l)
            .raw(" <> ")
            .append(&r)
            .raw(")");
        return Ok(());
    }
    ctx.append(&l)
        .raw(" ")
        .raw(op.sql_operator())
        .raw(" ")
        .append(&r);
    Ok(())
}

/// `left [NOT] IN (:1, :2, ...)`, with NULL list entries matching absent values.
pub(crate) fn in_list(
    ctx: &mut GenerationContext,
    left: &Expression,
    items: &[Literal],
    negate: bool,
) -> TranslateResult<()> {
    let has_null = items.iter().any(Literal::is_null);
    let values: Vec<&Literal> = items.iter().filter(|l| !l.is_null()).collect();
    let ty = values.iter().find_map(|l| literal_type(ctx, l));
    let l = ctx.capture(|c| render(c, left, ty))?;

    if values.is_empty() {
        ctx.append(&l)
            .raw(" ")
            .push(if negate { Token::IsNotNull } else { Token::IsNull });
        return Ok(());
    }

    let list = ctx.capture(|c| {
        c.append(&l).raw(if negate { " NOT IN (" } else { " IN (" });
        for (i, item) in values.iter().enumerate() {
            if i > 0 {
                c.raw(", ");
            }
            c.bind(item);
        }
        c.raw(")");
        Ok(())
    })?;

    match (negate, has_null) {
        (false, false) => ctx.append(&list),
        (false, true) => ctx.raw("(").append(&list).raw(" OR ").append(&l).raw(" IS NULL)"),
        (true, false) => ctx.raw("(").append(&l).raw(" IS NULL OR ").append(&list).raw(")"),
        (true, true) => ctx
            .raw("(")
            .append(&l)
            .raw(" IS NOT NULL AND ")
            .append(&list)
            .raw(")"),
    };
    Ok(())
}

/// `{f: []}` compares the array size, not the value.
fn empty_array_check(ctx: &mut GenerationContext, path: &str, negate: bool) -> TranslateResult<()> {
    let Some((doc, json_path)) = json_location(ctx, path) else {
        return Err(TranslateError::unsupported(
            "$eq",
            format!("'{}' is not an array field", path),
        ));
    };
    ctx.raw("NVL(");
    json_value(ctx, &doc, &format!("{}.size()", json_path), Some(JsonReturnType::Number));
    ctx.raw(if negate { ", 0) > 0" } else { ", 0) = 0" });
    Ok(())
}

fn logical(ctx: &mut GenerationContext, op: LogicalOp, operands: &[Expression]) -> TranslateResult<()> {
    match op {
        LogicalOp::And | LogicalOp::Or if operands.len() == 1 => condition(ctx, &operands[0]),
        LogicalOp::And | LogicalOp::Or => {
            let joiner = if op == LogicalOp::And { Token::And } else { Token::Or };
            ctx.raw("(");
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    ctx.raw(" ").push(joiner.clone()).raw(" ");
                }
                condition(ctx, operand)?;
            }
            ctx.raw(")");
            Ok(())
        }
        LogicalOp::Not => {
            ctx.push(Token::Not).raw(" (");
            condition(ctx, &operands[0])?;
            ctx.raw(")");
            Ok(())
        }
        LogicalOp::Nor => {
            ctx.push(Token::Not).raw(" (");
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    ctx.raw(" ").push(Token::Or).raw(" ");
                }
                condition(ctx, operand)?;
            }
            ctx.raw(")");
            Ok(())
        }
    }
}

fn exists_condition(ctx: &mut GenerationContext, path: &str, exists: bool) -> TranslateResult<()> {
    if let Some((doc, json_path)) = json_location(ctx, path) {
        if !exists {
            ctx.push(Token::Not).raw(" ");
        }
        ctx.raw("JSON_EXISTS(").append(&doc).raw(", ").string(&json_path).raw(")");
        return Ok(());
    }
    match ctx.scope().resolve(path, false) {
        Resolved::Missing => constant_condition(ctx, !exists),
        _ => {
            field(ctx, path, None, None)?;
            ctx.raw(" ")
                .push(if exists { Token::IsNotNull } else { Token::IsNull });
        }
    }
    Ok(())
}

// =============================================================================
// Arithmetic and dates
// =============================================================================

fn arithmetic(ctx: &mut GenerationContext, op: ArithmeticOp, operands: &[Expression]) -> TranslateResult<()> {
    if let Some(infix) = op.infix() {
        ctx.raw("(");
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                ctx.raw(" ").raw(infix).raw(" ");
            }
            numeric(ctx, operand)?;
        }
        ctx.raw(")");
        return Ok(());
    }

    match op {
        ArithmeticOp::Max | ArithmeticOp::Min if operands.len() == 1 => {
            return array::extreme(ctx, &operands[0], op == ArithmeticOp::Max);
        }
        ArithmeticOp::Max | ArithmeticOp::Min => {
            ctx.warn(
                op.mongo_name(),
                "a NULL operand makes the result NULL",
                TranslationCapability::Emulated,
            )?;
        }
        ArithmeticOp::Log10 => {
            ctx.raw("LOG(10, ");
            numeric(ctx, &operands[0])?;
            ctx.raw(")");
            return Ok(());
        }
        _ => {}
    }

    let take = if op.accepts_second_operand() || matches!(op, ArithmeticOp::Max | ArithmeticOp::Min) {
        operands.len()
    } else {
        1
    };
    if operands.len() > take {
        ctx.warn(
            op.mongo_name(),
            "second operand ignored",
            TranslationCapability::Partial,
        )?;
    }
    ctx.raw(op.sql_function()).raw("(");
    for (i, operand) in operands.iter().take(take).enumerate() {
        if i > 0 {
            ctx.raw(", ");
        }
        numeric(ctx, operand)?;
    }
    ctx.raw(")");
    Ok(())
}

/// Timestamp for date-part extraction. Strings are re-parsed as ISO-8601.
fn timestamp(ctx: &mut GenerationContext, arg: &Expression) -> TranslateResult<()> {
    match arg {
        Expression::TypeConversion(tc)
            if tc.op == TypeConversionOp::ToDate || tc.to == Some(TypeConversionOp::ToDate) =>
        {
            convert::render(ctx, tc)
        }
        Expression::Variable { name, path: None } if name == "NOW" => {
            ctx.raw("SYSTIMESTAMP");
            Ok(())
        }
        _ => {
            let format = ctx.dialect().iso_timestamp_format();
            ctx.raw("TO_TIMESTAMP(");
            value(ctx, arg)?;
            ctx.raw(", ").string(format).raw(")");
            Ok(())
        }
    }
}

fn date(ctx: &mut GenerationContext, op: DateOp, arg: &Expression) -> TranslateResult<()> {
    let ts = ctx.capture(|c| timestamp(c, arg))?;
    if let Some(part) = op.extract_field() {
        ctx.raw("EXTRACT(").raw(part).raw(" FROM ").append(&ts).raw(")");
        return Ok(());
    }
    match op {
        DateOp::Second => {
            ctx.raw("FLOOR(EXTRACT(SECOND FROM ").append(&ts).raw("))");
        }
        DateOp::Millisecond => {
            ctx.raw("MOD(FLOOR(EXTRACT(SECOND FROM ")
                .append(&ts)
                .raw(") * 1000), 1000)");
        }
        DateOp::DayOfWeek => {
            // 1 = Sunday; ISO weeks start on Monday.
            ctx.raw("MOD(TRUNC(")
                .append(&ts)
                .raw(") - TRUNC(")
                .append(&ts)
                .raw(", 'IW') + 1, 7) + 1");
        }
        DateOp::DayOfYear => {
            ctx.raw("TO_NUMBER(TO_CHAR(").append(&ts).raw(", 'DDD'))");
        }
        _ => {}
    }
    Ok(())
}

// =============================================================================
// Documents and objects
// =============================================================================

/// `JSON_OBJECT('k' VALUE v, ...)`
fn document(ctx: &mut GenerationContext, fields: &[(String, Expression)]) -> TranslateResult<()> {
    ctx.raw("JSON_OBJECT(");
    for (i, (key, expr)) in fields.iter().enumerate() {
        if i > 0 {
            ctx.raw(", ");
        }
        ctx.string(key).raw(" VALUE ");
        if json(ctx, expr)? {
            ctx.raw(" FORMAT JSON");
        }
    }
    ctx.raw(")");
    Ok(())
}

fn object(ctx: &mut GenerationContext, op: ObjectOp, args: &[Expression]) -> TranslateResult<()> {
    match op {
        ObjectOp::MergeObjects => {
            let mut acc = ctx.capture(|c| json(c, &args[0]).map(|_| ()))?;
            for arg in &args[1..] {
                let next = ctx.capture(|c| json(c, arg).map(|_| ()))?;
                let mut merged = TokenStream::new();
                merged
                    .raw_sql("JSON_MERGEPATCH(")
                    .append(&acc)
                    .raw_sql(", ")
                    .append(&next)
                    .raw_sql(")");
                acc = merged;
            }
            ctx.append(&acc);
            Ok(())
        }
        ObjectOp::ArrayToObject => array::to_object(ctx, &args[0]),
        ObjectOp::ObjectToArray => Err(TranslateError::unsupported(
            "$objectToArray",
            "object keys cannot be enumerated in SQL/JSON",
        )),
    }
}

/// `(SELECT COUNT(*) FROM from f WHERE JSON_VALUE(f.data, '$.foreign') = local)`
pub(crate) fn lookup_size(
    ctx: &mut GenerationContext,
    from: &str,
    local_field: &str,
    foreign_field: &str,
) -> TranslateResult<()> {
    let alias = ctx.alias(from);
    let table = TableRef::new(from)
        .with_schema(ctx.config().schema.as_deref())
        .with_alias(&alias);
    let data = super::scope::qualified(&alias, ctx.data_column());
    ctx.raw("(SELECT COUNT(*) FROM ")
        .append(&table.to_tokens())
        .raw(" WHERE ");
    json_value(ctx, &data, &json_path_of(foreign_field), None);
    ctx.raw(" = ");
    field(ctx, local_field, None, None)?;
    ctx.raw(")");
    Ok(())
}
