//! String operators.

use super::{numeric, value, GenerationContext};
use crate::ast::{Expression, Literal, StringOp};
use crate::error::{TranslateError, TranslateResult};
use crate::sql::dialect::SqlDialect;
use crate::sql::token::{Token, TokenStream};
use crate::translate::TranslationCapability;

pub(super) fn render(ctx: &mut GenerationContext, op: StringOp, args: &[Expression]) -> TranslateResult<()> {
    match op {
        StringOp::Concat => concat(ctx, args),
        StringOp::ToLower | StringOp::ToUpper => {
            ctx.raw(if op == StringOp::ToLower { "LOWER(" } else { "UPPER(" });
            value(ctx, &args[0])?;
            ctx.raw(")");
            Ok(())
        }
        StringOp::Substr => {
            ctx.raw("SUBSTR(");
            value(ctx, &args[0])?;
            ctx.raw(", ");
            one_based(ctx, &args[1])?;
            // A negative length means "to the end of the string".
            if let Some(len) = args.get(2) {
                let to_end = len.as_literal().and_then(Literal::as_i64).is_some_and(|n| n < 0);
                if !to_end {
                    ctx.raw(", ");
                    numeric(ctx, len)?;
                }
            }
            ctx.raw(")");
            Ok(())
        }
        StringOp::Trim | StringOp::Ltrim | StringOp::Rtrim => trim(ctx, op, args),
        StringOp::StrLenCp => {
            // '' is NULL in Oracle
            ctx.raw("NVL(LENGTH(");
            value(ctx, &args[0])?;
            ctx.raw("), 0)");
            Ok(())
        }
        StringOp::Split => {
            ctx.warn(
                "$split",
                "quotes and backslashes inside the input are not JSON-escaped",
                TranslationCapability::Emulated,
            )?;
            ctx.raw("JSON_QUERY('[\"' || REPLACE(");
            value(ctx, &args[0])?;
            ctx.raw(", ");
            value(ctx, &args[1])?;
            ctx.raw(", '\",\"') || '\"]', '$')");
            Ok(())
        }
        StringOp::IndexOfCp => index_of(ctx, args),
        StringOp::RegexMatch => {
            let (t, f) = (ctx.dialect().format_bool(true), ctx.dialect().format_bool(false));
            ctx.raw("CASE WHEN ");
            regex_match(ctx, args)?;
            ctx.raw(" THEN ").raw(t).raw(" ELSE ").raw(f).raw(" END");
            Ok(())
        }
        StringOp::RegexFind => regex_find(ctx, args),
        StringOp::ReplaceOne => replace_one(ctx, args),
        StringOp::ReplaceAll => {
            ctx.raw("REPLACE(");
            value(ctx, &args[0])?;
            ctx.raw(", ");
            value(ctx, &args[1])?;
            ctx.raw(", ");
            value(ctx, &args[2])?;
            ctx.raw(")");
            Ok(())
        }
    }
}

/// `$concat` is NULL when any argument is NULL; `||` is not.
fn concat(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<()> {
    let mut parts = Vec::with_capacity(args.len());
    let mut nullable = Vec::new();
    for arg in args {
        let part = ctx.capture(|c| value(c, arg))?;
        if !matches!(arg, Expression::Literal(_)) {
            nullable.push(part.clone());
        }
        parts.push(part);
    }

    let mut joined = TokenStream::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            joined.raw_sql(" || ");
        }
        joined.append(part);
    }

    if nullable.is_empty() {
        ctx.append(&joined);
        return Ok(());
    }
    ctx.raw("CASE WHEN ");
    for (i, part) in nullable.iter().enumerate() {
        if i > 0 {
            ctx.raw(" OR ");
        }
        ctx.append(part).raw(" IS NULL");
    }
    ctx.raw(" THEN NULL ELSE ").append(&joined).raw(" END");
    Ok(())
}

/// Zero-based index to Oracle's one-based position.
fn one_based(ctx: &mut GenerationContext, index: &Expression) -> TranslateResult<()> {
    match index.as_literal().and_then(Literal::as_i64) {
        Some(i) => {
            ctx.bind(&Literal::Int(i + 1));
        }
        None => {
            ctx.raw("(");
            numeric(ctx, index)?;
            ctx.raw(" + 1)");
        }
    }
    Ok(())
}

fn trim(ctx: &mut GenerationContext, op: StringOp, args: &[Expression]) -> TranslateResult<()> {
    let input = ctx.capture(|c| value(c, &args[0]))?;
    let chars = match args.get(1) {
        Some(chars) => Some(ctx.capture(|c| value(c, chars))?),
        None => None,
    };
    match (op, chars) {
        (StringOp::Trim, None) => {
            ctx.raw("TRIM(").append(&input).raw(")");
        }
        (StringOp::Trim, Some(chars)) => {
            ctx.raw("LTRIM(RTRIM(")
                .append(&input)
                .raw(", ")
                .append(&chars)
                .raw("), ")
                .append(&chars)
                .raw(")");
        }
        (_, chars) => {
            ctx.raw(if op == StringOp::Ltrim { "LTRIM(" } else { "RTRIM(" })
                .append(&input);
            if let Some(chars) = chars {
                ctx.raw(", ").append(&chars);
            }
            ctx.raw(")");
        }
    }
    Ok(())
}

/// `$indexOfCP: [string, substring, start?, end?]`; -1 when absent.
fn index_of(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<()> {
    ctx.raw("INSTR(");
    match args.get(3) {
        Some(end) => {
            ctx.raw("SUBSTR(");
            value(ctx, &args[0])?;
            ctx.raw(", 1, ");
            numeric(ctx, end)?;
            ctx.raw(")");
        }
        None => value(ctx, &args[0])?,
    }
    ctx.raw(", ");
    value(ctx, &args[1])?;
    if let Some(start) = args.get(2) {
        ctx.raw(", ");
        one_based(ctx, start)?;
    }
    ctx.raw(") - 1");
    Ok(())
}

/// MongoDB regex options mapped to `REGEXP_LIKE` match parameters.
fn regex_flags(options: Option<&Expression>) -> TranslateResult<Option<String>> {
    let Some(options) = options else {
        return Ok(None);
    };
    let Some(text) = options.as_literal().and_then(Literal::as_str) else {
        return Err(TranslateError::structural("regex options must be a string literal"));
    };
    let mut flags = String::new();
    for c in text.chars() {
        match c {
            'i' | 'm' | 'x' => flags.push(c),
            's' => flags.push('n'),
            other => {
                return Err(TranslateError::unsupported(
                    "$regex",
                    format!("option '{}' has no Oracle equivalent", other),
                ))
            }
        }
    }
    Ok(if flags.is_empty() { None } else { Some(flags) })
}

fn regex_args(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<Option<String>> {
    let flags = regex_flags(args.get(2))?;
    value(ctx, &args[0])?;
    ctx.raw(", ");
    value(ctx, &args[1])?;
    Ok(flags)
}

/// `REGEXP_LIKE(input, pattern[, flags])`
pub(super) fn regex_match(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<()> {
    ctx.raw("REGEXP_LIKE(");
    if let Some(flags) = regex_args(ctx, args)? {
        ctx.raw(", ").string(&flags);
    }
    ctx.raw(")");
    Ok(())
}

fn regex_find(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<()> {
    ctx.warn(
        "$regexFind",
        "capture groups are not returned",
        TranslationCapability::Partial,
    )?;
    let flags = regex_flags(args.get(2))?;
    let input = ctx.capture(|c| value(c, &args[0]))?;
    let pattern = ctx.capture(|c| value(c, &args[1]))?;
    let mut tail = TokenStream::new();
    if let Some(flags) = &flags {
        tail.raw_sql(", ")
            .push(Token::LitString(flags.clone()));
    }

    let instr = |ctx: &mut GenerationContext| {
        ctx.raw("REGEXP_INSTR(")
            .append(&input)
            .raw(", ")
            .append(&pattern)
            .raw(", 1, 1, 0");
        if flags.is_some() {
            ctx.append(&tail);
        }
        ctx.raw(")");
    };

    ctx.raw("CASE WHEN ");
    instr(ctx);
    ctx.raw(" > 0 THEN JSON_OBJECT('match' VALUE REGEXP_SUBSTR(")
        .append(&input)
        .raw(", ")
        .append(&pattern)
        .raw(", 1, 1");
    if flags.is_some() {
        ctx.append(&tail);
    }
    ctx.raw("), 'idx' VALUE ");
    instr(ctx);
    ctx.raw(" - 1, 'captures' VALUE JSON_ARRAY()) END");
    Ok(())
}

/// First occurrence only; `REPLACE` handles `$replaceAll`.
fn replace_one(ctx: &mut GenerationContext, args: &[Expression]) -> TranslateResult<()> {
    let input = ctx.capture(|c| value(c, &args[0]))?;
    let find = ctx.capture(|c| value(c, &args[1]))?;
    let replacement = ctx.capture(|c| value(c, &args[2]))?;
    ctx.raw("CASE WHEN INSTR(")
        .append(&input)
        .raw(", ")
        .append(&find)
        .raw(") > 0 THEN SUBSTR(")
        .append(&input)
        .raw(", 1, INSTR(")
        .append(&input)
        .raw(", ")
        .append(&find)
        .raw(") - 1) || ")
        .append(&replacement)
        .raw(" || SUBSTR(")
        .append(&input)
        .raw(", INSTR(")
        .append(&input)
        .raw(", ")
        .append(&find)
        .raw(") + LENGTH(")
        .append(&find)
        .raw(")) ELSE ")
        .append(&input)
        .raw(" END");
    Ok(())
}
