//! Type conversion and type inspection.

use super::{json_location, json_value, value, GenerationContext};
use crate::ast::{Expression, Literal, TypeConversion, TypeConversionOp};
use crate::error::{TranslateError, TranslateResult};
use crate::sql::dialect::SqlDialect;
use crate::sql::token::TokenStream;
use crate::translate::TranslationCapability;

pub(super) fn render(ctx: &mut GenerationContext, tc: &TypeConversion) -> TranslateResult<()> {
    match tc.op {
        TypeConversionOp::Convert => convert(ctx, tc),
        TypeConversionOp::Type => type_of(ctx, &tc.arg),
        TypeConversionOp::IsNumber => {
            let (t, f) = (ctx.dialect().format_bool(true), ctx.dialect().format_bool(false));
            ctx.raw("CASE WHEN ");
            is_number(ctx, &tc.arg)?;
            ctx.raw(" THEN ").raw(t).raw(" ELSE ").raw(f).raw(" END");
            Ok(())
        }
        op => {
            let arg = ctx.capture(|c| value(c, &tc.arg))?;
            cast(ctx, op, &arg)
        }
    }
}

/// ISO-8601 text with a `Z` designator made parseable by `TZH:TZM`.
fn offset_text(arg: &TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.raw_sql("REPLACE(").append(arg).raw_sql(", 'Z', '+00:00')");
    ts
}

fn cast(ctx: &mut GenerationContext, op: TypeConversionOp, arg: &TokenStream) -> TranslateResult<()> {
    match op {
        TypeConversionOp::ToInt | TypeConversionOp::ToLong => {
            ctx.raw("TRUNC(TO_NUMBER(").append(arg).raw("))");
        }
        TypeConversionOp::ToDouble => {
            ctx.raw("TO_BINARY_DOUBLE(").append(arg).raw(")");
        }
        TypeConversionOp::ToDecimal => {
            ctx.raw("TO_NUMBER(").append(arg).raw(")");
        }
        TypeConversionOp::ToString => {
            ctx.raw("TO_CHAR(").append(arg).raw(")");
        }
        TypeConversionOp::ToBool => {
            let (t, f) = (ctx.dialect().format_bool(true), ctx.dialect().format_bool(false));
            ctx.raw("CASE WHEN ")
                .append(arg)
                .raw(" IS NULL THEN NULL WHEN LOWER(TO_CHAR(")
                .append(arg)
                .raw(")) IN ('0', 'false') THEN ")
                .raw(f)
                .raw(" ELSE ")
                .raw(t)
                .raw(" END");
        }
        TypeConversionOp::ToDate => {
            let format = ctx.dialect().iso_timestamp_tz_format();
            ctx.raw("TO_TIMESTAMP_TZ(")
                .append(&offset_text(arg))
                .raw(", ")
                .string(format)
                .raw(")");
        }
        TypeConversionOp::ToObjectId => {
            ctx.append(arg);
        }
        TypeConversionOp::Type | TypeConversionOp::Convert | TypeConversionOp::IsNumber => {
            return Err(TranslateError::structural(format!(
                "{} is not a conversion target",
                op.mongo_name()
            )))
        }
    }
    Ok(())
}

/// `VALIDATE_CONVERSION` check for targets whose conversion can fail.
fn convertible(ctx: &mut GenerationContext, target: TypeConversionOp, arg: &TokenStream) -> bool {
    match target {
        TypeConversionOp::ToInt | TypeConversionOp::ToLong | TypeConversionOp::ToDecimal => {
            ctx.raw("VALIDATE_CONVERSION(").append(arg).raw(" AS NUMBER)");
            true
        }
        TypeConversionOp::ToDouble => {
            ctx.raw("VALIDATE_CONVERSION(").append(arg).raw(" AS BINARY_DOUBLE)");
            true
        }
        TypeConversionOp::ToDate => {
            let format = ctx.dialect().iso_timestamp_tz_format();
            ctx.raw("VALIDATE_CONVERSION(")
                .append(&offset_text(arg))
                .raw(" AS TIMESTAMP WITH TIME ZONE, ")
                .string(format)
                .raw(")");
            true
        }
        _ => false,
    }
}

/// `$convert: {input, to, onError, onNull}`
fn convert(ctx: &mut GenerationContext, tc: &TypeConversion) -> TranslateResult<()> {
    let target = tc
        .to
        .ok_or_else(|| TranslateError::structural("$convert requires a 'to' target"))?;
    let arg = ctx.capture(|c| value(c, &tc.arg))?;
    let converted = ctx.capture(|c| cast(c, target, &arg))?;
    if tc.on_null.is_none() && tc.on_error.is_none() {
        ctx.append(&converted);
        return Ok(());
    }

    ctx.raw("CASE");
    if let Some(on_null) = &tc.on_null {
        ctx.raw(" WHEN ").append(&arg).raw(" IS NULL THEN ");
        value(ctx, on_null)?;
    }
    if let Some(on_error) = &tc.on_error {
        let mut fallible = false;
        let check = ctx.capture(|c| {
            fallible = convertible(c, target, &arg);
            Ok(())
        })?;
        if fallible {
            ctx.raw(" WHEN ").append(&check).raw(" = 0 THEN ");
            value(ctx, on_error)?;
        }
    }
    ctx.raw(" ELSE ").append(&converted).raw(" END");
    Ok(())
}

fn literal_type_name(lit: &Literal) -> &'static str {
    match lit {
        Literal::Null => "null",
        Literal::Bool(_) => "bool",
        Literal::Int(i) if i32::try_from(*i).is_ok() => "int",
        Literal::Int(_) => "long",
        Literal::Double(_) => "double",
        Literal::String(_) => "string",
        Literal::Array(_) => "array",
    }
}

/// `$type`
fn type_of(ctx: &mut GenerationContext, arg: &Expression) -> TranslateResult<()> {
    match arg {
        Expression::Literal(lit) => {
            ctx.bind(&Literal::from(literal_type_name(lit)));
            return Ok(());
        }
        Expression::Document(_) | Expression::CompoundId(_) => {
            ctx.bind(&Literal::from("object"));
            return Ok(());
        }
        _ => {}
    }

    ctx.warn(
        "$type",
        "integers report as 'double' and dates as 'date'",
        TranslationCapability::Emulated,
    )?;
    if let Some((doc, path)) = arg.as_field_path().and_then(|fp| json_location(ctx, fp.path())) {
        let t = ctx.capture(|c| {
            json_value(c, &doc, &format!("{}.type()", path), None);
            Ok(())
        })?;
        ctx.raw("NVL(DECODE(")
            .append(&t)
            .raw(", 'number', 'double', 'boolean', 'bool', 'timestamp', 'date', ")
            .append(&t)
            .raw("), 'missing')");
        return Ok(());
    }
    let v = ctx.capture(|c| value(c, arg))?;
    ctx.raw("CASE WHEN ")
        .append(&v)
        .raw(" IS NULL THEN 'null' WHEN VALIDATE_CONVERSION(")
        .append(&v)
        .raw(" AS NUMBER) = 1 THEN 'double' ELSE 'string' END");
    Ok(())
}

/// `$isNumber` as a condition.
pub(super) fn is_number(ctx: &mut GenerationContext, arg: &Expression) -> TranslateResult<()> {
    if let Some(lit) = arg.as_literal() {
        ctx.raw(if lit.is_numeric() { "1 = 1" } else { "1 = 0" });
        return Ok(());
    }
    if let Some((doc, path)) = arg.as_field_path().and_then(|fp| json_location(ctx, fp.path())) {
        json_value(ctx, &doc, &format!("{}.type()", path), None);
        ctx.raw(" = 'number'");
        return Ok(());
    }
    ctx.warn(
        "$isNumber",
        "numeric strings count as numbers",
        TranslationCapability::Emulated,
    )?;
    let v = ctx.capture(|c| value(c, arg))?;
    ctx.append(&v)
        .raw(" IS NOT NULL AND VALIDATE_CONVERSION(")
        .append(&v)
        .raw(" AS NUMBER) = 1");
    Ok(())
}
