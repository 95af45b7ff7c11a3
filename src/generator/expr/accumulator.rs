//! Accumulators: `$group` aggregates, array reductions and window functions.

use super::{array, json, literal_type, numeric, typed, value, GenerationContext};
use crate::ast::{AccumulatorOp, ArithmeticOp, ArrayOp, Expression, JsonReturnType, Literal, WindowOp, WindowOutput};
use crate::error::{TranslateError, TranslateResult};
use crate::generator::scope::Resolved;
use crate::sql::token::TokenStream;
use crate::translate::TranslationCapability;

/// The SQL type a `$min`/`$max` argument is known to have, if any.
fn known_type(ctx: &GenerationContext, expr: &Expression) -> Option<JsonReturnType> {
    match expr {
        // Columns an earlier stage computed already carry their SQL type.
        Expression::FieldPath(path) => path.return_type().or_else(|| {
            match ctx.scope().resolve(path.path(), false) {
                Resolved::Value { json: false, .. } | Resolved::Missing => Some(JsonReturnType::Varchar),
                _ => None,
            }
        }),
        Expression::Literal(lit) => literal_type(ctx, lit),
        // `$max: [array]` reduces its operand like the accumulator does.
        Expression::Arithmetic { op: ArithmeticOp::Max | ArithmeticOp::Min, operands } if operands.len() == 1 => None,
        Expression::Arithmetic { .. } | Expression::LookupSize { .. } => Some(JsonReturnType::Number),
        _ => None,
    }
}

/// Render `MIN`/`MAX` of `arg`, each aggregate followed by `over`.
///
/// An argument of unknown type is extracted twice. Numbers sort before
/// strings, so `$min` prefers the smallest number and `$max` the largest
/// non-numeric string. The result is then text.
fn extreme(
    ctx: &mut GenerationContext,
    name: &str,
    arg: &Expression,
    max: bool,
    over: &TokenStream,
) -> TranslateResult<()> {
    let function = if max { "MAX(" } else { "MIN(" };
    if let Some(ty) = known_type(ctx, arg) {
        ctx.raw(function);
        typed(ctx, arg, ty)?;
        ctx.raw(")").append(over);
        return Ok(());
    }

    ctx.warn(
        name,
        "operand type is unknown; numbers order before strings and the result is text",
        TranslationCapability::Emulated,
    )?;
    let n = ctx.capture(|c| typed(c, arg, JsonReturnType::Number))?;
    let s = ctx.capture(|c| typed(c, arg, JsonReturnType::Varchar))?;
    mixed_extreme(ctx, &n, &s, max, over);
    Ok(())
}

/// `n` and `s` are the numeric and string readings of the same value.
pub(super) fn mixed_extreme(
    ctx: &mut GenerationContext,
    n: &TokenStream,
    s: &TokenStream,
    max: bool,
    over: &TokenStream,
) {
    if max {
        ctx.raw("COALESCE(MAX(CASE WHEN ")
            .append(n)
            .raw(" IS NULL THEN ")
            .append(s)
            .raw(" END)")
            .append(over)
            .raw(", TO_CHAR(MAX(")
            .append(n)
            .raw(")")
            .append(over)
            .raw("))");
    } else {
        ctx.raw("COALESCE(TO_CHAR(MIN(")
            .append(n)
            .raw(")")
            .append(over)
            .raw("), MIN(")
            .append(s)
            .raw(")")
            .append(over)
            .raw(")");
    }
}

fn required<'e>(name: &str, arg: Option<&'e Expression>) -> TranslateResult<&'e Expression> {
    arg.ok_or_else(|| TranslateError::structural(format!("{} requires an argument", name)))
}

/// Render a `$group` accumulator as an SQL aggregate.
///
/// Returns whether the aggregate yields JSON.
pub fn aggregate(ctx: &mut GenerationContext, op: AccumulatorOp, arg: Option<&Expression>) -> TranslateResult<bool> {
    let name = op.mongo_name();
    match op {
        AccumulatorOp::Count => {
            ctx.raw("COUNT(*)");
        }
        AccumulatorOp::Sum => {
            let arg = required(name, arg)?;
            match arg.as_literal() {
                Some(Literal::Int(1)) => {
                    ctx.raw("COUNT(*)");
                }
                Some(lit) if lit.is_numeric() => {
                    ctx.raw("COUNT(*) * ").bind(lit);
                }
                _ => {
                    ctx.raw("NVL(SUM(");
                    numeric(ctx, arg)?;
                    ctx.raw("), 0)");
                }
            }
        }
        AccumulatorOp::Avg | AccumulatorOp::StdDevPop | AccumulatorOp::StdDevSamp => {
            let function = match op {
                AccumulatorOp::Avg => "AVG(",
                AccumulatorOp::StdDevPop => "STDDEV_POP(",
                _ => "STDDEV_SAMP(",
            };
            ctx.raw(function);
            numeric(ctx, required(name, arg)?)?;
            ctx.raw(")");
        }
        AccumulatorOp::Min | AccumulatorOp::Max => {
            extreme(ctx, name, required(name, arg)?, op == AccumulatorOp::Max, &TokenStream::new())?;
        }
        AccumulatorOp::First | AccumulatorOp::Last => {
            ctx.warn(
                name,
                "result depends on the order rows reach the aggregate; sort upstream",
                TranslationCapability::Emulated,
            )?;
            let first = op == AccumulatorOp::First;
            ctx.raw(if first { "MIN(" } else { "MAX(" });
            value(ctx, required(name, arg)?)?;
            ctx.raw(if first {
                ") KEEP (DENSE_RANK FIRST ORDER BY ROWNUM)"
            } else {
                ") KEEP (DENSE_RANK LAST ORDER BY ROWNUM)"
            });
        }
        AccumulatorOp::Push => {
            ctx.raw("JSON_ARRAYAGG(");
            if json(ctx, required(name, arg)?)? {
                ctx.raw(" FORMAT JSON");
            }
            ctx.raw(")");
            return Ok(true);
        }
        AccumulatorOp::AddToSet => {
            ctx.warn(
                name,
                "uniqueness is exact only for scalar values, which are collected as strings",
                TranslationCapability::Emulated,
            )?;
            let v = ctx.capture(|c| value(c, required(name, arg)?))?;
            ctx.raw("'[' || LISTAGG(DISTINCT '\"' || ")
                .append(&v)
                .raw(" || '\"', ',') WITHIN GROUP (ORDER BY ")
                .append(&v)
                .raw(") || ']'");
            return Ok(true);
        }
    }
    Ok(false)
}

/// An accumulator used outside `$group` reduces its array operand.
pub(super) fn over_array(ctx: &mut GenerationContext, op: AccumulatorOp, arg: Option<&Expression>) -> TranslateResult<()> {
    let name = op.mongo_name();
    match op {
        AccumulatorOp::Sum => {
            ctx.raw("NVL(");
            array::aggregate(ctx, required(name, arg)?, "SUM")?;
            ctx.raw(", 0)");
            Ok(())
        }
        AccumulatorOp::Avg => array::aggregate(ctx, required(name, arg)?, "AVG"),
        AccumulatorOp::Min => array::extreme(ctx, required(name, arg)?, false),
        AccumulatorOp::Max => array::extreme(ctx, required(name, arg)?, true),
        AccumulatorOp::StdDevPop => array::aggregate(ctx, required(name, arg)?, "STDDEV_POP"),
        AccumulatorOp::StdDevSamp => array::aggregate(ctx, required(name, arg)?, "STDDEV_SAMP"),
        AccumulatorOp::First | AccumulatorOp::Last => {
            let array_op = if op == AccumulatorOp::First {
                ArrayOp::First
            } else {
                ArrayOp::Last
            };
            let expr = Expression::array(array_op, vec![required(name, arg)?.clone()])?;
            value(ctx, &expr)
        }
        AccumulatorOp::Count | AccumulatorOp::Push | AccumulatorOp::AddToSet => Err(
            TranslateError::unsupported(name, "only valid as a $group or window accumulator"),
        ),
    }
}

/// Render `FUNC(arg) OVER (over [frame])` for one `$setWindowFields` output.
///
/// `over` holds the rendered `PARTITION BY`/`ORDER BY` clauses.
pub fn window_function(
    ctx: &mut GenerationContext,
    output: &WindowOutput,
    over: &TokenStream,
    ordered: bool,
) -> TranslateResult<()> {
    let name = output.op.mongo_name();
    let arg = output.arg.as_ref();
    let positional = output.op.is_ranking() || output.op == WindowOp::Shift;
    if positional && !ordered {
        return Err(TranslateError::structural(format!(
            "{} requires sortBy",
            name
        )));
    }

    let mut clause = TokenStream::raw(" OVER (");
    clause.append(over);
    if !positional && ordered {
        // MongoDB's default window is the whole partition.
        let frame = match &output.frame {
            Some(frame) => frame.to_tokens(),
            None => TokenStream::raw("ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING"),
        };
        clause.raw_sql(" ").append(&frame);
    }
    clause.raw_sql(")");

    match output.op {
        WindowOp::Rank => {
            ctx.raw("RANK()");
        }
        WindowOp::DenseRank => {
            ctx.raw("DENSE_RANK()");
        }
        WindowOp::DocumentNumber => {
            ctx.raw("ROW_NUMBER()");
        }
        WindowOp::Count => {
            ctx.raw("COUNT(*)");
        }
        WindowOp::Sum | WindowOp::Avg | WindowOp::StdDevPop | WindowOp::StdDevSamp => {
            let function = match output.op {
                WindowOp::Sum => "SUM(",
                WindowOp::Avg => "AVG(",
                WindowOp::StdDevPop => "STDDEV_POP(",
                _ => "STDDEV_SAMP(",
            };
            ctx.raw(function);
            numeric(ctx, required(name, arg)?)?;
            ctx.raw(")");
        }
        WindowOp::Min | WindowOp::Max => {
            let max = output.op == WindowOp::Max;
            return extreme(ctx, name, required(name, arg)?, max, &clause);
        }
        WindowOp::First | WindowOp::Last => {
            ctx.raw(if output.op == WindowOp::First {
                "FIRST_VALUE("
            } else {
                "LAST_VALUE("
            });
            value(ctx, required(name, arg)?)?;
            ctx.raw(")");
        }
        WindowOp::Shift => {
            let shift = output
                .shift
                .as_ref()
                .ok_or_else(|| TranslateError::structural("$shift requires 'by'"))?;
            let arg = required(name, arg)?;
            if shift.by == 0 {
                return value(ctx, arg);
            }
            ctx.raw(if shift.by > 0 { "LEAD(" } else { "LAG(" });
            value(ctx, arg)?;
            ctx.raw(&format!(", {}", shift.by.unsigned_abs()));
            if !shift.default.is_null() {
                ctx.raw(", ").bind(&shift.default);
            }
            ctx.raw(")");
        }
        WindowOp::Push => {
            return Err(TranslateError::unsupported(
                name,
                "Oracle has no analytic JSON_ARRAYAGG",
            ))
        }
    }

    ctx.append(&clause);
    Ok(())
}
