//! JSON front-end: decoded pipeline values to AST.
//!
//! Two grammars share the expression tree:
//! - the aggregation expression language (`{$add: ["$a", 1]}`, `"$field"`,
//!   `"$$ROOT"`), parsed by [`parse_expression`];
//! - the query filter language used by `$match` and
//!   `restrictSearchWithMatch` (`{qty: {$gt: 5}}`), parsed by
//!   [`parse_filter`].
//!
//! Every node is built through the AST constructors, so arity and shape
//! errors surface here as `Structural`, and an operator string that no
//! table recognizes surfaces as `UnknownOperator`.

mod expr;
mod stage;

pub use expr::{parse_expression, parse_filter};
pub use stage::{parse_pipeline, parse_stage};

use serde_json::{Map, Value};

use crate::ast::Literal;
use crate::error::{TranslateError, TranslateResult};

type Object = Map<String, Value>;

fn object<'a>(value: &'a Value, what: &str) -> TranslateResult<&'a Object> {
    value
        .as_object()
        .ok_or_else(|| TranslateError::structural(format!("{} must be a document", what)))
}

fn array<'a>(value: &'a Value, what: &str) -> TranslateResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| TranslateError::structural(format!("{} must be an array", what)))
}

fn string<'a>(value: &'a Value, what: &str) -> TranslateResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| TranslateError::structural(format!("{} must be a string", what)))
}

/// Integral number; `5.0` is accepted as `5`.
fn integer(value: &Value, what: &str) -> TranslateResult<i64> {
    let n = value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    });
    n.ok_or_else(|| TranslateError::structural(format!("{} must be an integer", what)))
}

fn boolean(value: &Value, what: &str) -> TranslateResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| TranslateError::structural(format!("{} must be a boolean", what)))
}

fn literal(value: &Value, what: &str) -> TranslateResult<Literal> {
    Literal::from_json(value)
        .ok_or_else(|| TranslateError::structural(format!("{} must be a literal value", what)))
}

fn required<'a>(doc: &'a Object, key: &str, what: &str) -> TranslateResult<&'a Value> {
    doc.get(key)
        .ok_or_else(|| TranslateError::structural(format!("{} requires '{}'", what, key)))
}

/// The single `{key: value}` entry of an operator or stage document.
fn single_entry<'a>(doc: &'a Object, what: &str) -> TranslateResult<(&'a str, &'a Value)> {
    let mut entries = doc.iter();
    match (entries.next(), entries.next()) {
        (Some((key, value)), None) => Ok((key.as_str(), value)),
        _ => Err(TranslateError::structural(format!(
            "{} must have exactly one key, got {}",
            what,
            doc.len()
        ))),
    }
}

/// Reject keys outside `allowed`.
fn known_keys(doc: &Object, allowed: &[&str], what: &str) -> TranslateResult<()> {
    match doc.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(TranslateError::structural(format!(
            "{}: unrecognized option '{}'",
            what, key
        ))),
        None => Ok(()),
    }
}

/// `1`/`true` versus `0`/`false` in projection and sort specifications.
fn truthy_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}
