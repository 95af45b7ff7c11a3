//! Literal values, JSON return types and field paths.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TranslateError, TranslateResult};
use crate::validation;

/// A scalar (or array-of-scalars) literal value.
///
/// Documents are not literals; inline objects are `Expression::Document`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Literal>),
}

impl Literal {
    /// Convert a decoded JSON value. Objects have no literal form.
    pub fn from_json(value: &Value) -> Option<Literal> {
        match value {
            Value::Null => Some(Literal::Null),
            Value::Bool(b) => Some(Literal::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Literal::Int(i)),
                None => n.as_f64().map(Literal::Double),
            },
            Value::String(s) => Some(Literal::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Literal::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Literal::Array),
            Value::Object(_) => None,
        }
    }

    pub fn to_json_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::from(*i),
            Literal::Double(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Array(items) => Value::Array(items.iter().map(|l| l.to_json_value()).collect()),
        }
    }

    /// Compact JSON text for this literal, e.g. `["a",1]`.
    pub fn to_json_string(&self) -> String {
        self.to_json_value().to_string()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Double(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Double(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Literal]> {
        match self {
            Literal::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Literal::Int(_) | Literal::Double(_))
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json_string())
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Int(i64::from(i))
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::Double(f)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

/// SQL type a JSON scalar is extracted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonReturnType {
    Varchar,
    Number,
    Date,
    Timestamp,
    Boolean,
    Json,
}

/// A reference to a document field such as `$customer.address.city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    path: String,
    return_type: Option<JsonReturnType>,
    data_column: String,
}

impl FieldPath {
    /// Build a field path, stripping a leading `$` and validating each segment.
    pub fn new(path: impl AsRef<str>) -> TranslateResult<Self> {
        let raw = path.as_ref();
        let normalized = raw.strip_prefix('$').unwrap_or(raw);
        let normalized = normalized.strip_prefix('.').unwrap_or(normalized);
        if normalized.starts_with('$') {
            return Err(TranslateError::structural(format!(
                "'{}' is a variable reference, not a field path",
                raw
            )));
        }
        validation::validate_field_name(normalized)?;
        Ok(Self {
            path: normalized.to_string(),
            return_type: None,
            data_column: "data".to_string(),
        })
    }

    pub fn with_return_type(mut self, ty: JsonReturnType) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_data_column(mut self, column: impl Into<String>) -> Self {
        self.data_column = column.into();
        self
    }

    /// Dotted path without the `$` prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn return_type(&self) -> Option<JsonReturnType> {
        self.return_type
    }

    pub fn data_column(&self) -> &str {
        &self.data_column
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }

    pub fn root(&self) -> &str {
        self.path.split('.').next().unwrap_or(&self.path)
    }

    /// SQL/JSON path expression, e.g. `$.items[0].sku`.
    pub fn json_path(&self) -> String {
        json_path_of(&self.path)
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.path)
    }
}

/// SQL/JSON path for a dotted path. Numeric segments become array steps;
/// keys that do not start with a letter are double-quoted (`$."_id"`).
pub fn json_path_of(dotted: &str) -> String {
    let mut out = String::from("$");
    if dotted.is_empty() {
        return out;
    }
    for segment in dotted.split('.') {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push('[');
            out.push_str(segment);
            out.push(']');
        } else if segment.starts_with(|c: char| c.is_ascii_alphabetic()) {
            out.push('.');
            out.push_str(segment);
        } else {
            out.push_str(".\"");
            out.push_str(segment);
            out.push('"');
        }
    }
    out
}
