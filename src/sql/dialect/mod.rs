//! Oracle dialect definitions and formatting rules.
//!
//! Every piece of release-specific Oracle syntax the compiler emits goes
//! through `SqlDialect`. The compiler never hardcodes a keyword that differs
//! between releases:
//!
//! - Identifier quoting (bare when safe, `"..."` otherwise)
//! - Return-type keywords for `JSON_VALUE ... RETURNING` / `CAST`
//! - Pagination: `OFFSET m ROWS FETCH FIRST n ROWS ONLY`
//! - Boolean literals: `TRUE`/`FALSE` vs `'true'`/`'false'`
//! - JSON feature availability (`JSON_TRANSFORM`, native `JSON` type)
//!
//! # Usage
//!
//! ```ignore
//! use aggsql::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Oracle26ai;
//! assert_eq!(dialect.quote_identifier("status"), "status");
//! assert_eq!(dialect.quote_identifier("_id"), "\"_id\"");
//! ```
//!
//! # Release Matrix
//!
//! | Feature | 19c | 23ai | 26ai |
//! |---------|-----|------|------|
//! | JSON_TRANSFORM | ❌ | ✓ | ✓ |
//! | Native JSON type | ❌ | ✓ | ✓ |
//! | SQL BOOLEAN | ❌ | ✓ | ✓ |
//! | FETCH FIRST | ✓ | ✓ | ✓ |
//! | Recursive WITH + CYCLE | ✓ | ✓ | ✓ |

pub mod helpers;
mod oracle19c;
mod oracle23ai;
mod oracle26ai;

pub use oracle19c::Oracle19c;
pub use oracle23ai::Oracle23ai;
pub use oracle26ai::Oracle26ai;

use serde::{Deserialize, Serialize};

use super::token::TokenStream;
use crate::ast::JsonReturnType;

/// SQL dialect trait - defines how Oracle constructs are rendered.
///
/// The default implementations follow the most recent Oracle release.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias) only when Oracle requires it.
    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_if_needed(ident)
    }

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Positional bind placeholder for the given 1-based index.
    fn bind_placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Keyword used in `RETURNING` / `CAST` for a JSON scalar return type.
    fn json_return_type(&self, ty: JsonReturnType) -> &'static str {
        helpers::json_return_type_native(ty)
    }

    /// Column definition for an unwound array element inside `JSON_TABLE`.
    fn unwind_value_column(&self) -> &'static str {
        "value JSON PATH '$'"
    }

    /// Format mask used to parse ISO-8601 strings with millisecond precision.
    fn iso_timestamp_format(&self) -> &'static str {
        "YYYY-MM-DD\"T\"HH24:MI:SS.FF3\"Z\""
    }

    /// Format mask used by `$toDate` (offset-aware).
    fn iso_timestamp_tz_format(&self) -> &'static str {
        "YYYY-MM-DD\"T\"HH24:MI:SS.FF3TZH:TZM"
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit `OFFSET m ROWS FETCH FIRST n ROWS ONLY` or the parts that apply.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_offset_fetch(limit, offset)
    }

    /// Expression that yields a random sort key.
    fn random_order_expr(&self) -> &'static str {
        "DBMS_RANDOM.VALUE"
    }

    // =========================================================================
    // CTE
    // =========================================================================

    /// Whether to emit RECURSIVE keyword for recursive CTEs.
    ///
    /// Oracle detects recursion from the column alias list.
    fn emit_recursive_keyword(&self) -> bool {
        false
    }

    // =========================================================================
    // JSON Features
    // =========================================================================

    /// Whether `JSON_TRANSFORM` is available.
    fn supports_json_transform(&self) -> bool {
        true
    }

    /// Whether the native `JSON` data type is available.
    fn supports_json_type(&self) -> bool {
        true
    }

    /// Whether SQL `BOOLEAN` is a first-class type.
    fn supports_boolean(&self) -> bool {
        true
    }

    /// Reserved words that force quoting of an otherwise bare identifier.
    fn is_reserved(&self, word: &str) -> bool {
        helpers::is_reserved(word)
    }
}

/// Supported Oracle releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Oracle19c,
    Oracle23ai,
    #[default]
    Oracle26ai,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Oracle19c => &Oracle19c,
            Dialect::Oracle23ai => &Oracle23ai,
            Dialect::Oracle26ai => &Oracle26ai,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn bind_placeholder(&self, index: usize) -> String {
        self.dialect().bind_placeholder(index)
    }

    fn json_return_type(&self, ty: JsonReturnType) -> &'static str {
        self.dialect().json_return_type(ty)
    }

    fn unwind_value_column(&self) -> &'static str {
        self.dialect().unwind_value_column()
    }

    fn iso_timestamp_format(&self) -> &'static str {
        self.dialect().iso_timestamp_format()
    }

    fn iso_timestamp_tz_format(&self) -> &'static str {
        self.dialect().iso_timestamp_tz_format()
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn random_order_expr(&self) -> &'static str {
        self.dialect().random_order_expr()
    }

    fn emit_recursive_keyword(&self) -> bool {
        self.dialect().emit_recursive_keyword()
    }

    fn supports_json_transform(&self) -> bool {
        self.dialect().supports_json_transform()
    }

    fn supports_json_type(&self) -> bool {
        self.dialect().supports_json_type()
    }

    fn supports_boolean(&self) -> bool {
        self.dialect().supports_boolean()
    }

    fn is_reserved(&self, word: &str) -> bool {
        self.dialect().is_reserved(word)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oracle19c" | "19c" => Ok(Dialect::Oracle19c),
            "oracle23ai" | "23ai" => Ok(Dialect::Oracle23ai),
            "oracle26ai" | "26ai" | "oracle" => Ok(Dialect::Oracle26ai),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::Oracle19c.to_string(), "oracle19c");
        assert_eq!(Dialect::Oracle23ai.to_string(), "oracle23ai");
        assert_eq!(Dialect::Oracle26ai.to_string(), "oracle26ai");
    }

    #[test]
    fn test_default_is_latest() {
        assert_eq!(Dialect::default(), Dialect::Oracle26ai);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Oracle26ai.quote_identifier("status"), "status");
        assert_eq!(Dialect::Oracle26ai.quote_identifier("_id"), "\"_id\"");
        assert_eq!(Dialect::Oracle26ai.quote_identifier("order"), "\"order\"");
        assert_eq!(
            Dialect::Oracle19c.quote_identifier("weird\"name"),
            "\"weird\"\"name\""
        );
    }

    #[test]
    fn test_format_bool() {
        assert_eq!(Dialect::Oracle26ai.format_bool(true), "TRUE");
        assert_eq!(Dialect::Oracle19c.format_bool(false), "'false'");
    }

    #[test]
    fn test_feature_flags() {
        assert!(!Dialect::Oracle19c.supports_json_transform());
        assert!(Dialect::Oracle23ai.supports_json_transform());
        assert!(!Dialect::Oracle19c.supports_json_type());
        assert!(!Dialect::Oracle26ai.emit_recursive_keyword());
    }

    #[test]
    fn test_return_type_keywords() {
        assert_eq!(
            Dialect::Oracle26ai.json_return_type(JsonReturnType::Number),
            "NUMBER"
        );
        assert_eq!(
            Dialect::Oracle26ai.json_return_type(JsonReturnType::Boolean),
            "BOOLEAN"
        );
        assert_eq!(
            Dialect::Oracle19c.json_return_type(JsonReturnType::Boolean),
            "VARCHAR2(5)"
        );
    }

    #[test]
    fn test_parse_dialect() {
        assert_eq!("19c".parse::<Dialect>().unwrap(), Dialect::Oracle19c);
        assert_eq!("ORACLE".parse::<Dialect>().unwrap(), Dialect::Oracle26ai);
        assert!("postgres".parse::<Dialect>().is_err());
    }
}
