//! Oracle Database 26ai dialect.
//!
//! The default target. Everything the compiler emits is available:
//! - `JSON_TRANSFORM` for `$unset` and exclusion projections
//! - Native `JSON` column type for unwound array elements
//! - SQL `BOOLEAN` literals

use super::helpers;
use super::SqlDialect;

/// Oracle Database 26ai dialect.
#[derive(Debug, Clone, Copy)]
pub struct Oracle26ai;

impl SqlDialect for Oracle26ai {
    fn name(&self) -> &'static str {
        "oracle26ai"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_native(b)
    }
}
