//! Oracle Database 23ai dialect.
//!
//! Syntax-compatible with 26ai for everything the compiler emits.

use super::helpers;
use super::SqlDialect;

/// Oracle Database 23ai dialect.
#[derive(Debug, Clone, Copy)]
pub struct Oracle23ai;

impl SqlDialect for Oracle23ai {
    fn name(&self) -> &'static str {
        "oracle23ai"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_native(b)
    }
}
