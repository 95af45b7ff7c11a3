//! Oracle Database 19c dialect.
//!
//! 19c predates several JSON features:
//! - No `JSON_TRANSFORM` (`$unset` and exclusion projections are rejected)
//! - No native `JSON` type; unwound elements are `VARCHAR2 FORMAT JSON`
//! - No SQL `BOOLEAN`; booleans compare against their JSON text

use super::helpers;
use super::SqlDialect;
use crate::ast::JsonReturnType;

/// Oracle Database 19c dialect.
#[derive(Debug, Clone, Copy)]
pub struct Oracle19c;

impl SqlDialect for Oracle19c {
    fn name(&self) -> &'static str {
        "oracle19c"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_string(b)
    }

    fn json_return_type(&self, ty: JsonReturnType) -> &'static str {
        helpers::json_return_type_legacy(ty)
    }

    fn unwind_value_column(&self) -> &'static str {
        "value VARCHAR2(4000) FORMAT JSON PATH '$'"
    }

    fn supports_json_transform(&self) -> bool {
        false
    }

    fn supports_json_type(&self) -> bool {
        false
    }

    fn supports_boolean(&self) -> bool {
        false
    }
}
