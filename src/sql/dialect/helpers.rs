//! Shared helper functions for Oracle dialect implementations.
//!
//! Reusable building blocks that the release-specific dialects compose
//! to implement the `SqlDialect` trait with minimal duplication.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::super::token::{Token, TokenStream};
use crate::ast::JsonReturnType;

// =============================================================================
// Identifier Quoting
// =============================================================================

static SIMPLE_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

static RESERVED: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "ACCESS", "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "AUDIT", "BETWEEN", "BY",
        "CHAR", "CHECK", "CLUSTER", "COLUMN", "COMMENT", "COMPRESS", "CONNECT", "CREATE",
        "CURRENT", "DATE", "DECIMAL", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
        "EXCLUSIVE", "EXISTS", "FILE", "FLOAT", "FOR", "FROM", "GRANT", "GROUP", "HAVING",
        "IDENTIFIED", "IMMEDIATE", "IN", "INCREMENT", "INDEX", "INITIAL", "INSERT", "INTEGER",
        "INTERSECT", "INTO", "IS", "LEVEL", "LIKE", "LOCK", "LONG", "MAXEXTENTS", "MINUS",
        "MODE", "MODIFY", "NOAUDIT", "NOCOMPRESS", "NOT", "NOWAIT", "NULL", "NUMBER", "OF",
        "OFFLINE", "ON", "ONLINE", "OPTION", "OR", "ORDER", "PCTFREE", "PRIOR", "PUBLIC", "RAW",
        "RENAME", "RESOURCE", "REVOKE", "ROW", "ROWID", "ROWNUM", "ROWS", "SELECT", "SESSION",
        "SET", "SHARE", "SIZE", "SMALLINT", "START", "SUCCESSFUL", "SYNONYM", "SYSDATE", "TABLE",
        "THEN", "TO", "TRIGGER", "UID", "UNION", "UNIQUE", "UPDATE", "USER", "VALIDATE",
        "VALUES", "VARCHAR", "VARCHAR2", "VIEW", "WHENEVER", "WHERE", "WITH",
    ]
    .into_iter()
    .collect()
});

/// Whether `word` is an Oracle reserved word (case-insensitive).
pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(word.to_ascii_uppercase().as_str())
}

/// Quote identifier with double quotes, doubling embedded quotes.
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Leave simple, non-reserved identifiers bare; double-quote everything else.
///
/// Names starting with `_` or containing anything outside `[A-Za-z0-9_]`
/// must be quoted to be legal.
pub fn quote_if_needed(ident: &str) -> String {
    if SIMPLE_IDENT.is_match(ident) && !is_reserved(ident) {
        ident.to_string()
    } else {
        quote_double(ident)
    }
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as a native SQL BOOLEAN literal.
/// Used by: 23ai, 26ai
pub fn format_bool_native(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Format boolean as the JSON text Oracle stores for it.
/// Used by: 19c
pub fn format_bool_string(b: bool) -> &'static str {
    if b {
        "'true'"
    } else {
        "'false'"
    }
}

// =============================================================================
// Types
// =============================================================================

/// Return-type keywords for releases with native BOOLEAN and JSON types.
pub fn json_return_type_native(ty: JsonReturnType) -> &'static str {
    match ty {
        JsonReturnType::Varchar => "VARCHAR2(4000)",
        JsonReturnType::Number => "NUMBER",
        JsonReturnType::Date => "DATE",
        JsonReturnType::Timestamp => "TIMESTAMP",
        JsonReturnType::Boolean => "BOOLEAN",
        JsonReturnType::Json => "JSON",
    }
}

/// Return-type keywords for releases without BOOLEAN / JSON types.
pub fn json_return_type_legacy(ty: JsonReturnType) -> &'static str {
    match ty {
        JsonReturnType::Boolean => "VARCHAR2(5)",
        JsonReturnType::Json => "CLOB",
        other => json_return_type_native(other),
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit `OFFSET m ROWS FETCH FIRST n ROWS ONLY`.
///
/// A zero offset is omitted so a plain Top-N renders as a single
/// `FETCH FIRST` clause.
pub fn emit_offset_fetch(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let offset = offset.filter(|o| *o > 0);
    if let Some(off) = offset {
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64))
            .space()
            .push(Token::Rows);
    }

    if let Some(lim) = limit {
        if offset.is_some() {
            ts.space();
        }
        ts.push(Token::Fetch)
            .space()
            .push(if offset.is_some() {
                Token::Next
            } else {
                Token::First
            })
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}
