//! Name resolution for the query under construction.
//!
//! A [`Scope`] describes what the current row looks like: either a JSON
//! document (optionally with pending field overrides) or a set of named
//! output columns. Field paths resolve against it in a fixed order:
//!
//! 1. virtual fields added by `$addFields` / `$setWindowFields`
//! 2. `$lookup` / `$graphLookup` results
//! 3. `$unwind` element values and index fields
//! 4. named columns (after `$group`, `$project`, `$count`)
//! 5. the document itself

use crate::ast::{json_path_of, FieldPath};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::query::SelectItem;
use crate::sql::token::{Token, TokenStream};

/// Aggregated documents column of a lookup derived table.
pub const DOCS_COLUMN: &str = "docs";
/// Join key column of a lookup derived table.
pub const KEY_COLUMN: &str = "k";
/// Element column of an unwind `JSON_TABLE`.
pub const VALUE_COLUMN: &str = "value";
/// Ordinality column of an unwind `JSON_TABLE` (1-based).
pub const INDEX_COLUMN: &str = "idx";

/// Where the current document comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DocSource {
    /// A stored JSON column, addressable with dot notation.
    Column { alias: String, column: String },
    /// A computed JSON value (`$replaceRoot`, `$facet`).
    Expr(TokenStream),
}

impl DocSource {
    pub fn to_tokens(&self) -> TokenStream {
        match self {
            DocSource::Column { alias, column } => qualified(alias, column),
            DocSource::Expr(expr) => expr.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// `alias.name` of a materialized subquery.
    Qualified(String),
    /// An expression selected under the column's name in this query.
    Output(TokenStream),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub name: String,
    pub value: ColumnValue,
    /// Holds JSON text rather than a scalar.
    pub json: bool,
}

/// A field computed in this query but not yet merged into the document.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualField {
    pub name: String,
    pub expr: TokenStream,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub from: String,
    pub local_field: FieldPath,
    pub foreign_field: FieldPath,
}

/// A joined `$lookup` result; `alias.docs` holds the matched documents array.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupBinding {
    pub as_field: String,
    pub alias: String,
    /// Equality keys, used to count matches without the join.
    pub foreign: Option<ForeignKey>,
}

/// A joined unwind `JSON_TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwindBinding {
    pub path: String,
    pub alias: String,
    pub index_field: Option<String>,
}

/// A location inside a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRef {
    pub doc: TokenStream,
    /// Dotted path below `doc`; empty addresses the value itself.
    pub rest: String,
    /// `doc` is a stored column that accepts simple dot notation.
    pub dot_notation: bool,
    /// `doc` is an array and the path applies to every element.
    pub each: bool,
}

impl JsonRef {
    pub fn new(doc: TokenStream, rest: &str) -> Self {
        Self {
            doc,
            rest: rest.to_string(),
            dot_notation: false,
            each: false,
        }
    }

    /// SQL/JSON path for this location, e.g. `$.items[0].sku`.
    pub fn json_path(&self) -> String {
        let path = json_path_of(&self.rest);
        if self.each {
            format!("$[*]{}", &path[1..])
        } else {
            path
        }
    }

    /// `alias.data.customer.city`
    pub fn dotted(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.doc.clone();
        if self.rest.is_empty() {
            return ts;
        }
        for segment in self.rest.split('.') {
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                ts.raw_sql(&format!("[{}]", segment));
            } else {
                ts.push(Token::Dot)
                    .raw_sql(&dialect.quote_identifier(segment));
            }
        }
        ts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A value that needs no further extraction.
    Value { expr: TokenStream, json: bool },
    Json(JsonRef),
    /// Nothing in scope produces this field.
    Missing,
}

/// One named entry of the current row.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub expr: TokenStream,
    pub json: bool,
    /// Already selected under this name by the underlying subquery.
    pub passthrough: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub doc: Option<DocSource>,
    pub columns: Vec<ColumnBinding>,
    pub virtual_fields: Vec<VirtualField>,
    pub lookups: Vec<LookupBinding>,
    pub unwinds: Vec<UnwindBinding>,
    /// Helper columns selected alongside the row (`NTILE` buckets).
    pub extras: Vec<SelectItem>,
}

impl Scope {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rows carry one document in `alias.column`.
    pub fn document(alias: &str, column: &str) -> Self {
        Self {
            doc: Some(DocSource::Column {
                alias: alias.to_string(),
                column: column.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn is_document(&self) -> bool {
        self.doc.is_some()
    }

    /// Fields computed in this query that are not part of the document yet.
    pub fn has_pending(&self) -> bool {
        !self.virtual_fields.is_empty() || !self.lookups.is_empty() || !self.unwinds.is_empty()
    }

    pub fn virtual_field(&self, name: &str) -> Option<&VirtualField> {
        self.virtual_fields.iter().rev().find(|v| v.name == name)
    }

    pub fn add_virtual(&mut self, name: &str, expr: TokenStream, json: bool) {
        self.virtual_fields.retain(|v| v.name != name);
        self.virtual_fields.push(VirtualField {
            name: name.to_string(),
            expr,
            json,
        });
    }

    pub fn lookup(&self, name: &str) -> Option<&LookupBinding> {
        self.lookups.iter().rev().find(|l| l.as_field == name)
    }

    /// Resolve a dotted field path against the current row.
    ///
    /// With `order_by` set, an output column of this query resolves to its
    /// alias instead of repeating the expression.
    pub fn resolve(&self, path: &str, order_by: bool) -> Resolved {
        for vf in self.virtual_fields.iter().rev() {
            if vf.name == path {
                return Resolved::Value {
                    expr: vf.expr.clone(),
                    json: vf.json,
                };
            }
            if let Some(rest) = sub_path(path, &vf.name) {
                return Resolved::Json(JsonRef::new(vf.expr.clone(), rest));
            }
        }

        for lookup in self.lookups.iter().rev() {
            let docs = qualified(&lookup.alias, DOCS_COLUMN);
            if lookup.as_field == path {
                return Resolved::Value {
                    expr: docs,
                    json: true,
                };
            }
            if let Some(rest) = sub_path(path, &lookup.as_field) {
                let positional = rest
                    .split('.')
                    .next()
                    .is_some_and(|s| s.bytes().all(|b| b.is_ascii_digit()));
                let mut json = JsonRef::new(docs, rest);
                json.each = !positional;
                return Resolved::Json(json);
            }
        }

        for unwind in self.unwinds.iter().rev() {
            if unwind.index_field.as_deref() == Some(path) {
                return Resolved::Value {
                    expr: index_expr(&unwind.alias),
                    json: false,
                };
            }
            let value = qualified(&unwind.alias, VALUE_COLUMN);
            if unwind.path == path {
                return Resolved::Json(JsonRef::new(value, ""));
            }
            if let Some(rest) = sub_path(path, &unwind.path) {
                return Resolved::Json(JsonRef::new(value, rest));
            }
        }

        for column in self.columns.iter().rev() {
            let expr = match &column.value {
                ColumnValue::Qualified(alias) => qualified(alias, &column.name),
                ColumnValue::Output(_) if order_by && column.name == path => {
                    let mut ts = TokenStream::new();
                    ts.push(Token::Ident(column.name.clone()));
                    ts
                }
                ColumnValue::Output(expr) => expr.clone(),
            };
            if column.name == path {
                return Resolved::Value {
                    expr,
                    json: column.json,
                };
            }
            if let Some(rest) = sub_path(path, &column.name) {
                return Resolved::Json(JsonRef::new(expr, rest));
            }
        }

        match &self.doc {
            Some(doc @ DocSource::Column { .. }) => {
                let mut json = JsonRef::new(doc.to_tokens(), path);
                json.dot_notation = true;
                Resolved::Json(json)
            }
            Some(DocSource::Expr(expr)) => Resolved::Json(JsonRef::new(expr.clone(), path)),
            None => Resolved::Missing,
        }
    }

    /// Named entries of the row, later bindings shadowing earlier ones.
    pub fn entries(&self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut push = |entry: Entry| {
            entries.retain(|e| e.name != entry.name);
            entries.push(entry);
        };

        for column in &self.columns {
            let (expr, passthrough) = match &column.value {
                ColumnValue::Qualified(alias) => (qualified(alias, &column.name), true),
                ColumnValue::Output(expr) => (expr.clone(), false),
            };
            push(Entry {
                name: column.name.clone(),
                expr,
                json: column.json,
                passthrough,
            });
        }
        for vf in &self.virtual_fields {
            push(Entry {
                name: vf.name.clone(),
                expr: vf.expr.clone(),
                json: vf.json,
                passthrough: false,
            });
        }
        for lookup in &self.lookups {
            push(Entry {
                name: lookup.as_field.clone(),
                expr: qualified(&lookup.alias, DOCS_COLUMN),
                json: true,
                passthrough: false,
            });
        }
        for unwind in &self.unwinds {
            push(Entry {
                name: unwind.path.clone(),
                expr: qualified(&unwind.alias, VALUE_COLUMN),
                json: true,
                passthrough: false,
            });
            if let Some(index) = &unwind.index_field {
                push(Entry {
                    name: index.clone(),
                    expr: index_expr(&unwind.alias),
                    json: false,
                    passthrough: false,
                });
            }
        }
        entries
    }

    /// The current row as one JSON document.
    pub fn document_expr(&self, dialect: Dialect) -> TokenStream {
        let Some(doc) = &self.doc else {
            return json_object(&self.entries());
        };
        let base = doc.to_tokens();
        let mut merges = Scope {
            doc: None,
            columns: Vec::new(),
            virtual_fields: self.virtual_fields.clone(),
            lookups: self.lookups.clone(),
            unwinds: self.unwinds.clone(),
            extras: Vec::new(),
        }
        .entries();
        if merges.is_empty() {
            return base;
        }

        let mut ts = TokenStream::new();
        if dialect.supports_json_transform() {
            ts.raw_sql("JSON_TRANSFORM(").append(&base);
            for entry in merges.drain(..) {
                ts.comma()
                    .space()
                    .push(Token::Set)
                    .space()
                    .push(Token::LitString(json_path_of(&entry.name)))
                    .raw_sql(" = ")
                    .append(&entry.expr);
                if entry.json {
                    ts.raw_sql(" FORMAT JSON");
                }
            }
            ts.rparen();
        } else {
            ts.raw_sql("JSON_MERGEPATCH(")
                .append(&base)
                .comma()
                .space()
                .append(&json_object(&merges))
                .rparen();
        }
        ts
    }

    /// SELECT list producing this row.
    pub fn select_items(&self, dialect: Dialect, data_column: &str) -> Vec<SelectItem> {
        let mut items = Vec::new();
        match &self.doc {
            Some(DocSource::Column { column, .. }) if !self.has_pending() && column == data_column => {
                items.push(SelectItem::new(self.document_expr(dialect)));
            }
            Some(_) => {
                items.push(SelectItem::aliased(self.document_expr(dialect), data_column));
            }
            None => {
                for entry in self.entries() {
                    if entry.passthrough {
                        items.push(SelectItem::new(entry.expr));
                    } else {
                        items.push(SelectItem::aliased(entry.expr, &entry.name));
                    }
                }
            }
        }
        items.extend(self.extras.iter().cloned());
        items
    }

    /// Scope of a query that selects from this one wrapped as `alias`.
    pub fn materialized(&self, alias: &str, data_column: &str) -> Scope {
        if self.doc.is_some() {
            return Scope::document(alias, data_column);
        }
        Scope {
            columns: self
                .entries()
                .into_iter()
                .map(|e| ColumnBinding {
                    name: e.name,
                    value: ColumnValue::Qualified(alias.to_string()),
                    json: e.json,
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// `path` below `prefix`, if `prefix` is a proper ancestor.
fn sub_path<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    path.strip_prefix(prefix)?.strip_prefix('.')
}

pub fn qualified(alias: &str, column: &str) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Ident(alias.to_string()))
        .push(Token::Dot)
        .push(Token::Ident(column.to_string()));
    ts
}

/// 0-based position of an unwound element.
fn index_expr(alias: &str) -> TokenStream {
    let mut ts = qualified(alias, INDEX_COLUMN);
    ts.raw_sql(" - 1");
    ts
}

/// `JSON_OBJECT('k' VALUE v, ...)`, nesting dotted names.
pub fn json_object(entries: &[Entry]) -> TokenStream {
    let members: Vec<Member> = entries
        .iter()
        .map(|e| Member {
            segments: e.name.split('.').collect(),
            expr: &e.expr,
            json: e.json,
        })
        .collect();
    let refs: Vec<&Member> = members.iter().collect();
    let mut ts = TokenStream::new();
    emit_object(&mut ts, &refs, 0);
    ts
}

struct Member<'a> {
    segments: Vec<&'a str>,
    expr: &'a TokenStream,
    json: bool,
}

fn emit_object(ts: &mut TokenStream, members: &[&Member], depth: usize) {
    ts.raw_sql("JSON_OBJECT(");
    let mut seen: Vec<&str> = Vec::new();
    for member in members {
        let key = member.segments[depth];
        if seen.contains(&key) {
            continue;
        }
        if !seen.is_empty() {
            ts.comma().space();
        }
        seen.push(key);

        ts.push(Token::LitString(key.to_string())).raw_sql(" VALUE ");
        let group: Vec<&Member> = members
            .iter()
            .copied()
            .filter(|m| m.segments[depth] == key)
            .collect();
        match group.iter().rev().find(|m| m.segments.len() == depth + 1) {
            Some(leaf) => {
                ts.append(leaf.expr);
                if leaf.json {
                    ts.raw_sql(" FORMAT JSON");
                }
            }
            None => emit_object(ts, &group, depth + 1),
        }
    }
    ts.rparen();
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Dialect = Dialect::Oracle26ai;

    fn sql(ts: &TokenStream) -> String {
        ts.serialize(D)
    }

    #[test]
    fn test_document_paths_use_dot_notation() {
        let scope = Scope::document("base", "data");
        let Resolved::Json(json) = scope.resolve("customer.city", false) else {
            panic!("expected json location");
        };
        assert!(json.dot_notation);
        assert_eq!(sql(&json.dotted(D)), "base.data.customer.city");
        assert_eq!(json.json_path(), "$.customer.city");

        let Resolved::Json(json) = scope.resolve("items.0._id", false) else {
            panic!("expected json location");
        };
        assert_eq!(sql(&json.dotted(D)), "base.data.items[0].\"_id\"");
    }

    #[test]
    fn test_virtual_fields_shadow_document() {
        let mut scope = Scope::document("base", "data");
        scope.add_virtual("total", TokenStream::raw("x + 1"), false);
        assert_eq!(
            scope.resolve("total", false),
            Resolved::Value {
                expr: TokenStream::raw("x + 1"),
                json: false
            }
        );
        let Resolved::Json(json) = scope.resolve("total.amount", false) else {
            panic!("expected json location");
        };
        assert!(!json.dot_notation);
    }

    #[test]
    fn test_lookup_sub_path_spans_elements() {
        let mut scope = Scope::document("base", "data");
        scope.lookups.push(LookupBinding {
            as_field: "stock".into(),
            alias: "inventory_1".into(),
            foreign: None,
        });
        let Resolved::Json(json) = scope.resolve("stock.qty", false) else {
            panic!("expected json location");
        };
        assert_eq!(sql(&json.doc), "inventory_1.docs");
        assert_eq!(json.json_path(), "$[*].qty");

        let Resolved::Json(json) = scope.resolve("stock.0.qty", false) else {
            panic!("expected json location");
        };
        assert_eq!(json.json_path(), "$[0].qty");
    }

    #[test]
    fn test_unwind_index_is_zero_based() {
        let mut scope = Scope::document("base", "data");
        scope.unwinds.push(UnwindBinding {
            path: "tags".into(),
            alias: "unwind_1".into(),
            index_field: Some("pos".into()),
        });
        let Resolved::Value { expr, .. } = scope.resolve("pos", false) else {
            panic!("expected value");
        };
        assert_eq!(sql(&expr), "unwind_1.idx - 1");
    }

    #[test]
    fn test_group_columns_in_order_by() {
        let scope = Scope {
            columns: vec![ColumnBinding {
                name: "total".into(),
                value: ColumnValue::Output(TokenStream::raw("NVL(SUM(x), 0)")),
                json: false,
            }],
            ..Default::default()
        };
        let Resolved::Value { expr, .. } = scope.resolve("total", true) else {
            panic!("expected value");
        };
        assert_eq!(sql(&expr), "total");
        let Resolved::Value { expr, .. } = scope.resolve("total", false) else {
            panic!("expected value");
        };
        assert_eq!(sql(&expr), "NVL(SUM(x), 0)");
        assert_eq!(scope.resolve("other", false), Resolved::Missing);
    }

    #[test]
    fn test_document_expr_merges_pending_fields() {
        let mut scope = Scope::document("base", "data");
        scope.add_virtual("flag", TokenStream::raw("1"), false);
        assert_eq!(
            sql(&scope.document_expr(Dialect::Oracle26ai)),
            "JSON_TRANSFORM(base.data, SET '$.flag' = 1)"
        );
        assert_eq!(
            sql(&scope.document_expr(Dialect::Oracle19c)),
            "JSON_MERGEPATCH(base.data, JSON_OBJECT('flag' VALUE 1))"
        );
    }

    #[test]
    fn test_json_object_nests_dotted_names() {
        let entries = vec![
            Entry {
                name: "a.b".into(),
                expr: TokenStream::raw("1"),
                json: false,
                passthrough: false,
            },
            Entry {
                name: "a.c".into(),
                expr: TokenStream::raw("2"),
                json: false,
                passthrough: false,
            },
            Entry {
                name: "d".into(),
                expr: TokenStream::raw("x"),
                json: true,
                passthrough: false,
            },
        ];
        assert_eq!(
            sql(&json_object(&entries)),
            "JSON_OBJECT('a' VALUE JSON_OBJECT('b' VALUE 1, 'c' VALUE 2), 'd' VALUE x FORMAT JSON)"
        );
    }

    #[test]
    fn test_materialized_columns() {
        let scope = Scope {
            columns: vec![ColumnBinding {
                name: "_id".into(),
                value: ColumnValue::Output(TokenStream::raw("k")),
                json: false,
            }],
            ..Default::default()
        };
        let items = scope.select_items(D, "data");
        assert_eq!(sql(&items[0].to_tokens()), "k AS \"_id\"");

        let next = scope.materialized("q_1", "data");
        let items = next.select_items(D, "data");
        assert_eq!(sql(&items[0].to_tokens()), "q_1.\"_id\"");
    }
}
