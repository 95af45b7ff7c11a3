//! Query builder - assemble Oracle statements from rendered fragments.
//!
//! Expressions are rendered to `TokenStream`s by the generator before they
//! reach this module; the builder only arranges clauses.

use super::dialect::{Dialect, SqlDialect};
use super::token::{Token, TokenStream};

// =============================================================================
// Select Item (expression with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: TokenStream,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: TokenStream) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: TokenStream, alias: &str) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = self.expr.clone();
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

// =============================================================================
// Row Sources
// =============================================================================

/// A table reference with optional schema and alias.
///
/// Oracle does not accept `AS` before a table alias.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
        }
    }

    pub fn with_schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(String::from);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::QualifiedIdent {
            schema: self.schema.clone(),
            name: self.table.clone(),
        });
        if let Some(alias) = &self.alias {
            ts.space().push(Token::Ident(alias.clone()));
        }
        ts
    }
}

/// Anything that can appear in FROM or JOIN.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(TableRef),
    Subquery { query: Box<Query>, alias: String },
    /// Table-valued expression such as `JSON_TABLE(...)`.
    Expr { expr: TokenStream, alias: String },
    Dual,
}

impl Source {
    pub fn subquery(query: Query, alias: &str) -> Self {
        Source::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Source::Table(t) => t.alias.as_deref(),
            Source::Subquery { alias, .. } | Source::Expr { alias, .. } => Some(alias),
            Source::Dual => None,
        }
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        match self {
            Source::Table(t) => {
                ts.append(&t.to_tokens());
            }
            Source::Subquery { query, alias } => {
                ts.lparen()
                    .newline()
                    .append(&query.to_tokens_for_dialect(dialect))
                    .newline()
                    .rparen()
                    .space()
                    .push(Token::Ident(alias.clone()));
            }
            Source::Expr { expr, alias } => {
                ts.append(expr).space().push(Token::Ident(alias.clone()));
            }
            Source::Dual => {
                ts.raw_sql("DUAL");
            }
        }
        ts
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    Cross,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub source: Source,
    pub on: Option<TokenStream>,
}

impl Join {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Inner => ts.push(Token::Inner),
            JoinType::LeftOuter => ts.push(Token::Left).space().push(Token::Outer),
            JoinType::Cross => ts.push(Token::Cross),
        };

        ts.space().push(Token::Join).space();
        ts.append(&self.source.to_tokens_for_dialect(dialect));

        if let Some(on) = &self.on {
            ts.space().push(Token::On).space();
            ts.append(on);
        }

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: TokenStream,
    pub dir: Option<SortDir>,
    /// `NULLS FIRST` (true) or `NULLS LAST` (false); Oracle's default when unset.
    pub nulls_first: Option<bool>,
}

impl OrderByItem {
    pub fn new(expr: TokenStream) -> Self {
        Self {
            expr,
            dir: None,
            nulls_first: None,
        }
    }

    pub fn asc(expr: TokenStream) -> Self {
        Self {
            dir: Some(SortDir::Asc),
            ..Self::new(expr)
        }
    }

    pub fn desc(expr: TokenStream) -> Self {
        Self {
            dir: Some(SortDir::Desc),
            ..Self::new(expr)
        }
    }

    pub fn nulls(mut self, first: bool) -> Self {
        self.nulls_first = Some(first);
        self
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = self.expr.clone();
        if let Some(dir) = &self.dir {
            ts.space().push(match dir {
                SortDir::Asc => Token::Asc,
                SortDir::Desc => Token::Desc,
            });
        }
        match self.nulls_first {
            Some(true) => {
                ts.raw_sql(" NULLS FIRST");
            }
            Some(false) => {
                ts.raw_sql(" NULLS LAST");
            }
            None => {}
        }
        ts
    }
}

// =============================================================================
// OFFSET / FETCH
// =============================================================================

/// Row-window clause.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    /// Convert to token stream using dialect-specific pagination.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        dialect.emit_limit_offset(self.limit, self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.unwrap_or(0) == 0
    }
}

// =============================================================================
// Set Operations (UNION, INTERSECT, MINUS)
// =============================================================================

/// Type of set operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpType {
    Union,
    Intersect,
    Minus,
}

/// A set operation combining two queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub left: Box<Query>,
    pub op: SetOpType,
    pub all: bool,
    pub right: Box<Query>,
}

impl SetOperation {
    /// Create a UNION ALL operation.
    pub fn union_all(left: Query, right: Query) -> Self {
        Self {
            left: Box::new(left),
            op: SetOpType::Union,
            all: true,
            right: Box::new(right),
        }
    }

    /// Convert to tokens for a specific dialect.
    ///
    /// A branch is parenthesized only when it carries its own ORDER BY or
    /// row window; recursive WITH members must stay bare.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        emit_branch(&mut ts, &self.left, dialect);

        ts.newline();
        ts.push(match self.op {
            SetOpType::Union => Token::Union,
            SetOpType::Intersect => Token::Intersect,
            SetOpType::Minus => Token::Minus,
        });
        if self.all {
            ts.space().push(Token::All);
        }
        ts.newline();

        emit_branch(&mut ts, &self.right, dialect);

        ts
    }
}

fn emit_branch(ts: &mut TokenStream, query: &Query, dialect: Dialect) {
    let needs_parens = query.set_op.is_none()
        && (!query.order_by.is_empty() || query.limit_offset.is_some_and(|lo| !lo.is_empty()));
    if needs_parens {
        ts.lparen();
        ts.append(&query.to_tokens_for_dialect(dialect));
        ts.rparen();
    } else {
        ts.append(&query.to_tokens_for_dialect(dialect));
    }
}

// =============================================================================
// CTE (Common Table Expression)
// =============================================================================

/// Oracle `CYCLE` clause for recursive subquery factoring.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleClause {
    pub columns: Vec<String>,
    pub mark_column: String,
    pub cycle_value: String,
    pub default_value: String,
}

/// A Common Table Expression (WITH clause).
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub query: Box<Query>,
    /// Whether this is a recursive CTE.
    pub recursive: bool,
    pub cycle: Option<CycleClause>,
}

impl Cte {
    pub fn new(name: &str, query: Query) -> Self {
        Self {
            name: name.into(),
            columns: None,
            query: Box::new(query),
            recursive: false,
            cycle: None,
        }
    }

    /// Create a recursive CTE.
    pub fn recursive(name: &str, query: Query) -> Self {
        Self {
            recursive: true,
            ..Self::new(name, query)
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_cycle(mut self, cycle: CycleClause) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(self.name.clone()));

        if let Some(cols) = &self.columns {
            ts.space().lparen();
            for (i, col) in cols.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
            ts.rparen();
        }

        ts.space()
            .push(Token::As)
            .space()
            .lparen()
            .newline()
            .append(&self.query.to_tokens_for_dialect(dialect))
            .newline()
            .rparen();

        if let Some(cycle) = &self.cycle {
            ts.newline().raw_sql("CYCLE ");
            for (i, col) in cycle.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
            ts.space()
                .push(Token::Set)
                .space()
                .push(Token::Ident(cycle.mark_column.clone()))
                .raw_sql(" TO ")
                .push(Token::LitString(cycle.cycle_value.clone()))
                .raw_sql(" DEFAULT ")
                .push(Token::LitString(cycle.default_value.clone()));
        }

        ts
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// A SELECT query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub with: Vec<Cte>,
    pub select: Vec<SelectItem>,
    pub distinct: bool,
    pub from: Option<Source>,
    pub joins: Vec<Join>,
    pub where_clause: Option<TokenStream>,
    pub group_by: Vec<TokenStream>,
    pub having: Option<TokenStream>,
    pub order_by: Vec<OrderByItem>,
    pub limit_offset: Option<LimitOffset>,
    /// Set operation (UNION ALL, ...) with another query.
    pub set_op: Option<Box<SetOperation>>,
}

impl Query {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// A query that is only a container for a set operation.
    pub fn from_set_op(set_op: SetOperation) -> Self {
        Self {
            set_op: Some(Box::new(set_op)),
            ..Default::default()
        }
    }

    /// Set the SELECT list.
    pub fn select(mut self, items: Vec<SelectItem>) -> Self {
        self.select = items;
        self
    }

    /// Set the FROM source.
    pub fn from(mut self, source: Source) -> Self {
        self.from = Some(source);
        self
    }

    /// Add a JOIN.
    pub fn join(mut self, join_type: JoinType, source: Source, on: Option<TokenStream>) -> Self {
        self.joins.push(Join {
            join_type,
            source,
            on,
        });
        self
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, condition: TokenStream) -> Self {
        self.push_filter(condition);
        self
    }

    /// In-place form of [`Query::filter`].
    pub fn push_filter(&mut self, condition: TokenStream) {
        self.where_clause = Some(and_conditions(self.where_clause.take(), condition));
    }

    /// Add a HAVING condition (ANDed with existing conditions).
    pub fn push_having(&mut self, condition: TokenStream) {
        self.having = Some(and_conditions(self.having.take(), condition));
    }

    /// Set the ORDER BY clause.
    pub fn order_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.order_by = items;
        self
    }

    /// Set the fetch limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).limit = Some(limit);
        self
    }

    pub fn fetch(&self) -> Option<u64> {
        self.limit_offset.and_then(|lo| lo.limit)
    }

    pub fn offset(&self) -> Option<u64> {
        self.limit_offset.and_then(|lo| lo.offset).filter(|o| *o > 0)
    }

    /// Whether a row window (FETCH or a non-zero OFFSET) is set.
    pub fn is_row_limited(&self) -> bool {
        self.fetch().is_some() || self.offset().is_some()
    }

    /// Convert to token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // WITH clause
        if !self.with.is_empty() {
            ts.push(Token::With);

            let has_recursive = self.with.iter().any(|cte| cte.recursive);
            if has_recursive && dialect.emit_recursive_keyword() {
                ts.space().push(Token::Recursive);
            }

            ts.space();
            for (i, cte) in self.with.iter().enumerate() {
                if i > 0 {
                    ts.comma().newline();
                }
                ts.append(&cte.to_tokens_for_dialect(dialect));
            }
            ts.newline();
        }

        // If this query is a container for a set operation, emit that instead
        if let Some(ref set_op) = self.set_op {
            ts.append(&set_op.to_tokens_for_dialect(dialect));
            return ts;
        }

        // SELECT
        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }

        // Columns
        for (i, item) in self.select.iter().enumerate() {
            if i == 0 {
                ts.newline().indent(1);
            } else {
                ts.comma().newline().indent(1);
            }
            ts.append(&item.to_tokens());
        }

        // FROM
        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space();
            ts.append(&from.to_tokens_for_dialect(dialect));
        }

        // JOINs
        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens_for_dialect(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(where_clause);
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(expr);
            }
        }

        // HAVING
        if let Some(having) = &self.having {
            ts.newline().push(Token::Having).space();
            ts.append(having);
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, item) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&item.to_tokens());
            }
        }

        // OFFSET / FETCH
        if let Some(lo) = &self.limit_offset {
            if !lo.is_empty() {
                ts.newline();
                ts.append(&lo.to_tokens(dialect));
            }
        }

        ts
    }

    /// Generate SQL string for a specific dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }
}

/// `(a) AND (b)`, or just `b` when there is nothing to combine with.
pub fn and_conditions(existing: Option<TokenStream>, condition: TokenStream) -> TokenStream {
    match existing {
        None => condition,
        Some(prev) => {
            let mut ts = TokenStream::new();
            ts.lparen()
                .append(&prev)
                .rparen()
                .space()
                .push(Token::And)
                .space()
                .lparen()
                .append(&condition)
                .rparen();
            ts
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

/// `MERGE INTO target USING (source) alias ON (...) WHEN ...`
#[derive(Debug, Clone, PartialEq)]
pub struct MergeStatement {
    pub target: TableRef,
    pub source: Query,
    pub source_alias: String,
    pub on: TokenStream,
    /// Body after `WHEN MATCHED THEN`.
    pub when_matched: Option<TokenStream>,
    /// Body after `WHEN NOT MATCHED THEN`.
    pub when_not_matched: Option<TokenStream>,
}

/// A complete top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(Query),
    /// `INSERT INTO table (columns) <query>`
    Insert {
        table: TableRef,
        columns: Vec<String>,
        query: Query,
    },
    Merge(Box<MergeStatement>),
}

impl Statement {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        match self {
            Statement::Query(q) => {
                ts.append(&q.to_tokens_for_dialect(dialect));
            }
            Statement::Insert {
                table,
                columns,
                query,
            } => {
                ts.push(Token::Insert)
                    .space()
                    .push(Token::Into)
                    .space()
                    .append(&table.to_tokens())
                    .space()
                    .lparen();
                for (i, col) in columns.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.push(Token::Ident(col.clone()));
                }
                ts.rparen()
                    .newline()
                    .append(&query.to_tokens_for_dialect(dialect));
            }
            Statement::Merge(m) => {
                ts.push(Token::Merge)
                    .space()
                    .push(Token::Into)
                    .space()
                    .append(&m.target.to_tokens())
                    .newline()
                    .push(Token::Using)
                    .space()
                    .append(&Source::subquery(m.source.clone(), &m.source_alias).to_tokens_for_dialect(dialect))
                    .newline()
                    .push(Token::On)
                    .space()
                    .lparen()
                    .append(&m.on)
                    .rparen();
                if let Some(body) = &m.when_matched {
                    ts.newline()
                        .push(Token::When)
                        .space()
                        .push(Token::Matched)
                        .space()
                        .push(Token::Then)
                        .space()
                        .append(body);
                }
                if let Some(body) = &m.when_not_matched {
                    ts.newline()
                        .push(Token::When)
                        .space()
                        .push(Token::Not)
                        .space()
                        .push(Token::Matched)
                        .space()
                        .push(Token::Then)
                        .space()
                        .append(body);
                }
            }
        }
        ts
    }
}

// =============================================================================
// Tests
// =============================================================================
