//! SQL Tokens - the atomic units of SQL output.
//!
//! Tokens are release-agnostic representations that serialize to
//! Oracle-specific strings through the dialect seam. Layout tokens
//! (`Newline`, `Indent`) collapse to single spaces unless the stream is
//! serialized in pretty mode.

use super::dialect::{Dialect, SqlDialect};
use crate::ast::Literal;

/// SQL Token - every element the compiler emits.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Inner,
    Left,
    Outer,
    Cross,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    Offset,
    Fetch,
    Next,
    First,
    Rows,
    Only,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    IsNull,
    IsNotNull,
    Distinct,
    All,
    Union,
    Intersect,
    Minus,
    With,
    Recursive,
    Null,

    // === Window Function Keywords ===
    Over,
    PartitionBy,
    Range,
    Unbounded,
    Preceding,
    Following,
    CurrentRow,
    Between,

    // === DML Keywords ===
    Insert,
    Into,
    Values,
    Update,
    Set,
    Using,
    Merge,
    Matched,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Sub,
    Mul,
    Div,
    Concat,

    // === Whitespace / Formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic Content ===
    /// Simple identifier (table, column, alias)
    Ident(String),
    /// Qualified identifier: schema.table or just table
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    /// Integer literal
    LitInt(i64),
    /// Float literal
    LitFloat(f64),
    /// String literal
    LitString(String),
    /// Boolean literal
    LitBool(bool),
    /// NULL literal
    LitNull,
    /// Positional bind placeholder. Holds the 1-based position once the
    /// stream has been numbered, or the arena slot before that.
    Bind(usize),

    // === Escape Hatch ===
    /// Raw SQL passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw SQL is not sanitized.
    /// Only use with static fragments and with text that has already been
    /// validated (field paths, table names) or escaped.
    Raw(String),
}

impl Token {
    /// Serialize this token to a string for the given dialect (compact layout).
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.serialize_with(dialect, false)
    }

    fn serialize_with(&self, dialect: Dialect, pretty: bool) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Inner => "INNER".into(),
            Token::Left => "LEFT".into(),
            Token::Outer => "OUTER".into(),
            Token::Cross => "CROSS".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::Having => "HAVING".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::Offset => "OFFSET".into(),
            Token::Fetch => "FETCH".into(),
            Token::Next => "NEXT".into(),
            Token::First => "FIRST".into(),
            Token::Rows => "ROWS".into(),
            Token::Only => "ONLY".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::In => "IN".into(),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::All => "ALL".into(),
            Token::Union => "UNION".into(),
            Token::Intersect => "INTERSECT".into(),
            Token::Minus => "MINUS".into(),
            Token::With => "WITH".into(),
            Token::Recursive => "RECURSIVE".into(),
            Token::Null => "NULL".into(),

            // Window function keywords
            Token::Over => "OVER".into(),
            Token::PartitionBy => "PARTITION BY".into(),
            Token::Range => "RANGE".into(),
            Token::Unbounded => "UNBOUNDED".into(),
            Token::Preceding => "PRECEDING".into(),
            Token::Following => "FOLLOWING".into(),
            Token::CurrentRow => "CURRENT ROW".into(),
            Token::Between => "BETWEEN".into(),

            // DML keywords
            Token::Insert => "INSERT".into(),
            Token::Into => "INTO".into(),
            Token::Values => "VALUES".into(),
            Token::Update => "UPDATE".into(),
            Token::Set => "SET".into(),
            Token::Using => "USING".into(),
            Token::Merge => "MERGE".into(),
            Token::Matched => "MATCHED".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            // Operators
            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Sub => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),
            Token::Concat => "||".into(),

            // Whitespace
            Token::Space => " ".into(),
            Token::Newline => {
                if pretty {
                    "\n".into()
                } else {
                    " ".into()
                }
            }
            Token::Indent(n) => {
                if pretty {
                    "  ".repeat(*n)
                } else {
                    String::new()
                }
            }

            // Dynamic - dialect-specific formatting
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent { schema, name } => match schema {
                Some(s) => format!(
                    "{}.{}",
                    dialect.quote_identifier(s),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },
            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => format_float(*f),
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::LitNull => "NULL".into(),
            Token::Bind(n) => dialect.bind_placeholder(*n),

            // Escape hatch
            Token::Raw(s) => s.clone(),
        }
    }

    /// Token that renders `lit` inline as an escaped SQL literal.
    pub fn literal(lit: &Literal) -> Token {
        match lit {
            Literal::Null => Token::LitNull,
            Literal::Bool(b) => Token::LitBool(*b),
            Literal::Int(i) => Token::LitInt(*i),
            Literal::Double(f) => Token::LitFloat(*f),
            Literal::String(s) => Token::LitString(s.clone()),
            Literal::Array(_) => Token::LitString(lit.to_json_string()),
        }
    }
}

/// Non-finite doubles have no SQL literal; Oracle spells them as
/// `BINARY_DOUBLE` constants.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "BINARY_DOUBLE_NAN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 {
            "BINARY_DOUBLE_INFINITY".into()
        } else {
            "-BINARY_DOUBLE_INFINITY".into()
        };
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format(f).to_string()
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Stream holding a single raw fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        let mut ts = Self::new();
        ts.push(Token::Raw(sql.into()));
        ts
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Serialize all tokens to a single-line SQL string.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens
            .iter()
            .map(|t| t.serialize_with(dialect, false))
            .collect()
    }

    /// Serialize with line breaks and indentation.
    pub fn serialize_pretty(&self, dialect: Dialect) -> String {
        self.tokens
            .iter()
            .map(|t| t.serialize_with(dialect, true))
            .collect()
    }

    /// Renumber bind placeholders in textual order.
    ///
    /// Each `Bind(slot)` refers to a value in `arena`. The returned stream
    /// numbers placeholders `1..=n` in the order they appear, and the
    /// returned values line up with those numbers. A slot that appears
    /// twice is bound twice.
    pub fn number_binds(&self, arena: &[Literal]) -> (TokenStream, Vec<Literal>) {
        let mut values = Vec::new();
        let tokens = self
            .tokens
            .iter()
            .map(|t| match t {
                Token::Bind(slot) => {
                    values.push(arena.get(*slot).cloned().unwrap_or(Literal::Null));
                    Token::Bind(values.len())
                }
                other => other.clone(),
            })
            .collect();
        (TokenStream { tokens }, values)
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
    pub fn raw_sql(&mut self, sql: &str) -> &mut Self {
        self.push(Token::Raw(sql.to_string()))
    }
}
