//! Per-call compiler state.
//!
//! One `GenerationContext` exists per `translate()` call. Renderers write
//! into its buffer; nested fragments are rendered into a child buffer with
//! [`GenerationContext::capture`] and spliced back where they belong.

use std::collections::HashMap;
use std::mem;

use tracing::trace;

use super::scope::Scope;
use crate::ast::Literal;
use crate::config::{OracleConfiguration, TranslationOptions};
use crate::error::{TranslateError, TranslateResult};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::query::Cte;
use crate::sql::token::{Token, TokenStream};
use crate::translate::{TranslationCapability, TranslationWarning};

pub struct GenerationContext<'a> {
    config: &'a OracleConfiguration,
    options: &'a TranslationOptions,
    buf: TokenStream,
    /// Bind arena. `Token::Bind(slot)` indexes into it until the final
    /// statement is numbered.
    binds: Vec<Literal>,
    aliases: HashMap<String, usize>,
    inline_depth: usize,
    scope: Scope,
    /// `$filter`/`$map` element variables mapped to their JSON_TABLE alias.
    elements: Vec<(String, String)>,
    ctes: Vec<Cte>,
    warnings: Vec<TranslationWarning>,
    capability: TranslationCapability,
    stage: Option<&'static str>,
}

impl<'a> GenerationContext<'a> {
    pub fn new(config: &'a OracleConfiguration, options: &'a TranslationOptions) -> Self {
        Self {
            config,
            options,
            buf: TokenStream::new(),
            binds: Vec::new(),
            aliases: HashMap::new(),
            inline_depth: 0,
            scope: Scope::empty(),
            elements: Vec::new(),
            ctes: Vec::new(),
            warnings: Vec::new(),
            capability: TranslationCapability::FullSupport,
            stage: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.options.dialect
    }

    pub fn config(&self) -> &OracleConfiguration {
        self.config
    }

    pub fn options(&self) -> &TranslationOptions {
        self.options
    }

    pub fn data_column(&self) -> &str {
        &self.config.data_column
    }

    // =========================================================================
    // Output buffer
    // =========================================================================

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.buf.push(token);
        self
    }

    /// Append a static SQL fragment.
    pub fn raw(&mut self, sql: &str) -> &mut Self {
        self.buf.raw_sql(sql);
        self
    }

    pub fn append(&mut self, ts: &TokenStream) -> &mut Self {
        self.buf.append(ts);
        self
    }

    /// Quoted SQL string literal. Only for text produced by the compiler
    /// itself (JSON paths, object keys, format masks).
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.buf.push(Token::LitString(s.to_string()));
        self
    }

    pub fn ident(&mut self, name: &str) -> &mut Self {
        self.buf.push(Token::Ident(name.to_string()));
        self
    }

    /// `alias.column`
    pub fn qualified(&mut self, alias: &str, column: &str) -> &mut Self {
        self.buf
            .push(Token::Ident(alias.to_string()))
            .push(Token::Dot)
            .push(Token::Ident(column.to_string()));
        self
    }

    /// Render `f` into a fresh buffer and return what it wrote.
    pub fn capture<F>(&mut self, f: F) -> TranslateResult<TokenStream>
    where
        F: FnOnce(&mut Self) -> TranslateResult<()>,
    {
        let saved = mem::take(&mut self.buf);
        let result = f(self);
        let captured = mem::replace(&mut self.buf, saved);
        result.map(|_| captured)
    }

    // =========================================================================
    // Binds
    // =========================================================================

    /// Emit a value. NULL and booleans always render inline; everything
    /// else becomes a bind placeholder unless inline mode is active.
    pub fn bind(&mut self, value: &Literal) -> &mut Self {
        match value {
            Literal::Null => {
                self.buf.push(Token::LitNull);
            }
            Literal::Bool(b) => {
                let sql = self.dialect().format_bool(*b);
                self.buf.raw_sql(sql);
            }
            _ if self.is_inline() => {
                self.buf.push(Token::literal(value));
            }
            _ => {
                self.binds.push(value.clone());
                self.buf.push(Token::Bind(self.binds.len() - 1));
            }
        }
        self
    }

    /// Whether values currently render as literals.
    pub fn is_inline(&self) -> bool {
        self.options.inline_binds || self.inline_depth > 0
    }

    /// Run `f` with every value rendered inline. Used where the same text
    /// must appear twice and compare equal (GROUP BY keys).
    pub fn inline<T, F>(&mut self, f: F) -> TranslateResult<T>
    where
        F: FnOnce(&mut Self) -> TranslateResult<T>,
    {
        self.inline_depth += 1;
        let result = f(self);
        self.inline_depth -= 1;
        result
    }

    pub fn binds(&self) -> &[Literal] {
        &self.binds
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    /// Next collision-free alias for `prefix`: `prefix_1`, `prefix_2`, ...
    pub fn alias(&mut self, prefix: &str) -> String {
        let counter = self.aliases.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        format!("{}_{}", prefix, counter)
    }

    // =========================================================================
    // Scope
    // =========================================================================

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    /// Install `scope`, returning the one it replaces.
    pub fn replace_scope(&mut self, scope: Scope) -> Scope {
        trace!(?scope, "enter scope");
        mem::replace(&mut self.scope, scope)
    }

    /// Run `f` against a temporary scope, restoring the current one after.
    pub fn with_scope<T, F>(&mut self, scope: Scope, f: F) -> TranslateResult<T>
    where
        F: FnOnce(&mut Self) -> TranslateResult<T>,
    {
        let saved = mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    pub fn push_element(&mut self, name: &str, alias: &str) {
        self.elements.push((name.to_string(), alias.to_string()));
    }

    pub fn pop_element(&mut self) {
        self.elements.pop();
    }

    /// JSON_TABLE alias bound to an element variable, innermost first.
    pub fn element(&self, name: &str) -> Option<&str> {
        self.elements
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, alias)| alias.as_str())
    }

    // =========================================================================
    // Hoisted CTEs
    // =========================================================================

    pub fn add_cte(&mut self, cte: Cte) {
        self.ctes.push(cte);
    }

    pub fn take_ctes(&mut self) -> Vec<Cte> {
        mem::take(&mut self.ctes)
    }

    // =========================================================================
    // Warnings
    // =========================================================================

    pub fn set_stage(&mut self, stage: Option<&'static str>) {
        self.stage = stage;
    }

    /// Record a deviation from exact semantics.
    ///
    /// In strict mode a `Partial` translation is an error instead.
    pub fn warn(
        &mut self,
        feature: &str,
        message: impl Into<String>,
        capability: TranslationCapability,
    ) -> TranslateResult<()> {
        let message = message.into();
        if self.options.strict && capability == TranslationCapability::Partial {
            return Err(TranslateError::unsupported(feature, message));
        }
        self.capability = self.capability.max(capability);
        self.warnings.push(TranslationWarning {
            stage: self.stage.map(str::to_string),
            feature: feature.to_string(),
            message,
            capability,
        });
        Ok(())
    }

    pub fn warnings(&self) -> &[TranslationWarning] {
        &self.warnings
    }

    pub fn capability(&self) -> TranslationCapability {
        self.capability
    }

    /// Consume the context, returning the bind arena and diagnostics.
    pub fn finish(self) -> (Vec<Literal>, Vec<TranslationWarning>, TranslationCapability) {
        (self.binds, self.warnings, self.capability)
    }
}
