//! Per-call translation inputs: the target table and the rendering options.

use serde::{Deserialize, Serialize};

use crate::error::{TranslateError, TranslateResult};
use crate::sql::dialect::Dialect;
use crate::validation;

/// Where the source collection lives in Oracle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OracleConfiguration {
    /// Table holding the collection's documents.
    pub collection: String,

    /// Owning schema, if not the connected user's.
    pub schema: Option<String>,

    /// JSON document column.
    pub data_column: String,

    /// Primary key column (`_id` mirror) used by `$merge`.
    pub id_column: String,
}

impl Default for OracleConfiguration {
    fn default() -> Self {
        Self {
            collection: String::new(),
            schema: None,
            data_column: "data".to_string(),
            id_column: "id".to_string(),
        }
    }
}

impl OracleConfiguration {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn with_data_column(mut self, column: &str) -> Self {
        self.data_column = column.to_string();
        self
    }

    pub fn with_id_column(mut self, column: &str) -> Self {
        self.id_column = column.to_string();
        self
    }

    /// `schema.collection` or just `collection`.
    pub fn qualified_table(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.collection),
            None => self.collection.clone(),
        }
    }

    /// Check every name that ends up in generated SQL.
    pub fn validate(&self) -> TranslateResult<()> {
        validation::validate_table_name(&self.collection)?;
        if let Some(schema) = &self.schema {
            validation::validate_table_name(schema)?;
        }
        for column in [&self.data_column, &self.id_column] {
            if !validation::is_valid_table_name(column) {
                return Err(TranslateError::invalid(
                    validation::INVALID_FIELD,
                    format!("Invalid column name '{}'", column),
                ));
            }
        }
        Ok(())
    }
}

/// Rendering switches for one `translate()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationOptions {
    /// Render values as escaped literals instead of `:n` placeholders.
    pub inline_binds: bool,

    /// Line breaks and indentation in the SQL text.
    pub pretty: bool,

    /// Fail instead of emitting best-effort SQL.
    pub strict: bool,

    /// Run the optimizer chain before compiling.
    pub optimize: bool,

    pub dialect: Dialect,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            inline_binds: false,
            pretty: false,
            strict: false,
            optimize: true,
            dialect: Dialect::default(),
        }
    }
}

impl TranslationOptions {
    pub fn with_inline_binds(mut self, inline: bool) -> Self {
        self.inline_binds = inline;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_table() {
        let config = OracleConfiguration::new("orders");
        assert_eq!(config.qualified_table(), "orders");
        assert_eq!(config.with_schema("sales").qualified_table(), "sales.orders");
    }

    #[test]
    fn test_defaults() {
        let config = OracleConfiguration::new("orders");
        assert_eq!(config.data_column, "data");
        assert_eq!(config.id_column, "id");

        let options = TranslationOptions::default();
        assert!(options.optimize);
        assert!(!options.inline_binds);
        assert_eq!(options.dialect, Dialect::Oracle26ai);
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(OracleConfiguration::new("orders").validate().is_ok());
        assert!(OracleConfiguration::new("orders; drop").validate().is_err());
        assert!(OracleConfiguration::new("orders")
            .with_data_column("doc col")
            .validate()
            .is_err());
    }
}
