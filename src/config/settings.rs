//! TOML-based configuration for aggsql.
//!
//! Supports a config file (aggsql.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [oracle]
//! collection = "orders"
//! schema = "${ORDERS_SCHEMA}"
//! data_column = "data"
//!
//! [translation]
//! dialect = "oracle19c"
//! inline_binds = false
//! pretty = true
//! strict = true
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::options::{OracleConfiguration, TranslationOptions};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Source table settings.
    pub oracle: OracleConfiguration,

    /// Rendering options.
    pub translation: TranslationOptions,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text, expanding `${VAR}` in names.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let mut settings: Settings = toml::from_str(content)?;
        settings.oracle.collection = expand_env_vars(&settings.oracle.collection)?;
        if let Some(schema) = &settings.oracle.schema {
            settings.oracle.schema = Some(expand_env_vars(schema)?);
        }
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `AGGSQL_CONFIG`
    /// 2. `./aggsql.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("AGGSQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("aggsql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }

    fn check(&self) -> Result<(), SettingsError> {
        // An empty collection is allowed: pipelines may name their own source.
        if self.oracle.collection.is_empty() {
            return Ok(());
        }
        self.oracle
            .validate()
            .map_err(|e| SettingsError::InvalidConfig(e.to_string()))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut var_name = String::new();
        while let Some(&ch) = chars.peek() {
            if braced && ch == '}' {
                chars.next();
                break;
            }
            if !braced && !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            var_name.push(ch);
            chars.next();
        }

        if var_name.is_empty() && !braced {
            // Just a lone $, keep it
            result.push('$');
            continue;
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::Dialect;

    #[test]
    fn test_expand_env_vars_braces() {
        env::set_var("AGGSQL_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${AGGSQL_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            expand_env_vars("prefix_${AGGSQL_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        env::remove_var("AGGSQL_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        env::set_var("AGGSQL_TEST_VAR2", "world");
        assert_eq!(expand_env_vars("$AGGSQL_TEST_VAR2").unwrap(), "world");
        assert_eq!(expand_env_vars("$AGGSQL_TEST_VAR2!").unwrap(), "world!");
        assert_eq!(expand_env_vars("cost $").unwrap(), "cost $");
        env::remove_var("AGGSQL_TEST_VAR2");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert!(matches!(result, Err(SettingsError::MissingEnvVar(_))));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[oracle]
collection = "orders"
schema = "sales"

[translation]
dialect = "oracle19c"
pretty = true
strict = true
"#;

        let settings = Settings::from_toml(toml).unwrap();

        assert_eq!(settings.oracle.qualified_table(), "sales.orders");
        assert_eq!(settings.oracle.data_column, "data");
        assert_eq!(settings.translation.dialect, Dialect::Oracle19c);
        assert!(settings.translation.pretty);
        assert!(settings.translation.strict);
        assert!(settings.translation.optimize);
    }

    #[test]
    fn test_invalid_collection_rejected() {
        let toml = r#"
[oracle]
collection = "orders; drop table x"
"#;
        assert!(matches!(
            Settings::from_toml(toml),
            Err(SettingsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert!(settings.oracle.collection.is_empty());
        assert_eq!(settings.translation.dialect, Dialect::Oracle26ai);
        assert!(!settings.translation.inline_binds);
    }
}
