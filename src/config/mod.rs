//! Configuration module for aggsql.
//!
//! Handles the target table description, rendering options, and TOML settings.

mod options;
mod settings;

pub use options::{OracleConfiguration, TranslationOptions};
pub use settings::{expand_env_vars, Settings, SettingsError};
