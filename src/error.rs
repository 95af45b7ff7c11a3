//! Error taxonomy for pipeline construction and translation.
//!
//! Construction errors (`Structural`, `UnknownOperator`) surface while the
//! AST is being built. `UnsupportedFeature` is raised by the stage compiler.
//! `Validation` aggregates every issue found across a whole pipeline.

use std::fmt;

/// One problem found while validating a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Stable machine-readable code (`INVALID_FIELD`, `STAGE_ORDER`, ...).
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Errors that can occur while building or translating a pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Unsupported feature {feature}: {reason}")]
    UnsupportedFeature { feature: String, reason: String },

    #[error("Validation failed: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TranslateError {
    pub fn structural(msg: impl Into<String>) -> Self {
        TranslateError::Structural(msg.into())
    }

    pub fn unsupported(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        TranslateError::UnsupportedFeature {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    /// A validation failure carrying a single issue.
    pub fn invalid(code: &str, message: impl Into<String>) -> Self {
        TranslateError::Validation(vec![ValidationIssue::new(code, message)])
    }
}

pub type TranslateResult<T> = Result<T, TranslateError>;
