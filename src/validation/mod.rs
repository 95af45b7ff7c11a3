//! Validation of names and whole pipelines.
//!
//! Field and table names are spliced into SQL/JSON paths and identifiers,
//! so they are restricted to a safe character set before any rendering.
//! Pipeline validation collects every issue instead of stopping at the
//! first one.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Pipeline, Stage};
use crate::error::{TranslateError, TranslateResult, ValidationIssue};

pub const INVALID_FIELD: &str = "INVALID_FIELD";
pub const INVALID_TABLE: &str = "INVALID_TABLE";
pub const STAGE_ORDER: &str = "STAGE_ORDER";
pub const EMPTY_PIPELINE_FIELD: &str = "EMPTY_PIPELINE_FIELD";
pub const DUPLICATE_FIELD: &str = "DUPLICATE_FIELD";

const MAX_FIELD_LENGTH: usize = 128;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[a-zA-Z_][a-zA-Z0-9_]*|[0-9]+)$").unwrap());

static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{0,127}$").unwrap());

// =============================================================================
// Names
// =============================================================================

/// Whether `name` is a dotted path of safe segments.
///
/// Each segment starts with a letter or underscore and continues with
/// alphanumerics or underscores; all-digit segments address array positions.
pub fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FIELD_LENGTH
        && name.split('.').all(|segment| SEGMENT.is_match(segment))
        && !name.split('.').next().is_some_and(|s| s.bytes().all(|b| b.is_ascii_digit()))
}

pub fn is_valid_table_name(name: &str) -> bool {
    TABLE.is_match(name)
}

pub fn validate_field_name(name: &str) -> TranslateResult<()> {
    if name.is_empty() {
        return Err(TranslateError::invalid(
            INVALID_FIELD,
            "Field name cannot be empty",
        ));
    }
    if !is_valid_field_name(name) {
        return Err(TranslateError::invalid(
            INVALID_FIELD,
            format!(
                "Invalid field name '{}': segments must start with a letter or underscore, \
                 contain only alphanumerics and underscores, and the path must be at most {} characters",
                sanitize(name),
                MAX_FIELD_LENGTH
            ),
        ));
    }
    Ok(())
}

pub fn validate_table_name(name: &str) -> TranslateResult<()> {
    if !is_valid_table_name(name) {
        return Err(TranslateError::invalid(
            INVALID_TABLE,
            format!(
                "Invalid table name '{}': must start with a letter, contain only \
                 alphanumerics and underscores, and be at most 128 characters",
                sanitize(name)
            ),
        ));
    }
    Ok(())
}

/// Truncate and strip control characters so a hostile name cannot garble
/// an error message.
fn sanitize(input: &str) -> String {
    let truncated: String = input.chars().take(50).collect();
    let suffix = if input.chars().count() > 50 { "..." } else { "" };
    let cleaned: String = truncated
        .chars()
        .map(|c| if c.is_control() { '?' } else { c })
        .collect();
    format!("{}{}", cleaned, suffix)
}

// =============================================================================
// Pipelines
// =============================================================================

/// Validate a pipeline against its source collection.
pub fn validate(pipeline: &Pipeline, collection: &str) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    if !is_valid_table_name(collection) {
        issues.push(ValidationIssue::new(
            INVALID_TABLE,
            format!("Invalid collection name '{}'", sanitize(collection)),
        ));
    }

    validate_stages(pipeline, "pipeline", &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn validate_stages(pipeline: &Pipeline, location: &str, issues: &mut Vec<ValidationIssue>) {
    validate_stage_order(pipeline, location, issues);

    for (i, stage) in pipeline.stages().iter().enumerate() {
        let here = format!("{} stage {} ({})", location, i, stage.name());
        match stage {
            Stage::Facet(facets) => {
                for (name, sub) in facets {
                    if sub.is_empty() {
                        issues.push(ValidationIssue::new(
                            EMPTY_PIPELINE_FIELD,
                            format!("{}: facet '{}' has an empty pipeline", here, name),
                        ));
                    }
                    validate_stages(sub, &format!("{} facet '{}'", here, name), issues);
                }
            }
            Stage::UnionWith(u) => {
                if let Some(sub) = &u.pipeline {
                    validate_nested(sub, &here, issues);
                }
            }
            Stage::Lookup(l) => {
                if let crate::ast::LookupKind::Correlated { pipeline, .. } = &l.kind {
                    validate_nested(pipeline, &here, issues);
                }
            }
            Stage::Group(g) => {
                check_duplicates(g.accumulators.iter().map(|(n, _)| n.as_str()), &here, issues);
            }
            Stage::AddFields(fields) => {
                check_duplicates(fields.iter().map(|(n, _)| n.as_str()), &here, issues);
            }
            Stage::Project(p) => {
                check_duplicates(p.fields().iter().map(|(n, _)| n.as_str()), &here, issues);
            }
            _ => {}
        }
    }
}

/// Sub-pipelines must not write.
fn validate_nested(pipeline: &Pipeline, location: &str, issues: &mut Vec<ValidationIssue>) {
    for stage in pipeline.stages().iter().filter(|s| s.is_terminal()) {
        issues.push(ValidationIssue::new(
            STAGE_ORDER,
            format!("{}: {} is not allowed in a sub-pipeline", location, stage.name()),
        ));
    }
    validate_stages(pipeline, location, issues);
}

fn validate_stage_order(pipeline: &Pipeline, location: &str, issues: &mut Vec<ValidationIssue>) {
    let last = pipeline.len().saturating_sub(1);
    for (i, stage) in pipeline.stages().iter().enumerate() {
        if stage.is_terminal() && i != last {
            issues.push(ValidationIssue::new(
                STAGE_ORDER,
                format!(
                    "{}: {} must be the last stage (found at position {})",
                    location,
                    stage.name(),
                    i
                ),
            ));
        }
    }
}

fn check_duplicates<'a>(
    names: impl Iterator<Item = &'a str>,
    location: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            issues.push(ValidationIssue::new(
                DUPLICATE_FIELD,
                format!("{}: duplicate field '{}'", location, name),
            ));
        }
    }
}
