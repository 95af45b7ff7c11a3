//! End-to-end translation from a pipeline to Oracle SQL.
//!
//! ```text
//! JSON → [parser] → Pipeline → validate → [optimizer] → [generator] → SQL + binds
//! ```
//!
//! # Example
//!
//! ```
//! use aggsql::{translate_json, OracleConfiguration, TranslationOptions};
//! use serde_json::json;
//!
//! let pipeline = json!([
//!     {"$match": {"status": "active"}},
//!     {"$group": {"_id": "$grp", "total": {"$sum": "$value"}}}
//! ]);
//! let config = OracleConfiguration::new("orders");
//! let result = translate_json(&pipeline, &config, &TranslationOptions::default()).unwrap();
//! assert!(result.sql.contains("WHERE"));
//! assert!(result.sql.contains("SUM("));
//! ```

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::ast::{Literal, Pipeline};
use crate::config::{OracleConfiguration, TranslationOptions};
use crate::error::{TranslateError, TranslateResult};
use crate::generator::{self, GenerationContext};
use crate::optimizer::{OptimizationChain, PipelineOptimizer};
use crate::parser;
use crate::sql::Dialect;
use crate::validation;

// ============================================================================
// Result Types
// ============================================================================

/// How faithfully the generated SQL reproduces the pipeline's semantics.
///
/// Ordered from best to worst; a result carries the worst capability of
/// any of its warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationCapability {
    /// Exact translation.
    FullSupport,
    /// Same results through an emulation (`$addToSet`, `$graphLookup`, ...).
    Emulated,
    /// Best-effort fragment; results can differ from MongoDB.
    Partial,
}

/// A deviation from exact semantics recorded during generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationWarning {
    /// Stage being compiled when the warning was raised.
    pub stage: Option<String>,
    /// Operator or option that caused it.
    pub feature: String,
    pub message: String,
    pub capability: TranslationCapability,
}

impl std::fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "{} ({}): {}", self.feature, stage, self.message),
            None => write!(f, "{}: {}", self.feature, self.message),
        }
    }
}

/// Output of one translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    /// The generated statement.
    pub sql: String,

    /// Values for `:1`, `:2`, ... in placeholder order. Empty when binds
    /// are inlined.
    pub binds: Vec<Literal>,

    pub warnings: Vec<TranslationWarning>,

    pub capability: TranslationCapability,

    /// The dialect used for generation.
    pub dialect: Dialect,
}

impl TranslationResult {
    pub fn is_exact(&self) -> bool {
        self.capability == TranslationCapability::FullSupport
    }
}

// ============================================================================
// Translation Functions
// ============================================================================

/// Translate a pipeline into a single Oracle statement.
///
/// Fails with `Validation` carrying every name or ordering problem found,
/// or with the first `UnsupportedFeature` the compiler hits. There is no
/// partial output on error.
pub fn translate(
    pipeline: &Pipeline,
    config: &OracleConfiguration,
    options: &TranslationOptions,
) -> TranslateResult<TranslationResult> {
    debug!(
        collection = %config.collection,
        stages = pipeline.len(),
        dialect = ?options.dialect,
        "translate pipeline"
    );

    // Step 1: Validate names and stage order
    config.validate()?;
    let collection = pipeline.source().unwrap_or(config.collection.as_str());
    validation::validate(pipeline, collection).map_err(TranslateError::Validation)?;

    // Step 2: Optimize
    let optimized;
    let pipeline = if options.optimize {
        optimized = OptimizationChain::standard().optimize(pipeline);
        &optimized
    } else {
        pipeline
    };

    // Step 3: Compile to a statement
    let mut ctx = GenerationContext::new(config, options);
    let statement = generator::compile(&mut ctx, pipeline)?;
    let (arena, warnings, capability) = ctx.finish();

    // Step 4: Number binds in textual order and render
    let tokens = statement.to_tokens_for_dialect(options.dialect);
    let (tokens, binds) = tokens.number_binds(&arena);
    let sql = if options.pretty {
        tokens.serialize_pretty(options.dialect)
    } else {
        tokens.serialize(options.dialect)
    };

    debug!(
        binds = binds.len(),
        warnings = warnings.len(),
        capability = ?capability,
        "translated pipeline"
    );

    Ok(TranslationResult {
        sql,
        binds,
        warnings,
        capability,
        dialect: options.dialect,
    })
}

/// Parse a JSON pipeline array and translate it.
pub fn translate_json(
    pipeline: &Value,
    config: &OracleConfiguration,
    options: &TranslationOptions,
) -> TranslateResult<TranslationResult> {
    let pipeline = parser::parse_pipeline(pipeline)?;
    translate(&pipeline, config, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> OracleConfiguration {
        OracleConfiguration::new("orders")
    }

    #[test]
    fn test_capability_order() {
        assert!(TranslationCapability::FullSupport < TranslationCapability::Emulated);
        assert!(TranslationCapability::Emulated < TranslationCapability::Partial);
    }

    #[test]
    fn test_binds_follow_placeholders() {
        let result = translate_json(
            &json!([{"$match": {"status": "active", "qty": {"$gt": 5}}}]),
            &config(),
            &TranslationOptions::default(),
        )
        .unwrap();
        assert!(result.sql.contains(":1"));
        assert!(result.sql.contains(":2"));
        assert_eq!(
            result.binds,
            vec![Literal::String("active".into()), Literal::Int(5)]
        );
        assert!(result.is_exact());
        assert_eq!(result.dialect, Dialect::default());
    }

    #[test]
    fn test_inline_mode_has_no_binds() {
        let options = TranslationOptions::default().with_inline_binds(true);
        let result = translate_json(&json!([{"$match": {"status": "active"}}]), &config(), &options).unwrap();
        assert!(result.binds.is_empty());
        assert!(result.sql.contains("'active'"));
        assert!(!result.sql.contains(":1"));
    }

    #[test]
    fn test_validation_reports_every_issue() {
        let pipeline = json!([
            {"$out": "archive"},
            {"$merge": "totals"},
            {"$limit": 1}
        ]);
        let err = translate_json(&pipeline, &config(), &TranslationOptions::default()).unwrap_err();
        let TranslateError::Validation(issues) = err else {
            panic!("expected validation error");
        };
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.code == validation::STAGE_ORDER));
    }

    #[test]
    fn test_invalid_configuration_fails_before_compiling() {
        let err = translate_json(
            &json!([{"$limit": 1}]),
            &OracleConfiguration::new("bad name"),
            &TranslationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::Validation(_)));
    }

    #[test]
    fn test_optimize_switch() {
        let pipeline = json!([{"$sort": {"score": -1}}, {"$limit": 3}]);
        let fused = translate_json(&pipeline, &config(), &TranslationOptions::default()).unwrap();
        let plain = translate_json(
            &pipeline,
            &config(),
            &TranslationOptions::default().with_optimize(false),
        )
        .unwrap();
        assert_eq!(fused.sql.matches("FETCH").count(), 1);
        assert!(plain.sql.contains("FETCH"));
    }

    #[test]
    fn test_deterministic() {
        let pipeline = json!([
            {"$match": {"a": {"$in": [1, 2, 3]}}},
            {"$group": {"_id": "$k", "n": {"$sum": 1}}},
            {"$sort": {"n": -1}}
        ]);
        let a = translate_json(&pipeline, &config(), &TranslationOptions::default()).unwrap();
        let b = translate_json(&pipeline, &config(), &TranslationOptions::default()).unwrap();
        assert_eq!((a.sql, a.binds), (b.sql, b.binds));
    }

    #[test]
    fn test_warning_display() {
        let warning = TranslationWarning {
            stage: Some("$group".into()),
            feature: "$addToSet".into(),
            message: "scalars only".into(),
            capability: TranslationCapability::Emulated,
        };
        assert_eq!(warning.to_string(), "$addToSet ($group): scalars only");
    }
}
