//! # aggsql
//!
//! Compiles MongoDB aggregation pipelines into Oracle SQL/JSON statements.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Aggregation pipeline (JSON)                   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [parser]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     AST                                  │
//! │  (Pipeline → Stage → Expression)                         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation] + [optimizer]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Validated, rewritten pipeline                        │
//! │     (predicate pushdown, sort/limit fusion)              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [generator]
//! ┌─────────────────────────────────────────────────────────┐
//! │   One Oracle statement (SELECT / INSERT / MERGE)         │
//! │   + ordered bind values                                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Documents live in a JSON column (`data` by default) of a table named
//! after the collection. Field paths become `JSON_VALUE` / `JSON_QUERY`
//! calls or dot notation, depending on the [`Dialect`].
//!
//! Translation is pure: the same pipeline, configuration and options
//! always produce byte-identical SQL and binds. Executing the statement is
//! left to the caller.

pub mod ast;
pub mod config;
pub mod error;
pub mod generator;
pub mod optimizer;
pub mod parser;
pub mod sql;
pub mod translate;
pub mod validation;

// Re-export SQL submodules at crate level
pub use sql::dialect;
pub use sql::query;
pub use sql::token;

pub use ast::{Expression, Literal, Pipeline, Stage};
pub use config::{OracleConfiguration, Settings, TranslationOptions};
pub use error::{TranslateError, TranslateResult, ValidationIssue};
pub use parser::{parse_expression, parse_filter, parse_pipeline, parse_stage};
pub use sql::{Dialect, SqlDialect};
pub use translate::{
    translate, translate_json, TranslationCapability, TranslationResult, TranslationWarning,
};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::ast::{
        AccumulatorOp, ArithmeticOp, ArrayOp, ComparisonOp, DateOp, Expression, FieldPath,
        Literal, LogicalOp, Pipeline, SortOrder, Stage, StringOp,
    };
    pub use crate::config::{OracleConfiguration, TranslationOptions};
    pub use crate::dialect::{Dialect, SqlDialect};
    pub use crate::error::{TranslateError, TranslateResult};
    pub use crate::optimizer::{OptimizationChain, PipelineOptimizer};
    pub use crate::translate::{translate, translate_json, TranslationResult};
}
