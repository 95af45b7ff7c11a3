//! Oracle SQL generation from pipeline ASTs.
//!
//! Two layers:
//! 1. Expressions: [`expr`] renders operators into the context's token buffer,
//!    resolving field paths through the current [`scope::Scope`].
//! 2. Stages: the pipeline compiler folds stages into one statement, wrapping
//!    the query under construction whenever a stage needs a fresh scope.

pub mod context;
pub mod expr;
pub mod scope;

mod composite;
mod pipeline;

pub use context::GenerationContext;
pub use pipeline::{compile, BASE_ALIAS};
