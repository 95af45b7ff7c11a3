//! SQL generation module.
//!
//! This module provides the Oracle statement builder the compiler targets:
//!
//! - [`query`] - SELECT / INSERT / MERGE statement builder
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - Oracle release dialects

pub mod dialect;
pub mod query;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use query::{
    Cte, CycleClause, Join, JoinType, LimitOffset, MergeStatement, OrderByItem, Query, SelectItem,
    SetOperation, SortDir, Source, Statement, TableRef,
};
pub use token::{Token, TokenStream};
