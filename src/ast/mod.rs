//! Aggregation pipeline AST.
//!
//! ```text
//! Pipeline
//!   └── Stage ($match, $group, $lookup, ...)
//!         └── Expression (field paths, literals, operator applications)
//! ```
//!
//! Nodes are immutable once built. Operator strings resolve through the
//! exact-match tables in [`ops`].

pub mod expr;
pub mod literal;
pub mod ops;
pub mod pipeline;
pub mod stage;
pub mod window;

pub use expr::{ArrayExpr, Conditional, Expression, TypeConversion};
pub use literal::{json_path_of, FieldPath, JsonReturnType, Literal};
pub use ops::{
    AccumulatorOp, ArithmeticOp, ArrayOp, ComparisonOp, DateOp, LogicalOp, ObjectOp, StringOp,
    TypeConversionOp, WindowOp,
};
pub use pipeline::Pipeline;
pub use stage::{
    Bucket, BucketAuto, GraphLookup, Group, Lookup, LookupKind, Merge, Out, ProjectField,
    Projection, ProjectionMode, SetWindowFields, Sort, SortKey, SortOrder, Stage, UnionWith,
    Unwind, WhenMatched, WhenNotMatched,
};
pub use window::{Shift, WindowFrame, WindowFrameBound, WindowFrameKind, WindowOutput};
