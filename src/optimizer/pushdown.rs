//! Predicate pushdown: filter as early as the pipeline allows.
//!
//! Runs of `$match` are merged into one conjunction, then each `$match`
//! moves one position earlier at a time until nothing moves. A `$match`
//! may pass `$sort`, `$limit` and `$skip`, and a `$project` that keeps
//! every field the filter reads under the same name. It never passes
//! `$group`, `$lookup` or another `$match`.
//!
//! Passing `$limit` / `$skip` filters before the row window is taken,
//! which can select different rows than the original order would.

use tracing::debug;

use super::PipelineOptimizer;
use crate::ast::{Expression, LogicalOp, Pipeline, Stage};

#[derive(Debug, Clone, Copy, Default)]
pub struct PredicatePushdown;

impl PipelineOptimizer for PredicatePushdown {
    fn name(&self) -> &'static str {
        "predicate_pushdown"
    }

    fn optimize(&self, pipeline: &Pipeline) -> Pipeline {
        let mut stages = merge_matches(pipeline.stages().to_vec());
        while let Some(i) = next_move(&stages) {
            debug!(
                from = i,
                past = stages[i - 1].name(),
                "push $match earlier"
            );
            stages.swap(i - 1, i);
            stages = merge_matches(stages);
        }
        pipeline.with_stages(stages)
    }
}

/// Combine adjacent `$match` stages, keeping filter order.
fn merge_matches(stages: Vec<Stage>) -> Vec<Stage> {
    let mut out: Vec<Stage> = Vec::with_capacity(stages.len());
    for stage in stages {
        match stage {
            Stage::Match(next) if matches!(out.last(), Some(Stage::Match(_))) => {
                if let Some(Stage::Match(prev)) = out.pop() {
                    out.push(Stage::Match(conjunction(prev, next)));
                }
            }
            stage => out.push(stage),
        }
    }
    out
}

fn conjunction(left: Expression, right: Expression) -> Expression {
    let mut operands = match left {
        Expression::Logical {
            op: LogicalOp::And,
            operands,
        } => operands,
        other => vec![other],
    };
    operands.push(right);
    Expression::Logical {
        op: LogicalOp::And,
        operands,
    }
}

/// Index of the first `$match` that can move one position earlier.
fn next_move(stages: &[Stage]) -> Option<usize> {
    (1..stages.len()).find(|&i| match &stages[i] {
        Stage::Match(filter) => can_pass(filter, &stages[i - 1]),
        _ => false,
    })
}

fn can_pass(filter: &Expression, stage: &Stage) -> bool {
    match stage {
        Stage::Sort(_) | Stage::Limit(_) | Stage::Skip(_) => true,
        Stage::Project(projection) => filter
            .referenced_fields()
            .iter()
            .all(|path| path != "$$ROOT" && projection.preserves(path)),
        _ => false,
    }
}
