//! Sort/limit fusion.
//!
//! - `$sort, $limit n` attaches `n` as the sort's Top-N hint; the `$limit`
//!   stays in place
//! - `$sort, $skip s, $limit n` attaches `s + n`
//! - consecutive `$limit` stages keep the smallest, consecutive `$skip`
//!   stages add up
//! - a `$sort` directly followed by another `$sort` is dropped

use tracing::debug;

use super::PipelineOptimizer;
use crate::ast::{Pipeline, Stage};

#[derive(Debug, Clone, Copy, Default)]
pub struct SortLimitFusion;

impl PipelineOptimizer for SortLimitFusion {
    fn name(&self) -> &'static str {
        "sort_limit_fusion"
    }

    fn optimize(&self, pipeline: &Pipeline) -> Pipeline {
        let mut stages = collapse(pipeline.stages().to_vec());
        for i in 0..stages.len() {
            let hint = match (stages.get(i + 1), stages.get(i + 2)) {
                (Some(Stage::Limit(n)), _) => Some(*n),
                (Some(Stage::Skip(s)), Some(Stage::Limit(n))) => Some(s.saturating_add(*n)),
                _ => None,
            };
            if let (Stage::Sort(sort), Some(n)) = (&mut stages[i], hint) {
                if sort.limit_hint != Some(n) {
                    debug!(limit = n, "fuse $sort with $limit");
                    sort.limit_hint = Some(n);
                }
            }
        }
        pipeline.with_stages(stages)
    }
}

fn collapse(stages: Vec<Stage>) -> Vec<Stage> {
    let mut out: Vec<Stage> = Vec::with_capacity(stages.len());
    for stage in stages {
        let merged = match (out.last(), &stage) {
            (Some(Stage::Limit(prev)), Stage::Limit(n)) => Some(Stage::Limit((*prev).min(*n))),
            (Some(Stage::Skip(prev)), Stage::Skip(n)) => Some(Stage::Skip(prev.saturating_add(*n))),
            // The later sort decides the order on its own.
            (Some(Stage::Sort(_)), Stage::Sort(_)) => Some(stage.clone()),
            _ => None,
        };
        match merged {
            Some(merged) => {
                debug!(stage = merged.name(), "collapse consecutive stages");
                if let Some(last) = out.last_mut() {
                    *last = merged;
                }
            }
            None => out.push(stage),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FieldPath, Sort, SortKey, SortOrder};

    fn sort(p: &str) -> Sort {
        Sort::new(vec![SortKey {
            field: FieldPath::new(p).unwrap(),
            order: SortOrder::Asc,
        }])
        .unwrap()
    }

    fn optimize(stages: Vec<Stage>) -> Vec<Stage> {
        SortLimitFusion
            .optimize(&Pipeline::new(stages))
            .stages()
            .to_vec()
    }

    #[test]
    fn test_sort_limit_gets_hint_and_keeps_limit() {
        let out = optimize(vec![Stage::Sort(sort("x")), Stage::Limit(5)]);
        assert_eq!(
            out,
            vec![Stage::Sort(sort("x").with_limit_hint(5)), Stage::Limit(5)]
        );
    }

    #[test]
    fn test_skip_between_sort_and_limit() {
        let out = optimize(vec![Stage::Sort(sort("x")), Stage::Skip(10), Stage::Limit(5)]);
        assert_eq!(out[0], Stage::Sort(sort("x").with_limit_hint(15)));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_collapses_limits_and_skips() {
        let out = optimize(vec![
            Stage::Skip(2),
            Stage::Skip(3),
            Stage::Limit(10),
            Stage::Limit(4),
        ]);
        assert_eq!(out, vec![Stage::Skip(5), Stage::Limit(4)]);
    }

    #[test]
    fn test_superseded_sort_is_dropped() {
        let out = optimize(vec![Stage::Sort(sort("x")), Stage::Sort(sort("y"))]);
        assert_eq!(out, vec![Stage::Sort(sort("y"))]);
    }

    #[test]
    fn test_idempotent() {
        let pipeline = Pipeline::new(vec![
            Stage::Sort(sort("x")),
            Stage::Limit(8),
            Stage::Limit(3),
        ]);
        let once = SortLimitFusion.optimize(&pipeline);
        assert_eq!(once.stages()[0], Stage::Sort(sort("x").with_limit_hint(3)));
        assert_eq!(SortLimitFusion.optimize(&once), once);
    }

    #[test]
    fn test_source_is_kept() {
        let pipeline = Pipeline::new(vec![Stage::Limit(1)]).with_source("orders");
        assert_eq!(SortLimitFusion.optimize(&pipeline).source(), Some("orders"));
    }
}
