//! Pipeline rewrites applied before compilation.
//!
//! Every pass takes a pipeline by reference and returns a new one. Passes
//! are idempotent: running a pass on its own output changes nothing.

mod pushdown;
mod sort_limit;

pub use pushdown::PredicatePushdown;
pub use sort_limit::SortLimitFusion;

use tracing::debug;

use crate::ast::Pipeline;

/// A pipeline-to-pipeline rewrite.
pub trait PipelineOptimizer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn optimize(&self, pipeline: &Pipeline) -> Pipeline;
}

/// Ordered sequence of passes.
#[derive(Default)]
pub struct OptimizationChain {
    passes: Vec<Box<dyn PipelineOptimizer>>,
}

impl OptimizationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate pushdown, then sort/limit fusion.
    pub fn standard() -> Self {
        Self::new()
            .with(PredicatePushdown)
            .with(SortLimitFusion)
    }

    pub fn with(mut self, pass: impl PipelineOptimizer + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl PipelineOptimizer for OptimizationChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn optimize(&self, pipeline: &Pipeline) -> Pipeline {
        let mut current = pipeline.clone();
        for pass in &self.passes {
            let next = pass.optimize(&current);
            if next != current {
                debug!(
                    pass = pass.name(),
                    before = ?current.stage_names(),
                    after = ?next.stage_names(),
                    "optimizer rewrote pipeline"
                );
            }
            current = next;
        }
        current
    }
}

impl std::fmt::Debug for OptimizationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.passes.iter().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ComparisonOp, Expression, FieldPath, Sort, SortKey, SortOrder, Stage};

    fn filter(p: &str) -> Stage {
        Stage::Match(
            Expression::comparison(
                ComparisonOp::Eq,
                Expression::field(p).unwrap(),
                Expression::literal(1),
            )
            .unwrap(),
        )
    }

    fn sort(p: &str) -> Stage {
        Stage::Sort(
            Sort::new(vec![SortKey {
                field: FieldPath::new(p).unwrap(),
                order: SortOrder::Asc,
            }])
            .unwrap(),
        )
    }

    #[test]
    fn test_standard_chain_order() {
        let chain = OptimizationChain::standard();
        assert_eq!(format!("{:?}", chain), "[\"predicate_pushdown\", \"sort_limit_fusion\"]");
    }

    #[test]
    fn test_chain_pushes_then_fuses() {
        let pipeline = Pipeline::new(vec![sort("x"), Stage::Limit(5), filter("a")]);
        let optimized = OptimizationChain::standard().optimize(&pipeline);
        assert_eq!(optimized.stage_names(), vec!["$match", "$sort", "$limit"]);
        let Stage::Sort(s) = &optimized.stages()[1] else {
            panic!("expected $sort");
        };
        assert_eq!(s.limit_hint, Some(5));
    }

    #[test]
    fn test_chain_reaches_fixpoint() {
        let pipeline = Pipeline::new(vec![
            filter("a"),
            sort("x"),
            Stage::Skip(2),
            Stage::Limit(5),
            filter("b"),
        ]);
        let chain = OptimizationChain::standard();
        let once = chain.optimize(&pipeline);
        assert_eq!(chain.optimize(&once), once);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let pipeline = Pipeline::new(vec![Stage::Limit(1), filter("a")]);
        let chain = OptimizationChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.optimize(&pipeline), pipeline);
    }
}
