//! Pipeline: an ordered, immutable list of stages plus an optional source.

use super::stage::Stage;

/// An aggregation pipeline.
///
/// Optimizer passes never mutate a pipeline; they build a new one with
/// [`Pipeline::with_stages`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    source: Option<String>,
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            source: None,
            stages,
        }
    }

    /// Set the source collection name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// A pipeline with the same source and a different stage list.
    pub fn with_stages(&self, stages: Vec<Stage>) -> Self {
        Self {
            source: self.source.clone(),
            stages,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in order, e.g. `["$match", "$group"]`.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }
}
