use serde::{Deserialize, Serialize};

use super::catalog::ExclusionConfig;
use crate::namespace::NamespaceCounter;

/// Scores a candidate for the priority queue. Higher runs sooner.
pub trait PriorityStrategy {
    fn score(&self, config: &ExclusionConfig, counter: &NamespaceCounter) -> f32;
}

/// Every candidate is equal; the queue falls back to candidate age.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriority;

impl PriorityStrategy for NoPriority {
    fn score(&self, _config: &ExclusionConfig, _counter: &NamespaceCounter) -> f32 {
        0.0
    }
}

/// Prefers candidates that exclude rarely seen namespace combinations.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastExclusion;

impl PriorityStrategy for LeastExclusion {
    fn score(&self, config: &ExclusionConfig, counter: &NamespaceCounter) -> f32 {
        config
            .exclusions
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|ns| counter.count(*ns) as f32)
                    .product::<f32>()
            })
            .fold(0.0, |priority, weight| priority - weight)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityKind {
    #[default]
    None,
    LeastExclusion,
}

impl PriorityKind {
    pub fn strategy(&self) -> Box<dyn PriorityStrategy> {
        match self {
            PriorityKind::None => Box::new(NoPriority),
            PriorityKind::LeastExclusion => Box::new(LeastExclusion),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityKind::None => "none",
            PriorityKind::LeastExclusion => "least_exclusion",
        }
    }
}

impl std::fmt::Display for PriorityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
