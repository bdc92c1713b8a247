use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::example::{Example, LoggedOutcome};

#[derive(Debug, Error)]
pub enum LearnerError {
    #[error("learner rejected example group: {0}")]
    Rejected(String),
    #[error("example group is empty")]
    EmptyGroup,
    #[error("weight view holds {actual} weights, learner needs {expected}")]
    WeightView { expected: usize, actual: usize },
}

pub type LearnerResult<T> = std::result::Result<T, LearnerError>;

/// Scalar learner state kept per live slot. It travels with the slot's
/// weights whenever the arena copies or swaps slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotScalars {
    pub normalized_sum: f64,
    pub total_weight: f64,
    pub gravity: f64,
    pub event_sum: u64,
    pub action_sum: u64,
}

/// Disjoint mutable view of one slot of the weight arena.
#[derive(Debug)]
pub struct SlotView<'a> {
    pub slot: usize,
    pub weights: &'a mut [f32],
    pub scalars: &'a mut SlotScalars,
}

/// The contextual-bandit learner the scheduler drives. The scheduler decides
/// which slice of the arena and which interactions the learner sees; the
/// learner owns prediction and the update rule.
pub trait Learner {
    /// Predicts on the group, learns from the logged outcome, and returns the
    /// action the learner would have chosen before the update.
    fn predict_and_learn(
        &mut self,
        group: &mut [Example],
        outcome: &LoggedOutcome,
        view: SlotView<'_>,
    ) -> LearnerResult<u32>;

    fn predict_only(&mut self, group: &[Example], weights: &[f32]) -> LearnerResult<u32>;
}

impl<L: Learner + ?Sized> Learner for Box<L> {
    fn predict_and_learn(
        &mut self,
        group: &mut [Example],
        outcome: &LoggedOutcome,
        view: SlotView<'_>,
    ) -> LearnerResult<u32> {
        (**self).predict_and_learn(group, outcome, view)
    }

    fn predict_only(&mut self, group: &[Example], weights: &[f32]) -> LearnerResult<u32> {
        (**self).predict_only(group, weights)
    }
}
