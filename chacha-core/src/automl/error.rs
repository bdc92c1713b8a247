use thiserror::Error;

use super::catalog::ConfigState;
use super::persistence::PersistError;
use crate::error::ConfigError;
use crate::learner::LearnerError;

#[derive(Debug, Error)]
pub enum AutomlError {
    #[error(transparent)]
    Learner(#[from] LearnerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub type AutomlResult<T> = std::result::Result<T, AutomlError>;

/// Scheduler state that correct operation never produces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("no live slot is occupied")]
    NoChampion,
    #[error("{occupied} live slots exceed max_live_configs={max}")]
    TooManySlots { occupied: usize, max: usize },
    #[error("champion slot runs catalog index {index}, expected 0")]
    ChampionMisplaced { index: usize },
    #[error("champion slot is marked eligible to inactivate")]
    ChampionEligible,
    #[error("champion config is {state}, expected live")]
    ChampionNotLive { state: ConfigState },
    #[error("slot {slot} points at catalog index {index} past valid size {valid}")]
    SlotOutOfRange { slot: usize, index: usize, valid: usize },
    #[error("catalog index {index} is bound to slots {first} and {second}")]
    SharedConfig {
        index: usize,
        first: usize,
        second: usize,
    },
    #[error("slot {slot} runs config {index} in state {state}")]
    SlotNotRunning {
        slot: usize,
        index: usize,
        state: ConfigState,
    },
    #[error("catalog index {index} is live but bound to no slot")]
    OrphanLive { index: usize },
    #[error("catalog valid size {valid} is outside 1..={len}")]
    CatalogSize { valid: usize, len: usize },
    #[error("queued catalog index {index} is past valid size {valid}")]
    QueueOutOfRange { index: usize, valid: usize },
    #[error("weight arena holds {slots} slots of {slot_len}, expected {expected}")]
    ArenaShape {
        slots: usize,
        slot_len: usize,
        expected: usize,
    },
    #[error("invalid settings: {reason}")]
    Settings { reason: String },
}
