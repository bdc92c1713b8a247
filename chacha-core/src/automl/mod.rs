//! Online configuration search over feature-interaction exclusions.
//!
//! Candidates come from the oracle, wait in the priority queue, run in a
//! bounded set of live slots that share one weight arena, and replace the
//! champion in slot 0 once their confidence bounds clear it.

pub mod catalog;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod manager;
pub mod metrics;
pub mod oracle;
pub mod persistence;
pub mod priority;

pub use catalog::{
    ConfigCatalog, ConfigId, ConfigState, ExclusionConfig, PriorityQueue, QueueEntry,
};
pub use driver::{AutoMl, AutomlState};
pub use error::{AutomlError, AutomlResult, InvariantViolation};
pub use estimator::{better, worse, Estimator, EstimatorParams, LiveSlot};
pub use manager::{ConfigManager, ManagerRecord, CHAMPION_SLOT};
pub use metrics::{
    ChampionSwitch, CollectingMetricsSink, MetricsLog, MetricsSink, NoopMetricsSink,
    RoundReport, SlotReport, TracingMetricsSink,
};
pub use oracle::{ConfigOracle, OracleKind, CONFIGS_PER_CHAMP_CHANGE};
pub use persistence::{AutomlSnapshot, PersistError, PersistResult, SnapshotBody, SNAPSHOT_VERSION};
pub use priority::{LeastExclusion, NoPriority, PriorityKind, PriorityStrategy};
