pub mod arena;
pub mod automl;
pub mod config;
pub mod error;
pub mod example;
pub mod learner;
pub mod namespace;

pub use arena::WeightArena;
pub use automl::{
    AutoMl, AutomlError, AutomlResult, AutomlSnapshot, AutomlState, ChampionSwitch,
    CollectingMetricsSink, ConfigCatalog, ConfigId, ConfigManager, ConfigState, Estimator,
    ExclusionConfig, InvariantViolation, LiveSlot, MetricsSink, NoopMetricsSink, OracleKind,
    PersistError, PriorityKind, RoundReport, SlotReport, TracingMetricsSink,
};
pub use config::{load_chacha_config, AutomlConfig, ChachaConfig, LoggingSection};
pub use error::{ConfigError, Result};
pub use example::{Example, Feature, InteractionOverride, LoggedOutcome};
pub use learner::{Learner, LearnerError, LearnerResult, SlotScalars, SlotView};
pub use namespace::{
    ExclusionSet, Interaction, InteractionKind, InteractionList, NamespaceCounter,
    NamespaceIndex,
};
