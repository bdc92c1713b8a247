use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::automl::{OracleKind, PriorityKind};
use crate::error::{ConfigError, Result};
use crate::namespace::InteractionKind;

/// Reductions that cannot share a learner stack with the automl scheduler.
pub const INCOMPATIBLE_REDUCTIONS: &[&str] = &[
    "ccb_explore_adf",
    "audit_regressor",
    "baseline",
    "cb_explore_adf_rnd",
    "cb_to_cb_adf",
    "cbify",
    "replay_c",
    "replay_b",
    "replay_m",
    "memory_tree",
    "new_mf",
    "nn",
    "stage_poly",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ChachaConfig {
    pub automl: AutomlConfig,
    pub logging: LoggingSection,
}

impl ChachaConfig {
    pub fn validate(&self) -> Result<()> {
        self.automl.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Tunables of the online configuration search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AutomlConfig {
    /// Rounds a fresh candidate may run before its first re-evaluation.
    pub global_lease: u64,
    /// Number of live slots, champion included.
    pub max_live_configs: usize,
    /// Slots `1..=priority_challengers` are reserved for sustained exploration.
    /// Defaults to `(max_live_configs - 1) / 2`.
    pub priority_challengers: Option<usize>,
    pub significance_level: f64,
    pub estimator_decay: f64,
    pub lb_trick: bool,
    pub interactions: InteractionKind,
    pub oracle: OracleKind,
    pub priority: PriorityKind,
    /// Upper bound on catalog entries eligible to run at once.
    pub catalog_cap: Option<usize>,
    pub weights_per_slot: usize,
    pub seed: u64,
    pub reverse_learning_order: bool,
    pub enabled_reductions: Vec<String>,
}

impl Default for AutomlConfig {
    fn default() -> Self {
        Self {
            global_lease: 10,
            max_live_configs: 4,
            priority_challengers: None,
            significance_level: 0.05,
            estimator_decay: 1.0,
            lb_trick: false,
            interactions: InteractionKind::Quadratic,
            oracle: OracleKind::AddOne,
            priority: PriorityKind::None,
            catalog_cap: None,
            weights_per_slot: 4096,
            seed: 0,
            reverse_learning_order: false,
            enabled_reductions: Vec::new(),
        }
    }
}

impl AutomlConfig {
    pub fn resolved_priority_challengers(&self) -> usize {
        self.priority_challengers
            .unwrap_or_else(|| self.max_live_configs.saturating_sub(1) / 2)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(reduction) = self
            .enabled_reductions
            .iter()
            .find(|name| INCOMPATIBLE_REDUCTIONS.contains(&name.as_str()))
        {
            return Err(ConfigError::Incompatible {
                reduction: reduction.clone(),
            });
        }
        if self.max_live_configs == 0 {
            return Err(invalid("max_live_configs", "must be at least 1"));
        }
        let priority = self.resolved_priority_challengers();
        if priority >= self.max_live_configs {
            return Err(invalid(
                "priority_challengers",
                format!(
                    "{priority} leaves no room below max_live_configs={}",
                    self.max_live_configs
                ),
            ));
        }
        if self.global_lease == 0 {
            return Err(invalid("global_lease", "must be at least 1"));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(invalid(
                "significance_level",
                format!("{} is outside (0, 1)", self.significance_level),
            ));
        }
        if !(self.estimator_decay > 0.0 && self.estimator_decay <= 1.0) {
            return Err(invalid(
                "estimator_decay",
                format!("{} is outside (0, 1]", self.estimator_decay),
            ));
        }
        if self.weights_per_slot == 0 {
            return Err(invalid("weights_per_slot", "must be at least 1"));
        }
        if let Some(cap) = self.catalog_cap {
            if cap < 2 {
                return Err(invalid(
                    "catalog_cap",
                    format!("{cap} cannot hold a champion and its predecessor"),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Loads and validates a configuration file.
pub fn load_chacha_config<P: AsRef<Path>>(path: P) -> Result<ChachaConfig> {
    let config: ChachaConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AutomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolved_priority_challengers(), 1);
    }

    #[test]
    fn parses_partial_toml() {
        let config: ChachaConfig = toml::from_str(
            r#"
            [automl]
            max_live_configs = 6
            lb_trick = true
            interactions = "cubic"
            oracle = "one_diff"
            priority = "least_exclusion"

            [logging]
            filter = "automl=debug"
            "#,
        )
        .expect("config should parse");
        assert_eq!(config.automl.max_live_configs, 6);
        assert_eq!(config.automl.resolved_priority_challengers(), 2);
        assert_eq!(config.automl.interactions, InteractionKind::Cubic);
        assert_eq!(config.automl.oracle, OracleKind::OneDiff);
        assert_eq!(config.automl.priority, PriorityKind::LeastExclusion);
        assert_eq!(config.automl.global_lease, 10);
        assert_eq!(config.logging.filter, "automl=debug");
    }

    #[test]
    fn rejects_incompatible_reduction() {
        let config = AutomlConfig {
            enabled_reductions: vec!["cb_adf".into(), "cbify".into()],
            ..AutomlConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Incompatible { reduction }) => assert_eq!(reduction, "cbify"),
            other => panic!("expected incompatible reduction, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            AutomlConfig {
                max_live_configs: 0,
                ..AutomlConfig::default()
            },
            AutomlConfig {
                priority_challengers: Some(4),
                ..AutomlConfig::default()
            },
            AutomlConfig {
                global_lease: 0,
                ..AutomlConfig::default()
            },
            AutomlConfig {
                significance_level: 1.0,
                ..AutomlConfig::default()
            },
            AutomlConfig {
                estimator_decay: 0.0,
                ..AutomlConfig::default()
            },
            AutomlConfig {
                catalog_cap: Some(1),
                ..AutomlConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "{config:?} should be rejected"
            );
        }
    }
}
