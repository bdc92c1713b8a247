use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::catalog::{ConfigId, ConfigState};
use crate::learner::SlotScalars;

/// One live slot as seen at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotReport {
    pub slot: usize,
    pub config_id: ConfigId,
    pub config_index: usize,
    pub state: ConfigState,
    pub lease: u64,
    pub update_count: u64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Champion bounds over the rounds this slot took part in. Unbounded for
    /// the champion slot itself.
    pub champion_lower_bound: f64,
    pub champion_upper_bound: f64,
    pub eligible_to_inactivate: bool,
}

/// Scheduler state published after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: u64,
    pub champion_config_id: ConfigId,
    pub total_champ_switches: u64,
    pub valid_configs: usize,
    pub queued: usize,
    pub slots: Vec<SlotReport>,
}

/// A promotion performed by the champion arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampionSwitch {
    pub round: u64,
    pub from_slot: usize,
    pub previous_champion: ConfigId,
    pub new_champion: ConfigId,
    pub total_champ_switches: u64,
}

/// Receives scheduler statistics at fixed points of a step.
pub trait MetricsSink: Send + Sync {
    fn record_round(&self, report: &RoundReport);

    fn record_champion_switch(&self, _switch: &ChampionSwitch) {}

    /// Learner scalars of the champion slot, published after it learns.
    fn publish_champion_scalars(&self, _scalars: &SlotScalars) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_round(&self, _report: &RoundReport) {}
}

/// Emits every round as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record_round(&self, report: &RoundReport) {
        tracing::debug!(
            target: "automl.metrics",
            round = report.round,
            champion = report.champion_config_id,
            switches = report.total_champ_switches,
            live_slots = report.slots.len(),
            valid_configs = report.valid_configs,
            queued = report.queued,
            "round complete"
        );
        for slot in &report.slots {
            tracing::trace!(
                target: "automl.metrics",
                round = report.round,
                slot = slot.slot,
                config = slot.config_id,
                state = %slot.state,
                lease = slot.lease,
                updates = slot.update_count,
                lower = slot.lower_bound,
                upper = slot.upper_bound,
                champion_lower = slot.champion_lower_bound,
                champion_upper = slot.champion_upper_bound,
                "slot bounds"
            );
        }
    }

    fn record_champion_switch(&self, switch: &ChampionSwitch) {
        tracing::info!(
            target: "automl.metrics",
            round = switch.round,
            previous = switch.previous_champion,
            champion = switch.new_champion,
            switches = switch.total_champ_switches,
            "champion switch recorded"
        );
    }
}

/// Everything a [`CollectingMetricsSink`] has seen.
#[derive(Debug, Clone, Default)]
pub struct MetricsLog {
    pub rounds: Vec<RoundReport>,
    pub switches: Vec<ChampionSwitch>,
    pub champion_scalars: Vec<SlotScalars>,
}

/// Keeps every record in memory; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct CollectingMetricsSink {
    log: Arc<Mutex<MetricsLog>>,
}

impl CollectingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsLog {
        self.log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for CollectingMetricsSink {
    fn record_round(&self, report: &RoundReport) {
        if let Ok(mut log) = self.log.lock() {
            log.rounds.push(report.clone());
        }
    }

    fn record_champion_switch(&self, switch: &ChampionSwitch) {
        if let Ok(mut log) = self.log.lock() {
            log.switches.push(*switch);
        }
    }

    fn publish_champion_scalars(&self, scalars: &SlotScalars) {
        if let Ok(mut log) = self.log.lock() {
            log.champion_scalars.push(*scalars);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_shares_its_log() {
        let sink = CollectingMetricsSink::new();
        let boxed: Box<dyn MetricsSink> = Box::new(sink.clone());
        boxed.record_round(&RoundReport {
            round: 1,
            champion_config_id: 0,
            total_champ_switches: 0,
            valid_configs: 1,
            queued: 0,
            slots: Vec::new(),
        });
        boxed.publish_champion_scalars(&SlotScalars::default());
        let log = sink.snapshot();
        assert_eq!(log.rounds.len(), 1);
        assert_eq!(log.champion_scalars.len(), 1);
        assert!(log.switches.is_empty());
    }
}
