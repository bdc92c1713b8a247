use serde::{Deserialize, Serialize};

use super::error::{AutomlError, AutomlResult};
use super::manager::{ConfigManager, CHAMPION_SLOT};
use super::metrics::{MetricsSink, NoopMetricsSink};
use crate::config::AutomlConfig;
use crate::example::{Example, LoggedOutcome};
use crate::learner::Learner;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomlState {
    /// Nothing scheduled yet; the first example seeds the candidate queue.
    #[default]
    Collecting,
    Experimenting,
}

impl AutomlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomlState::Collecting => "collecting",
            AutomlState::Experimenting => "experimenting",
        }
    }
}

impl std::fmt::Display for AutomlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Drives the configuration search one example group at a time.
pub struct AutoMl<L: Learner> {
    state: AutomlState,
    manager: ConfigManager,
    learner: L,
    sink: Box<dyn MetricsSink>,
    reverse_learning_order: bool,
}

impl<L: Learner> std::fmt::Debug for AutoMl<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoMl")
            .field("state", &self.state)
            .field("manager", &self.manager)
            .field("learner", &"<Learner>")
            .field("sink", &"<MetricsSink>")
            .field("reverse_learning_order", &self.reverse_learning_order)
            .finish()
    }
}

impl<L: Learner> AutoMl<L> {
    pub fn new(config: &AutomlConfig, learner: L) -> AutomlResult<Self> {
        Ok(Self::from_parts(
            AutomlState::Collecting,
            ConfigManager::new(config)?,
            learner,
        ))
    }

    pub(crate) fn from_parts(state: AutomlState, manager: ConfigManager, learner: L) -> Self {
        let reverse_learning_order = manager.config().reverse_learning_order;
        Self {
            state,
            manager,
            learner,
            sink: Box::new(NoopMetricsSink),
            reverse_learning_order,
        }
    }

    pub fn with_metrics_sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> AutomlState {
        self.state
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut L {
        &mut self.learner
    }

    /// Advances the search by one example group.
    pub fn step(&mut self, group: &mut [Example], outcome: &LoggedOutcome) -> AutomlResult<()> {
        let round = self.manager.count_learn();
        match self.state {
            AutomlState::Collecting => {
                self.manager.observe(group);
                self.manager.propose();
                self.offset_learn(group, outcome)?;
                self.state = AutomlState::Experimenting;
                tracing::debug!(
                    target: "automl.driver",
                    round,
                    queued = self.manager.queue().len(),
                    "collection finished, experimenting"
                );
            }
            AutomlState::Experimenting => {
                self.manager.observe(group);
                self.manager.schedule();
                self.offset_learn(group, outcome)?;
                if let Some(switch) = self.manager.update_champ() {
                    self.sink.record_champion_switch(&switch);
                    self.manager.propose();
                }
            }
        }

        self.sink.record_round(&self.manager.report());
        debug_assert!(
            self.manager.verify_invariants().is_ok(),
            "scheduler invariant broken: {:?}",
            self.manager.verify_invariants()
        );
        Ok(())
    }

    /// One learning call per live slot: challengers first, then the champion,
    /// whose outcome feeds every challenger's horizon-matched estimator.
    pub fn offset_learn(
        &mut self,
        group: &mut [Example],
        outcome: &LoggedOutcome,
    ) -> AutomlResult<()> {
        let w = outcome.importance_weight();
        let r = outcome.reward();
        let live = self.manager.slots().len();

        for position in 1..live {
            let slot = if self.reverse_learning_order {
                live - position
            } else {
                position
            };
            let action = self
                .manager
                .learn_slot(&mut self.learner, group, outcome, slot)?;
            let matched = if action == outcome.action { w } else { 0.0 };
            self.manager.record_challenger_outcome(slot, matched, r);
        }

        let champion_action =
            self.manager
                .learn_slot(&mut self.learner, group, outcome, CHAMPION_SLOT)?;
        self.sink
            .publish_champion_scalars(self.manager.champion_scalars());
        let matched = if champion_action == outcome.action {
            w
        } else {
            0.0
        };
        self.manager.record_champion_outcome(matched, r);
        Ok(())
    }

    /// The champion's action for a group, without learning.
    pub fn predict(&mut self, group: &mut [Example]) -> AutomlResult<u32> {
        self.manager
            .predict_champion(&mut self.learner, group)
            .map_err(AutomlError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automl::metrics::CollectingMetricsSink;
    use crate::example::Feature;
    use crate::learner::{LearnerError, LearnerResult, SlotView};
    use crate::namespace::InteractionList;
    use std::sync::Arc;

    /// Records the interactions it was handed and always picks action 0.
    #[derive(Default)]
    struct RecordingLearner {
        seen: Vec<(usize, usize)>,
        fail_on_slot: Option<usize>,
    }

    impl Learner for RecordingLearner {
        fn predict_and_learn(
            &mut self,
            group: &mut [Example],
            _outcome: &LoggedOutcome,
            mut view: SlotView<'_>,
        ) -> LearnerResult<u32> {
            if self.fail_on_slot == Some(view.slot) {
                return Err(LearnerError::Rejected("boom".into()));
            }
            self.seen.push((view.slot, group[0].interactions.len()));
            view.scalars.event_sum += 1;
            Ok(0)
        }

        fn predict_only(&mut self, _group: &[Example], _weights: &[f32]) -> LearnerResult<u32> {
            Ok(0)
        }
    }

    fn group() -> Vec<Example> {
        let mut ex = Example::with_interactions(vec![vec![b'z', b'z']]);
        ex.push_feature(b'a', Feature::new(1, 1.0));
        ex.push_feature(b'b', Feature::new(2, 1.0));
        vec![ex]
    }

    fn config() -> AutomlConfig {
        AutomlConfig {
            max_live_configs: 3,
            priority_challengers: Some(1),
            weights_per_slot: 4,
            ..AutomlConfig::default()
        }
    }

    #[test]
    fn first_step_collects_then_experiments() {
        let mut automl = AutoMl::new(&config(), RecordingLearner::default()).expect("valid");
        let outcome = LoggedOutcome::new(0, 0.5, -1.0);
        let mut examples = group();

        automl.step(&mut examples, &outcome).expect("step");
        assert_eq!(automl.state(), AutomlState::Experimenting);
        assert_eq!(automl.manager().slots().len(), 1);
        assert_eq!(automl.manager().queue().len(), 3);
        assert_eq!(automl.learner().seen, vec![(0, 3)]);

        automl.step(&mut examples, &outcome).expect("step");
        assert_eq!(automl.manager().slots().len(), 3);
        let order: Vec<usize> = automl.learner().seen[1..].iter().map(|(slot, _)| *slot).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(automl.manager().total_learn_count(), 2);
        assert!(examples
            .iter()
            .all(|ex| *ex.interactions == vec![vec![b'z', b'z']]));
    }

    #[test]
    fn reverse_order_learns_last_slot_first() {
        let config = AutomlConfig {
            reverse_learning_order: true,
            ..config()
        };
        let mut automl = AutoMl::new(&config, RecordingLearner::default()).expect("valid");
        let outcome = LoggedOutcome::new(0, 0.5, -1.0);
        let mut examples = group();
        automl.step(&mut examples, &outcome).expect("step");
        automl.step(&mut examples, &outcome).expect("step");
        let order: Vec<usize> = automl.learner().seen[1..].iter().map(|(slot, _)| *slot).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn learner_failure_restores_interactions() {
        let mut automl = AutoMl::new(&config(), RecordingLearner::default()).expect("valid");
        let outcome = LoggedOutcome::new(0, 0.5, -1.0);
        let mut examples = group();
        automl.step(&mut examples, &outcome).expect("step");
        automl.learner_mut().fail_on_slot = Some(2);
        assert!(automl.step(&mut examples, &outcome).is_err());
        let incoming: Arc<InteractionList> = Arc::new(vec![vec![b'z', b'z']]);
        assert!(examples.iter().all(|ex| ex.interactions == incoming));
    }

    #[test]
    fn matching_actions_feed_estimators() {
        let sink = CollectingMetricsSink::new();
        let mut automl = AutoMl::new(&config(), RecordingLearner::default())
            .expect("valid")
            .with_metrics_sink(Box::new(sink.clone()));
        let mut examples = group();
        automl
            .step(&mut examples, &LoggedOutcome::new(0, 0.5, -1.0))
            .expect("step");
        automl
            .step(&mut examples, &LoggedOutcome::new(0, 0.5, -1.0))
            .expect("step");

        let slots = automl.manager().slots();
        assert_eq!(slots[1].challenger.update_count(), 1);
        assert_eq!(slots[1].challenger.ips(), 2.0);
        assert_eq!(slots[1].champion.ips(), 2.0);

        let log = sink.snapshot();
        assert_eq!(log.rounds.len(), 2);
        assert_eq!(log.champion_scalars.len(), 2);
        assert_eq!(log.champion_scalars[1].event_sum, 2);
        assert_eq!(automl.predict(&mut examples).expect("predict"), 0);
    }
}
