use std::collections::HashMap;

use chacha_core::automl::ConfigState;
use chacha_core::{
    AutoMl, AutomlConfig, ConfigId, Example, Feature, InteractionKind, Learner, LearnerResult,
    LoggedOutcome, OracleKind, PriorityKind, SlotView,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

const NAMESPACES: &[u8] = b"abcde";

/// Deterministic stand-in for a real learner: the chosen action depends on
/// the interactions in effect and the features of the group.
struct HashingLearner {
    actions: u32,
}

impl HashingLearner {
    fn choose(&self, group: &[Example]) -> u32 {
        let mut score: u64 = 0;
        for example in group {
            for interaction in example.interactions.iter() {
                for ns in interaction {
                    score = score.wrapping_mul(31).wrapping_add(u64::from(*ns));
                }
            }
            for ns in example.namespace_indices() {
                for feature in example.features(ns) {
                    score = score.wrapping_add(feature.index);
                }
            }
        }
        (score % u64::from(self.actions)) as u32
    }
}

impl Learner for HashingLearner {
    fn predict_and_learn(
        &mut self,
        group: &mut [Example],
        outcome: &LoggedOutcome,
        mut view: SlotView<'_>,
    ) -> LearnerResult<u32> {
        let action = self.choose(group);
        let len = view.weights.len();
        view.weights[outcome.action as usize % len] -= outcome.cost;
        view.scalars.event_sum += 1;
        view.scalars.action_sum += u64::from(action);
        Ok(action)
    }

    fn predict_only(&mut self, group: &[Example], _weights: &[f32]) -> LearnerResult<u32> {
        Ok(self.choose(group))
    }
}

fn random_group(rng: &mut ChaCha20Rng, round: u64) -> Vec<Example> {
    // Later namespaces show up only after a while so interactions get
    // regenerated mid-stream.
    let visible = (2 + round / 150).min(NAMESPACES.len() as u64) as usize;
    let size = rng.gen_range(1..=3);
    (0..size)
        .map(|_| {
            let mut ex = Example::new();
            for ns in &NAMESPACES[..visible] {
                if rng.gen_bool(0.7) {
                    ex.push_feature(*ns, Feature::new(rng.gen_range(0..16), 1.0));
                }
            }
            ex
        })
        .collect()
}

fn run_stream(config: AutomlConfig, seed: u64, rounds: u64) -> u64 {
    let mut automl = AutoMl::new(&config, HashingLearner { actions: 3 }).expect("valid config");
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut leases: HashMap<ConfigId, u64> = HashMap::new();

    for round in 1..=rounds {
        let mut group = random_group(&mut rng, round);
        let outcome = LoggedOutcome::new(
            rng.gen_range(0..3),
            rng.gen_range(0.2..1.0),
            -rng.gen_range(0.0..1.0),
        );
        automl.step(&mut group, &outcome).expect("step");

        let manager = automl.manager();
        manager
            .verify_invariants()
            .unwrap_or_else(|violation| panic!("round {round}: {violation}"));
        let slots = manager.slots();
        assert!(!slots.is_empty() && slots.len() <= config.max_live_configs);
        assert_eq!(manager.catalog().get(slots[0].config_index).state, ConfigState::Live);
        assert!(group.iter().all(|ex| ex.interactions.is_empty()));

        for config in manager.catalog().valid() {
            let previous = leases.entry(config.id).or_insert(config.lease);
            assert!(
                config.lease >= *previous,
                "lease of config {} shrank at round {round}",
                config.id
            );
            *previous = config.lease;
        }
    }
    automl.manager().total_champ_switches()
}

#[test]
fn add_one_stream_keeps_invariants() {
    let config = AutomlConfig {
        global_lease: 5,
        max_live_configs: 4,
        weights_per_slot: 16,
        ..AutomlConfig::default()
    };
    run_stream(config, 7, 1500);
}

#[test]
fn every_oracle_keeps_invariants() {
    for (oracle, lb_trick) in [
        (OracleKind::OneDiff, false),
        (OracleKind::Rand, true),
        (OracleKind::ChampDupe, false),
        (OracleKind::AddOne, true),
    ] {
        let config = AutomlConfig {
            global_lease: 4,
            max_live_configs: 5,
            oracle,
            lb_trick,
            priority: PriorityKind::LeastExclusion,
            catalog_cap: Some(12),
            estimator_decay: 0.98,
            seed: 11,
            weights_per_slot: 8,
            ..AutomlConfig::default()
        };
        run_stream(config, 3, 800);
    }
}

#[test]
fn cubic_interactions_with_single_live_slot() {
    let config = AutomlConfig {
        max_live_configs: 1,
        interactions: InteractionKind::Cubic,
        weights_per_slot: 8,
        ..AutomlConfig::default()
    };
    assert_eq!(run_stream(config, 5, 200), 0);
}
