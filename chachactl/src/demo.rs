//! Synthetic contextual-bandit stream and a hashed linear learner used by
//! `chachactl simulate`.

use chacha_core::{
    Example, Feature, Learner, LearnerError, LearnerResult, LoggedOutcome, SlotView,
};
use rand::Rng;
use rand_chacha::ChaCha20Rng;

const USER_NS: u8 = b'u';
const ITEM_NS: u8 = b'i';
const NOISE_NS: u8 = b'n';
const CROSS_SEED: u64 = 0x9e37_79b9;

/// Per-action linear scores over hashed features, crosses included for every
/// interaction the slot currently runs with.
#[derive(Debug, Clone)]
pub struct LinearDemoLearner {
    actions: u32,
    learning_rate: f32,
}

impl LinearDemoLearner {
    pub fn new(actions: u32) -> Self {
        Self {
            actions: actions.max(1),
            learning_rate: 0.1,
        }
    }

    fn hashed_features(example: &Example) -> Vec<(u64, f32)> {
        let mut features = Vec::new();
        for ns in example.namespace_indices() {
            for feature in example.features(ns) {
                features.push((mix(u64::from(ns), feature.index), feature.value));
            }
        }
        for interaction in example.interactions.iter().filter(|i| !i.is_empty()) {
            let mut crosses: Vec<(u64, f32)> = vec![(CROSS_SEED, 1.0)];
            for &ns in interaction {
                let mut next = Vec::with_capacity(crosses.len());
                for &(hash, value) in &crosses {
                    for feature in example.features(ns) {
                        next.push((
                            mix(mix(hash, u64::from(ns)), feature.index),
                            value * feature.value,
                        ));
                    }
                }
                crosses = next;
            }
            features.extend(crosses);
        }
        features
    }

    fn index(hash: u64, action: u32, len: usize) -> usize {
        (mix(hash, u64::from(action)) % len as u64) as usize
    }

    fn score(features: &[(u64, f32)], action: u32, weights: &[f32]) -> f32 {
        features
            .iter()
            .map(|(hash, value)| weights[Self::index(*hash, action, weights.len())] * value)
            .sum()
    }

    fn best_action(&self, features: &[(u64, f32)], weights: &[f32]) -> u32 {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for action in 0..self.actions {
            let score = Self::score(features, action, weights);
            if score > best_score {
                best = action;
                best_score = score;
            }
        }
        best
    }

    fn group_features(group: &[Example]) -> LearnerResult<Vec<(u64, f32)>> {
        if group.is_empty() {
            return Err(LearnerError::EmptyGroup);
        }
        Ok(group.iter().flat_map(Self::hashed_features).collect())
    }
}

impl Learner for LinearDemoLearner {
    fn predict_and_learn(
        &mut self,
        group: &mut [Example],
        outcome: &LoggedOutcome,
        view: SlotView<'_>,
    ) -> LearnerResult<u32> {
        if view.weights.is_empty() {
            return Err(LearnerError::WeightView {
                expected: 1,
                actual: 0,
            });
        }
        let features = Self::group_features(group)?;
        let chosen = self.best_action(&features, view.weights);

        let importance = outcome.importance_weight() as f32;
        let target = outcome.reward() as f32;
        let error = target - Self::score(&features, outcome.action, view.weights);
        let step = self.learning_rate * error * importance.min(10.0);
        let len = view.weights.len();
        for (hash, value) in &features {
            view.weights[Self::index(*hash, outcome.action, len)] += step * value;
        }

        let scalars = view.scalars;
        scalars.normalized_sum += f64::from(error * error);
        scalars.total_weight += f64::from(importance);
        scalars.event_sum += 1;
        scalars.action_sum += u64::from(chosen);
        Ok(chosen)
    }

    fn predict_only(&mut self, group: &[Example], weights: &[f32]) -> LearnerResult<u32> {
        if weights.is_empty() {
            return Err(LearnerError::WeightView {
                expected: 1,
                actual: 0,
            });
        }
        let features = Self::group_features(group)?;
        Ok(self.best_action(&features, weights))
    }
}

fn mix(seed: u64, value: u64) -> u64 {
    let mut hash = seed ^ value.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^ (hash >> 33)
}

/// One decision of the synthetic stream.
#[derive(Debug, Clone)]
pub struct Decision {
    pub group: Vec<Example>,
    pub outcome: LoggedOutcome,
    /// The action that earns the reward; only the user and item features
    /// together determine it.
    pub best_action: u32,
}

/// Uniform logging policy over `actions` arms. The rewarded arm depends on
/// the user-item cross, the noise namespace carries nothing.
pub fn next_decision(rng: &mut ChaCha20Rng, actions: u32) -> Decision {
    let actions = actions.max(1);
    let user = rng.gen_range(0..8u64);
    let item = rng.gen_range(0..8u64);
    let mut example = Example::new();
    example.push_feature(USER_NS, Feature::new(user, 1.0));
    example.push_feature(ITEM_NS, Feature::new(item, 1.0));
    example.push_feature(NOISE_NS, Feature::new(rng.gen_range(0..32), 1.0));

    let best_action = ((user * 3 + item) % u64::from(actions)) as u32;
    let action = rng.gen_range(0..actions);
    let cost = if action == best_action { -1.0 } else { 0.0 };
    Decision {
        group: vec![example],
        outcome: LoggedOutcome::new(action, 1.0 / actions as f32, cost),
        best_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chacha_core::SlotScalars;
    use rand::SeedableRng;

    #[test]
    fn stream_is_deterministic_for_a_seed() {
        let mut first = ChaCha20Rng::seed_from_u64(9);
        let mut second = ChaCha20Rng::seed_from_u64(9);
        for _ in 0..20 {
            let a = next_decision(&mut first, 4);
            let b = next_decision(&mut second, 4);
            assert_eq!(a.outcome, b.outcome);
            assert_eq!(a.best_action, b.best_action);
        }
    }

    #[test]
    fn interactions_add_cross_features() {
        let mut example = Example::with_interactions(vec![vec![USER_NS, ITEM_NS]]);
        example.push_feature(USER_NS, Feature::new(1, 1.0));
        example.push_feature(ITEM_NS, Feature::new(2, 1.0));
        assert_eq!(LinearDemoLearner::hashed_features(&example).len(), 3);

        let plain = Example {
            interactions: Default::default(),
            ..example
        };
        assert_eq!(LinearDemoLearner::hashed_features(&plain).len(), 2);
    }

    #[test]
    fn learns_the_rewarded_action() {
        let mut learner = LinearDemoLearner::new(2);
        let mut weights = vec![0.0f32; 64];
        let mut scalars = SlotScalars::default();
        let mut group = vec![{
            let mut ex = Example::new();
            ex.push_feature(USER_NS, Feature::new(0, 1.0));
            ex
        }];
        for _ in 0..20 {
            let view = SlotView {
                slot: 0,
                weights: &mut weights,
                scalars: &mut scalars,
            };
            learner
                .predict_and_learn(&mut group, &LoggedOutcome::new(1, 0.5, -1.0), view)
                .unwrap();
        }
        let features = LinearDemoLearner::group_features(&group).unwrap();
        let score = LinearDemoLearner::score(&features, 1, &weights);
        assert!((score - 1.0).abs() < 0.05, "score {score}");
        assert_eq!(scalars.event_sum, 20);
    }

    #[test]
    fn rejects_empty_groups() {
        let mut learner = LinearDemoLearner::new(2);
        assert!(matches!(
            learner.predict_only(&[], &[0.0; 4]),
            Err(LearnerError::EmptyGroup)
        ));
    }
}
