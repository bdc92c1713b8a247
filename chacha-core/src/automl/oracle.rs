use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::catalog::{ConfigCatalog, ExclusionConfig, PriorityQueue, QueueEntry};
use super::priority::{PriorityKind, PriorityStrategy};
use crate::config::AutomlConfig;
use crate::namespace::{exclusions_to_string, ExclusionSet, InteractionList, NamespaceCounter};

/// Candidates drawn by the random oracle after each champion change.
pub const CONFIGS_PER_CHAMP_CHANGE: usize = 10;

/// How new candidates are derived from the champion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    /// One candidate per champion interaction, excluding it on top of the
    /// champion's exclusions.
    #[default]
    AddOne,
    /// Add-one candidates plus one candidate per champion exclusion that puts
    /// it back.
    OneDiff,
    /// Add-one candidates for randomly drawn champion interactions.
    Rand,
    /// The champion's own exclusions, duplicates allowed.
    ChampDupe,
}

impl OracleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleKind::AddOne => "add_one",
            OracleKind::OneDiff => "one_diff",
            OracleKind::Rand => "rand",
            OracleKind::ChampDupe => "champ_dupe",
        }
    }
}

impl std::fmt::Display for OracleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generates candidate configurations and feeds them to the priority queue.
pub struct ConfigOracle {
    kind: OracleKind,
    priority: PriorityKind,
    strategy: Box<dyn PriorityStrategy>,
    global_lease: u64,
    catalog_cap: Option<usize>,
    rng: ChaCha20Rng,
}

impl std::fmt::Debug for ConfigOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigOracle")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("strategy", &"<PriorityStrategy>")
            .field("global_lease", &self.global_lease)
            .field("catalog_cap", &self.catalog_cap)
            .finish()
    }
}

impl ConfigOracle {
    pub fn new(config: &AutomlConfig) -> Self {
        Self::with_rng(config, ChaCha20Rng::seed_from_u64(config.seed))
    }

    /// Rebuilds an oracle around a previously saved random state.
    pub fn with_rng(config: &AutomlConfig, rng: ChaCha20Rng) -> Self {
        Self {
            kind: config.oracle,
            priority: config.priority,
            strategy: config.priority.strategy(),
            global_lease: config.global_lease,
            catalog_cap: config.catalog_cap,
            rng,
        }
    }

    pub fn rng(&self) -> &ChaCha20Rng {
        &self.rng
    }

    pub fn priority_of(&self, config: &ExclusionConfig, counter: &NamespaceCounter) -> f32 {
        self.strategy.score(config, counter)
    }

    /// Proposes candidates around the champion. Returns how many entered the
    /// catalog.
    pub fn propose(
        &mut self,
        catalog: &mut ConfigCatalog,
        queue: &mut PriorityQueue,
        counter: &NamespaceCounter,
        champion_exclusions: &ExclusionSet,
        champion_interactions: &InteractionList,
    ) -> usize {
        let mut candidates: Vec<(ExclusionSet, bool)> = Vec::new();
        match self.kind {
            OracleKind::AddOne => {
                candidates.extend(
                    champion_interactions
                        .iter()
                        .map(|interaction| (add_one(champion_exclusions, interaction), false)),
                );
            }
            OracleKind::OneDiff => {
                candidates.extend(
                    champion_interactions
                        .iter()
                        .map(|interaction| (add_one(champion_exclusions, interaction), false)),
                );
                candidates.extend(champion_exclusions.iter().map(|excluded| {
                    let mut exclusions = champion_exclusions.clone();
                    exclusions.remove(excluded);
                    (exclusions, false)
                }));
            }
            OracleKind::Rand => {
                if !champion_interactions.is_empty() {
                    for _ in 0..CONFIGS_PER_CHAMP_CHANGE {
                        let pick = self.rng.gen_range(0..champion_interactions.len());
                        candidates.push((
                            add_one(champion_exclusions, &champion_interactions[pick]),
                            false,
                        ));
                    }
                }
            }
            OracleKind::ChampDupe => {
                candidates.push((champion_exclusions.clone(), true));
            }
        }

        let inserted = candidates
            .into_iter()
            .filter_map(|(exclusions, allow_dups)| {
                self.insert_config(catalog, queue, counter, exclusions, allow_dups)
            })
            .count();

        tracing::debug!(
            target: "automl.oracle",
            oracle = self.kind.as_str(),
            inserted,
            valid_configs = catalog.valid_len(),
            queued = queue.len(),
            "proposed candidates"
        );
        inserted
    }

    /// Adds one candidate to the catalog and queues it. Returns the catalog
    /// index, or `None` when the exclusion set is already known or the
    /// catalog is at its cap.
    pub fn insert_config(
        &mut self,
        catalog: &mut ConfigCatalog,
        queue: &mut PriorityQueue,
        counter: &NamespaceCounter,
        exclusions: ExclusionSet,
        allow_dups: bool,
    ) -> Option<usize> {
        if let Some(cap) = self.catalog_cap {
            if catalog.valid_len() >= cap {
                tracing::trace!(
                    target: "automl.oracle",
                    cap,
                    "catalog cap reached"
                );
                return None;
            }
        }
        if !allow_dups && catalog.contains_valid(&exclusions) {
            return None;
        }
        let index = catalog.insert(exclusions, self.global_lease);
        let config = catalog.get(index);
        queue.push(QueueEntry {
            priority: self.priority_of(config, counter),
            id: config.id,
            index,
        });
        tracing::trace!(
            target: "automl.oracle",
            index,
            id = config.id,
            exclusions = %exclusions_to_string(&config.exclusions),
            "candidate inserted"
        );
        Some(index)
    }

    /// Re-queues every valid New or Inactive entry with a fresh priority.
    /// Returns whether anything is waiting afterwards.
    pub fn repopulate(
        &self,
        catalog: &ConfigCatalog,
        queue: &mut PriorityQueue,
        counter: &NamespaceCounter,
    ) -> bool {
        for (index, config) in catalog.valid().iter().enumerate() {
            if config.state.is_schedulable() {
                queue.push(QueueEntry {
                    priority: self.priority_of(config, counter),
                    id: config.id,
                    index,
                });
            }
        }
        if queue.is_empty() {
            tracing::trace!(
                target: "automl.oracle",
                valid_configs = catalog.valid_len(),
                "no candidate left to schedule"
            );
            return false;
        }
        true
    }
}

fn add_one(base: &ExclusionSet, interaction: &[u8]) -> ExclusionSet {
    let mut exclusions = base.clone();
    exclusions.insert(interaction.to_vec());
    exclusions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automl::catalog::ConfigState;
    use crate::example::{Example, Feature};
    use crate::namespace::InteractionKind;

    fn counter(namespaces: &[u8]) -> NamespaceCounter {
        let mut ex = Example::new();
        for ns in namespaces {
            ex.push_feature(*ns, Feature::new(1, 1.0));
        }
        let mut counter = NamespaceCounter::new();
        counter.observe(&[ex]);
        counter
    }

    fn setup(kind: OracleKind) -> (ConfigOracle, ConfigCatalog, PriorityQueue, NamespaceCounter) {
        let config = AutomlConfig {
            oracle: kind,
            ..AutomlConfig::default()
        };
        (
            ConfigOracle::new(&config),
            ConfigCatalog::with_champion(config.global_lease),
            PriorityQueue::new(),
            counter(b"ab"),
        )
    }

    #[test]
    fn add_one_extends_champion_by_one_group() {
        let (mut oracle, mut catalog, mut queue, counter) = setup(OracleKind::AddOne);
        let interactions = counter.all_interactions(InteractionKind::Quadratic);
        let inserted = oracle.propose(
            &mut catalog,
            &mut queue,
            &counter,
            &ExclusionSet::new(),
            &interactions,
        );
        assert_eq!(inserted, 3);
        assert_eq!(catalog.valid_len(), 4);
        assert_eq!(queue.len(), 3);
        for config in &catalog.valid()[1..] {
            assert_eq!(config.exclusions.len(), 1);
            assert_eq!(config.state, ConfigState::New);
        }

        // Proposing again from the same champion only finds duplicates.
        let again = oracle.propose(
            &mut catalog,
            &mut queue,
            &counter,
            &ExclusionSet::new(),
            &interactions,
        );
        assert_eq!(again, 0);
        assert_eq!(catalog.valid_len(), 4);
    }

    #[test]
    fn one_diff_also_removes_exclusions() {
        let (mut oracle, mut catalog, mut queue, counter) = setup(OracleKind::OneDiff);
        let champion: ExclusionSet = [vec![b'a', b'a']].into_iter().collect();
        let interactions = vec![vec![b'a', b'b'], vec![b'b', b'b']];
        oracle.propose(&mut catalog, &mut queue, &counter, &champion, &interactions);
        // two add-one candidates plus the empty set (already the champion's
        // entry at index 0)
        assert_eq!(catalog.valid_len(), 3);
        assert!(catalog.contains_valid(&[vec![b'a', b'a'], vec![b'a', b'b']].into_iter().collect()));
    }

    #[test]
    fn rand_is_reproducible_from_seed() {
        let interactions = counter(b"abc").all_interactions(InteractionKind::Quadratic);
        let run = || {
            let (mut oracle, mut catalog, mut queue, counter) = setup(OracleKind::Rand);
            oracle.propose(
                &mut catalog,
                &mut queue,
                &counter,
                &ExclusionSet::new(),
                &interactions,
            );
            catalog.valid().to_vec()
        };
        let first = run();
        assert!(first.len() > 1 && first.len() <= 1 + CONFIGS_PER_CHAMP_CHANGE);
        assert_eq!(first, run());
    }

    #[test]
    fn champ_dupe_allows_duplicates() {
        let (mut oracle, mut catalog, mut queue, counter) = setup(OracleKind::ChampDupe);
        oracle.propose(&mut catalog, &mut queue, &counter, &ExclusionSet::new(), &Vec::new());
        assert_eq!(catalog.valid_len(), 2);
        assert_eq!(catalog.get(1).exclusions, catalog.get(0).exclusions);
    }

    #[test]
    fn cap_stops_insertion() {
        let config = AutomlConfig {
            catalog_cap: Some(2),
            ..AutomlConfig::default()
        };
        let mut oracle = ConfigOracle::new(&config);
        let mut catalog = ConfigCatalog::with_champion(10);
        let mut queue = PriorityQueue::new();
        let counter = counter(b"ab");
        let interactions = counter.all_interactions(InteractionKind::Quadratic);
        let inserted = oracle.propose(
            &mut catalog,
            &mut queue,
            &counter,
            &ExclusionSet::new(),
            &interactions,
        );
        assert_eq!(inserted, 1);
        assert_eq!(catalog.valid_len(), 2);
    }

    #[test]
    fn repopulate_requeues_new_and_inactive_only() {
        let (mut oracle, mut catalog, mut queue, counter) = setup(OracleKind::AddOne);
        let interactions = counter.all_interactions(InteractionKind::Quadratic);
        oracle.propose(
            &mut catalog,
            &mut queue,
            &counter,
            &ExclusionSet::new(),
            &interactions,
        );
        queue.clear();
        catalog.get_mut(1).state = ConfigState::Inactive;
        catalog.get_mut(2).state = ConfigState::Removed;
        catalog.get_mut(3).state = ConfigState::Live;
        assert!(oracle.repopulate(&catalog, &mut queue, &counter));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().map(|entry| entry.index), Some(1));

        queue.clear();
        catalog.get_mut(1).state = ConfigState::Live;
        assert!(!oracle.repopulate(&catalog, &mut queue, &counter));
    }
}
