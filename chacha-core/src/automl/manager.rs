//! Live slot scheduling and champion arbitration.
//!
//! [`ConfigManager`] owns the candidate catalog, the priority queue, the
//! oracle and the table of live slots. Slot 0 always runs the champion. The
//! other slots run challengers whose estimator pairs are compared against the
//! champion after every learning pass.

use std::sync::Arc;

use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::catalog::{ConfigCatalog, ConfigId, ConfigState, PriorityQueue, QueueEntry};
use super::error::InvariantViolation;
use super::estimator::{EstimatorParams, LiveSlot};
use super::metrics::{ChampionSwitch, RoundReport, SlotReport};
use super::oracle::ConfigOracle;
use crate::arena::WeightArena;
use crate::config::AutomlConfig;
use crate::error::Result;
use crate::example::{Example, InteractionOverride, LoggedOutcome};
use crate::learner::{Learner, LearnerResult, SlotScalars};
use crate::namespace::{exclusions_to_string, generate_interactions, NamespaceCounter};

pub const CHAMPION_SLOT: usize = 0;

#[derive(Debug)]
pub struct ConfigManager {
    config: AutomlConfig,
    priority_challengers: usize,
    params: EstimatorParams,
    catalog: ConfigCatalog,
    queue: PriorityQueue,
    oracle: ConfigOracle,
    ns_counter: NamespaceCounter,
    slots: Vec<LiveSlot>,
    arena: WeightArena,
    total_champ_switches: u64,
    total_learn_count: u64,
}

/// Serializable image of a [`ConfigManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerRecord {
    pub config: AutomlConfig,
    pub catalog: ConfigCatalog,
    /// Queue entries in pop order.
    pub queue: Vec<QueueEntry>,
    pub rng: ChaCha20Rng,
    pub ns_counter: NamespaceCounter,
    pub slots: Vec<LiveSlot>,
    pub arena: WeightArena,
    pub total_champ_switches: u64,
    pub total_learn_count: u64,
}

impl ConfigManager {
    /// Validates the configuration and starts with the empty-exclusion
    /// champion alone in slot 0.
    pub fn new(config: &AutomlConfig) -> Result<Self> {
        config.validate()?;
        let params = EstimatorParams::new(config.significance_level, config.estimator_decay);
        Ok(Self {
            config: config.clone(),
            priority_challengers: config.resolved_priority_challengers(),
            params,
            catalog: ConfigCatalog::with_champion(config.global_lease),
            queue: PriorityQueue::new(),
            oracle: ConfigOracle::new(config),
            ns_counter: NamespaceCounter::new(),
            slots: vec![LiveSlot::new(params, 0, false)],
            arena: WeightArena::new(config.max_live_configs, config.weights_per_slot),
            total_champ_switches: 0,
            total_learn_count: 0,
        })
    }

    pub fn config(&self) -> &AutomlConfig {
        &self.config
    }

    pub fn priority_challengers(&self) -> usize {
        self.priority_challengers
    }

    pub fn catalog(&self) -> &ConfigCatalog {
        &self.catalog
    }

    pub fn queue(&self) -> &PriorityQueue {
        &self.queue
    }

    pub fn namespace_counter(&self) -> &NamespaceCounter {
        &self.ns_counter
    }

    pub fn slots(&self) -> &[LiveSlot] {
        &self.slots
    }

    pub fn arena(&self) -> &WeightArena {
        &self.arena
    }

    pub fn champion_scalars(&self) -> &SlotScalars {
        self.arena.scalars(CHAMPION_SLOT)
    }

    pub fn champion_config_id(&self) -> ConfigId {
        self.catalog.get(self.slots[CHAMPION_SLOT].config_index).id
    }

    pub fn total_champ_switches(&self) -> u64 {
        self.total_champ_switches
    }

    pub fn total_learn_count(&self) -> u64 {
        self.total_learn_count
    }

    pub(crate) fn count_learn(&mut self) -> u64 {
        self.total_learn_count += 1;
        self.total_learn_count
    }

    /// Counts the group's namespaces. When new ones appear every live slot's
    /// interactions are regenerated and `true` is returned.
    pub fn observe(&mut self, group: &[Example]) -> bool {
        let new_ns_seen = self.ns_counter.observe(group);
        if new_ns_seen {
            for slot in 0..self.slots.len() {
                self.regenerate_interactions(slot);
            }
            tracing::debug!(
                target: "automl.scheduler",
                namespaces = self.ns_counter.len(),
                "new namespaces seen, interactions regenerated"
            );
        }
        new_ns_seen
    }

    pub fn regenerate_interactions(&mut self, slot: usize) {
        let exclusions = &self.catalog.get(self.slots[slot].config_index).exclusions;
        let live = generate_interactions(self.config.interactions, &self.ns_counter, exclusions);
        self.slots[slot].live_interactions = Arc::new(live);
    }

    /// Asks the oracle for candidates around the current champion.
    pub fn propose(&mut self) -> usize {
        let champion = &self.slots[CHAMPION_SLOT];
        let exclusions = self.catalog.get(champion.config_index).exclusions.clone();
        let interactions = Arc::clone(&champion.live_interactions);
        self.oracle.propose(
            &mut self.catalog,
            &mut self.queue,
            &self.ns_counter,
            &exclusions,
            &interactions,
        )
    }

    /// Keeps, extends or replaces the occupant of every live slot.
    pub fn schedule(&mut self) {
        for slot in 0..self.config.max_live_configs {
            let need_new_slot = slot >= self.slots.len();
            if need_new_slot {
                if slot > self.slots.len() {
                    break;
                }
            } else {
                let current = &self.slots[slot];
                let index = current.config_index;
                let config = self.catalog.get(index);
                let exhausted = current.challenger.update_count() >= config.lease;
                if config.state != ConfigState::Removed && !exhausted {
                    continue;
                }
                if config.state == ConfigState::Live {
                    let lease = self.catalog.double_lease(index);
                    if !self.slots[slot].eligible_to_inactivate
                        || self.swap_eligible_to_inactivate(slot)
                    {
                        tracing::debug!(
                            target: "automl.scheduler",
                            slot,
                            config = self.catalog.get(index).id,
                            lease,
                            "lease extended"
                        );
                        continue;
                    }
                }
            }

            self.queue.discard_removed(&self.catalog);
            if self.queue.is_empty()
                && !self
                    .oracle
                    .repopulate(&self.catalog, &mut self.queue, &self.ns_counter)
            {
                continue;
            }
            let Some(entry) = self.queue.pop() else {
                continue;
            };

            if need_new_slot {
                let eligible = slot > self.priority_challengers;
                self.slots
                    .push(LiveSlot::new(self.params, entry.index, eligible));
            } else {
                let evicted = self.slots[slot].config_index;
                let evicted_config = self.catalog.get_mut(evicted);
                if evicted_config.state == ConfigState::Live {
                    evicted_config.state = ConfigState::Inactive;
                }
                tracing::debug!(
                    target: "automl.scheduler",
                    slot,
                    config = evicted_config.id,
                    state = %evicted_config.state,
                    "slot evicted"
                );
                let occupant = &mut self.slots[slot];
                occupant.reset_stats();
                occupant.config_index = entry.index;
            }
            self.catalog.get_mut(entry.index).state = ConfigState::Live;
            self.arena.copy_slot(CHAMPION_SLOT, slot);
            self.regenerate_interactions(slot);

            let config = self.catalog.get(entry.index);
            tracing::debug!(
                target: "automl.scheduler",
                slot,
                config = config.id,
                lease = config.lease,
                exclusions = %exclusions_to_string(&config.exclusions),
                "slot assigned"
            );
        }
    }

    /// Lets a regular slot whose lease ran out trade places with a priority
    /// slot it statistically beats.
    pub fn swap_eligible_to_inactivate(&mut self, slot: usize) -> bool {
        let lower = self.slots[slot].challenger.lower_bound();
        for other in 0..self.slots.len() {
            if other == CHAMPION_SLOT || self.slots[other].eligible_to_inactivate {
                continue;
            }
            let rival = &self.slots[other].challenger;
            let beats = if self.config.lb_trick {
                lower > 1.0 - rival.lower_bound()
            } else {
                lower > rival.upper_bound()
            };
            if beats {
                self.slots[slot].eligible_to_inactivate = false;
                self.slots[other].eligible_to_inactivate = true;
                tracing::debug!(
                    target: "automl.scheduler",
                    promoted_slot = slot,
                    demoted_slot = other,
                    "priority partition swapped"
                );
                return true;
            }
        }
        false
    }

    /// Compares every challenger with the champion, prunes dominated ones and
    /// promotes the last challenger that is better. After a promotion the
    /// queue is empty and only the two champions remain valid; call
    /// [`ConfigManager::propose`] to refill it.
    pub fn update_champ(&mut self) -> Option<ChampionSwitch> {
        let lb_trick = self.config.lb_trick;
        let mut winner = None;
        for slot in 1..self.slots.len() {
            if self.catalog.get(self.slots[slot].config_index).state == ConfigState::Removed {
                continue;
            }
            if self.slots[slot].beats_champion(lb_trick) {
                winner = Some(slot);
            } else if self.slots[slot].dominated_by_champion(lb_trick) {
                let config = self.catalog.get_mut(self.slots[slot].config_index);
                config.state = ConfigState::Removed;
                tracing::debug!(
                    target: "automl.champion",
                    slot,
                    config = config.id,
                    "challenger pruned"
                );
            }
        }
        winner.map(|slot| self.promote(slot))
    }

    fn promote(&mut self, winner: usize) -> ChampionSwitch {
        let previous_champion = self.champion_config_id();

        self.arena.swap_slots(winner, CHAMPION_SLOT);
        if winner != 1 {
            self.arena.copy_slot(winner, 1);
        }

        self.total_champ_switches += 1;
        self.queue.clear();
        self.slots[winner].eligible_to_inactivate = false;
        if self.priority_challengers > 1 {
            self.slots[CHAMPION_SLOT].eligible_to_inactivate = false;
        }

        let new_config = self.catalog.get(self.slots[winner].config_index).clone();
        let old_config = self.catalog.get(self.slots[CHAMPION_SLOT].config_index).clone();
        self.catalog.replace(0, new_config);
        self.catalog.replace(1, old_config);
        self.catalog.truncate_valid(2);

        let mut drained = std::mem::take(&mut self.slots);
        let mut promoted = drained.swap_remove(winner);
        let mut demoted = drained.swap_remove(CHAMPION_SLOT);
        promoted.config_index = 0;
        demoted.config_index = 1;
        demoted.take_mirrored_horizon(&promoted);
        if self.config.lb_trick {
            demoted.reset_stats();
        }
        self.slots = vec![promoted, demoted];

        let switch = ChampionSwitch {
            round: self.total_learn_count,
            from_slot: winner,
            previous_champion,
            new_champion: self.champion_config_id(),
            total_champ_switches: self.total_champ_switches,
        };
        tracing::info!(
            target: "automl.champion",
            round = switch.round,
            from_slot = winner,
            previous = previous_champion,
            champion = switch.new_champion,
            exclusions = %exclusions_to_string(&self.catalog.get(0).exclusions),
            switches = self.total_champ_switches,
            "champion switched"
        );
        switch
    }

    /// Runs the learner on one slot's weights with that slot's interactions.
    /// The group's own interactions are restored before returning.
    pub fn learn_slot<L: Learner + ?Sized>(
        &mut self,
        learner: &mut L,
        group: &mut [Example],
        outcome: &LoggedOutcome,
        slot: usize,
    ) -> LearnerResult<u32> {
        let live = Arc::clone(&self.slots[slot].live_interactions);
        let mut scoped = InteractionOverride::apply(group, &live);
        learner.predict_and_learn(&mut scoped, outcome, self.arena.view_mut(slot))
    }

    /// Champion prediction without learning.
    pub fn predict_champion<L: Learner + ?Sized>(
        &self,
        learner: &mut L,
        group: &mut [Example],
    ) -> LearnerResult<u32> {
        let live = Arc::clone(&self.slots[CHAMPION_SLOT].live_interactions);
        let scoped = InteractionOverride::apply(group, &live);
        learner.predict_only(&scoped, self.arena.view(CHAMPION_SLOT))
    }

    pub fn record_challenger_outcome(&mut self, slot: usize, w: f64, r: f64) {
        self.slots[slot].challenger.update(w, r);
    }

    /// Feeds the champion's outcome to every challenger's horizon-matched
    /// estimator.
    pub fn record_champion_outcome(&mut self, w: f64, r: f64) {
        let r = if self.config.lb_trick { 1.0 - r } else { r };
        for slot in self.slots.iter_mut().skip(1) {
            slot.champion.update(w, r);
        }
    }

    pub fn challenger_beats_champion(&self, slot: usize) -> bool {
        slot != CHAMPION_SLOT && self.slots[slot].beats_champion(self.config.lb_trick)
    }

    pub fn report(&self) -> RoundReport {
        let slots = self
            .slots
            .iter()
            .enumerate()
            .map(|(slot, live)| {
                let config = self.catalog.get(live.config_index);
                let (lower_bound, upper_bound) = live.challenger.bounds();
                let (champion_lower_bound, champion_upper_bound) = live.champion.bounds();
                SlotReport {
                    slot,
                    config_id: config.id,
                    config_index: live.config_index,
                    state: config.state,
                    lease: config.lease,
                    update_count: live.challenger.update_count(),
                    lower_bound,
                    upper_bound,
                    champion_lower_bound,
                    champion_upper_bound,
                    eligible_to_inactivate: live.eligible_to_inactivate,
                }
            })
            .collect();
        RoundReport {
            round: self.total_learn_count,
            champion_config_id: self.champion_config_id(),
            total_champ_switches: self.total_champ_switches,
            valid_configs: self.catalog.valid_len(),
            queued: self.queue.len(),
            slots,
        }
    }

    pub fn verify_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        let max = self.config.max_live_configs;
        if self.priority_challengers >= max {
            return Err(InvariantViolation::Settings {
                reason: format!(
                    "priority_challengers={} leaves no room below max_live_configs={max}",
                    self.priority_challengers
                ),
            });
        }
        let valid = self.catalog.valid_len();
        if valid == 0 || valid > self.catalog.len() {
            return Err(InvariantViolation::CatalogSize {
                valid,
                len: self.catalog.len(),
            });
        }
        let Some(champion) = self.slots.first() else {
            return Err(InvariantViolation::NoChampion);
        };
        if self.slots.len() > max {
            return Err(InvariantViolation::TooManySlots {
                occupied: self.slots.len(),
                max,
            });
        }
        if champion.config_index != 0 {
            return Err(InvariantViolation::ChampionMisplaced {
                index: champion.config_index,
            });
        }
        if champion.eligible_to_inactivate {
            return Err(InvariantViolation::ChampionEligible);
        }
        let champion_state = self.catalog.get(0).state;
        if champion_state != ConfigState::Live {
            return Err(InvariantViolation::ChampionNotLive {
                state: champion_state,
            });
        }

        let mut bound_to: Vec<Option<usize>> = vec![None; valid];
        for (slot, live) in self.slots.iter().enumerate() {
            let index = live.config_index;
            if index >= valid {
                return Err(InvariantViolation::SlotOutOfRange { slot, index, valid });
            }
            if let Some(first) = bound_to[index] {
                return Err(InvariantViolation::SharedConfig {
                    index,
                    first,
                    second: slot,
                });
            }
            bound_to[index] = Some(slot);
            let state = self.catalog.get(index).state;
            if !matches!(state, ConfigState::Live | ConfigState::Removed) {
                return Err(InvariantViolation::SlotNotRunning { slot, index, state });
            }
        }
        for (index, config) in self.catalog.valid().iter().enumerate() {
            if config.state == ConfigState::Live && bound_to[index].is_none() {
                return Err(InvariantViolation::OrphanLive { index });
            }
        }
        for entry in self.queue.to_sorted_vec() {
            if entry.index >= valid {
                return Err(InvariantViolation::QueueOutOfRange {
                    index: entry.index,
                    valid,
                });
            }
        }
        if !self.arena.is_consistent()
            || self.arena.slot_count() != max
            || self.arena.slot_len() != self.config.weights_per_slot
        {
            return Err(InvariantViolation::ArenaShape {
                slots: self.arena.slot_count(),
                slot_len: self.arena.slot_len(),
                expected: max,
            });
        }
        Ok(())
    }

    pub fn to_record(&self) -> ManagerRecord {
        ManagerRecord {
            config: self.config.clone(),
            catalog: self.catalog.clone(),
            queue: self.queue.to_sorted_vec(),
            rng: self.oracle.rng().clone(),
            ns_counter: self.ns_counter.clone(),
            slots: self.slots.clone(),
            arena: self.arena.clone(),
            total_champ_switches: self.total_champ_switches,
            total_learn_count: self.total_learn_count,
        }
    }

    /// Rebuilds a manager from a record, rejecting any record that breaks the
    /// scheduler invariants.
    pub fn from_record(record: ManagerRecord) -> std::result::Result<Self, InvariantViolation> {
        record
            .config
            .validate()
            .map_err(|err| InvariantViolation::Settings {
                reason: err.to_string(),
            })?;
        let manager = Self {
            priority_challengers: record.config.resolved_priority_challengers(),
            params: EstimatorParams::new(
                record.config.significance_level,
                record.config.estimator_decay,
            ),
            oracle: ConfigOracle::with_rng(&record.config, record.rng),
            config: record.config,
            catalog: record.catalog,
            queue: PriorityQueue::from_entries(record.queue),
            ns_counter: record.ns_counter,
            slots: record.slots,
            arena: record.arena,
            total_champ_switches: record.total_champ_switches,
            total_learn_count: record.total_learn_count,
        };
        manager.verify_invariants()?;
        Ok(manager)
    }
}
