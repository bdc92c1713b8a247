use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::namespace::ExclusionSet;

pub type ConfigId = u64;

/// Lifecycle of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigState {
    New,
    Live,
    Inactive,
    Removed,
}

impl ConfigState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigState::New => "new",
            ConfigState::Live => "live",
            ConfigState::Inactive => "inactive",
            ConfigState::Removed => "removed",
        }
    }

    /// New and Inactive entries may be (re)queued for a live slot.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, ConfigState::New | ConfigState::Inactive)
    }
}

impl std::fmt::Display for ConfigState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate configuration: the interaction groups it excludes, how many
/// rounds it may run before re-evaluation, and where it is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    pub id: ConfigId,
    pub exclusions: ExclusionSet,
    pub lease: u64,
    pub state: ConfigState,
}

impl ExclusionConfig {
    pub fn new(id: ConfigId, exclusions: ExclusionSet, lease: u64) -> Self {
        Self {
            id,
            exclusions,
            lease,
            state: ConfigState::New,
        }
    }
}

/// Every configuration generated so far.
///
/// Only the first `valid_len` entries are meaningful. Entries past it went
/// stale on a champion change and are overwritten in place before the vector
/// grows again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigCatalog {
    configs: Vec<ExclusionConfig>,
    valid_len: usize,
    next_id: ConfigId,
}

impl ConfigCatalog {
    /// Creates a catalog whose only entry is the live initial champion with
    /// no exclusions.
    pub fn with_champion(lease: u64) -> Self {
        let mut champion = ExclusionConfig::new(0, ExclusionSet::new(), lease);
        champion.state = ConfigState::Live;
        Self {
            configs: vec![champion],
            valid_len: 1,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Number of entries ever made eligible to run since the last champion
    /// change.
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    pub fn get(&self, index: usize) -> &ExclusionConfig {
        &self.configs[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut ExclusionConfig {
        &mut self.configs[index]
    }

    pub fn valid(&self) -> &[ExclusionConfig] {
        &self.configs[..self.valid_len]
    }

    pub fn contains_valid(&self, exclusions: &ExclusionSet) -> bool {
        self.valid()
            .iter()
            .any(|config| &config.exclusions == exclusions)
    }

    /// Stores a fresh configuration at the first stale position (or at the
    /// end) and returns its index.
    pub fn insert(&mut self, exclusions: ExclusionSet, lease: u64) -> usize {
        let config = ExclusionConfig::new(self.next_id, exclusions, lease);
        self.next_id += 1;
        let index = self.valid_len;
        if index < self.configs.len() {
            self.configs[index] = config;
        } else {
            self.configs.push(config);
        }
        self.valid_len += 1;
        index
    }

    pub fn replace(&mut self, index: usize, config: ExclusionConfig) {
        self.configs[index] = config;
    }

    /// Marks everything from `len` onwards as stale.
    pub fn truncate_valid(&mut self, len: usize) {
        self.valid_len = len.min(self.configs.len());
    }

    pub fn double_lease(&mut self, index: usize) -> u64 {
        let config = &mut self.configs[index];
        config.lease = config.lease.saturating_mul(2);
        config.lease
    }
}

/// A candidate waiting for a live slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueEntry {
    pub priority: f32,
    pub id: ConfigId,
    pub index: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Highest priority first; among equal priorities the older candidate
    /// (lower id) wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Max-heap of candidates awaiting a live slot.
#[derive(Debug, Clone, Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<QueueEntry>) -> Self {
        Self {
            heap: BinaryHeap::from(entries),
        }
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Drops Removed configurations sitting at the head of the queue.
    pub fn discard_removed(&mut self, catalog: &ConfigCatalog) {
        while let Some(top) = self.heap.peek() {
            if catalog.get(top.index).state != ConfigState::Removed {
                break;
            }
            self.heap.pop();
        }
    }

    /// Entries in pop order.
    pub fn to_sorted_vec(&self) -> Vec<QueueEntry> {
        let mut entries = self.heap.clone().into_sorted_vec();
        entries.reverse();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusions(groups: &[&[u8]]) -> ExclusionSet {
        groups.iter().map(|group| group.to_vec()).collect()
    }

    #[test]
    fn catalog_starts_with_live_champion() {
        let catalog = ConfigCatalog::with_champion(10);
        assert_eq!(catalog.valid_len(), 1);
        assert_eq!(catalog.get(0).state, ConfigState::Live);
        assert!(catalog.get(0).exclusions.is_empty());
    }

    #[test]
    fn insert_reuses_stale_positions() {
        let mut catalog = ConfigCatalog::with_champion(10);
        assert_eq!(catalog.insert(exclusions(&[b"aa"]), 10), 1);
        assert_eq!(catalog.insert(exclusions(&[b"ab"]), 10), 2);
        catalog.truncate_valid(1);
        let index = catalog.insert(exclusions(&[b"bb"]), 10);
        assert_eq!(index, 1);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(1).id, 3);
        assert!(catalog.contains_valid(&exclusions(&[b"bb"])));
        assert!(!catalog.contains_valid(&exclusions(&[b"ab"])));
    }

    #[test]
    fn lease_doubles() {
        let mut catalog = ConfigCatalog::with_champion(10);
        assert_eq!(catalog.double_lease(0), 20);
        assert_eq!(catalog.double_lease(0), 40);
    }

    #[test]
    fn queue_orders_by_priority_then_age() {
        let mut queue = PriorityQueue::new();
        queue.push(QueueEntry {
            priority: 0.0,
            id: 4,
            index: 4,
        });
        queue.push(QueueEntry {
            priority: 0.0,
            id: 2,
            index: 2,
        });
        queue.push(QueueEntry {
            priority: 1.5,
            id: 9,
            index: 3,
        });
        let order: Vec<ConfigId> = queue.to_sorted_vec().iter().map(|entry| entry.id).collect();
        assert_eq!(order, vec![9, 2, 4]);
        assert_eq!(queue.pop().map(|entry| entry.id), Some(9));
        assert_eq!(queue.pop().map(|entry| entry.id), Some(2));
    }

    #[test]
    fn removed_entries_are_dropped_from_head() {
        let mut catalog = ConfigCatalog::with_champion(10);
        let removed = catalog.insert(exclusions(&[b"aa"]), 10);
        let kept = catalog.insert(exclusions(&[b"ab"]), 10);
        catalog.get_mut(removed).state = ConfigState::Removed;
        let mut queue = PriorityQueue::new();
        queue.push(QueueEntry {
            priority: 1.0,
            id: catalog.get(removed).id,
            index: removed,
        });
        queue.push(QueueEntry {
            priority: 0.0,
            id: catalog.get(kept).id,
            index: kept,
        });
        queue.discard_removed(&catalog);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().map(|entry| entry.index), Some(kept));
    }
}
