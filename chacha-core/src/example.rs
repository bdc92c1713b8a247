use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::namespace::{InteractionList, NamespaceIndex};

/// A hashed feature as produced by the upstream parser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub index: u64,
    pub value: f32,
}

impl Feature {
    pub fn new(index: u64, value: f32) -> Self {
        Self { index, value }
    }
}

/// One parsed example of a decision group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Example {
    pub namespaces: BTreeMap<NamespaceIndex, Vec<Feature>>,
    /// Interactions the learner expands for this example. Overridden per live
    /// slot while the scheduler learns, see [`InteractionOverride`].
    pub interactions: Arc<InteractionList>,
}

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interactions(interactions: InteractionList) -> Self {
        Self {
            namespaces: BTreeMap::new(),
            interactions: Arc::new(interactions),
        }
    }

    pub fn push_feature(&mut self, ns: NamespaceIndex, feature: Feature) {
        self.namespaces.entry(ns).or_default().push(feature);
    }

    pub fn namespace_indices(&self) -> impl Iterator<Item = NamespaceIndex> + '_ {
        self.namespaces.keys().copied()
    }

    pub fn features(&self, ns: NamespaceIndex) -> &[Feature] {
        self.namespaces.get(&ns).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// What the logging policy did on a decision: the logged action, the
/// probability it had of choosing it, and the observed cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoggedOutcome {
    pub action: u32,
    pub probability: f32,
    pub cost: f32,
}

impl LoggedOutcome {
    pub fn new(action: u32, probability: f32, cost: f32) -> Self {
        Self {
            action,
            probability,
            cost,
        }
    }

    /// Inverse propensity of the logged action; zero for a zero propensity.
    pub fn importance_weight(&self) -> f64 {
        if self.probability > 0.0 {
            1.0 / f64::from(self.probability)
        } else {
            0.0
        }
    }

    pub fn reward(&self) -> f64 {
        -f64::from(self.cost)
    }
}

/// Temporarily points every example of a group at one slot's interactions.
///
/// The incoming interactions are restored when the guard drops, so an early
/// return or a panic inside the learner cannot leak one slot's interactions
/// into the next.
pub struct InteractionOverride<'a> {
    group: &'a mut [Example],
    saved: Vec<Arc<InteractionList>>,
}

impl<'a> InteractionOverride<'a> {
    pub fn apply(group: &'a mut [Example], live: &Arc<InteractionList>) -> Self {
        let saved = group
            .iter_mut()
            .map(|example| std::mem::replace(&mut example.interactions, Arc::clone(live)))
            .collect();
        Self { group, saved }
    }
}

impl Deref for InteractionOverride<'_> {
    type Target = [Example];

    fn deref(&self) -> &Self::Target {
        self.group
    }
}

impl DerefMut for InteractionOverride<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.group
    }
}

impl Drop for InteractionOverride<'_> {
    fn drop(&mut self) {
        for (example, original) in self.group.iter_mut().zip(self.saved.drain(..)) {
            example.interactions = original;
        }
    }
}
