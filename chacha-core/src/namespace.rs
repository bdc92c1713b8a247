use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::example::Example;

pub type NamespaceIndex = u8;

/// An ordered tuple of namespaces that are cross-multiplied into features.
pub type Interaction = Vec<NamespaceIndex>;

pub type InteractionList = Vec<Interaction>;

/// Set of interaction groups a configuration keeps out of the feature space.
pub type ExclusionSet = BTreeSet<Interaction>;

/// Namespace holding the bias feature; never counted nor interacted.
pub const CONSTANT_NAMESPACE: NamespaceIndex = 128;

/// Combinatorial family the interaction generator draws from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    #[default]
    Quadratic,
    Cubic,
}

impl InteractionKind {
    pub fn arity(&self) -> usize {
        match self {
            InteractionKind::Quadratic => 2,
            InteractionKind::Cubic => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Quadratic => "quadratic",
            InteractionKind::Cubic => "cubic",
        }
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn is_allowed_to_remove(ns: NamespaceIndex) -> bool {
    ns != CONSTANT_NAMESPACE
}

/// Observation counts per namespace. Keys only ever get added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceCounter {
    counts: BTreeMap<NamespaceIndex, u64>,
}

impl NamespaceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every namespace present in the group. Returns `true` when at
    /// least one namespace was seen for the first time.
    pub fn observe(&mut self, group: &[Example]) -> bool {
        let mut new_ns_seen = false;
        for example in group {
            for ns in example.namespace_indices() {
                if !is_allowed_to_remove(ns) {
                    continue;
                }
                let count = self.counts.entry(ns).or_insert(0);
                *count += 1;
                if *count == 1 {
                    new_ns_seen = true;
                }
            }
        }
        new_ns_seen
    }

    pub fn count(&self, ns: NamespaceIndex) -> u64 {
        self.counts.get(&ns).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = NamespaceIndex> + '_ {
        self.counts.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NamespaceIndex, u64)> + '_ {
        self.counts.iter().map(|(ns, count)| (*ns, *count))
    }

    /// Every interaction of the family over the observed namespaces, as
    /// ascending combinations with repetition.
    pub fn all_interactions(&self, kind: InteractionKind) -> InteractionList {
        let namespaces: Vec<NamespaceIndex> = self.namespaces().collect();
        let mut out = Vec::new();
        let mut current = Vec::with_capacity(kind.arity());
        combinations_with_repetition(&namespaces, 0, kind.arity(), &mut current, &mut out);
        out
    }
}

fn combinations_with_repetition(
    namespaces: &[NamespaceIndex],
    start: usize,
    remaining: usize,
    current: &mut Interaction,
    out: &mut InteractionList,
) {
    if remaining == 0 {
        out.push(current.clone());
        return;
    }
    for idx in start..namespaces.len() {
        current.push(namespaces[idx]);
        combinations_with_repetition(namespaces, idx, remaining - 1, current, out);
        current.pop();
    }
}

/// Interactions a slot trains with: the full family minus its exclusions.
pub fn generate_interactions(
    kind: InteractionKind,
    counter: &NamespaceCounter,
    exclusions: &ExclusionSet,
) -> InteractionList {
    counter
        .all_interactions(kind)
        .into_iter()
        .filter(|interaction| !exclusions.contains(interaction))
        .collect()
}

/// Renders an interaction list the way namespaces are written on the command
/// line, e.g. `ab,bb`.
pub fn interactions_to_string(interactions: &[Interaction]) -> String {
    interactions
        .iter()
        .map(|interaction| interaction.iter().map(|ns| render_ns(*ns)).collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn exclusions_to_string(exclusions: &ExclusionSet) -> String {
    let list: Vec<Interaction> = exclusions.iter().cloned().collect();
    format!("[{}]", interactions_to_string(&list))
}

fn render_ns(ns: NamespaceIndex) -> String {
    if ns.is_ascii_graphic() {
        (ns as char).to_string()
    } else {
        format!("\\x{ns:02x}")
    }
}
