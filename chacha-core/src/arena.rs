use serde::{Deserialize, Serialize};

use crate::learner::{SlotScalars, SlotView};

/// Weight storage shared by all live slots.
///
/// Each slot owns one contiguous block of `slot_len` weights plus its scalar
/// learner state. Slots are only ever reached through [`WeightArena::view`]
/// and [`WeightArena::view_mut`], so two slots cannot alias the same block;
/// moving a configuration between slots is an explicit copy or swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightArena {
    slot_len: usize,
    weights: Vec<f32>,
    scalars: Vec<SlotScalars>,
}

impl WeightArena {
    pub fn new(slots: usize, slot_len: usize) -> Self {
        Self {
            slot_len,
            weights: vec![0.0; slots * slot_len],
            scalars: vec![SlotScalars::default(); slots],
        }
    }

    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    pub fn slot_count(&self) -> usize {
        self.scalars.len()
    }

    /// Whether the stored buffers agree with the declared shape.
    pub fn is_consistent(&self) -> bool {
        self.weights.len() == self.slot_len * self.scalars.len()
    }

    fn range(&self, slot: usize) -> std::ops::Range<usize> {
        assert!(
            slot < self.slot_count(),
            "slot {slot} outside arena of {} slots",
            self.slot_count()
        );
        let start = slot * self.slot_len;
        start..start + self.slot_len
    }

    pub fn view(&self, slot: usize) -> &[f32] {
        let range = self.range(slot);
        &self.weights[range]
    }

    pub fn view_mut(&mut self, slot: usize) -> SlotView<'_> {
        let range = self.range(slot);
        SlotView {
            slot,
            weights: &mut self.weights[range],
            scalars: &mut self.scalars[slot],
        }
    }

    pub fn scalars(&self, slot: usize) -> &SlotScalars {
        &self.scalars[slot]
    }

    /// Overwrites `to` with the contents of `from`.
    pub fn copy_slot(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let source = self.range(from);
        let target = self.range(to);
        self.weights.copy_within(source, target.start);
        self.scalars[to] = self.scalars[from];
    }

    pub fn swap_slots(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let low_range = self.range(low);
        let high_range = self.range(high);
        let (head, tail) = self.weights.split_at_mut(high_range.start);
        head[low_range].swap_with_slice(&mut tail[..self.slot_len]);
        self.scalars.swap(low, high);
    }

    pub fn clear_slot(&mut self, slot: usize) {
        let range = self.range(slot);
        self.weights[range].fill(0.0);
        self.scalars[slot] = SlotScalars::default();
    }
}
