//! Per-item probability tallies and the two merge rules.
use std::collections::BTreeMap;

use serde::Serialize;

use super::range::{ChargeRange, CountRange, repeat_probability};
use crate::config::RepeatModel;
use crate::numbers::clamp_probability;

/// One item in a spawn result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnEntry {
    pub item_id: String,
    /// Probability the item appears at least once.
    pub probability: f64,
    pub expected_count: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charges: Option<ChargeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Tally {
    probability: f64,
    expected: f64,
    charges: Option<ChargeRange>,
}

impl Tally {
    fn merge_charges(&mut self, charges: Option<ChargeRange>) {
        self.charges = match (self.charges, charges) {
            (Some(a), Some(b)) => Some(a.envelope(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Item tallies for one branch of a spawn walk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpawnTable {
    tallies: BTreeMap<String, Tally>,
}

impl SpawnTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    #[must_use]
    pub fn probability(&self, item_id: &str) -> Option<f64> {
        self.tallies.get(item_id).map(|tally| tally.probability)
    }

    #[must_use]
    pub fn expected(&self, item_id: &str) -> Option<f64> {
        self.tallies.get(item_id).map(|tally| tally.expected)
    }

    /// Add one item as an independent path.
    pub fn insert_item(
        &mut self,
        item_id: &str,
        probability: f64,
        expected: f64,
        charges: Option<ChargeRange>,
    ) {
        let incoming = Tally {
            probability: clamp_probability(probability),
            expected: expected.max(0.0),
            charges,
        };
        self.merge_tally(item_id.to_string(), incoming, combine_independent);
    }

    /// Merge a branch that may fire together with this one.
    pub fn merge_independent(&mut self, other: Self) {
        for (item_id, tally) in other.tallies {
            self.merge_tally(item_id, tally, combine_independent);
        }
    }

    /// Merge a branch that never fires together with this one.
    pub fn merge_exclusive(&mut self, other: Self) {
        for (item_id, tally) in other.tallies {
            self.merge_tally(item_id, tally, combine_exclusive);
        }
    }

    fn merge_tally(&mut self, item_id: String, incoming: Tally, combine: fn(f64, f64) -> f64) {
        let tally = self.tallies.entry(item_id).or_default();
        tally.probability = clamp_probability(combine(tally.probability, incoming.probability));
        tally.expected += incoming.expected;
        tally.merge_charges(incoming.charges);
    }

    /// Condition the whole branch on an event of probability `factor`.
    #[must_use]
    pub fn scaled(mut self, factor: f64) -> Self {
        let factor = clamp_probability(factor);
        for tally in self.tallies.values_mut() {
            tally.probability *= factor;
            tally.expected *= factor;
        }
        self.tallies.retain(|_, tally| tally.probability > 0.0 || tally.expected > 0.0);
        self
    }

    /// Roll the branch `rolls` times.
    #[must_use]
    pub fn repeated(mut self, rolls: CountRange, model: RepeatModel) -> Self {
        if rolls.is_one() {
            return self;
        }
        let mean = rolls.midpoint();
        for tally in self.tallies.values_mut() {
            tally.probability = repeat_probability(tally.probability, rolls, model);
            tally.expected *= mean;
        }
        self.tallies.retain(|_, tally| tally.probability > 0.0 || tally.expected > 0.0);
        self
    }

    /// Entries by descending probability, then ascending id.
    #[must_use]
    pub fn into_entries(self) -> Vec<SpawnEntry> {
        let mut entries: Vec<SpawnEntry> = self
            .tallies
            .into_iter()
            .map(|(item_id, tally)| SpawnEntry {
                item_id,
                probability: tally.probability,
                expected_count: tally.expected,
                charges: tally.charges,
            })
            .collect();
        sort_entries(&mut entries);
        entries
    }
}

pub(crate) fn sort_entries(entries: &mut [SpawnEntry]) {
    entries.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

fn combine_independent(a: f64, b: f64) -> f64 {
    a + b - a * b
}

fn combine_exclusive(a: f64, b: f64) -> f64 {
    a + b
}
