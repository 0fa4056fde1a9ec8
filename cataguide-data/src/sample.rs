//! Monte Carlo roller for item groups.
//!
//! Performs concrete spawns with the same entry rules as the analytic walk so
//! the two can be compared.
use std::collections::BTreeMap;

use rand::Rng;

use crate::config::SpawnOptions;
use crate::constants::{ITEM_GROUP_KIND, NULL_ID};
use crate::error::DataError;
use crate::flatten::Flattener;
use crate::numbers::{percent_to_probability, u32_to_f64, u64_to_f64};
use crate::spawn::{
    CountRange, EntryTarget, GroupEntry, GroupKind, ItemGroup, SpawnContext, SpawnEntry,
    sort_entries,
};

pub type ItemCounts = BTreeMap<String, u64>;

#[derive(Debug, Clone, Copy)]
pub struct SpawnSampler<'a> {
    flattener: &'a Flattener,
    options: &'a SpawnOptions,
}

impl<'a> SpawnSampler<'a> {
    #[must_use]
    pub const fn new(flattener: &'a Flattener, options: &'a SpawnOptions) -> Self {
        Self { flattener, options }
    }

    /// One concrete spawn of `group_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root group is missing or cannot be flattened.
    pub fn roll<R: Rng + ?Sized>(
        &self,
        group_id: &str,
        context: &SpawnContext<'_>,
        rng: &mut R,
    ) -> Result<ItemCounts, DataError> {
        let record = self.flattener.get(ITEM_GROUP_KIND, group_id)?;
        let group = ItemGroup::from_record(&record);
        let mut counts = ItemCounts::new();
        self.roll_group(&group, context, rng, 0, &mut counts);
        Ok(counts)
    }

    /// Empirical appearance rate and mean count over `trials` rolls.
    ///
    /// # Errors
    ///
    /// Returns an error if the root group is missing or cannot be flattened.
    pub fn estimate<R: Rng + ?Sized>(
        &self,
        group_id: &str,
        context: &SpawnContext<'_>,
        trials: u32,
        rng: &mut R,
    ) -> Result<Vec<SpawnEntry>, DataError> {
        let mut appearances: BTreeMap<String, u64> = BTreeMap::new();
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for _ in 0..trials {
            for (item, count) in self.roll(group_id, context, rng)? {
                *appearances.entry(item.clone()).or_default() += 1;
                *totals.entry(item).or_default() += count;
            }
        }
        let trials = u32_to_f64(trials.max(1));
        let mut entries: Vec<SpawnEntry> = appearances
            .into_iter()
            .map(|(item_id, seen)| {
                let total = totals.get(&item_id).copied().unwrap_or_default();
                SpawnEntry {
                    probability: u64_to_f64(seen) / trials,
                    expected_count: u64_to_f64(total) / trials,
                    item_id,
                    charges: None,
                }
            })
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn roll_group<R: Rng + ?Sized>(
        &self,
        group: &ItemGroup,
        context: &SpawnContext<'_>,
        rng: &mut R,
        depth: usize,
        counts: &mut ItemCounts,
    ) {
        if depth > self.options.max_depth {
            log::debug!("{}: sampler depth bound reached", group.id);
            return;
        }
        let admitted: Vec<&GroupEntry> = group
            .entries
            .iter()
            .filter(|entry| context.admits(&entry.predicates))
            .collect();
        match group.kind {
            GroupKind::Collection => {
                for entry in admitted {
                    let chance = percent_to_probability(entry.prob);
                    for _ in 0..draw(entry.repeat, rng) {
                        if rng.r#gen::<f64>() < chance {
                            self.fire(entry, context, rng, depth, counts);
                        }
                    }
                }
            }
            GroupKind::Distribution => {
                if let Some(entry) = pick(&admitted, rng) {
                    for _ in 0..draw(entry.repeat, rng) {
                        self.fire(entry, context, rng, depth, counts);
                    }
                }
            }
        }
        if let Some(container) = &group.container {
            add(counts, container, 1);
        }
    }

    fn fire<R: Rng + ?Sized>(
        &self,
        entry: &GroupEntry,
        context: &SpawnContext<'_>,
        rng: &mut R,
        depth: usize,
        counts: &mut ItemCounts,
    ) {
        match &entry.target {
            EntryTarget::Item(id) if id == NULL_ID => {}
            EntryTarget::Item(id) => {
                let amount = draw(entry.count, rng);
                add(counts, id, u64::from(amount));
            }
            EntryTarget::Group(id) => {
                if let Some(group) = self.nested(id) {
                    for _ in 0..draw(entry.count, rng) {
                        self.roll_group(&group, context, rng, depth + 1, counts);
                    }
                }
            }
            EntryTarget::Inline(group) => {
                for _ in 0..draw(entry.count, rng) {
                    self.roll_group(group, context, rng, depth + 1, counts);
                }
            }
        }
        if let Some(container) = &entry.container {
            add(counts, container, 1);
        }
        for content in &entry.contents_items {
            add(counts, content, 1);
        }
        if let Some(contents) = &entry.contents_group
            && let Some(group) = self.nested(contents)
        {
            self.roll_group(&group, context, rng, depth + 1, counts);
        }
    }

    fn nested(&self, id: &str) -> Option<ItemGroup> {
        match self.flattener.try_get(ITEM_GROUP_KIND, id) {
            Ok(Some(record)) => Some(ItemGroup::from_record(&record)),
            Ok(None) => {
                log::debug!("sampler skipped missing group `{id}`");
                None
            }
            Err(err) => {
                log::debug!("sampler skipped group `{id}`: {err}");
                None
            }
        }
    }
}

fn draw<R: Rng + ?Sized>(range: CountRange, rng: &mut R) -> u32 {
    if range.min == range.max {
        range.min
    } else {
        rng.gen_range(range.min..=range.max)
    }
}

fn pick<'e, R: Rng + ?Sized>(entries: &[&'e GroupEntry], rng: &mut R) -> Option<&'e GroupEntry> {
    let total: f64 = entries.iter().map(|entry| entry.prob.max(0.0)).sum();
    if total <= 0.0 {
        return None;
    }
    let mut roll = rng.r#gen::<f64>() * total;
    for entry in entries {
        let weight = entry.prob.max(0.0);
        if roll < weight {
            return Some(*entry);
        }
        roll -= weight;
    }
    entries.iter().rev().find(|entry| entry.prob > 0.0).copied()
}

fn add(counts: &mut ItemCounts, item: &str, amount: u64) {
    if amount > 0 {
        *counts.entry(item.to_string()).or_default() += amount;
    }
}
