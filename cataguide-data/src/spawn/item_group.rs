//! Item group records and their probability walk.
use serde::Serialize;
use serde_json::{Map, Value};

use super::context::Predicate;
use super::range::{ChargeRange, CountRange};
use super::table::SpawnTable;
use super::{SpawnWalker, scoped_key};
use crate::constants::{DEFAULT_ENTRY_PROB, ITEM_GROUP_KIND, NULL_ID};
use crate::error::DataError;
use crate::numbers::percent_to_probability;
use crate::record::FlatRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Every entry rolls independently.
    Collection,
    /// Exactly one entry fires, chosen by weight.
    Distribution,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryTarget {
    Item(String),
    Group(String),
    Inline(Box<ItemGroup>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    pub target: EntryTarget,
    /// Percentage in a collection, weight in a distribution.
    pub prob: f64,
    pub count: CountRange,
    pub charges: Option<ChargeRange>,
    pub repeat: CountRange,
    pub container: Option<String>,
    pub contents_items: Vec<String>,
    pub contents_group: Option<String>,
    pub predicates: Vec<Predicate>,
}

impl GroupEntry {
    fn new(target: EntryTarget, prob: f64) -> Self {
        Self {
            target,
            prob,
            count: CountRange::ONE,
            charges: None,
            repeat: CountRange::ONE,
            container: None,
            contents_items: Vec::new(),
            contents_group: None,
            predicates: Vec::new(),
        }
    }

    fn parse(owner: &str, value: &Value) -> Result<Self, DataError> {
        let Value::Object(entry) = value else {
            return Err(DataError::invalid(owner, format!("entry is not an object: {value}")));
        };
        let target = if let Some(item) = entry.get("item") {
            match item {
                Value::String(id) => EntryTarget::Item(id.clone()),
                Value::Object(inline) => {
                    EntryTarget::Inline(Box::new(ItemGroup::from_fields(owner, inline)))
                }
                other => {
                    return Err(DataError::invalid(owner, format!("bad `item` value: {other}")));
                }
            }
        } else if let Some(group) = entry.get("group").and_then(Value::as_str) {
            EntryTarget::Group(group.to_string())
        } else if let Some(items) = entry.get("distribution") {
            EntryTarget::Inline(Box::new(ItemGroup::inline(owner, GroupKind::Distribution, items)))
        } else if let Some(items) = entry.get("collection") {
            EntryTarget::Inline(Box::new(ItemGroup::inline(owner, GroupKind::Collection, items)))
        } else {
            return Err(DataError::invalid(
                owner,
                "entry names no item, group, distribution or collection",
            ));
        };

        let prob = entry
            .get("prob")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_ENTRY_PROB);
        let mut parsed = Self::new(target, prob);
        parsed.count = range_field(entry, "count", "count-min", "count-max");
        parsed.repeat = entry
            .get("repeat")
            .and_then(CountRange::from_value)
            .unwrap_or_default();
        parsed.charges = entry
            .get("charges")
            .and_then(ChargeRange::from_value)
            .or_else(|| split_charges(entry));
        parsed.container = entry
            .get("container-item")
            .and_then(Value::as_str)
            .map(str::to_string);
        parsed.contents_items = match entry.get("contents-item") {
            Some(Value::String(id)) => vec![id.clone()],
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        parsed.contents_group = entry
            .get("contents-group")
            .and_then(Value::as_str)
            .map(str::to_string);
        parsed.predicates = Predicate::from_entry(entry);
        Ok(parsed)
    }

    /// `"id"` or `["id", prob]` from the legacy `items` / `groups` lists.
    fn parse_legacy(owner: &str, value: &Value, group: bool) -> Result<Self, DataError> {
        let target = |id: &str| {
            if group {
                EntryTarget::Group(id.to_string())
            } else {
                EntryTarget::Item(id.to_string())
            }
        };
        match value {
            Value::String(id) => Ok(Self::new(target(id), DEFAULT_ENTRY_PROB)),
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(id), prob] => Ok(Self::new(
                    target(id),
                    prob.as_f64().unwrap_or(DEFAULT_ENTRY_PROB),
                )),
                [Value::String(id)] => Ok(Self::new(target(id), DEFAULT_ENTRY_PROB)),
                _ => Err(DataError::invalid(owner, format!("bad legacy entry: {value}"))),
            },
            Value::Object(_) if !group => Self::parse(owner, value),
            _ => Err(DataError::invalid(owner, format!("bad legacy entry: {value}"))),
        }
    }
}

fn range_field(entry: &Map<String, Value>, field: &str, min: &str, max: &str) -> CountRange {
    if let Some(range) = entry.get(field).and_then(CountRange::from_value) {
        return range;
    }
    let bound = |key: &str| {
        entry
            .get(key)
            .and_then(CountRange::from_value)
            .map(|range| range.min)
    };
    match (bound(min), bound(max)) {
        (None, None) => CountRange::ONE,
        (lo, hi) => {
            let lo = lo.unwrap_or(1);
            CountRange::new(lo, hi.unwrap_or(lo))
        }
    }
}

fn split_charges(entry: &Map<String, Value>) -> Option<ChargeRange> {
    let lo = entry.get("charges-min").and_then(ChargeRange::from_value);
    let hi = entry.get("charges-max").and_then(ChargeRange::from_value);
    match (lo, hi) {
        (Some(lo), Some(hi)) => Some(lo.envelope(hi)),
        (lo, hi) => lo.or(hi),
    }
}

/// A parsed item group, either a corpus record or an inline nested list.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemGroup {
    pub id: String,
    pub kind: GroupKind,
    pub entries: Vec<GroupEntry>,
    pub container: Option<String>,
    /// Entries that could not be parsed.
    pub rejected: Vec<DataError>,
}

impl ItemGroup {
    #[must_use]
    pub fn from_record(record: &FlatRecord) -> Self {
        Self::from_fields(&record.label(), &record.fields)
    }

    /// Parse the group fields found on a record or an inline object.
    #[must_use]
    pub fn from_fields(id: &str, fields: &Map<String, Value>) -> Self {
        let mut rejected = Vec::new();
        let kind = match fields.get("subtype").and_then(Value::as_str) {
            Some("collection") => GroupKind::Collection,
            None | Some("distribution" | "old") => GroupKind::Distribution,
            Some(other) => {
                rejected.push(DataError::invalid(id, format!("unknown subtype `{other}`")));
                GroupKind::Distribution
            }
        };

        let mut entries = Vec::new();
        let mut collect = |result: Result<GroupEntry, DataError>| match result {
            Ok(entry) => entries.push(entry),
            Err(err) => rejected.push(err),
        };
        for value in list(fields, "entries") {
            collect(GroupEntry::parse(id, value));
        }
        for value in list(fields, "items") {
            collect(GroupEntry::parse_legacy(id, value, false));
        }
        for value in list(fields, "groups") {
            collect(GroupEntry::parse_legacy(id, value, true));
        }

        Self {
            id: id.to_string(),
            kind,
            entries,
            container: fields
                .get("container-item")
                .and_then(Value::as_str)
                .map(str::to_string),
            rejected,
        }
    }

    fn inline(owner: &str, kind: GroupKind, items: &Value) -> Self {
        let mut fields = Map::new();
        fields.insert("entries".to_string(), items.clone());
        let mut group = Self::from_fields(&format!("{owner}/inline"), &fields);
        group.kind = kind;
        group
    }
}

fn list<'v>(fields: &'v Map<String, Value>, key: &str) -> &'v [Value] {
    fields
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

impl SpawnWalker<'_, '_> {
    /// Table for one roll of the item group `id`.
    pub(super) fn group_table(&mut self, id: &str, depth: usize, origin: &str) -> SpawnTable {
        let key = scoped_key(ITEM_GROUP_KIND, id);
        if let Some(hit) = self.memo.get(&key) {
            return hit.clone();
        }
        let Some(record) = self.lookup(ITEM_GROUP_KIND, id, origin) else {
            return SpawnTable::new();
        };
        let group = ItemGroup::from_record(&record);
        self.guarded(&key, depth, origin, true, |walker| {
            walker.walk_group(&group, depth)
        })
    }

    pub(super) fn inline_table(
        &mut self,
        group: &ItemGroup,
        depth: usize,
        origin: &str,
    ) -> SpawnTable {
        if depth > self.options.max_depth {
            self.truncate(&group.id, origin);
            return SpawnTable::new();
        }
        self.walk_group(group, depth)
    }

    fn walk_group(&mut self, group: &ItemGroup, depth: usize) -> SpawnTable {
        for error in &group.rejected {
            self.report(&group.id, error.clone());
        }
        let admitted: Vec<&GroupEntry> = group
            .entries
            .iter()
            .filter(|entry| self.context.admits(&entry.predicates))
            .collect();
        if admitted.len() < group.entries.len() {
            log::debug!(
                "{}: {} entries excluded by predicates",
                group.id,
                group.entries.len() - admitted.len()
            );
        }

        let model = self.options.repeat_model;
        let mut table = SpawnTable::new();
        match group.kind {
            GroupKind::Collection => {
                for entry in admitted {
                    let chance = percent_to_probability(entry.prob);
                    if chance <= 0.0 {
                        continue;
                    }
                    let fired = self.entry_table(entry, &group.id, depth);
                    table.merge_independent(fired.scaled(chance).repeated(entry.repeat, model));
                }
            }
            GroupKind::Distribution => {
                let total: f64 = admitted.iter().map(|entry| entry.prob.max(0.0)).sum();
                if total > 0.0 {
                    for entry in admitted {
                        let share = entry.prob.max(0.0) / total;
                        if share <= 0.0 {
                            continue;
                        }
                        let fired = self.entry_table(entry, &group.id, depth);
                        table.merge_exclusive(fired.repeated(entry.repeat, model).scaled(share));
                    }
                }
            }
        }
        if let Some(container) = &group.container {
            table.insert_item(container, 1.0, 1.0, None);
        }
        table
    }

    /// Table for one firing of `entry`.
    fn entry_table(&mut self, entry: &GroupEntry, owner: &str, depth: usize) -> SpawnTable {
        let model = self.options.repeat_model;
        let mut fired = SpawnTable::new();
        match &entry.target {
            EntryTarget::Item(id) if id == NULL_ID => {}
            EntryTarget::Item(id) => {
                let chance = entry.count.nonzero_fraction();
                if chance > 0.0 {
                    fired.insert_item(id, chance, entry.count.midpoint(), entry.charges);
                }
            }
            EntryTarget::Group(id) => {
                let child = self.group_table(id, depth + 1, owner);
                fired.merge_independent(child.repeated(entry.count, model));
            }
            EntryTarget::Inline(group) => {
                let child = self.inline_table(group, depth + 1, owner);
                fired.merge_independent(child.repeated(entry.count, model));
            }
        }
        if let Some(container) = &entry.container {
            fired.insert_item(container, 1.0, 1.0, None);
        }
        for content in &entry.contents_items {
            fired.insert_item(content, 1.0, 1.0, None);
        }
        if let Some(contents) = &entry.contents_group {
            fired.merge_independent(self.group_table(contents, depth + 1, owner));
        }
        fired
    }
}
