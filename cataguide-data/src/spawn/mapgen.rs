//! Mapgen and palette placement rules and their probability walk.
use std::collections::HashMap;

use serde_json::{Map, Value};

use super::item_group::ItemGroup;
use super::range::CountRange;
use super::table::SpawnTable;
use super::{SpawnWalker, scoped_key};
use crate::constants::{
    DEFAULT_CHUNK_WEIGHT, DEFAULT_PALETTE_WEIGHT, DEFAULT_PLACEMENT_CHANCE, MAPGEN_KIND, NULL_ID,
    PALETTE_KIND,
};
use crate::error::DataError;
use crate::numbers::percent_to_probability;
use crate::record::FlatRecord;

/// An id with a relative weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedId {
    pub id: String,
    pub weight: f64,
}

/// What a placement puts down when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementSource {
    Group(String),
    InlineGroup(Box<ItemGroup>),
    Item { id: String, amount: CountRange },
    /// One nested mapgen chunk picked by weight.
    Chunks(Vec<WeightedId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub source: PlacementSource,
    /// Probability per roll.
    pub chance: f64,
    pub repeat: CountRange,
}

/// A placement bound to a map symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedPlacement {
    pub symbol: char,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaletteRef {
    Id(String),
    Distribution(Vec<WeightedId>),
}

/// Symbol-keyed placements and palette references of one object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlacementSet {
    pub keyed: Vec<KeyedPlacement>,
    pub palettes: Vec<PaletteRef>,
    pub rejected: Vec<DataError>,
}

impl PlacementSet {
    #[must_use]
    pub fn parse(owner: &str, object: &Map<String, Value>) -> Self {
        let mut set = Self::default();
        for field in ["items", "item"] {
            let Some(Value::Object(symbols)) = object.get(field) else {
                continue;
            };
            for (key, spec) in symbols {
                let Some(symbol) = set.symbol(owner, key) else {
                    continue;
                };
                for spec in one_or_many(spec) {
                    let parsed = if field == "items" {
                        group_placement(owner, spec, "item")
                    } else {
                        item_placement(owner, spec)
                    };
                    set.push(symbol, parsed);
                }
            }
        }
        if let Some(Value::Object(symbols)) = object.get("sealed_item") {
            for (key, spec) in symbols {
                let Some(symbol) = set.symbol(owner, key) else {
                    continue;
                };
                if let Some(item) = spec.get("item") {
                    set.push(symbol, item_placement(owner, item));
                }
                if let Some(items) = spec.get("items") {
                    set.push(symbol, group_placement(owner, items, "item"));
                }
            }
        }
        if let Some(Value::Object(symbols)) = object.get("nested") {
            for (key, spec) in symbols {
                let Some(symbol) = set.symbol(owner, key) else {
                    continue;
                };
                set.push(symbol, nested_placement(owner, spec));
            }
        }
        for reference in object
            .get("palettes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            match palette_ref(owner, reference, object) {
                Ok(parsed) => set.palettes.push(parsed),
                Err(err) => set.rejected.push(err),
            }
        }
        set
    }

    fn symbol(&mut self, owner: &str, key: &str) -> Option<char> {
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(symbol), None) => Some(symbol),
            _ => {
                self.rejected
                    .push(DataError::invalid(owner, format!("`{key}` is not a single map symbol")));
                None
            }
        }
    }

    fn push(&mut self, symbol: char, parsed: Result<Placement, DataError>) {
        match parsed {
            Ok(placement) => self.keyed.push(KeyedPlacement { symbol, placement }),
            Err(err) => self.rejected.push(err),
        }
    }
}

fn one_or_many(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    }
}

fn chance_and_repeat(spec: &Value) -> (f64, CountRange) {
    let chance = spec
        .get("chance")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_PLACEMENT_CHANCE);
    let repeat = spec
        .get("repeat")
        .and_then(CountRange::from_value)
        .unwrap_or_default();
    (percent_to_probability(chance), repeat)
}

fn group_placement(owner: &str, spec: &Value, key: &str) -> Result<Placement, DataError> {
    let source = match spec.get(key) {
        Some(Value::String(id)) => PlacementSource::Group(id.clone()),
        Some(Value::Object(inline)) => {
            PlacementSource::InlineGroup(Box::new(ItemGroup::from_fields(owner, inline)))
        }
        _ => {
            return Err(DataError::invalid(owner, format!("placement names no group: {spec}")));
        }
    };
    let (chance, repeat) = chance_and_repeat(spec);
    Ok(Placement {
        source,
        chance,
        repeat,
    })
}

fn item_placement(owner: &str, spec: &Value) -> Result<Placement, DataError> {
    let Some(id) = spec.get("item").and_then(Value::as_str) else {
        return Err(DataError::invalid(owner, format!("placement names no item: {spec}")));
    };
    let amount = spec
        .get("amount")
        .or_else(|| spec.get("count"))
        .and_then(CountRange::from_value)
        .unwrap_or_default();
    let (chance, repeat) = chance_and_repeat(spec);
    Ok(Placement {
        source: PlacementSource::Item {
            id: id.to_string(),
            amount,
        },
        chance,
        repeat,
    })
}

fn loot_placement(owner: &str, spec: &Value) -> Result<Placement, DataError> {
    if spec.get("group").is_some() {
        group_placement(owner, spec, "group")
    } else {
        item_placement(owner, spec)
    }
}

fn nested_placement(owner: &str, spec: &Value) -> Result<Placement, DataError> {
    let Some(chunks) = spec.get("chunks").and_then(Value::as_array) else {
        return Err(DataError::invalid(owner, format!("nested placement has no chunks: {spec}")));
    };
    let chunks = weighted_ids(owner, chunks, DEFAULT_CHUNK_WEIGHT)?;
    let (chance, repeat) = chance_and_repeat(spec);
    Ok(Placement {
        source: PlacementSource::Chunks(chunks),
        chance,
        repeat,
    })
}

fn weighted_ids(owner: &str, values: &[Value], default: f64) -> Result<Vec<WeightedId>, DataError> {
    values
        .iter()
        .map(|value| match value {
            Value::String(id) => Ok(WeightedId {
                id: id.clone(),
                weight: default,
            }),
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(id), weight] => Ok(WeightedId {
                    id: id.clone(),
                    weight: weight.as_f64().unwrap_or(default),
                }),
                _ => Err(DataError::invalid(owner, format!("bad weighted id: {value}"))),
            },
            _ => Err(DataError::invalid(owner, format!("bad weighted id: {value}"))),
        })
        .collect()
}

fn palette_ref(
    owner: &str,
    reference: &Value,
    object: &Map<String, Value>,
) -> Result<PaletteRef, DataError> {
    match reference {
        Value::String(id) => Ok(PaletteRef::Id(id.clone())),
        Value::Object(spec) => {
            if let Some(options) = spec.get("distribution").and_then(Value::as_array) {
                return weighted_ids(owner, options, DEFAULT_PALETTE_WEIGHT)
                    .map(PaletteRef::Distribution);
            }
            if let Some(param) = spec.get("param").and_then(Value::as_str) {
                let default = object
                    .get("parameters")
                    .and_then(|parameters| parameters.get(param))
                    .and_then(|parameter| parameter.get("default"));
                match default {
                    Some(Value::String(id)) => return Ok(PaletteRef::Id(id.clone())),
                    Some(default) => {
                        if let Some(options) = default.get("distribution").and_then(Value::as_array)
                        {
                            return weighted_ids(owner, options, DEFAULT_PALETTE_WEIGHT)
                                .map(PaletteRef::Distribution);
                        }
                    }
                    None => {}
                }
                if let Some(fallback) = spec.get("fallback").and_then(Value::as_str) {
                    return Ok(PaletteRef::Id(fallback.to_string()));
                }
                return Err(DataError::invalid(
                    owner,
                    format!("palette parameter `{param}` has no default or fallback"),
                ));
            }
            Err(DataError::invalid(owner, format!("bad palette reference: {reference}")))
        }
        _ => Err(DataError::invalid(owner, format!("bad palette reference: {reference}"))),
    }
}

/// One mapgen record, ready to walk.
#[derive(Debug, Clone, PartialEq)]
pub struct MapgenView {
    pub label: String,
    pub weight: f64,
    pub rows: Vec<String>,
    pub placements: PlacementSet,
    pub positional: Vec<Placement>,
}

impl MapgenView {
    #[must_use]
    pub fn from_record(record: &FlatRecord, default_weight: f64) -> Self {
        let label = record.label();
        let empty = Map::new();
        let object = record.object_field("object").unwrap_or(&empty);
        let rows = object
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let mut placements = PlacementSet::parse(&label, object);

        let mut positional = Vec::new();
        let parsers: [(&str, fn(&str, &Value) -> Result<Placement, DataError>); 4] = [
            ("place_items", |owner, spec| group_placement(owner, spec, "item")),
            ("place_item", item_placement),
            ("place_loot", loot_placement),
            ("place_nested", nested_placement),
        ];
        for (field, parse) in parsers {
            for spec in object
                .get(field)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                match parse(&label, spec) {
                    Ok(placement) => positional.push(placement),
                    Err(err) => placements.rejected.push(err),
                }
            }
        }

        Self {
            weight: record.f64_field("weight").unwrap_or(default_weight),
            label,
            rows,
            placements,
            positional,
        }
    }

    #[must_use]
    pub fn symbol_counts(&self) -> HashMap<char, u32> {
        let mut counts = HashMap::new();
        for symbol in self.rows.iter().flat_map(|row| row.chars()) {
            *counts.entry(symbol).or_insert(0) += 1;
        }
        counts
    }
}

/// One palette record, ready to walk.
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteView {
    pub label: String,
    pub placements: PlacementSet,
}

impl PaletteView {
    #[must_use]
    pub fn from_record(record: &FlatRecord) -> Self {
        let label = record.label();
        let placements = PlacementSet::parse(&label, &record.fields);
        Self { label, placements }
    }
}

/// How often each symbol occurs in the layout being filled.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum SymbolCounts {
    Rows(HashMap<char, u32>),
    /// Walking a palette on its own: every symbol is placed once.
    EachOnce,
}

impl SymbolCounts {
    fn get(&self, symbol: char) -> u32 {
        match self {
            Self::Rows(counts) => counts.get(&symbol).copied().unwrap_or(0),
            Self::EachOnce => 1,
        }
    }
}

fn total_weight(options: &[WeightedId]) -> f64 {
    options.iter().map(|option| option.weight.max(0.0)).sum()
}

impl SpawnWalker<'_, '_> {
    /// Weighted mix of every variant of mapgen `id`.
    pub(super) fn mapgen_table(&mut self, id: &str, depth: usize, origin: &str) -> SpawnTable {
        let key = scoped_key(MAPGEN_KIND, id);
        if let Some(hit) = self.memo.get(&key) {
            return hit.clone();
        }
        let handles = self.flattener.variants(MAPGEN_KIND, id).to_vec();
        if handles.is_empty() {
            self.report(origin, DataError::unresolved(MAPGEN_KIND, id, origin));
            return SpawnTable::new();
        }
        let mut views = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.flattener.flatten(handle) {
                Ok(record) => views.push(MapgenView::from_record(
                    &record,
                    self.options.default_mapgen_weight,
                )),
                Err(err) => self.report(origin, err),
            }
        }
        self.guarded(&key, depth, origin, true, |walker| {
            let total: f64 = views.iter().map(|view| view.weight.max(0.0)).sum();
            let mut table = SpawnTable::new();
            if total <= 0.0 {
                return table;
            }
            for view in &views {
                let share = view.weight.max(0.0) / total;
                if share > 0.0 {
                    table.merge_exclusive(walker.layout_table(view, depth).scaled(share));
                }
            }
            table
        })
    }

    fn layout_table(&mut self, view: &MapgenView, depth: usize) -> SpawnTable {
        let counts = SymbolCounts::Rows(view.symbol_counts());
        let mut table = self.placement_set_table(&view.label, &view.placements, &counts, depth);
        for placement in &view.positional {
            table.merge_independent(self.placement_table(&view.label, placement, 1, depth));
        }
        table
    }

    /// Walk a palette as a spawn root.
    pub(super) fn palette_root_table(&mut self, id: &str, origin: &str) -> SpawnTable {
        self.palette_table(id, &SymbolCounts::EachOnce, 0, origin)
    }

    fn palette_table(
        &mut self,
        id: &str,
        counts: &SymbolCounts,
        depth: usize,
        origin: &str,
    ) -> SpawnTable {
        let Some(record) = self.lookup(PALETTE_KIND, id, origin) else {
            return SpawnTable::new();
        };
        let view = PaletteView::from_record(&record);
        let key = scoped_key(PALETTE_KIND, id);
        // Palette tables depend on the caller's symbol counts, so they are not memoized.
        self.guarded(&key, depth, origin, false, |walker| {
            walker.placement_set_table(&view.label, &view.placements, counts, depth)
        })
    }

    fn placement_set_table(
        &mut self,
        owner: &str,
        set: &PlacementSet,
        counts: &SymbolCounts,
        depth: usize,
    ) -> SpawnTable {
        for error in &set.rejected {
            self.report(owner, error.clone());
        }
        let mut table = SpawnTable::new();
        for keyed in &set.keyed {
            let occurrences = counts.get(keyed.symbol);
            if occurrences > 0 {
                let placed = self.placement_table(owner, &keyed.placement, occurrences, depth);
                table.merge_independent(placed);
            }
        }
        for reference in &set.palettes {
            table.merge_independent(self.palette_ref_table(owner, reference, counts, depth));
        }
        table
    }

    fn palette_ref_table(
        &mut self,
        owner: &str,
        reference: &PaletteRef,
        counts: &SymbolCounts,
        depth: usize,
    ) -> SpawnTable {
        match reference {
            PaletteRef::Id(id) => self.palette_table(id, counts, depth + 1, owner),
            PaletteRef::Distribution(options) => {
                let total = total_weight(options);
                let mut table = SpawnTable::new();
                if total <= 0.0 {
                    return table;
                }
                for option in options {
                    let share = option.weight.max(0.0) / total;
                    if share > 0.0 {
                        let chosen = self.palette_table(&option.id, counts, depth + 1, owner);
                        table.merge_exclusive(chosen.scaled(share));
                    }
                }
                table
            }
        }
    }

    /// Table for a placement rolled at `occurrences` spots.
    fn placement_table(
        &mut self,
        owner: &str,
        placement: &Placement,
        occurrences: u32,
        depth: usize,
    ) -> SpawnTable {
        let model = self.options.repeat_model;
        let fired = match &placement.source {
            PlacementSource::Group(id) => self.group_table(id, depth + 1, owner),
            PlacementSource::InlineGroup(group) => self.inline_table(group, depth + 1, owner),
            PlacementSource::Item { id, amount } => {
                let mut table = SpawnTable::new();
                if id != NULL_ID {
                    table.insert_item(id, amount.nonzero_fraction(), amount.midpoint(), None);
                }
                table
            }
            PlacementSource::Chunks(chunks) => self.chunks_table(owner, chunks, depth),
        };
        fired
            .scaled(placement.chance)
            .repeated(placement.repeat, model)
            .repeated(CountRange::exact(occurrences), model)
    }

    fn chunks_table(&mut self, owner: &str, chunks: &[WeightedId], depth: usize) -> SpawnTable {
        let total = total_weight(chunks);
        let mut table = SpawnTable::new();
        if total <= 0.0 {
            return table;
        }
        for chunk in chunks {
            let share = chunk.weight.max(0.0) / total;
            if share <= 0.0 || chunk.id == NULL_ID {
                continue;
            }
            let nested = self.mapgen_table(&chunk.id, depth + 1, owner);
            table.merge_exclusive(nested.scaled(share));
        }
        table
    }
}
