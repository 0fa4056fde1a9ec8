//! Spawn Probability Engine.
//!
//! Walks item groups, mapgen definitions and palettes from a root and reports
//! every reachable item with its probability of appearing and expected count.
//! Child branches are computed as tables and scaled by their caller.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::config::SpawnOptions;
use crate::constants::{ITEM_GROUP_KIND, MAPGEN_KIND, PALETTE_KIND};
use crate::error::DataError;
use crate::flatten::Flattener;
use crate::record::FlatRecord;

mod context;
mod item_group;
mod mapgen;
mod range;
mod table;

pub use context::{Predicate, SpawnContext};
pub use item_group::{EntryTarget, GroupEntry, GroupKind, ItemGroup};
pub use mapgen::{
    KeyedPlacement, MapgenView, PaletteRef, PaletteView, Placement, PlacementSet,
    PlacementSource, WeightedId,
};
pub use range::{ChargeRange, CountRange, repeat_probability};
pub(crate) use table::sort_entries;
pub use table::{SpawnEntry, SpawnTable};

/// Where a spawn computation starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SpawnRoot {
    ItemGroup(String),
    Mapgen(String),
    Palette(String),
}

impl SpawnRoot {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ItemGroup(_) => ITEM_GROUP_KIND,
            Self::Mapgen(_) => MAPGEN_KIND,
            Self::Palette(_) => PALETTE_KIND,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::ItemGroup(id) | Self::Mapgen(id) | Self::Palette(id) => id,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        scoped_key(self.kind(), self.id())
    }
}

/// A reference that could not be followed during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    /// Label of the record holding the reference.
    pub origin: String,
    pub error: DataError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnReport {
    pub root: String,
    pub entries: Vec<SpawnEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SpawnReport {
    #[must_use]
    pub fn entry(&self, item_id: &str) -> Option<&SpawnEntry> {
        self.entries.iter().find(|entry| entry.item_id == item_id)
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// The entries, or the first diagnostic as an error.
    ///
    /// # Errors
    ///
    /// Returns the first diagnostic recorded during the walk.
    pub fn into_result(self) -> Result<Vec<SpawnEntry>, DataError> {
        match self.diagnostics.into_iter().next() {
            Some(diagnostic) => Err(diagnostic.error),
            None => Ok(self.entries),
        }
    }
}

/// Computes spawn probabilities against one loaded dataset.
#[derive(Debug, Clone, Copy)]
pub struct SpawnEngine<'a> {
    flattener: &'a Flattener,
    options: &'a SpawnOptions,
}

impl<'a> SpawnEngine<'a> {
    #[must_use]
    pub const fn new(flattener: &'a Flattener, options: &'a SpawnOptions) -> Self {
        Self { flattener, options }
    }

    #[must_use]
    pub const fn options(&self) -> &SpawnOptions {
        self.options
    }

    /// Classify `id` as an item group, mapgen or palette, in that order.
    #[must_use]
    pub fn detect_root(&self, id: &str) -> Option<SpawnRoot> {
        if self.flattener.contains(ITEM_GROUP_KIND, id) {
            Some(SpawnRoot::ItemGroup(id.to_string()))
        } else if self.flattener.contains(MAPGEN_KIND, id) {
            Some(SpawnRoot::Mapgen(id.to_string()))
        } else if self.flattener.contains(PALETTE_KIND, id) {
            Some(SpawnRoot::Palette(id.to_string()))
        } else {
            None
        }
    }

    /// Compute the spawn table of whatever `root_id` names.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root, or the root's own flatten error.
    pub fn compute_spawn(
        &self,
        root_id: &str,
        context: &SpawnContext<'_>,
    ) -> Result<SpawnReport, DataError> {
        let root = self
            .detect_root(root_id)
            .ok_or_else(|| DataError::not_found("spawn_root", root_id))?;
        self.compute(&root, context)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the root is missing, or the root's own flatten error.
    pub fn compute(
        &self,
        root: &SpawnRoot,
        context: &SpawnContext<'_>,
    ) -> Result<SpawnReport, DataError> {
        match root {
            SpawnRoot::ItemGroup(id) | SpawnRoot::Palette(id) => {
                self.flattener.get(root.kind(), id)?;
            }
            SpawnRoot::Mapgen(id) => {
                if self.flattener.variants(MAPGEN_KIND, id).is_empty() {
                    return Err(DataError::not_found(MAPGEN_KIND, id));
                }
            }
        }

        let label = root.label();
        let mut walker = SpawnWalker::new(self.flattener, self.options, context);
        let table = match root {
            SpawnRoot::ItemGroup(id) => walker.group_table(id, 0, &label),
            SpawnRoot::Mapgen(id) => walker.mapgen_table(id, 0, &label),
            SpawnRoot::Palette(id) => walker.palette_root_table(id, &label),
        };
        log::debug!(
            "{label}: {} items, {} diagnostics",
            table.len(),
            walker.diagnostics.len()
        );
        Ok(SpawnReport {
            root: label,
            entries: table.into_entries(),
            diagnostics: walker.diagnostics,
        })
    }
}

pub(crate) fn scoped_key(kind: &str, id: &str) -> String {
    format!("{kind}:{id}")
}

/// State of one spawn walk.
struct SpawnWalker<'a, 'c> {
    flattener: &'a Flattener,
    options: &'a SpawnOptions,
    context: &'a SpawnContext<'c>,
    /// Finished tables of records whose walk was not truncated.
    memo: HashMap<String, SpawnTable>,
    active: Vec<String>,
    truncations: usize,
    diagnostics: Vec<Diagnostic>,
    reported: HashSet<Diagnostic>,
}

impl<'a, 'c> SpawnWalker<'a, 'c> {
    fn new(
        flattener: &'a Flattener,
        options: &'a SpawnOptions,
        context: &'a SpawnContext<'c>,
    ) -> Self {
        Self {
            flattener,
            options,
            context,
            memo: HashMap::new(),
            active: Vec::new(),
            truncations: 0,
            diagnostics: Vec::new(),
            reported: HashSet::new(),
        }
    }

    fn report(&mut self, origin: &str, error: DataError) {
        let diagnostic = Diagnostic {
            origin: origin.to_string(),
            error,
        };
        if !self.reported.insert(diagnostic.clone()) {
            return;
        }
        log::warn!("spawn walk from `{origin}`: {}", diagnostic.error);
        self.diagnostics.push(diagnostic);
    }

    fn truncate(&mut self, at: &str, origin: &str) {
        self.truncations += 1;
        self.report(
            origin,
            DataError::MaxDepthExceeded {
                limit: self.options.max_depth,
                at: at.to_string(),
            },
        );
    }

    /// Flatten a referenced record, reporting anything that stops the branch.
    fn lookup(&mut self, kind: &str, id: &str, origin: &str) -> Option<Arc<FlatRecord>> {
        match self.flattener.try_get(kind, id) {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                self.report(origin, DataError::unresolved(kind, id, origin));
                None
            }
            Err(err) => {
                self.report(origin, err);
                None
            }
        }
    }

    /// Run `body` for record `key` unless that would exceed the depth bound or
    /// re-enter a record already on the walk stack.
    fn guarded(
        &mut self,
        key: &str,
        depth: usize,
        origin: &str,
        memoize: bool,
        body: impl FnOnce(&mut Self) -> SpawnTable,
    ) -> SpawnTable {
        if depth > self.options.max_depth || self.active.iter().any(|active| active == key) {
            self.truncate(key, origin);
            return SpawnTable::new();
        }
        self.active.push(key.to_string());
        let truncations = self.truncations;
        let table = body(self);
        self.active.pop();
        if memoize && self.truncations == truncations {
            self.memo.insert(key.to_string(), table.clone());
        }
        table
    }
}
