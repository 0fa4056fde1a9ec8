//! Resolution graph: the id index over the record arena and the memoized
//! copy-from flattening built on top of it.
//!
//! Records live in an arena addressed by [`RecordHandle`]; ids and aliases map
//! to handles per kind. Each arena slot owns a write-once cache cell, so a
//! record is folded at most once per loaded corpus and the cache needs no
//! locking.
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use serde_json::{Map, Value};
use smallvec::{SmallVec, smallvec};

use crate::config::{DuplicatePolicy, LoadOptions};
use crate::corpus::{Corpus, CorpusMeta};
use crate::error::DataError;
use crate::merge::MergeTable;
use crate::record::{FlatRecord, Record, RecordHandle};

type Handles = SmallVec<[RecordHandle; 1]>;

#[derive(Debug, Default)]
struct KindIndex {
    ids: HashMap<String, Handles>,
    handles: Vec<RecordHandle>,
}

/// Counters describing how a corpus was indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadReport {
    pub indexed: usize,
    /// Records dropped because they were not tagged objects.
    pub skipped: usize,
    /// Ids taken over by a later record under `LastWins`.
    pub overridden: usize,
}

/// Cache counters, readable at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FlattenStats {
    /// Copy-from links followed while building chains.
    pub ancestors_walked: u64,
    /// `flatten` calls answered straight from the cache.
    pub cache_hits: u64,
    /// Records currently materialized.
    pub cached: usize,
}

/// A structural error found while validating the whole corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub record: String,
    pub error: DataError,
}

/// Owns one loaded corpus and its flatten cache.
#[derive(Debug)]
pub struct Flattener {
    records: Vec<Record>,
    cache: Vec<OnceLock<Arc<FlatRecord>>>,
    index: HashMap<String, KindIndex>,
    /// Record that held an id before a later record took it over.
    predecessors: HashMap<RecordHandle, RecordHandle>,
    merge: MergeTable,
    meta: CorpusMeta,
    report: LoadReport,
    ancestors_walked: AtomicU64,
    cache_hits: AtomicU64,
}

impl Flattener {
    fn empty(merge: MergeTable, meta: CorpusMeta) -> Self {
        Self {
            records: Vec::new(),
            cache: Vec::new(),
            index: HashMap::new(),
            predecessors: HashMap::new(),
            merge,
            meta,
            report: LoadReport::default(),
            ancestors_walked: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Index a sequence of raw records.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` when the policy is strict and two records of one
    /// non-variant kind share an id.
    pub fn load(records: Vec<Value>, options: &LoadOptions) -> Result<Self, DataError> {
        Self::from_corpus(Corpus::from_records(records), options)
    }

    /// Index a corpus envelope, keeping its build metadata.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` when the policy is strict and two records of one
    /// non-variant kind share an id.
    pub fn from_corpus(corpus: Corpus, options: &LoadOptions) -> Result<Self, DataError> {
        let mut flattener = Self::empty(options.merge_table(), corpus.meta);
        for value in corpus.data {
            match Record::from_value(value) {
                Ok(record) => flattener.insert(record, options)?,
                Err(err) => {
                    log::warn!("skipping corpus entry: {err}");
                    flattener.report.skipped += 1;
                }
            }
        }
        log::debug!(
            "indexed {} records ({} skipped, {} overridden)",
            flattener.report.indexed,
            flattener.report.skipped,
            flattener.report.overridden
        );
        Ok(flattener)
    }

    fn insert(&mut self, record: Record, options: &LoadOptions) -> Result<(), DataError> {
        let handle = RecordHandle::new(self.records.len());
        let variant = options.is_variant_kind(&record.kind);
        let kind_index = self.index.entry(record.kind.clone()).or_default();

        for id in &record.ids {
            match kind_index.ids.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(smallvec![handle]);
                }
                Entry::Occupied(mut slot) if variant => slot.get_mut().push(handle),
                Entry::Occupied(mut slot) => match options.duplicate_policy {
                    DuplicatePolicy::Strict => {
                        return Err(DataError::DuplicateId {
                            kind: record.kind.clone(),
                            id: id.clone(),
                        });
                    }
                    DuplicatePolicy::LastWins => {
                        log::debug!("{}:{id} redefined by a later record", record.kind);
                        if let Some(&previous) = slot.get().first() {
                            self.predecessors.entry(handle).or_insert(previous);
                        }
                        *slot.get_mut() = smallvec![handle];
                        self.report.overridden += 1;
                    }
                },
            }
        }

        kind_index.handles.push(handle);
        self.records.push(record);
        self.cache.push(OnceLock::new());
        self.report.indexed += 1;
        Ok(())
    }

    #[must_use]
    pub const fn meta(&self) -> &CorpusMeta {
        &self.meta
    }

    #[must_use]
    pub const fn load_report(&self) -> LoadReport {
        self.report
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Kinds present in the corpus, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.index.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Record counts per kind, sorted by kind.
    #[must_use]
    pub fn kind_counts(&self) -> BTreeMap<&str, usize> {
        self.index
            .iter()
            .map(|(kind, index)| (kind.as_str(), index.handles.len()))
            .collect()
    }

    #[must_use]
    pub fn record(&self, handle: RecordHandle) -> Option<&Record> {
        self.records.get(handle.index())
    }

    /// Resolve an id or alias to its record handle.
    #[must_use]
    pub fn handle(&self, kind: &str, id: &str) -> Option<RecordHandle> {
        self.variants(kind, id).first().copied()
    }

    /// Every record answering to `id`; more than one only for variant kinds.
    #[must_use]
    pub fn variants(&self, kind: &str, id: &str) -> &[RecordHandle] {
        self.index
            .get(kind)
            .and_then(|index| index.ids.get(id))
            .map(|handles| handles.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, kind: &str, id: &str) -> bool {
        !self.variants(kind, id).is_empty()
    }

    /// All ids of a kind (aliases included), sorted.
    #[must_use]
    pub fn ids(&self, kind: &str) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .index
            .get(kind)
            .map(|index| index.ids.keys().map(String::as_str).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Resolve and flatten one record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or the structural error met while
    /// folding its chain.
    pub fn get(&self, kind: &str, id: &str) -> Result<Arc<FlatRecord>, DataError> {
        let handle = self
            .handle(kind, id)
            .ok_or_else(|| DataError::not_found(kind, id))?;
        self.flatten(handle)
    }

    /// Like [`Flattener::get`], but a missing id is `None` rather than an error.
    ///
    /// # Errors
    ///
    /// Returns the structural error met while folding the record's chain.
    pub fn try_get(&self, kind: &str, id: &str) -> Result<Option<Arc<FlatRecord>>, DataError> {
        self.handle(kind, id).map(|handle| self.flatten(handle)).transpose()
    }

    /// Every instantiable record of a kind, flattened, in corpus order.
    ///
    /// Abstract templates and records whose ids were all taken over by later
    /// definitions are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first structural error met while flattening.
    pub fn by_type(&self, kind: &str) -> Result<Vec<Arc<FlatRecord>>, DataError> {
        let Some(index) = self.index.get(kind) else {
            return Ok(Vec::new());
        };
        index
            .handles
            .iter()
            .copied()
            .filter(|&handle| self.is_enumerable(index, handle))
            .map(|handle| self.flatten(handle))
            .collect()
    }

    fn is_enumerable(&self, index: &KindIndex, handle: RecordHandle) -> bool {
        let record = &self.records[handle.index()];
        if record.is_abstract {
            return false;
        }
        record.ids.is_empty()
            || record.ids.iter().any(|id| {
                index
                    .ids
                    .get(id)
                    .is_some_and(|handles| handles.contains(&handle))
            })
    }

    /// Fold a record's copy-from chain and memoize every link of it.
    ///
    /// # Errors
    ///
    /// Returns `CyclicInheritance` when a record reappears in its own chain and
    /// `UnresolvedReference` when a parent id is absent from the corpus.
    pub fn flatten(&self, handle: RecordHandle) -> Result<Arc<FlatRecord>, DataError> {
        let slot = self.cache.get(handle.index()).ok_or_else(|| {
            DataError::not_found("record", &format!("#{}", handle.index()))
        })?;
        if let Some(hit) = slot.get() {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(hit));
        }

        let mut chain: SmallVec<[RecordHandle; 8]> = smallvec![handle];
        let mut base: Option<Arc<FlatRecord>> = None;
        let mut cursor = handle;
        while let Some(parent_id) = self.records[cursor.index()].copy_from.as_deref() {
            let parent = self.resolve_parent(cursor, parent_id)?;
            if chain.contains(&parent) {
                return Err(self.cycle_error(&chain, parent));
            }
            self.ancestors_walked.fetch_add(1, Ordering::Relaxed);
            if let Some(cached) = self.cache[parent.index()].get() {
                base = Some(Arc::clone(cached));
                break;
            }
            chain.push(parent);
            cursor = parent;
        }

        let empty = Map::new();
        let mut inherited = base;
        for &link in chain.iter().rev() {
            let parent_fields = inherited.as_ref().map_or(&empty, |flat| &flat.fields);
            let flat = self.materialize(link, parent_fields);
            inherited = Some(Arc::clone(
                self.cache[link.index()].get_or_init(|| Arc::new(flat)),
            ));
        }
        inherited.ok_or_else(|| DataError::not_found("record", &format!("#{}", handle.index())))
    }

    fn resolve_parent(
        &self,
        child: RecordHandle,
        parent_id: &str,
    ) -> Result<RecordHandle, DataError> {
        let record = &self.records[child.index()];
        // A redefinition copying from its own id inherits from the record it replaced.
        if record.ids.iter().any(|id| id == parent_id)
            && let Some(&previous) = self.predecessors.get(&child)
        {
            return Ok(previous);
        }
        self.handle(&record.kind, parent_id)
            .ok_or_else(|| DataError::unresolved(&record.kind, parent_id, &record.label()))
    }

    fn cycle_error(&self, chain: &[RecordHandle], repeated: RecordHandle) -> DataError {
        let label = |handle: RecordHandle| {
            self.records[handle.index()]
                .primary_id()
                .unwrap_or("<anonymous>")
                .to_string()
        };
        let mut names: Vec<String> = chain.iter().copied().map(label).collect();
        names.push(label(repeated));
        DataError::CyclicInheritance {
            kind: self.records[repeated.index()].kind.clone(),
            chain: names,
        }
    }

    fn materialize(&self, handle: RecordHandle, inherited: &Map<String, Value>) -> FlatRecord {
        let record = &self.records[handle.index()];
        FlatRecord {
            handle,
            kind: record.kind.clone(),
            type_name: record.type_name.clone(),
            ids: record.ids.clone(),
            is_abstract: record.is_abstract,
            fields: self.merge.apply(inherited, &record.fields),
        }
    }

    /// Flatten every record, collecting each structural error instead of
    /// stopping at the first.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        (0..self.records.len())
            .map(RecordHandle::new)
            .filter_map(|handle| {
                self.flatten(handle).err().map(|error| ValidationIssue {
                    record: self.records[handle.index()].label(),
                    error,
                })
            })
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> FlattenStats {
        FlattenStats {
            ancestors_walked: self.ancestors_walked.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cached: self.cache.iter().filter(|slot| slot.get().is_some()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergeRule;
    use serde_json::json;

    fn load(records: Vec<Value>) -> Flattener {
        Flattener::load(records, &LoadOptions::default()).unwrap()
    }

    #[test]
    fn child_overrides_and_inherits() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "base", "hp": 10, "flags": ["x"]}),
            json!({"type": "GENERIC", "id": "child", "copy-from": "base", "hp": 20}),
        ]);
        let child = flattener.get("item", "child").unwrap();
        assert_eq!(child.fields["hp"], 20);
        assert_eq!(child.fields["flags"], json!(["x"]));
        assert_eq!(child.fields["id"], "child");
    }

    #[test]
    fn second_flatten_is_a_cache_hit() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "root", "w": 1}),
            json!({"type": "GENERIC", "id": "mid", "copy-from": "root"}),
            json!({"type": "GENERIC", "id": "leaf", "copy-from": "mid"}),
        ]);
        let first = flattener.get("item", "leaf").unwrap();
        let walked = flattener.stats().ancestors_walked;
        assert_eq!(walked, 2);
        assert_eq!(flattener.stats().cached, 3);

        let second = flattener.get("item", "leaf").unwrap();
        assert_eq!(first, second);
        assert_eq!(flattener.stats().ancestors_walked, walked);
        assert_eq!(flattener.stats().cache_hits, 1);

        // Ancestors were memoized along the way.
        flattener.get("item", "mid").unwrap();
        assert_eq!(flattener.stats().ancestors_walked, walked);
    }

    #[test]
    fn walk_stops_at_cached_ancestor() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "root"}),
            json!({"type": "GENERIC", "id": "mid", "copy-from": "root"}),
            json!({"type": "GENERIC", "id": "leaf", "copy-from": "mid"}),
        ]);
        flattener.get("item", "mid").unwrap();
        assert_eq!(flattener.stats().ancestors_walked, 1);
        flattener.get("item", "leaf").unwrap();
        assert_eq!(flattener.stats().ancestors_walked, 2);
    }

    #[test]
    fn two_record_cycle_fails_for_both_ids() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "a", "copy-from": "b"}),
            json!({"type": "GENERIC", "id": "b", "copy-from": "a"}),
        ]);
        for id in ["a", "b"] {
            let err = flattener.get("item", id).unwrap_err();
            assert!(matches!(err, DataError::CyclicInheritance { .. }), "{id}: {err}");
        }
        assert_eq!(flattener.stats().cached, 0);
    }

    #[test]
    fn self_copy_without_predecessor_is_a_cycle() {
        let flattener = load(vec![json!({"type": "GENERIC", "id": "loop", "copy-from": "loop"})]);
        assert!(matches!(
            flattener.get("item", "loop"),
            Err(DataError::CyclicInheritance { .. })
        ));
    }

    #[test]
    fn redefinition_copies_from_the_record_it_replaced() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "rock", "weight": 1, "name": "rock"}),
            json!({"type": "GENERIC", "id": "rock", "copy-from": "rock", "weight": 3}),
        ]);
        let rock = flattener.get("item", "rock").unwrap();
        assert_eq!(rock.fields["weight"], 3);
        assert_eq!(rock.fields["name"], "rock");
        assert_eq!(flattener.by_type("item").unwrap().len(), 1);
        assert_eq!(flattener.load_report().overridden, 1);
    }

    #[test]
    fn repeated_redefinitions_chain_through_each_predecessor() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "rock", "weight": 1, "volume": 3}),
            json!({"type": "GENERIC", "id": "rock", "copy-from": "rock", "weight": 2}),
            json!({"type": "GENERIC", "id": "rock", "copy-from": "rock", "material": "stone"}),
        ]);
        let rock = flattener.get("item", "rock").unwrap();
        assert_eq!(rock.fields["weight"], 2);
        assert_eq!(rock.fields["volume"], 3);
        assert_eq!(rock.fields["material"], "stone");
        assert_eq!(rock.handle, RecordHandle::new(2));
        assert!(flattener.validate().is_empty());
        assert_eq!(flattener.load_report().overridden, 2);
    }

    #[test]
    fn first_definition_copying_itself_is_still_a_cycle() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "rock", "copy-from": "rock"}),
            json!({"type": "GENERIC", "id": "rock", "copy-from": "rock", "weight": 2}),
        ]);
        let issues = flattener.validate();
        assert_eq!(issues.len(), 2);
        assert!(
            issues
                .iter()
                .all(|issue| matches!(issue.error, DataError::CyclicInheritance { .. }))
        );
    }

    #[test]
    fn missing_parent_is_unresolved() {
        let flattener = load(vec![json!({"type": "GENERIC", "id": "x", "copy-from": "ghost"})]);
        let err = flattener.get("item", "x").unwrap_err();
        assert_eq!(err, DataError::unresolved("item", "ghost", "item:x"));
    }

    #[test]
    fn abstract_templates_resolve_but_do_not_enumerate() {
        let flattener = load(vec![
            json!({"type": "TOOL", "abstract": "tool_base", "weight": 5}),
            json!({"type": "TOOL", "id": "hammer", "copy-from": "tool_base"}),
        ]);
        let listed = flattener.by_type("item").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), Some("hammer"));
        assert_eq!(listed[0].fields["weight"], 5);
        assert!(!listed[0].fields.contains_key("abstract"));
        assert!(flattener.get("item", "tool_base").unwrap().is_abstract);
    }

    #[test]
    fn item_types_inherit_across_type_names() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "cloth", "material": ["cotton"]}),
            json!({"type": "ARMOR", "id": "shirt", "copy-from": "cloth"}),
        ]);
        let shirt = flattener.get("item", "shirt").unwrap();
        assert_eq!(shirt.type_name, "ARMOR");
        assert_eq!(shirt.fields["material"], json!(["cotton"]));
        assert_eq!(shirt.fields["type"], "ARMOR");
    }

    #[test]
    fn aliases_resolve_to_the_same_record() {
        let flattener = load(vec![json!({"type": "GENERIC", "id": ["rock", "stone"]})]);
        let by_primary = flattener.get("item", "rock").unwrap();
        let by_alias = flattener.get("item", "stone").unwrap();
        assert!(Arc::ptr_eq(&by_primary, &by_alias));
    }

    #[test]
    fn strict_policy_rejects_duplicates() {
        let records = vec![
            json!({"type": "GENERIC", "id": "rock"}),
            json!({"type": "GENERIC", "id": "rock"}),
        ];
        let err = Flattener::load(records, &LoadOptions::strict()).unwrap_err();
        assert_eq!(
            err,
            DataError::DuplicateId {
                kind: "item".to_string(),
                id: "rock".to_string()
            }
        );
    }

    #[test]
    fn last_wins_policy_keeps_the_later_record() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "rock", "weight": 1}),
            json!({"type": "GENERIC", "id": "rock", "weight": 2}),
        ]);
        assert_eq!(flattener.get("item", "rock").unwrap().fields["weight"], 2);
        assert_eq!(flattener.by_type("item").unwrap().len(), 1);
    }

    #[test]
    fn variant_kinds_keep_every_record() {
        let flattener = Flattener::load(
            vec![
                json!({"type": "mapgen", "om_terrain": "house", "weight": 100}),
                json!({"type": "mapgen", "om_terrain": "house", "weight": 300}),
            ],
            &LoadOptions::strict(),
        )
        .unwrap();
        assert_eq!(flattener.variants("mapgen", "house").len(), 2);
        assert_eq!(flattener.by_type("mapgen").unwrap().len(), 2);
    }

    #[test]
    fn cumulative_field_appends_in_order() {
        let options = LoadOptions::default().with_merge_rule(
            "flags_add",
            MergeRule::Append {
                into: "flags".to_string(),
            },
        );
        let flattener = Flattener::load(
            vec![
                json!({"type": "GENERIC", "id": "base", "flags": ["x"]}),
                json!({"type": "GENERIC", "id": "child", "copy-from": "base", "flags_add": ["y"]}),
            ],
            &options,
        )
        .unwrap();
        let child = flattener.get("item", "child").unwrap();
        assert_eq!(child.fields["flags"], json!(["x", "y"]));
    }

    #[test]
    fn untyped_entries_are_skipped_and_counted() {
        let flattener = load(vec![
            json!({"comment": "stray"}),
            json!({"type": "GENERIC", "id": "rock"}),
        ]);
        assert_eq!(flattener.load_report().skipped, 1);
        assert_eq!(flattener.len(), 1);
    }

    #[test]
    fn validate_reports_every_broken_record() {
        let flattener = load(vec![
            json!({"type": "GENERIC", "id": "a", "copy-from": "b"}),
            json!({"type": "GENERIC", "id": "b", "copy-from": "a"}),
            json!({"type": "GENERIC", "id": "c", "copy-from": "nope"}),
            json!({"type": "GENERIC", "id": "ok"}),
        ]);
        let issues = flattener.validate();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[2].record, "item:c");
    }

    #[test]
    fn unknown_lookups_are_not_found() {
        let flattener = load(Vec::new());
        assert_eq!(
            flattener.get("item", "rock").unwrap_err(),
            DataError::not_found("item", "rock")
        );
        assert!(flattener.try_get("item", "rock").unwrap().is_none());
        assert!(flattener.by_type("item").unwrap().is_empty());
    }
}
