//! Raw and flattened record model.
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::constants::{
    FIELD_ABSTRACT, FIELD_COPY_FROM, FIELD_COPY_FROM_ALT, FIELD_ID, FIELD_TYPE, ITEM_KIND,
    ITEM_TYPES, MAPGEN_ID_FIELDS, MAPGEN_KIND,
};
use crate::error::DataError;

/// Stable arena index of a record within one loaded corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordHandle(usize);

impl RecordHandle {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Fold concrete item types into one kind; every other type is its own kind.
#[must_use]
pub fn normalize_kind(type_name: &str) -> &str {
    if ITEM_TYPES.contains(&type_name) {
        ITEM_KIND
    } else {
        type_name
    }
}

/// A record as it appears in the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub kind: String,
    /// Every id the record answers to; the first is the primary id.
    pub ids: Vec<String>,
    pub is_abstract: bool,
    pub copy_from: Option<String>,
    pub fields: Map<String, Value>,
}

impl Record {
    /// Project a raw corpus value into a record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if the value is not an object or lacks a string `type`.
    pub fn from_value(value: Value) -> Result<Self, DataError> {
        let Value::Object(fields) = value else {
            return Err(DataError::invalid("<anonymous>", "record is not an object"));
        };
        let Some(type_name) = fields.get(FIELD_TYPE).and_then(Value::as_str) else {
            let label = fields
                .get(FIELD_ID)
                .and_then(Value::as_str)
                .unwrap_or("<anonymous>");
            return Err(DataError::invalid(label, "missing string `type`"));
        };
        let type_name = type_name.to_string();
        let kind = normalize_kind(&type_name).to_string();

        let mut ids = Vec::new();
        let mut is_abstract = false;
        if let Some(abstract_id) = fields.get(FIELD_ABSTRACT).and_then(Value::as_str) {
            ids.push(abstract_id.to_string());
            is_abstract = true;
        }
        if let Some(id) = fields.get(FIELD_ID) {
            collect_strings(id, &mut ids);
        }
        if kind == MAPGEN_KIND {
            for field in MAPGEN_ID_FIELDS {
                if let Some(value) = fields.get(*field) {
                    collect_strings(value, &mut ids);
                }
            }
        }
        dedupe_in_order(&mut ids);

        let copy_from = fields
            .get(FIELD_COPY_FROM)
            .or_else(|| fields.get(FIELD_COPY_FROM_ALT))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            type_name,
            kind,
            ids,
            is_abstract,
            copy_from,
            fields,
        })
    }

    #[must_use]
    pub fn primary_id(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }

    /// Human-readable `kind:id` label used in diagnostics.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}", self.kind, self.primary_id().unwrap_or("<anonymous>"))
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(id) => out.push(id.clone()),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        _ => {}
    }
}

fn dedupe_in_order(ids: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

/// A record with its copy-from chain folded in.
///
/// Serializes as the merged field object, the shape presentation code expects.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    pub handle: RecordHandle,
    pub kind: String,
    pub type_name: String,
    pub ids: Vec<String>,
    pub is_abstract: bool,
    pub fields: Map<String, Value>,
}

impl FlatRecord {
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}", self.kind, self.id().unwrap_or("<anonymous>"))
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    #[must_use]
    pub fn f64_field(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn object_field(&self, field: &str) -> Option<&Map<String, Value>> {
        self.get(field).and_then(Value::as_object)
    }

    /// String elements of a list field; a lone string counts as a one-element list.
    #[must_use]
    pub fn string_list(&self, field: &str) -> Vec<&str> {
        match self.get(field) {
            Some(Value::String(single)) => vec![single.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.string_list("flags").contains(&flag)
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_types_share_one_kind() {
        assert_eq!(normalize_kind("ARMOR"), "item");
        assert_eq!(normalize_kind("GENERIC"), "item");
        assert_eq!(normalize_kind("MONSTER"), "MONSTER");
        assert_eq!(normalize_kind("item_group"), "item_group");
    }

    #[test]
    fn id_arrays_become_aliases() {
        let record = Record::from_value(json!({
            "type": "GENERIC",
            "id": ["rock", "stone_chunk"],
            "copy-from": "base_rock"
        }))
        .unwrap();
        assert_eq!(record.kind, "item");
        assert_eq!(record.ids, vec!["rock", "stone_chunk"]);
        assert_eq!(record.primary_id(), Some("rock"));
        assert_eq!(record.copy_from.as_deref(), Some("base_rock"));
        assert!(!record.is_abstract);
    }

    #[test]
    fn abstract_marker_names_the_template() {
        let record =
            Record::from_value(json!({"type": "TOOL", "abstract": "tool_base", "copy_from": "x"}))
                .unwrap();
        assert!(record.is_abstract);
        assert_eq!(record.ids, vec!["tool_base"]);
        assert_eq!(record.copy_from.as_deref(), Some("x"));
    }

    #[test]
    fn mapgen_is_indexed_by_terrain_ids() {
        let record = Record::from_value(json!({
            "type": "mapgen",
            "om_terrain": [["house_a", "house_b"], ["house_c"]],
            "weight": 250
        }))
        .unwrap();
        assert_eq!(record.ids, vec!["house_a", "house_b", "house_c"]);

        let nested = Record::from_value(json!({
            "type": "mapgen",
            "nested_mapgen_id": "closet_chunk"
        }))
        .unwrap();
        assert_eq!(nested.ids, vec!["closet_chunk"]);
    }

    #[test]
    fn missing_type_is_invalid() {
        let err = Record::from_value(json!({"id": "orphan"})).unwrap_err();
        assert!(matches!(err, DataError::InvalidRecord { ref record, .. } if record == "orphan"));
        assert!(Record::from_value(json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn flat_record_accessors_read_fields() {
        let flat = FlatRecord {
            handle: RecordHandle::new(0),
            kind: "item".to_string(),
            type_name: "GENERIC".to_string(),
            ids: vec!["rock".to_string()],
            is_abstract: false,
            fields: json!({"id": "rock", "weight": 2.5, "flags": ["HEAVY"], "name": "rock"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert_eq!(flat.label(), "item:rock");
        assert_eq!(flat.f64_field("weight"), Some(2.5));
        assert_eq!(flat.str_field("name"), Some("rock"));
        assert!(flat.has_flag("HEAVY"));
        assert_eq!(serde_json::to_value(&flat).unwrap()["id"], "rock");
    }
}
