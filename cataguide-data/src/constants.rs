//! Corpus conventions and engine defaults.
//!
//! Field names, kind names and tuning values shared by the loader, the
//! flattener and the spawn walkers live here so corpus-format changes are
//! made in one place.

// Record kinds -------------------------------------------------------------
/// Normalized kind shared by every concrete item type.
pub const ITEM_KIND: &str = "item";
pub const ITEM_GROUP_KIND: &str = "item_group";
pub const MAPGEN_KIND: &str = "mapgen";
pub const PALETTE_KIND: &str = "palette";

/// Concrete item types folded into [`ITEM_KIND`].
pub(crate) const ITEM_TYPES: &[&str] = &[
    "AMMO",
    "ARMOR",
    "BATTERY",
    "BIONIC_ITEM",
    "BOOK",
    "COMESTIBLE",
    "CONTAINER",
    "ENGINE",
    "GENERIC",
    "GUN",
    "GUNMOD",
    "MAGAZINE",
    "PET_ARMOR",
    "TOOL",
    "TOOLMOD",
    "TOOL_ARMOR",
    "WHEEL",
];

// Identity fields ----------------------------------------------------------
pub(crate) const FIELD_TYPE: &str = "type";
pub(crate) const FIELD_ID: &str = "id";
pub(crate) const FIELD_ABSTRACT: &str = "abstract";
pub(crate) const FIELD_COPY_FROM: &str = "copy-from";
pub(crate) const FIELD_COPY_FROM_ALT: &str = "copy_from";
pub(crate) const MAPGEN_ID_FIELDS: &[&str] = &["om_terrain", "nested_mapgen_id", "update_mapgen_id"];
pub(crate) const IDENTITY_FIELDS: &[&str] = &[
    FIELD_TYPE,
    FIELD_ID,
    FIELD_ABSTRACT,
    FIELD_COPY_FROM,
    FIELD_COPY_FROM_ALT,
];

// Merge directive blocks ---------------------------------------------------
pub(crate) const BLOCK_EXTEND: &str = "extend";
pub(crate) const BLOCK_DELETE: &str = "delete";
pub(crate) const BLOCK_RELATIVE: &str = "relative";
pub(crate) const BLOCK_PROPORTIONAL: &str = "proportional";

// Spawn tuning -------------------------------------------------------------
/// Item id that occupies distribution weight without producing anything.
pub const NULL_ID: &str = "null";
/// Event name meaning "not gated by any event".
pub(crate) const EVENT_NONE: &str = "none";
pub(crate) const DEFAULT_ENTRY_PROB: f64 = 100.0;
pub(crate) const DEFAULT_PLACEMENT_CHANCE: f64 = 100.0;
pub(crate) const DEFAULT_MAX_DEPTH: usize = 64;
pub(crate) const MAX_DEPTH_CEILING: usize = 4_096;
pub(crate) const DEFAULT_MAPGEN_WEIGHT: f64 = 1_000.0;
pub(crate) const DEFAULT_CHUNK_WEIGHT: f64 = 1.0;
pub(crate) const DEFAULT_PALETTE_WEIGHT: f64 = 1.0;
