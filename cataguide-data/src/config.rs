//! Load and spawn configuration.
//!
//! Every field carries a serde default so a partial JSON document (or `{}`)
//! yields the stock behavior.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_MAPGEN_WEIGHT, DEFAULT_MAX_DEPTH, MAPGEN_KIND, MAX_DEPTH_CEILING,
};
use crate::merge::{MergeRule, MergeTable, is_identity_field};

/// What to do when two records of one kind claim the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Reject the corpus with `DataError::DuplicateId`.
    Strict,
    /// The later record takes the id; the earlier one stays reachable as its
    /// copy-from predecessor.
    #[default]
    LastWins,
}

/// How a repeat range turns into a number of rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatModel {
    /// Roll `(min + max) / 2` times.
    #[default]
    ExpectedRolls,
    /// Every integer roll count in `[min, max]` is equally likely.
    UniformRolls,
}

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_depth must be between 1 and {max} (got {value})")]
    MaxDepthRange { value: usize, max: usize },
    #[error("default_mapgen_weight must be positive (got {value:.2})")]
    MapgenWeight { value: f64 },
    #[error("merge rule for `{field}` has an empty target")]
    EmptyMergeTarget { field: String },
    #[error("identity field `{field}` cannot carry a merge rule")]
    IdentityField { field: String },
    #[error("invalid configuration document: {0}")]
    Parse(String),
}

/// Options applied while indexing a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Kinds whose ids may be shared by several weighted records.
    #[serde(default = "LoadOptions::default_variant_kinds")]
    pub variant_kinds: Vec<String>,
    /// Extra merge rules layered over the default directive blocks.
    #[serde(default)]
    pub merge_rules: BTreeMap<String, MergeRule>,
}

impl LoadOptions {
    fn default_variant_kinds() -> Vec<String> {
        vec![MAPGEN_KIND.to_string()]
    }

    /// Default options with strict duplicate checking.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Strict,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_merge_rule(mut self, field: impl Into<String>, rule: MergeRule) -> Self {
        self.merge_rules.insert(field.into(), rule);
        self
    }

    #[must_use]
    pub fn is_variant_kind(&self, kind: &str) -> bool {
        self.variant_kinds.iter().any(|candidate| candidate == kind)
    }

    /// Default directive table with the configured rules layered on top.
    #[must_use]
    pub fn merge_table(&self) -> MergeTable {
        self.merge_rules
            .iter()
            .fold(MergeTable::default(), |table, (field, rule)| {
                table.with_rule(field.clone(), rule.clone())
            })
    }

    /// # Errors
    ///
    /// Returns an error if a merge rule targets an identity field or an empty name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, rule) in &self.merge_rules {
            if is_identity_field(field) || rule.target().is_some_and(is_identity_field) {
                return Err(ConfigError::IdentityField {
                    field: field.clone(),
                });
            }
            if field.is_empty() || rule.target().is_some_and(str::is_empty) {
                return Err(ConfigError::EmptyMergeTarget {
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::default(),
            variant_kinds: Self::default_variant_kinds(),
            merge_rules: BTreeMap::new(),
        }
    }
}

/// Options for spawn computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnOptions {
    #[serde(default = "SpawnOptions::default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub repeat_model: RepeatModel,
    /// Weight of a mapgen variant that declares none.
    #[serde(default = "SpawnOptions::default_mapgen_weight")]
    pub default_mapgen_weight: f64,
}

impl SpawnOptions {
    const fn default_max_depth() -> usize {
        DEFAULT_MAX_DEPTH
    }

    const fn default_mapgen_weight() -> f64 {
        DEFAULT_MAPGEN_WEIGHT
    }

    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub const fn with_repeat_model(mut self, repeat_model: RepeatModel) -> Self {
        self.repeat_model = repeat_model;
        self
    }

    /// # Errors
    ///
    /// Returns an error if the depth bound or default weight is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH_CEILING {
            return Err(ConfigError::MaxDepthRange {
                value: self.max_depth,
                max: MAX_DEPTH_CEILING,
            });
        }
        if !(self.default_mapgen_weight.is_finite() && self.default_mapgen_weight > 0.0) {
            return Err(ConfigError::MapgenWeight {
                value: self.default_mapgen_weight,
            });
        }
        Ok(())
    }
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            repeat_model: RepeatModel::default(),
            default_mapgen_weight: Self::default_mapgen_weight(),
        }
    }
}

/// Complete configuration for a guide session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GuideConfig {
    #[serde(default)]
    pub load: LoadOptions,
    #[serde(default)]
    pub spawn: SpawnOptions,
}

impl GuideConfig {
    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or violates an invariant.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.load.validate()?;
        self.spawn.validate()
    }
}
