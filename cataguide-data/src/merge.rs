//! Field merge policies applied while folding a copy-from chain.
//!
//! Every field defaults to full override. Fields registered in a
//! [`MergeTable`] instead combine with what the record inherited: appended
//! lists, removals, or numeric adjustments. Directive fields are consumed by
//! the fold and never reach the flattened record.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::constants::{
    BLOCK_DELETE, BLOCK_EXTEND, BLOCK_PROPORTIONAL, BLOCK_RELATIVE, IDENTITY_FIELDS,
};

/// How a child's field combines with the value inherited from its ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MergeRule {
    /// Child value replaces the inherited one.
    Override,
    /// Child values are appended after the inherited list stored in `into`.
    Append { into: String },
    /// Child values are appended to the inherited list of the same field, skipping duplicates.
    Union,
    /// Listed values are removed from the inherited list stored in `from`.
    Remove { from: String },
    /// `{target: values}` object; values are appended to each target list.
    ExtendBlock,
    /// `{target: values}` object; values are removed from each target list.
    DeleteBlock,
    /// `{target: n}` object; `n` is added to each numeric target.
    RelativeBlock,
    /// `{target: x}` object; each numeric target is multiplied by `x`.
    ProportionalBlock,
}

impl MergeRule {
    /// Order in which directives run after plain overrides.
    const fn phase(&self) -> u8 {
        match self {
            Self::Override => 0,
            Self::Append { .. } | Self::Union | Self::ExtendBlock => 1,
            Self::Remove { .. } | Self::DeleteBlock => 2,
            Self::RelativeBlock => 3,
            Self::ProportionalBlock => 4,
        }
    }

    /// Target field named by the rule, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Append { into } => Some(into),
            Self::Remove { from } => Some(from),
            _ => None,
        }
    }
}

/// Table of merge rules keyed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeTable {
    rules: HashMap<String, MergeRule>,
}

impl Default for MergeTable {
    fn default() -> Self {
        let rules = HashMap::from([
            (BLOCK_EXTEND.to_string(), MergeRule::ExtendBlock),
            (BLOCK_DELETE.to_string(), MergeRule::DeleteBlock),
            (BLOCK_RELATIVE.to_string(), MergeRule::RelativeBlock),
            (BLOCK_PROPORTIONAL.to_string(), MergeRule::ProportionalBlock),
        ]);
        Self { rules }
    }
}

impl MergeTable {
    /// A table where every field overrides.
    #[must_use]
    pub fn override_only() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, field: impl Into<String>, rule: MergeRule) -> Self {
        self.insert(field, rule);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, rule: MergeRule) {
        self.rules.insert(field.into(), rule);
    }

    #[must_use]
    pub fn rule_for(&self, field: &str) -> &MergeRule {
        self.rules.get(field).unwrap_or(&MergeRule::Override)
    }

    /// Fold `own` fields over the `inherited` (already flattened) fields.
    ///
    /// Identity fields are never inherited; the record keeps only its own.
    #[must_use]
    pub fn apply(
        &self,
        inherited: &Map<String, Value>,
        own: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut merged: Map<String, Value> = inherited
            .iter()
            .filter(|(field, _)| !is_identity_field(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        let mut deferred: Vec<(&str, &MergeRule, &Value)> = Vec::new();
        for (field, value) in own {
            let rule = if is_identity_field(field) {
                &MergeRule::Override
            } else {
                self.rule_for(field)
            };
            match rule {
                MergeRule::Override => {
                    merged.insert(field.clone(), value.clone());
                }
                directive => deferred.push((field.as_str(), directive, value)),
            }
        }
        deferred.sort_by_key(|(_, rule, _)| rule.phase());

        for (field, rule, value) in deferred {
            match rule {
                MergeRule::Override => {}
                MergeRule::Append { into } => append_values(&mut merged, into, value, false),
                MergeRule::Union => append_values(&mut merged, field, value, true),
                MergeRule::Remove { from } => remove_values(&mut merged, from, value),
                MergeRule::ExtendBlock => {
                    for (target, values) in block_entries(field, value) {
                        append_values(&mut merged, target, values, false);
                    }
                }
                MergeRule::DeleteBlock => {
                    for (target, values) in block_entries(field, value) {
                        remove_values(&mut merged, target, values);
                    }
                }
                MergeRule::RelativeBlock => {
                    for (target, delta) in block_entries(field, value) {
                        adjust_field(&mut merged, target, delta, Adjust::Add);
                    }
                }
                MergeRule::ProportionalBlock => {
                    for (target, factor) in block_entries(field, value) {
                        adjust_field(&mut merged, target, factor, Adjust::Scale);
                    }
                }
            }
        }
        merged
    }
}

pub(crate) fn is_identity_field(field: &str) -> bool {
    IDENTITY_FIELDS.contains(&field)
}

fn block_entries<'v>(field: &str, value: &'v Value) -> Vec<(&'v str, &'v Value)> {
    match value {
        Value::Object(block) => block.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        _ => {
            log::warn!("ignoring `{field}` block that is not an object");
            Vec::new()
        }
    }
}

fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn append_values(merged: &mut Map<String, Value>, target: &str, values: &Value, dedupe: bool) {
    let mut list = merged.get(target).map(as_items).unwrap_or_default();
    for value in as_items(values) {
        if dedupe && list.contains(&value) {
            continue;
        }
        list.push(value);
    }
    merged.insert(target.to_string(), Value::Array(list));
}

fn remove_values(merged: &mut Map<String, Value>, target: &str, values: &Value) {
    let Some(existing) = merged.get(target) else {
        return;
    };
    let doomed = as_items(values);
    let kept: Vec<Value> = as_items(existing)
        .into_iter()
        .filter(|value| !doomed.contains(value))
        .collect();
    merged.insert(target.to_string(), Value::Array(kept));
}

#[derive(Debug, Clone, Copy)]
enum Adjust {
    Add,
    Scale,
}

fn adjust_field(merged: &mut Map<String, Value>, target: &str, operand: &Value, op: Adjust) {
    let current = merged.get(target).cloned().unwrap_or(Value::Null);
    if let Some(next) = adjust_value(&current, operand, op) {
        merged.insert(target.to_string(), next);
    } else {
        log::warn!("ignoring non-numeric adjustment of `{target}`");
    }
}

fn adjust_value(current: &Value, operand: &Value, op: Adjust) -> Option<Value> {
    match (current, operand) {
        (Value::Object(fields), Value::Object(deltas)) => {
            let mut next = fields.clone();
            for (key, delta) in deltas {
                let existing = fields.get(key).cloned().unwrap_or(Value::Null);
                if let Some(value) = adjust_value(&existing, delta, op) {
                    next.insert(key.clone(), value);
                }
            }
            Some(Value::Object(next))
        }
        (Value::Null, Value::Object(_)) => adjust_value(&Value::Object(Map::new()), operand, op),
        (Value::Null, Value::Number(_)) => match op {
            Adjust::Add => Some(operand.clone()),
            Adjust::Scale => Some(Value::from(0)),
        },
        (Value::Number(base), Value::Number(delta)) => Some(combine_numbers(base, delta, op)),
        _ => None,
    }
}

fn combine_numbers(base: &Number, operand: &Number, op: Adjust) -> Value {
    let integral = base.is_i64() || base.is_u64();
    match op {
        Adjust::Add => {
            if let (Some(a), Some(b)) = (base.as_i64(), operand.as_i64()) {
                return Value::from(a.saturating_add(b));
            }
            float_value(base.as_f64().unwrap_or(0.0) + operand.as_f64().unwrap_or(0.0), false)
        }
        Adjust::Scale => float_value(
            base.as_f64().unwrap_or(0.0) * operand.as_f64().unwrap_or(1.0),
            integral,
        ),
    }
}

fn float_value(value: f64, integral: bool) -> Value {
    if integral {
        return Value::from(crate::numbers::round_f64_to_i64(value));
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
