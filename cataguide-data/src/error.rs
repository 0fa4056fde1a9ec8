//! Error taxonomy shared by the flattener and the spawn engine.
use serde::Serialize;
use thiserror::Error;

/// Errors raised while indexing, flattening or walking a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum DataError {
    #[error("no {kind} record with id `{id}`")]
    NotFound { kind: String, id: String },
    #[error("copy-from cycle in {kind} records: {}", chain.join(" -> "))]
    CyclicInheritance { kind: String, chain: Vec<String> },
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: String, id: String },
    #[error("nesting exceeded {limit} levels at `{at}`")]
    MaxDepthExceeded { limit: usize, at: String },
    #[error("unresolved {kind} reference `{id}` from `{from}`")]
    UnresolvedReference {
        kind: String,
        id: String,
        from: String,
    },
    #[error("invalid record `{record}`: {reason}")]
    InvalidRecord { record: String, reason: String },
}

impl DataError {
    pub(crate) fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn unresolved(kind: &str, id: &str, from: &str) -> Self {
        Self::UnresolvedReference {
            kind: kind.to_string(),
            id: id.to_string(),
            from: from.to_string(),
        }
    }

    pub(crate) fn invalid(record: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            record: record.to_string(),
            reason: reason.into(),
        }
    }

    /// Structural errors indicate a bad dataset rather than optional content.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::CyclicInheritance { .. } | Self::DuplicateId { .. } | Self::InvalidRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_ids() {
        let cycle = DataError::CyclicInheritance {
            kind: "item".to_string(),
            chain: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(
            cycle.to_string(),
            "copy-from cycle in item records: a -> b -> a"
        );
        assert!(cycle.is_structural());

        let missing = DataError::unresolved("item_group", "ghost", "item_group:root");
        assert!(missing.to_string().contains("`ghost`"));
        assert!(!missing.is_structural());
    }

    #[test]
    fn serializes_with_error_tag() {
        let err = DataError::not_found("palette", "p1");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], "not_found");
        assert_eq!(value["kind"], "palette");
        assert_eq!(value["id"], "p1");
    }
}
