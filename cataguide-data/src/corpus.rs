//! The corpus envelope delivered by the fetch layer.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while turning a corpus document into a dataset.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Build metadata carried alongside the records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorpusMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<Value>,
}

/// A parsed `{ build_number, release, data }` document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(flatten)]
    pub meta: CorpusMeta,
    #[serde(default)]
    pub data: Vec<Value>,
}

impl Corpus {
    /// Parse a corpus document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a corpus envelope.
    pub fn from_json(json: &str) -> Result<Self, CorpusError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Wrap bare records in an envelope without build metadata.
    #[must_use]
    pub fn from_records(data: Vec<Value>) -> Self {
        Self {
            meta: CorpusMeta::default(),
            data,
        }
    }

    #[must_use]
    pub fn with_build_number(mut self, build_number: impl Into<String>) -> Self {
        self.meta.build_number = Some(build_number.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hex SHA-256 over the build metadata and every record, in order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.meta.build_number.as_deref().unwrap_or_default());
        hasher.update([0_u8]);
        if let Some(release) = &self.meta.release {
            hasher.update(release.to_string());
        }
        hasher.update([0_u8]);
        for record in &self.data {
            hasher.update(record.to_string());
            hasher.update(b"\n");
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_envelope_with_metadata() {
        let corpus = Corpus::from_json(
            r#"{
                "build_number": "2024-05-01-1200",
                "release": {"tag_name": "cbn-2024-05-01"},
                "data": [{"type": "GENERIC", "id": "rock"}]
            }"#,
        )
        .unwrap();
        assert_eq!(corpus.meta.build_number.as_deref(), Some("2024-05-01-1200"));
        assert_eq!(corpus.meta.release.as_ref().unwrap()["tag_name"], "cbn-2024-05-01");
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn missing_data_yields_empty_corpus() {
        let corpus = Corpus::from_json("{}").unwrap();
        assert!(corpus.is_empty());
        assert!(Corpus::from_json("[1,2").is_err());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Corpus::from_records(vec![json!({"type": "GENERIC", "id": "rock"})]);
        let b = Corpus::from_records(vec![json!({"type": "GENERIC", "id": "stick"})]);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), a.clone().with_build_number("b1").fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
