//! Cataguide Data Core
//!
//! Platform-agnostic game-content resolution graph and spawn probability engine.
//! This crate resolves copy-from inheritance across a record corpus and computes
//! loot tables without performing any I/O of its own.

pub mod config;
pub mod constants;
pub mod corpus;
pub mod error;
pub mod flatten;
pub mod merge;
pub mod numbers;
pub mod record;
pub mod sample;
pub mod spawn;

use std::sync::Arc;

use anyhow::Context;

// Re-export commonly used types
pub use config::{ConfigError, DuplicatePolicy, GuideConfig, LoadOptions, RepeatModel, SpawnOptions};
pub use corpus::{Corpus, CorpusError, CorpusMeta};
pub use error::DataError;
pub use flatten::{FlattenStats, Flattener, LoadReport, ValidationIssue};
pub use merge::{MergeRule, MergeTable};
pub use record::{FlatRecord, Record, RecordHandle, normalize_kind};
pub use sample::{ItemCounts, SpawnSampler};
pub use spawn::{
    ChargeRange, CountRange, Diagnostic, Predicate, SpawnContext, SpawnEngine, SpawnEntry,
    SpawnReport, SpawnRoot,
};

/// Trait for abstracting corpus delivery
/// Fetch layers and file readers provide this
pub trait CorpusSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Produce the corpus document for one session
    ///
    /// # Errors
    ///
    /// Returns an error if the corpus cannot be read or parsed.
    fn load_corpus(&self) -> Result<Corpus, Self::Error>;
}

/// One loaded corpus plus the options used to query it.
///
/// Cloning is cheap; clones share the same flattener and cache.
#[derive(Debug, Clone)]
pub struct Dataset {
    flattener: Arc<Flattener>,
    spawn: SpawnOptions,
}

impl Dataset {
    #[must_use]
    pub const fn new(flattener: Arc<Flattener>, spawn: SpawnOptions) -> Self {
        Self { flattener, spawn }
    }

    #[must_use]
    pub fn flattener(&self) -> &Flattener {
        &self.flattener
    }

    #[must_use]
    pub fn shared(&self) -> Arc<Flattener> {
        Arc::clone(&self.flattener)
    }

    #[must_use]
    pub const fn spawn_options(&self) -> &SpawnOptions {
        &self.spawn
    }

    #[must_use]
    pub fn spawn_engine(&self) -> SpawnEngine<'_> {
        SpawnEngine::new(&self.flattener, &self.spawn)
    }

    #[must_use]
    pub fn sampler(&self) -> SpawnSampler<'_> {
        SpawnSampler::new(&self.flattener, &self.spawn)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root or the root's own flatten error.
    pub fn compute_spawn(
        &self,
        root_id: &str,
        context: &SpawnContext<'_>,
    ) -> Result<SpawnReport, DataError> {
        self.spawn_engine().compute_spawn(root_id, context)
    }
}

/// Session object tying a corpus source to loaded datasets
pub struct GuideEngine<S>
where
    S: CorpusSource,
{
    source: S,
    config: GuideConfig,
}

impl<S> GuideEngine<S>
where
    S: CorpusSource,
{
    /// Create an engine after validating `config`
    ///
    /// # Errors
    ///
    /// Returns the first configuration invariant `config` violates.
    pub fn new(source: S, config: GuideConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { source, config })
    }

    #[must_use]
    pub const fn config(&self) -> &GuideConfig {
        &self.config
    }

    /// Load and index the source's corpus
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails or the corpus violates the duplicate policy.
    pub fn load(&self) -> anyhow::Result<Dataset> {
        let corpus = self
            .source
            .load_corpus()
            .map_err(anyhow::Error::from)
            .context("failed to load corpus")?;
        let records = corpus.len();
        let flattener = Flattener::from_corpus(corpus, &self.config.load)
            .with_context(|| format!("failed to index {records} records"))?;
        log::info!(
            "dataset ready: build {}, {} records",
            flattener.meta().build_number.as_deref().unwrap_or("unknown"),
            flattener.len()
        );
        Ok(Dataset::new(Arc::new(flattener), self.config.spawn.clone()))
    }

    /// Replace `dataset` with a freshly loaded one
    ///
    /// Holders of the previous flattener keep the detached old data.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails; `dataset` is left untouched.
    pub fn reload(&self, dataset: &mut Dataset) -> anyhow::Result<()> {
        *dataset = self.load()?;
        Ok(())
    }
}
