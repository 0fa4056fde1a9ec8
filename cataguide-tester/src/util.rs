use anyhow::{Context, Result};
use std::{fs, path::Path};

use cataguide_data::{
    Corpus, CorpusError, CorpusSource, Dataset, GuideConfig, GuideEngine, SpawnContext,
};

/// A corpus document read from disk, parsed once.
#[derive(Debug, Clone)]
pub struct FileCorpus {
    corpus: Corpus,
}

impl FileCorpus {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus {}", path.display()))?;
        let corpus = Corpus::from_json(&text)
            .with_context(|| format!("failed to parse corpus {}", path.display()))?;
        Ok(Self { corpus })
    }

    pub fn fingerprint(&self) -> String {
        self.corpus.fingerprint()
    }
}

impl CorpusSource for FileCorpus {
    type Error = CorpusError;

    fn load_corpus(&self) -> Result<Corpus, CorpusError> {
        Ok(self.corpus.clone())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<GuideConfig> {
    let Some(path) = path else {
        return Ok(GuideConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    GuideConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// Load the corpus at `corpus` under the optional config file.
///
/// Returns the dataset with the corpus fingerprint.
pub fn load_dataset(corpus: &Path, config: Option<&Path>) -> Result<(Dataset, String)> {
    let config = load_config(config)?;
    let source = FileCorpus::read(corpus)?;
    let fingerprint = source.fingerprint();
    log::debug!("read corpus {} ({fingerprint})", corpus.display());
    let engine = GuideEngine::new(source, config).context("configuration rejected")?;
    let dataset = engine.load()?;
    Ok((dataset, fingerprint))
}

/// Build a spawn context from comma-separated event and flag lists.
///
/// A leading `!` marks the name as known to be off.
pub fn build_context(events: &str, season: Option<&str>, flags: &str) -> SpawnContext<'static> {
    let mut context = SpawnContext::new();
    for event in split_csv(events) {
        let (name, active) = toggle(&event);
        context = context.with_event(name, active);
    }
    for flag in split_csv(flags) {
        let (name, set) = toggle(&flag);
        context = context.with_flag(name, set);
    }
    if let Some(season) = season.map(str::trim).filter(|s| !s.is_empty()) {
        context = context.with_season(season);
    }
    context
}

fn toggle(token: &str) -> (&str, bool) {
    token
        .strip_prefix('!')
        .map_or((token, true), |name| (name.trim(), false))
}

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cataguide_data::Predicate;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" alpha, ,beta,  gamma ");
        assert_eq!(parts, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn build_context_reads_toggles() {
        let context = build_context("halloween, !christmas", Some(" Winter "), "NEW_GAME");
        assert_eq!(
            context.resolve(&Predicate::Event("halloween".to_string())),
            Some(true)
        );
        assert_eq!(
            context.resolve(&Predicate::Event("christmas".to_string())),
            Some(false)
        );
        assert_eq!(
            context.resolve(&Predicate::Season("winter".to_string())),
            Some(true)
        );
        assert_eq!(
            context.resolve(&Predicate::Flag("NEW_GAME".to_string())),
            Some(true)
        );
        assert_eq!(context.resolve(&Predicate::Flag("OTHER".to_string())), None);
    }

    #[test]
    fn blank_season_is_ignored() {
        let context = build_context("", Some("  "), "");
        assert_eq!(context.resolve(&Predicate::Season("spring".to_string())), None);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        assert_eq!(load_config(None).unwrap(), GuideConfig::default());
    }

    #[test]
    fn unreadable_corpus_reports_path() {
        let path = std::env::temp_dir().join("cataguide-util-missing-corpus.json");
        let err = FileCorpus::read(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read corpus"));
    }

    #[test]
    fn file_corpus_loads_and_fingerprints() {
        let path = std::env::temp_dir().join("cataguide-util-corpus.json");
        fs::write(
            &path,
            r#"{"build_number": "b1", "data": [{"type": "MONSTER", "id": "mon_rat"}]}"#,
        )
        .unwrap();
        let (dataset, fingerprint) = load_dataset(&path, None).unwrap();
        assert_eq!(fingerprint.len(), 64);
        assert!(dataset.flattener().contains("MONSTER", "mon_rat"));
    }
}
