use std::path::Path;

use tracing::{info, warn};

use crate::config::{PipelineConfig, TrainConfig};
use crate::corpus::{Sentence, corpus_fingerprint, load_sentences};
use crate::error::{Error, Result};
use crate::model::EmbeddingModel;
use crate::train::train;

/// Why a persisted model cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Missing,
    Unreadable(String),
    ConfigChanged,
    CorpusChanged,
}

/// Check a persisted model against the requested config and corpus fingerprint.
/// `fingerprint == None` means the corpus is unavailable, which is not held
/// against the model.
pub fn check_cached(
    model_path: &Path,
    config: &PipelineConfig,
    fingerprint: Option<&str>,
) -> std::result::Result<EmbeddingModel, Staleness> {
    if !model_path.exists() {
        return Err(Staleness::Missing);
    }
    let model = EmbeddingModel::load(model_path).map_err(|e| Staleness::Unreadable(e.to_string()))?;
    let header = model.header();
    // the tokenizer settings decide which sentences the model was trained on
    if !same_training(&header.config, &config.train) || header.corpus != config.corpus {
        return Err(Staleness::ConfigChanged);
    }
    match fingerprint {
        Some(fp) if fp != model.header().fingerprint => Err(Staleness::CorpusChanged),
        _ => Ok(model),
    }
}

// The seed and the worker count only change how training runs, not what it is asked for.
fn same_training(stored: &TrainConfig, wanted: &TrainConfig) -> bool {
    let mut stored = stored.clone();
    stored.seed = wanted.seed;
    stored.workers = wanted.workers;
    &stored == wanted
}

/// Return a ready model: the persisted one if it is still valid for the
/// current corpus and config, otherwise a freshly trained and saved one.
pub fn load_or_train(config: &PipelineConfig) -> Result<EmbeddingModel> {
    let corpus_available = config.corpus_path.exists();
    let fingerprint = if corpus_available {
        Some(corpus_fingerprint(&config.corpus_path)?)
    } else {
        None
    };

    if !config.force_retrain {
        match check_cached(&config.model_path, config, fingerprint.as_deref()) {
            Ok(model) => {
                if fingerprint.is_none() {
                    warn!(
                        corpus = %config.corpus_path.display(),
                        "corpus not found, reusing the existing model unchecked"
                    );
                }
                info!(path = %config.model_path.display(), "[+] Loading existing model");
                return Ok(model);
            }
            Err(Staleness::Missing) => {}
            Err(Staleness::Unreadable(reason)) => {
                warn!(%reason, "persisted model is unreadable, retraining")
            }
            Err(reason) => info!(?reason, "persisted model is stale, retraining"),
        }
    }

    let sentences = load_sentences(&config.corpus_path, &config.corpus)?;
    train_and_save(config, &sentences, fingerprint.unwrap_or_default())
}

pub fn train_and_save(
    config: &PipelineConfig,
    sentences: &[Sentence],
    fingerprint: String,
) -> Result<EmbeddingModel> {
    info!("[+] Training new {:?} model", config.train.kind);
    if sentences.is_empty() {
        return Err(Error::EmptyCorpus);
    }
    let model = train(sentences, &config.train)?
        .with_fingerprint(fingerprint)
        .with_corpus_options(config.corpus);
    model.save(&config.model_path)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    const TEXT: &str = "machine learning is a field of study\n\
                        deep learning is part of machine learning\n\
                        study machine learning with deep models\n";

    fn setup() -> (TempDir, PipelineConfig) {
        let dir = tempdir().unwrap();
        let corpus_path = dir.path().join("corpus.txt");
        fs::write(&corpus_path, TEXT.repeat(5)).unwrap();
        let mut config = PipelineConfig::word2vec();
        config.corpus_path = corpus_path;
        config.model_path = dir.path().join("ml.model");
        config.train = TrainConfig {
            vector_size: 8,
            window: 2,
            workers: 1,
            epochs: 2,
            min_count: 1,
            ..TrainConfig::word2vec()
        };
        (dir, config)
    }

    #[test]
    fn trains_once_then_reuses() {
        let (_dir, config) = setup();
        let first = load_or_train(&config).unwrap();
        assert!(config.model_path.exists());
        let second = load_or_train(&config).unwrap();
        assert_eq!(first.vocab(), second.vocab());
        assert_eq!(first.header().trained_at, second.header().trained_at);
    }

    #[test]
    fn corpus_change_invalidates_model() {
        let (_dir, config) = setup();
        let first = load_or_train(&config).unwrap();
        fs::write(&config.corpus_path, format!("{}robots\n", TEXT.repeat(5))).unwrap();

        let fp = corpus_fingerprint(&config.corpus_path).unwrap();
        assert_eq!(
            check_cached(&config.model_path, &config, Some(&fp)).unwrap_err(),
            Staleness::CorpusChanged
        );
        let second = load_or_train(&config).unwrap();
        assert!(!first.contains("robots"));
        assert!(second.contains("robots"));
    }

    #[test]
    fn config_change_invalidates_model() {
        let (_dir, mut config) = setup();
        load_or_train(&config).unwrap();
        config.train.vector_size = 4;
        assert_eq!(
            check_cached(&config.model_path, &config, None).unwrap_err(),
            Staleness::ConfigChanged
        );
        assert_eq!(load_or_train(&config).unwrap().dims(), 4);
    }

    #[test]
    fn stopword_setting_invalidates_model() {
        let (_dir, mut config) = setup();
        config.corpus.remove_stopwords = true;
        let first = load_or_train(&config).unwrap();
        assert!(!first.contains("is"));

        config.corpus.remove_stopwords = false;
        assert_eq!(
            check_cached(&config.model_path, &config, None).unwrap_err(),
            Staleness::ConfigChanged
        );
        let second = load_or_train(&config).unwrap();
        assert!(second.contains("is"));
        assert!(!second.header().corpus.remove_stopwords);
    }

    #[test]
    fn worker_count_does_not_invalidate_model() {
        let (_dir, mut config) = setup();
        load_or_train(&config).unwrap();
        config.train.workers = 3;
        assert!(check_cached(&config.model_path, &config, None).is_ok());
    }

    #[test]
    fn corrupt_model_is_retrained() {
        let (_dir, config) = setup();
        fs::write(&config.model_path, b"garbage").unwrap();
        assert!(matches!(
            check_cached(&config.model_path, &config, None),
            Err(Staleness::Unreadable(_))
        ));
        assert!(load_or_train(&config).unwrap().contains("machine"));
    }

    #[test]
    fn missing_corpus_reuses_model_or_fails() {
        let (_dir, mut config) = setup();
        load_or_train(&config).unwrap();
        config.corpus_path = PathBuf::from("does/not/exist.txt");
        assert!(load_or_train(&config).is_ok());

        fs::remove_file(&config.model_path).unwrap();
        assert!(matches!(load_or_train(&config), Err(Error::Corpus { .. })));
    }
}
