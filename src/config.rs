use std::fmt::{self, Display};
use std::path::PathBuf;

use crate::corpus::CorpusOptions;
use crate::error::{Error, Result};
use crate::query::OovPolicy;

pub const DEFAULT_CORPUS_PATH: &str = "../not-smart/dump/wikipedia/Machine learning/compress.txt";
pub const WORD2VEC_MODEL_PATH: &str = "ml.model";
pub const FASTTEXT_MODEL_PATH: &str = "ml_fasttext.model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    SkipGram,
    Cbow,
}

/// What kind of vectors a model holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Word2Vec,
    FastText {
        min_n: usize,
        max_n: usize,
        bucket: usize,
    },
}

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub kind: ModelKind,
    pub algorithm: Algorithm,
    pub vector_size: usize,
    pub window: usize,
    pub min_count: usize,
    pub workers: usize,
    pub epochs: usize,
    /// Downsampling threshold for frequent words, 0 disables it.
    pub sample: f64,
    pub negative: usize,
    pub ns_exponent: f64,
    pub alpha: f32,
    pub min_alpha: f32,
    /// 0 picks a seed from the clock.
    pub seed: u64,
}

impl TrainConfig {
    pub fn word2vec() -> Self {
        TrainConfig {
            kind: ModelKind::Word2Vec,
            algorithm: Algorithm::SkipGram,
            vector_size: 150,
            window: 15,
            min_count: 5,
            workers: 12,
            epochs: 25,
            sample: 1e-3,
            negative: 5,
            ns_exponent: 0.75,
            alpha: 0.025,
            min_alpha: 0.0001,
            seed: 1,
        }
    }

    pub fn fasttext() -> Self {
        TrainConfig {
            kind: ModelKind::FastText {
                min_n: 3,
                max_n: 6,
                bucket: 2_000_000,
            },
            vector_size: 100,
            window: 10,
            workers: 10,
            epochs: 15,
            sample: 1e-4,
            ..TrainConfig::word2vec()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.vector_size == 0 {
            return fail("vector_size must be positive");
        }
        if self.window == 0 {
            return fail("window must be positive");
        }
        if self.workers == 0 {
            return fail("workers must be positive");
        }
        if self.epochs == 0 {
            return fail("epochs must be positive");
        }
        if self.sample < 0.0 {
            return fail("sample must not be negative");
        }
        if !(self.alpha > 0.0) || self.min_alpha < 0.0 || self.min_alpha > self.alpha {
            return fail("need 0 <= min_alpha <= alpha and alpha > 0");
        }
        if let ModelKind::FastText { min_n, max_n, bucket } = self.kind {
            if min_n == 0 || min_n > max_n {
                return fail("need 0 < min_n <= max_n");
            }
            if bucket == 0 {
                return fail("bucket must be positive");
            }
        }
        Ok(())
    }
}

impl Display for TrainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?}: vector_size {}, window {}, min_count {}, workers {}, epochs {}, sample {}, negative {}",
            self.kind,
            self.algorithm,
            self.vector_size,
            self.window,
            self.min_count,
            self.workers,
            self.epochs,
            self.sample,
            self.negative
        )
    }
}

/// Behaviour of the interactive query loop.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub topn: usize,
    pub oov_policy: OovPolicy,
    /// Extra fixed query run after every user query.
    pub seed_words: Vec<String>,
    /// Width of the word column in result lines.
    pub word_width: usize,
    pub banner: String,
    pub farewell: String,
}

impl QueryOptions {
    pub fn word2vec() -> Self {
        QueryOptions {
            topn: 10,
            oov_policy: OovPolicy::Skip,
            seed_words: Vec::new(),
            word_width: 15,
            banner: "Type a word to get similar words (Ctrl+C to exit)".to_string(),
            farewell: "[+] Exiting. Bye 👋".to_string(),
        }
    }

    pub fn fasttext() -> Self {
        QueryOptions {
            topn: 10,
            oov_policy: OovPolicy::Approximate,
            seed_words: vec!["machine".to_string(), "learning".to_string()],
            word_width: 20,
            banner: "FastText ready. Type a word (Ctrl+C to exit)".to_string(),
            farewell: "Bye 👋".to_string(),
        }
    }
}

/// Everything one pipeline run needs: paths, corpus handling, training and query settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub corpus_path: PathBuf,
    pub model_path: PathBuf,
    pub corpus: CorpusOptions,
    pub train: TrainConfig,
    pub query: QueryOptions,
    /// Ignore any persisted model and train again.
    pub force_retrain: bool,
    /// Also write the vectors in word2vec text format here.
    pub export_text: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn word2vec() -> Self {
        PipelineConfig {
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            model_path: PathBuf::from(WORD2VEC_MODEL_PATH),
            corpus: CorpusOptions::default(),
            train: TrainConfig::word2vec(),
            query: QueryOptions::word2vec(),
            force_retrain: false,
            export_text: None,
        }
    }

    pub fn fasttext() -> Self {
        PipelineConfig {
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            model_path: PathBuf::from(FASTTEXT_MODEL_PATH),
            corpus: CorpusOptions {
                remove_stopwords: true,
                keep_empty: false,
            },
            train: TrainConfig::fasttext(),
            query: QueryOptions::fasttext(),
            force_retrain: false,
            export_text: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TrainConfig::word2vec().validate().unwrap();
        TrainConfig::fasttext().validate().unwrap();
    }

    #[test]
    fn fasttext_defaults() {
        let config = PipelineConfig::fasttext();
        assert_eq!(config.train.vector_size, 100);
        assert_eq!(config.train.window, 10);
        assert_eq!(config.train.sample, 1e-4);
        assert!(config.corpus.remove_stopwords);
        assert_eq!(config.query.oov_policy, OovPolicy::Approximate);
        assert_eq!(config.model_path, PathBuf::from("ml_fasttext.model"));
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = TrainConfig::word2vec();
        config.workers = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = TrainConfig::fasttext();
        config.kind = ModelKind::FastText {
            min_n: 5,
            max_n: 3,
            bucket: 10,
        };
        assert!(config.validate().is_err());
    }
}
