use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by corpus loading, training, persistence and querying.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read corpus {}: {source}", path.display())]
    Corpus {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corpus contains no sentences")]
    EmptyCorpus,
    #[error("no word reaches min_count {min_count}")]
    EmptyVocabulary { min_count: usize },
    #[error("invalid training config: {0}")]
    InvalidConfig(String),
    #[error("training worker {0} panicked")]
    WorkerPanicked(usize),
    #[error("bad model file: {0}")]
    ModelFormat(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
