//! Train or reload Word2Vec / FastText style embeddings over a text corpus
//! and query nearest-neighbour words.
//!
//! The flow is corpus → model → query: [`corpus::load_sentences`] turns a text
//! file into sentences, [`provider::load_or_train`] returns a model (reusing
//! the persisted one while it matches the corpus and config), and
//! [`query::query`] ranks neighbours for a word. [`repl::Repl`] wraps the
//! query in an interactive prompt.

pub mod config;
pub mod corpus;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod query;
pub mod repl;
pub mod subword;
pub mod tokenize;
pub mod train;
pub mod vocab;
pub mod word_vectors;

pub use config::{Algorithm, ModelKind, PipelineConfig, QueryOptions, TrainConfig};
pub use corpus::{CorpusOptions, Sentence};
pub use error::{Error, Result};
pub use model::EmbeddingModel;
pub use query::{OovPolicy, QueryOutcome};
pub use word_vectors::{Neighbor, WordVectors};
