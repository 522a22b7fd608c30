use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use wordsim_rs::config::{DEFAULT_CORPUS_PATH, WORD2VEC_MODEL_PATH};
use wordsim_rs::{Algorithm, PipelineConfig, logging, pipeline};

/// Train (or reload) a Word2Vec model and query similar words interactively.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Repeat for more log output (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(long, value_parser, default_value = DEFAULT_CORPUS_PATH)]
    corpus: PathBuf,
    #[clap(long, value_parser, default_value = WORD2VEC_MODEL_PATH)]
    model: PathBuf,
    #[clap(long, value_parser, default_value_t = 150)]
    vector_size: usize,
    #[clap(long, value_parser, default_value_t = 15)]
    window: usize,
    #[clap(long, value_parser, default_value_t = 5)]
    min_count: usize,
    #[clap(long, value_parser, default_value_t = 12)]
    workers: usize,
    #[clap(long, value_parser, default_value_t = 25)]
    epochs: usize,
    #[clap(long, help = "train CBOW instead of skip-gram")]
    cbow: bool,
    #[clap(long, value_parser, default_value_t = 1, help = "0 picks a seed from the clock")]
    seed: u64,
    #[clap(long, help = "retrain even if a valid model is on disk")]
    retrain: bool,
    #[clap(long, value_parser, help = "also write the vectors as word2vec text")]
    export_text: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = PipelineConfig::word2vec();
    config.corpus_path = cli.corpus;
    config.model_path = cli.model;
    config.force_retrain = cli.retrain;
    config.export_text = cli.export_text;
    config.train.vector_size = cli.vector_size;
    config.train.window = cli.window;
    config.train.min_count = cli.min_count;
    config.train.workers = cli.workers;
    config.train.epochs = cli.epochs;
    config.train.seed = cli.seed;
    if cli.cbow {
        config.train.algorithm = Algorithm::Cbow;
    }

    pipeline::run(&config).context("word2vec pipeline failed")
}
