use anyhow::{Context, Result, ensure};
use clap::Parser;
use std::path::PathBuf;
use wordsim_rs::config::{DEFAULT_CORPUS_PATH, FASTTEXT_MODEL_PATH};
use wordsim_rs::{Algorithm, ModelKind, PipelineConfig, logging, pipeline};

/// Train (or reload) a FastText model with subword n-grams and query similar
/// words interactively. Unknown words are approximated from their n-grams.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Repeat for more log output (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(long, value_parser, default_value = DEFAULT_CORPUS_PATH)]
    corpus: PathBuf,
    #[clap(long, value_parser, default_value = FASTTEXT_MODEL_PATH)]
    model: PathBuf,
    #[clap(long, value_parser, default_value_t = 100)]
    vector_size: usize,
    #[clap(long, value_parser, default_value_t = 10)]
    window: usize,
    #[clap(long, value_parser, default_value_t = 5)]
    min_count: usize,
    #[clap(long, value_parser, default_value_t = 10)]
    workers: usize,
    #[clap(long, value_parser, default_value_t = 15)]
    epochs: usize,
    #[clap(long, value_parser, default_value_t = 1e-4)]
    sample: f64,
    #[clap(long, value_parser, default_value_t = 3)]
    min_n: usize,
    #[clap(long, value_parser, default_value_t = 6)]
    max_n: usize,
    #[clap(long, value_parser, default_value_t = 2_000_000, help = "number of n-gram hash buckets")]
    bucket: usize,
    #[clap(long, help = "train CBOW instead of skip-gram")]
    cbow: bool,
    #[clap(long, help = "keep stopwords in the corpus")]
    keep_stopwords: bool,
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
    ensure!(cli.min_n <= cli.max_n, "--min-n must not exceed --max-n");

    let mut config = PipelineConfig::fasttext();
    config.corpus_path = cli.corpus;
    config.model_path = cli.model;
    config.force_retrain = cli.retrain;
    config.export_text = cli.export_text;
    config.corpus.remove_stopwords = !cli.keep_stopwords;
    config.train.kind = ModelKind::FastText {
        min_n: cli.min_n,
        max_n: cli.max_n,
        bucket: cli.bucket,
    };
    config.train.vector_size = cli.vector_size;
    config.train.window = cli.window;
    config.train.min_count = cli.min_count;
    config.train.workers = cli.workers;
    config.train.epochs = cli.epochs;
    config.train.sample = cli.sample;
    config.train.seed = cli.seed;
    if cli.cbow {
        config.train.algorithm = Algorithm::Cbow;
    }

    pipeline::run(&config).context("fasttext pipeline failed")
}
