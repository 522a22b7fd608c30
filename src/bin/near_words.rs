use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use wordsim_rs::query::format_neighbor;
use wordsim_rs::repl::{PROMPT, install_interrupt_handler};
use wordsim_rs::{WordVectors, logging};

/// Rank nearest words to one or more words using precomputed vectors in
/// word2vec text format (for example a file written with --export-text).
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(value_parser, default_value = "vectors.txt")]
    vectors: PathBuf,
    #[clap(long, value_parser, default_value_t = 10)]
    topn: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let word_vectors = WordVectors::from_text_file(&cli.vectors)
        .with_context(|| format!("cannot read vectors from {}", cli.vectors.display()))?;
    install_interrupt_handler("Goodbye!".to_string())?;

    let mut out = io::stdout();
    writeln!(out, "Near Words Tool - enter 1 or more words (Ctrl+C to exit)\n")?;

    let mut line = String::new();
    let mut stdin = io::stdin().lock();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            writeln!(out, "\nGoodbye!")?;
            break;
        }

        let lowered = line.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let oov_words: Vec<&str> = words
            .iter()
            .filter(|&&w| word_vectors.get_index(w).is_none())
            .copied()
            .collect();
        for word in &oov_words {
            writeln!(out, "'{word}' is out of vocabulary")?;
        }

        let Some(topn) = word_vectors.nearest_to_sum(&words, cli.topn) else {
            writeln!(out)?;
            continue;
        };

        writeln!(out, "\nNearest words to '{}':", words.join(" + "))?;
        for n in &topn {
            writeln!(out, "{}", format_neighbor(n, 20))?;
        }
        writeln!(out)?;
    }

    Ok(())
}
