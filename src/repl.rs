use std::io::{self, BufRead, Write};
use std::process;

use tracing::debug;

use crate::config::QueryOptions;
use crate::model::EmbeddingModel;
use crate::query::{QueryOutcome, format_neighbor, normalize_query, query, seed_query};
use crate::word_vectors::{Neighbor, WordVectors};

pub const PROMPT: &str = "> ";
pub const OOV_SKIPPED: &str = "[-] Word not in vocabulary";
pub const OOV_APPROXIMATED: &str = "⚠️  Word not in vocab (FastText will still approximate)";

/// Exit with `farewell` on Ctrl+C.
///
/// The handler locks stdout before printing, so the REPL must write through
/// `io::stdout()` rather than holding a `StdoutLock` across reads.
pub fn install_interrupt_handler(farewell: String) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "\n{farewell}");
        let _ = out.flush();
        process::exit(0);
    })
}

/// Blocking read-query-print loop over a trained model.
pub struct Repl<'a> {
    model: &'a EmbeddingModel,
    vectors: &'a WordVectors,
    options: &'a QueryOptions,
}

impl<'a> Repl<'a> {
    pub fn new(model: &'a EmbeddingModel, vectors: &'a WordVectors, options: &'a QueryOptions) -> Self {
        Repl {
            model,
            vectors,
            options,
        }
    }

    fn print_neighbors<W: Write>(&self, out: &mut W, neighbors: &[Neighbor]) -> io::Result<()> {
        for n in neighbors {
            writeln!(out, "{}", format_neighbor(n, self.options.word_width))?;
        }
        Ok(())
    }

    /// Answer one already-normalised word.
    pub fn answer<W: Write>(&self, out: &mut W, word: &str) -> io::Result<()> {
        let outcome = query(
            self.model,
            self.vectors,
            word,
            self.options.topn,
            self.options.oov_policy,
        );
        debug!(word, ?outcome, "query");

        match outcome {
            QueryOutcome::Neighbors(list) => self.print_neighbors(out, &list)?,
            QueryOutcome::OutOfVocabulary => {
                writeln!(out, "{OOV_SKIPPED}\n")?;
                return Ok(());
            }
            QueryOutcome::Approximated(list) => {
                writeln!(out, "{OOV_APPROXIMATED}")?;
                self.print_neighbors(out, &list)?;
            }
            QueryOutcome::NoVector => {
                writeln!(out, "[-] No vector can be built for '{word}'\n")?;
                return Ok(());
            }
        }

        if !self.options.seed_words.is_empty() {
            let seeds = seed_query(self.vectors, &self.options.seed_words, self.options.topn);
            self.print_neighbors(out, &seeds)?;
        }
        writeln!(out)
    }

    /// Prompt until the input ends. Blank lines just prompt again.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut out: W) -> io::Result<()> {
        let mut line = String::new();
        loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out, "\n{}", self.options.farewell)?;
                return out.flush();
            }

            let Some(word) = normalize_query(&line) else {
                continue;
            };
            self.answer(&mut out, &word)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelKind, TrainConfig};
    use crate::vocab::Vocab;
    use std::io::Cursor;

    fn model(kind: ModelKind) -> EmbeddingModel {
        let config = TrainConfig {
            kind,
            vector_size: 2,
            ..TrainConfig::word2vec()
        };
        let vocab = Vocab::from_counts(
            ["machine", "learning", "deep"]
                .iter()
                .map(|w| (w.to_string(), 5)),
        );
        let ngrams = match kind {
            ModelKind::Word2Vec => Vec::new(),
            ModelKind::FastText { bucket, .. } => vec![0.5; bucket * 2],
        };
        EmbeddingModel::new(config, vocab, vec![1.0, 0.0, 0.9, 0.1, 0.7, 0.7], ngrams).unwrap()
    }

    fn run(model: &EmbeddingModel, options: &QueryOptions, input: &str) -> String {
        let vectors = WordVectors::from_model(model);
        let mut out = Vec::new();
        Repl::new(model, &vectors, options)
            .run(Cursor::new(input), &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn blank_lines_only_reprompt() {
        let m = model(ModelKind::Word2Vec);
        let out = run(&m, &QueryOptions::word2vec(), "\n   \n");
        assert_eq!(out, "> > > \n[+] Exiting. Bye 👋\n");
    }

    #[test]
    fn prints_neighbors_for_known_word() {
        let m = model(ModelKind::Word2Vec);
        let out = run(&m, &QueryOptions::word2vec(), "  MACHINE\n");
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("> learning "));
        assert!(lines[1].starts_with("deep"));
        assert_eq!(lines[2], "");
        assert!(lines[0].ends_with(&format!("{:.4}", 0.9939_f32)));
    }

    #[test]
    fn word2vec_skips_unknown_words_and_keeps_going() {
        let m = model(ModelKind::Word2Vec);
        let out = run(&m, &QueryOptions::word2vec(), "robot\nmachine\n");
        assert!(out.contains(OOV_SKIPPED));
        assert!(out.contains("learning"));
    }

    #[test]
    fn fasttext_warns_then_answers_with_seed_query() {
        let m = model(ModelKind::FastText {
            min_n: 3,
            max_n: 6,
            bucket: 4,
        });
        let out = run(&m, &QueryOptions::fasttext(), "robot\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "> ⚠️  Word not in vocab (FastText will still approximate)");
        // three approximated neighbours, then the seed query's single answer
        assert_eq!(lines[1..5].iter().filter(|l| !l.is_empty()).count(), 4);
        assert!(lines[4].starts_with("deep"));
        assert!(out.ends_with("Bye 👋\n"));
    }
}
