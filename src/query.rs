//! Pure query functions: a word in, a ranked neighbour list out.

use std::collections::HashSet;

use crate::model::EmbeddingModel;
use crate::word_vectors::{Neighbor, WordVectors};

/// What to do with a query word that is not in the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OovPolicy {
    /// Report it and answer nothing.
    Skip,
    /// Build a vector from subwords when the model can.
    Approximate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Neighbors(Vec<Neighbor>),
    /// Unknown word under [`OovPolicy::Skip`].
    OutOfVocabulary,
    /// Unknown word answered from its subword vector.
    Approximated(Vec<Neighbor>),
    /// Unknown word and no vector could be built for it.
    NoVector,
}

/// Trim and lower-case a line of input; `None` if nothing is left.
pub fn normalize_query(line: &str) -> Option<String> {
    let word = line.trim().to_lowercase();
    (!word.is_empty()).then_some(word)
}

pub fn query(
    model: &EmbeddingModel,
    vectors: &WordVectors,
    word: &str,
    topn: usize,
    policy: OovPolicy,
) -> QueryOutcome {
    if let Some(neighbors) = vectors.most_similar(word, topn) {
        return QueryOutcome::Neighbors(neighbors);
    }

    match policy {
        OovPolicy::Skip => QueryOutcome::OutOfVocabulary,
        OovPolicy::Approximate => match model.word_vector(word) {
            Some(v) => {
                QueryOutcome::Approximated(vectors.most_similar_to(&v, &HashSet::new(), topn))
            }
            None => QueryOutcome::NoVector,
        },
    }
}

/// Neighbours of the combined seed words, empty if none of them are known.
pub fn seed_query(vectors: &WordVectors, seeds: &[String], topn: usize) -> Vec<Neighbor> {
    let seeds: Vec<&str> = seeds.iter().map(String::as_str).collect();
    vectors.nearest_to_sum(&seeds, topn).unwrap_or_default()
}

/// `word` padded to `width`, then the score with 4 decimals.
pub fn format_neighbor(neighbor: &Neighbor, width: usize) -> String {
    format!("{:<width$} {:.4}", neighbor.word, neighbor.score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelKind, TrainConfig};
    use crate::vocab::Vocab;

    fn model(kind: ModelKind) -> EmbeddingModel {
        let config = TrainConfig {
            kind,
            vector_size: 2,
            ..TrainConfig::word2vec()
        };
        let vocab = Vocab::from_counts(
            ["machine", "learning", "deep", "cooking"]
                .iter()
                .map(|w| (w.to_string(), 5)),
        );
        let words = vec![1.0, 0.0, 0.9, 0.1, 0.7, 0.7, -1.0, 0.0];
        let ngrams = match kind {
            ModelKind::Word2Vec => Vec::new(),
            ModelKind::FastText { bucket, .. } => (0..bucket * 2).map(|i| 1.0 + i as f32).collect(),
        };
        EmbeddingModel::new(config, vocab, words, ngrams).unwrap()
    }

    #[test]
    fn normalizes_input() {
        assert_eq!(normalize_query("  Machine \n"), Some("machine".to_string()));
        assert_eq!(normalize_query(" \t\n"), None);
    }

    #[test]
    fn known_word_gets_at_most_topn_sorted() {
        let m = model(ModelKind::Word2Vec);
        let wv = WordVectors::from_model(&m);
        let QueryOutcome::Neighbors(list) = query(&m, &wv, "machine", 2, OovPolicy::Skip) else {
            panic!("expected neighbours");
        };
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].word, "learning");
        assert!(list[0].score > list[1].score);
        assert!(list.iter().all(|n| (-1.0..=1.0).contains(&n.score)));
    }

    #[test]
    fn skip_policy_reports_oov() {
        let m = model(ModelKind::Word2Vec);
        let wv = WordVectors::from_model(&m);
        assert_eq!(
            query(&m, &wv, "robot", 10, OovPolicy::Skip),
            QueryOutcome::OutOfVocabulary
        );
        // a word2vec model cannot approximate either
        assert_eq!(
            query(&m, &wv, "robot", 10, OovPolicy::Approximate),
            QueryOutcome::NoVector
        );
    }

    #[test]
    fn approximate_policy_answers_oov() {
        let m = model(ModelKind::FastText {
            min_n: 3,
            max_n: 6,
            bucket: 7,
        });
        let wv = WordVectors::from_model(&m);
        let QueryOutcome::Approximated(list) = query(&m, &wv, "machines", 10, OovPolicy::Approximate)
        else {
            panic!("expected approximation");
        };
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn seed_query_skips_seeds() {
        let m = model(ModelKind::Word2Vec);
        let wv = WordVectors::from_model(&m);
        let seeds = vec!["machine".to_string(), "learning".to_string()];
        let list = seed_query(&wv, &seeds, 10);
        assert_eq!(list.len(), 2);
        assert!(seed_query(&wv, &["robot".to_string()], 10).is_empty());
    }

    #[test]
    fn formats_four_decimals() {
        let n = Neighbor {
            word: "learning".to_string(),
            score: 0.987_654,
        };
        assert_eq!(format_neighbor(&n, 15), "learning        0.9877");
        assert_eq!(format_neighbor(&n, 4), "learning 0.9877");
    }
}
