use std::collections::HashMap;

use crate::corpus::Sentence;

/// Vocabulary of a trained model, ordered by descending frequency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocab {
    words: Vec<String>,               // index to word map
    counts: Vec<u64>,                 // corpus frequency per index
    word_map: HashMap<String, usize>, // word to index map
}

impl Vocab {
    /// Count tokens and keep those seen at least `min_count` times.
    pub fn build(sentences: &[Sentence], min_count: usize) -> Vocab {
        let mut word_counts: HashMap<&str, u64> = HashMap::new();
        for token in sentences.iter().flatten() {
            *word_counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut vocabulary: Vec<(&str, u64)> = word_counts
            .into_iter()
            .filter(|(_, count)| *count >= min_count as u64)
            .collect();

        // Sort by frequency (descending) and then alphabetically
        vocabulary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        Vocab::from_counts(
            vocabulary
                .into_iter()
                .map(|(word, count)| (word.to_string(), count)),
        )
    }

    /// Rebuild a vocabulary from stored (word, count) pairs, keeping their order.
    pub fn from_counts<I>(entries: I) -> Vocab
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut vocab = Vocab::default();
        for (word, count) in entries {
            if vocab.word_map.contains_key(&word) {
                continue;
            }
            vocab.word_map.insert(word.clone(), vocab.words.len());
            vocab.words.push(word);
            vocab.counts.push(count);
        }
        vocab
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn index(&self, word: &str) -> Option<usize> {
        self.word_map.get(word).copied()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_map.contains_key(word)
    }

    pub fn word(&self, idx: usize) -> &str {
        &self.words[idx]
    }

    pub fn count(&self, idx: usize) -> u64 {
        self.counts[idx]
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Sum of the counts of all retained words.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(lines: &[&str]) -> Vec<Sentence> {
        lines
            .iter()
            .map(|l| l.split_whitespace().map(str::to_owned).collect())
            .collect()
    }

    #[test]
    fn orders_by_count_then_alphabetically() {
        let vocab = Vocab::build(&sentences(&["b a c a", "c b a d"]), 1);
        assert_eq!(vocab.words(), &["a", "b", "c", "d"]);
        assert_eq!(vocab.counts(), &[3, 2, 2, 1]);
        assert_eq!(vocab.index("c"), Some(2));
        assert_eq!(vocab.total_count(), 8);
    }

    #[test]
    fn min_count_filters_rare_words() {
        let vocab = Vocab::build(&sentences(&["b a c a", "c b a d"]), 2);
        assert_eq!(vocab.len(), 3);
        assert!(!vocab.contains("d"));
        assert!(Vocab::build(&sentences(&["x y"]), 2).is_empty());
    }

    #[test]
    fn from_counts_keeps_first_duplicate() {
        let vocab = Vocab::from_counts(vec![
            ("x".to_string(), 4),
            ("y".to_string(), 2),
            ("x".to_string(), 1),
        ]);
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.count(0), 4);
    }
}
