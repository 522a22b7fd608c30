//! Character n-grams and their hash buckets for subword (FastText) models.
//!
//! A word is wrapped in `<` and `>` before slicing, so prefixes and suffixes
//! get their own n-grams. Each n-gram is hashed with 32-bit FNV-1a over its
//! UTF-8 bytes and folded into one of `bucket` rows.

pub const BOW: char = '<';
pub const EOW: char = '>';

/// All n-grams of `<word>` with lengths `min_n..=max_n` (in characters),
/// shortest first, left to right within a length.
pub fn ngrams(word: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let extended: Vec<char> = std::iter::once(BOW)
        .chain(word.chars())
        .chain(std::iter::once(EOW))
        .collect();

    let mut out = Vec::new();
    let upper = max_n.min(extended.len());
    for n in min_n.max(1)..=upper {
        for window in extended.windows(n) {
            out.push(window.iter().collect());
        }
    }
    out
}

/// 32-bit FNV-1a.
pub fn ft_hash(bytes: &[u8]) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(16_777_619);
    }
    h
}

pub fn ngram_buckets(word: &str, min_n: usize, max_n: usize, bucket: usize) -> Vec<usize> {
    ngrams(word, min_n, max_n)
        .iter()
        .map(|g| ft_hash(g.as_bytes()) as usize % bucket)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ngrams_of_short_word() {
        assert_eq!(
            ngrams("ml", 3, 6),
            vec!["<ml", "ml>", "<ml>"]
        );
    }

    #[test]
    fn ngram_count_matches_lengths() {
        // "<where>" has 7 chars: 5 trigrams + 4 four-grams + 3 five-grams + 2 six-grams
        assert_eq!(ngrams("where", 3, 6).len(), 14);
        assert!(ngrams("", 3, 6).is_empty());
    }

    #[test]
    fn multibyte_words_slice_on_chars() {
        let grams = ngrams("né", 3, 3);
        assert_eq!(grams, vec!["<né", "né>"]);
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(ft_hash(b""), 2_166_136_261);
        assert_eq!(ft_hash(b"a"), 0xe40c292c);
    }

    #[test]
    fn buckets_stay_in_range() {
        for b in ngram_buckets("learning", 3, 6, 97) {
            assert!(b < 97);
        }
    }
}
