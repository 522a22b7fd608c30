use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::EmbeddingModel;

/// A ranked neighbour: a vocabulary word and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub word: String,
    pub score: f32,
}

// Unit-length word vectors in one contiguous array, for similarity search.
pub struct WordVectors {
    words: Vec<String>,               // vocabulary - index to word map
    word_map: HashMap<String, usize>, // word to index map
    vectors: Vec<f32>,                // A single, flattened Vec of all vector data
    dims: usize,                      // The dimension of each vector
}

fn normalize(v: &mut [f32]) -> bool {
    const EPS: f32 = 1e-8;
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPS {
        v.iter_mut().for_each(|e| *e /= norm);
        true
    } else {
        false
    }
}

impl WordVectors {
    fn new(words: Vec<String>, mut vectors: Vec<f32>, dims: usize) -> WordVectors {
        for row in vectors.chunks_exact_mut(dims) {
            normalize(row);
        }
        let word_map = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        WordVectors {
            words,
            word_map,
            vectors,
            dims,
        }
    }

    pub fn from_model(model: &EmbeddingModel) -> WordVectors {
        WordVectors::new(
            model.vocab().words().to_vec(),
            model.word_vectors().to_vec(),
            model.dims(),
        )
    }

    // Read word vectors from a word2vec text file; the `<count> <dims>` header line is optional
    pub fn from_text_file(path: &Path) -> Result<WordVectors> {
        let reader = BufReader::new(fs::File::open(path)?);

        let mut words: Vec<String> = Vec::new();
        let mut vectors_data: Vec<f32> = Vec::new(); // Accumulate all vector values here
        let mut dims: usize = 0; // Dimension will be determined from the first vector

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else {
                continue;
            };
            let values: Vec<f32> = parts
                .map(|s| s.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| Error::ModelFormat(format!("line {}: {e}", index + 1)))?;

            // word2vec header: "<count> <dims>"
            if index == 0 && values.len() == 1 && key.parse::<usize>().is_ok() {
                continue;
            }

            if dims == 0 {
                dims = values.len();
                if dims == 0 {
                    return Err(Error::ModelFormat(
                        "first vector has zero dimensions".to_string(),
                    ));
                }
            } else if values.len() != dims {
                return Err(Error::ModelFormat(format!(
                    "vector for '{key}' has dimension {} which differs from initial dimension {dims}",
                    values.len()
                )));
            }

            words.push(key.to_string());
            vectors_data.extend_from_slice(&values);
        }

        if words.is_empty() {
            return Err(Error::ModelFormat("no word vectors found".to_string()));
        }

        Ok(WordVectors::new(words, vectors_data, dims))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn get_word(&self, idx: usize) -> &str {
        &self.words[idx]
    }

    pub fn get_index(&self, word: &str) -> Option<usize> {
        self.word_map.get(word).copied()
    }

    fn get_vector(&self, idx: usize) -> &[f32] {
        &self.vectors[idx * self.dims..(idx + 1) * self.dims]
    }

    /// The `n` words closest to `target` by cosine similarity, best first,
    /// skipping the indices in `exclude`.
    pub fn most_similar_to(&self, target: &[f32], exclude: &HashSet<usize>, n: usize) -> Vec<Neighbor> {
        if n == 0 || target.len() != self.dims {
            return Vec::new();
        }
        let mut target = target.to_vec();
        if !normalize(&mut target) {
            return Vec::new();
        }

        // Collect all scores in parallel
        let mut scores: Vec<(usize, f32)> = self
            .vectors
            .par_chunks_exact(self.dims)
            .enumerate()
            .filter(|(i, _)| !exclude.contains(i))
            .map(|(i, v_slice)| {
                // rows are unit length, so the dot product is the cosine
                let score = v_slice.iter().zip(&target).map(|(v, t)| v * t).sum::<f32>();
                (i, score.clamp(-1.0, 1.0))
            })
            .collect();

        let by_score = |a: &(usize, f32), b: &(usize, f32)| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        };

        // Partial sort first when only a few of many rows are wanted.
        if n < scores.len() {
            scores.select_nth_unstable_by(n, by_score);
            scores.truncate(n);
        }
        scores.sort_by(by_score);

        scores
            .into_iter()
            .map(|(i, score)| Neighbor {
                word: self.words[i].clone(),
                score,
            })
            .collect()
    }

    /// Nearest words to an in-vocabulary `word`, excluding the word itself.
    pub fn most_similar(&self, word: &str, n: usize) -> Option<Vec<Neighbor>> {
        let idx = self.get_index(word)?;
        let exclude = HashSet::from([idx]);
        Some(self.most_similar_to(self.get_vector(idx), &exclude, n))
    }

    /// Nearest words to the mean of the unit vectors of `words`. Unknown words
    /// are ignored; `None` if none are known.
    pub fn nearest_to_sum(&self, words: &[&str], n: usize) -> Option<Vec<Neighbor>> {
        // Get indices for all words, collecting valid ones
        let indices: Vec<usize> = words.iter().filter_map(|w| self.get_index(w)).collect();
        if indices.is_empty() {
            return None;
        }

        // indices might have duplicates - input_indices does not
        let input_indices: HashSet<usize> = indices.iter().copied().collect();

        let mut target_vector = vec![0.0; self.dims];
        for &idx in &indices {
            for (t, v) in target_vector.iter_mut().zip(self.get_vector(idx)) {
                *t += v;
            }
        }

        Some(self.most_similar_to(&target_vector, &input_indices, n))
    }
}
