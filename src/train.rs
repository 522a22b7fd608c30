use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::SystemTime;

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::{Algorithm, ModelKind, TrainConfig};
use crate::corpus::Sentence;
use crate::error::{Error, Result};
use crate::model::EmbeddingModel;
use crate::subword::ngram_buckets;
use crate::vocab::Vocab;

const MAX_EXP: f32 = 6.0;

/// Row-major f32 matrix shared between workers without locks.
///
/// Values are stored as `f32` bits in `AtomicU32`. Workers load, compute and
/// store with `Relaxed` ordering, so concurrent updates to one row may be lost
/// (Hogwild!) but every access is memory-safe.
struct SharedMatrix {
    data: Vec<AtomicU32>,
    dims: usize,
}

impl SharedMatrix {
    fn zeros(rows: usize, dims: usize) -> Self {
        SharedMatrix {
            data: (0..rows * dims).map(|_| AtomicU32::new(0)).collect(),
            dims,
        }
    }

    fn random(rows: usize, dims: usize, rng: &mut StdRng) -> Self {
        SharedMatrix {
            data: (0..rows * dims)
                .map(|_| {
                    let v = (rng.random::<f32>() - 0.5) / dims as f32;
                    AtomicU32::new(v.to_bits())
                })
                .collect(),
            dims,
        }
    }

    #[inline]
    fn get(&self, row: usize, i: usize) -> f32 {
        f32::from_bits(self.data[row * self.dims + i].load(Ordering::Relaxed))
    }

    #[inline]
    fn set(&self, row: usize, i: usize, v: f32) {
        self.data[row * self.dims + i].store(v.to_bits(), Ordering::Relaxed);
    }

    /// row += scale * delta
    fn add_scaled(&self, row: usize, delta: &[f32], scale: f32) {
        for (i, d) in delta.iter().enumerate() {
            self.set(row, i, self.get(row, i) + scale * d);
        }
    }

    fn dot(&self, row: usize, v: &[f32]) -> f32 {
        v.iter().enumerate().map(|(i, x)| self.get(row, i) * x).sum()
    }

    fn into_vec(self) -> Vec<f32> {
        self.data
            .into_iter()
            .map(|a| f32::from_bits(a.into_inner()))
            .collect()
    }
}

/// Read-only tables derived from the corpus before training starts.
struct TrainingData {
    /// Sentences as vocab indices, out-of-vocab tokens removed.
    sentences: Vec<Vec<u32>>,
    /// Probability of keeping each vocab word under downsampling.
    keep_prob: Vec<f64>,
    /// Input rows composing each vocab word: its own row, then its n-gram rows.
    input_rows: Vec<Vec<usize>>,
    /// Cumulative noise distribution for negative sampling.
    cum_table: Vec<f64>,
    retained_words: u64,
}

/// Weights shared by all workers.
struct SharedModel<'a> {
    syn0: &'a SharedMatrix,
    syn1neg: &'a SharedMatrix,
    words_done: &'a AtomicU64,
    total_words: u64,
}

/// Slice of sentences one worker trains on during an epoch.
struct ThreadTask {
    id: usize,
    epoch: usize,
    first_sentence: usize,
    sentences_to_process: usize,
}

pub fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(1)
}

/// Train a model over `sentences` with `config`.
///
/// The returned model has an empty corpus fingerprint; callers that persist it
/// attach one with [`EmbeddingModel::with_fingerprint`].
pub fn train(sentences: &[Sentence], config: &TrainConfig) -> Result<EmbeddingModel> {
    config.validate()?;
    if sentences.iter().all(|s| s.is_empty()) {
        return Err(Error::EmptyCorpus);
    }

    let vocab = Vocab::build(sentences, config.min_count);
    if vocab.is_empty() {
        return Err(Error::EmptyVocabulary {
            min_count: config.min_count,
        });
    }

    let seed = resolve_seed(config.seed);
    info!(seed, vocab = vocab.len(), "training {config}");

    let data = prepare(sentences, &vocab, config);
    if data.retained_words == 0 {
        return Err(Error::EmptyCorpus);
    }
    debug!(
        sentences = data.sentences.len(),
        words = data.retained_words,
        "prepared training data"
    );

    let dims = config.vector_size;
    let ngram_rows = match config.kind {
        ModelKind::Word2Vec => 0,
        ModelKind::FastText { bucket, .. } => bucket,
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let syn0 = SharedMatrix::random(vocab.len() + ngram_rows, dims, &mut rng);
    let syn1neg = SharedMatrix::zeros(vocab.len(), dims);
    let words_done = AtomicU64::new(0);

    let model = SharedModel {
        syn0: &syn0,
        syn1neg: &syn1neg,
        words_done: &words_done,
        total_words: data.retained_words * config.epochs as u64,
    };
    train_model_parallel(config, seed, &data, &model)?;

    let mut syn0 = syn0.into_vec();
    let (word_vectors, ngram_vectors) = match config.kind {
        ModelKind::Word2Vec => (syn0, Vec::new()),
        ModelKind::FastText { .. } => {
            let word_vectors = compose_word_vectors(&syn0, &data.input_rows, dims);
            // the bucket rows stay in place, only the word rows are dropped
            syn0.drain(..vocab.len() * dims);
            (word_vectors, syn0)
        }
    };

    EmbeddingModel::new(config.clone(), vocab, word_vectors, ngram_vectors)
}

fn prepare(sentences: &[Sentence], vocab: &Vocab, config: &TrainConfig) -> TrainingData {
    let indexed: Vec<Vec<u32>> = sentences
        .iter()
        .map(|s| {
            s.iter()
                .filter_map(|w| vocab.index(w).map(|i| i as u32))
                .collect::<Vec<u32>>()
        })
        .filter(|s| !s.is_empty())
        .collect();
    let retained_words = indexed.iter().map(|s| s.len() as u64).sum();

    TrainingData {
        sentences: indexed,
        keep_prob: keep_probabilities(vocab, config.sample),
        input_rows: input_rows(vocab, config.kind),
        cum_table: cum_table(vocab, config.ns_exponent),
        retained_words,
    }
}

/// Frequent-word downsampling: keep with probability `(sqrt(c/t) + 1) * t/c`,
/// where `t = sample * total`.
fn keep_probabilities(vocab: &Vocab, sample: f64) -> Vec<f64> {
    let total = vocab.total_count() as f64;
    if sample <= 0.0 {
        return vec![1.0; vocab.len()];
    }
    let threshold = sample * total;
    vocab
        .counts()
        .iter()
        .map(|&c| {
            let c = c as f64;
            (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0)
        })
        .collect()
}

fn input_rows(vocab: &Vocab, kind: ModelKind) -> Vec<Vec<usize>> {
    vocab
        .words()
        .iter()
        .enumerate()
        .map(|(idx, word)| {
            let mut rows = vec![idx];
            if let ModelKind::FastText { min_n, max_n, bucket } = kind {
                rows.extend(
                    ngram_buckets(word, min_n, max_n, bucket)
                        .into_iter()
                        .map(|b| vocab.len() + b),
                );
            }
            rows
        })
        .collect()
}

/// Cumulative distribution of `count^exponent`, normalised to end at 1.0.
fn cum_table(vocab: &Vocab, exponent: f64) -> Vec<f64> {
    let weights: Vec<f64> = vocab
        .counts()
        .iter()
        .map(|&c| (c as f64).powf(exponent))
        .collect();
    let total: f64 = weights.iter().sum();
    let mut running = 0.0;
    weights
        .iter()
        .map(|w| {
            running += w / total;
            running
        })
        .collect()
}

fn sample_negative(cum_table: &[f64], rng: &mut StdRng) -> usize {
    let r = rng.random::<f64>();
    cum_table
        .partition_point(|&c| c < r)
        .min(cum_table.len() - 1)
}

fn calculate_sentences_per_thread(num_sentences: usize, num_threads: usize) -> Vec<usize> {
    if num_threads == 0 {
        return vec![];
    }
    let base = num_sentences / num_threads;
    let extra = num_sentences % num_threads;
    (0..num_threads)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

fn train_model_parallel(
    config: &TrainConfig,
    seed: u64,
    data: &TrainingData,
    model: &SharedModel,
) -> Result<()> {
    let per_thread = calculate_sentences_per_thread(data.sentences.len(), config.workers);
    let mut offsets = vec![0; config.workers];
    for i in 1..config.workers {
        offsets[i] = offsets[i - 1] + per_thread[i - 1];
    }

    for epoch in 0..config.epochs {
        let (loss, pairs) = thread::scope(|s| {
            let handles = (0..config.workers)
                .map(|id| {
                    let task = ThreadTask {
                        id,
                        epoch,
                        first_sentence: offsets[id],
                        sentences_to_process: per_thread[id],
                    };
                    s.spawn(move || worker(&task, seed, data, model, config))
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .enumerate()
                .try_fold((0.0f64, 0u64), |(loss, pairs), (i, handle)| {
                    match handle.join() {
                        Ok((l, p)) => Ok((loss + l, pairs + p)),
                        Err(_) => Err(Error::WorkerPanicked(i)),
                    }
                })
        })?;

        let time_str = Local::now().format("%x - %I:%M.%S%p");
        let it = epoch + 1;
        let avg_loss = loss / pairs.max(1) as f64;
        info!("{time_str}, epoch: {it:03}, loss: {avg_loss:.5}");
    }

    Ok(())
}

/// One worker's pass over its sentences. Returns (summed loss, trained pairs).
fn worker(
    task: &ThreadTask,
    seed: u64,
    data: &TrainingData,
    model: &SharedModel,
    config: &TrainConfig,
) -> (f64, u64) {
    let stream = (task.epoch * config.workers + task.id) as u64;
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)));
    let dims = config.vector_size;
    let mut step = Step {
        l1: vec![0.0; dims],
        neu1e: vec![0.0; dims],
        rows: Vec::new(),
        loss: 0.0,
        pairs: 0,
    };

    let end = task.first_sentence + task.sentences_to_process;
    for sentence in &data.sentences[task.first_sentence..end] {
        let done = model.words_done.load(Ordering::Relaxed);
        let progress = (done as f64 / model.total_words as f64).min(1.0) as f32;
        let alpha = config.alpha - (config.alpha - config.min_alpha) * progress;

        let words: Vec<usize> = sentence
            .iter()
            .map(|&w| w as usize)
            .filter(|&w| data.keep_prob[w] >= rng.random::<f64>())
            .collect();

        for (pos, &center) in words.iter().enumerate() {
            let reach = config.window - rng.random_range(0..config.window);
            let start = pos.saturating_sub(reach);
            let stop = (pos + reach + 1).min(words.len());

            match config.algorithm {
                Algorithm::SkipGram => {
                    for ctx_pos in (start..stop).filter(|&p| p != pos) {
                        step.rows.clear();
                        step.rows.extend_from_slice(&data.input_rows[words[ctx_pos]]);
                        step.run(center, alpha, data, model, config, &mut rng);
                    }
                }
                Algorithm::Cbow => {
                    step.rows.clear();
                    for ctx_pos in (start..stop).filter(|&p| p != pos) {
                        step.rows.extend_from_slice(&data.input_rows[words[ctx_pos]]);
                    }
                    if !step.rows.is_empty() {
                        step.run(center, alpha, data, model, config, &mut rng);
                    }
                }
            }
        }

        model
            .words_done
            .fetch_add(sentence.len() as u64, Ordering::Relaxed);
    }

    (step.loss, step.pairs)
}

/// Scratch buffers for one negative-sampling update.
struct Step {
    l1: Vec<f32>,
    neu1e: Vec<f32>,
    rows: Vec<usize>,
    loss: f64,
    pairs: u64,
}

impl Step {
    /// Predict `target` from the mean of `self.rows`, then push the error back
    /// into every input row.
    fn run(
        &mut self,
        target: usize,
        alpha: f32,
        data: &TrainingData,
        model: &SharedModel,
        config: &TrainConfig,
        rng: &mut StdRng,
    ) {
        let inv = 1.0 / self.rows.len() as f32;
        self.l1.iter_mut().for_each(|x| *x = 0.0);
        for &row in &self.rows {
            for (i, x) in self.l1.iter_mut().enumerate() {
                *x += model.syn0.get(row, i);
            }
        }
        self.l1.iter_mut().for_each(|x| *x *= inv);
        self.neu1e.iter_mut().for_each(|x| *x = 0.0);

        for d in 0..=config.negative {
            let (word, label) = if d == 0 {
                (target, 1.0)
            } else {
                let w = sample_negative(&data.cum_table, rng);
                if w == target {
                    continue;
                }
                (w, 0.0)
            };

            let f = model.syn1neg.dot(word, &self.l1).clamp(-MAX_EXP, MAX_EXP);
            let sig = 1.0 / (1.0 + (-f).exp());
            let g = (label - sig) * alpha;
            let p = if label > 0.0 { sig } else { 1.0 - sig };
            self.loss -= (p.max(1e-7) as f64).ln();

            for (i, e) in self.neu1e.iter_mut().enumerate() {
                *e += g * model.syn1neg.get(word, i);
            }
            model.syn1neg.add_scaled(word, &self.l1, g);
        }

        for &row in &self.rows {
            model.syn0.add_scaled(row, &self.neu1e, inv);
        }
        self.pairs += 1;
    }
}

/// FastText word vectors: mean of the word row and its n-gram rows.
fn compose_word_vectors(syn0: &[f32], input_rows: &[Vec<usize>], dims: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; input_rows.len() * dims];
    for (word, rows) in input_rows.iter().enumerate() {
        let target = &mut out[word * dims..(word + 1) * dims];
        for &row in rows {
            for (t, v) in target.iter_mut().zip(&syn0[row * dims..(row + 1) * dims]) {
                *t += v;
            }
        }
        let inv = 1.0 / rows.len() as f32;
        target.iter_mut().for_each(|t| *t *= inv);
    }
    out
}
