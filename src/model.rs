use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::Local;
use tracing::info;

use crate::config::{Algorithm, ModelKind, TrainConfig};
use crate::corpus::CorpusOptions;
use crate::error::{Error, Result};
use crate::subword::ngram_buckets;
use crate::vocab::Vocab;

const MAGIC: &[u8; 4] = b"WSIM";
const VERSION: u32 = 2;
const MAX_STRING_LEN: usize = 1 << 16;

/// Provenance stored alongside the vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHeader {
    pub config: TrainConfig,
    /// How the corpus was tokenized for training.
    pub corpus: CorpusOptions,
    /// SHA-256 of the corpus the model was trained on, empty if unknown.
    pub fingerprint: String,
    pub trained_at: String,
}

/// A trained embedding model: vocabulary, one vector per word and, for
/// subword models, one vector per n-gram bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingModel {
    header: ModelHeader,
    vocab: Vocab,
    word_vectors: Vec<f32>,  // vocab.len() x dims
    ngram_vectors: Vec<f32>, // bucket x dims, empty for Word2Vec
}

impl EmbeddingModel {
    pub fn new(
        config: TrainConfig,
        vocab: Vocab,
        word_vectors: Vec<f32>,
        ngram_vectors: Vec<f32>,
    ) -> Result<Self> {
        let dims = config.vector_size;
        if word_vectors.len() != vocab.len() * dims {
            return Err(Error::ModelFormat(format!(
                "{} word values for {} words of dimension {dims}",
                word_vectors.len(),
                vocab.len()
            )));
        }
        let buckets = match config.kind {
            ModelKind::Word2Vec => 0,
            ModelKind::FastText { bucket, .. } => bucket,
        };
        if ngram_vectors.len() != buckets * dims {
            return Err(Error::ModelFormat(format!(
                "{} n-gram values for {buckets} buckets of dimension {dims}",
                ngram_vectors.len()
            )));
        }

        Ok(EmbeddingModel {
            header: ModelHeader {
                config,
                corpus: CorpusOptions::default(),
                fingerprint: String::new(),
                trained_at: Local::now().to_rfc3339(),
            },
            vocab,
            word_vectors,
            ngram_vectors,
        })
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.header.fingerprint = fingerprint.into();
        self
    }

    pub fn with_corpus_options(mut self, corpus: CorpusOptions) -> Self {
        self.header.corpus = corpus;
        self
    }

    pub fn header(&self) -> &ModelHeader {
        &self.header
    }

    pub fn kind(&self) -> ModelKind {
        self.header.config.kind
    }

    pub fn dims(&self) -> usize {
        self.header.config.vector_size
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn contains(&self, word: &str) -> bool {
        self.vocab.contains(word)
    }

    /// Raw (unnormalised) vectors of the vocabulary, row-major.
    pub fn word_vectors(&self) -> &[f32] {
        &self.word_vectors
    }

    /// One row per n-gram bucket, empty for Word2Vec models.
    pub fn ngram_vectors(&self) -> &[f32] {
        &self.ngram_vectors
    }

    fn row<'a>(&self, matrix: &'a [f32], idx: usize) -> &'a [f32] {
        let dims = self.dims();
        &matrix[idx * dims..(idx + 1) * dims]
    }

    /// Vector for `word`. Subword models build one for unknown words from
    /// their n-grams; `None` if the word is unknown and has no n-grams.
    pub fn word_vector(&self, word: &str) -> Option<Vec<f32>> {
        if let Some(idx) = self.vocab.index(word) {
            return Some(self.row(&self.word_vectors, idx).to_vec());
        }

        let ModelKind::FastText { min_n, max_n, bucket } = self.kind() else {
            return None;
        };
        let buckets = ngram_buckets(word, min_n, max_n, bucket);
        if buckets.is_empty() {
            return None;
        }

        let mut v = vec![0.0f32; self.dims()];
        for &b in &buckets {
            for (acc, x) in v.iter_mut().zip(self.row(&self.ngram_vectors, b)) {
                *acc += x;
            }
        }
        let inv = 1.0 / buckets.len() as f32;
        v.iter_mut().for_each(|x| *x *= inv);
        Some(v)
    }

    /// Write the model in its binary format. The file is replaced atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            self.write_to(&mut out)?;
            out.flush()?;
        }
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), words = self.vocab.len(), "saved model");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let model = Self::read_from(&mut reader, file_len).map_err(|e| match e {
            Error::Io(io) if io.kind() == ErrorKind::UnexpectedEof => {
                Error::ModelFormat("file is truncated".to_string())
            }
            other => other,
        })?;
        info!(
            path = %path.display(),
            words = model.vocab.len(),
            trained_at = %model.header.trained_at,
            "loaded model"
        );
        Ok(model)
    }

    /// Export the vocabulary vectors as word2vec text: a `<count> <dims>`
    /// line followed by one `word v1 v2 ...` line per word.
    pub fn save_text(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{} {}", self.vocab.len(), self.dims())?;
        for (idx, word) in self.vocab.words().iter().enumerate() {
            write!(out, "{word}")?;
            for v in self.row(&self.word_vectors, idx) {
                write!(out, " {v}")?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        info!(path = %path.display(), "exported text vectors");
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let config = &self.header.config;
        w.write_all(MAGIC)?;
        w.write_u32::<LittleEndian>(VERSION)?;

        match config.kind {
            ModelKind::Word2Vec => {
                w.write_u8(0)?;
                w.write_u32::<LittleEndian>(0)?;
                w.write_u32::<LittleEndian>(0)?;
                w.write_u64::<LittleEndian>(0)?;
            }
            ModelKind::FastText { min_n, max_n, bucket } => {
                w.write_u8(1)?;
                w.write_u32::<LittleEndian>(min_n as u32)?;
                w.write_u32::<LittleEndian>(max_n as u32)?;
                w.write_u64::<LittleEndian>(bucket as u64)?;
            }
        }
        w.write_u8(match config.algorithm {
            Algorithm::SkipGram => 0,
            Algorithm::Cbow => 1,
        })?;
        w.write_u32::<LittleEndian>(config.vector_size as u32)?;
        w.write_u32::<LittleEndian>(config.window as u32)?;
        w.write_u64::<LittleEndian>(config.min_count as u64)?;
        w.write_u32::<LittleEndian>(config.workers as u32)?;
        w.write_u32::<LittleEndian>(config.epochs as u32)?;
        w.write_f64::<LittleEndian>(config.sample)?;
        w.write_u32::<LittleEndian>(config.negative as u32)?;
        w.write_f64::<LittleEndian>(config.ns_exponent)?;
        w.write_f32::<LittleEndian>(config.alpha)?;
        w.write_f32::<LittleEndian>(config.min_alpha)?;
        w.write_u64::<LittleEndian>(config.seed)?;
        w.write_u8(self.header.corpus.remove_stopwords as u8)?;
        w.write_u8(self.header.corpus.keep_empty as u8)?;

        write_string(w, &self.header.fingerprint)?;
        write_string(w, &self.header.trained_at)?;

        w.write_u64::<LittleEndian>(self.vocab.len() as u64)?;
        for (word, &count) in self.vocab.words().iter().zip(self.vocab.counts()) {
            write_string(w, word)?;
            w.write_u64::<LittleEndian>(count)?;
        }

        write_matrix(w, &self.word_vectors)?;
        write_matrix(w, &self.ngram_vectors)?;
        Ok(())
    }

    /// Decode a model; `limit` bounds how many bytes the stream can hold.
    pub fn read_from<R: Read>(r: &mut R, limit: u64) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::ModelFormat("not a model file".to_string()));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::ModelFormat(format!("unsupported version {version}")));
        }

        let kind_tag = r.read_u8()?;
        let min_n = r.read_u32::<LittleEndian>()? as usize;
        let max_n = r.read_u32::<LittleEndian>()? as usize;
        let bucket = r.read_u64::<LittleEndian>()? as usize;
        let kind = match kind_tag {
            0 => ModelKind::Word2Vec,
            1 => ModelKind::FastText { min_n, max_n, bucket },
            t => return Err(Error::ModelFormat(format!("unknown model kind {t}"))),
        };
        let algorithm = match r.read_u8()? {
            0 => Algorithm::SkipGram,
            1 => Algorithm::Cbow,
            t => return Err(Error::ModelFormat(format!("unknown algorithm {t}"))),
        };

        let config = TrainConfig {
            kind,
            algorithm,
            vector_size: r.read_u32::<LittleEndian>()? as usize,
            window: r.read_u32::<LittleEndian>()? as usize,
            min_count: r.read_u64::<LittleEndian>()? as usize,
            workers: r.read_u32::<LittleEndian>()? as usize,
            epochs: r.read_u32::<LittleEndian>()? as usize,
            sample: r.read_f64::<LittleEndian>()?,
            negative: r.read_u32::<LittleEndian>()? as usize,
            ns_exponent: r.read_f64::<LittleEndian>()?,
            alpha: r.read_f32::<LittleEndian>()?,
            min_alpha: r.read_f32::<LittleEndian>()?,
            seed: r.read_u64::<LittleEndian>()?,
        };
        config
            .validate()
            .map_err(|e| Error::ModelFormat(e.to_string()))?;
        let corpus = CorpusOptions {
            remove_stopwords: r.read_u8()? != 0,
            keep_empty: r.read_u8()? != 0,
        };
        let fingerprint = read_string(r)?;
        let trained_at = read_string(r)?;

        let words = r.read_u64::<LittleEndian>()?;
        let dims = config.vector_size as u64;
        let ngram_rows = match kind {
            ModelKind::Word2Vec => 0,
            ModelKind::FastText { bucket, .. } => bucket as u64,
        };
        let needed = words
            .checked_add(ngram_rows)
            .and_then(|rows| rows.checked_mul(dims * 4))
            .ok_or_else(|| Error::ModelFormat("matrix size overflows".to_string()))?;
        if needed > limit {
            return Err(Error::ModelFormat("file is truncated".to_string()));
        }

        let mut entries = Vec::with_capacity(words.min(1 << 20) as usize);
        for _ in 0..words {
            let word = read_string(r)?;
            let count = r.read_u64::<LittleEndian>()?;
            entries.push((word, count));
        }
        let vocab = Vocab::from_counts(entries);
        if vocab.len() as u64 != words {
            return Err(Error::ModelFormat("duplicate vocabulary entries".to_string()));
        }

        let word_vectors = read_matrix(r, vocab.len() * config.vector_size)?;
        let ngram_vectors = read_matrix(r, ngram_rows as usize * config.vector_size)?;

        let mut model = EmbeddingModel::new(config, vocab, word_vectors, ngram_vectors)?;
        model.header.corpus = corpus;
        model.header.fingerprint = fingerprint;
        model.header.trained_at = trained_at;
        Ok(model)
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > MAX_STRING_LEN {
        return Err(Error::ModelFormat(format!("string of {len} bytes")));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::ModelFormat("string is not UTF-8".to_string()))
}

fn write_matrix<W: Write>(w: &mut W, m: &[f32]) -> io::Result<()> {
    if cfg!(target_endian = "little") {
        w.write_all(bytemuck::cast_slice(m))
    } else {
        for &v in m {
            w.write_f32::<LittleEndian>(v)?;
        }
        Ok(())
    }
}

fn read_matrix<R: Read>(r: &mut R, len: usize) -> io::Result<Vec<f32>> {
    let mut m = vec![0.0f32; len];
    r.read_f32_into::<LittleEndian>(&mut m)?;
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn tiny_model(kind: ModelKind) -> EmbeddingModel {
        let config = TrainConfig {
            kind,
            vector_size: 2,
            ..TrainConfig::word2vec()
        };
        let vocab = Vocab::from_counts(vec![("machine".to_string(), 3), ("learning".to_string(), 2)]);
        let ngrams = match kind {
            ModelKind::Word2Vec => Vec::new(),
            ModelKind::FastText { bucket, .. } => (0..bucket * 2).map(|i| i as f32).collect(),
        };
        EmbeddingModel::new(config, vocab, vec![1.0, 0.0, 0.0, 1.0], ngrams).unwrap()
    }

    #[test]
    fn binary_round_trip() {
        let kind = ModelKind::FastText {
            min_n: 3,
            max_n: 4,
            bucket: 5,
        };
        let model = tiny_model(kind)
            .with_fingerprint("abc")
            .with_corpus_options(CorpusOptions {
                remove_stopwords: true,
                keep_empty: false,
            });
        let mut buf = Vec::new();
        model.write_to(&mut buf).unwrap();
        let back = EmbeddingModel::read_from(&mut Cursor::new(&buf), buf.len() as u64).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.header().fingerprint, "abc");
        assert!(back.header().corpus.remove_stopwords);
    }

    fn decode(model: &EmbeddingModel) -> Result<EmbeddingModel> {
        let mut buf = Vec::new();
        model.write_to(&mut buf).unwrap();
        EmbeddingModel::read_from(&mut Cursor::new(&buf), buf.len() as u64)
    }

    #[test]
    fn rejects_files_with_unusable_config() {
        let vocab = Vocab::from_counts(vec![("machine".to_string(), 3)]);
        let zero_dims = TrainConfig {
            vector_size: 0,
            ..TrainConfig::word2vec()
        };
        let model = EmbeddingModel::new(zero_dims, vocab.clone(), Vec::new(), Vec::new()).unwrap();
        assert!(matches!(decode(&model), Err(Error::ModelFormat(_))));

        let zero_buckets = TrainConfig {
            kind: ModelKind::FastText {
                min_n: 3,
                max_n: 6,
                bucket: 0,
            },
            vector_size: 2,
            ..TrainConfig::word2vec()
        };
        let model = EmbeddingModel::new(zero_buckets, vocab, vec![1.0, 0.0], Vec::new()).unwrap();
        assert!(matches!(decode(&model), Err(Error::ModelFormat(_))));
    }

    #[test]
    fn save_and_load_keep_vocabulary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ml.model");
        let model = tiny_model(ModelKind::Word2Vec);
        model.save(&path).unwrap();
        let loaded = EmbeddingModel::load(&path).unwrap();
        assert_eq!(loaded.vocab(), model.vocab());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ml.model");
        let mut buf = Vec::new();
        tiny_model(ModelKind::Word2Vec).write_to(&mut buf).unwrap();
        fs::write(&path, &buf[..buf.len() - 3]).unwrap();
        assert!(matches!(
            EmbeddingModel::load(&path),
            Err(Error::ModelFormat(_))
        ));

        fs::write(&path, b"nope").unwrap();
        assert!(matches!(
            EmbeddingModel::load(&path),
            Err(Error::ModelFormat(_))
        ));
    }

    #[test]
    fn word2vec_has_no_oov_vectors() {
        let model = tiny_model(ModelKind::Word2Vec);
        assert_eq!(model.word_vector("learning"), Some(vec![0.0, 1.0]));
        assert_eq!(model.word_vector("deep"), None);
    }

    #[test]
    fn fasttext_builds_oov_vectors_from_ngrams() {
        let model = tiny_model(ModelKind::FastText {
            min_n: 3,
            max_n: 4,
            bucket: 5,
        });
        let v = model.word_vector("deep").unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(Some(v), model.word_vector("deep"));
        // shorter than min_n even with the boundary markers
        let short = EmbeddingModel {
            header: ModelHeader {
                config: TrainConfig {
                    kind: ModelKind::FastText {
                        min_n: 5,
                        max_n: 6,
                        bucket: 5,
                    },
                    ..model.header.config.clone()
                },
                ..model.header.clone()
            },
            ..model.clone()
        };
        assert_eq!(short.word_vector("ab"), None);
    }

    #[test]
    fn text_export_has_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        tiny_model(ModelKind::Word2Vec).save_text(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("2 2"));
        assert_eq!(lines.next(), Some("machine 1 0"));
    }
}
