use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Error, Result};
use crate::tokenize::Tokenizer;

/// One normalised line of the corpus.
pub type Sentence = Vec<String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusOptions {
    pub remove_stopwords: bool,
    /// Keep lines that produce no tokens as empty sentences.
    pub keep_empty: bool,
}

fn corpus_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Corpus {
        path: path.to_path_buf(),
        source,
    }
}

pub fn read_sentences<R: BufRead>(reader: R, options: &CorpusOptions) -> std::io::Result<Vec<Sentence>> {
    let tokenizer = Tokenizer::new(options.remove_stopwords);
    let mut sentences = Vec::new();
    for line in reader.lines() {
        let tokens = tokenizer.tokenize(&line?);
        if !tokens.is_empty() || options.keep_empty {
            sentences.push(tokens);
        }
    }
    Ok(sentences)
}

/// Load a UTF-8 text file, one sentence per line.
pub fn load_sentences(path: &Path, options: &CorpusOptions) -> Result<Vec<Sentence>> {
    let file = File::open(path).map_err(corpus_error(path))?;
    let sentences = read_sentences(BufReader::new(file), options).map_err(corpus_error(path))?;

    let tokens: usize = sentences.iter().map(Vec::len).sum();
    info!(
        path = %path.display(),
        sentences = sentences.len(),
        tokens,
        "loaded corpus"
    );
    Ok(sentences)
}

/// SHA-256 of the corpus bytes, hex encoded.
pub fn corpus_fingerprint(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(corpus_error(path))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(corpus_error(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
