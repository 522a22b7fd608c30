use std::io::{self, Write};

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::provider::load_or_train;
use crate::repl::{Repl, install_interrupt_handler};
use crate::word_vectors::WordVectors;

/// Loader, provider, then the interactive loop on stdin/stdout.
pub fn run(config: &PipelineConfig) -> Result<()> {
    let model = load_or_train(config)?;
    if let Some(path) = &config.export_text {
        model.save_text(path)?;
    }

    let vectors = WordVectors::from_model(&model);
    info!(words = vectors.len(), dims = vectors.dims(), "model ready");

    install_interrupt_handler(config.query.farewell.clone())
        .map_err(|e| io::Error::other(e.to_string()))?;

    let mut out = io::stdout();
    writeln!(out, "\n{}\n", config.query.banner)?;

    // unlocked stdout: the interrupt handler needs to take the lock
    Repl::new(&model, &vectors, &config.query).run(io::stdin().lock(), out)?;
    Ok(())
}
