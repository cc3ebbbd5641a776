// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build command: ingest statement text and persist a new index generation

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use stmtrag::config::Config;
use stmtrag::embedding::{create_provider, IndexStore};
use stmtrag::ingest;
use stmtrag::output::{format_build_report, use_colors};
use stmtrag::pipeline::IndexBuilder;
use stmtrag::utils::resolve_index_path;

pub fn run(
    config: &Config,
    paths: &[PathBuf],
    index: Option<&Path>,
    append: bool,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let index_path = resolve_index_path(index, &config.index().path());
    let store =
        IndexStore::new(&index_path).with_keep_generations(config.index().keep_generations());

    let builder = IndexBuilder::from_config(config, chunk_size, overlap)?
        .with_progress(format == OutputFormat::Text);

    let files = ingest::scan(paths)?;
    if files.is_empty() {
        bail!("No .txt files found in the given paths");
    }
    let mut pages = Vec::new();
    for file in &files {
        pages.extend(ingest::read_pages(file)?);
    }

    let mut provider = create_provider(config.embeddings())?;
    let (index, report) = if append && store.exists() {
        let base = store
            .load()
            .with_context(|| format!("Failed to load index at {}", index_path.display()))?;
        builder.append(provider.as_mut(), &base, &pages)?
    } else {
        builder.build(provider.as_mut(), &pages)?
    };

    let generation = store
        .save(&index)
        .with_context(|| format!("Failed to save index to {}", index_path.display()))?;

    match format {
        OutputFormat::Text => print!("{}", format_build_report(&report, generation, use_colors())),
        OutputFormat::Json => crate::commands::print_json(&json!({
            "index": index_path,
            "generation": generation,
            "documents": files.len(),
            "report": report,
        }))?,
    }

    Ok(())
}
