// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merge command: concatenate two indexes into a new one

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::commands::{existing_store, print_json};
use stmtrag::config::Config;
use stmtrag::embedding::IndexStore;
use stmtrag::output::{colorize_label, use_colors};

pub fn run(
    config: &Config,
    left: &Path,
    right: &Path,
    out: &Path,
    format: OutputFormat,
) -> Result<()> {
    let left_index = existing_store(left)?
        .load()
        .with_context(|| format!("Failed to load index at {}", left.display()))?;
    let right_index = existing_store(right)?
        .load()
        .with_context(|| format!("Failed to load index at {}", right.display()))?;

    let merged = left_index.merge(&right_index)?;
    let generation = IndexStore::new(out)
        .with_keep_generations(config.index().keep_generations())
        .save(&merged)
        .with_context(|| format!("Failed to save index to {}", out.display()))?;

    match format {
        OutputFormat::Text => println!(
            "{} {} + {} passages into {} (generation {})",
            colorize_label("Merged", use_colors()),
            left_index.len(),
            right_index.len(),
            out.display(),
            generation
        ),
        OutputFormat::Json => print_json(&json!({
            "index": out,
            "generation": generation,
            "left": left_index.len(),
            "right": right_index.len(),
            "passages": merged.len(),
        }))?,
    }

    Ok(())
}
