// SPDX-License-Identifier: MIT OR Apache-2.0

//! Info command: show metadata of the live index generation

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::commands::{existing_store, print_json};
use stmtrag::config::Config;
use stmtrag::output::{format_index_info, use_colors};
use stmtrag::utils::resolve_index_path;

pub fn run(config: &Config, index: Option<&Path>, format: OutputFormat) -> Result<()> {
    let index_path = resolve_index_path(index, &config.index().path());
    let store = existing_store(&index_path)?;
    let loaded = store
        .load()
        .with_context(|| format!("Failed to load index at {}", index_path.display()))?;
    let generation = store.current_generation()?;

    match format {
        OutputFormat::Text => print!("{}", format_index_info(&loaded, generation, use_colors())),
        OutputFormat::Json => print_json(&json!({
            "index": index_path,
            "passages": loaded.len(),
            "dimension": loaded.dimension(),
            "model": loaded.model_id(),
            "created_at": loaded.created_at(),
            "updated_at": loaded.updated_at(),
            "generation": generation,
        }))?,
    }

    Ok(())
}
