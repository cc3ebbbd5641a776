// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations for the stmtrag binary

pub mod build;
pub mod info;
pub mod merge;
pub mod query;

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::Path;

use stmtrag::embedding::IndexStore;

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Open the index store at `path`, failing with a hint when nothing was built
pub(crate) fn existing_store(path: &Path) -> Result<IndexStore> {
    let store = IndexStore::new(path);
    if !store.exists() {
        bail!(
            "No index found at {}. Run 'stmtrag build <paths>' first.",
            path.display()
        );
    }
    Ok(store)
}
