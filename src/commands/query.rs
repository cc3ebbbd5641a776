// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query command: retrieve passages for one question or an interactive session

use anyhow::{Context, Result};
use serde_json::json;
use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::commands::existing_store;
use stmtrag::config::Config;
use stmtrag::embedding::{create_provider, EmbeddingProvider};
use stmtrag::output::{format_hits, use_colors};
use stmtrag::utils::resolve_index_path;
use stmtrag::{GenerationContext, Retriever};

pub fn run(
    config: &Config,
    question: Option<&str>,
    index: Option<&Path>,
    top_k: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let k = top_k.unwrap_or_else(|| config.retrieval().top_k());
    let excerpt_chars = config.retrieval().excerpt_chars();
    let index_path = resolve_index_path(index, &config.index().path());
    let store = existing_store(&index_path)?;

    let provider = create_provider(config.embeddings())?;
    let retriever = Retriever::open(store, provider)
        .with_context(|| format!("Failed to open index at {}", index_path.display()))?;

    if let Some(question) = question {
        return answer(&retriever, question, k, excerpt_chars, format, true);
    }

    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    loop {
        if interactive {
            eprint!("question> ");
            std::io::stderr().flush()?;
        }
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit") {
            break;
        }
        retriever.refresh()?;
        answer(&retriever, question, k, excerpt_chars, format, false)?;
    }

    Ok(())
}

fn answer<P: EmbeddingProvider>(
    retriever: &Retriever<P>,
    question: &str,
    k: usize,
    excerpt_chars: usize,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let hits = retriever.search(question, k)?;

    match format {
        OutputFormat::Text => {
            if hits.is_empty() {
                println!("No passages found.");
            } else {
                print!("{}", format_hits(&hits, excerpt_chars, use_colors()));
            }
        }
        OutputFormat::Json => {
            let scored: Vec<_> = hits
                .iter()
                .map(|hit| {
                    json!({
                        "id": hit.id,
                        "score": hit.score,
                        "source": hit.passage.source,
                        "page_no": hit.passage.page_no,
                        "chunk_index": hit.passage.chunk_index,
                    })
                })
                .collect();
            let value = json!({
                "context": GenerationContext::from_hits(question, &hits),
                "hits": scored,
            });
            if pretty {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", serde_json::to_string(&value)?);
            }
        }
    }

    Ok(())
}
