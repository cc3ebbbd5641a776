// SPDX-License-Identifier: MIT OR Apache-2.0

//! stmtrag - Retrieval over extracted bank statement text
//!
//! Builds a local vector index from statement pages and answers questions
//! with the most relevant passages.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with STMTRAG_LOG env var (e.g., STMTRAG_LOG=debug stmtrag build docs/)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STMTRAG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let config = stmtrag::config::Config::load();

    match cli.command {
        Commands::Build {
            paths,
            index,
            append,
            chunk_size,
            overlap,
        } => {
            commands::build::run(
                &config,
                &paths,
                index.as_deref(),
                append,
                chunk_size,
                overlap,
                format,
            )?;
        }
        Commands::Query {
            question,
            index,
            top_k,
        } => {
            commands::query::run(&config, question.as_deref(), index.as_deref(), top_k, format)?;
        }
        Commands::Merge { left, right, out } => {
            commands::merge::run(&config, &left, &right, &out, format)?;
        }
        Commands::Info { index } => {
            commands::info::run(&config, index.as_deref(), format)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "stmtrag", &mut std::io::stdout());
        }
    }

    Ok(())
}
