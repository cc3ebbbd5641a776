// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// stmtrag - Retrieval over extracted bank statement text
///
/// Chunks statement pages into passages, embeds them into a local vector
/// index, and retrieves the passages most relevant to a question.
#[derive(Parser, Debug)]
#[command(name = "stmtrag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or extend the index from statement text files
    #[command(alias = "b")]
    Build {
        /// Text files or directories (pages separated by form feeds)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Index directory (defaults to config or .stmtrag)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Add to the existing index instead of replacing it
        #[arg(long)]
        append: bool,

        /// Maximum tokens per passage
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Tokens shared by consecutive passages
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Retrieve passages for a question (interactive when none is given)
    #[command(alias = "q")]
    Query {
        /// Question to answer; omit to read questions from stdin
        question: Option<String>,

        /// Index directory (defaults to config or .stmtrag)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Number of passages to return
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,
    },

    /// Merge two indexes into a new one (left passages first)
    Merge {
        /// Index whose passages come first
        left: PathBuf,

        /// Index whose passages are appended
        right: PathBuf,

        /// Output index directory
        #[arg(long)]
        out: PathBuf,
    },

    /// Show index metadata
    Info {
        /// Index directory (defaults to config or .stmtrag)
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
