// SPDX-License-Identifier: MIT OR Apache-2.0

//! stmtrag - Retrieval core for bank statement question answering
//!
//! Shared modules for the stmtrag CLI tool: token-window chunking, embedding
//! providers, an exact inner-product vector index with generation-based
//! persistence, and a retriever that hands ranked passages to answer
//! generation.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod retriever;
pub mod utils;

pub use errors::{Result, RetrievalError};
pub use retriever::{GenerationContext, Retriever};
