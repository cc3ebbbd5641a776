// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-window chunker for page text.
//!
//! Page text is split into overlapping passages bounded by a token count.
//! The chunking strategy uses token-based sliding windows with configurable
//! overlap, nudging window ends back to paragraph or sentence breaks when one
//! falls near the edge of the window.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use super::tokenizer::{RegexTokenizer, Tokenizer};
use crate::errors::{Result, RetrievalError};

/// Default number of tokens per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default overlap between consecutive chunks, in tokens.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum number of tokens per chunk.
    pub chunk_size: usize,
    /// Number of tokens shared by consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// Creates a validated config. Requires `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RetrievalError::config("chunk_size must be greater than 0"));
        }
        if overlap >= chunk_size {
            return Err(RetrievalError::config(format!(
                "overlap ({}) must be less than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

/// A token-bounded excerpt of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text, never empty.
    pub text: String,
    /// Originating document (file name or equivalent).
    pub source: String,
    /// Page within the source document (1-indexed).
    pub page_no: u32,
    /// Position within the page's chunk sequence (0-indexed).
    pub chunk_index: u32,
}

/// Identity of a passage within one index generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PassageKey {
    pub source: String,
    pub page_no: u32,
    pub chunk_index: u32,
}

impl fmt::Display for PassageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source:{} page:{} chunk:{}",
            self.source, self.page_no, self.chunk_index
        )
    }
}

impl Passage {
    pub fn key(&self) -> PassageKey {
        PassageKey {
            source: self.source.clone(),
            page_no: self.page_no,
            chunk_index: self.chunk_index,
        }
    }

    /// Passage text prefixed with its provenance, as embedded and as shown to
    /// the generation step.
    pub fn label(&self) -> String {
        format!("({})\n{}", self.key(), self.text)
    }
}

/// Splits page text into overlapping token windows.
pub struct Chunker {
    config: ChunkConfig,
    tokenizer: Box<dyn Tokenizer>,
}

impl Chunker {
    /// Creates a new chunker with the given configuration and tokenizer.
    pub fn new(config: ChunkConfig, tokenizer: Box<dyn Tokenizer>) -> Self {
        Self { config, tokenizer }
    }

    /// Creates a chunker with default configuration and the regex tokenizer.
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default(), Box::new(RegexTokenizer::new()))
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Returns the token-index range of every window over `text`.
    ///
    /// Algorithm:
    /// ```text
    /// start = 0
    /// while start < n:
    ///   end = min(start + chunk_size, n)
    ///   if end < n: end = nearest break in the last fifth of the window, else end
    ///   emit [start, end)
    ///   if end == n: stop
    ///   start = max(end - overlap, start + 1)
    /// ```
    pub fn windows(&self, text: &str) -> Vec<Range<usize>> {
        let spans = self.tokenizer.encode(text);
        self.token_windows(text, &spans)
    }

    /// Chunks one page into passages.
    ///
    /// Blank text yields an empty list; callers use that to route the page
    /// through OCR.
    pub fn chunk_page(&self, text: &str, source: &str, page_no: u32) -> Result<Vec<Passage>> {
        if page_no == 0 {
            return Err(RetrievalError::config("page_no is 1-based; got 0"));
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let spans = self.tokenizer.encode(text);
        let mut passages = Vec::new();
        for window in self.token_windows(text, &spans) {
            let bytes = spans[window.start].start..spans[window.end - 1].end;
            let chunk_text = text[bytes].trim();
            if chunk_text.is_empty() {
                continue;
            }
            passages.push(Passage {
                text: chunk_text.to_string(),
                source: source.to_string(),
                page_no,
                chunk_index: passages.len() as u32,
            });
        }

        Ok(passages)
    }

    fn token_windows(&self, text: &str, spans: &[Range<usize>]) -> Vec<Range<usize>> {
        let total = spans.len();
        let mut windows = Vec::new();
        let mut start = 0_usize;

        while start < total {
            let hard_end = (start + self.config.chunk_size).min(total);
            let end = if hard_end < total {
                find_break(text, spans, start, hard_end)
            } else {
                hard_end
            };
            windows.push(start..end);

            if end >= total {
                break;
            }
            start = end.saturating_sub(self.config.overlap).max(start + 1);
        }

        windows
    }
}

/// Finds a window end in `(start, hard_end]` that falls just after a
/// paragraph break, a sentence end, or a line break, searching only the last
/// fifth of the window. Falls back to `hard_end`.
fn find_break(text: &str, spans: &[Range<usize>], start: usize, hard_end: usize) -> usize {
    let lowest = start + ((hard_end - start) * 4 / 5).max(1);
    let token = |i: usize| &text[spans[i].clone()];
    let is_blank = |s: &str| s.trim().is_empty();

    // Prefer a blank line (paragraph break)
    for end in (lowest..=hard_end).rev() {
        let tok = token(end - 1);
        if is_blank(tok) && tok.matches('\n').count() >= 2 {
            return end;
        }
    }

    // Then a sentence end followed by whitespace
    for end in (lowest..=hard_end).rev() {
        let tok = token(end - 1).trim_end();
        let ends_sentence = tok.ends_with('.') || tok.ends_with('!') || tok.ends_with('?');
        let followed_by_space = spans
            .get(end)
            .map(|next| {
                spans[end - 1].end < next.start
                    || token(end).starts_with(char::is_whitespace)
            })
            .unwrap_or(true);
        if ends_sentence && followed_by_space {
            return end;
        }
    }

    // Then a single line break
    for end in (lowest..=hard_end).rev() {
        let tok = token(end - 1);
        if is_blank(tok) && tok.contains('\n') {
            return end;
        }
    }

    hard_end
}

/// Chunks a page with the default tokenizer.
///
/// Returns an empty list for blank text and a configuration error when
/// `overlap >= chunk_size`.
pub fn chunk_page_text(
    text: &str,
    source: &str,
    page_no: u32,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>> {
    let config = ChunkConfig::new(chunk_size, overlap)?;
    Chunker::new(config, Box::new(RegexTokenizer::new())).chunk_page(text, source, page_no)
}
