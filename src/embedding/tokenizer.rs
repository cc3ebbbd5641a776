// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic tokenizers used to measure chunk sizes.
//!
//! A tokenizer maps text to a sequence of byte spans. Chunk limits are
//! expressed in tokens, so the tokenizer must give identical spans for the
//! same input on every run and every machine.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use crate::errors::{Result, RetrievalError};

/// Name of the built-in tokenizer.
pub const DEFAULT_TOKENIZER: &str = "regex";

/// GPT-2 style pre-tokenization: contractions, letter runs and digit runs with
/// an optional leading space, punctuation runs, and whitespace runs. Every
/// character falls in one class, so matches tile the input without gaps.
static PRETOKENIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'(?:s|t|re|ve|m|ll|d)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+")
        .expect("valid pre-tokenizer pattern")
});

/// Splits text into token spans.
pub trait Tokenizer: Send + Sync {
    /// Returns the tokenizer identifier.
    fn name(&self) -> &str;

    /// Returns the byte range of each token, in order and non-overlapping.
    fn encode(&self, text: &str) -> Vec<Range<usize>>;

    /// Returns the number of tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Regex pre-tokenizer. Concatenating its token texts reproduces the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexTokenizer;

impl RegexTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for RegexTokenizer {
    fn name(&self) -> &str {
        DEFAULT_TOKENIZER
    }

    fn encode(&self, text: &str) -> Vec<Range<usize>> {
        PRETOKENIZE.find_iter(text).map(|m| m.range()).collect()
    }
}

/// Resolves a configured tokenizer name.
pub fn tokenizer_from_name(name: &str) -> Result<Box<dyn Tokenizer>> {
    match name.trim().to_lowercase().as_str() {
        "" | "regex" | "gpt2" => Ok(Box::new(RegexTokenizer::new())),
        other => Err(RetrievalError::config(format!(
            "Unsupported tokenizer '{}'. Supported value: {}",
            other, DEFAULT_TOKENIZER
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens<'a>(text: &'a str) -> Vec<&'a str> {
        RegexTokenizer::new()
            .encode(text)
            .into_iter()
            .map(|r| &text[r])
            .collect()
    }

    #[test]
    fn splits_words_numbers_and_punctuation() {
        assert_eq!(
            tokens("Balance: $1,024.50 on 03/14."),
            vec![
                "Balance", ":", " $", "1", ",", "024", ".", "50", " on", " 03", "/", "14", "."
            ]
        );
    }

    #[test]
    fn handles_contractions_and_whitespace_runs() {
        assert_eq!(tokens("don't  stop"), vec!["don", "'t", "  ", "stop"]);
        assert_eq!(tokens("a\n\nb"), vec!["a", "\n\n", "b"]);
    }

    #[test]
    fn spans_tile_the_input() {
        let text = "Statement period 01 Jan – 31 Jan 2024\n\nOpening balance £1.200,00 …";
        let spans = RegexTokenizer::new().encode(text);
        let mut cursor = 0;
        for span in &spans {
            assert_eq!(span.start, cursor);
            cursor = span.end;
        }
        assert_eq!(cursor, text.len());
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(RegexTokenizer::new().count(""), 0);
    }

    #[test]
    fn resolves_names() {
        assert_eq!(tokenizer_from_name("regex").unwrap().name(), "regex");
        assert!(matches!(
            tokenizer_from_name("sentencepiece"),
            Err(e) if e.is_configuration()
        ));
    }
}
