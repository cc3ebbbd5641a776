// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - passage chunking, vector providers and the vector index
//!
//! Text is split into token windows by the chunker, turned into vectors by an
//! [`EmbeddingProvider`], and stored in a [`VectorIndex`] that persists through
//! [`IndexStore`].

pub mod chunker;
pub mod index;
pub mod provider;
pub mod storage;
pub mod tokenizer;

pub use chunker::{chunk_page_text, ChunkConfig, Chunker, Passage, PassageKey};
pub use index::{l2_normalize, SearchHit, VectorIndex};
pub use provider::{
    create_provider, CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder,
    HashEmbedder, DEFAULT_EMBEDDING_DIM,
};
pub use storage::IndexStore;
pub use tokenizer::{tokenizer_from_name, RegexTokenizer, Tokenizer};
