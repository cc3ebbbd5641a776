// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for stmtrag
//!
//! Loads configuration from .stmtragrc.toml in current directory or ~/.config/stmtrag/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::embedding::chunker::{ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::provider::DEFAULT_EMBEDDING_DIM;
use crate::embedding::tokenizer::DEFAULT_TOKENIZER;
use crate::errors::Result;
use crate::retriever::DEFAULT_TOP_K;
use crate::utils::INDEX_DIR;

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    Builtin,
    Command,
    Hash,
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk
    pub chunk_size: Option<usize>,
    /// Tokens shared between consecutive chunks
    pub overlap: Option<usize>,
    /// Tokenizer name
    pub tokenizer: Option<String>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 800)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get overlap (defaults to 150)
    pub fn overlap(&self) -> usize {
        self.overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    /// Get tokenizer name (defaults to "regex")
    pub fn tokenizer(&self) -> &str {
        self.tokenizer.as_deref().unwrap_or(DEFAULT_TOKENIZER)
    }

    /// Validated chunk config, with optional CLI overrides
    pub fn chunk_config(&self, size: Option<usize>, overlap: Option<usize>) -> Result<ChunkConfig> {
        ChunkConfig::new(
            size.unwrap_or_else(|| self.chunk_size()),
            overlap.unwrap_or_else(|| self.overlap()),
        )
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hash)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the command provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Vector dimension for command and hash providers
    pub dimension: Option<usize>,
    /// Texts per embedding call
    pub batch_size: Option<usize>,
    /// Embed the provenance label along with the passage text
    pub include_provenance: Option<bool>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "all-MiniLM-L6-v2")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("all-MiniLM-L6-v2")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }

    /// Get batch size (defaults to 64)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(64).max(1)
    }

    /// Get include_provenance (defaults to true)
    pub fn include_provenance(&self) -> bool {
        self.include_provenance.unwrap_or(true)
    }
}

/// Index location configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index directory
    pub path: Option<PathBuf>,
    /// Number of generations kept on disk, including the current one
    pub keep_generations: Option<usize>,
}

impl IndexConfig {
    /// Get index path (defaults to ".stmtrag")
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from(INDEX_DIR))
    }

    /// Get generations to keep (defaults to 2, at least 1)
    pub fn keep_generations(&self) -> usize {
        self.keep_generations.unwrap_or(2).max(1)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned per query
    pub top_k: Option<usize>,
    /// Characters of passage text shown per result
    pub excerpt_chars: Option<usize>,
}

impl RetrievalConfig {
    /// Get top k (defaults to 5)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    /// Get excerpt length (defaults to 300)
    pub fn excerpt_chars(&self) -> usize {
        self.excerpt_chars.unwrap_or(300)
    }
}

/// Configuration loaded from .stmtragrc.toml or ~/.config/stmtrag/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .stmtragrc.toml in current directory
    /// 2. ~/.config/stmtrag/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".stmtragrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("stmtrag").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the chunking configuration
    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the index configuration
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    /// Get the retrieval configuration
    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }
}
