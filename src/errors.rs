// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for chunking, indexing and retrieval.
//!
//! Errors fall into two classes the caller is expected to tell apart:
//!
//! - **configuration** errors: invalid chunk sizes, `k == 0`, mismatched
//!   dimensionality or embedding models, misaligned inputs. These are
//!   programming faults and are never retried.
//! - **corruption** errors: on-disk artifacts that cannot be decoded or that
//!   disagree with each other.
//!
//! An empty page is not an error. Chunking blank text yields an empty
//! passage list, which is how ingestion detects pages that need OCR.

use std::path::PathBuf;

/// Result alias used by the retrieval core.
pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Invalid parameter or option value
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// Vector dimensionality does not match the index
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding model identifier does not match the index
    #[error("Embedding model mismatch: expected '{expected}', got '{actual}'")]
    ModelMismatch { expected: String, actual: String },

    /// Vector and passage sequences are not aligned
    #[error("Length mismatch: {vectors} vectors but {passages} passages")]
    LengthMismatch { vectors: usize, passages: usize },

    /// A passage key is already present in the index
    #[error("Duplicate passage (source:{document} page:{page_no} chunk:{chunk_index})")]
    DuplicatePassage {
        document: String,
        page_no: u32,
        chunk_index: u32,
    },

    /// Persisted index is unreadable or inconsistent
    #[error("Corrupt index at {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// Filesystem failure while reading or writing index artifacts
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Embedding provider failure
    #[error("Embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
}

impl RetrievalError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by invalid parameters or incompatible inputs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::DimensionMismatch { .. }
                | Self::ModelMismatch { .. }
                | Self::LengthMismatch { .. }
                | Self::DuplicatePassage { .. }
        )
    }

    /// True for errors caused by unreadable or inconsistent persisted state.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptState { .. })
    }
}
