// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector index with exact inner-product search.
//!
//! Vectors are stored L2-normalized in a flat row-major buffer next to an
//! aligned passage list. The row number is the passage id: ids follow
//! insertion order and are never reused, since the index only grows by
//! `add` and `merge`.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Range;
use std::time::{SystemTime, UNIX_EPOCH};

use super::chunker::{Passage, PassageKey};
use crate::errors::{Result, RetrievalError};

/// Row count above which search scores rows on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// A scored search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Insertion-order id of the passage
    pub id: usize,
    /// Inner product with the normalized query (cosine similarity)
    pub score: f32,
    /// The matching passage
    pub passage: Passage,
}

/// Ordered collection of (vector, passage) pairs sharing one embedding model.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model_id: String,
    dimension: usize,
    vectors: Vec<f32>,
    passages: Vec<Passage>,
    keys: HashSet<PassageKey>,
    created_at: i64,
    updated_at: i64,
}

impl VectorIndex {
    /// Creates an empty index for vectors of `dimension` from `model_id`.
    pub fn empty(model_id: impl Into<String>, dimension: usize) -> Result<Self> {
        let model_id = model_id.into();
        if dimension == 0 {
            return Err(RetrievalError::config("dimension must be greater than 0"));
        }
        if model_id.trim().is_empty() {
            return Err(RetrievalError::config("embedding model id must not be empty"));
        }
        let now = unix_now();
        Ok(Self {
            model_id,
            dimension,
            vectors: Vec::new(),
            passages: Vec::new(),
            keys: HashSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Creates an index from aligned vectors and passages.
    ///
    /// The dimension is taken from the first vector; every other vector must
    /// match it.
    pub fn build(
        model_id: impl Into<String>,
        vectors: Vec<Vec<f32>>,
        passages: Vec<Passage>,
    ) -> Result<Self> {
        if vectors.len() != passages.len() {
            return Err(RetrievalError::LengthMismatch {
                vectors: vectors.len(),
                passages: passages.len(),
            });
        }
        let dimension = vectors
            .first()
            .map(Vec::len)
            .ok_or_else(|| RetrievalError::config("No passages to index"))?;

        let mut index = Self::empty(model_id, dimension)?;
        index.add(vectors, passages)?;
        Ok(index)
    }

    /// Appends aligned vectors and passages, returning the ids assigned.
    ///
    /// Everything is validated before the index is touched, so a failed add
    /// leaves it unchanged.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>, passages: Vec<Passage>) -> Result<Range<usize>> {
        if vectors.len() != passages.len() {
            return Err(RetrievalError::LengthMismatch {
                vectors: vectors.len(),
                passages: passages.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.check_new_keys(&passages)?;

        let start = self.passages.len();
        self.vectors.reserve(vectors.len() * self.dimension);
        for mut vector in vectors {
            l2_normalize(&mut vector);
            self.vectors.extend_from_slice(&vector);
        }
        for passage in passages {
            self.keys.insert(passage.key());
            self.passages.push(passage);
        }
        self.updated_at = unix_now();

        tracing::debug!(
            added = self.passages.len() - start,
            total = self.passages.len(),
            "appended passages to index"
        );
        Ok(start..self.passages.len())
    }

    /// Returns up to `k` hits ordered by descending score, ties broken by
    /// lower id.
    ///
    /// The query is L2-normalized before scoring. Every stored vector is
    /// scored; there is no approximation.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RetrievalError::config("k must be greater than 0"));
        }
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = if self.len() >= PARALLEL_SCAN_THRESHOLD {
            self.vectors
                .par_chunks_exact(self.dimension)
                .enumerate()
                .map(|(id, row)| (id, rank_score(&q, row)))
                .collect()
        } else {
            self.vectors
                .chunks_exact(self.dimension)
                .enumerate()
                .map(|(id, row)| (id, rank_score(&q, row)))
                .collect()
        };

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_by(rank_order);

        Ok(scored
            .into_iter()
            .map(|(id, score)| SearchHit {
                id,
                score,
                passage: self.passages[id].clone(),
            })
            .collect())
    }

    /// Returns a new index holding `self` followed by `other`.
    ///
    /// Neither input is modified. Fails when dimensions or embedding models
    /// differ, or when a passage key appears in both.
    pub fn merge(&self, other: &VectorIndex) -> Result<VectorIndex> {
        if self.dimension != other.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: other.dimension,
            });
        }
        if self.model_id != other.model_id {
            return Err(RetrievalError::ModelMismatch {
                expected: self.model_id.clone(),
                actual: other.model_id.clone(),
            });
        }
        self.check_new_keys(&other.passages)?;

        let mut vectors = Vec::with_capacity(self.vectors.len() + other.vectors.len());
        vectors.extend_from_slice(&self.vectors);
        vectors.extend_from_slice(&other.vectors);

        let mut passages = Vec::with_capacity(self.len() + other.len());
        passages.extend_from_slice(&self.passages);
        passages.extend_from_slice(&other.passages);

        let keys = passages.iter().map(Passage::key).collect();
        let now = unix_now();
        Ok(VectorIndex {
            model_id: self.model_id.clone(),
            dimension: self.dimension,
            vectors,
            passages,
            keys,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reassembles an index from persisted parts.
    ///
    /// Vectors are taken as stored. Returns a description of the first
    /// inconsistency found.
    pub(crate) fn from_parts(
        model_id: String,
        dimension: usize,
        vectors: Vec<f32>,
        passages: Vec<Passage>,
        created_at: i64,
        updated_at: i64,
    ) -> std::result::Result<Self, String> {
        if dimension == 0 {
            return Err("dimension is 0".to_string());
        }
        if vectors.len() != passages.len() * dimension {
            return Err(format!(
                "{} floats do not hold {} vectors of dimension {}",
                vectors.len(),
                passages.len(),
                dimension
            ));
        }
        let mut keys = HashSet::with_capacity(passages.len());
        for passage in &passages {
            if !keys.insert(passage.key()) {
                return Err(format!("duplicate passage ({})", passage.key()));
            }
        }
        Ok(Self {
            model_id,
            dimension,
            vectors,
            passages,
            keys,
            created_at,
            updated_at,
        })
    }

    fn check_new_keys(&self, passages: &[Passage]) -> Result<()> {
        let mut batch = HashSet::with_capacity(passages.len());
        for passage in passages {
            let key = passage.key();
            if self.keys.contains(&key) || !batch.insert(key.clone()) {
                return Err(RetrievalError::DuplicatePassage {
                    document: key.source,
                    page_no: key.page_no,
                    chunk_index: key.chunk_index,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Unix seconds when this index (or the merge producing it) was created.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Unix seconds of the last append.
    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn passage(&self, id: usize) -> Option<&Passage> {
        self.passages.get(id)
    }

    /// Normalized vector stored for `id`.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        let start = id.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Flat row-major vector buffer.
    pub fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }
}

/// Scales `vector` to unit L2 norm. Zero vectors are left as they are.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn rank_score(query: &[f32], row: &[f32]) -> f32 {
    let score: f32 = query.iter().zip(row).map(|(a, b)| a * b).sum();
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
