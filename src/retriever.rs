// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-time retrieval over a loaded index
//!
//! A [`Retriever`] owns one embedding provider and one index snapshot. The
//! index is loaded once and shared by reference; `append` and `merge_from`
//! build a complete replacement, persist it, and only then swap the shared
//! reference, so concurrent queries see either the old or the new index.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::embedding::chunker::Passage;
use crate::embedding::index::{SearchHit, VectorIndex};
use crate::embedding::provider::EmbeddingProvider;
use crate::embedding::storage::IndexStore;
use crate::errors::{Result, RetrievalError};
use crate::ingest::PageText;
use crate::pipeline::{BuildReport, IndexBuilder};

/// Default number of passages returned per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Query and ranked passages handed to the answer-generation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationContext {
    pub query: String,
    /// Provenance-labelled passage texts, best match first
    pub passages: Vec<String>,
}

impl GenerationContext {
    pub fn from_hits(query: &str, hits: &[SearchHit]) -> Self {
        Self {
            query: query.to_string(),
            passages: hits.iter().map(|hit| hit.passage.label()).collect(),
        }
    }
}

#[derive(Clone)]
struct Snapshot {
    index: Arc<VectorIndex>,
    generation: Option<u64>,
}

pub struct Retriever<P: EmbeddingProvider> {
    store: Option<IndexStore>,
    provider: Mutex<P>,
    snapshot: RwLock<Snapshot>,
    writer: Mutex<()>,
}

impl<P: EmbeddingProvider> Retriever<P> {
    /// Loads the live index from `store` and pairs it with `provider`.
    pub fn open(store: IndexStore, provider: P) -> Result<Self> {
        let (generation, index) = store.load_current()?;
        check_compatible(&provider, &index)?;
        tracing::debug!(passages = index.len(), generation, "opened retriever");
        Ok(Self::with_snapshot(Some(store), provider, index, Some(generation)))
    }

    /// Wraps an in-memory index that is not backed by storage.
    pub fn from_index(index: VectorIndex, provider: P) -> Result<Self> {
        check_compatible(&provider, &index)?;
        Ok(Self::with_snapshot(None, provider, index, None))
    }

    fn with_snapshot(
        store: Option<IndexStore>,
        provider: P,
        index: VectorIndex,
        generation: Option<u64>,
    ) -> Self {
        Self {
            store,
            provider: Mutex::new(provider),
            snapshot: RwLock::new(Snapshot {
                index: Arc::new(index),
                generation,
            }),
            writer: Mutex::new(()),
        }
    }

    /// Current index snapshot.
    pub fn index(&self) -> Arc<VectorIndex> {
        self.read_snapshot().index
    }

    /// Generation of the current snapshot, if backed by storage.
    pub fn generation(&self) -> Option<u64> {
        self.read_snapshot().generation
    }

    /// Reloads the index if another writer has published a new generation.
    ///
    /// Returns whether a reload happened.
    pub fn refresh(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let _writer = lock(&self.writer);

        let Some(on_disk) = store.current_generation()? else {
            return Ok(false);
        };
        if Some(on_disk) == self.generation() {
            return Ok(false);
        }

        let (loaded, index) = store.load_resolved(on_disk)?;
        check_compatible(&*lock(&self.provider), &index)?;
        tracing::info!(
            from = ?self.generation(),
            to = loaded,
            passages = index.len(),
            "reloaded index"
        );
        self.swap(index, Some(loaded));
        Ok(true)
    }

    /// Returns up to `k` scored hits for `query`, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RetrievalError::config("k must be at least 1"));
        }
        let vector = lock(&self.provider)
            .embed_one(query)
            .map_err(RetrievalError::Embedding)?;
        self.index().search(&vector, k)
    }

    /// Returns up to `k` passages for `query`, best first.
    pub fn query(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        Ok(self
            .search(query, k)?
            .into_iter()
            .map(|hit| hit.passage)
            .collect())
    }

    /// Retrieves passages for `query` packaged for answer generation.
    pub fn context(&self, query: &str, k: usize) -> Result<GenerationContext> {
        let hits = self.search(query, k)?;
        Ok(GenerationContext::from_hits(query, &hits))
    }

    /// Chunks, embeds and appends `pages`, persisting the grown index.
    pub fn append(&self, builder: &IndexBuilder, pages: &[PageText]) -> Result<BuildReport> {
        let _writer = lock(&self.writer);
        let base = self.index();
        let (index, report) = {
            let mut provider = lock(&self.provider);
            builder.append(&mut *provider, &base, pages)?
        };
        self.publish(index)?;
        Ok(report)
    }

    /// Appends every passage of `other` after the current ones, persisting
    /// the merged index.
    pub fn merge_from(&self, other: &VectorIndex) -> Result<()> {
        let _writer = lock(&self.writer);
        let merged = self.index().merge(other)?;
        self.publish(merged)
    }

    fn publish(&self, index: VectorIndex) -> Result<()> {
        let generation = match &self.store {
            Some(store) => Some(store.save(&index)?),
            None => None,
        };
        self.swap(index, generation);
        Ok(())
    }

    fn swap(&self, index: VectorIndex, generation: Option<u64>) {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *snapshot = Snapshot {
            index: Arc::new(index),
            generation,
        };
    }

    fn read_snapshot(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Checks that `provider` produces vectors comparable with `index`.
pub fn check_compatible<P: EmbeddingProvider + ?Sized>(
    provider: &P,
    index: &VectorIndex,
) -> Result<()> {
    if provider.model_id() != index.model_id() {
        return Err(RetrievalError::ModelMismatch {
            expected: index.model_id().to_string(),
            actual: provider.model_id().to_string(),
        });
    }
    if provider.dimension() != index.dimension() {
        return Err(RetrievalError::DimensionMismatch {
            expected: index.dimension(),
            actual: provider.dimension(),
        });
    }
    Ok(())
}
