// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index build pipeline: pages -> passages -> vectors -> index

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::embedding::chunker::{ChunkConfig, Chunker, Passage};
use crate::embedding::index::VectorIndex;
use crate::embedding::provider::{validate_batch, EmbeddingProvider};
use crate::embedding::tokenizer::{tokenizer_from_name, Tokenizer};
use crate::errors::{Result, RetrievalError};
use crate::ingest::PageText;

/// A page that produced no text and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPage {
    pub source: String,
    pub page_no: u32,
}

/// Passages chunked from a set of pages.
#[derive(Debug, Default)]
pub struct ChunkedPages {
    pub passages: Vec<Passage>,
    pub needs_ocr: Vec<SkippedPage>,
}

/// Summary of one build or append.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub model_id: String,
    pub dimension: usize,
    pub pages: usize,
    /// Passages added by this run
    pub passages: usize,
    /// Passages in the resulting index
    pub total_passages: usize,
    pub needs_ocr: Vec<SkippedPage>,
}

/// Chunks and embeds pages into a vector index.
pub struct IndexBuilder {
    chunker: Chunker,
    include_provenance: bool,
    show_progress: bool,
}

impl IndexBuilder {
    pub fn new(config: ChunkConfig, tokenizer: Box<dyn Tokenizer>, include_provenance: bool) -> Self {
        Self {
            chunker: Chunker::new(config, tokenizer),
            include_provenance,
            show_progress: false,
        }
    }

    /// Creates a builder from the loaded configuration, with optional
    /// chunk size and overlap overrides.
    pub fn from_config(
        config: &Config,
        chunk_size: Option<usize>,
        overlap: Option<usize>,
    ) -> Result<Self> {
        let chunk_config = config.chunking().chunk_config(chunk_size, overlap)?;
        let tokenizer = tokenizer_from_name(config.chunking().tokenizer())?;
        Ok(Self::new(
            chunk_config,
            tokenizer,
            config.embeddings().include_provenance(),
        ))
    }

    /// Shows a progress bar on stderr while embedding.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunks pages in parallel. Passage order follows page order.
    pub fn chunk_pages(&self, pages: &[PageText]) -> Result<ChunkedPages> {
        let per_page = pages
            .par_iter()
            .map(|page| {
                self.chunker
                    .chunk_page(&page.text, &page.source, page.page_no)
            })
            .collect::<Result<Vec<Vec<Passage>>>>()?;

        let mut chunked = ChunkedPages::default();
        for (page, passages) in pages.iter().zip(per_page) {
            if passages.is_empty() {
                tracing::warn!(
                    "{} page {} has no text; it needs OCR and was skipped",
                    page.source,
                    page.page_no
                );
                chunked.needs_ocr.push(SkippedPage {
                    source: page.source.clone(),
                    page_no: page.page_no,
                });
            }
            chunked.passages.extend(passages);
        }

        tracing::debug!(
            pages = pages.len(),
            passages = chunked.passages.len(),
            "chunked pages"
        );
        Ok(chunked)
    }

    /// Embeds passages batch by batch, keeping input order.
    pub fn embed_passages<P: EmbeddingProvider + ?Sized>(
        &self,
        provider: &mut P,
        passages: &[Passage],
    ) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = passages
            .iter()
            .map(|p| {
                if self.include_provenance {
                    p.label()
                } else {
                    p.text.clone()
                }
            })
            .collect();

        let pb = if self.show_progress {
            let pb = ProgressBar::new(texts.len() as u64);
            let style = ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} passages | Embedding {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##.");
            pb.set_style(style);
            pb.set_message(provider.model_id().to_string());
            pb
        } else {
            ProgressBar::hidden()
        };

        let batch_size = provider.batch_size().max(1);
        let dimension = provider.dimension();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let embedded = provider
                .embed_texts(batch)
                .map_err(RetrievalError::Embedding)?;
            validate_batch(batch.len(), dimension, &embedded).map_err(RetrievalError::Embedding)?;
            vectors.extend(embedded);
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        Ok(vectors)
    }

    /// Builds a fresh index from pages.
    pub fn build<P: EmbeddingProvider + ?Sized>(
        &self,
        provider: &mut P,
        pages: &[PageText],
    ) -> Result<(VectorIndex, BuildReport)> {
        let base = VectorIndex::empty(provider.model_id(), provider.dimension())?;
        self.append(provider, &base, pages)
    }

    /// Returns a new index holding `base` followed by passages from `pages`.
    /// `base` itself is not modified.
    pub fn append<P: EmbeddingProvider + ?Sized>(
        &self,
        provider: &mut P,
        base: &VectorIndex,
        pages: &[PageText],
    ) -> Result<(VectorIndex, BuildReport)> {
        if provider.model_id() != base.model_id() {
            return Err(RetrievalError::ModelMismatch {
                expected: base.model_id().to_string(),
                actual: provider.model_id().to_string(),
            });
        }
        if provider.dimension() != base.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: base.dimension(),
                actual: provider.dimension(),
            });
        }

        let ChunkedPages {
            passages,
            needs_ocr,
        } = self.chunk_pages(pages)?;
        if passages.is_empty() {
            return Err(RetrievalError::config("No passages to index"));
        }

        let vectors = self.embed_passages(provider, &passages)?;
        let added = passages.len();

        let mut index = base.clone();
        index.add(vectors, passages)?;

        tracing::info!(
            pages = pages.len(),
            added,
            total = index.len(),
            skipped = needs_ocr.len(),
            "built index"
        );

        let report = BuildReport {
            model_id: index.model_id().to_string(),
            dimension: index.dimension(),
            pages: pages.len(),
            passages: added,
            total_passages: index.len(),
            needs_ocr,
        };
        Ok((index, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::HashEmbedder;
    use crate::embedding::tokenizer::RegexTokenizer;

    fn builder(chunk_size: usize, overlap: usize) -> IndexBuilder {
        IndexBuilder::new(
            ChunkConfig::new(chunk_size, overlap).unwrap(),
            Box::new(RegexTokenizer::new()),
            true,
        )
    }

    fn long_page(source: &str, page_no: u32, words: usize) -> PageText {
        let text = (0..words)
            .map(|i| format!("entry{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        PageText::new(source, page_no, text)
    }

    #[test]
    fn chunk_pages_preserves_page_order() {
        let pages: Vec<PageText> = (1..=20).map(|n| long_page("doc.txt", n, 30)).collect();
        let chunked = builder(16, 4).chunk_pages(&pages).unwrap();

        let order: Vec<(u32, u32)> = chunked
            .passages
            .iter()
            .map(|p| (p.page_no, p.chunk_index))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert!(chunked.needs_ocr.is_empty());
    }

    #[test]
    fn blank_pages_are_reported_for_ocr() {
        let pages = vec![
            PageText::new("a.txt", 1, "Opening balance 10.00"),
            PageText::new("a.txt", 2, "   \n"),
            PageText::new("a.txt", 3, "Closing balance 12.00"),
        ];
        let chunked = builder(800, 150).chunk_pages(&pages).unwrap();
        assert_eq!(chunked.passages.len(), 2);
        assert_eq!(
            chunked.needs_ocr,
            vec![SkippedPage {
                source: "a.txt".to_string(),
                page_no: 2
            }]
        );
    }

    #[test]
    fn build_embeds_every_passage_in_order() {
        let pages = vec![long_page("jan.txt", 1, 100), long_page("feb.txt", 1, 40)];
        let mut provider = HashEmbedder::new(32).with_batch_size(3);
        let (index, report) = builder(20, 5).build(&mut provider, &pages).unwrap();

        assert_eq!(index.len(), report.passages);
        assert_eq!(report.total_passages, index.len());
        assert_eq!(report.model_id, "blake3-hash-32");
        assert_eq!(index.passage(0).unwrap().source, "jan.txt");
        assert_eq!(index.passages().last().unwrap().source, "feb.txt");

        // Batched embedding equals one-at-a-time embedding.
        let third = index.passage(2).unwrap().label();
        let mut single = provider.embed_one(&third).unwrap();
        crate::embedding::index::l2_normalize(&mut single);
        for (a, b) in single.iter().zip(index.vector(2).unwrap()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn build_with_no_text_is_a_configuration_error() {
        let pages = vec![PageText::new("scan.txt", 1, "")];
        let mut provider = HashEmbedder::new(16);
        let err = builder(800, 150).build(&mut provider, &pages).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("No passages to index"));
    }

    #[test]
    fn append_leaves_base_untouched() {
        let mut provider = HashEmbedder::new(16);
        let b = builder(800, 150);
        let (base, _) = b
            .build(&mut provider, &[PageText::new("jan.txt", 1, "January")])
            .unwrap();
        let (grown, report) = b
            .append(&mut provider, &base, &[PageText::new("feb.txt", 1, "February")])
            .unwrap();

        assert_eq!(base.len(), 1);
        assert_eq!(grown.len(), 2);
        assert_eq!(report.passages, 1);
        assert_eq!(grown.passage(1).unwrap().source, "feb.txt");
    }

    #[test]
    fn append_rejects_duplicate_pages() {
        let mut provider = HashEmbedder::new(16);
        let b = builder(800, 150);
        let page = PageText::new("jan.txt", 1, "January");
        let (base, _) = b.build(&mut provider, &[page.clone()]).unwrap();
        let err = b.append(&mut provider, &base, &[page]).unwrap_err();
        assert!(matches!(err, RetrievalError::DuplicatePassage { .. }));
    }

    #[test]
    fn append_rejects_other_model() {
        let b = builder(800, 150);
        let (base, _) = b
            .build(&mut HashEmbedder::new(16), &[PageText::new("a.txt", 1, "x")])
            .unwrap();
        let err = b
            .append(&mut HashEmbedder::new(8), &base, &[PageText::new("b.txt", 1, "y")])
            .unwrap_err();
        assert!(matches!(err, RetrievalError::ModelMismatch { .. }));
    }

    #[test]
    fn embedding_failure_is_reported() {
        struct Broken;
        impl EmbeddingProvider for Broken {
            fn model_id(&self) -> &str {
                "broken"
            }
            fn dimension(&self) -> usize {
                4
            }
            fn batch_size(&self) -> usize {
                8
            }
            fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
            }
        }

        let err = builder(800, 150)
            .build(&mut Broken, &[PageText::new("a.txt", 1, "text")])
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
    }
}
