use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use storyrag_core::traits::{EmbeddingProvider, VectorIndex};
use storyrag_core::types::{Meta, RetrievalResult, ScoredChunk};
use storyrag_core::{Error, Result};
use storyrag_vector::{CorpusStore, KnowledgeBase};

use crate::stage::{CallTrace, Stage};

/// Embeds a query, searches the vector index and resolves hits through the
/// corpus, keeping the index's ranking.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    corpus: Arc<CorpusStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, kb: &KnowledgeBase) -> Self {
        Self::from_parts(embedder, kb.shared_index(), kb.shared_corpus())
    }

    pub fn from_parts(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>, corpus: Arc<CorpusStore>) -> Self {
        Self { embedder, index, corpus }
    }

    pub fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        self.retrieve_traced(query, k, None, &mut CallTrace::new())
    }

    /// Only consider chunks whose metadata contains every pair in `filter`.
    pub fn retrieve_filtered(&self, query: &str, k: usize, filter: &Meta) -> Result<RetrievalResult> {
        self.retrieve_traced(query, k, Some(filter), &mut CallTrace::new())
    }

    pub(crate) fn retrieve_traced(&self, query: &str, k: usize, filter: Option<&Meta>, trace: &mut CallTrace) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(Error::InvalidInput("k must be at least 1".into()));
        }
        let start = Instant::now();

        trace.enter(Stage::Embedding);
        let vector = self.embedder.embed(query).map_err(|e| trace.fail(e))?;

        trace.enter(Stage::Searching);
        let hits = match filter {
            Some(f) => self.index.search_filtered(&vector, k, f),
            None => self.index.search(&vector, k),
        }
        .map_err(|e| trace.fail(e))?;

        trace.enter(Stage::Resolving);
        let mut passages = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.corpus.get(&hit.id) {
                Ok(chunk) => passages.push(ScoredChunk { chunk, score: hit.score }),
                Err(Error::NotFound(id)) => {
                    error!(chunk_id = %id, "index/corpus desynchronized: vector has no corpus entry, skipping");
                }
                Err(e) => {
                    error!(chunk_id = %hit.id, error = %e, "corpus lookup failed, skipping");
                }
            }
        }

        debug!(k, hits = passages.len(), elapsed_ms = start.elapsed().as_millis() as u64, "retrieved passages");
        Ok(RetrievalResult { passages })
    }
}
