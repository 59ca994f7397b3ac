//! Chunk, embed and store documents; rebuild an index from a stored corpus.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, info, warn};

use storyrag_core::chunker::Chunker;
use storyrag_core::source::DocumentSource;
use storyrag_core::traits::EmbeddingProvider;
use storyrag_core::types::{Chunk, Document};
use storyrag_core::{Error, Result};
use storyrag_vector::{CorpusStore, KnowledgeBase, PutOutcome};

/// Counts from one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub inserted: usize,
    pub replaced: usize,
}

impl IngestReport {
    fn absorb(&mut self, other: IngestReport) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        self.inserted += other.inserted;
        self.replaced += other.replaced;
    }
}

pub struct Ingestor<'kb> {
    embedder: Arc<dyn EmbeddingProvider>,
    kb: &'kb KnowledgeBase,
    chunker: Chunker,
    batch_size: usize,
    progress: ProgressBar,
}

fn chunk_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

impl<'kb> Ingestor<'kb> {
    /// Fails with `InvalidConfig` when the embedder and the index disagree on
    /// dimensionality.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, kb: &'kb KnowledgeBase, chunker: Chunker, batch_size: usize) -> Result<Self> {
        if embedder.dim() != kb.dim() {
            return Err(Error::InvalidConfig(format!(
                "embedder {} produces {} dims but the index holds {}",
                embedder.embedder_id(),
                embedder.dim(),
                kb.dim()
            )));
        }
        Ok(Self { embedder, kb, chunker, batch_size: batch_size.max(1), progress: ProgressBar::hidden() })
    }

    /// Draw a progress bar on stderr while ingesting.
    pub fn with_progress(mut self) -> Self {
        self.progress = chunk_bar(0);
        self
    }

    /// Ingest every document of `source`. Re-ingesting an unchanged document
    /// replaces its chunks in place and adds nothing.
    pub fn ingest(&self, source: &dyn DocumentSource) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        for document in source.documents() {
            let document = document?;
            report.absorb(self.ingest_document(&document)?);
        }
        self.progress.finish_with_message("ingestion complete");
        info!(
            documents = report.documents,
            chunks = report.chunks,
            inserted = report.inserted,
            replaced = report.replaced,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Chunks are pulled lazily, `batch_size` at a time, so only one batch of
    /// a document is held in memory while it is embedded.
    pub fn ingest_document(&self, document: &Document) -> Result<IngestReport> {
        let chunks = self.chunker.chunk(document);
        let mut report = store_chunks(self.embedder.as_ref(), self.kb, chunks, self.batch_size, &self.progress)?;
        if report.chunks == 0 {
            warn!(source = %document.source_id, "document is empty, nothing to index");
        }
        report.documents = 1;
        debug!(source = %document.source_id, chunks = report.chunks, "document ingested");
        Ok(report)
    }
}

fn store_chunks(
    embedder: &dyn EmbeddingProvider,
    kb: &KnowledgeBase,
    chunks: impl IntoIterator<Item = Chunk>,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut pending = chunks.into_iter();
    loop {
        let batch: Vec<Chunk> = pending.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        progress.inc_length(batch.len() as u64);
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != batch.len() {
            return Err(Error::EmbeddingUnavailable(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        for (chunk, vector) in batch.into_iter().zip(vectors.iter()) {
            match kb.put(chunk, vector)? {
                PutOutcome::Inserted => report.inserted += 1,
                PutOutcome::Replaced => report.replaced += 1,
            }
            report.chunks += 1;
            progress.inc(1);
        }
    }
    Ok(report)
}

/// Re-embed every stored chunk into a fresh knowledge base. Used when the
/// vector artifact is lost or the embedder changes.
pub fn rebuild_from_corpus(corpus: &CorpusStore, embedder: &dyn EmbeddingProvider, batch_size: usize) -> Result<KnowledgeBase> {
    let kb = KnowledgeBase::new(embedder.dim());
    let chunks = corpus.chunks()?;
    info!(chunks = chunks.len(), embedder = embedder.embedder_id(), "rebuilding vector index from corpus");
    let report = store_chunks(embedder, &kb, chunks, batch_size.max(1), &ProgressBar::hidden())?;
    debug!(inserted = report.inserted, "rebuild finished");
    Ok(kb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use storyrag_embed::HashedEmbedder;

    /// Notes how many chunks had been pulled from the source at each batch.
    struct PullWatcher {
        inner: HashedEmbedder,
        pulled: Arc<AtomicUsize>,
        seen: Mutex<Vec<usize>>,
    }

    impl EmbeddingProvider for PullWatcher {
        fn embedder_id(&self) -> &str { self.inner.embedder_id() }
        fn dim(&self) -> usize { self.inner.dim() }
        fn embed(&self, text: &str) -> Result<Vec<f32>> { self.inner.embed(text) }
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.seen.lock().unwrap().push(self.pulled.load(Ordering::SeqCst));
            self.inner.embed_batch(texts)
        }
    }

    #[test]
    fn rejects_dimension_disagreement() {
        let kb = KnowledgeBase::new(8);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashedEmbedder::new(16));
        let chunker = Chunker::new(10, 2).unwrap();
        assert!(matches!(Ingestor::new(embedder, &kb, chunker, 4), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn batches_cover_every_chunk() {
        let kb = KnowledgeBase::new(16);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashedEmbedder::new(16));
        let ingestor = Ingestor::new(embedder, &kb, Chunker::new(10, 0).unwrap(), 3).unwrap();
        let doc = Document::new("a.txt", "x".repeat(75));
        let report = ingestor.ingest_document(&doc).unwrap();
        assert_eq!(report.chunks, 8);
        assert_eq!(report.inserted, 8);
        assert_eq!(kb.len(), 8);
        assert_eq!(kb.corpus().len(), 8);
    }

    #[test]
    fn chunks_are_pulled_one_batch_at_a_time() {
        let kb = KnowledgeBase::new(16);
        let pulled = Arc::new(AtomicUsize::new(0));
        let watcher = PullWatcher { inner: HashedEmbedder::new(16), pulled: Arc::clone(&pulled), seen: Mutex::new(Vec::new()) };
        let doc = Document::new("a.txt", "y".repeat(75));
        let chunks = Chunker::new(10, 0).unwrap().chunk(&doc).inspect(|_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        });

        let report = store_chunks(&watcher, &kb, chunks, 3, &ProgressBar::hidden()).unwrap();
        assert_eq!(report.chunks, 8);
        assert_eq!(*watcher.seen.lock().unwrap(), vec![3, 6, 8]);
    }
}
