//! The vector index and the corpus store as one co-versioned unit.
//!
//! Every chunk id in the index has exactly one corpus entry and vice versa.
//! Writes (`put`, `persist`) go through a single writer gate; searches and
//! corpus reads only take the stores' read locks and may observe either side
//! of an in-flight `put`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use storyrag_core::traits::VectorIndex;
use storyrag_core::types::{Chunk, ChunkId};
use storyrag_core::{Error, Result};

use crate::corpus::CorpusStore;
use crate::flat::FlatIndex;
use crate::layout::{
    checksum, new_snapshot_id, read_artifact, to_json, write_atomic, CorpusFile, Manifest, VectorsFile, CORPUS_FILE,
    FORMAT_VERSION, MANIFEST_FILE, VECTORS_FILE,
};

pub struct KnowledgeBase {
    index: Arc<FlatIndex>,
    corpus: Arc<CorpusStore>,
    writer: Mutex<()>,
}

/// Whether a `put` added a new chunk id or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
}

impl KnowledgeBase {
    pub fn new(dim: usize) -> Self {
        Self::from_parts(FlatIndex::new(dim), CorpusStore::new())
    }

    fn from_parts(index: FlatIndex, corpus: CorpusStore) -> Self {
        Self { index: Arc::new(index), corpus: Arc::new(corpus), writer: Mutex::new(()) }
    }

    pub fn index(&self) -> &FlatIndex { &self.index }
    pub fn corpus(&self) -> &CorpusStore { &self.corpus }
    /// Read handles for query paths; writes still go through `put`.
    pub fn shared_index(&self) -> Arc<FlatIndex> { Arc::clone(&self.index) }
    pub fn shared_corpus(&self) -> Arc<CorpusStore> { Arc::clone(&self.corpus) }
    pub fn dim(&self) -> usize { self.index.dim() }
    pub fn len(&self) -> usize { self.index.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn gate(&self) -> Result<MutexGuard<'_, ()>> {
        self.writer.lock().map_err(|_| Error::Operation("knowledge base writer lock poisoned".into()))
    }

    /// Store the chunk text, then its vector. If the vector insert fails the
    /// corpus write is undone, so neither side is left without the other.
    pub fn put(&self, chunk: Chunk, vector: &[f32]) -> Result<PutOutcome> {
        let _gate = self.gate()?;
        self.index.check_vector(vector)?;
        let id = chunk.id.clone();
        let metadata = chunk.metadata.clone();
        let previous = self.corpus.put(chunk)?;
        if let Err(e) = self.index.insert(&id, vector, &metadata) {
            match previous {
                Some(prev) => { self.corpus.put(prev)?; }
                None => { self.corpus.remove(&id)?; }
            }
            return Err(e);
        }
        Ok(if previous.is_some() { PutOutcome::Replaced } else { PutOutcome::Inserted })
    }

    /// Confirm both stores hold the same chunk-id set.
    pub fn check_consistency(&self) -> Result<()> {
        let index_ids: HashSet<ChunkId> = self.index.ids()?.into_iter().collect();
        let corpus_ids: HashSet<ChunkId> = self.corpus.ids()?.into_iter().collect();
        if let Some(orphan) = index_ids.difference(&corpus_ids).next() {
            return Err(Error::IndexUnavailable(format!("vector {orphan} has no corpus entry")));
        }
        if let Some(orphan) = corpus_ids.difference(&index_ids).next() {
            return Err(Error::IndexUnavailable(format!("corpus entry {orphan} has no vector")));
        }
        Ok(())
    }

    /// Write corpus, then vectors, then the manifest that commits them.
    pub fn persist(&self, dir: &Path, embedder_id: &str) -> Result<Manifest> {
        let _gate = self.gate()?;
        let snapshot_id = new_snapshot_id();

        let corpus_bytes = to_json(&CorpusFile { format: FORMAT_VERSION, snapshot_id: snapshot_id.clone(), chunks: self.corpus.chunks()? })?;
        write_atomic(&dir.join(CORPUS_FILE), &corpus_bytes)?;

        let entries = self.index.entries()?;
        let count = entries.len();
        let vectors_bytes = to_json(&VectorsFile { format: FORMAT_VERSION, snapshot_id: snapshot_id.clone(), dim: self.dim(), entries })?;
        write_atomic(&dir.join(VECTORS_FILE), &vectors_bytes)?;

        let manifest = Manifest {
            format: FORMAT_VERSION,
            snapshot_id,
            created_at: chrono::Utc::now(),
            embedder_id: embedder_id.to_string(),
            dim: self.dim(),
            entries: count,
            corpus_blake3: checksum(&corpus_bytes),
            vectors_blake3: checksum(&vectors_bytes),
        };
        write_atomic(&dir.join(MANIFEST_FILE), &to_json(&manifest)?)?;
        info!(dir = %dir.display(), snapshot = %manifest.snapshot_id, entries = count, "snapshot persisted");
        Ok(manifest)
    }

    /// Load a committed snapshot. Any missing, corrupt or mismatched
    /// artifact fails with `IndexUnavailable`.
    pub fn load(dir: &Path) -> Result<(Self, Manifest)> {
        let manifest = read_manifest(dir)?;
        if manifest.format != FORMAT_VERSION {
            return Err(Error::IndexUnavailable(format!("unsupported snapshot format {}", manifest.format)));
        }

        let (corpus_file, corpus_bytes) = read_artifact::<CorpusFile>(&dir.join(CORPUS_FILE))?;
        if checksum(&corpus_bytes) != manifest.corpus_blake3 {
            return Err(Error::IndexUnavailable(format!("{CORPUS_FILE} does not match the manifest checksum")));
        }
        let (vectors_file, vectors_bytes) = read_artifact::<VectorsFile>(&dir.join(VECTORS_FILE))?;
        if checksum(&vectors_bytes) != manifest.vectors_blake3 {
            return Err(Error::IndexUnavailable(format!("{VECTORS_FILE} does not match the manifest checksum")));
        }
        if corpus_file.snapshot_id != manifest.snapshot_id || vectors_file.snapshot_id != manifest.snapshot_id {
            return Err(Error::IndexUnavailable("artifacts belong to different snapshots".into()));
        }
        if vectors_file.dim != manifest.dim {
            return Err(Error::IndexUnavailable(format!("manifest declares {} dims, vectors hold {}", manifest.dim, vectors_file.dim)));
        }

        let kb = Self::from_parts(FlatIndex::from_file(vectors_file)?, CorpusStore::from_file(corpus_file)?);
        kb.check_consistency()?;
        info!(dir = %dir.display(), snapshot = %manifest.snapshot_id, entries = kb.len(), "snapshot loaded");
        Ok((kb, manifest))
    }
}

pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    Ok(read_artifact::<Manifest>(&dir.join(MANIFEST_FILE))?.0)
}

/// Read the corpus artifact alone, as input for an index rebuild. A checksum
/// mismatch against the manifest is tolerated (the corpus is written first,
/// so it may be newer than the last commit).
pub fn read_corpus(dir: &Path) -> Result<CorpusStore> {
    let (file, bytes) = read_artifact::<CorpusFile>(&dir.join(CORPUS_FILE))?;
    match read_manifest(dir) {
        Ok(m) if m.corpus_blake3 != checksum(&bytes) => warn!(dir = %dir.display(), "corpus is newer than the committed manifest"),
        Err(e) => warn!(error = %e, "no readable manifest next to corpus"),
        Ok(_) => {}
    }
    CorpusStore::from_file(file)
}
