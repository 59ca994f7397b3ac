//! Chunk text and metadata keyed by chunk id, in insertion order.

use indexmap::IndexMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use storyrag_core::types::{Chunk, ChunkId};
use storyrag_core::{Error, Result};

use crate::layout::{read_artifact, to_json, write_atomic, CorpusFile, FORMAT_VERSION};

#[derive(Default)]
pub struct CorpusStore {
    chunks: RwLock<IndexMap<ChunkId, Chunk>>,
}

impl CorpusStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        let store = Self::new();
        for c in chunks {
            if store.contains(&c.id) {
                return Err(Error::IndexUnavailable(format!("duplicate chunk id {} in corpus", c.id)));
            }
            store.put(c)?;
        }
        Ok(store)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexMap<ChunkId, Chunk>>> {
        self.chunks.read().map_err(|_| Error::Operation("corpus lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexMap<ChunkId, Chunk>>> {
        self.chunks.write().map_err(|_| Error::Operation("corpus lock poisoned".into()))
    }

    /// Insert or replace; returns the previous chunk for this id.
    pub fn put(&self, chunk: Chunk) -> Result<Option<Chunk>> {
        Ok(self.write()?.insert(chunk.id.clone(), chunk))
    }

    pub fn get(&self, id: &ChunkId) -> Result<Chunk> {
        self.read()?.get(id).cloned().ok_or_else(|| Error::NotFound(id.clone()))
    }

    pub(crate) fn remove(&self, id: &ChunkId) -> Result<Option<Chunk>> {
        Ok(self.write()?.shift_remove(id))
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        match self.read() {
            Ok(chunks) => chunks.contains_key(id),
            Err(e) => {
                warn!(chunk_id = %id, error = %e, "reporting chunk as absent");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.read() {
            Ok(chunks) => chunks.len(),
            Err(e) => {
                warn!(error = %e, "reporting an empty corpus");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn ids(&self) -> Result<Vec<ChunkId>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    /// Copy of every chunk in insertion order.
    pub fn chunks(&self) -> Result<Vec<Chunk>> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Write this store alone as a corpus artifact.
    pub fn persist(&self, path: &Path) -> Result<()> {
        self.persist_as(path, "standalone")
    }

    pub(crate) fn persist_as(&self, path: &Path, snapshot_id: &str) -> Result<()> {
        let file = CorpusFile { format: FORMAT_VERSION, snapshot_id: snapshot_id.to_string(), chunks: self.chunks()? };
        write_atomic(path, &to_json(&file)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (file, _) = read_artifact::<CorpusFile>(path)?;
        Self::from_file(file)
    }

    pub(crate) fn from_file(file: CorpusFile) -> Result<Self> {
        if file.format != FORMAT_VERSION {
            return Err(Error::IndexUnavailable(format!("unsupported corpus format {}", file.format)));
        }
        Self::from_chunks(file.chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyrag_core::types::Meta;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk { id: ChunkId::from(id), source_id: "doc".into(), start: 0, end: text.chars().count(), text: text.into(), metadata: Meta::new() }
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = CorpusStore::new();
        assert!(matches!(store.get(&ChunkId::from("nope")), Err(Error::NotFound(_))));
    }

    #[test]
    fn put_replaces_and_reports_previous() {
        let store = CorpusStore::new();
        assert!(store.put(chunk("a", "one")).unwrap().is_none());
        let prev = store.put(chunk("a", "two")).unwrap();
        assert_eq!(prev.map(|c| c.text), Some("one".to_string()));
        assert_eq!(store.get(&ChunkId::from("a")).unwrap().text, "two");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let store = CorpusStore::new();
        for id in ["a", "b", "c", "d"] {
            store.put(chunk(id, id)).unwrap();
        }
        store.put(chunk("b", "bee")).unwrap();
        assert_eq!(store.ids().unwrap(), ["a", "b", "c", "d"].map(ChunkId::from).to_vec());

        assert_eq!(store.remove(&ChunkId::from("b")).unwrap().map(|c| c.text), Some("bee".to_string()));
        assert_eq!(store.ids().unwrap(), ["a", "c", "d"].map(ChunkId::from).to_vec());
        assert!(!store.contains(&ChunkId::from("b")));
        assert_eq!(store.get(&ChunkId::from("d")).unwrap().text, "d");
    }

    #[test]
    fn persist_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("corpus.json");
        let store = CorpusStore::new();
        store.put(chunk("b", "bravo")).unwrap();
        store.put(chunk("a", "alpha")).unwrap();
        store.persist(&path).unwrap();

        let loaded = CorpusStore::load(&path).unwrap();
        assert_eq!(loaded.chunks().unwrap(), store.chunks().unwrap());
        assert!(matches!(CorpusStore::load(&tmp.path().join("missing.json")), Err(Error::IndexUnavailable(_))));
    }
}
