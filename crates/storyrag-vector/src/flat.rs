//! Exact (brute-force) cosine index.
//!
//! Vectors are L2-normalized on insert, so a query costs one dot product per
//! stored entry (`O(n·d)`). Results are ranked by descending score with ties
//! broken by insertion order. Readers share an `RwLock`; `insert` takes it
//! exclusively.

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use storyrag_core::traits::VectorIndex;
use storyrag_core::types::{ChunkId, Meta, SearchHit};
use storyrag_core::{Error, Result};

use crate::layout::{read_artifact, to_json, write_atomic, IndexEntry, VectorsFile, FORMAT_VERSION};

struct Row {
    vector: Vec<f32>,
    metadata: Meta,
}

type Rows = IndexMap<ChunkId, Row>;

pub struct FlatIndex {
    dim: usize,
    rows: RwLock<Rows>,
}

/// The norm is accumulated in f64 so large finite components cannot
/// overflow the sum of squares.
pub(crate) fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|&x| (f64::from(x) / norm) as f32).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Descending score, then ascending insertion position.
fn by_rank(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, rows: RwLock::new(IndexMap::new()) }
    }

    /// Rebuild from persisted entries, preserving their order. Stored vectors
    /// are already normalized and are kept bit for bit.
    pub fn from_entries(dim: usize, entries: Vec<IndexEntry>) -> Result<Self> {
        let index = Self::new(dim);
        let mut rows = Rows::with_capacity(entries.len());
        for e in entries {
            index.check_vector(&e.vector)?;
            let row = Row { vector: e.vector, metadata: e.metadata };
            if rows.insert(e.id.clone(), row).is_some() {
                return Err(Error::IndexUnavailable(format!("duplicate chunk id {} in snapshot", e.id)));
            }
        }
        *index.write()? = rows;
        Ok(index)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Rows>> {
        self.rows.read().map_err(|_| Error::Operation("vector index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Rows>> {
        self.rows.write().map_err(|_| Error::Operation("vector index lock poisoned".into()))
    }

    /// Shape and value checks applied to stored and query vectors.
    pub fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: vector.len() });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidInput("vector has non-finite components".into()));
        }
        Ok(())
    }

    pub fn ids(&self) -> Result<Vec<ChunkId>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    /// Copy of every entry in insertion order.
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self
            .read()?
            .iter()
            .map(|(id, row)| IndexEntry { id: id.clone(), vector: row.vector.clone(), metadata: row.metadata.clone() })
            .collect())
    }

    fn ranked(&self, query: &[f32], k: usize, filter: Option<&Meta>) -> Result<Vec<SearchHit>> {
        self.check_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let q = normalize(query);
        let rows = self.read()?;
        let mut scored: Vec<(f32, usize)> = rows
            .values()
            .enumerate()
            .filter(|(_, row)| filter.map_or(true, |f| f.iter().all(|(key, val)| row.metadata.get(key) == Some(val))))
            .map(|(pos, row)| (dot(&q, &row.vector), pos))
            .collect();
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_by(by_rank);
        let hits: Vec<SearchHit> = scored
            .into_iter()
            .filter_map(|(score, pos)| rows.get_index(pos).map(|(id, _)| SearchHit { id: id.clone(), score }))
            .collect();
        debug!(k, scanned = rows.len(), hits = hits.len(), "flat search");
        Ok(hits)
    }

    /// Write this index alone as a vectors artifact.
    pub fn persist(&self, path: &Path) -> Result<()> {
        self.persist_as(path, "standalone")
    }

    pub(crate) fn persist_as(&self, path: &Path, snapshot_id: &str) -> Result<()> {
        let file = VectorsFile { format: FORMAT_VERSION, snapshot_id: snapshot_id.to_string(), dim: self.dim, entries: self.entries()? };
        write_atomic(path, &to_json(&file)?)
    }

    /// Restore an index written by `persist`. Missing or corrupt files fail
    /// with `IndexUnavailable`.
    pub fn load(path: &Path) -> Result<Self> {
        let (file, _) = read_artifact::<VectorsFile>(path)?;
        Self::from_file(file)
    }

    pub(crate) fn from_file(file: VectorsFile) -> Result<Self> {
        if file.format != FORMAT_VERSION {
            return Err(Error::IndexUnavailable(format!("unsupported vectors format {}", file.format)));
        }
        if file.dim == 0 {
            return Err(Error::IndexUnavailable("vectors artifact declares zero dimensionality".into()));
        }
        Self::from_entries(file.dim, file.entries).map_err(|e| match e {
            Error::IndexUnavailable(_) => e,
            other => Error::IndexUnavailable(format!("invalid vectors artifact: {other}")),
        })
    }
}

impl VectorIndex for FlatIndex {
    fn dim(&self) -> usize { self.dim }

    fn len(&self) -> usize {
        match self.read() {
            Ok(rows) => rows.len(),
            Err(e) => {
                warn!(error = %e, "reporting an empty index");
                0
            }
        }
    }

    fn contains(&self, id: &ChunkId) -> bool {
        match self.read() {
            Ok(rows) => rows.contains_key(id),
            Err(e) => {
                warn!(chunk_id = %id, error = %e, "reporting chunk as absent");
                false
            }
        }
    }

    fn insert(&self, id: &ChunkId, vector: &[f32], metadata: &Meta) -> Result<()> {
        self.check_vector(vector)?;
        let row = Row { vector: normalize(vector), metadata: metadata.clone() };
        // Replacing an existing id keeps its position.
        self.write()?.insert(id.clone(), row);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.ranked(query, k, None)
    }

    fn search_filtered(&self, query: &[f32], k: usize, filter: &Meta) -> Result<Vec<SearchHit>> {
        self.ranked(query, k, Some(filter))
    }
}
