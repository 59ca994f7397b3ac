//! On-disk snapshot layout: one directory holding two co-versioned artifacts
//! and the manifest that commits them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use storyrag_core::types::{Chunk, ChunkId, Meta};
use storyrag_core::{Error, Result};

pub const FORMAT_VERSION: u32 = 1;
pub const CORPUS_FILE: &str = "corpus.json";
pub const VECTORS_FILE: &str = "vectors.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub metadata: Meta,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VectorsFile {
    pub format: u32,
    pub snapshot_id: String,
    pub dim: usize,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CorpusFile {
    pub format: u32,
    pub snapshot_id: String,
    pub chunks: Vec<Chunk>,
}

/// Commit record for a snapshot. Written last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: u32,
    pub snapshot_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub embedder_id: String,
    pub dim: usize,
    pub entries: usize,
    pub corpus_blake3: String,
    pub vectors_blake3: String,
}

pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Write via a temp file in the same directory, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| Error::Operation(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Operation(format!("failed to persist {}: {}", path.display(), e)))?;
    Ok(())
}

/// Read a JSON artifact; missing or unparsable files are `IndexUnavailable`.
pub fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<(T, Vec<u8>)> {
    let bytes = fs::read(path).map_err(|e| Error::IndexUnavailable(format!("cannot read {}: {}", path.display(), e)))?;
    let value = serde_json::from_slice(&bytes).map_err(|e| Error::IndexUnavailable(format!("corrupt {}: {}", path.display(), e)))?;
    Ok((value, bytes))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Operation(e.to_string()))
}

pub fn new_snapshot_id() -> String {
    let now = chrono::Utc::now();
    format!("{}-{:06}", now.format("%Y%m%dT%H%M%S"), now.timestamp_subsec_micros())
}
