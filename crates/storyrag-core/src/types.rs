//! Domain types shared by the chunker, the stores and the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::ops::Range;
use twox_hash::XxHash64;

pub type Meta = HashMap<String, String>;

/// Stable identity of a chunk.
///
/// Derived from the source identifier and the chunk's start offset, so
/// re-chunking the same document with the same parameters reproduces the
/// same ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn derive(source_id: &str, start: usize) -> Self {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(source_id.as_bytes());
        Self(format!("{:016x}:{}", hasher.finish(), start))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw document as presented by a document source. Identified by `source_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source_id: String,
    pub text: String,
    pub metadata: Meta,
}

impl Document {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source_id: source_id.into(), text: text.into(), metadata: Meta::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous window of a document's text.
///
/// - `id`: derived from `source_id` + `start`
/// - `start`/`end`: character offsets into the source text, `end` exclusive
/// - `metadata`: inherited from the document, plus `chunk_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source_id: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub metadata: Meta,
}

impl Chunk {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Ranked output of a vector index query. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
}

/// A chunk resolved through the corpus together with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked passages for one query, highest similarity first. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passages: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Passage texts joined by newlines, in ranked order.
    pub fn context(&self) -> String {
        self.passages.iter().map(|p| p.chunk.text.as_str()).collect::<Vec<_>>().join("\n")
    }
}

/// Caller-supplied fields substituted into the story prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Personalization {
    pub name: String,
    pub age: String,
    pub situation: String,
    pub preferences: String,
    pub triggers: String,
}

/// Cleaned narrative returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
}
