//! storyrag-vector
//!
//! Exact cosine vector index, corpus store, and the snapshot that persists
//! both together. See `knowledge` for the consistency rules.

pub mod corpus;
pub mod flat;
pub mod knowledge;
pub mod layout;

pub use corpus::CorpusStore;
pub use flat::FlatIndex;
pub use knowledge::{read_corpus, read_manifest, KnowledgeBase, PutOutcome};
pub use layout::{IndexEntry, Manifest};
