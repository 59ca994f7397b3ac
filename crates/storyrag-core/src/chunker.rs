//! Fixed-size character windows with overlap.
//!
//! Windows are `chunk_size` characters long and advance by
//! `chunk_size - overlap`; the last window may be shorter and is never padded.
//! Offsets count Unicode scalar values, not bytes.

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn overlap(&self) -> usize { self.overlap }

    fn step(&self) -> usize { self.chunk_size - self.overlap }

    /// Lazily split `document`. Calling again restarts from the beginning.
    pub fn chunk<'a>(&self, document: &'a Document) -> Chunks<'a> {
        Chunks { document, chunker: *self, start_char: 0, start_byte: 0, index: 0, done: document.text.is_empty() }
    }
}

/// Split `document` into overlapping windows.
pub fn chunk(document: &Document, chunk_size: usize, overlap: usize) -> Result<Chunks<'_>> {
    Ok(Chunker::new(chunk_size, overlap)?.chunk(document))
}

/// Finite, restartable (via `Clone`) chunk sequence borrowed from a document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    chunker: Chunker,
    start_char: usize,
    start_byte: usize,
    index: usize,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        let text = &self.document.text;
        let size = self.chunker.chunk_size;
        let step = self.chunker.step();

        let mut chars = 0usize;
        let mut end_byte = text.len();
        let mut next_byte = text.len();
        for (offset, _) in text[self.start_byte..].char_indices() {
            if chars == step {
                next_byte = self.start_byte + offset;
            }
            if chars == size {
                end_byte = self.start_byte + offset;
                break;
            }
            chars += 1;
        }

        let mut metadata = self.document.metadata.clone();
        metadata.insert("chunk_index".to_string(), self.index.to_string());
        let chunk = Chunk {
            id: ChunkId::derive(&self.document.source_id, self.start_char),
            source_id: self.document.source_id.clone(),
            start: self.start_char,
            end: self.start_char + chars,
            text: text[self.start_byte..end_byte].to_string(),
            metadata,
        };

        if end_byte == text.len() {
            self.done = true;
        } else {
            self.start_char += step;
            self.start_byte = next_byte;
            self.index += 1;
        }
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(len: usize) -> Document {
        let text: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        Document::new("doc.txt", text)
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn empty_text_yields_nothing() {
        let d = Document::new("empty", "");
        assert_eq!(chunk(&d, 100, 20).expect("chunker").count(), 0);
    }

    #[test]
    fn covers_document_with_exact_overlap() {
        let d = doc(3456);
        let chunks: Vec<_> = chunk(&d, 1000, 100).expect("chunker").collect();
        assert_eq!(chunks.first().map(|c| c.start), Some(0));
        assert_eq!(chunks.last().map(|c| c.end), Some(3456));
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end, "no gap between chunks");
            assert_eq!(pair[0].end - pair[1].start, 100);
        }
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.end - c.start, 1000);
        }
    }

    #[test]
    fn final_window_is_short_and_unpadded() {
        let d = doc(240);
        let chunks: Vec<_> = chunk(&d, 100, 20).expect("chunker").collect();
        let ranges: Vec<_> = chunks.iter().map(Chunk::range).collect();
        assert_eq!(ranges, vec![0..100, 80..180, 160..240]);
        assert_eq!(chunks[2].text.chars().count(), 80);
        assert_eq!(chunks[2].metadata.get("chunk_index").map(String::as_str), Some("2"));
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let d = Document::new("s", "hello");
        let chunks: Vec<_> = chunk(&d, 100, 20).expect("chunker").collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[0].range(), 0..5);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let d = Document::new("u", "héllo wörld ñandú");
        let chunks: Vec<_> = chunk(&d, 6, 2).expect("chunker").collect();
        for c in &chunks {
            let expected: String = d.text.chars().skip(c.start).take(c.end - c.start).collect();
            assert_eq!(c.text, expected);
        }
        assert_eq!(chunks.last().map(|c| c.end), Some(d.text.chars().count()));
    }

    #[test]
    fn restart_reproduces_identical_chunks() {
        let d = doc(500);
        let chunker = Chunker::new(120, 30).expect("chunker");
        let it = chunker.chunk(&d);
        let first: Vec<_> = it.clone().collect();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
        assert_eq!(first, chunker.chunk(&d).collect::<Vec<_>>());
    }

    #[test]
    fn zero_overlap_tiles_the_text() {
        let d = doc(25);
        let ranges: Vec<_> = chunk(&d, 10, 0).expect("chunker").map(|c| c.range()).collect();
        assert_eq!(ranges, vec![0..10, 10..20, 20..25]);
    }
}
