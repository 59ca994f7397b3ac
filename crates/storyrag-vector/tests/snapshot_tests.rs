use std::fs;
use std::sync::Arc;
use std::thread;

use storyrag_core::traits::VectorIndex;
use storyrag_core::types::{Chunk, ChunkId, Meta};
use storyrag_core::Error;
use storyrag_vector::{read_corpus, FlatIndex, KnowledgeBase, PutOutcome};

fn chunk(source: &str, start: usize, text: &str) -> Chunk {
    Chunk {
        id: ChunkId::derive(source, start),
        source_id: source.to_string(),
        start,
        end: start + text.chars().count(),
        text: text.to_string(),
        metadata: Meta::new(),
    }
}

fn sample_kb() -> KnowledgeBase {
    let kb = KnowledgeBase::new(3);
    kb.put(chunk("a.txt", 0, "dentist chair"), &[1.0, 0.1, 0.0]).unwrap();
    kb.put(chunk("a.txt", 80, "teeth brushing"), &[0.9, 0.2, 0.1]).unwrap();
    kb.put(chunk("b.txt", 0, "sharing toys"), &[0.0, 1.0, 0.3]).unwrap();
    kb.put(chunk("b.txt", 80, "taking turns"), &[0.1, 0.8, 0.6]).unwrap();
    kb
}

#[test]
fn persist_then_load_reproduces_search_results() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = sample_kb();
    let manifest = kb.persist(tmp.path(), "test:d3").unwrap();
    assert_eq!(manifest.entries, 4);
    assert_eq!(manifest.dim, 3);

    let (loaded, loaded_manifest) = KnowledgeBase::load(tmp.path()).unwrap();
    assert_eq!(loaded_manifest, manifest);
    assert_eq!(loaded.len(), 4);
    for q in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.3, 0.3, 0.3], [0.0, 0.0, 0.0]] {
        for k in 1..=5 {
            assert_eq!(kb.index().search(&q, k).unwrap(), loaded.index().search(&q, k).unwrap());
        }
    }
    assert_eq!(kb.corpus().chunks().unwrap(), loaded.corpus().chunks().unwrap());
}

#[test]
fn load_missing_location_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(matches!(KnowledgeBase::load(&tmp.path().join("nope")), Err(Error::IndexUnavailable(_))));
    assert!(matches!(FlatIndex::load(&tmp.path().join("vectors.json")), Err(Error::IndexUnavailable(_))));
}

#[test]
fn corrupt_artifact_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    sample_kb().persist(tmp.path(), "test:d3").unwrap();
    fs::write(tmp.path().join("vectors.json"), b"{ not json").unwrap();
    assert!(matches!(KnowledgeBase::load(tmp.path()), Err(Error::IndexUnavailable(_))));
}

#[test]
fn interrupted_persist_is_detected_and_corpus_stays_readable() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = sample_kb();
    kb.persist(tmp.path(), "test:d3").unwrap();

    // Simulate a crash after the corpus artifact of a newer snapshot was written.
    kb.put(chunk("c.txt", 0, "fire drill"), &[0.0, 0.0, 1.0]).unwrap();
    kb.corpus().persist(&tmp.path().join("corpus.json")).unwrap();

    assert!(matches!(KnowledgeBase::load(tmp.path()), Err(Error::IndexUnavailable(_))));
    let corpus = read_corpus(tmp.path()).unwrap();
    assert_eq!(corpus.len(), 5);
}

#[test]
fn put_rejects_bad_vector_without_orphaning_text() {
    let kb = KnowledgeBase::new(3);
    let c = chunk("a.txt", 0, "text");
    assert!(matches!(kb.put(c.clone(), &[1.0, 2.0]), Err(Error::DimensionMismatch { expected: 3, actual: 2 })));
    assert!(kb.corpus().is_empty());
    assert!(kb.index().is_empty());

    assert_eq!(kb.put(c.clone(), &[1.0, 0.0, 0.0]).unwrap(), PutOutcome::Inserted);
    assert_eq!(kb.put(c, &[1.0, 0.0, 0.0]).unwrap(), PutOutcome::Replaced);
    kb.check_consistency().unwrap();
}

#[test]
fn concurrent_searches_during_ingestion() {
    let kb = Arc::new(sample_kb());
    let writer = {
        let kb = Arc::clone(&kb);
        thread::spawn(move || {
            for i in 0..200 {
                kb.put(chunk("w.txt", i * 10, "more"), &[0.2, 0.2, 1.0]).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let kb = Arc::clone(&kb);
            thread::spawn(move || {
                for _ in 0..200 {
                    let hits = kb.index().search(&[1.0, 0.0, 0.0], 3).unwrap();
                    assert!(hits.len() <= 3);
                    assert_eq!(hits[0].id, ChunkId::derive("a.txt", 0));
                }
            })
        })
        .collect();
    writer.join().unwrap();
    for r in readers { r.join().unwrap(); }
    assert_eq!(kb.len(), 204);
    kb.check_consistency().unwrap();
}

/// Deterministic pseudo-random components in [-1, 1).
fn noise_vector(seed: u64, dim: usize) -> Vec<f32> {
    let mut bytes = vec![0u8; dim * 4];
    blake3::Hasher::new().update(&seed.to_le_bytes()).finalize_xof().fill(&mut bytes);
    bytes
        .chunks_exact(4)
        .map(|b| (u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32)
        .collect()
}

#[test]
fn high_dimensional_round_trip_is_bit_exact() {
    let dim = 384;
    let tmp = tempfile::tempdir().unwrap();
    let kb = KnowledgeBase::new(dim);
    for i in 0..200u64 {
        kb.put(chunk("bulk.txt", i as usize * 10, "text"), &noise_vector(i, dim)).unwrap();
    }
    kb.persist(tmp.path(), "test:d384").unwrap();
    let (loaded, _) = KnowledgeBase::load(tmp.path()).unwrap();

    assert_eq!(loaded.index().entries().unwrap(), kb.index().entries().unwrap());
    for q in 1000..1010u64 {
        let query = noise_vector(q, dim);
        assert_eq!(loaded.index().search(&query, 10).unwrap(), kb.index().search(&query, 10).unwrap());
    }
}
