mod common;

use std::path::Path;
use std::sync::Arc;

use common::{alex, dentist_doc, toys_doc, KeywordEmbedder, ScriptedService};
use storyrag_core::config::{RagConfig, Settings};
use storyrag_core::types::Chunk;
use storyrag_core::types::ChunkId;
use storyrag_core::Error;
use storyrag_pipeline::AppContext;
use storyrag_vector::KnowledgeBase;

fn settings(snapshot_dir: &Path, dimensionality: usize) -> Settings {
    let mut settings = Settings::default();
    settings.rag = RagConfig::new(100, 20, 2, 64, dimensionality).unwrap();
    settings.paths.snapshot_dir = snapshot_dir.to_string_lossy().into_owned();
    settings
}

fn context(dir: &Path) -> storyrag_core::Result<AppContext> {
    AppContext::new(settings(dir, 3), Arc::new(KeywordEmbedder), Arc::new(ScriptedService::replying("A calm story.")))
}

#[test]
fn fresh_directory_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir.path().join("db")).unwrap();
    let status = ctx.status();
    assert_eq!(status.index_entries, 0);
    assert_eq!(status.dim, 3);
    assert!(status.manifest.is_none());
}

#[tokio::test]
async fn ingest_persist_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("db");
    {
        let mut ctx = context(&db).unwrap();
        let report = ctx.ingest(&vec![dentist_doc(), toys_doc()], false).unwrap();
        assert_eq!(report.chunks, 6);
        let manifest = ctx.persist().unwrap();
        assert_eq!(manifest.entries, 6);
        assert_eq!(manifest.embedder_id, "keyword:d3");
    }

    let ctx = context(&db).unwrap();
    let status = ctx.status();
    assert_eq!(status.index_entries, 6);
    assert_eq!(status.corpus_entries, 6);
    assert!(status.manifest.is_some());

    let story = ctx.pipeline().unwrap().compose(&alex("visiting the dentist")).await.unwrap();
    assert_eq!(story.text, "A calm story.");
}

#[test]
fn snapshot_dimension_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let kb = KnowledgeBase::new(4);
    let text = "Going to the dentist.";
    let chunk = Chunk {
        id: ChunkId::derive("a.txt", 0),
        source_id: "a.txt".into(),
        start: 0,
        end: text.chars().count(),
        text: text.into(),
        metadata: Default::default(),
    };
    kb.put(chunk, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    kb.persist(dir.path(), "other:d4").unwrap();

    assert!(matches!(context(dir.path()), Err(Error::InvalidConfig(_))));
}

#[test]
fn embedder_dimension_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let result = AppContext::new(settings(dir.path(), 384), Arc::new(KeywordEmbedder), Arc::new(ScriptedService::replying("x")));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn partial_snapshot_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ctx = context(dir.path()).unwrap();
        ctx.ingest(&vec![dentist_doc()], false).unwrap();
        ctx.persist().unwrap();
    }
    std::fs::remove_file(dir.path().join("manifest.json")).unwrap();
    assert!(matches!(context(dir.path()), Err(Error::IndexUnavailable(_))));
}

#[test]
fn rebuild_recovers_lost_vectors() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ctx = context(dir.path()).unwrap();
        ctx.ingest(&vec![dentist_doc(), toys_doc()], false).unwrap();
        ctx.persist().unwrap();
    }
    std::fs::write(dir.path().join("vectors.json"), b"{ truncated").unwrap();
    assert!(matches!(context(dir.path()), Err(Error::IndexUnavailable(_))));

    let ctx = AppContext::rebuild(settings(dir.path(), 3), Arc::new(KeywordEmbedder), Arc::new(ScriptedService::replying("x"))).unwrap();
    assert_eq!(ctx.status().index_entries, 6);
    assert_eq!(ctx.manifest().map(|m| m.entries), Some(6));

    let reloaded = context(dir.path()).unwrap();
    assert_eq!(reloaded.status().index_entries, 6);
    let hits = reloaded.retriever().retrieve("visiting the dentist", 2).unwrap();
    assert!(hits.passages.iter().all(|p| p.chunk.source_id == "dentist.txt"));
}
