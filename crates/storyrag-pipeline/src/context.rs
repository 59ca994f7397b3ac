//! Process-wide handles built once at startup and shared by every query.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use storyrag_core::chunker::Chunker;
use storyrag_core::config::Settings;
use storyrag_core::source::DocumentSource;
use storyrag_core::traits::{EmbeddingProvider, GenerationService};
use storyrag_core::{Error, Result};
use storyrag_vector::layout::{CORPUS_FILE, MANIFEST_FILE, VECTORS_FILE};
use storyrag_vector::{read_corpus, KnowledgeBase, Manifest};

use crate::http::HttpCompletionService;
use crate::ingest::{rebuild_from_corpus, IngestReport, Ingestor};
use crate::orchestrator::GenerationOrchestrator;
use crate::retriever::Retriever;
use crate::StoryPipeline;

const SNAPSHOT_FILES: [&str; 3] = [MANIFEST_FILE, CORPUS_FILE, VECTORS_FILE];

pub struct AppContext {
    settings: Settings,
    embedder: Arc<dyn EmbeddingProvider>,
    service: Arc<dyn GenerationService>,
    kb: Arc<KnowledgeBase>,
    manifest: Option<Manifest>,
}

/// Snapshot and in-memory counts for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub snapshot_dir: PathBuf,
    pub embedder_id: String,
    pub dim: usize,
    pub index_entries: usize,
    pub corpus_entries: usize,
    pub manifest: Option<Manifest>,
}

fn has_snapshot(dir: &Path) -> bool {
    SNAPSHOT_FILES.iter().any(|f| dir.join(f).exists())
}

type Collaborators = (Arc<dyn EmbeddingProvider>, Arc<dyn GenerationService>);

fn collaborators(settings: &Settings) -> Result<Collaborators> {
    let embedder = storyrag_embed::get_default_embedder(&settings.embedding, settings.rag.dimensionality)?;
    let service: Arc<dyn GenerationService> = Arc::new(HttpCompletionService::from_config(&settings.generation)?);
    Ok((embedder, service))
}

fn check_dims(settings: &Settings, embedder: &dyn EmbeddingProvider) -> Result<()> {
    settings.validate()?;
    let dim = settings.rag.dimensionality;
    if embedder.dim() != dim {
        return Err(Error::InvalidConfig(format!(
            "embedder {} produces {} dims but rag.dimensionality is {dim}",
            embedder.embedder_id(),
            embedder.dim()
        )));
    }
    Ok(())
}

impl AppContext {
    /// Build from configuration: the configured embedder, the HTTP
    /// completion client and whatever snapshot `paths.snapshot_dir` holds.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let (embedder, service) = collaborators(&settings)?;
        Self::new(settings, embedder, service)
    }

    /// Like `from_settings`, but re-embeds the stored corpus instead of
    /// loading the vector artifact. See `rebuild`.
    pub fn rebuild_from_settings(settings: Settings) -> Result<Self> {
        let (embedder, service) = collaborators(&settings)?;
        Self::rebuild(settings, embedder, service)
    }

    /// A directory with no snapshot artifacts starts an empty knowledge
    /// base. A partial or corrupt snapshot, or one whose dimensionality
    /// differs from the embedder's, is fatal.
    pub fn new(settings: Settings, embedder: Arc<dyn EmbeddingProvider>, service: Arc<dyn GenerationService>) -> Result<Self> {
        check_dims(&settings, embedder.as_ref())?;
        let dim = settings.rag.dimensionality;
        let dir = PathBuf::from(&settings.paths.snapshot_dir);
        let (kb, manifest) = if has_snapshot(&dir) {
            let (kb, manifest) = KnowledgeBase::load(&dir)?;
            if manifest.dim != dim {
                return Err(Error::InvalidConfig(format!(
                    "snapshot at {} holds {}-dim vectors but rag.dimensionality is {dim}",
                    dir.display(),
                    manifest.dim
                )));
            }
            if manifest.embedder_id != embedder.embedder_id() {
                warn!(
                    snapshot = %manifest.embedder_id,
                    active = embedder.embedder_id(),
                    "snapshot was built with a different embedder; run `rebuild` to re-embed"
                );
            }
            (kb, Some(manifest))
        } else {
            info!(dir = %dir.display(), "no snapshot found, starting empty");
            (KnowledgeBase::new(dim), None)
        };

        Ok(Self { settings, embedder, service, kb: Arc::new(kb), manifest })
    }

    /// Repair path for a lost or stale vector artifact (or an embedder
    /// change): re-embed every stored chunk with `embedder`, commit a new
    /// snapshot and start from it.
    pub fn rebuild(settings: Settings, embedder: Arc<dyn EmbeddingProvider>, service: Arc<dyn GenerationService>) -> Result<Self> {
        check_dims(&settings, embedder.as_ref())?;
        let dir = PathBuf::from(&settings.paths.snapshot_dir);
        let corpus = read_corpus(&dir)?;
        let kb = rebuild_from_corpus(&corpus, embedder.as_ref(), settings.embedding.batch_size)?;
        let mut ctx = Self { settings, embedder, service, kb: Arc::new(kb), manifest: None };
        ctx.persist()?;
        Ok(ctx)
    }

    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> { Arc::clone(&self.embedder) }
    pub fn knowledge_base(&self) -> &KnowledgeBase { &self.kb }
    pub fn manifest(&self) -> Option<&Manifest> { self.manifest.as_ref() }

    fn snapshot_dir(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.snapshot_dir)
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.embedder(), &self.kb)
    }

    pub fn orchestrator(&self) -> Result<GenerationOrchestrator> {
        GenerationOrchestrator::from_config(Arc::clone(&self.service), &self.settings.generation, &self.settings.rag)
    }

    pub fn pipeline(&self) -> Result<StoryPipeline> {
        Ok(StoryPipeline::new(self.retriever(), self.orchestrator()?, self.settings.rag.k))
    }

    /// Ingest `source` into the shared knowledge base without persisting.
    pub fn ingest(&self, source: &dyn DocumentSource, progress: bool) -> Result<IngestReport> {
        let chunker = Chunker::new(self.settings.rag.chunk_size, self.settings.rag.overlap)?;
        let mut ingestor = Ingestor::new(self.embedder(), &self.kb, chunker, self.settings.embedding.batch_size)?;
        if progress {
            ingestor = ingestor.with_progress();
        }
        ingestor.ingest(source)
    }

    /// Commit the current knowledge base to `paths.snapshot_dir`.
    pub fn persist(&mut self) -> Result<&Manifest> {
        let dir = self.snapshot_dir();
        std::fs::create_dir_all(&dir)?;
        let manifest = self.kb.persist(&dir, self.embedder.embedder_id())?;
        Ok(self.manifest.insert(manifest))
    }

    pub fn status(&self) -> Status {
        Status {
            snapshot_dir: self.snapshot_dir(),
            embedder_id: self.embedder.embedder_id().to_string(),
            dim: self.kb.dim(),
            index_entries: self.kb.len(),
            corpus_entries: self.kb.corpus().len(),
            manifest: self.manifest.clone(),
        }
    }
}
