//! storyrag-pipeline
//!
//! Ingestion, retrieval and story generation over a `storyrag-vector`
//! knowledge base. `AppContext` owns the long-lived handles; `StoryPipeline`
//! is the query-time surface.

pub mod context;
pub mod http;
pub mod ingest;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod stage;

use std::sync::Arc;
use std::time::Duration;

use storyrag_core::types::{GenerationResult, Personalization, RetrievalResult};
use storyrag_core::{Error, Result};

pub use context::{AppContext, Status};
pub use http::HttpCompletionService;
pub use ingest::{rebuild_from_corpus, IngestReport, Ingestor};
pub use orchestrator::GenerationOrchestrator;
pub use prompt::PromptTemplate;
pub use retriever::Retriever;
pub use stage::{CallTrace, FailureReason, Stage};

/// Situation in, story out. Cheap to clone; clones share the retriever and
/// orchestrator, so one pipeline can serve many concurrent calls.
#[derive(Clone)]
pub struct StoryPipeline {
    retriever: Arc<Retriever>,
    orchestrator: Arc<GenerationOrchestrator>,
    k: usize,
}

impl StoryPipeline {
    pub fn new(retriever: Retriever, orchestrator: GenerationOrchestrator, k: usize) -> Self {
        Self { retriever: Arc::new(retriever), orchestrator: Arc::new(orchestrator), k }
    }

    pub fn retriever(&self) -> &Retriever { &self.retriever }
    pub fn orchestrator(&self) -> &GenerationOrchestrator { &self.orchestrator }

    pub async fn compose(&self, fields: &Personalization) -> Result<GenerationResult> {
        self.compose_traced(fields, None).await.0
    }

    /// Run one call and hand back the stages it went through. `deadline`
    /// overrides the orchestrator's configured generation timeout.
    pub async fn compose_traced(&self, fields: &Personalization, deadline: Option<Duration>) -> (Result<GenerationResult>, CallTrace) {
        let mut trace = CallTrace::new();
        let result = self.run(fields, deadline, &mut trace).await;
        (result, trace)
    }

    async fn run(&self, fields: &Personalization, deadline: Option<Duration>, trace: &mut CallTrace) -> Result<GenerationResult> {
        prompt::validate_fields(fields)?;
        let retrieval = self.retrieve(&fields.situation, trace).await?;
        let deadline = deadline.or(self.orchestrator.default_deadline());
        self.orchestrator.run(fields, &retrieval, deadline, trace).await
    }

    /// Embedding and search are CPU-bound, so they run on the blocking pool.
    async fn retrieve(&self, query: &str, trace: &mut CallTrace) -> Result<RetrievalResult> {
        let retriever = Arc::clone(&self.retriever);
        let query = query.to_string();
        let k = self.k;
        let mut local = std::mem::take(trace);
        let (result, local) = tokio::task::spawn_blocking(move || {
            let result = retriever.retrieve_traced(&query, k, None, &mut local);
            (result, local)
        })
        .await
        .map_err(|e| Error::Operation(format!("retrieval task failed: {e}")))?;
        *trace = local;
        result
    }
}
