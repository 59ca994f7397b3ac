//! Turns ranked passages and personalization fields into a finished story.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use storyrag_core::config::{GenerationConfig, RagConfig};
use storyrag_core::traits::GenerationService;
use storyrag_core::types::{GenerationResult, Personalization, RetrievalResult};
use storyrag_core::{Error, Result};

use crate::prompt::{validate_fields, PromptTemplate};
use crate::stage::{CallTrace, Stage};

pub struct GenerationOrchestrator {
    service: Arc<dyn GenerationService>,
    template: PromptTemplate,
    max_tokens: usize,
    timeout: Option<Duration>,
    control_tokens: Vec<String>,
}

impl GenerationOrchestrator {
    pub fn new(service: Arc<dyn GenerationService>, template: PromptTemplate, max_tokens: usize) -> Self {
        Self { service, template, max_tokens, timeout: None, control_tokens: Vec::new() }
    }

    pub fn from_config(service: Arc<dyn GenerationService>, generation: &GenerationConfig, rag: &RagConfig) -> Result<Self> {
        Ok(Self::new(service, PromptTemplate::new(&generation.template)?, rag.max_tokens)
            .with_timeout(generation.timeout_secs.map(Duration::from_secs))
            .with_control_tokens(generation.control_tokens.clone()))
    }

    /// Default deadline for `generate`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sentinels stripped in addition to the ones the service reports.
    pub fn with_control_tokens(mut self, tokens: Vec<String>) -> Self {
        self.control_tokens = tokens;
        self
    }

    pub fn build_prompt(&self, fields: &Personalization, retrieval: &RetrievalResult) -> String {
        self.template.render(fields, &retrieval.context())
    }

    pub async fn generate(&self, fields: &Personalization, retrieval: &RetrievalResult) -> Result<GenerationResult> {
        self.generate_with_deadline(fields, retrieval, self.timeout).await
    }

    /// `deadline` bounds the service call; `None` waits indefinitely.
    pub async fn generate_with_deadline(
        &self,
        fields: &Personalization,
        retrieval: &RetrievalResult,
        deadline: Option<Duration>,
    ) -> Result<GenerationResult> {
        validate_fields(fields)?;
        let mut trace = CallTrace::new();
        self.run(fields, retrieval, deadline, &mut trace).await
    }

    pub(crate) fn default_deadline(&self) -> Option<Duration> { self.timeout }

    pub(crate) async fn run(
        &self,
        fields: &Personalization,
        retrieval: &RetrievalResult,
        deadline: Option<Duration>,
        trace: &mut CallTrace,
    ) -> Result<GenerationResult> {
        trace.enter(Stage::Prompting);
        let prompt = self.build_prompt(fields, retrieval);
        if retrieval.is_empty() {
            info!("no retrieved context; generating from personalization fields alone");
        }

        trace.enter(Stage::Invoking);
        let start = Instant::now();
        let call = self.service.complete(&prompt, self.max_tokens);
        // Dropping the in-flight future on timeout releases its connection and buffers.
        let raw = match deadline {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(res) => res,
                Err(_) => Err(Error::Timeout(limit)),
            },
            None => call.await,
        }
        .map_err(|e| trace.fail(e))?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, chars = raw.len(), "generation returned");

        trace.enter(Stage::PostProcessing);
        let text = self.post_process(&prompt, &raw).map_err(|e| trace.fail(e))?;
        trace.enter(Stage::Done);
        Ok(GenerationResult { text })
    }

    /// Strip the echoed prompt (only when the service reports echoing),
    /// control tokens and surrounding whitespace.
    pub fn post_process(&self, prompt: &str, raw: &str) -> Result<String> {
        let mut text = raw;
        if self.service.echoes_prompt() {
            match raw.strip_prefix(prompt) {
                Some(rest) => text = rest,
                None => warn!("service reports prompt echo but output does not start with the prompt"),
            }
        }
        let mut cleaned = text.to_string();
        for token in self.service.control_tokens().iter().chain(self.control_tokens.iter()) {
            if !token.is_empty() {
                cleaned = cleaned.replace(token.as_str(), "");
            }
        }
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Err(Error::EmptyGeneration);
        }
        Ok(cleaned.to_string())
    }
}
