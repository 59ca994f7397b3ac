//! Completion client for OpenAI-compatible `/v1/completions` servers
//! (llama.cpp, vLLM, text-generation-inference and similar).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use storyrag_core::config::GenerationConfig;
use storyrag_core::traits::GenerationService;
use storyrag_core::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpCompletionService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    echo: bool,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: usize,
    echo: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpCompletionService {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::GenerationUnavailable(format!("http client: {e}")))?;
        Ok(Self { client, endpoint: endpoint.into(), model: model.into(), api_key: None, echo: false })
    }

    /// Build from configuration. The bearer token is read from the env var
    /// named by `api_key_env`; a named but unset variable is a config error.
    pub fn from_config(cfg: &GenerationConfig) -> Result<Self> {
        let api_key = match &cfg.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| Error::InvalidConfig(format!("environment variable {var} is not set")))?,
            ),
            None => None,
        };
        Ok(Self::new(cfg.endpoint.clone(), cfg.model.clone())?.with_api_key(api_key).with_echo(cfg.echo))
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Ask the server to return the prompt in front of the completion.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

#[async_trait]
impl GenerationService for HttpCompletionService {
    fn echoes_prompt(&self) -> bool {
        self.echo
    }

    fn control_tokens(&self) -> Vec<String> {
        vec!["<|endoftext|>".to_string()]
    }

    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        debug!(endpoint = %self.endpoint, model = %self.model, prompt_chars = prompt.len(), max_tokens, "requesting completion");
        let body = CompletionRequest { model: &self.model, prompt, max_tokens, echo: self.echo };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(endpoint = %self.endpoint, error = %e, "completion request failed");
            Error::GenerationUnavailable(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
            error!(endpoint = %self.endpoint, %status, "completion server error");
            return Err(Error::GenerationUnavailable(format!("server returned {status}: {detail}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::GenerationUnavailable(format!("failed to parse response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| Error::GenerationUnavailable("response has no choices".into()))
    }
}
