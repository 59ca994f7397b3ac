//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys split on `__`, e.g. `APP_RAG__K=3`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Prompt used by the original story generator.
pub const DEFAULT_TEMPLATE: &str =
    "<|startoftext|>This is a social story for a child named {name} about {situation}.\n\nHere is the story:\nMy name is {name}. {context}";

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load from the current directory.
    pub fn load() -> Result<Self> {
        Self::load_from(&env::current_dir()?)
    }

    pub fn load_from(base_dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: base_dir.to_path_buf() })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extract and validate the full settings tree. Relative paths are
    /// resolved against the directory the config was loaded from.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        settings.paths.corpus_dir = resolve_with_base(&self.base_dir, &settings.paths.corpus_dir).to_string_lossy().into_owned();
        settings.paths.snapshot_dir = resolve_with_base(&self.base_dir, &settings.paths.snapshot_dir).to_string_lossy().into_owned();
        settings.embedding.model_dir = resolve_with_base(&self.base_dir, &settings.embedding.model_dir).to_string_lossy().into_owned();
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rag: RagConfig,
    pub paths: PathsConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.rag.validate()?;
        self.embedding.validate()?;
        self.generation.validate()
    }
}

/// The recognized retrieval/generation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub k: usize,
    pub max_tokens: usize,
    pub dimensionality: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, overlap: 100, k: 2, max_tokens: 200, dimensionality: 384 }
    }
}

impl RagConfig {
    pub fn new(chunk_size: usize, overlap: usize, k: usize, max_tokens: usize, dimensionality: usize) -> Result<Self> {
        let cfg = Self { chunk_size, overlap, k, max_tokens, dimensionality };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("rag.chunk_size must be at least 1".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "rag.overlap ({}) must be smaller than rag.chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.k == 0 {
            return Err(Error::InvalidConfig("rag.k must be at least 1".into()));
        }
        if self.max_tokens == 0 {
            return Err(Error::InvalidConfig("rag.max_tokens must be at least 1".into()));
        }
        if self.dimensionality == 0 {
            return Err(Error::InvalidConfig("rag.dimensionality must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub corpus_dir: String,
    pub snapshot_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { corpus_dir: "./corpus_documents".into(), snapshot_dir: "./storyrag_db".into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Sentence-embedding model loaded from `model_dir`.
    Local,
    /// Deterministic token-hash vectors; no model files needed.
    Hashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub model_dir: String,
    pub max_len: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { provider: EmbeddingBackend::Local, model_dir: "./models/all-MiniLM-L6-v2".into(), max_len: 256, batch_size: 32 }
    }
}

impl EmbeddingConfig {
    fn validate(&self) -> Result<()> {
        if self.max_len == 0 {
            return Err(Error::InvalidConfig("embedding.max_len must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible `/v1/completions` URL.
    pub endpoint: String,
    pub model: String,
    /// Name of the env var holding a bearer token, if the endpoint needs one.
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Whether the endpoint returns the prompt in front of the completion.
    pub echo: bool,
    pub template: String,
    pub control_tokens: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/v1/completions".into(),
            model: "gpt2-social-story-finetuned".into(),
            api_key_env: None,
            timeout_secs: Some(60),
            echo: false,
            template: DEFAULT_TEMPLATE.into(),
            control_tokens: vec!["<|startoftext|>".into(), "<|endoftext|>".into()],
        }
    }
}

impl GenerationConfig {
    fn validate(&self) -> Result<()> {
        if self.template.trim().is_empty() {
            return Err(Error::InvalidConfig("generation.template must not be empty".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::InvalidConfig("generation.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
