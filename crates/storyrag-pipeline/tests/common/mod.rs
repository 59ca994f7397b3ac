#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use storyrag_core::traits::{EmbeddingProvider, GenerationService};
use storyrag_core::types::{Document, Personalization};
use storyrag_core::{Error, Result};

/// Three axes: dental words, sharing words, and a small constant so no
/// vector is all zeros.
pub struct KeywordEmbedder;

impl EmbeddingProvider for KeywordEmbedder {
    fn embedder_id(&self) -> &str { "keyword:d3" }
    fn dim(&self) -> usize { 3 }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let count = |words: &[&str]| words.iter().map(|w| lower.matches(w).count()).sum::<usize>() as f32;
        Ok(vec![count(&["dentist", "teeth"]), count(&["toys", "friends", "sharing"]), 0.1])
    }
}

pub struct DownEmbedder;

impl EmbeddingProvider for DownEmbedder {
    fn embedder_id(&self) -> &str { "down:d3" }
    fn dim(&self) -> usize { 3 }
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingUnavailable("model not loaded".into()))
    }
}

/// Returns a fixed reply (optionally behind the prompt) and records prompts.
pub struct ScriptedService {
    pub reply: String,
    pub echo: bool,
    pub delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn replying(reply: &str) -> Self {
        Self { reply: reply.to_string(), echo: false, delay: None, prompts: Mutex::new(Vec::new()) }
    }

    pub fn echoing(reply: &str) -> Self {
        Self { echo: true, ..Self::replying(reply) }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::replying("too late") }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    fn echoes_prompt(&self) -> bool { self.echo }

    async fn complete(&self, prompt: &str, _max_tokens: usize) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(if self.echo { format!("{prompt}{}", self.reply) } else { self.reply.clone() })
    }
}

pub struct UnreachableService;

#[async_trait]
impl GenerationService for UnreachableService {
    fn echoes_prompt(&self) -> bool { false }
    async fn complete(&self, _prompt: &str, _max_tokens: usize) -> Result<String> {
        Err(Error::GenerationUnavailable("connection refused".into()))
    }
}

fn truncated(sentence: &str, times: usize, len: usize) -> String {
    sentence.repeat(times).chars().take(len).collect()
}

/// 240 characters about the dentist.
pub fn dentist_doc() -> Document {
    Document::new("dentist.txt", truncated("Going to the dentist helps keep teeth clean. ", 6, 240))
}

/// 210 characters about sharing toys.
pub fn toys_doc() -> Document {
    Document::new("toys.txt", truncated("Sharing toys with friends is kind and fun. ", 5, 210))
}

pub fn alex(situation: &str) -> Personalization {
    Personalization {
        name: "Alex".into(),
        age: "6".into(),
        situation: situation.into(),
        preferences: "trains".into(),
        triggers: "loud noises".into(),
    }
}
