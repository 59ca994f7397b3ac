//! Per-call state machine for one story generation.
//!
//! `Idle → Embedding → Searching → Resolving → Prompting → Invoking →
//! PostProcessing → Done`. `Failed` is terminal and is never entered from
//! `Resolving`, which degrades by skipping entries instead.

use std::fmt;
use tracing::debug;

use storyrag_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    EmbeddingUnavailable,
    GenerationUnavailable,
    Timeout,
    EmptyGeneration,
    /// Caller bugs and internal faults (dimension mismatch, poisoned locks).
    Internal,
}

impl From<&Error> for FailureReason {
    fn from(e: &Error) -> Self {
        match e {
            Error::EmbeddingUnavailable(_) => FailureReason::EmbeddingUnavailable,
            Error::GenerationUnavailable(_) => FailureReason::GenerationUnavailable,
            Error::Timeout(_) => FailureReason::Timeout,
            Error::EmptyGeneration => FailureReason::EmptyGeneration,
            _ => FailureReason::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Embedding,
    Searching,
    Resolving,
    Prompting,
    Invoking,
    PostProcessing,
    Done,
    Failed(FailureReason),
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed(_))
    }

    pub fn can_transition_to(self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Idle, Embedding) | (Embedding, Searching) | (Searching, Resolving) | (Resolving, Prompting) => true,
            // A precomputed retrieval result starts the call at prompting.
            (Idle, Prompting) => true,
            (Prompting, Invoking) | (Invoking, PostProcessing) | (PostProcessing, Done) => true,
            (Embedding | Searching | Invoking | PostProcessing, Failed(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(reason) => write!(f, "Failed({reason:?})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Records the stages one call went through.
#[derive(Debug, Clone)]
pub struct CallTrace {
    history: Vec<Stage>,
}

impl Default for CallTrace {
    fn default() -> Self {
        Self { history: vec![Stage::Idle] }
    }
}

impl CallTrace {
    pub fn new() -> Self { Self::default() }

    pub fn current(&self) -> Stage {
        self.history.last().copied().unwrap_or(Stage::Idle)
    }

    pub fn history(&self) -> &[Stage] { &self.history }

    pub fn enter(&mut self, next: Stage) {
        let current = self.current();
        debug_assert!(current.can_transition_to(next), "illegal transition {current} -> {next}");
        debug!(from = %current, to = %next, "generation stage");
        self.history.push(next);
    }

    /// Move to `Failed` for `err` and hand the error back.
    pub fn fail(&mut self, err: Error) -> Error {
        self.enter(Stage::Failed(FailureReason::from(&err)));
        err
    }
}
