//! Stage interfaces of a question-answering turn.
//!
//! Every external capability sits behind one of these traits so the
//! conversation handler can be driven by real providers or by in-memory
//! stubs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{QueryVector, RetrievedPassage};
use crate::{Error, Result};

/// Voice clip to text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Best-effort transcript; empty on silence.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Text to query vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<QueryVector>;
}

/// Similarity search over stored passages.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// At most `k` passages, most similar first.
    async fn search(&self, query: &QueryVector, k: usize) -> Result<Vec<RetrievedPassage>>;
}

/// Question plus context to answer text.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// `passages` are ordered most relevant first and may be empty.
    async fn generate(&self, question: &str, passages: &[RetrievedPassage]) -> Result<String>;
}

/// Answer text to audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// External call made during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Transcription,
    Embedding,
    Retrieval,
    Generation,
    Synthesis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transcription => "transcription",
            Stage::Embedding => "embedding",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::Synthesis => "synthesis",
        }
    }

    /// Error variant owned by this stage.
    pub fn error(&self, message: impl Into<String>) -> Error {
        let message = message.into();
        match self {
            Stage::Transcription => Error::TranscriptionError(message),
            Stage::Embedding => Error::EmbeddingError(message),
            Stage::Retrieval => Error::RetrievalError(message),
            Stage::Generation => Error::GenerationError(message),
            Stage::Synthesis => Error::SynthesisError(message),
        }
    }

    pub fn timed_out(&self, limit: Duration) -> Error {
        self.error(format!("timed out after {:?}", limit))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
