//! AgriTech Assistant Library
//!
//! This library provides tools to:
//! - Answer agronomy questions over Telegram, by text or voice
//! - Ground answers in a Qdrant knowledge base (retrieval-augmented generation)
//! - Transcribe and synthesize speech with OpenAI or Yandex SpeechKit
//! - Ingest documents into the knowledge base
//! - Expose Prometheus metrics for turns and stage calls

pub mod bot;
pub mod config;
pub mod error;
pub mod integrations;
pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod rag;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use integrations::{OpenAIClient, OpenAISpeech, YandexSpeechClient};
pub use pipeline::{AnswerMessage, ConversationHandler, IncomingMessage, RetrievedPassage};
pub use prompts::{load_prompt, Prompt, PromptTemplate};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
