//! Question answering pipeline.
//!
//! [`ConversationHandler`] drives one turn through the stage traits in
//! [`stages`]; [`build_handler`] wires the production providers from
//! [`Config`].

pub mod generator;
pub mod handler;
pub mod stages;
pub mod types;

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, SpeechProvider};
use crate::integrations::{OpenAIClient, OpenAISpeech, YandexSpeechClient};
use crate::prompts::PromptTemplate;
use crate::rag::{EmbeddingService, QdrantKnowledgeStore};
use crate::Result;

pub use generator::LlmAnswerGenerator;
pub use handler::{
    ConversationHandler, TurnOutcome, TurnReport, TurnState, FAILURE_REPLY, REPEAT_REPLY,
    TRANSCRIPTION_FAILURE_REPLY,
};
pub use stages::{AnswerGenerator, Embedder, KnowledgeStore, SpeechSynthesizer, Stage, Transcriber};
pub use types::{
    rank_passages, AnswerMessage, IncomingMessage, MessageContent, Modality, QueryVector,
    RetrievedPassage,
};

/// Build a handler backed by OpenAI, Qdrant and the configured speech provider.
pub fn build_handler(config: &Config) -> Result<ConversationHandler> {
    config.require_openai()?;

    let openai = OpenAIClient::from_settings(&config.openai)?;
    let embedder = Arc::new(EmbeddingService::new(&config.openai)?);
    let store = Arc::new(QdrantKnowledgeStore::new(&config.qdrant)?);
    let generator = Arc::new(LlmAnswerGenerator::new(
        openai.clone(),
        PromptTemplate::load(),
        &config.openai,
        &config.retrieval,
    ));

    let (transcriber, synthesizer): (Arc<dyn Transcriber>, Arc<dyn SpeechSynthesizer>) =
        match config.speech.provider {
            SpeechProvider::OpenAI => {
                let speech = Arc::new(OpenAISpeech::new(openai, &config.openai));
                (speech.clone(), speech)
            }
            SpeechProvider::Yandex => {
                let speech = Arc::new(YandexSpeechClient::new(&config.speech.yandex)?);
                (speech.clone(), speech)
            }
        };

    info!(
        speech = ?config.speech.provider,
        collection = %config.qdrant.collection,
        top_k = config.retrieval.top_k,
        "Pipeline ready"
    );

    Ok(
        ConversationHandler::new(transcriber, embedder, store, generator, synthesizer)
            .with_top_k(config.retrieval.top_k)
            .with_timeouts(config.timeouts),
    )
}
