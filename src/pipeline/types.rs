//! Per-turn data model.

/// How the user asked the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Text,
    Voice,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Voice => "voice",
        }
    }
}

/// Message payload as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// Raw voice clip (OGG/Opus for Telegram voice notes).
    Voice(Vec<u8>),
}

/// One inbound message. Consumed once by the conversation handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub sender_id: i64,
    pub content: MessageContent,
}

impl IncomingMessage {
    pub fn text(sender_id: i64, text: impl Into<String>) -> Self {
        Self {
            sender_id,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn voice(sender_id: i64, audio: Vec<u8>) -> Self {
        Self {
            sender_id,
            content: MessageContent::Voice(audio),
        }
    }

    pub fn modality(&self) -> Modality {
        match self.content {
            MessageContent::Text(_) => Modality::Text,
            MessageContent::Voice(_) => Modality::Voice,
        }
    }
}

/// Embedding of the user's question.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVector(pub Vec<f32>);

impl QueryVector {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for QueryVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Passage returned by the knowledge store.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub text: String,
    pub similarity_score: f32,
    pub source_id: String,
}

impl RetrievedPassage {
    pub fn new(
        text: impl Into<String>,
        similarity_score: f32,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            similarity_score,
            source_id: source_id.into(),
        }
    }
}

/// Sort by descending similarity and keep at most `k` passages.
///
/// Passages with a non-finite score are dropped. The sort is stable, so
/// equally scored passages keep the store's order.
pub fn rank_passages(mut passages: Vec<RetrievedPassage>, k: usize) -> Vec<RetrievedPassage> {
    passages.retain(|p| p.similarity_score.is_finite());
    passages.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    passages.truncate(k);
    passages
}

/// Reply for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerMessage {
    pub text: String,
    /// Synthesized speech (OGG/Opus) for voice turns.
    pub audio: Option<Vec<u8>>,
}

impl AnswerMessage {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio: None,
        }
    }

    pub fn with_audio(text: impl Into<String>, audio: Vec<u8>) -> Self {
        Self {
            text: text.into(),
            audio: Some(audio),
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}
