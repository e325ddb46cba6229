//! Error types for the question-answering bot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transcription error: {0}")]
    TranscriptionError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Generation error: {0}")]
    GenerationError(String),

    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("Knowledge store error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Telegram API error: {0}")]
    TelegramError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<teloxide::RequestError> for Error {
    fn from(err: teloxide::RequestError) -> Self {
        Error::TelegramError(err.to_string())
    }
}

impl From<teloxide::DownloadError> for Error {
    fn from(err: teloxide::DownloadError) -> Self {
        Error::TelegramError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
