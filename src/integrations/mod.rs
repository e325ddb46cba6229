//! External provider clients.
//!
//! - OpenAI (chat, Whisper, TTS)
//! - Yandex SpeechKit (STT, TTS)

pub mod openai;
pub mod yandex_speech;

pub use openai::{OpenAIClient, OpenAISpeech};
pub use yandex_speech::YandexSpeechClient;
