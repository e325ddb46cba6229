//! OpenAI API client: chat completions, Whisper transcription and TTS.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpenAISettings;
use crate::pipeline::stages::{SpeechSynthesizer, Transcriber};
use crate::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Voice notes on Telegram must be OGG/Opus.
const TTS_RESPONSE_FORMAT: &str = "opus";

/// OpenAI client.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    /// Create client with API key.
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("OPENAI_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent(concat!("agritech_bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
        })
    }

    /// Create client from settings.
    pub fn from_settings(settings: &OpenAISettings) -> Result<Self> {
        Ok(Self::new(settings.api_key.clone())?.with_base_url(&settings.api_base))
    }

    /// Override API base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Chat completion.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::GenerationError(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::GenerationError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::GenerationError(format!(
                "OpenAI error {}: {}",
                status, text
            )));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::GenerationError(format!("Invalid response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::GenerationError("Empty response from OpenAI".to_string()))
    }

    /// Transcribe an in-memory audio clip using Whisper.
    pub async fn transcribe_audio(
        &self,
        audio: &[u8],
        file_name: &str,
        model: &str,
        language: Option<&str>,
    ) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::TranscriptionError("audio clip is empty".to_string()));
        }

        let mut form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec()).file_name(file_name.to_string()),
            );
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::TranscriptionError(format!("Whisper request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::TranscriptionError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::TranscriptionError(format!(
                "Whisper error {}: {}",
                status, text
            )));
        }

        let transcription: TranscriptionResponse = serde_json::from_str(&text).map_err(|e| {
            Error::TranscriptionError(format!("Invalid transcription response: {}", e))
        })?;

        Ok(transcription.text)
    }

    /// Text to speech, returning OGG/Opus bytes.
    pub async fn text_to_speech(&self, text: &str, model: &str, voice: &str) -> Result<Vec<u8>> {
        let request = TTSRequest {
            model: model.to_string(),
            voice: voice.to_string(),
            input: text.to_string(),
            response_format: TTS_RESPONSE_FORMAT.to_string(),
        };

        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::SynthesisError(format!("TTS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::SynthesisError(format!(
                "TTS error {}: {}",
                status, text
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::SynthesisError(format!("Failed to read audio: {}", e)))?;

        if bytes.is_empty() {
            return Err(Error::SynthesisError("TTS returned no audio".to_string()));
        }

        Ok(bytes.to_vec())
    }
}

/// Whisper + TTS bound to the configured models and voice.
#[derive(Debug, Clone)]
pub struct OpenAISpeech {
    client: OpenAIClient,
    transcription_model: String,
    language: Option<String>,
    tts_model: String,
    voice: String,
}

impl OpenAISpeech {
    pub fn new(client: OpenAIClient, settings: &OpenAISettings) -> Self {
        Self {
            client,
            transcription_model: settings.transcription_model.clone(),
            language: settings.language.clone(),
            tts_model: settings.tts_model.clone(),
            voice: settings.tts_voice.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for OpenAISpeech {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let text = self
            .client
            .transcribe_audio(
                audio,
                "voice.ogg",
                &self.transcription_model,
                self.language.as_deref(),
            )
            .await?;
        debug!(chars = text.len(), "Whisper transcript received");
        Ok(text)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.client
            .text_to_speech(text, &self.tts_model, &self.voice)
            .await
    }
}

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct TTSRequest {
    model: String,
    voice: String,
    input: String,
    response_format: String,
}
