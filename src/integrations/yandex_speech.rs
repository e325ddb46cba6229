//! Yandex SpeechKit client (STT and TTS), an alternative speech backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::YandexSettings;
use crate::pipeline::stages::{SpeechSynthesizer, Transcriber};
use crate::{Error, Result};

const TTS_URL: &str = "https://tts.api.cloud.yandex.net/speech/v1/tts:synthesize";
const STT_URL: &str = "https://stt.api.cloud.yandex.net/speech/v1/stt:recognize";

/// Telegram voice notes are OGG/Opus in both directions.
const AUDIO_FORMAT: &str = "oggopus";

/// Yandex SpeechKit client.
#[derive(Debug, Clone)]
pub struct YandexSpeechClient {
    http: Client,
    api_key: Option<String>,
    iam_token: Option<String>,
    folder_id: String,
    voice: String,
    lang: String,
    tts_url: String,
    stt_url: String,
}

impl YandexSpeechClient {
    /// Create client from settings. Needs an API key or IAM token and a folder.
    pub fn new(settings: &YandexSettings) -> Result<Self> {
        if settings.api_key.is_none() && settings.iam_token.is_none() {
            return Err(Error::ConfigError(
                "set YANDEX_API_KEY or YANDEX_IAM_TOKEN".to_string(),
            ));
        }
        if settings.folder_id.is_empty() {
            return Err(Error::ConfigError("YANDEX_FOLDER_ID is not set".to_string()));
        }

        let http = Client::builder()
            .build()
            .map_err(|e| Error::ConfigError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            iam_token: settings.iam_token.clone(),
            folder_id: settings.folder_id.clone(),
            voice: settings.voice.clone(),
            lang: settings.lang.clone(),
            tts_url: TTS_URL.to_string(),
            stt_url: STT_URL.to_string(),
        })
    }

    /// Override API endpoints (primarily for tests).
    pub fn with_urls<S1: Into<String>, S2: Into<String>>(
        mut self,
        tts_url: S1,
        stt_url: S2,
    ) -> Self {
        self.tts_url = tts_url.into();
        self.stt_url = stt_url.into();
        self
    }

    fn auth_header(&self) -> String {
        if let Some(ref token) = self.iam_token {
            format!("Bearer {}", token)
        } else if let Some(ref key) = self.api_key {
            format!("Api-Key {}", key)
        } else {
            String::new()
        }
    }

    /// Recognize a short OGG/Opus clip.
    pub async fn speech_to_text(&self, audio: &[u8]) -> Result<String> {
        let response = self
            .http
            .post(&self.stt_url)
            .header("Authorization", self.auth_header())
            .query(&[
                ("lang", self.lang.as_str()),
                ("topic", "general"),
                ("format", AUDIO_FORMAT),
                ("folderId", self.folder_id.as_str()),
            ])
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| Error::TranscriptionError(format!("Yandex STT request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::TranscriptionError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::TranscriptionError(format!(
                "Yandex STT error {}: {}",
                status, text
            )));
        }

        let result: SttResponse = serde_json::from_str(&text)
            .map_err(|e| Error::TranscriptionError(format!("Invalid STT response: {}", e)))?;

        Ok(result.result.unwrap_or_default())
    }

    /// Synthesize speech as OGG/Opus bytes.
    pub async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>> {
        let params = [
            ("text", text),
            ("lang", self.lang.as_str()),
            ("voice", self.voice.as_str()),
            ("format", AUDIO_FORMAT),
            ("folderId", self.folder_id.as_str()),
        ];

        let response = self
            .http
            .post(&self.tts_url)
            .header("Authorization", self.auth_header())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::SynthesisError(format!("Yandex TTS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::SynthesisError(format!(
                "Yandex TTS error {}: {}",
                status, text
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::SynthesisError(format!("Failed to read audio: {}", e)))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Transcriber for YandexSpeechClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.speech_to_text(audio).await
    }
}

#[async_trait]
impl SpeechSynthesizer for YandexSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.text_to_speech(text).await
    }
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    result: Option<String>,
}
