//! Configuration for the bot and its providers
//!
//! Loaded once at startup from an optional `config.yml` plus the process
//! environment. The resulting [`Config`] is immutable and handed by reference
//! to every component constructor.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_DOCS_TOKEN_LIMIT: usize = 3000;
pub const DEFAULT_COLLECTION: &str = "data";
pub const DEFAULT_CHUNK_CHARS: usize = 2000;
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const QDRANT_URL: &str = "http://localhost:6334";

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramYaml>,
    openai: Option<OpenAIYaml>,
    qdrant: Option<QdrantYaml>,
    retrieval: Option<RetrievalYaml>,
    speech: Option<SpeechYaml>,
    timeouts: Option<TimeoutsYaml>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramYaml {
    bot_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIYaml {
    api_key: Option<String>,
    api_base: Option<String>,
    chat_model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    embedding_model: Option<String>,
    transcription_model: Option<String>,
    language: Option<String>,
    tts_model: Option<String>,
    tts_voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QdrantYaml {
    url: Option<String>,
    api_key: Option<String>,
    collection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalYaml {
    top_k: Option<usize>,
    docs_token_limit: Option<usize>,
    chunk_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechYaml {
    provider: Option<String>,
    yandex: Option<YandexYaml>,
}

#[derive(Debug, Default, Deserialize)]
struct YandexYaml {
    api_key: Option<String>,
    iam_token: Option<String>,
    folder_id: Option<String>,
    voice: Option<String>,
    lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TimeoutsYaml {
    transcription_secs: Option<u64>,
    embedding_secs: Option<u64>,
    retrieval_secs: Option<u64>,
    generation_secs: Option<u64>,
    synthesis_secs: Option<u64>,
}

/// OpenAI settings (chat, embeddings, Whisper, TTS).
#[derive(Debug, Clone)]
pub struct OpenAISettings {
    pub api_key: String,
    pub api_base: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub embedding_model: String,
    pub transcription_model: String,
    /// ISO-639-1 hint for Whisper; `None` lets the model detect it.
    pub language: Option<String>,
    pub tts_model: String,
    pub tts_voice: String,
}

/// Qdrant connection settings.
#[derive(Debug, Clone)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

/// Retrieval and ingestion tuning.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub docs_token_limit: usize,
    pub chunk_chars: usize,
}

/// Which backend serves transcription and synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechProvider {
    OpenAI,
    Yandex,
}

impl SpeechProvider {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "openai" => Ok(SpeechProvider::OpenAI),
            "yandex" => Ok(SpeechProvider::Yandex),
            other => Err(Error::ConfigError(format!(
                "unknown speech provider '{}', expected openai or yandex",
                other
            ))),
        }
    }
}

/// Yandex SpeechKit credentials.
#[derive(Debug, Clone)]
pub struct YandexSettings {
    pub api_key: Option<String>,
    pub iam_token: Option<String>,
    pub folder_id: String,
    pub voice: String,
    pub lang: String,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub provider: SpeechProvider,
    pub yandex: YandexSettings,
}

/// Upper bound for each external call of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub transcription: Duration,
    pub embedding: Duration,
    pub retrieval: Duration,
    pub generation: Duration,
    pub synthesis: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            transcription: Duration::from_secs(60),
            embedding: Duration::from_secs(15),
            retrieval: Duration::from_secs(10),
            generation: Duration::from_secs(60),
            synthesis: Duration::from_secs(60),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub openai: OpenAISettings,
    pub qdrant: QdrantSettings,
    pub retrieval: RetrievalSettings,
    pub speech: SpeechSettings,
    pub timeouts: StageTimeouts,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `config.yml` in the working
    /// directory is used when present; otherwise only the environment is read.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_dotenv();

        match path {
            Some(path) => Self::load_from_file(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load_from_file(CONFIG_FILE),
            None => Self::from_yaml(YamlConfig::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse YAML text and resolve environment values.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: YamlConfig = if content.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        Self::from_yaml(yaml)
    }

    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Resolve a value: `${VAR}` placeholders and the explicit env key win over
    /// literal YAML values.
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    return non_empty(env_val);
                }
                return std::env::var(env_key).ok().and_then(non_empty);
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            if let Some(env_val) = non_empty(env_val) {
                return Some(env_val);
            }
        }
        value.and_then(non_empty)
    }

    fn from_yaml(yaml: YamlConfig) -> Result<Self> {
        let telegram = yaml.telegram.unwrap_or_default();
        let openai = yaml.openai.unwrap_or_default();
        let qdrant = yaml.qdrant.unwrap_or_default();
        let retrieval = yaml.retrieval.unwrap_or_default();
        let speech = yaml.speech.unwrap_or_default();
        let yandex = speech.yandex.unwrap_or_default();
        let timeouts = yaml.timeouts.unwrap_or_default();

        let provider = Self::resolve_env_string(speech.provider, "SPEECH_PROVIDER")
            .map(|p| SpeechProvider::parse(&p))
            .transpose()?
            .unwrap_or(SpeechProvider::OpenAI);

        let defaults = StageTimeouts::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Ok(Self {
            bot_token: Self::resolve_env_string(telegram.bot_token, "TELEGRAM_BOT_TOKEN")
                .unwrap_or_default(),
            openai: OpenAISettings {
                api_key: Self::resolve_env_string(openai.api_key, "OPENAI_API_KEY")
                    .unwrap_or_default(),
                api_base: Self::resolve_env_string(openai.api_base, "OPENAI_API_BASE")
                    .unwrap_or_else(|| OPENAI_API_BASE.to_string()),
                chat_model: openai
                    .chat_model
                    .unwrap_or_else(|| "gpt-4o-mini".to_string()),
                temperature: openai.temperature.unwrap_or(0.0),
                max_tokens: openai.max_tokens.unwrap_or(800),
                embedding_model: openai
                    .embedding_model
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                transcription_model: openai
                    .transcription_model
                    .unwrap_or_else(|| "whisper-1".to_string()),
                language: openai.language.and_then(non_empty),
                tts_model: openai.tts_model.unwrap_or_else(|| "tts-1".to_string()),
                tts_voice: openai.tts_voice.unwrap_or_else(|| "alloy".to_string()),
            },
            qdrant: QdrantSettings {
                url: Self::resolve_env_string(qdrant.url, "QDRANT_URL")
                    .unwrap_or_else(|| QDRANT_URL.to_string()),
                api_key: Self::resolve_env_string(qdrant.api_key, "QDRANT_API_KEY"),
                collection: Self::resolve_env_string(qdrant.collection, "QDRANT_COLLECTION")
                    .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            },
            retrieval: RetrievalSettings {
                top_k: retrieval.top_k.filter(|k| *k > 0).unwrap_or(DEFAULT_TOP_K),
                docs_token_limit: retrieval
                    .docs_token_limit
                    .unwrap_or(DEFAULT_DOCS_TOKEN_LIMIT),
                chunk_chars: retrieval
                    .chunk_chars
                    .filter(|c| *c > 0)
                    .unwrap_or(DEFAULT_CHUNK_CHARS),
            },
            speech: SpeechSettings {
                provider,
                yandex: YandexSettings {
                    api_key: Self::resolve_env_string(yandex.api_key, "YANDEX_API_KEY"),
                    iam_token: Self::resolve_env_string(yandex.iam_token, "YANDEX_IAM_TOKEN"),
                    folder_id: Self::resolve_env_string(yandex.folder_id, "YANDEX_FOLDER_ID")
                        .unwrap_or_default(),
                    voice: yandex.voice.unwrap_or_else(|| "alena".to_string()),
                    lang: yandex.lang.unwrap_or_else(|| "ru-RU".to_string()),
                },
            },
            timeouts: StageTimeouts {
                transcription: secs(timeouts.transcription_secs, defaults.transcription),
                embedding: secs(timeouts.embedding_secs, defaults.embedding),
                retrieval: secs(timeouts.retrieval_secs, defaults.retrieval),
                generation: secs(timeouts.generation_secs, defaults.generation),
                synthesis: secs(timeouts.synthesis_secs, defaults.synthesis),
            },
        })
    }

    /// Fail unless the Telegram bot token is present.
    pub fn require_bot(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            return Err(Error::ConfigError(
                "TELEGRAM_BOT_TOKEN is not set".to_string(),
            ));
        }
        self.require_openai()
    }

    /// Fail unless the OpenAI key is present.
    pub fn require_openai(&self) -> Result<()> {
        if self.openai.api_key.is_empty() {
            return Err(Error::ConfigError("OPENAI_API_KEY is not set".to_string()));
        }
        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    pub(crate) static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    pub(crate) struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        pub(crate) fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        pub(crate) fn remove(key: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(value) => std::env::set_var(&self.key, value),
                None => std::env::remove_var(&self.key),
            }
        }
    }

    const ENV_KEYS: &[&str] = &[
        "TELEGRAM_BOT_TOKEN",
        "OPENAI_API_KEY",
        "OPENAI_API_BASE",
        "QDRANT_URL",
        "QDRANT_API_KEY",
        "QDRANT_COLLECTION",
        "SPEECH_PROVIDER",
        "YANDEX_API_KEY",
        "YANDEX_IAM_TOKEN",
        "YANDEX_FOLDER_ID",
    ];

    fn clean_env() -> Vec<EnvGuard> {
        ENV_KEYS.iter().map(|k| EnvGuard::remove(k)).collect()
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();

        let config = Config::from_yaml_str("").unwrap();
        assert!(config.bot_token.is_empty());
        assert_eq!(config.openai.api_base, OPENAI_API_BASE);
        assert_eq!(config.openai.chat_model, "gpt-4o-mini");
        assert_eq!(config.openai.temperature, 0.0);
        assert_eq!(config.qdrant.url, QDRANT_URL);
        assert_eq!(config.qdrant.collection, DEFAULT_COLLECTION);
        assert_eq!(config.retrieval.top_k, DEFAULT_TOP_K);
        assert_eq!(config.retrieval.docs_token_limit, DEFAULT_DOCS_TOKEN_LIMIT);
        assert_eq!(config.speech.provider, SpeechProvider::OpenAI);
        assert_eq!(config.timeouts, StageTimeouts::default());
    }

    #[test]
    fn loads_values_from_yaml() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();

        let yaml = r#"
telegram:
  bot_token: "123:abc"
openai:
  api_key: sk-test
  chat_model: gpt-4o
  temperature: 0.3
  language: en
qdrant:
  url: http://qdrant:6334
  collection: agronomy
retrieval:
  top_k: 6
  docs_token_limit: 1200
speech:
  provider: yandex
  yandex:
    api_key: yk
    folder_id: b1g
timeouts:
  generation_secs: 20
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.openai.api_key, "sk-test");
        assert_eq!(config.openai.chat_model, "gpt-4o");
        assert_eq!(config.openai.temperature, 0.3);
        assert_eq!(config.openai.language.as_deref(), Some("en"));
        assert_eq!(config.qdrant.url, "http://qdrant:6334");
        assert_eq!(config.qdrant.collection, "agronomy");
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.retrieval.docs_token_limit, 1200);
        assert_eq!(config.speech.provider, SpeechProvider::Yandex);
        assert_eq!(config.speech.yandex.api_key.as_deref(), Some("yk"));
        assert_eq!(config.speech.yandex.folder_id, "b1g");
        assert_eq!(config.timeouts.generation, Duration::from_secs(20));
        assert_eq!(config.timeouts.retrieval, StageTimeouts::default().retrieval);
    }

    #[test]
    fn env_placeholders_are_resolved_from_environment() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();
        let _token = EnvGuard::set("MY_BOT_TOKEN", "999:xyz");
        let _key = EnvGuard::set("OPENAI_API_KEY", "sk-env");

        let yaml = r#"
telegram:
  bot_token: ${MY_BOT_TOKEN}
openai:
  api_key: ${OPENAI_API_KEY}
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.bot_token, "999:xyz");
        assert_eq!(config.openai.api_key, "sk-env");
    }

    #[test]
    fn environment_overrides_literal_yaml_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();
        let _url = EnvGuard::set("QDRANT_URL", "http://from-env:6334");

        let config = Config::from_yaml_str("qdrant:\n  url: http://from-yaml:6334\n").unwrap();
        assert_eq!(config.qdrant.url, "http://from-env:6334");
    }

    #[test]
    fn unresolved_placeholder_is_treated_as_missing() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();
        let _missing = EnvGuard::remove("NOT_DEFINED_ANYWHERE");

        let config =
            Config::from_yaml_str("telegram:\n  bot_token: ${NOT_DEFINED_ANYWHERE}\n").unwrap();
        assert!(config.bot_token.is_empty());
        assert!(config.require_bot().is_err());
    }

    #[test]
    fn rejects_unknown_speech_provider() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();

        let err = Config::from_yaml_str("speech:\n  provider: espeak\n").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.to_string().contains("espeak"));
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();

        let yaml = "retrieval:\n  top_k: 0\ntimeouts:\n  embedding_secs: 0\n";
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.retrieval.top_k, DEFAULT_TOP_K);
        assert_eq!(config.timeouts.embedding, StageTimeouts::default().embedding);
    }

    #[test]
    fn require_bot_names_missing_variables() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();

        let config = Config::from_yaml_str("").unwrap();
        let err = config.require_bot().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));

        let _token = EnvGuard::set("TELEGRAM_BOT_TOKEN", "1:a");
        let config = Config::from_yaml_str("").unwrap();
        let err = config.require_bot().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn load_from_file_reads_yaml() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = clean_env();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "qdrant:\n  collection: farm_docs\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.qdrant.collection, "farm_docs");
    }

    #[test]
    fn load_from_file_fails_on_missing_file() {
        let err = Config::load_from_file("/nonexistent/config.yml").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn load_from_file_fails_on_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "openai: [unclosed").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::SerializationError(_)));
    }
}
