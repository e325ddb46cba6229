//! LLM-backed answer generation.

use async_trait::async_trait;
use tracing::debug;

use super::stages::AnswerGenerator;
use super::types::RetrievedPassage;
use crate::config::{OpenAISettings, RetrievalSettings};
use crate::integrations::openai::{ChatMessage, OpenAIClient};
use crate::prompts::PromptTemplate;
use crate::{Error, Result};

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Longest prefix of `passages` whose estimated size fits `token_limit`.
pub fn fit_passages(passages: &[RetrievedPassage], token_limit: usize) -> &[RetrievedPassage] {
    let mut used = 0;
    for (i, passage) in passages.iter().enumerate() {
        used += estimate_tokens(&passage.text);
        if used > token_limit {
            return &passages[..i];
        }
    }
    passages
}

/// System and user messages for one question.
pub fn build_messages(
    template: &PromptTemplate,
    question: &str,
    passages: &[RetrievedPassage],
    token_limit: usize,
) -> Vec<ChatMessage> {
    let help_data = fit_passages(passages, token_limit)
        .iter()
        .map(|p| p.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        ChatMessage::system(template.system.clone()),
        ChatMessage::user(template.render_question(&help_data, question)),
    ]
}

/// Answers through the OpenAI chat completions API.
pub struct LlmAnswerGenerator {
    client: OpenAIClient,
    template: PromptTemplate,
    model: String,
    temperature: f32,
    max_tokens: u32,
    docs_token_limit: usize,
}

impl LlmAnswerGenerator {
    pub fn new(
        client: OpenAIClient,
        template: PromptTemplate,
        openai: &OpenAISettings,
        retrieval: &RetrievalSettings,
    ) -> Self {
        Self {
            client,
            template,
            model: openai.chat_model.clone(),
            temperature: openai.temperature,
            max_tokens: openai.max_tokens,
            docs_token_limit: retrieval.docs_token_limit,
        }
    }
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn generate(&self, question: &str, passages: &[RetrievedPassage]) -> Result<String> {
        let messages = build_messages(&self.template, question, passages, self.docs_token_limit);
        debug!(
            model = %self.model,
            passages = passages.len(),
            "Requesting completion"
        );

        let answer = self
            .client
            .chat_completion(messages, &self.model, self.temperature, self.max_tokens)
            .await?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::GenerationError("model returned a blank answer".to_string()));
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn passage(text: &str, score: f32) -> RetrievedPassage {
        RetrievedPassage::new(text, score, "test")
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn fit_passages_drops_from_the_tail() {
        let passages = vec![
            passage(&"a".repeat(40), 0.9),
            passage(&"b".repeat(40), 0.8),
            passage(&"c".repeat(40), 0.7),
        ];

        assert_eq!(fit_passages(&passages, 25).len(), 2);
        assert_eq!(fit_passages(&passages, 30).len(), 3);
        assert_eq!(fit_passages(&passages, 5).len(), 0);
    }

    #[test]
    fn build_messages_keeps_passage_order() {
        let passages = vec![passage("first fact", 0.9), passage("second fact", 0.5)];
        let messages = build_messages(&PromptTemplate::default(), "q?", &passages, 3000);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        let user = messages[1].content.as_deref().unwrap();
        let first = user.find("first fact").unwrap();
        let second = user.find("second fact").unwrap();
        assert!(first < second);
        assert!(user.contains("first fact\n\nsecond fact"));
    }

    #[test]
    fn build_messages_without_passages_still_asks_question() {
        let messages =
            build_messages(&PromptTemplate::default(), "Why do leaves yellow?", &[], 3000);
        let user = messages[1].content.as_deref().unwrap();
        assert!(user.contains("Human: Why do leaves yellow?"));
    }

    fn settings(base: &str) -> (OpenAISettings, RetrievalSettings) {
        (
            OpenAISettings {
                api_key: "test_key".to_string(),
                api_base: base.to_string(),
                chat_model: "gpt-4o-mini".to_string(),
                temperature: 0.0,
                max_tokens: 200,
                embedding_model: "text-embedding-3-small".to_string(),
                transcription_model: "whisper-1".to_string(),
                language: None,
                tts_model: "tts-1".to_string(),
                tts_voice: "alloy".to_string(),
            },
            RetrievalSettings {
                top_k: 4,
                docs_token_limit: 3000,
                chunk_chars: 2000,
            },
        )
    }

    fn generator(server: &MockServer) -> LlmAnswerGenerator {
        let (openai, retrieval) = settings(&server.base_url());
        let client = OpenAIClient::from_settings(&openai).unwrap();
        LlmAnswerGenerator::new(client, PromptTemplate::default(), &openai, &retrieval)
    }

    #[tokio::test]
    async fn generate_sends_passages_to_the_model() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref());
                body.contains("Maize grows best in pH 5.5") && body.contains("gpt-4o-mini")
            });
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "  Aim for pH 5.5 to 7.0.  " } }
                ]
            }));
        });

        let answer = generator(&server)
            .generate(
                "What is the ideal soil pH for maize?",
                &[passage("Maize grows best in pH 5.5-7.0", 0.92)],
            )
            .await
            .unwrap();

        assert_eq!(answer, "Aim for pH 5.5 to 7.0.");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn generate_rejects_blank_completion() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [ { "message": { "role": "assistant", "content": "   " } } ]
            }));
        });

        let err = generator(&server).generate("q", &[]).await.unwrap_err();
        assert!(matches!(err, Error::GenerationError(_)));
    }
}
