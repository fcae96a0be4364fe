//! OpenAI / Ollama backed [`Generator`].

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{build_prompt, parse_concepts, GenerationError, Generator, SYSTEM_PROMPT};
use crate::config::GenerationConfig;
use crate::models::{BreakdownRequest, BreakdownResponse, TokenCounts, TokenUsage, UsageOperation};
use crate::toon::breakdown_request_to_toon;

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<ReplyMessage>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// What came back from a provider, before validation.
struct Completion {
    content: String,
    counts: Option<TokenCounts>,
}

/// HTTP client for the configured model provider.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    config: GenerationConfig,
    client: Client,
}

impl HttpGenerator {
    pub fn from_config(config: GenerationConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    /// Handle response, converting HTTP errors to GenerationError.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GenerationError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|err| GenerationError::Parse(err.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(GenerationError::Status(format!("{}: {}", status, body)))
        }
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, GenerationError> {
        let messages = [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ];

        match &self.config {
            GenerationConfig::OpenAi { api_key: None, .. } => Err(GenerationError::NotConfigured),
            GenerationConfig::OpenAi {
                base_url,
                api_key: Some(key),
                model,
            } => {
                let body = OpenAiRequest {
                    model,
                    messages,
                    temperature: TEMPERATURE,
                    max_tokens: MAX_TOKENS,
                };
                let response = self
                    .client
                    .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
                    .bearer_auth(key)
                    .json(&body)
                    .send()
                    .await?;
                let reply: OpenAiResponse = self.handle_response(response).await?;

                Ok(Completion {
                    content: reply
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.message.content)
                        .unwrap_or_else(|| "[]".to_string()),
                    counts: reply
                        .usage
                        .map(|usage| TokenCounts::new(usage.prompt_tokens, usage.completion_tokens)),
                })
            }
            GenerationConfig::Ollama { base_url, model } => {
                let body = OllamaRequest {
                    model,
                    messages,
                    options: OllamaOptions {
                        temperature: TEMPERATURE,
                        num_predict: MAX_TOKENS,
                    },
                    stream: false,
                };
                let response = self
                    .client
                    .post(format!("{}/api/chat", base_url.trim_end_matches('/')))
                    .json(&body)
                    .send()
                    .await?;
                let reply: OllamaResponse = self.handle_response(response).await?;

                Ok(Completion {
                    content: reply
                        .message
                        .and_then(|message| message.content)
                        .unwrap_or_else(|| "[]".to_string()),
                    counts: Some(TokenCounts::new(reply.prompt_eval_count, reply.eval_count)),
                })
            }
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn break_down(
        &self,
        request: &BreakdownRequest,
    ) -> Result<BreakdownResponse, GenerationError> {
        let prompt = build_prompt(&breakdown_request_to_toon(request));
        tracing::debug!(model = self.model(), title = %request.concept.title, "Requesting breakdown");

        let completion = self.complete(&prompt).await.inspect_err(|err| {
            tracing::error!(model = self.model(), "Generation request failed: {}", err);
        })?;

        let usage = completion.counts.map(|counts| {
            TokenUsage::from_counts(counts, UsageOperation::Breakdown, self.model(), None)
        });
        let concepts = parse_concepts(&completion.content)?;

        Ok(BreakdownResponse { concepts, usage })
    }
}
