//! LLM transport - provider trait and OpenRouter-compatible HTTP client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::llm::types::*;

/// Minimum contract for an LLM provider.
///
/// The core never talks to a provider directly; every node goes through
/// this trait so runs can be driven by any request/response backend,
/// including scripted fakes in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation (and optional tool definitions) and return
    /// the reply. An empty `tools` slice means plain completion.
    async fn invoke(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
        -> Result<LlmReply>;
}

/// Creates provider clients by model name.
pub trait LlmFactory: Send + Sync {
    /// Build a client bound to `model` with default generation options.
    fn client(&self, model: &str) -> Result<Arc<dyn LlmClient>>;

    /// Build a client bound to `model` with explicit generation options.
    fn client_with_options(
        &self,
        model: &str,
        options: GenerationOptions,
    ) -> Result<Arc<dyn LlmClient>>;
}

/// Configuration for the OpenRouter-compatible HTTP transport
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// API key (kept out of debug output)
    pub api_key: SecretString,
    /// Base URL, e.g. `https://openrouter.ai/api/v1`
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenRouterConfig {
    /// Build from `OPENROUTER_API_KEY` / `OPENROUTER_BASE_URL` env vars.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| Error::Config("OPENROUTER_API_KEY is not set".to_string()))?;
        let base_url = std::env::var("OPENROUTER_BASE_URL")
            .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());
        Ok(OpenRouterConfig {
            api_key: SecretString::from(api_key),
            base_url,
            timeout_secs: 120,
        })
    }
}

/// OpenRouter-compatible chat client
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
    model: String,
    options: GenerationOptions,
}

impl OpenRouterClient {
    /// Create a new client bound to a model
    pub fn new(config: OpenRouterConfig, model: impl Into<String>) -> Result<Self> {
        Self::with_options(config, model, GenerationOptions::default())
    }

    /// Create a new client with explicit generation options
    pub fn with_options(
        config: OpenRouterConfig,
        model: impl Into<String>,
        options: GenerationOptions,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!(
                "Bearer {}",
                config.api_key.expose_secret()
            ))
            .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenRouterClient {
            client,
            config,
            model: model.into(),
            options,
        })
    }

    /// The model this client is bound to
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_request(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        debug!("Sending chat request: model={}", request.model);

        // Retry transient failures (rate limits, 5xx, transport errors)
        // with exponential backoff; 4xx errors are permanent.
        let backoff_policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let body = backoff::future::retry(backoff_policy, || async {
            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(Error::Http(e)))?;

            let status = response.status();
            if status.is_success() {
                let body = response
                    .json::<ChatCompletionResponse>()
                    .await
                    .map_err(|e| backoff::Error::permanent(Error::Http(e)))?;
                return Ok(body);
            }

            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                warn!("Rate limit exceeded, retrying: {}", error_text);
                Err(backoff::Error::transient(Error::RateLimit(error_text)))
            } else if status.is_server_error() {
                Err(backoff::Error::transient(Error::Llm(format!(
                    "API error ({}): {}",
                    status, error_text
                ))))
            } else if status.as_u16() == 401 {
                Err(backoff::Error::permanent(Error::Unauthorized(
                    "Invalid API key".to_string(),
                )))
            } else {
                Err(backoff::Error::permanent(Error::Llm(format!(
                    "API error ({}): {}",
                    status, error_text
                ))))
            }
        })
        .await?;

        if let Some(ref usage) = body.usage {
            info!(
                "LLM response: model={}, tokens={}",
                body.model, usage.total_tokens
            );
        }
        Ok(body)
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmReply> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            stream: Some(false),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
        };

        let response = self.send_request(&request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("Empty response: no choices returned".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let args: Value = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or_else(|e| {
                        warn!(
                            "Failed to parse tool arguments for {}: {}",
                            tc.function.name, e
                        );
                        Value::Object(Default::default())
                    });
                ToolCallRequest {
                    id: tc.id,
                    name: tc.function.name,
                    args,
                }
            })
            .collect();

        Ok(LlmReply {
            content: choice.message.content,
            tool_calls,
            usage: response.usage,
        })
    }
}

/// Factory producing [`OpenRouterClient`]s for any model name
pub struct OpenRouterFactory {
    config: OpenRouterConfig,
}

impl OpenRouterFactory {
    pub fn new(config: OpenRouterConfig) -> Self {
        OpenRouterFactory { config }
    }

    /// Build a factory from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(OpenRouterFactory {
            config: OpenRouterConfig::from_env()?,
        })
    }
}

impl LlmFactory for OpenRouterFactory {
    fn client(&self, model: &str) -> Result<Arc<dyn LlmClient>> {
        Ok(Arc::new(OpenRouterClient::new(self.config.clone(), model)?))
    }

    fn client_with_options(
        &self,
        model: &str,
        options: GenerationOptions,
    ) -> Result<Arc<dyn LlmClient>> {
        Ok(Arc::new(OpenRouterClient::with_options(
            self.config.clone(),
            model,
            options,
        )?))
    }
}
