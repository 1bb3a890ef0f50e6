//! Chat-completion providers.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use snooze_core::{ConfigError, CoreError, LlmConfig, LlmError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// One system + user turn in, the assistant's text out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String, CoreError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_completion_tokens: u32,
}

impl ChatRequest {
    fn new(model: Option<String>, system: &str, user: &str, max_completion_tokens: u32) -> Self {
        Self {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            max_completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

pub(crate) fn error_for_status(
    status: StatusCode,
    provider: &str,
    model: &str,
    retry_after: Option<u64>,
) -> LlmError {
    let provider = provider.to_string();
    match status.as_u16() {
        401 => LlmError::InvalidApiKey { provider },
        403 => LlmError::AuthenticationFailed { provider },
        404 => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        408 => LlmError::RequestTimeout { provider },
        429 => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(10),
        },
        _ if status.is_server_error() => LlmError::ServiceUnavailable { provider },
        code => LlmError::RequestRejected {
            provider,
            status_code: code,
        },
    }
}

/// Pull the assistant text out of a completion response.
pub(crate) fn extract_content(response: ChatResponse, provider: &str) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponseFormat {
            provider: provider.to_string(),
            details: "no choices in response".to_string(),
        })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(LlmError::ContentFiltered {
            reason: "completion stopped by content filter".to_string(),
        });
    }

    choice
        .message
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| LlmError::InvalidResponseFormat {
            provider: provider.to_string(),
            details: "empty message content".to_string(),
        })
}

async fn send_chat(
    request: RequestBuilder,
    provider: &str,
    model: &str,
) -> Result<String, CoreError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            CoreError::Llm(LlmError::RequestTimeout {
                provider: provider.to_string(),
            })
        } else {
            CoreError::Network(e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        warn!("{} chat request failed ({}): {}", provider, status, body);
        return Err(error_for_status(status, provider, model, retry_after).into());
    }

    let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::InvalidResponseFormat {
        provider: provider.to_string(),
        details: e.to_string(),
    })?;

    Ok(extract_content(parsed, provider)?)
}

fn http_client(timeout: Duration) -> Result<Client, CoreError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Azure OpenAI deployment: `api-key` header, model selected by deployment.
pub struct AzureOpenAiProvider {
    http: Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
    max_completion_tokens: u32,
}

impl AzureOpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, CoreError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: "AZURE_API_KEY".to_string(),
            })?;

        Ok(Self {
            http: http_client(config.request_timeout())?,
            api_key,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
            max_completion_tokens: config.max_completion_tokens,
        })
    }

    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, CoreError> {
        let body = ChatRequest::new(None, system, user, self.max_completion_tokens);
        debug!(deployment = %self.deployment, "Azure OpenAI chat request");

        let request = self
            .http
            .post(self.completions_url())
            .header("api-key", &self.api_key)
            .json(&body);
        send_chat(request, self.name(), &self.deployment).await
    }
}

/// OpenAI-compatible endpoint with bearer auth.
pub struct OpenAiProvider {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_completion_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, CoreError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: "AZURE_API_KEY".to_string(),
            })?;
        let base_url = if config.endpoint.trim().is_empty() {
            OPENAI_API_URL.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };

        Ok(Self {
            http: http_client(config.request_timeout())?,
            api_key,
            base_url,
            model: config.deployment.clone(),
            max_completion_tokens: config.max_completion_tokens,
        })
    }

    fn headers(&self) -> Result<HeaderMap, CoreError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            LlmError::InvalidApiKey {
                provider: self.name().to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, CoreError> {
        let body = ChatRequest::new(
            Some(self.model.clone()),
            system,
            user,
            self.max_completion_tokens,
        );
        debug!(model = %self.model, "OpenAI chat request");

        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.headers()?)
            .json(&body);
        send_chat(request, self.name(), &self.model).await
    }
}

/// Provider selected by `llm.provider`.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, CoreError> {
    match config.provider.as_str() {
        "azure" => Ok(Arc::new(AzureOpenAiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        other => Err(ConfigError::InvalidValue {
            field: "llm.provider".to_string(),
            value: other.to_string(),
        }
        .into()),
    }
}
