//! LLM backend adapters.
//!
//! Each adapter implements the same narrow [`Backend`] interface so the
//! enhancer can walk an ordered chain and stop at the first success.
//! Which backends exist for a run is decided purely by the presence of
//! their credentials in the environment; no credentials at all is a
//! fully supported state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// One enhancement request, independent of backend wire format.
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    pub system_prompt: String,
    pub user_content: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Backend call failures.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Whether a retry on the same backend can plausibly help.
    /// Validation failures cannot; the backend already answered.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::InvalidResponse(_))
    }
}

/// A concrete LLM API integration capable of serving an enhancement
/// request. Adapters are capability-equivalent and interchangeable.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short stable name, recorded in the enhancement result.
    fn name(&self) -> &str;

    /// Issue one completion request. The enhancer owns retries and the
    /// hard per-call timeout; adapters just perform a single exchange.
    async fn complete(&self, request: &EnhanceRequest) -> Result<String, BackendError>;
}

/// Chat message shared by both wire formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

fn chat_messages(request: &EnhanceRequest) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: request.system_prompt.clone(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: request.user_content.clone(),
        },
    ]
}

fn map_transport_error(e: reqwest::Error, timeout_seconds: u64, target: &str) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout_seconds)
    } else if e.is_connect() {
        BackendError::Connect(target.to_string())
    } else {
        BackendError::Api {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            body: e.to_string(),
        }
    }
}

/// Ollama-style chat API ("cloud-reasoning" tier).
///
/// Credentials: `OLLAMA_API_KEY`; host and model from `OLLAMA_HOST` and
/// `OLLAMA_MODEL` with cloud defaults.
pub struct OllamaCloudBackend {
    host: String,
    api_key: String,
    model: String,
    timeout_seconds: u64,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

impl OllamaCloudBackend {
    pub fn new(host: String, api_key: String, model: String, timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            host,
            api_key,
            model,
            timeout_seconds,
            client,
        }
    }
}

#[async_trait]
impl Backend for OllamaCloudBackend {
    fn name(&self) -> &str {
        "ollama-cloud"
    }

    async fn complete(&self, request: &EnhanceRequest) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.host);

        let body = OllamaChatRequest {
            model: self.model.clone(),
            messages: chat_messages(request),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        debug!("Sending chat request to {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_seconds, &self.host))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

/// OpenAI-compatible chat completions API.
///
/// Credentials: `LLM_API_KEY`; endpoint and model from `LLM_ENDPOINT`
/// and `LLM_MODEL`.
pub struct OpenAiCompatBackend {
    endpoint: String,
    api_key: String,
    model: String,
    timeout_seconds: u64,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

impl OpenAiCompatBackend {
    pub fn new(endpoint: String, api_key: String, model: String, timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            endpoint,
            api_key,
            model,
            timeout_seconds,
            client,
        }
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &EnhanceRequest) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let body = OpenAiChatRequest {
            model: self.model.clone(),
            messages: chat_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("Sending chat request to {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_seconds, &self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status, body });
        }

        let chat_response: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::InvalidResponse("response carried no choices".to_string()))
    }
}

/// Build the backend chain from environment credentials, in priority
/// order: the cloud-reasoning tier first, then the OpenAI-compatible
/// fallback. An empty chain is valid; enhancement then always falls
/// back.
pub fn resolve_backends(timeout_seconds: u64) -> Vec<Box<dyn Backend>> {
    let mut backends: Vec<Box<dyn Backend>> = Vec::new();

    if let Ok(api_key) = std::env::var("OLLAMA_API_KEY") {
        if !api_key.is_empty() {
            let host = std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "https://ollama.com".to_string());
            let model =
                std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "gpt-oss:120b".to_string());
            backends.push(Box::new(OllamaCloudBackend::new(
                host,
                api_key,
                model,
                timeout_seconds,
            )));
        }
    }

    if let Ok(api_key) = std::env::var("LLM_API_KEY") {
        if !api_key.is_empty() {
            let endpoint = std::env::var("LLM_ENDPOINT")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
            let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            backends.push(Box::new(OpenAiCompatBackend::new(
                endpoint,
                api_key,
                model,
                timeout_seconds,
            )));
        }
    }

    backends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_retryability() {
        assert!(BackendError::Timeout(30).is_retryable());
        assert!(BackendError::Connect("https://ollama.com".to_string()).is_retryable());
        assert!(BackendError::Api {
            status: 500,
            body: String::new()
        }
        .is_retryable());
        assert!(!BackendError::InvalidResponse("too short".to_string()).is_retryable());
    }

    #[test]
    fn test_chat_messages_shape() {
        let request = EnhanceRequest {
            system_prompt: "system".to_string(),
            user_content: "user".to_string(),
            temperature: 0.7,
            max_tokens: 100,
        };

        let messages = chat_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "user");
    }

    #[test]
    fn test_backend_names() {
        let ollama = OllamaCloudBackend::new(
            "https://ollama.com".to_string(),
            "key".to_string(),
            "gpt-oss:120b".to_string(),
            30,
        );
        assert_eq!(ollama.name(), "ollama-cloud");

        let openai = OpenAiCompatBackend::new(
            "https://api.openai.com/v1".to_string(),
            "key".to_string(),
            "gpt-4o-mini".to_string(),
            30,
        );
        assert_eq!(openai.name(), "openai-compatible");
    }

    #[test]
    fn test_openai_response_parsing() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let parsed: OpenAiChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }

    #[test]
    fn test_ollama_response_parsing() {
        let json = r#"{"message": {"role": "assistant", "content": "hello"}, "done": true}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.message.content, "hello");
    }
}
