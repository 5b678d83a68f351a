//! Client for OpenAI-compatible chat completion endpoints (OpenAI, Ollama).

use std::time::Duration;

use async_trait::async_trait;
use planner_core::config::LlmConfig;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, TokenUsage};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Client(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        body
    }

    async fn send_once(&self, body: &Value) -> Result<Completion, LlmError> {
        let mut builder = self.http.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status, text));
        }

        parse_chat_response(&text)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = self.request_body(request);
        let mut attempt = 0u32;

        loop {
            debug!(
                event_name = "llm.request.sent",
                model = %self.model,
                attempt,
                messages = request.messages.len(),
                json_mode = request.json_mode,
                "sending chat completion request"
            );

            match self.send_once(&body).await {
                Ok(completion) => return Ok(completion),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.initial_backoff, attempt);
                    warn!(
                        event_name = "llm.request.retrying",
                        model = %self.model,
                        attempt,
                        max_retries = self.max_retries,
                        wait_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying chat completion after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(
                        event_name = "llm.request.failed",
                        model = %self.model,
                        attempt,
                        error = %error,
                        "chat completion request failed"
                    );
                    return Err(error);
                }
            }
        }
    }
}

fn classify_transport_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(error.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited
    } else if status.is_server_error() {
        LlmError::Server { status: status.as_u16(), body }
    } else {
        LlmError::Api { status: status.as_u16(), body }
    }
}

fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    initial.saturating_mul(factor).min(MAX_BACKOFF)
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub(crate) fn parse_chat_response(body: &str) -> Result<Completion, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|error| LlmError::InvalidResponse(error.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

    Ok(Completion { content: choice.message.content.unwrap_or_default(), usage: response.usage })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use planner_core::config::AppConfig;
    use reqwest::StatusCode;

    use super::{backoff_delay, classify_status, parse_chat_response, OpenAiCompatibleClient};
    use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};

    fn client(base_url: &str) -> OpenAiCompatibleClient {
        let mut config = AppConfig::default().llm;
        config.base_url = base_url.to_string();
        OpenAiCompatibleClient::new(&config).expect("client builds")
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        assert_eq!(
            client("http://localhost:11434/v1/").endpoint(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_carries_json_mode_and_temperature() {
        let client = client("http://localhost:11434/v1");
        let body = client.request_body(&CompletionRequest {
            messages: vec![ChatMessage::system("persona"), ChatMessage::user("task")],
            temperature: Some(0.5),
            json_mode: true,
        });

        assert_eq!(body["model"], "qwen3:1.7b");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["response_format"]["type"], "json_object");

        let plain = client.request_body(&CompletionRequest {
            messages: vec![ChatMessage::user("task")],
            temperature: None,
            json_mode: false,
        });
        assert!(plain.get("temperature").is_none());
        assert!(plain.get("response_format").is_none());
    }

    #[test]
    fn parses_content_and_usage() {
        let completion = parse_chat_response(
            r#"{
                "choices": [{ "message": { "role": "assistant", "content": "1. Design" } }],
                "usage": { "prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150 }
            }"#,
        )
        .expect("valid body");

        assert_eq!(completion.content, "1. Design");
        assert_eq!(completion.usage.map(|usage| usage.total()), Some(150));
    }

    #[test]
    fn body_without_choices_is_invalid() {
        let error = parse_chat_response(r#"{ "choices": [] }"#).expect_err("no choices");
        assert!(matches!(error, LlmError::InvalidResponse(_)));
        assert!(matches!(parse_chat_response("<html>"), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn status_codes_map_to_retry_classes() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()), LlmError::RateLimited);
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, String::new()).is_retryable());
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let initial = Duration::from_millis(500);
        assert_eq!(backoff_delay(initial, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(initial, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(initial, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(initial, 20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_transport_error_after_retries() {
        let client =
            client("http://127.0.0.1:9/v1").with_initial_backoff(Duration::from_millis(1));

        let error = client
            .complete(&CompletionRequest {
                messages: vec![ChatMessage::user("task")],
                temperature: None,
                json_mode: false,
            })
            .await
            .expect_err("nothing listens on the discard port");

        assert!(matches!(error, LlmError::Transport(_) | LlmError::Timeout));
    }
}
