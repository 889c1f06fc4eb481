//! Text completion backend.
//!
//! The dialogue engine and outline generator only see the
//! [`CompletionProvider`] trait; [`OpenAiCompletion`] talks to any
//! OpenAI-compatible chat completion endpoint.

use std::env;
use std::sync::LazyLock;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::PodcastError;

/// Default API base when no override is set in the environment.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// A single completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    /// Persona or instruction sent as the system message, if any.
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Opaque text-generation capability: prompt in, plain text out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, PodcastError>;
}

/// Chat completion client for OpenAI-compatible APIs.
pub struct OpenAiCompletion {
    client: Client<OpenAIConfig>,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiCompletion {
    pub fn new(api_base: &str, api_key: &str) -> Result<Self, PodcastError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        // Retries are counted here, so the client's own backoff gives up at once.
        let no_backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::ZERO),
            ..ExponentialBackoff::default()
        };

        Ok(Self {
            client: Client::with_config(config)
                .with_http_client(http_client)
                .with_backoff(no_backoff),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Build a client from `OPENAI_API_KEY` and the optional
    /// `OPENAI_API_BASE` / `OPENAI_BASE_URL` overrides.
    pub fn from_env() -> Result<Self, PodcastError> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PodcastError::MissingCredential {
                var: "OPENAI_API_KEY".to_string(),
            })?;

        let api_base = env::var("OPENAI_API_BASE")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Self::new(&api_base, &api_key)
    }

    /// Retries after the first attempt on transient failures.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay before the first retry; doubled on each further attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Throttling, server errors and dropped connections are worth another try.
/// Everything else (bad credentials, invalid requests, exhausted quota) is not.
fn is_transient(error: &OpenAIError) -> bool {
    match error {
        OpenAIError::Reqwest(e) => e.is_timeout() || e.is_connect(),
        OpenAIError::ApiError(api) => {
            // Server errors arrive as raw bodies with no type or code.
            let server_error = api.r#type.is_none() && api.code.is_none();
            let throttled = api.code.as_deref() == Some("rate_limit_exceeded")
                && api.r#type.as_deref() != Some("insufficient_quota");
            server_error || throttled
        }
        _ => false,
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, PodcastError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: system.into(),
                    name: None,
                },
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: request.prompt.clone().into(),
                name: None,
            },
        ));

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .temperature(request.temperature)
            .messages(messages)
            .build()?;

        let mut attempt = 0;
        loop {
            match self.client.chat().create(chat_request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    debug!(model = %request.model, chars = content.len(), "completion received");
                    return Ok(content);
                }
                Err(e) if is_transient(&e) && attempt < self.max_retries => {
                    // Exponential backoff: 1s, 2s, 4s, ...
                    let delay = self.retry_delay * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(error = %e, attempt, ?delay, "completion request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

static REASONING_BLOCK: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratchpad",
        "analysis",
    ]
    .iter()
    .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
    .collect()
});

static ORPHAN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][\w-]*[^>]*>").expect("valid tag regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Strip reasoning blocks, stray tags and markdown emphasis from a completion
/// so it can be embedded in a `<speak>` element.
pub fn clean_response(response: &str) -> String {
    let mut result = response.to_string();

    for re in REASONING_BLOCK.iter() {
        result = re.replace_all(&result, "").into_owned();
    }

    result = ORPHAN_TAG.replace_all(&result, "").into_owned();
    result = result.replace('*', "");
    result = WHITESPACE.replace_all(&result, " ").into_owned();

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_response_thinking_tags() {
        let input = "<thinking>Let me think about this...</thinking>The answer is 42.";
        assert_eq!(clean_response(input), "The answer is 42.");
    }

    #[test]
    fn test_clean_response_multiline_tags() {
        let input = "<think>\nMultiple\nlines\n</think>\nSo, what is a vector database?";
        assert_eq!(clean_response(input), "So, what is a vector database?");
    }

    #[test]
    fn test_clean_response_strips_markup_and_emphasis() {
        let input = "It is **really** simple. <speak voice=\"Ava\">nested</speak>";
        let output = clean_response(input);
        assert!(!output.contains('<'));
        assert!(!output.contains('*'));
        assert_eq!(output, "It is really simple. nested");
    }

    #[test]
    fn test_clean_response_keeps_comparisons() {
        assert_eq!(clean_response("Latency < 10ms   is   fine."), "Latency < 10ms is fine.");
    }

    #[tokio::test]
    async fn test_openai_completion_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "You are Ava."},
                    {"role": "user", "content": "Say hi."}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "created": 0,
                    "model": "gpt-4o-mini",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "Hi there!"},
                        "finish_reason": "stop"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAiCompletion::new(&server.url(), "test-key").unwrap();
        let request = CompletionRequest::new("gpt-4o-mini", "Say hi.").with_system("You are Ava.");
        let text = client.complete(&request).await.unwrap();

        assert_eq!(text, "Hi there!");
        mock.assert_async().await;
    }

    fn chat_body(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_openai_completion_auth_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "error": {
                        "message": "Incorrect API key provided",
                        "type": "invalid_request_error",
                        "param": null,
                        "code": "invalid_api_key"
                    }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiCompletion::new(&server.url(), "bad-key")
            .unwrap()
            .with_retry_delay(Duration::from_secs(5));
        let started = std::time::Instant::now();
        let err = client
            .complete(&CompletionRequest::new("gpt-4o-mini", "Say hi."))
            .await
            .unwrap_err();

        assert!(matches!(err, PodcastError::OpenAI(_)));
        assert!(err.to_string().contains("Incorrect API key"));
        assert!(started.elapsed() < Duration::from_secs(5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_completion_retries_server_error() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream unavailable")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body("Back again."))
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiCompletion::new(&server.url(), "test-key")
            .unwrap()
            .with_retry_delay(Duration::from_millis(1));
        let text = client
            .complete(&CompletionRequest::new("gpt-4o-mini", "Say hi."))
            .await
            .unwrap();

        assert_eq!(text, "Back again.");
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_completion_gives_up_after_max_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let client = OpenAiCompletion::new(&server.url(), "test-key")
            .unwrap()
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(1));
        let err = client
            .complete(&CompletionRequest::new("gpt-4o-mini", "Say hi."))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("overloaded"));
        mock.assert_async().await;
    }
}
