//! OpenAI chat completions adapter (text).
//!
//! See: <https://platform.openai.com/docs/api-reference/chat>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{Capability, Content, FailureKind, GenerationRequest, Outcome};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4-turbo";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful social media content assistant.";

/// Text generation through OpenAI's chat completions endpoint.
///
/// Recognized payload options: `model`, `max_tokens`, `temperature`,
/// `system`.
#[derive(Clone)]
pub struct OpenAiAdapter {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Adapter against a custom base URL (proxies, wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: http::default_client(),
            base_url: http::normalize_base_url(base_url),
            model: DEFAULT_MODEL.to_owned(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Share an existing HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn invoke(&self, request: &GenerationRequest) -> Outcome {
        if request.capability != Capability::Text {
            return Outcome::failure(
                FailureKind::Unsupported,
                format!("openai adapter does not generate {}", request.capability),
            );
        }
        let payload = &request.payload;
        let body = ChatRequest {
            model: payload.str_option("model").unwrap_or(&self.model),
            max_tokens: payload
                .get("max_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(u64::from(DEFAULT_MAX_TOKENS)),
            temperature: payload.get("temperature").and_then(|v| v.as_f64()),
            messages: [
                ChatMessage {
                    role: "system",
                    content: payload.str_option("system").unwrap_or(DEFAULT_SYSTEM_PROMPT),
                },
                ChatMessage {
                    role: "user",
                    content: &payload.prompt,
                },
            ],
        };

        let sent = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let response: ChatResponse = match http::send_json(sent).await {
            Ok(response) => response,
            Err(failure) => return Outcome::Failure(failure),
        };

        match response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
        {
            Some(text) if !text.trim().is_empty() => Outcome::Success(Content::text(text)),
            _ => Outcome::failure(FailureKind::EmptyResponse, "openai returned no completion"),
        }
    }
}
