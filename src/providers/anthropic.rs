//! Anthropic messages adapter (text).
//!
//! See: <https://docs.anthropic.com/en/api/messages>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{Capability, Content, FailureKind, GenerationRequest, Outcome};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u64 = 2048;

/// Text generation through the Anthropic messages API.
///
/// Recognized payload options: `model`, `max_tokens`, `temperature`.
#[derive(Clone)]
pub struct AnthropicAdapter {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

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

    pub fn with_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn invoke(&self, request: &GenerationRequest) -> Outcome {
        if request.capability != Capability::Text {
            return Outcome::failure(
                FailureKind::Unsupported,
                format!("anthropic adapter does not generate {}", request.capability),
            );
        }
        let payload = &request.payload;
        let body = MessagesRequest {
            model: payload.str_option("model").unwrap_or(&self.model),
            max_tokens: payload
                .get("max_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: payload.get("temperature").and_then(|v| v.as_f64()),
            messages: [UserMessage {
                role: "user",
                content: &payload.prompt,
            }],
        };

        let sent = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);
        let response: MessagesResponse = match http::send_json(sent).await {
            Ok(response) => response,
            Err(failure) => return Outcome::Failure(failure),
        };

        let text: String = response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            return Outcome::failure(FailureKind::EmptyResponse, "anthropic returned no text");
        }
        Outcome::Success(Content::text(text))
    }
}
