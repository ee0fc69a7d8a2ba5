//! Google Gemini `generateContent` adapter (text).
//!
//! See: <https://ai.google.dev/api/generate-content>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{Capability, Content, FailureKind, GenerationRequest, Outcome};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 2048;

/// Text generation through Gemini.
///
/// The API key travels as a `key` query parameter. Recognized payload
/// options: `model`, `temperature`, `max_tokens`.
#[derive(Clone)]
pub struct GeminiAdapter {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
}

impl GeminiAdapter {
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
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [ContentParts<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct ContentParts<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u64,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn invoke(&self, request: &GenerationRequest) -> Outcome {
        if request.capability != Capability::Text {
            return Outcome::failure(
                FailureKind::Unsupported,
                format!("gemini adapter does not generate {}", request.capability),
            );
        }
        let payload = &request.payload;
        let model = payload.str_option("model").unwrap_or(&self.model);
        let body = GenerateContentRequest {
            contents: [ContentParts {
                parts: [TextPart {
                    text: &payload.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: payload
                    .get("temperature")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(DEFAULT_TEMPERATURE),
                max_output_tokens: payload
                    .get("max_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            },
        };

        let sent = self
            .http
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let response: GenerateContentResponse = match http::send_json(sent).await {
            Ok(response) => response,
            Err(failure) => return Outcome::Failure(failure),
        };

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Outcome::failure(FailureKind::EmptyResponse, "gemini returned no candidates");
        };
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Outcome::failure(
                FailureKind::ContentFiltered,
                "gemini blocked the response for safety",
            );
        }
        let text = candidate
            .content
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Outcome::failure(FailureKind::EmptyResponse, "gemini returned no text");
        }
        Outcome::Success(Content::text(text))
    }
}
