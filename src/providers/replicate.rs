//! Replicate predictions adapter (image and video, asynchronous).
//!
//! See: <https://replicate.com/docs/reference/http>

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{AsyncHandle, Capability, Content, FailureKind, GenerationRequest, Outcome};
use crate::{HuginnError, Result};

const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/flux-schnell";
const DEFAULT_VIDEO_MODEL: &str = "stability-ai/stable-video-diffusion";

/// Image and video generation through Replicate predictions.
///
/// The `model` payload option picks the model (`owner/name`). Every other
/// option is forwarded verbatim as a model input next to `prompt`.
#[derive(Clone)]
pub struct ReplicateAdapter {
    api_token: String,
    http: Client,
    base_url: String,
    image_model: String,
    video_model: String,
}

impl ReplicateAdapter {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self::with_base_url(api_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            http: http::default_client(),
            base_url: http::normalize_base_url(base_url),
            image_model: DEFAULT_IMAGE_MODEL.to_owned(),
            video_model: DEFAULT_VIDEO_MODEL.to_owned(),
        }
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_video_model(mut self, model: impl Into<String>) -> Self {
        self.video_model = model.into();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    fn input(request: &GenerationRequest) -> Value {
        let mut input = Map::new();
        input.insert("prompt".into(), Value::String(request.payload.prompt.clone()));
        for (key, value) in &request.payload.options {
            if key != "model" {
                input.insert(key.clone(), value.clone());
            }
        }
        serde_json::json!({ "input": input })
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn into_outcome(self) -> Outcome {
        match self.status.as_str() {
            "starting" | "processing" => Outcome::pending(self.id),
            "succeeded" => {
                let urls = output_urls(self.output.as_ref());
                if urls.is_empty() {
                    Outcome::failure(FailureKind::EmptyResponse, "prediction produced no output")
                } else {
                    Outcome::Success(Content::media(urls))
                }
            }
            "failed" | "canceled" => {
                let message = match self.error {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => format!("prediction {}", self.status),
                };
                Outcome::failure(FailureKind::Upstream, message)
            }
            other => Outcome::failure(
                FailureKind::Malformed,
                format!("unknown prediction status {other}"),
            ),
        }
    }
}

/// Output is a single URL or a list of them, depending on the model.
fn output_urls(output: Option<&Value>) -> Vec<String> {
    match output {
        Some(Value::String(url)) => vec![url.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl ProviderAdapter for ReplicateAdapter {
    fn name(&self) -> &str {
        "replicate"
    }

    fn is_configured(&self) -> bool {
        !self.api_token.is_empty()
    }

    async fn invoke(&self, request: &GenerationRequest) -> Outcome {
        let default_model = match request.capability {
            Capability::Image => &self.image_model,
            Capability::Video => &self.video_model,
            Capability::Text => {
                return Outcome::failure(
                    FailureKind::Unsupported,
                    "replicate adapter does not generate text",
                );
            }
        };
        let model = request.payload.str_option("model").unwrap_or(default_model);

        let sent = self
            .http
            .post(format!("{}/models/{model}/predictions", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&Self::input(request));
        match http::send_json::<Prediction>(sent).await {
            Ok(prediction) => prediction.into_outcome(),
            Err(failure) => Outcome::Failure(failure),
        }
    }

    async fn check_status(&self, handle: &AsyncHandle) -> Outcome {
        let sent = self
            .http
            .get(format!("{}/predictions/{handle}", self.base_url))
            .bearer_auth(&self.api_token);
        match http::send_json::<Prediction>(sent).await {
            Ok(prediction) => prediction.into_outcome(),
            Err(failure) => Outcome::Failure(failure),
        }
    }

    async fn cancel(&self, handle: &AsyncHandle) -> Result<()> {
        let sent = self
            .http
            .post(format!("{}/predictions/{handle}/cancel", self.base_url))
            .bearer_auth(&self.api_token);
        http::send_json::<Prediction>(sent)
            .await
            .map(|_| ())
            .map_err(|failure| HuginnError::Http(failure.to_string()))
    }
}
