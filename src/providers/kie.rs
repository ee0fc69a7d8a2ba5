//! Kie.ai Veo adapter (video, asynchronous).
//!
//! Submission returns a task id; the result is fetched later through
//! `record-info`. Kie wraps every response in a `{code, msg, data}`
//! envelope and can report errors with HTTP 200 and a non-200 `code`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{
    AsyncHandle, Capability, Content, FailureKind, GenerationRequest, Outcome, ProviderFailure,
};

const DEFAULT_BASE_URL: &str = "https://api.kie.ai/api/v1/veo";
const DEFAULT_MODEL: &str = "veo3_fast";
const DEFAULT_ASPECT_RATIO: &str = "9:16";
const MODELS: [&str; 2] = ["veo3_fast", "veo3_standard"];
const ASPECT_RATIOS: [&str; 3] = ["16:9", "9:16", "1:1"];
const MAX_PROMPT_CHARS: usize = 500;
const MAX_DURATION_SECS: f64 = 10.0;

/// Video generation through Kie.ai's Veo endpoints.
///
/// Recognized payload options: `model`, `aspect_ratio`, `duration`,
/// `style`, `image_url` (switches to image-to-video).
#[derive(Clone)]
pub struct KieAdapter {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
}

impl KieAdapter {
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

    fn build_body<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Result<GenerateBody<'a>, ProviderFailure> {
        let payload = &request.payload;
        let invalid = |message: String| ProviderFailure::new(FailureKind::InvalidRequest, message);

        if payload.prompt.trim().is_empty() {
            return Err(invalid("prompt is empty".into()));
        }
        if payload.prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(invalid(format!("prompt exceeds {MAX_PROMPT_CHARS} characters")));
        }
        let model = payload.str_option("model").unwrap_or(&self.model);
        if !MODELS.contains(&model) {
            return Err(invalid(format!("unknown model {model}")));
        }
        let aspect_ratio = payload
            .str_option("aspect_ratio")
            .unwrap_or(DEFAULT_ASPECT_RATIO);
        if !ASPECT_RATIOS.contains(&aspect_ratio) {
            return Err(invalid(format!("unsupported aspect ratio {aspect_ratio}")));
        }
        let duration = payload.duration().map(|d| d.as_secs_f64());
        if let Some(secs) = duration
            && secs > MAX_DURATION_SECS
        {
            return Err(invalid(format!(
                "duration {secs}s exceeds {MAX_DURATION_SECS}s"
            )));
        }

        Ok(GenerateBody {
            prompt: &payload.prompt,
            model,
            aspect_ratio,
            duration,
            style: payload.str_option("style"),
            image_urls: payload.str_option("image_url").map(|url| vec![url]),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    prompt: &'a str,
    model: &'a str,
    aspect_ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_urls: Option<Vec<&'a str>>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap `data`, turning a non-200 envelope code into a failure.
    fn into_data(self) -> Result<T, ProviderFailure> {
        let message = self.msg.unwrap_or_else(|| "no message".into());
        if let Some(code) = self.code
            && code != 200
        {
            let kind = StatusCode::from_u16(code)
                .map(|status| http::classify_status(status, &message))
                .unwrap_or(FailureKind::Upstream);
            return Err(ProviderFailure::new(kind, format!("kie code {code}: {message}")));
        }
        self.data
            .ok_or_else(|| ProviderFailure::new(FailureKind::Malformed, "kie response has no data"))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskCreated {
    task_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfo {
    #[serde(default)]
    result_json: Option<String>,
    #[serde(default)]
    success_flag: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultJson {
    #[serde(default)]
    result_urls: Vec<String>,
}

#[async_trait]
impl ProviderAdapter for KieAdapter {
    fn name(&self) -> &str {
        "kie"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn invoke(&self, request: &GenerationRequest) -> Outcome {
        if request.capability != Capability::Video {
            return Outcome::failure(
                FailureKind::Unsupported,
                format!("kie adapter does not generate {}", request.capability),
            );
        }
        let body = match self.build_body(request) {
            Ok(body) => body,
            Err(failure) => return Outcome::Failure(failure),
        };

        let sent = self
            .http
            .post(format!("{}/generate", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let created = http::send_json::<Envelope<TaskCreated>>(sent)
            .await
            .and_then(Envelope::into_data);
        match created {
            Ok(task) => Outcome::pending(task.task_id),
            Err(failure) => Outcome::Failure(failure),
        }
    }

    async fn check_status(&self, handle: &AsyncHandle) -> Outcome {
        let sent = self
            .http
            .get(format!("{}/record-info", self.base_url))
            .query(&[("taskId", handle.as_str())])
            .bearer_auth(&self.api_key);
        let info = match http::send_json::<Envelope<RecordInfo>>(sent)
            .await
            .and_then(Envelope::into_data)
        {
            Ok(info) => info,
            Err(failure) => return Outcome::Failure(failure),
        };

        // Flags 2 and 3 are generation failures; anything else defers to resultJson.
        if let Some(flag @ (2 | 3)) = info.success_flag {
            let message = info
                .error_message
                .unwrap_or_else(|| format!("kie task failed with flag {flag}"));
            return Outcome::failure(FailureKind::Upstream, message);
        }

        let Some(raw) = info.result_json.filter(|raw| !raw.trim().is_empty()) else {
            return Outcome::Pending(handle.clone());
        };
        match serde_json::from_str::<ResultJson>(&raw) {
            Ok(result) if !result.result_urls.is_empty() => {
                Outcome::Success(Content::media(result.result_urls))
            }
            Ok(_) => Outcome::Pending(handle.clone()),
            Err(e) => Outcome::failure(FailureKind::Malformed, format!("bad resultJson: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> KieAdapter {
        KieAdapter::new("key")
    }

    #[test]
    fn rejects_long_prompt() {
        let request = GenerationRequest::video("x".repeat(501));
        let failure = adapter().build_body(&request).err().unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidRequest);
    }

    #[test]
    fn rejects_unknown_aspect_ratio_and_model() {
        let request = GenerationRequest::video("cat").option("aspect_ratio", "4:3");
        assert!(adapter().build_body(&request).is_err());
        let request = GenerationRequest::video("cat").option("model", "veo2");
        assert!(adapter().build_body(&request).is_err());
    }

    #[test]
    fn rejects_long_duration() {
        let request = GenerationRequest::video("cat").option("duration", 12);
        assert!(adapter().build_body(&request).is_err());
    }

    #[test]
    fn body_defaults_and_image_to_video() {
        let adapter = adapter();
        let request =
            GenerationRequest::video("cat").option("image_url", "https://img.example/cat.png");
        let body = serde_json::to_value(adapter.build_body(&request).unwrap()).unwrap();
        assert_eq!(body["model"], "veo3_fast");
        assert_eq!(body["aspectRatio"], "9:16");
        assert_eq!(body["imageUrls"][0], "https://img.example/cat.png");
        assert!(body.get("duration").is_none());
    }

    #[test]
    fn envelope_error_code_is_classified() {
        let envelope: Envelope<TaskCreated> =
            serde_json::from_str(r#"{"code":402,"msg":"Credits insufficient","data":null}"#)
                .unwrap();
        let failure = envelope.into_data().err().unwrap();
        assert_eq!(failure.kind, FailureKind::QuotaExceeded);
    }
}
