//! Hosted text-to-image inference.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-image-1";
pub const IMAGE_SIZE: &str = "1024x1024";

/// What the inference endpoint handed back for one image.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    /// Short-lived URL to download the image from.
    Url(String),
    /// Image bytes returned inline.
    Inline(Bytes),
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("image generation failed: {message}")]
    Api { status: u16, message: String },
    #[error("image generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image generation returned no image")]
    Empty,
    #[error("image generation returned invalid base64 data")]
    InvalidPayload,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one square image for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, UpstreamError>;
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

/// OpenAI-compatible `/v1/images/generations` client.
#[derive(Clone)]
pub struct OpenAiGenerator {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

/// Best-effort `error.message` from an upstream error body.
fn upstream_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: Option<ErrorDetail>,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|detail| detail.message)
        .unwrap_or_else(|| "unknown error".to_string())
}

#[async_trait]
impl ImageGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, UpstreamError> {
        // Only the DALL-E models accept `response_format`; gpt-image models
        // always answer with base64.
        let response_format = self.model.starts_with("dall-e").then_some("url");
        let request = GenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: IMAGE_SIZE,
            response_format,
        };

        tracing::info!("requesting image from {} ({})", self.base_url, self.model);
        let response = self
            .http
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("image API error {}: {}", status, body);
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message: upstream_message(&body),
            });
        }

        let parsed: GenerationResponse = response.json().await?;
        let first = parsed.data.into_iter().next().ok_or(UpstreamError::Empty)?;
        match (first.url, first.b64_json) {
            (Some(url), _) => Ok(GeneratedImage::Url(url)),
            (None, Some(b64)) => general_purpose::STANDARD
                .decode(b64.trim())
                .map(|bytes| GeneratedImage::Inline(Bytes::from(bytes)))
                .map_err(|_| UpstreamError::InvalidPayload),
            (None, None) => Err(UpstreamError::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    fn generator(server: &MockServer, model: &str) -> OpenAiGenerator {
        OpenAiGenerator::new(Client::new(), server.uri(), "sk-test", model)
    }

    #[tokio::test]
    async fn dall_e_requests_url_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "dall-e-3",
                "prompt": "a fox, as glowing fantasy art",
                "n": 1,
                "size": "1024x1024",
                "response_format": "url"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "created": 1,
                "data": [{ "url": "https://files.example.com/img.png" }]
            })))
            .mount(&server)
            .await;

        let image = generator(&server, "dall-e-3")
            .generate("a fox, as glowing fantasy art")
            .await
            .unwrap();
        assert_eq!(image, GeneratedImage::Url("https://files.example.com/img.png".into()));
    }

    #[tokio::test]
    async fn gpt_image_decodes_inline_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "b64_json": general_purpose::STANDARD.encode(b"\x89PNG\r\n\x1a\nrest") }]
            })))
            .mount(&server)
            .await;

        let image = generator(&server, DEFAULT_MODEL).generate("a fox").await.unwrap();
        assert_eq!(image, GeneratedImage::Inline(Bytes::from_static(b"\x89PNG\r\n\x1a\nrest")));
    }

    #[tokio::test]
    async fn upstream_error_keeps_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Rate limit reached", "type": "requests" }
            })))
            .mount(&server)
            .await;

        let err = generator(&server, DEFAULT_MODEL).generate("a fox").await.unwrap_err();
        match err {
            UpstreamError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let err = generator(&server, DEFAULT_MODEL).generate("a fox").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Empty));
    }

    #[test]
    fn upstream_message_falls_back() {
        assert_eq!(upstream_message("<html>"), "unknown error");
        assert_eq!(upstream_message(r#"{"error":{}}"#), "unknown error");
    }
}
