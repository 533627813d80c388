//! Image generation backends used by the asset generator.

use async_trait::async_trait;
use serde_json::json;
use worldsmith_types::{Result, WorldsmithError};

const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    /// `WIDTHxHEIGHT`, e.g. `1536x1024`.
    pub size: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Either a remote URL or a `data:` URL carrying the encoded image.
    pub url: String,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// OpenAiImageAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiImageAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiImageAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com".to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| WorldsmithError::AuthError {
            provider: "openai".into(),
        })?;
        Ok(Self::new(key))
    }
}

fn build_request_body(model: &str, request: &ImageRequest) -> serde_json::Value {
    json!({
        "model": model,
        "prompt": request.prompt,
        "size": request.size,
        "n": 1,
    })
}

fn parse_response(body: &serde_json::Value) -> Result<GeneratedImage> {
    let first = &body["data"][0];
    if let Some(url) = first["url"].as_str() {
        return Ok(GeneratedImage {
            url: url.to_string(),
        });
    }
    if let Some(b64) = first["b64_json"].as_str() {
        return Ok(GeneratedImage {
            url: format!("data:image/png;base64,{b64}"),
        });
    }
    Err(WorldsmithError::ProviderError {
        provider: "openai".into(),
        status: 200,
        message: "image response carried neither url nor b64_json".into(),
        retryable: false,
    })
}

fn map_error(status: reqwest::StatusCode, body: &str) -> WorldsmithError {
    let status_u16 = status.as_u16();
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());
    match status_u16 {
        429 => WorldsmithError::RateLimited {
            provider: "openai".into(),
            retry_after_ms: 1000,
        },
        401 | 403 => WorldsmithError::AuthError {
            provider: "openai".into(),
        },
        500 | 502 | 503 => WorldsmithError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message,
            retryable: true,
        },
        _ => WorldsmithError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message,
            retryable: false,
        },
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageAdapter {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let body = build_request_body(&self.model, request);

        let transport = |e: reqwest::Error| WorldsmithError::ProviderError {
            provider: "openai".into(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        };

        let resp = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        let response_body = resp.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value = serde_json::from_str(&response_body)?;
        parse_response(&json)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
