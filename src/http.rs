//! Blocking HTTP client for an image-generation endpoint that accepts an
//! input image, prompt, and sampling parameters.
//!
//! Request body: `{ model, prompt, image, num_inference_steps, guidance_scale }`
//! with the image sent as a PNG `data:` URI. Success body:
//! `{ images: [ { url } ] }`, where `url` is either a `data:` URI or a plain
//! http(s) link that is downloaded. Failure bodies may carry `{ error, detail }`.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::oracle::{EditRequest, Oracle};
use crate::retry::{self, RetryPolicy};
use crate::state::CancelToken;

/// Default generation endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.siliconflow.cn/v1/images/generations";
/// Default image-edit model.
pub const DEFAULT_MODEL: &str = "Qwen/Qwen-Image-Edit";
/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "SILICONFLOW_API_KEY";
/// Environment variable overriding [`DEFAULT_ENDPOINT`].
pub const ENDPOINT_ENV: &str = "ORACLE_ENDPOINT";
/// Environment variable overriding [`DEFAULT_MODEL`].
pub const MODEL_ENV: &str = "ORACLE_MODEL";

const STEPS_RANGE: (u32, u32) = (20, 100);
const GUIDANCE_RANGE: (f32, f32) = (1.0, 20.0);

/// Connection settings for [`HttpOracle`].
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Generation endpoint URL.
    pub endpoint: String,
    /// Bearer token.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Per-request timeout in seconds. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
    /// Retries allowed on HTTP 429. Zero keeps every failure fatal.
    pub rate_limit_retries: u32,
}

impl OracleConfig {
    /// Config with default endpoint and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: None,
            rate_limit_retries: 0,
        }
    }

    /// Read the API key from `SILICONFLOW_API_KEY`, with optional
    /// `ORACLE_ENDPOINT` and `ORACLE_MODEL` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is missing or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`OracleConfig::from_env`], resolving variables through `lookup`.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let api_key =
            var(API_KEY_ENV).ok_or_else(|| Error::Config(format!("{API_KEY_ENV} is not set")))?;
        let mut config = Self::new(api_key);
        if let Some(endpoint) = var(ENDPOINT_ENV) {
            config.endpoint = endpoint;
        }
        if let Some(model) = var(MODEL_ENV) {
            config.model = model;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    image: String,
    num_inference_steps: u32,
    guidance_scale: f32,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    images: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<serde_json::Value>,
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

/// [`Oracle`] backed by an HTTP image-generation service.
pub struct HttpOracle {
    config: OracleConfig,
    client: reqwest::blocking::Client,
    cancel: CancelToken,
}

impl HttpOracle {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be constructed.
    pub fn new(config: OracleConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        builder = builder.timeout(config.timeout_secs.map(Duration::from_secs));
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            cancel: CancelToken::new(),
        })
    }

    /// Abort rate-limit backoff when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn send(&self, body: &GenerationRequest<'_>) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(body).map_err(|e| Error::Oracle {
            status: None,
            detail: format!("failed to serialize request: {e}"),
        })?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().map_err(transport_error)?;
        if !status.is_success() {
            log::warn!("oracle returned HTTP {}", status.as_u16());
            return Err(Error::Oracle {
                status: Some(status.as_u16()),
                detail: error_detail(&text),
            });
        }

        let url = parse_result_url(&text)?;
        self.fetch_image(&url)
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("data:") {
            return decode_data_uri(url);
        }
        let response = self.client.get(url).send().map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Oracle {
                status: Some(status.as_u16()),
                detail: format!("failed to download result image from {url}"),
            });
        }
        let bytes = response.bytes().map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

impl Oracle for HttpOracle {
    fn edit(&self, image: &[u8], request: &EditRequest) -> Result<Vec<u8>> {
        let body = GenerationRequest {
            model: &self.config.model,
            prompt: &request.prompt,
            image: encode_data_uri(image, "image/png"),
            num_inference_steps: request.steps.clamp(STEPS_RANGE.0, STEPS_RANGE.1),
            guidance_scale: request.guidance.clamp(GUIDANCE_RANGE.0, GUIDANCE_RANGE.1),
        };
        log::debug!(
            "oracle request: model={} steps={} guidance={} image={} bytes",
            body.model,
            body.num_inference_steps,
            body.guidance_scale,
            image.len()
        );

        let policy = if self.config.rate_limit_retries == 0 {
            RetryPolicy::NONE
        } else {
            RetryPolicy::rate_limited(self.config.rate_limit_retries)
        };
        retry::retry(&policy, &self.cancel, || self.send(&body))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Oracle {
        status: e.status().map(|s| s.as_u16()),
        detail: e.to_string(),
    }
}

/// Wrap raw bytes in a base64 `data:` URI.
#[must_use]
pub fn encode_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", general_purpose::STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URI into raw bytes.
///
/// # Errors
///
/// Returns [`Error::Oracle`] if the URI is not base64 encoded or malformed.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let malformed = |detail: &str| Error::Oracle {
        status: None,
        detail: format!("malformed data URI: {detail}"),
    };
    let rest = uri.strip_prefix("data:").ok_or_else(|| malformed("missing scheme"))?;
    let (meta, payload) = rest.split_once(',').ok_or_else(|| malformed("missing payload"))?;
    if !meta.ends_with(";base64") {
        return Err(malformed("not base64"));
    }
    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| malformed(&e.to_string()))
}

/// Pull the first image URL out of a success body.
fn parse_result_url(text: &str) -> Result<String> {
    let parsed: GenerationResponse = serde_json::from_str(text).map_err(|e| Error::Oracle {
        status: None,
        detail: format!("unreadable response body: {e}"),
    })?;
    parsed
        .images
        .into_iter()
        .next()
        .and_then(|entry| entry.url)
        .filter(|url| !url.is_empty())
        .ok_or(Error::MissingResult)
}

/// Best-effort human-readable detail from an error body.
fn error_detail(text: &str) -> String {
    let Ok(body) = serde_json::from_str::<ErrorBody>(text) else {
        return text.trim().to_string();
    };
    let render = |v: serde_json::Value| match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Object(ref map) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| v.to_string(), str::to_string),
        other => other.to_string(),
    };
    let parts: Vec<String> = [body.error.map(render), body.detail.map(render), body.message]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        text.trim().to_string()
    } else {
        parts.join(": ")
    }
}
