//! Adapter for OpenAI-compatible chat completion endpoints.
//!
//! Works against the hosted `OpenAI` API as well as local servers exposing the
//! same wire format (LM Studio, vLLM, llama.cpp server).

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use futures::stream;
use hyper::body::to_bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Request, Uri};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;

use crate::http::{HyperClient, build_https_client};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, CompletionChunk,
    CompletionRequest, ModelAdapter,
};

/// Environment variable consulted by [`OpenAiCompatConfig::from_env`].
pub const ORACLE_API_KEY_ENV: &str = "ORCHESTRA_GUARD_ORACLE_API_KEY";

/// Default base URL, matching a local LM Studio server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1/";

/// Endpoint, model and credentials for [`OpenAiCompatAdapter`].
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("default_temperature", &self.default_temperature)
            .finish()
    }
}

impl OpenAiCompatConfig {
    /// Targets `model` on the local default endpoint with a 60s timeout.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
        }
    }

    /// Like [`OpenAiCompatConfig::new`], reading the key from
    /// [`ORACLE_API_KEY_ENV`] when set.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut config = Self::new(model);
        config.api_key = env::var(ORACLE_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        config
    }

    /// Points the adapter at another server. The URL must carry its version
    /// prefix, e.g. `https://api.openai.com/v1`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for a URL without an http(s)
    /// scheme or one that does not parse.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = normalize_base_url(base_url.as_ref())?;
        Ok(self)
    }

    /// Temperature used when a request leaves it unset.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// HTTP timeout for one completion.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bearer token sent as `Authorization`.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Normalized base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// [`ModelAdapter`] over `POST {base_url}chat/completions`.
pub struct OpenAiCompatAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    api_key: Option<String>,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiCompatAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatAdapter {
    /// Builds the adapter and its HTTPS client.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the completions URL does
    /// not parse.
    pub fn new(config: OpenAiCompatConfig) -> AdapterResult<Self> {
        let endpoint: Uri = format!("{}chat/completions", config.base_url)
            .parse()
            .map_err(|err| AdapterError::configuration(format!("bad completions URL: {err}")))?;

        Ok(Self {
            client: build_https_client(),
            endpoint,
            metadata: AdapterMetadata::new("openai-compat", config.model),
            api_key: config.api_key,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    fn chat_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatBody<'a> {
        ChatBody {
            model: self.metadata.model(),
            messages: [
                ChatTurn {
                    role: "system",
                    content: request.system_prompt(),
                },
                ChatTurn {
                    role: "user",
                    content: request.user_prompt(),
                },
            ],
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
            stream: false,
        }
    }

    async fn post(&self, body: Vec<u8>) -> AdapterResult<Vec<u8>> {
        let mut builder = Request::post(self.endpoint.clone()).header(CONTENT_TYPE, "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {key}"));
        }
        let request = builder
            .body(Body::from(body))
            .map_err(|err| AdapterError::configuration(format!("bad chat request: {err}")))?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::Timeout(self.timeout))?
            .map_err(|err| AdapterError::transport(err.to_string()))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| AdapterError::transport(format!("reading body: {err}")))?;

        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ModelAdapter for OpenAiCompatAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: CompletionRequest) -> AdapterResult<AdapterStream> {
        let body = serde_json::to_vec(&self.chat_body(&request))
            .map_err(|err| AdapterError::configuration(format!("encoding chat body: {err}")))?;
        let bytes = self.post(body).await?;

        let completion: ChatCompletion = serde_json::from_slice(&bytes)
            .map_err(|err| AdapterError::response(err.to_string()))?;
        let (text, finish_reason) = completion.into_text();
        debug!(
            model = self.metadata.model(),
            ?finish_reason,
            chars = text.len(),
            "chat completion received"
        );

        Ok(Box::pin(stream::once(async move {
            Ok(CompletionChunk::last(text))
        })))
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    /// Text of the first choice that carries any, with its finish reason.
    /// An answer without content yields an empty string.
    fn into_text(self) -> (String, Option<String>) {
        self.choices
            .into_iter()
            .find_map(|choice| {
                let content = choice.message?.content?;
                Some((content, choice.finish_reason))
            })
            .unwrap_or_default()
    }
}

fn normalize_base_url(input: &str) -> AdapterResult<String> {
    let trimmed = input.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AdapterError::configuration(
            "base URL must start with http:// or https://",
        ));
    }
    let base = if trimmed.ends_with('/') {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/")
    };
    base.parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid base URL: {err}")))?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_needs_http_scheme() {
        let err = OpenAiCompatConfig::new("local-model")
            .with_base_url("localhost:1234/v1")
            .unwrap_err();
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = OpenAiCompatConfig::new("gpt-4o-mini")
            .with_base_url(" https://api.openai.com/v1 ")
            .unwrap();
        assert_eq!(config.base_url(), "https://api.openai.com/v1/");
    }

    #[test]
    fn api_key_is_redacted() {
        let rendered = format!("{:?}", OpenAiCompatConfig::new("m").with_api_key("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn first_choice_with_content_wins() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{
                "choices": [
                    { "message": { "content": null }, "finish_reason": "length" },
                    { "message": { "content": "{\"decision\":\"ALLOW\"}" }, "finish_reason": "stop" }
                ]
            }"#,
        )
        .unwrap();
        let (text, finish) = completion.into_text();
        assert_eq!(text, "{\"decision\":\"ALLOW\"}");
        assert_eq!(finish.as_deref(), Some("stop"));

        let empty: ChatCompletion = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.into_text(), (String::new(), None));
    }

    #[test]
    fn chat_body_sends_system_then_user() {
        let adapter =
            OpenAiCompatAdapter::new(OpenAiCompatConfig::new("local-model").with_default_temperature(0.1))
                .unwrap();
        let request = CompletionRequest::new("You are the Ethical Reasoner", "judge this").unwrap();

        let body = serde_json::to_value(adapter.chat_body(&request)).unwrap();
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "judge this");
        assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["stream"], false);
    }
}
