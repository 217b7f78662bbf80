//! The seam between the decision pipeline and a language model.
//!
//! A judgment is always one system prompt (the rule block) plus one user
//! prompt (the intercepted action). Adapters stream the completion back in
//! chunks; [`collect_completion`] joins them.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used by model adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Chunks of a completion as they arrive.
pub type AdapterStream = Pin<Box<dyn Stream<Item = AdapterResult<CompletionChunk>> + Send>>;

/// Failures reaching or reading from a model.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Bad endpoint, credentials or request shape.
    #[error("model adapter misconfigured: {reason}")]
    Configuration {
        /// What is wrong.
        reason: String,
    },

    /// The connection failed or broke mid-response.
    #[error("model endpoint unreachable: {reason}")]
    Transport {
        /// Underlying failure.
        reason: String,
    },

    /// No answer within the adapter timeout.
    #[error("model did not answer within {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status.
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// The body could not be decoded.
    #[error("unreadable model response: {reason}")]
    Response {
        /// Decoder message.
        reason: String,
    },
}

impl AdapterError {
    /// Builds a [`AdapterError::Configuration`].
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Builds a [`AdapterError::Transport`].
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Builds a [`AdapterError::Response`].
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }
}

/// Which provider and model an adapter talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
    model: String,
}

impl AdapterMetadata {
    /// Describes `model` served by `provider`.
    #[must_use]
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Provider label, e.g. `openai-compat`.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// A single judgment request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    system_prompt: String,
    user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Pairs the instructions with the material to judge.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when `user_prompt` is blank.
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> AdapterResult<Self> {
        let user_prompt = user_prompt.into();
        if user_prompt.trim().is_empty() {
            return Err(AdapterError::configuration("user prompt must not be blank"));
        }
        Ok(Self {
            system_prompt: system_prompt.into(),
            user_prompt,
            temperature: None,
            max_output_tokens: None,
        })
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Caps the completion length.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Instructions sent as the system message.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Material sent as the user message.
    #[must_use]
    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }

    /// Requested temperature, if any.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Requested token cap, if any.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }
}

/// Part of a completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Text carried by this chunk.
    pub text: String,
    /// Set on the last chunk.
    pub finished: bool,
}

impl CompletionChunk {
    /// Intermediate chunk.
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finished: false,
        }
    }

    /// Final chunk.
    #[must_use]
    pub fn last(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finished: true,
        }
    }
}

/// A language model able to answer a [`CompletionRequest`].
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Provider and model description.
    fn metadata(&self) -> &AdapterMetadata;

    /// Starts a completion.
    async fn infer(&self, request: CompletionRequest) -> AdapterResult<AdapterStream>;
}

/// Joins a completion stream up to and including its final chunk.
///
/// # Errors
///
/// Returns the first error the stream yields.
pub async fn collect_completion(mut stream: AdapterStream) -> AdapterResult<String> {
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        reply.push_str(&chunk.text);
        if chunk.finished {
            break;
        }
    }
    Ok(reply)
}
