//! Oracle seam and the adapter-backed implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use guard_adapters::traits::{CompletionRequest, ModelAdapter, collect_completion};
use guard_policy::CacheEntry;
use guard_primitives::Action;
use serde_json::Value;
use tracing::debug;

use crate::prompt;
use crate::OracleResult;

/// Everything the oracle needs to judge one action.
#[derive(Clone, Debug, PartialEq)]
pub struct OracleRequest {
    rendered_rules: String,
    action_context: Value,
    system_prompt: String,
    user_prompt: String,
}

impl OracleRequest {
    /// Renders the prompts for `action` judged against `entries`.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if the action context cannot be
    /// encoded.
    pub fn new(entries: &[CacheEntry], action: &Action) -> serde_json::Result<Self> {
        let rendered_rules = prompt::render_rules(entries);
        let action_context = prompt::action_context(action);
        let user_prompt = prompt::user_prompt(&action_context)?;
        Ok(Self {
            system_prompt: prompt::system_prompt(&rendered_rules),
            rendered_rules,
            action_context,
            user_prompt,
        })
    }

    /// Rule block embedded in the system prompt.
    #[must_use]
    pub fn rendered_rules(&self) -> &str {
        &self.rendered_rules
    }

    /// Action context as JSON.
    #[must_use]
    pub fn action_context(&self) -> &Value {
        &self.action_context
    }

    /// Full system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Full user prompt.
    #[must_use]
    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }
}

/// External reasoning service rendering a free-text judgment.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns the oracle's raw reply for `request`.
    async fn consult(&self, request: &OracleRequest) -> OracleResult<String>;
}

/// [`Oracle`] backed by any [`ModelAdapter`].
pub struct AdapterOracle {
    adapter: Arc<dyn ModelAdapter>,
    temperature: f32,
    max_output_tokens: u32,
}

impl fmt::Debug for AdapterOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterOracle")
            .field("provider", &self.adapter.metadata().provider())
            .field("model", &self.adapter.metadata().model())
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl AdapterOracle {
    /// Wraps `adapter` with low-temperature sampling and a 1000-token cap.
    #[must_use]
    pub fn new(adapter: Arc<dyn ModelAdapter>) -> Self {
        Self {
            adapter,
            temperature: 0.1,
            max_output_tokens: 1000,
        }
    }

    /// Overrides the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Overrides the output token cap.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    fn completion_request(&self, request: &OracleRequest) -> OracleResult<CompletionRequest> {
        Ok(
            CompletionRequest::new(request.system_prompt(), request.user_prompt())?
                .with_temperature(self.temperature)
                .with_max_output_tokens(self.max_output_tokens),
        )
    }
}

#[async_trait]
impl Oracle for AdapterOracle {
    async fn consult(&self, request: &OracleRequest) -> OracleResult<String> {
        let completion = self.completion_request(request)?;
        let stream = self.adapter.infer(completion).await?;
        let reply = collect_completion(stream).await?;
        debug!(
            model = self.adapter.metadata().model(),
            chars = reply.len(),
            "oracle replied"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use guard_adapters::traits::{AdapterMetadata, AdapterResult, AdapterStream, CompletionChunk};
    use std::sync::Mutex;

    struct EchoAdapter {
        metadata: AdapterMetadata,
        seen: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl ModelAdapter for EchoAdapter {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn infer(&self, request: CompletionRequest) -> AdapterResult<AdapterStream> {
            *self.seen.lock().unwrap() = Some(request);
            let chunks = vec![
                Ok(CompletionChunk::partial("{\"decision\":")),
                Ok(CompletionChunk::last("\"ALLOW\",\"rationale\":\"ok\"}")),
            ];
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn adapter_oracle_sends_prompts_and_collects_reply() {
        let adapter = Arc::new(EchoAdapter {
            metadata: AdapterMetadata::new("echo", "test-model"),
            seen: Mutex::new(None),
        });
        let oracle = AdapterOracle::new(adapter.clone());
        let action = Action::builder("agent-1", "Slack_API_PostMessage").build().unwrap();
        let request = OracleRequest::new(&[], &action).unwrap();

        let reply = oracle.consult(&request).await.unwrap();
        assert_eq!(reply, "{\"decision\":\"ALLOW\",\"rationale\":\"ok\"}");

        let seen = adapter.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.temperature(), Some(0.1));
        assert_eq!(seen.max_output_tokens(), Some(1000));
        assert!(seen.system_prompt().starts_with("You are the Ethical Reasoner"));
        assert_eq!(seen.user_prompt(), request.user_prompt());
    }
}
