//! Agent actions intercepted before they reach a tool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

const MAX_SOURCE_AGENT_CHARS: usize = 200;
const MAX_TARGET_TOOL_CHARS: usize = 100;

/// An action an autonomous agent is about to perform against a tool.
///
/// Created at the system boundary and immutable through the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Action {
    action_id: String,
    source_agent: String,
    target_tool: String,
    tool_arguments: Map<String, Value>,
    user_context: Option<Map<String, Value>>,
    timestamp: DateTime<Utc>,
}

impl Action {
    /// Starts building an action issued by `source_agent` against `target_tool`.
    #[must_use]
    pub fn builder(
        source_agent: impl Into<String>,
        target_tool: impl Into<String>,
    ) -> ActionBuilder {
        ActionBuilder {
            action_id: None,
            source_agent: source_agent.into(),
            target_tool: target_tool.into(),
            tool_arguments: Map::new(),
            user_context: None,
            timestamp: None,
        }
    }

    /// Returns the action identifier.
    #[must_use]
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    /// Returns the agent that issued the action.
    #[must_use]
    pub fn source_agent(&self) -> &str {
        &self.source_agent
    }

    /// Returns the tool the action targets.
    #[must_use]
    pub fn target_tool(&self) -> &str {
        &self.target_tool
    }

    /// Returns the tool arguments.
    #[must_use]
    pub fn tool_arguments(&self) -> &Map<String, Value> {
        &self.tool_arguments
    }

    /// Returns the optional user context.
    #[must_use]
    pub fn user_context(&self) -> Option<&Map<String, Value>> {
        self.user_context.as_ref()
    }

    /// Returns when the action was intercepted.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Builder for [`Action`].
#[derive(Debug)]
pub struct ActionBuilder {
    action_id: Option<String>,
    source_agent: String,
    target_tool: String,
    tool_arguments: Map<String, Value>,
    user_context: Option<Map<String, Value>>,
    timestamp: Option<DateTime<Utc>>,
}

impl ActionBuilder {
    /// Uses an explicit action identifier instead of a generated one.
    #[must_use]
    pub fn action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    /// Replaces the tool arguments.
    #[must_use]
    pub fn tool_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.tool_arguments = arguments;
        self
    }

    /// Adds a single tool argument.
    #[must_use]
    pub fn argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tool_arguments.insert(key.into(), value.into());
        self
    }

    /// Attaches user context.
    #[must_use]
    pub fn user_context(mut self, context: Map<String, Value>) -> Self {
        self.user_context = Some(context);
        self
    }

    /// Overrides the interception timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validates and builds the action. A missing identifier is generated and a
    /// missing timestamp defaults to now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAction`] when the source agent or target tool is
    /// empty or too long, or when an explicit action identifier is blank.
    pub fn build(self) -> Result<Action> {
        check_field("source_agent", &self.source_agent, MAX_SOURCE_AGENT_CHARS)?;
        check_field("target_tool", &self.target_tool, MAX_TARGET_TOOL_CHARS)?;

        let action_id = match self.action_id {
            Some(id) if id.trim().is_empty() => {
                return Err(Error::invalid_action("action_id cannot be blank"));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        Ok(Action {
            action_id,
            source_agent: self.source_agent,
            target_tool: self.target_tool,
            tool_arguments: self.tool_arguments,
            user_context: self.user_context,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

fn check_field(name: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_action(format!("{name} cannot be empty")));
    }
    if value.chars().count() > max {
        return Err(Error::invalid_action(format!(
            "{name} must be at most {max} characters"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct ActionSpec {
    #[serde(default)]
    action_id: Option<String>,
    source_agent: String,
    target_tool: String,
    #[serde(default)]
    tool_arguments: Map<String, Value>,
    #[serde(default)]
    user_context: Option<Map<String, Value>>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let spec = ActionSpec::deserialize(deserializer)?;
        from_spec(spec).map_err(serde::de::Error::custom)
    }
}

fn from_spec(spec: ActionSpec) -> Result<Action> {
    let mut builder =
        Action::builder(spec.source_agent, spec.target_tool).tool_arguments(spec.tool_arguments);
    if let Some(id) = spec.action_id {
        builder = builder.action_id(id);
    }
    if let Some(context) = spec.user_context {
        builder = builder.user_context(context);
    }
    if let Some(timestamp) = spec.timestamp {
        builder = builder.timestamp(timestamp);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_generates_id_and_timestamp() {
        let action = Action::builder("agent-b", "Slack_API_PostMessage")
            .argument("channel", "#general")
            .build()
            .unwrap();

        assert!(Uuid::parse_str(action.action_id()).is_ok());
        assert_eq!(action.tool_arguments()["channel"], json!("#general"));
        assert!(action.user_context().is_none());
    }

    #[test]
    fn builder_rejects_empty_tool_and_long_agent() {
        let err = Action::builder("agent", "  ").build().unwrap_err();
        assert!(matches!(err, Error::InvalidAction { .. }));

        let err = Action::builder("a".repeat(201), "tool").build().unwrap_err();
        assert!(matches!(err, Error::InvalidAction { .. }));
    }

    #[test]
    fn deserializes_boundary_payload() {
        let action: Action = serde_json::from_value(json!({
            "action_id": "act-1",
            "source_agent": "sentinel",
            "target_tool": "Gmail_Send",
            "tool_arguments": {"to": "ceo@example.com"},
            "user_context": {"role": "intern"}
        }))
        .unwrap();

        assert_eq!(action.action_id(), "act-1");
        assert_eq!(action.user_context().unwrap()["role"], json!("intern"));
    }
}
