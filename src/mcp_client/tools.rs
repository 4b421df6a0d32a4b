//! Tool set: the cached, invokable view of the provider's tools.
//!
//! Provides:
//! - Tool lookup by name
//! - Structural validation of call arguments against the advertised schema
//! - Invocation delegating to the session that advertised the tool
//! - Serialization into the OpenAI function-calling format

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::session::ToolSession;
use super::types::{ToolCallResult, ToolDefinition};
use crate::errors::BridgeError;

// ─── Tool ────────────────────────────────────────────────────────────────────

/// One tool: its definition plus the session able to invoke it.
#[derive(Clone)]
pub struct Tool {
    definition: ToolDefinition,
    session: Arc<dyn ToolSession>,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn input_schema(&self) -> &serde_json::Value {
        &self.definition.input_schema
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Basic structural check: arguments are an object carrying every
    /// `required` field. Full JSON Schema validation is left to the provider.
    pub fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), BridgeError> {
        let schema = &self.definition.input_schema;
        let args_obj = arguments.as_object();

        if args_obj.is_none() && !arguments.is_null() {
            return Err(BridgeError::InvalidArguments {
                tool: self.name().to_string(),
                reason: "arguments must be a JSON object".into(),
            });
        }

        let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
            return Ok(());
        };

        for field_name in required.iter().filter_map(|f| f.as_str()) {
            let has_field = args_obj
                .map(|obj| obj.contains_key(field_name))
                .unwrap_or(false);
            if !has_field {
                return Err(BridgeError::InvalidArguments {
                    tool: self.name().to_string(),
                    reason: format!("missing required field: '{field_name}'"),
                });
            }
        }

        Ok(())
    }

    /// Validate and invoke the tool.
    pub async fn call(&self, arguments: serde_json::Value) -> Result<ToolCallResult, BridgeError> {
        self.validate_arguments(&arguments)?;
        let arguments = if arguments.is_null() {
            serde_json::json!({})
        } else {
            arguments
        };

        let result = self.session.call_tool(self.name(), arguments).await?;
        tracing::debug!(
            tool = self.name(),
            success = result.success,
            elapsed_ms = result.execution_time_ms,
            "tool call completed"
        );
        Ok(result)
    }

    /// Serialize into the OpenAI function-calling format.
    pub fn to_openai_tool(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.definition.name,
                "description": self.definition.description,
                "parameters": self.definition.input_schema,
            }
        })
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

// ─── ToolSet ─────────────────────────────────────────────────────────────────

/// Immutable snapshot of the provider's tools, cheap to clone.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Arc<BTreeMap<String, Tool>>,
}

impl ToolSet {
    /// Build a snapshot from definitions advertised by `session`.
    ///
    /// Duplicate names keep the last definition.
    pub fn new(definitions: Vec<ToolDefinition>, session: Arc<dyn ToolSession>) -> Self {
        let mut tools = BTreeMap::new();
        for definition in definitions {
            let name = definition.name.clone();
            let tool = Tool {
                definition,
                session: Arc::clone(&session),
            };
            if tools.insert(name.clone(), tool).is_some() {
                tracing::warn!(tool = %name, "provider advertised duplicate tool name");
            }
        }
        Self {
            tools: Arc::new(tools),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tool)> {
        self.tools.iter().map(|(name, tool)| (name.as_str(), tool))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether both values are the same snapshot (not merely equal contents).
    pub fn same_snapshot(&self, other: &ToolSet) -> bool {
        Arc::ptr_eq(&self.tools, &other.tools)
    }

    /// Validate a call: tool exists and arguments pass the structural check.
    pub fn validate_tool_call(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), BridgeError> {
        self.get(tool_name)
            .ok_or_else(|| BridgeError::UnknownTool {
                name: tool_name.to_string(),
            })?
            .validate_arguments(arguments)
    }

    /// Look up and invoke a tool by name.
    pub async fn call(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, BridgeError> {
        let tool = self.get(tool_name).ok_or_else(|| BridgeError::UnknownTool {
            name: tool_name.to_string(),
        })?;
        tool.call(arguments).await
    }

    /// Serialize all tools into OpenAI function-calling format.
    ///
    /// Used to populate the `tools` field in chat completion requests.
    pub fn to_openai_tools(&self) -> Vec<serde_json::Value> {
        self.tools.values().map(Tool::to_openai_tool).collect()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
