//! Validated `tools/call` request.

use serde_json::{Map, Value};

use crate::error::McpError;

/// A tool invocation: a non-empty tool name and a JSON object of arguments.
///
/// Validation happens here, at construction, so a session never sends a
/// malformed `tools/call`. The arguments are not checked against the tool's
/// input schema; that is left to the caller or the remote server.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    tool_name: String,
    arguments: Map<String, Value>,
}

impl ToolCall {
    /// A call with no arguments (sent as `{}`).
    pub fn new(tool_name: impl Into<String>) -> Result<Self, McpError> {
        let tool_name = tool_name.into();
        if tool_name.trim().is_empty() {
            return Err(McpError::Configuration("tool name must not be empty".into()));
        }
        Ok(Self {
            tool_name,
            arguments: Map::new(),
        })
    }

    /// A call with arguments. `None` and JSON `null` mean no arguments; any
    /// other non-object value is rejected.
    pub fn with_arguments(
        tool_name: impl Into<String>,
        arguments: impl Into<Option<Value>>,
    ) -> Result<Self, McpError> {
        let mut call = Self::new(tool_name)?;
        match arguments.into() {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => call.arguments = map,
            Some(other) => {
                return Err(McpError::Configuration(format!(
                    "arguments for tool \"{}\" must be a JSON object, got {}",
                    call.tool_name,
                    json_type(&other)
                )));
            }
        }
        Ok(call)
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
