use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declares a capability to the model: what it is called, when to use it,
/// and the shape of the arguments it takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Name the model refers to the tool by, unique within a request
    pub name: String,
    /// Description the model reads to decide whether to call the tool
    pub description: String,
    /// JSON Schema for the arguments
    pub input_schema: Value,
}

impl Tool {
    pub fn new<S: Into<String>, T: Into<String>>(
        name: S,
        description: T,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A model-issued request to invoke a named tool with structured arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}
