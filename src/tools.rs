//! Maps tool names to callable capabilities and bridges between the model's
//! structured arguments and each capability's input/output types.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::ToolError;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// Opaque key/value context passed through to tool execution.
pub type ToolContext = HashMap<String, Value>;

/// A callable capability bound to a tool name. Execution may have arbitrary
/// external effects; the registry does not sandbox them.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn call(&self, arguments: Value, context: &ToolContext) -> Result<Vec<Content>, ToolError>;
}

/// Wraps a plain function as a [`ToolExecutor`]: deserializes the model's
/// arguments into `I`, runs the function, and serializes its output to a
/// text content block.
pub struct FunctionTool<I, O, F> {
    name: String,
    function: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FunctionTool<I, O, F>
where
    I: DeserializeOwned + Send + Sync,
    O: Serialize + Send + Sync,
    F: Fn(I) -> anyhow::Result<O> + Send + Sync,
{
    pub fn new<S: Into<String>>(name: S, function: F) -> Self {
        Self {
            name: name.into(),
            function,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F> ToolExecutor for FunctionTool<I, O, F>
where
    I: DeserializeOwned + Send + Sync,
    O: Serialize + Send + Sync,
    F: Fn(I) -> anyhow::Result<O> + Send + Sync,
{
    async fn call(&self, arguments: Value, _context: &ToolContext) -> Result<Vec<Content>, ToolError> {
        let input: I =
            serde_json::from_value(arguments.clone()).map_err(|source| ToolError::InputMismatch {
                tool: self.name.clone(),
                input: arguments,
                expected: std::any::type_name::<I>(),
                source,
            })?;

        let output = (self.function)(input).map_err(|source| ToolError::ExecutionFailed {
            tool: self.name.clone(),
            source,
        })?;

        let text = serde_json::to_string(&output).map_err(|source| ToolError::ExecutionFailed {
            tool: self.name.clone(),
            source: source.into(),
        })?;
        Ok(vec![Content::text(text)])
    }
}

struct RegisteredTool {
    descriptor: Tool,
    executor: Arc<dyn ToolExecutor>,
}

/// The set of tools declared for a client, looked up by name at dispatch time.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its descriptor. Re-registering a name
    /// replaces the previous entry.
    pub fn register(&mut self, descriptor: Tool, executor: Arc<dyn ToolExecutor>) {
        self.tools.retain(|t| t.descriptor.name != descriptor.name);
        self.tools.push(RegisteredTool {
            descriptor,
            executor,
        });
    }

    /// The declared tool descriptors, in registration order
    pub fn descriptors(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve and execute a tool call, producing the content for the
    /// correlated tool-response block.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        context: &ToolContext,
    ) -> Result<Vec<Content>, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.descriptor.name == call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        tracing::debug!(tool = %call.name, "dispatching tool call");
        tool.executor.call(call.arguments.clone(), context).await
    }
}
