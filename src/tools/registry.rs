//! Name → handler mapping used to answer tool calls.

use std::collections::HashMap;
use std::sync::Arc;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolCallContext};
use super::types::ToolDefinition;
use crate::error::VoxError;
use crate::transport::types::{ToolCall, ToolOutput};

/// Registered tools, looked up by exact function name.
///
/// Resolution never fails: unknown names, malformed arguments and handler
/// errors all become a textual `{"error": ..}` output so the run can move on.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Resolve one call to its output string.
    pub async fn resolve(
        &self,
        function_name: &str,
        arguments_json: &str,
        ctx: &ToolCallContext,
    ) -> String {
        let Some(tool) = self.tools.get(function_name) else {
            tracing::warn!(function = function_name, call_id = %ctx.call_id, "unknown tool call");
            return unknown_function_output(function_name);
        };

        match self.invoke(tool.as_ref(), arguments_json, ctx).await {
            Ok(value) => match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            },
            Err(err) => {
                let err = VoxError::ToolResolution {
                    tool_name: function_name.to_string(),
                    message: err.to_string(),
                };
                tracing::warn!(call_id = %ctx.call_id, error = %err, "tool call failed");
                error_output(&err.to_string())
            }
        }
    }

    /// Resolve every call of one `requires_action` round, preserving order.
    pub async fn resolve_all(
        &self,
        thread_id: &str,
        run_id: &str,
        calls: &[ToolCall],
    ) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let ctx = ToolCallContext {
                thread_id: thread_id.to_string(),
                run_id: run_id.to_string(),
                call_id: call.id.clone(),
            };
            let output = self
                .resolve(&call.function.name, &call.function.arguments, &ctx)
                .await;
            tracing::debug!(
                run_id,
                call_id = %call.id,
                function = %call.function.name,
                "tool call resolved"
            );
            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output,
            });
        }
        outputs
    }

    async fn invoke(
        &self,
        tool: &dyn Tool,
        arguments_json: &str,
        ctx: &ToolCallContext,
    ) -> Result<serde_json::Value, VoxError> {
        let args = ToolArguments::parse(arguments_json)?;
        tool.execute(&args, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

/// Output for a function name nobody registered.
pub fn unknown_function_output(function_name: &str) -> String {
    error_output(&format!("unknown function: {function_name}"))
}

fn error_output(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
