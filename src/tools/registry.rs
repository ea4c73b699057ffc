//! Tool registry: role-gated dispatch of model tool calls to handlers

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::policy::{RoleRequirement, UserContext};
use crate::conversation::{ToolCall, ToolResult};
use crate::llm::ToolDefinition;
use crate::{Error, Result};

/// Message used when a tool failed in a way the user cannot act on
pub const GENERIC_FAILURE_MESSAGE: &str = "The request could not be completed right now.";

/// Successful tool payload: `{"success": true, ...fields}`
#[must_use]
pub fn success(fields: Value) -> Value {
    let mut payload = json!({ "success": true });
    if let (Some(out), Value::Object(fields)) = (payload.as_object_mut(), fields) {
        out.extend(fields);
    }
    payload
}

/// Failed tool payload: `{"success": false, "message": ...}`
pub fn failure(message: impl Into<String>) -> Value {
    json!({ "success": false, "message": message.into() })
}

/// Per-call information handlers may need
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub user: UserContext,
}

/// A tool the model may call
///
/// Handlers validate their own arguments and report expected business
/// conditions as `failure(..)` payloads. `Err` is reserved for unexpected
/// infrastructure failures.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and argument schema advertised to the model
    fn definition(&self) -> ToolDefinition;

    /// Roles allowed to call this tool
    fn requirement(&self) -> RoleRequirement;

    /// Run the tool
    ///
    /// # Errors
    ///
    /// Returns error on unexpected failures of the backing service
    async fn call(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value>;
}

/// Registered tools, in registration order
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler with the same name
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name;
        self.handlers.retain(|h| h.definition().name != name);
        self.handlers.push(handler);
    }

    #[must_use]
    pub fn with(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(handler);
        self
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.iter().find(|h| h.definition().name == name)
    }

    /// Names of all registered tools
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.definition().name).collect()
    }

    /// Definitions of the tools the given user may call
    #[must_use]
    pub fn definitions_for(&self, user: &UserContext) -> Vec<ToolDefinition> {
        self.handlers
            .iter()
            .filter(|h| h.requirement().permits(user.role))
            .map(|h| h.definition())
            .collect()
    }

    /// Execute one tool call
    ///
    /// Authorization failures are ordinary `{"success": false}` payloads and
    /// never reach the handler.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownTool` for unregistered names, or the handler's
    /// error for unexpected failures
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult> {
        let handler = self
            .find(&call.name)
            .ok_or_else(|| Error::UnknownTool(call.name.clone()))?;

        let requirement = handler.requirement();
        let payload = if requirement.permits(ctx.user.role) {
            tracing::debug!(tool = %call.name, call_id = %call.id, "executing tool");
            handler.call(ctx, &call.arguments).await?
        } else {
            tracing::info!(
                tool = %call.name,
                role = ?ctx.user.role,
                "tool call denied for session role"
            );
            failure(requirement.denial_message())
        };

        Ok(ToolResult {
            tool_call_id: call.id.clone(),
            payload,
        })
    }
}
