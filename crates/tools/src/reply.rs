//! Tools that talk to the user. The model's only voice is through these.

use async_trait::async_trait;
use filvyn_core::channel::Replier;
use filvyn_core::error::ToolError;
use filvyn_core::tool::{Tool, ToolOutput, ToolParams};
use std::sync::Arc;

fn delivery_failed(tool: &str, e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason: e.to_string(),
    }
}

pub struct ReplyUserTool {
    replier: Arc<dyn Replier>,
}

impl ReplyUserTool {
    pub fn new(replier: Arc<dyn Replier>) -> Self {
        Self { replier }
    }
}

#[async_trait]
impl Tool for ReplyUserTool {
    fn name(&self) -> &str {
        "replyUser"
    }

    fn description(&self) -> &str {
        "Reply to user with a clear and well-structured message in the same language they used. \
         Use bullet points for lists, backticks for code/commands, and keep the response concise and easy to read. \
         Always maintain consistency with the user's language choice throughout the conversation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
        let message = params.require_text("message")?;
        self.replier
            .reply(message)
            .await
            .map_err(|e| delivery_failed(self.name(), e))?;
        Ok(ToolOutput::text("reply user success"))
    }
}

/// Acknowledge a slow operation: a short message plus a typing indicator.
pub struct ReassureUserTool {
    replier: Arc<dyn Replier>,
}

impl ReassureUserTool {
    pub fn new(replier: Arc<dyn Replier>) -> Self {
        Self { replier }
    }
}

#[async_trait]
impl Tool for ReassureUserTool {
    fn name(&self) -> &str {
        "reassureUser"
    }

    fn description(&self) -> &str {
        "Reassure the user when operations might take a long time. Sends a message and shows a typing indicator \
         to let them know the agent is working on their request. It could be used to acknowledge the user's \
         intention or update the state of current task. Use this only when you are going to perform an operation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
        let message = params.require_text("message")?;
        self.replier
            .reply(message)
            .await
            .map_err(|e| delivery_failed(self.name(), e))?;
        if let Err(e) = self.replier.send_typing().await {
            tracing::debug!(error = %e, "Typing indicator not delivered");
        }
        Ok(ToolOutput::text("User reassured with message and typing indicator"))
    }
}
