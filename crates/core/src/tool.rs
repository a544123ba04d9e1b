//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are the only channel through which the model acts: saving notes,
//! searching them, replying to the user. The registry is a dispatch table
//! keyed by name and always carries the synthetic `complete` tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use crate::error::ToolError;

/// Name of the tool the model calls to end a conversation turn.
pub const COMPLETE_TOOL_NAME: &str = "complete";

/// A tool invocation extracted from model output.
///
/// Parameters are raw text; interpretation against the tool's schema
/// happens at execution time, not at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Parameter name → raw value
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// A parameter value as seen by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    List(Vec<String>),
}

/// Parameters handed to [`Tool::execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolParams(HashMap<String, ParamValue>);

impl ToolParams {
    /// Interpret raw call parameters against a JSON-Schema parameter object.
    ///
    /// Comma-separated values become lists only for parameters declared
    /// `"type": "array"`; everything else stays text.
    pub fn from_raw(raw: &BTreeMap<String, String>, schema: &serde_json::Value) -> Self {
        let params = raw
            .iter()
            .map(|(name, value)| {
                let is_array = schema["properties"][name.as_str()]["type"] == "array";
                let value = if is_array {
                    ParamValue::List(split_list(value))
                } else {
                    ParamValue::Text(value.clone())
                };
                (name.clone(), value)
            })
            .collect();
        Self(params)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    /// A text parameter. List parameters are not returned as text.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParamValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// A required, non-empty text parameter.
    pub fn require_text(&self, name: &str) -> Result<&str, ToolError> {
        self.text(name)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{name}' argument")))
    }

    /// A list parameter; a text value is treated as a single-element list.
    pub fn list(&self, name: &str) -> Vec<String> {
        match self.0.get(name) {
            Some(ParamValue::List(items)) => dedup(items.iter().map(String::as_str)),
            Some(ParamValue::Text(s)) => split_list(s),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Comma-separated items, trimmed, without blanks or repeats.
fn split_list(value: &str) -> Vec<String> {
    dedup(value.split(',').map(str::trim))
}

/// Non-empty items in first-seen order.
fn dedup<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items.filter(|s| !s.is_empty()) {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// What a successful tool execution produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// Text fed back into the conversation
    Text(String),
    /// The completion sentinel: nothing more to do this turn
    Complete,
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// A tool definition, rendered into the system prompt catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Names listed under the schema's `required` key.
    pub fn required(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "saveNote").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for the prompt catalogue.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The synthetic tool whose result ends the turn.
struct CompleteTool;

#[async_trait]
impl Tool for CompleteTool {
    fn name(&self) -> &str {
        COMPLETE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Call this tool when you have completed the user's request and no further actions are needed"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _params: ToolParams) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Complete)
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Render tool definitions into the system prompt
/// 2. Look up and execute tools the model invoked
///
/// Lookups of unknown names yield `ToolError::NotFound`; the agent loop
/// treats that as a no-op rather than a failure.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a registry holding only the `complete` tool.
    pub fn new() -> Self {
        let mut registry = Self {
            tools: Vec::new(),
            index: HashMap::new(),
        };
        registry.insert(Box::new(CompleteTool));
        registry
    }

    fn insert(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Register a tool. Replaces any existing tool with the same name,
    /// except `complete`, which cannot be overridden.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if tool.name() == COMPLETE_TOOL_NAME {
            tracing::warn!("Ignoring attempt to override the '{COMPLETE_TOOL_NAME}' tool");
            return;
        }
        self.insert(tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// All tool definitions; registered tools first, `complete` last.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let (mut defs, complete): (Vec<_>, Vec<_>) = self
            .tools
            .iter()
            .map(|t| t.to_definition())
            .partition(|d| d.name != COMPLETE_TOOL_NAME);
        defs.extend(complete);
        defs
    }

    /// Execute a tool call, interpreting its params against the tool's schema.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let params = ToolParams::from_raw(&call.params, &tool.parameters_schema());
        tool.execute(params).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
            let text = params.require_text("text")?;
            let tags = params.list("tags");
            Ok(ToolOutput::text(format!("{text} [{}]", tags.join("|"))))
        }
    }

    #[test]
    fn registry_always_has_complete() {
        let registry = ToolRegistry::new();
        assert!(registry.get(COMPLETE_TOOL_NAME).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn complete_cannot_be_overridden() {
        struct FakeComplete;
        #[async_trait]
        impl Tool for FakeComplete {
            fn name(&self) -> &str { COMPLETE_TOOL_NAME }
            fn description(&self) -> &str { "impostor" }
            fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
            async fn execute(&self, _params: ToolParams) -> Result<ToolOutput, ToolError> {
                Ok(ToolOutput::text("not done"))
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FakeComplete));
        assert_ne!(registry.get(COMPLETE_TOOL_NAME).unwrap().description(), "impostor");
    }

    #[test]
    fn definitions_put_complete_last() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].required(), vec!["text"]);
        assert_eq!(defs[1].name, COMPLETE_TOOL_NAME);
        assert!(defs[1].required().is_empty());
    }

    #[tokio::test]
    async fn registry_execute_splits_array_params() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall::new("echo")
            .with_param("text", "a, b")
            .with_param("tags", "recipe, cooking ,");
        let result = registry.execute(&call).await.unwrap();
        // "text" is a string parameter, so its comma survives
        assert_eq!(result, ToolOutput::text("a, b [recipe|cooking]"));
    }

    #[tokio::test]
    async fn repeated_list_items_are_kept_once() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall::new("echo")
            .with_param("text", "x")
            .with_param("tags", "a, b, a ,b,c");
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result, ToolOutput::text("x [a|b|c]"));
    }

    #[tokio::test]
    async fn registry_execute_complete() {
        let registry = ToolRegistry::new();
        let result = registry.execute(&ToolCall::new(COMPLETE_TOOL_NAME)).await.unwrap();
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute(&ToolCall::new("nonexistent")).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_required_param_is_invalid_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let err = registry.execute(&ToolCall::new("echo")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
