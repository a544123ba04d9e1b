//! Note tools: save, list, search, view and send a user's notes.
//!
//! Every tool is bound to one user at construction; the model never gets
//! to pick whose notes it touches.

use async_trait::async_trait;
use filvyn_core::channel::Replier;
use filvyn_core::error::ToolError;
use filvyn_core::tool::{Tool, ToolOutput, ToolParams};
use filvyn_core::{Cid, Note, UserId};
use filvyn_store::{NoteStore, DEFAULT_SEARCH_LIMIT};
use serde::Serialize;
use std::sync::Arc;

pub const NOTE_NOT_FOUND: &str = "Note not found";

fn to_json<T: Serialize>(tool: &str, value: &T) -> Result<ToolOutput, ToolError> {
    serde_json::to_string(value)
        .map(ToolOutput::Text)
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason: format!("Failed to encode result: {e}"),
        })
}

/// Render a note the way it is shown to the user.
pub fn format_note(note: &Note) -> String {
    format!(
        "Title: {}\nTags: {}\nDate: {}\nContent:\n\n {}",
        note.title,
        note.tags.join(", "),
        note.created_at,
        note.content
    )
}

pub struct SaveNoteTool {
    user: UserId,
    store: Arc<NoteStore>,
}

impl SaveNoteTool {
    pub fn new(user: UserId, store: Arc<NoteStore>) -> Self {
        Self { user, store }
    }
}

#[async_trait]
impl Tool for SaveNoteTool {
    fn name(&self) -> &str {
        "saveNote"
    }

    fn description(&self) -> &str {
        "Save a new note with content strictly from user input (NEVER modify or fabricate user's content). \
         Title and tags can be intelligently generated based on the content. \
         Returns the metadata of the saved note. This operation may take a long time to process."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "content": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title", "content", "tags"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
        let title = params.require_text("title")?;
        let content = params.require_text("content")?;
        let note = Note::new(title, content, params.list("tags"));

        let saved = self
            .store
            .add_note(&self.user, note)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        to_json(self.name(), &saved)
    }
}

pub struct ListNotesTool {
    user: UserId,
    store: Arc<NoteStore>,
}

impl ListNotesTool {
    pub fn new(user: UserId, store: Arc<NoteStore>) -> Self {
        Self { user, store }
    }
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "listNotes"
    }

    fn description(&self) -> &str {
        "List all saved notes with their cids, titles, and tags. Always try to provide a tag to filter \
         notes efficiently. Listing all notes without a tag should be avoided to prevent information overload."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tag": { "type": "string" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
        let tag = params.text("tag").map(str::trim).filter(|t| !t.is_empty());
        let notes = self
            .store
            .list_notes(&self.user, tag)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        to_json(self.name(), &notes)
    }
}

pub struct SearchNotesTool {
    user: UserId,
    store: Arc<NoteStore>,
}

impl SearchNotesTool {
    pub fn new(user: UserId, store: Arc<NoteStore>) -> Self {
        Self { user, store }
    }
}

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "searchNotes"
    }

    fn description(&self) -> &str {
        "Search for notes based on semantic similarity to the query text. Returns notes ranked by relevance. \
         This operation may take some time to process."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
        let query = params.require_text("query")?;
        let notes = self
            .store
            .search_similar(&self.user, query, DEFAULT_SEARCH_LIMIT)
            .await;
        to_json(self.name(), &notes)
    }
}

pub struct ViewNoteTool {
    user: UserId,
    store: Arc<NoteStore>,
}

impl ViewNoteTool {
    pub fn new(user: UserId, store: Arc<NoteStore>) -> Self {
        Self { user, store }
    }
}

#[async_trait]
impl Tool for ViewNoteTool {
    fn name(&self) -> &str {
        "viewNote"
    }

    fn description(&self) -> &str {
        "View the complete content of a specific note by its cid. This operation may take some time to process."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cid": { "type": "string" }
            },
            "required": ["cid"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
        let cid = Cid::new(params.require_text("cid")?);
        match self.store.get_note(&self.user, &cid).await {
            Some(note) => to_json(self.name(), &note),
            None => Ok(ToolOutput::text(NOTE_NOT_FOUND)),
        }
    }
}

/// Sends a stored note straight to the user, bypassing the model.
pub struct SendNoteTool {
    user: UserId,
    store: Arc<NoteStore>,
    replier: Arc<dyn Replier>,
}

impl SendNoteTool {
    pub fn new(user: UserId, store: Arc<NoteStore>, replier: Arc<dyn Replier>) -> Self {
        Self { user, store, replier }
    }
}

#[async_trait]
impl Tool for SendNoteTool {
    fn name(&self) -> &str {
        "sendNote"
    }

    fn description(&self) -> &str {
        "Send a note to the user directly based on its cid."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cid": { "type": "string" }
            },
            "required": ["cid"]
        })
    }

    async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
        let cid = Cid::new(params.require_text("cid")?);
        let Some(note) = self.store.get_note(&self.user, &cid).await else {
            return Ok(ToolOutput::text(NOTE_NOT_FOUND));
        };

        self.replier
            .reply(&format_note(&note))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let meta = serde_json::to_string(&note.meta().with_cid(cid)).unwrap_or_default();
        Ok(ToolOutput::Text(format!("send note to user success: {meta}")))
    }
}
