//! Built-in tools for Filvyn.
//!
//! Tools are bound to a single user and a single reply channel: a fresh
//! registry is assembled for every incoming message.
//!
//! Available tools:
//! - `saveNote` / `listNotes` / `searchNotes` / `viewNote` / `sendNote`
//! - `replyUser` / `reassureUser`
//! - `complete` (always present, provided by the registry itself)

pub mod notes;
pub mod reply;

use filvyn_core::channel::Replier;
use filvyn_core::tool::ToolRegistry;
use filvyn_core::UserId;
use filvyn_store::NoteStore;
use std::sync::Arc;

pub use notes::{
    format_note, ListNotesTool, SaveNoteTool, SearchNotesTool, SendNoteTool, ViewNoteTool, NOTE_NOT_FOUND,
};
pub use reply::{ReassureUserTool, ReplyUserTool};

/// Create a registry with every note and reply tool for `user`.
pub fn note_registry(user: UserId, store: Arc<NoteStore>, replier: Arc<dyn Replier>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReassureUserTool::new(replier.clone())));
    registry.register(Box::new(ReplyUserTool::new(replier.clone())));
    registry.register(Box::new(SaveNoteTool::new(user.clone(), store.clone())));
    registry.register(Box::new(ListNotesTool::new(user.clone(), store.clone())));
    registry.register(Box::new(SearchNotesTool::new(user.clone(), store.clone())));
    registry.register(Box::new(ViewNoteTool::new(user.clone(), store.clone())));
    registry.register(Box::new(SendNoteTool::new(user, store, replier)));
    registry
}


#[cfg(test)]
mod tests {
    use super::*;
    use filvyn_core::tool::{ToolCall, ToolOutput, COMPLETE_TOOL_NAME};
    use test_support::{fixture, RecordingReplier};

    #[test]
    fn registry_has_every_tool() {
        let f = fixture();
        let registry = note_registry(UserId::new("u1"), f.store.clone(), Arc::new(RecordingReplier::default()));

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "reassureUser",
                "replyUser",
                "saveNote",
                "listNotes",
                "searchNotes",
                "viewNote",
                "sendNote",
                COMPLETE_TOOL_NAME
            ]
        );
    }

    #[tokio::test]
    async fn tools_are_scoped_to_their_user() {
        let f = fixture();
        let replier: Arc<dyn Replier> = Arc::new(RecordingReplier::default());
        let alice = note_registry(UserId::new("alice"), f.store.clone(), replier.clone());
        let bob = note_registry(UserId::new("bob"), f.store.clone(), replier);

        let saved = alice
            .execute(
                &ToolCall::new("saveNote")
                    .with_param("title", "Secret")
                    .with_param("content", "alice only")
                    .with_param("tags", "private"),
            )
            .await
            .unwrap();
        let ToolOutput::Text(saved) = saved else { panic!("expected text") };
        let saved: serde_json::Value = serde_json::from_str(&saved).unwrap();
        let cid = saved["cid"].as_str().unwrap();

        let out = bob.execute(&ToolCall::new("listNotes")).await.unwrap();
        assert_eq!(out, ToolOutput::text("[]"));
        let out = bob.execute(&ToolCall::new("viewNote").with_param("cid", cid)).await.unwrap();
        assert_eq!(out, ToolOutput::text(NOTE_NOT_FOUND));
        let out = alice.execute(&ToolCall::new("listNotes").with_param("tag", "private")).await.unwrap();
        let ToolOutput::Text(json) = out else { panic!("expected text") };
        assert!(json.contains("Secret"));
    }
}
