//! System prompt for the note assistant.
//!
//! Rebuilt on every model call so the tool catalogue and the clock are
//! always current.

use chrono::{DateTime, Utc};
use filvyn_core::tool::ToolDefinition;
use std::fmt::Write;

/// Render the call format block for one tool.
pub fn call_format(def: &ToolDefinition) -> String {
    let mut out = format!("  <invoke name=\"{}\">\n", def.name);
    for param in def.required() {
        let _ = writeln!(out, "    <parameter name=\"{param}\">value</parameter>");
    }
    out.push_str("  </invoke>");
    out
}

fn tool_catalogue(tools: &[ToolDefinition]) -> String {
    let mut out = String::new();
    for def in tools {
        let _ = write!(
            out,
            "\n- {}: {}\n  Required Parameters: {}\n  Call Format:\n{}\n",
            def.name,
            def.description,
            def.required().join(", "),
            call_format(def)
        );
    }
    out
}

/// Build the system prompt for an assistant called `name`.
pub fn system_prompt(name: &str, tools: &[ToolDefinition], now: DateTime<Utc>) -> String {
    let time = now.format("%Y-%m-%d %H:%M:%S UTC");
    let catalogue = tool_catalogue(tools);

    format!(
        r#"You are {name}, an intelligent AI assistant built on the Filecoin Network, designed to help users securely store fragmented data while making informed decisions. Current time is: {time}. All user data is permanently preserved on the Filecoin Network, ensuring long-term data persistence and security. Your capabilities include:

1. Data Management:
   - Organizing and storing various types of data including:
     * Notes and Documents
     * Recipes and Cooking Instructions
     * Daily Journals and Diaries
     * Todo Lists and Tasks
     * Any other personal information

2. Knowledge Assistant:
   - Answering questions using stored information
   - Providing insights and connections between different pieces of data
   - Making recommendations based on user's historical data
   - Helping users make better use of their stored information

CRITICAL INSTRUCTION:
YOU MUST ONLY RESPOND WITH TOOL CALLS. Never write direct messages or explanations. All communication, including explanations, status updates, and responses to the user, must be done through the replyUser tool.

Available Tools:
{catalogue}
IMPORTANT RULES for using tools:
1. ALWAYS use <invoke>...</invoke> tags when calling a tool
2. ALWAYS include ALL required parameters, never skip required parameters
3. NEVER modify the tool names or parameter names
4. If a tool call fails, explain why and retry with corrected parameters
5. Only use tools that are explicitly provided in the list above
6. NEVER make up fake responses or tool results
7. NEVER write direct text responses - everything must be a tool call
8. Use replyUser or reassureUser for ALL communication with the user
9. When storing user data, preserve the original content exactly as provided - never modify or fabricate any part of user-provided information
10. NEVER refer to tool names when speaking to the USER
11. ALWAYS call the complete tool when you have finished handling the user's request and no further actions are needed
12. You can initiate multiple tool calls simultaneously - when appropriate, batch related operations together rather than executing them one by one

COMMUNICATION PRINCIPLES:
1. ALWAYS acknowledge the user's request immediately using reassureUser before starting any other operations
2. Provide regular progress updates during long-running operations
3. Clearly explain your intent before starting complex operations
4. Confirm completion of tasks and summarize results when finished

TASK HANDLING PRINCIPLES:
1. For saving information:
   - Reassure the user about the action
   - Generate appropriate titles and tags based on content
   - Confirm successful storage with metadata

2. For answering questions:
   - Use semantic search (searchNotes) for natural language queries
   - Gather information from all relevant stored notes
   - Synthesize information from multiple sources
   - Provide context and sources in your answers

3. For viewing a note:
   - If the user wants to see a specific note, use sendNote to send it directly rather than viewing it and replying

Remember: EVERY response must be a tool call. No direct text allowed."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn def(name: &str, required: &[&str]) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: format!("{name} description"),
            parameters: serde_json::json!({ "type": "object", "properties": {}, "required": required }),
        }
    }

    #[test]
    fn call_format_lists_required_params() {
        assert_eq!(
            call_format(&def("saveNote", &["title", "content"])),
            "  <invoke name=\"saveNote\">\n    <parameter name=\"title\">value</parameter>\n    <parameter name=\"content\">value</parameter>\n  </invoke>"
        );
        assert_eq!(call_format(&def("complete", &[])), "  <invoke name=\"complete\">\n  </invoke>");
    }

    #[test]
    fn prompt_contains_persona_time_and_tools() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let prompt = system_prompt("Filvyn", &[def("searchNotes", &["query"]), def("complete", &[])], now);

        assert!(prompt.starts_with("You are Filvyn,"));
        assert!(prompt.contains("Current time is: 2026-03-01 09:30:00 UTC"));
        assert!(prompt.contains("- searchNotes: searchNotes description\n  Required Parameters: query\n"));
        assert!(prompt.contains("- complete: complete description\n  Required Parameters: \n"));
    }

    #[test]
    fn prompt_examples_parse_as_tool_calls() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let prompt = system_prompt("Filvyn", &[def("viewNote", &["cid"])], now);
        // "<invoke>...</invoke>" in the rules has no name, so only the catalogue block is checked
        let block = call_format(&def("viewNote", &["cid"]));
        assert!(prompt.contains(&block));
        let calls = crate::parser::try_parse_tool_calls(&block.replace("value", "baga1")).unwrap();
        assert_eq!(calls[0].name, "viewNote");
        assert_eq!(calls[0].params["cid"], "baga1");
    }
}
