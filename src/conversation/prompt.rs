//! Linearizing turn history into backend requests, and pulling the reply
//! back out of what the backend returns.

use serde::Serialize;

use crate::events::{Speaker, Turn};

/// Marker that introduces an assistant line in transcript prompts.
pub const ASSISTANT_MARKER: &str = "Assistant:";

/// Stored in place of a reply that came back empty.
pub const EMPTY_REPLY: &str = "(no reply)";

/// How history is presented to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Plain "You: …" / "Assistant: …" lines ending with an open assistant line
    Transcript,
    /// Structured `{ message, history }` body
    RoleList,
}

/// One history entry on the remote wire format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// A request built fresh for every send
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceRequest {
    Transcript(String),
    Chat {
        message: String,
        history: Vec<HistoryEntry>,
    },
}

/// What a backend hands back
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    /// Echoed prompt followed by the completion
    Extended(String),
    /// The `reply` field of a structured response
    Reply(String),
}

/// Build a request from the turns preceding `content` plus `content` itself.
///
/// `content` appears exactly once: as the trailing `You:` line for
/// transcripts, as `message` for role lists (never inside `history`).
pub fn build_request(style: PromptStyle, prior: &[Turn], content: &str) -> InferenceRequest {
    match style {
        PromptStyle::Transcript => InferenceRequest::Transcript(transcript(prior, content)),
        PromptStyle::RoleList => InferenceRequest::Chat {
            message: content.to_string(),
            history: prior
                .iter()
                .map(|turn| HistoryEntry {
                    role: turn.speaker.wire_role().to_string(),
                    content: turn.text.clone(),
                })
                .collect(),
        },
    }
}

fn transcript(prior: &[Turn], content: &str) -> String {
    let history = prior
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker.transcript_label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n");

    let separator = if history.is_empty() { "" } else { "\n" };
    format!(
        "{}{}{}: {}\n{}",
        history,
        separator,
        Speaker::User.transcript_label(),
        content,
        ASSISTANT_MARKER
    )
}

/// Reduce backend output to the text of a single assistant turn.
pub fn extract_reply(output: &InferenceOutput) -> String {
    let reply = match output {
        InferenceOutput::Extended(text) => match text.rfind(ASSISTANT_MARKER) {
            Some(pos) => text[pos + ASSISTANT_MARKER.len()..].trim(),
            None => text.trim(),
        },
        InferenceOutput::Reply(text) => text.trim(),
    };

    if reply.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        reply.to_string()
    }
}
