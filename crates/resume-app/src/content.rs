// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Decoding of logged message payloads into a small typed form, and the
//! one-line previews shown next to a session.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Messages kept from each end of a conversation preview.
pub const MESSAGE_WINDOW: usize = 10;

const TEXT_PREVIEW_CHARS: usize = 50;
const TOOL_RESULT_PREVIEW_CHARS: usize = 40;
const COMMAND_PREVIEW_CHARS: usize = 30;
const PATTERN_PREVIEW_CHARS: usize = 20;
const SYSTEM_REMINDER_MARKER: &str = "system-reminder";
const INTERRUPTED_MARKER: &str = "Request interrupted by user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    ToolCall {
        name: String,
        input_summary: Option<String>,
    },
    /// Tool output echoed back on the user side. `text` is set only when the
    /// output was a plain string.
    ToolResult {
        text: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Plain(String),
    Blocks(Vec<MessageContent>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    Other(String),
}

impl MessageRole {
    pub fn parse(value: &str) -> Self {
        match value {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn prefix(&self) -> String {
        match self {
            Self::User => "[User] ".to_owned(),
            Self::Assistant => "[Assistant] ".to_owned(),
            Self::Other(name) => format!("[{name}] "),
        }
    }
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<RawContent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Plain(String),
    Blocks(Vec<RawBlock>),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Option<Value>,
    },
    #[serde(other)]
    Other,
}

impl MessageBody {
    /// Decodes the `message` object of a log line. Returns `None` when the
    /// payload is not JSON or carries no `content`.
    pub fn decode(raw: &str) -> Option<Self> {
        let mut value: Value = serde_json::from_str(raw).ok()?;
        // Some writers store the message object as a JSON-encoded string.
        if let Value::String(inner) = &value {
            value = serde_json::from_str(inner).ok()?;
        }
        let message: RawMessage = serde_json::from_value(value).ok()?;

        match message.content? {
            RawContent::Plain(text) => Some(Self::Plain(text)),
            RawContent::Blocks(blocks) => Some(Self::Blocks(
                blocks.into_iter().filter_map(decode_block).collect(),
            )),
        }
    }

    /// Text a person typed, ignoring tool traffic and injected reminders.
    pub fn user_text(&self) -> Option<String> {
        match self {
            Self::Plain(text) => non_blank(text),
            Self::Blocks(blocks) => {
                if blocks
                    .iter()
                    .any(|block| matches!(block, MessageContent::ToolResult { .. }))
                {
                    return None;
                }
                let texts = blocks
                    .iter()
                    .filter_map(|block| match block {
                        MessageContent::Text(text)
                            if !text.contains(INTERRUPTED_MARKER)
                                && !text.contains(SYSTEM_REMINDER_MARKER) =>
                        {
                            Some(text.as_str())
                        }
                        _ => None,
                    })
                    .collect::<Vec<_>>();
                non_blank(&texts.join(" "))
            }
        }
    }
}

fn decode_block(block: RawBlock) -> Option<MessageContent> {
    match block {
        RawBlock::Text { text } if !text.is_empty() => Some(MessageContent::Text(text)),
        RawBlock::Text { .. } | RawBlock::Other => None,
        RawBlock::ToolUse { name, input } => Some(MessageContent::ToolCall {
            name: name.unwrap_or_else(|| "unknown".to_owned()),
            input_summary: input.as_ref().and_then(summarize_tool_input),
        }),
        RawBlock::ToolResult { content } => Some(MessageContent::ToolResult {
            text: match content {
                Some(Value::String(text)) => Some(text),
                _ => None,
            },
        }),
    }
}

fn summarize_tool_input(input: &Value) -> Option<String> {
    let fields = input.as_object()?;
    if let Some(command) = fields.get("command").and_then(Value::as_str) {
        return Some(truncate(command, COMMAND_PREVIEW_CHARS));
    }
    if let Some(path) = fields.get("file_path").and_then(Value::as_str) {
        let base = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());
        return Some(base);
    }
    if let Some(pattern) = fields.get("pattern").and_then(Value::as_str) {
        return Some(truncate(pattern, PATTERN_PREVIEW_CHARS));
    }
    let compact = serde_json::to_string(input).ok()?;
    Some(truncate(&compact, COMMAND_PREVIEW_CHARS))
}

/// One-line preview of a message, e.g. `[Assistant] 🔧 Bash: ls -la | done`.
/// Returns `None` when nothing displayable remains.
pub fn format_message(role: &MessageRole, body: &MessageBody) -> Option<String> {
    let rendered = match body {
        MessageBody::Plain(text) => truncate(text, TEXT_PREVIEW_CHARS),
        MessageBody::Blocks(blocks) => {
            let parts = blocks.iter().filter_map(format_block).collect::<Vec<_>>();
            if parts.is_empty() {
                return None;
            }
            parts.join(" | ")
        }
    };
    Some(format!("{}{rendered}", role.prefix()))
}

fn format_block(block: &MessageContent) -> Option<String> {
    match block {
        MessageContent::Text(text) if text.contains(SYSTEM_REMINDER_MARKER) => None,
        MessageContent::Text(text) => Some(truncate(text, TEXT_PREVIEW_CHARS)),
        MessageContent::ToolCall {
            name,
            input_summary: Some(summary),
        } if !summary.is_empty() => Some(format!("🔧 {name}: {summary}")),
        MessageContent::ToolCall { name, .. } => Some(format!("🔧 {name}")),
        MessageContent::ToolResult { text: Some(text) } => Some(format!(
            "↩ {}",
            truncate(text, TOOL_RESULT_PREVIEW_CHARS)
        )),
        MessageContent::ToolResult { text: None } => None,
    }
}

/// Collapses whitespace runs to single spaces, then cuts to `max_chars`
/// characters and appends `...` when anything was cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut = collapsed.chars().take(max_chars).collect::<String>();
    cut.push_str("...");
    cut
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// The head and tail of a conversation, with the size of the whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageWindow {
    pub first: Vec<String>,
    pub last: Vec<String>,
    pub total: usize,
}

impl MessageWindow {
    pub fn omitted(&self) -> usize {
        self.total.saturating_sub(MESSAGE_WINDOW * 2)
    }

    pub fn into_lines(self) -> Vec<String> {
        let omitted = self.omitted();
        let mut lines = self.first;
        if omitted > 0 {
            lines.push(format!("... ({omitted} messages omitted) ..."));
        }
        lines.extend(self.last);
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::{
        MessageBody, MessageContent, MessageRole, MessageWindow, format_message, truncate,
    };

    fn preview(role: &str, raw: &str) -> Option<String> {
        let body = MessageBody::decode(raw)?;
        format_message(&MessageRole::parse(role), &body)
    }

    #[test]
    fn plain_content_is_prefixed_and_truncated() {
        let long = "a".repeat(80);
        let raw = format!(r#"{{"role":"user","content":"{long}"}}"#);
        let rendered = preview("user", &raw).expect("plain content renders");
        assert_eq!(rendered, format!("[User] {}...", "a".repeat(50)));
    }

    #[test]
    fn tool_calls_summarize_their_input() {
        let raw = r#"{"content":[
            {"type":"text","text":"Let me look"},
            {"type":"tool_use","name":"Bash","input":{"command":"ls   -la\n/tmp"}},
            {"type":"tool_use","name":"Read","input":{"file_path":"/repo/src/main.rs"}},
            {"type":"tool_use","name":"Grep","input":{"pattern":"fn main"}},
            {"type":"tool_use","name":"Task","input":{"limit":3}},
            {"type":"tool_use","name":"Noop"}
        ]}"#;
        let rendered = preview("assistant", raw).expect("blocks render");
        assert_eq!(
            rendered,
            "[Assistant] Let me look | 🔧 Bash: ls -la /tmp | 🔧 Read: main.rs | 🔧 Grep: fn main | 🔧 Task: {\"limit\":3} | 🔧 Noop"
        );
    }

    #[test]
    fn reminders_and_non_text_results_are_skipped() {
        let raw = r#"{"content":[
            {"type":"text","text":"<system-reminder>ignore</system-reminder>"},
            {"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"x"}]}
        ]}"#;
        assert_eq!(preview("user", raw), None);

        let raw = r#"{"content":[{"type":"tool_result","content":"file written"}]}"#;
        assert_eq!(
            preview("user", raw).as_deref(),
            Some("[User] ↩ file written")
        );
    }

    #[test]
    fn unknown_roles_use_their_type_name() {
        let raw = r#"{"content":"compacted"}"#;
        assert_eq!(preview("system", raw).as_deref(), Some("[system] compacted"));
    }

    #[test]
    fn double_encoded_messages_decode() {
        let raw = r#""{\"content\":\"hello\"}""#;
        assert_eq!(
            MessageBody::decode(raw),
            Some(MessageBody::Plain("hello".to_owned()))
        );
    }

    #[test]
    fn malformed_payloads_decode_to_none() {
        assert_eq!(MessageBody::decode("not json"), None);
        assert_eq!(MessageBody::decode(r#"{"role":"user"}"#), None);
    }

    #[test]
    fn user_text_ignores_tool_results_and_interruptions() {
        let typed = MessageBody::Blocks(vec![
            MessageContent::Text("fix the build".to_owned()),
            MessageContent::Text("[Request interrupted by user]".to_owned()),
        ]);
        assert_eq!(typed.user_text().as_deref(), Some("fix the build"));

        let tool = MessageBody::Blocks(vec![MessageContent::ToolResult {
            text: Some("ok".to_owned()),
        }]);
        assert_eq!(tool.user_text(), None);
        assert_eq!(MessageBody::Plain("   ".to_owned()).user_text(), None);
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate(" a\n\tb  ", 10), "a b");
    }

    #[test]
    fn window_marks_omitted_middle() {
        let window = MessageWindow {
            first: vec!["a".to_owned()],
            last: vec!["z".to_owned()],
            total: 25,
        };
        assert_eq!(
            window.into_lines(),
            vec![
                "a".to_owned(),
                "... (5 messages omitted) ...".to_owned(),
                "z".to_owned()
            ]
        );

        let small = MessageWindow {
            first: vec!["a".to_owned(), "b".to_owned()],
            last: Vec::new(),
            total: 2,
        };
        assert_eq!(small.into_lines(), vec!["a".to_owned(), "b".to_owned()]);
    }
}
