// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod scripted;

pub use scripted::{Call, Gate, ScriptedSource};

use anyhow::{Context, Result};
use resume_app::{Project, Session};
use serde_json::{Value, json};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use time::macros::datetime;

const TOOL_NAMES: [&str; 5] = ["Bash", "Read", "Edit", "Grep", "Write"];
const COMMANDS: [&str; 6] = [
    "cargo test --workspace",
    "git status",
    "ls -la",
    "rg TODO",
    "make lint",
    "npm run build",
];
const FILES: [&str; 6] = [
    "/repo/src/main.rs",
    "/repo/src/lib.rs",
    "/repo/Cargo.toml",
    "/repo/README.md",
    "/repo/tests/api.rs",
    "/repo/src/config.rs",
];
const ASKS: [&str; 8] = [
    "fix the failing test",
    "add a config flag for the timeout",
    "why does the build break on CI",
    "rename the session module",
    "write docs for the public API",
    "speed up the startup path",
    "clean up the error messages",
    "add logging around the sync loop",
];
const REPLIES: [&str; 6] = [
    "Looking at the code now",
    "The failure comes from a stale fixture",
    "Done, the tests pass",
    "I updated the module and its callers",
    "Here is a summary of the change",
    "That flag already exists under another name",
];

static NEXT_UUID: AtomicU64 = AtomicU64::new(1);

fn next_uuid() -> String {
    format!("evt-{:06}", NEXT_UUID.fetch_add(1, Ordering::Relaxed))
}

/// RFC 3339 timestamp `minutes` after the fixture epoch.
pub fn ts(minutes: u32) -> String {
    let hours = 10 + minutes / 60;
    format!(
        "2025-06-01T{:02}:{:02}:00.000Z",
        hours % 24,
        minutes % 60
    )
}

pub fn fixture_datetime(minutes: u32) -> OffsetDateTime {
    datetime!(2025-06-01 10:00 UTC) + time::Duration::minutes(i64::from(minutes))
}

/// Directory name Claude uses for a project's logs.
pub fn project_slug(cwd: &str) -> String {
    cwd.replace(['/', '.'], "-")
}

/// One JSONL log record.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub kind: String,
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub timestamp: Option<String>,
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub message: Option<Value>,
    pub summary: Option<String>,
    pub leaf_uuid: Option<String>,
}

impl LogEvent {
    fn message(kind: &str, session_id: &str, cwd: &str, timestamp: String, message: Value) -> Self {
        Self {
            kind: kind.to_owned(),
            session_id: Some(session_id.to_owned()),
            cwd: Some(cwd.to_owned()),
            timestamp: Some(timestamp),
            uuid: next_uuid(),
            parent_uuid: None,
            message: Some(message),
            summary: None,
            leaf_uuid: None,
        }
    }

    pub fn user(session_id: &str, cwd: &str, timestamp: String, text: &str) -> Self {
        Self::message(
            "user",
            session_id,
            cwd,
            timestamp,
            json!({ "role": "user", "content": text }),
        )
    }

    pub fn user_blocks(session_id: &str, cwd: &str, timestamp: String, content: Value) -> Self {
        Self::message(
            "user",
            session_id,
            cwd,
            timestamp,
            json!({ "role": "user", "content": content }),
        )
    }

    pub fn assistant(session_id: &str, cwd: &str, timestamp: String, content: Value) -> Self {
        Self::message(
            "assistant",
            session_id,
            cwd,
            timestamp,
            json!({ "role": "assistant", "content": content }),
        )
    }

    pub fn summary(leaf_uuid: &str, text: &str) -> Self {
        Self {
            kind: "summary".to_owned(),
            session_id: None,
            cwd: None,
            timestamp: None,
            uuid: next_uuid(),
            parent_uuid: None,
            message: None,
            summary: Some(text.to_owned()),
            leaf_uuid: Some(leaf_uuid.to_owned()),
        }
    }

    pub fn with_parent(mut self, parent_uuid: &str) -> Self {
        self.parent_uuid = Some(parent_uuid.to_owned());
        self
    }

    pub fn without_cwd(mut self) -> Self {
        self.cwd = None;
        self
    }

    pub fn to_line(&self) -> String {
        let mut record = serde_json::Map::new();
        record.insert("type".to_owned(), json!(self.kind));
        record.insert("uuid".to_owned(), json!(self.uuid));
        record.insert("parentUuid".to_owned(), json!(self.parent_uuid));
        let optional = [
            ("sessionId", &self.session_id),
            ("cwd", &self.cwd),
            ("timestamp", &self.timestamp),
            ("summary", &self.summary),
            ("leafUuid", &self.leaf_uuid),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                record.insert(key.to_owned(), json!(value));
            }
        }
        if let Some(message) = &self.message {
            record.insert("message".to_owned(), message.clone());
        }
        Value::Object(record).to_string()
    }
}

/// A throwaway `~/.claude/projects` lookalike.
pub struct LogDir {
    temp: tempfile::TempDir,
}

impl LogDir {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp log dir")?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Writes `events` to `<slug(cwd)>/<session_id>.jsonl`, replacing any
    /// existing file.
    pub fn write_session(&self, cwd: &str, session_id: &str, events: &[LogEvent]) -> Result<PathBuf> {
        let dir = self.path().join(project_slug(cwd));
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(format!("{session_id}.jsonl"));
        let mut body = String::new();
        for event in events {
            body.push_str(&event.to_line());
            body.push('\n');
        }
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn append_events(&self, path: &Path, events: &[LogEvent]) -> Result<()> {
        let mut raw = String::new();
        for event in events {
            raw.push_str(&event.to_line());
            raw.push('\n');
        }
        self.append_raw(path, &raw)
    }

    pub fn append_raw(&self, path: &Path, raw: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("open {} for append", path.display()))?;
        file.write_all(raw.as_bytes())
            .with_context(|| format!("append to {}", path.display()))
    }
}

pub fn sample_project(path: &str, session_count: usize, minutes: u32) -> Project {
    Project {
        name: Project::name_for_path(path),
        path: path.to_owned(),
        session_count,
        last_activity: fixture_datetime(minutes),
    }
}

pub fn sample_session(session_id: &str, project_path: &str, minutes: u32) -> Session {
    Session {
        session_id: session_id.to_owned(),
        project_path: project_path.to_owned(),
        last_activity: fixture_datetime(minutes),
        summary: None,
        is_resumed: false,
    }
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Generates plausible, reproducible conversations for a seed.
#[derive(Debug, Clone)]
pub struct ConversationFaker {
    rng: DeterministicRng,
}

impl ConversationFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    /// `turns` user/assistant pairs, one minute apart from `start_minute`.
    pub fn conversation(
        &mut self,
        session_id: &str,
        cwd: &str,
        start_minute: u32,
        turns: usize,
    ) -> Vec<LogEvent> {
        let mut events = Vec::with_capacity(turns * 2);
        let mut minute = start_minute;
        for _ in 0..turns {
            let ask = self.pick(&ASKS);
            events.push(LogEvent::user(session_id, cwd, ts(minute), ask));
            minute += 1;
            let reply = self.assistant_content();
            events.push(LogEvent::assistant(session_id, cwd, ts(minute), reply));
            minute += 1;
        }
        events
    }

    fn assistant_content(&mut self) -> Value {
        let reply = self.pick(&REPLIES);
        let tool = self.pick(&TOOL_NAMES);
        let input = match tool {
            "Bash" => json!({ "command": self.pick(&COMMANDS) }),
            "Grep" => json!({ "pattern": "fn main" }),
            _ => json!({ "file_path": self.pick(&FILES) }),
        };
        json!([
            { "type": "text", "text": reply },
            { "type": "tool_use", "name": tool, "input": input },
        ])
    }

    fn pick<'a>(&mut self, values: &[&'a str]) -> &'a str {
        values[self.rng.int_n(values.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationFaker, LogEvent, project_slug, ts};

    #[test]
    fn faker_is_deterministic_per_seed() {
        let first = ConversationFaker::new(7).conversation("s", "/p", 0, 3);
        let second = ConversationFaker::new(7).conversation("s", "/p", 0, 3);
        let first = first.iter().map(|e| e.message.clone()).collect::<Vec<_>>();
        let second = second.iter().map(|e| e.message.clone()).collect::<Vec<_>>();
        assert_eq!(first, second);
    }

    #[test]
    fn event_lines_use_camel_case_keys() {
        let line = LogEvent::user("abc", "/repo", ts(5), "hi")
            .with_parent("evt-x")
            .to_line();
        assert!(line.contains("\"sessionId\":\"abc\""));
        assert!(line.contains("\"parentUuid\":\"evt-x\""));
        assert!(line.contains("\"timestamp\":\"2025-06-01T10:05:00.000Z\""));
    }

    #[test]
    fn slug_flattens_separators() {
        assert_eq!(project_slug("/home/me/src/app.rs"), "-home-me-src-app-rs");
    }
}
