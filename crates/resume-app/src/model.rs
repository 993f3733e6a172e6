// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;
use std::path::Path;
use time::OffsetDateTime;

/// Project path and name used for log lines that carry no working directory.
pub const UNKNOWN_PROJECT: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: String,
    pub session_count: usize,
    pub last_activity: OffsetDateTime,
}

impl Project {
    pub fn name_for_path(path: &str) -> String {
        if path.is_empty() || path == UNKNOWN_PROJECT {
            return UNKNOWN_PROJECT.to_owned();
        }
        Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub project_path: String,
    pub last_activity: OffsetDateTime,
    pub summary: Option<String>,
    pub is_resumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Projects,
    Sessions,
    Messages,
    Summaries,
}

impl FetchKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Sessions => "sessions",
            Self::Messages => "messages",
            Self::Summaries => "summaries",
        }
    }

    /// List-shaped queries get the longer deadline.
    pub const fn is_list(self) -> bool {
        !matches!(self, Self::Messages)
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to fetch. Carried unchanged from submission to the outcome so the
/// consumer can tell which view a late result belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchParams {
    Projects,
    Sessions {
        project_path: String,
    },
    Messages {
        session_id: String,
    },
    Summaries {
        project_path: String,
        session_ids: Vec<String>,
    },
}

impl FetchParams {
    pub const fn kind(&self) -> FetchKind {
        match self {
            Self::Projects => FetchKind::Projects,
            Self::Sessions { .. } => FetchKind::Sessions,
            Self::Messages { .. } => FetchKind::Messages,
            Self::Summaries { .. } => FetchKind::Summaries,
        }
    }
}
