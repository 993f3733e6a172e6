// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod ingest;

pub use ingest::SyncStats;

use anyhow::{Context, Result, anyhow, bail};
use resume_app::{
    CancelToken, CatalogSource, MESSAGE_WINDOW, MessageBody, MessageContent, MessageRole,
    MessageWindow, Project, Session, SourceError, SourceResult, UNKNOWN_PROJECT, format_message,
    truncate,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const APP_NAME: &str = "claude-resume";
pub const DEFAULT_PROJECT_LIMIT: usize = 100;
pub const DEFAULT_SESSION_LIMIT: usize = 100;
pub const PROJECTS_DIR_ENV: &str = "CLAUDE_RESUME_PROJECTS_DIR";

const SUMMARY_CHARS: usize = 80;
const PROGRESS_OPS: i32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDebug {
    pub session_id: String,
    pub summary: Option<String>,
    pub user_messages: Vec<String>,
}

/// Session catalog mined from Claude's JSONL project logs. The logs are
/// mirrored into an in-memory SQLite database that is brought up to date
/// before every query. One connection, serialized by a mutex.
pub struct CatalogStore {
    conn: Mutex<Connection>,
    waiting: AtomicUsize,
    projects_dir: PathBuf,
    project_limit: usize,
    session_limit: usize,
}

impl CatalogStore {
    pub fn open(projects_dir: &Path) -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory catalog")?;
        conn.execute_batch(include_str!("sql/schema.sql"))
            .context("create catalog schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
            waiting: AtomicUsize::new(0),
            projects_dir: projects_dir.to_path_buf(),
            project_limit: DEFAULT_PROJECT_LIMIT,
            session_limit: DEFAULT_SESSION_LIMIT,
        })
    }

    pub fn with_limits(mut self, project_limit: usize, session_limit: usize) -> Self {
        self.project_limit = project_limit;
        self.session_limit = session_limit;
        self
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Reads whatever was appended to the logs since the last sync.
    pub fn sync(&self, token: &CancelToken) -> SourceResult<SyncStats> {
        let mut conn = self.lock();
        interruptible(&mut conn, token, |conn| self.sync_locked(conn, token))
    }

    fn sync_locked(&self, conn: &mut Connection, token: &CancelToken) -> SourceResult<SyncStats> {
        let tx = conn.transaction().context("begin log sync")?;
        let stats = ingest::sync_logs(&tx, &self.projects_dir, token)?;
        tx.commit().context("commit log sync")?;
        if stats.lines_ingested > 0 || stats.lines_skipped > 0 {
            tracing::debug!(
                files = stats.files_scanned,
                ingested = stats.lines_ingested,
                skipped = stats.lines_skipped,
                "synced session logs"
            );
        }
        Ok(stats)
    }

    pub fn list_projects(&self, token: &CancelToken) -> SourceResult<Vec<Project>> {
        let mut conn = self.lock();
        interruptible(&mut conn, token, |conn| {
            self.sync_locked(conn, token)?;
            let mut stmt = conn
                .prepare(
                    "
                    SELECT
                      CASE WHEN cwd IS NULL OR cwd = '' THEN ?1 ELSE cwd END AS project_path,
                      COUNT(DISTINCT session_id) AS session_count,
                      MAX(timestamp) AS last_activity
                    FROM events
                    WHERE session_id IS NOT NULL AND session_id <> ''
                    GROUP BY project_path
                    ORDER BY last_activity DESC, project_path ASC
                    LIMIT ?2
                    ",
                )
                .context("prepare projects query")?;
            let rows = stmt
                .query_map(
                    params![UNKNOWN_PROJECT, sql_limit(self.project_limit)],
                    |row| {
                        let path: String = row.get(0)?;
                        let session_count: i64 = row.get(1)?;
                        let last_activity: Option<String> = row.get(2)?;
                        Ok(Project {
                            name: Project::name_for_path(&path),
                            path,
                            session_count: usize::try_from(session_count).unwrap_or(0),
                            last_activity: parse_timestamp(last_activity.as_deref()),
                        })
                    },
                )
                .context("query projects")?;

            let mut projects = Vec::new();
            for row in rows {
                token.check()?;
                projects.push(row.context("read project row")?);
            }
            Ok(projects)
        })
    }

    pub fn list_sessions(
        &self,
        token: &CancelToken,
        project_path: &str,
    ) -> SourceResult<Vec<Session>> {
        let mut conn = self.lock();
        interruptible(&mut conn, token, |conn| {
            self.sync_locked(conn, token)?;
            let mut stmt = conn
                .prepare(
                    "
                    WITH session_events AS (
                      SELECT
                        session_id,
                        timestamp,
                        parent_uuid,
                        CASE WHEN cwd IS NULL OR cwd = '' THEN ?1 ELSE cwd END AS project_path,
                        ROW_NUMBER() OVER (
                          PARTITION BY session_id ORDER BY timestamp ASC, id ASC
                        ) AS seq
                      FROM events
                      WHERE session_id IS NOT NULL AND session_id <> ''
                    )
                    SELECT
                      session_id,
                      MAX(timestamp) AS last_activity,
                      MAX(CASE WHEN seq = 1 AND parent_uuid IS NOT NULL THEN 1 ELSE 0 END)
                    FROM session_events
                    WHERE project_path = ?2
                    GROUP BY session_id
                    ORDER BY last_activity DESC, session_id ASC
                    LIMIT ?3
                    ",
                )
                .context("prepare sessions query")?;
            let rows = stmt
                .query_map(
                    params![UNKNOWN_PROJECT, project_path, sql_limit(self.session_limit)],
                    |row| {
                        let last_activity: Option<String> = row.get(1)?;
                        let resumed: i64 = row.get(2)?;
                        Ok(Session {
                            session_id: row.get(0)?,
                            project_path: project_path.to_owned(),
                            last_activity: parse_timestamp(last_activity.as_deref()),
                            summary: None,
                            is_resumed: resumed != 0,
                        })
                    },
                )
                .context("query sessions")?;

            let mut sessions = Vec::new();
            for row in rows {
                token.check()?;
                sessions.push(row.context("read session row")?);
            }
            Ok(sessions)
        })
    }

    pub fn recent_messages(&self, token: &CancelToken, session_id: &str) -> SourceResult<Vec<String>> {
        let mut conn = self.lock();
        interruptible(&mut conn, token, |conn| {
            self.sync_locked(conn, token)?;
            let mut stmt = conn
                .prepare(
                    "
                    WITH all_messages AS (
                      SELECT
                        id,
                        event_type,
                        message_json,
                        timestamp,
                        ROW_NUMBER() OVER (ORDER BY timestamp ASC, id ASC) AS row_num_asc,
                        ROW_NUMBER() OVER (ORDER BY timestamp DESC, id DESC) AS row_num_desc,
                        COUNT(*) OVER () AS total_count
                      FROM events
                      WHERE session_id = ?1
                        AND event_type IN ('user', 'assistant')
                        AND message_json IS NOT NULL
                    )
                    SELECT event_type, message_json, row_num_asc <= ?2, total_count
                    FROM all_messages
                    WHERE row_num_asc <= ?2 OR row_num_desc <= ?2
                    ORDER BY timestamp ASC, id ASC
                    ",
                )
                .context("prepare messages query")?;
            let rows = stmt
                .query_map(params![session_id, sql_limit(MESSAGE_WINDOW)], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .context("query messages")?;

            let mut window = MessageWindow::default();
            for row in rows {
                token.check()?;
                let (event_type, message_json, in_head, total) =
                    row.context("read message row")?;
                window.total = usize::try_from(total).unwrap_or(0);
                let Some(line) = MessageBody::decode(&message_json)
                    .and_then(|body| format_message(&MessageRole::parse(&event_type), &body))
                else {
                    continue;
                };
                if in_head {
                    window.first.push(line);
                } else {
                    window.last.push(line);
                }
            }
            Ok(window.into_lines())
        })
    }

    /// Resolves what it can before the deadline; an expired deadline yields
    /// the summaries found so far.
    pub fn session_summaries(
        &self,
        token: &CancelToken,
        session_ids: &[String],
    ) -> SourceResult<BTreeMap<String, String>> {
        let mut summaries = BTreeMap::new();
        let outcome = self.collect_summaries(token, session_ids, &mut summaries);
        match outcome {
            Ok(()) => Ok(summaries),
            Err(SourceError::DeadlineExceeded) if !summaries.is_empty() => {
                tracing::debug!(
                    resolved = summaries.len(),
                    requested = session_ids.len(),
                    "summary deadline hit; returning partial results"
                );
                Ok(summaries)
            }
            Err(error) => Err(error),
        }
    }

    /// Takes the connection once per session so message fetches for a newly
    /// selected session can run between lookups.
    fn collect_summaries(
        &self,
        token: &CancelToken,
        session_ids: &[String],
        summaries: &mut BTreeMap<String, String>,
    ) -> SourceResult<()> {
        self.sync(token)?;
        for session_id in session_ids {
            token.check()?;
            while self.waiting.load(Ordering::SeqCst) > 0 {
                thread::yield_now();
            }
            let mut conn = self.lock();
            let summary = interruptible(&mut conn, token, |conn| {
                summary_for(conn, token, session_id)
            })?;
            drop(conn);
            if let Some(summary) = summary {
                summaries.insert(session_id.clone(), summary);
            }
        }
        Ok(())
    }

    pub fn debug_session(&self, session_id: &str) -> Result<SessionDebug> {
        let token = CancelToken::new();
        let mut conn = self.lock();
        self.sync_locked(&mut conn, &token)
            .context("sync session logs")?;
        let summary = summary_for(&conn, &token, session_id)
            .with_context(|| format!("resolve summary for {session_id}"))?;

        let mut stmt = conn
            .prepare(
                "
                SELECT message_json, timestamp
                FROM events
                WHERE session_id = ? AND event_type = 'user' AND message_json IS NOT NULL
                ORDER BY timestamp ASC, id ASC
                ",
            )
            .context("prepare debug session query")?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .context("query debug session")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read debug session rows")?;

        let mut user_messages = Vec::new();
        for (index, (message_json, timestamp)) in rows.iter().enumerate() {
            let number = index + 1;
            let at = timestamp.as_deref().unwrap_or("?");
            match MessageBody::decode(message_json) {
                Some(MessageBody::Plain(text)) => {
                    user_messages.push(format!("User Message {number} (string) at {at}:\n{text}"));
                }
                Some(MessageBody::Blocks(blocks)) => {
                    for block in blocks {
                        match block {
                            MessageContent::Text(text) => user_messages
                                .push(format!("User Message {number} (text) at {at}:\n{text}")),
                            MessageContent::ToolResult { .. } => user_messages.push(format!(
                                "User Message {number} (tool_result) at {at}: [Tool Result]"
                            )),
                            MessageContent::ToolCall { .. } => {}
                        }
                    }
                }
                None => {}
            }
        }
        if user_messages.is_empty() {
            user_messages.push(format!(
                "Found {} user events but no text messages",
                rows.len()
            ));
        }

        Ok(SessionDebug {
            session_id: session_id.to_owned(),
            summary,
            user_messages,
        })
    }

    /// Callers blocked here are counted so summary batches step aside for them.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        guard
    }
}

impl CatalogSource for CatalogStore {
    fn fetch_projects(&self, token: &CancelToken) -> SourceResult<Vec<Project>> {
        self.list_projects(token)
    }

    fn fetch_sessions(
        &self,
        token: &CancelToken,
        project_path: &str,
    ) -> SourceResult<Vec<Session>> {
        self.list_sessions(token, project_path)
    }

    fn fetch_messages(&self, token: &CancelToken, session_id: &str) -> SourceResult<Vec<String>> {
        self.recent_messages(token, session_id)
    }

    fn fetch_summaries(
        &self,
        token: &CancelToken,
        session_ids: &[String],
    ) -> SourceResult<BTreeMap<String, String>> {
        self.session_summaries(token, session_ids)
    }
}

/// Explicit `summary` records win; otherwise the first thing the user typed.
fn summary_for(
    conn: &Connection,
    token: &CancelToken,
    session_id: &str,
) -> SourceResult<Option<String>> {
    let recorded = conn
        .prepare_cached(
            "
            SELECT s.summary
            FROM events s
            JOIN events m ON m.uuid = s.leaf_uuid
            WHERE s.event_type = 'summary'
              AND s.summary IS NOT NULL AND s.summary <> ''
              AND m.session_id = ?
            ORDER BY s.id DESC
            LIMIT 1
            ",
        )
        .context("prepare summary query")?
        .query_row(params![session_id], |row| row.get::<_, String>(0))
        .optional()
        .with_context(|| format!("query summary for {session_id}"))?;
    if let Some(summary) = recorded {
        return Ok(Some(truncate(&summary, SUMMARY_CHARS)));
    }

    let mut stmt = conn
        .prepare_cached(
            "
            SELECT message_json
            FROM events
            WHERE session_id = ? AND event_type = 'user' AND message_json IS NOT NULL
            ORDER BY timestamp ASC, id ASC
            ",
        )
        .context("prepare first user message query")?;
    let rows = stmt
        .query_map(params![session_id], |row| row.get::<_, String>(0))
        .with_context(|| format!("query user messages for {session_id}"))?;
    for row in rows {
        token.check()?;
        let message_json = row.context("read user message row")?;
        if let Some(text) = MessageBody::decode(&message_json).and_then(|body| body.user_text()) {
            return Ok(Some(truncate(&text, SUMMARY_CHARS)));
        }
    }
    Ok(None)
}

/// Runs `op` with SQLite's progress handler watching `token`, so a long
/// statement aborts once the token is interrupted. SQLite's interrupt error is
/// reported as the token's reason.
fn interruptible<T>(
    conn: &mut Connection,
    token: &CancelToken,
    op: impl FnOnce(&mut Connection) -> SourceResult<T>,
) -> SourceResult<T> {
    let watched = token.clone();
    conn.progress_handler(PROGRESS_OPS, Some(move || watched.interrupt().is_some()));
    let result = op(conn);
    conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);

    result.map_err(|error| match (error, token.interrupt()) {
        (SourceError::Other(_), Some(interrupt)) => interrupt.into(),
        (error, _) => error,
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Unparseable or missing timestamps sort as "now".
fn parse_timestamp(raw: Option<&str>) -> OffsetDateTime {
    raw.and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
}

pub fn default_projects_dir() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os(PROJECTS_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        anyhow!("cannot resolve home directory; set {PROJECTS_DIR_ENV} to the Claude projects directory")
    })?;
    Ok(home.join(".claude").join("projects"))
}

/// Accepts absolute paths and `~/`-relative paths.
pub fn resolve_projects_dir(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("projects directory must not be empty");
    }
    if trimmed.contains("://") {
        bail!("projects directory {trimmed:?} looks like a URI; use a filesystem path");
    }
    if trimmed == "~" || trimmed.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow!("cannot expand {trimmed:?}; home directory is unknown"))?;
        let rest = trimmed.trim_start_matches('~').trim_start_matches('/');
        return Ok(if rest.is_empty() { home } else { home.join(rest) });
    }
    Ok(PathBuf::from(trimmed))
}
