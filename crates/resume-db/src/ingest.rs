// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Incremental mirroring of append-only JSONL logs into the `events` table.
//! Each file remembers the byte offset just past its last complete line.

use anyhow::Context;
use resume_app::{CancelToken, SourceResult};
use rusqlite::{OptionalExtension, Transaction, params};
use serde::Deserialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub files_scanned: usize,
    pub lines_ingested: usize,
    pub lines_skipped: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    #[serde(rename = "type", default)]
    record_type: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_uuid: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    leaf_uuid: Option<String>,
}

pub(crate) fn sync_logs(
    tx: &Transaction<'_>,
    root: &Path,
    token: &CancelToken,
) -> SourceResult<SyncStats> {
    let mut stats = SyncStats::default();
    for path in log_files(root)? {
        token.check()?;
        stats.files_scanned += 1;
        ingest_file(tx, &path, token, &mut stats)?;
    }
    Ok(stats)
}

fn log_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !root.is_dir() {
        return Ok(found);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("read log directory {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("read entry in {}", dir.display()))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "jsonl") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn ingest_file(
    tx: &Transaction<'_>,
    path: &Path,
    token: &CancelToken,
    stats: &mut SyncStats,
) -> SourceResult<()> {
    let key = path.to_string_lossy().into_owned();
    let stored = tx
        .query_row(
            "SELECT byte_offset FROM log_files WHERE path = ?",
            params![key],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("read checkpoint for {key}"))?;

    let len = fs::metadata(path)
        .with_context(|| format!("stat log file {key}"))?
        .len();
    let mut offset = stored.map_or(0, |value| u64::try_from(value).unwrap_or(0));
    if offset > len {
        tracing::debug!(file = %key, offset, len, "log file shrank; re-reading");
        tx.execute("DELETE FROM events WHERE source_file = ?", params![key])
            .with_context(|| format!("drop stale events for {key}"))?;
        offset = 0;
    }
    if stored.is_some() && offset == len {
        return Ok(());
    }

    let mut file = File::open(path).with_context(|| format!("open log file {key}"))?;
    file.seek(SeekFrom::Start(offset))
        .with_context(|| format!("seek log file {key}"))?;
    let mut reader = BufReader::new(file);

    let mut insert = tx
        .prepare_cached(
            "
            INSERT INTO events (
              source_file, session_id, uuid, parent_uuid, cwd, event_type,
              timestamp, message_json, summary, leaf_uuid
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .context("prepare event insert")?;

    let mut line = Vec::new();
    loop {
        token.check()?;
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("read log file {key}"))?;
        // A trailing line without a newline is still being written.
        if read == 0 || line.last() != Some(&b'\n') {
            break;
        }
        offset += read as u64;

        let record = match serde_json::from_slice::<LogRecord>(&line) {
            Ok(record) => record,
            Err(error) => {
                if !line.trim_ascii().is_empty() {
                    tracing::debug!(file = %key, %error, "skipping malformed log line");
                    stats.lines_skipped += 1;
                }
                continue;
            }
        };

        insert
            .execute(params![
                key,
                record.session_id,
                record.uuid,
                record.parent_uuid,
                record.cwd,
                record.record_type,
                record.timestamp,
                record.message.map(|message| message.to_string()),
                record.summary,
                record.leaf_uuid,
            ])
            .with_context(|| format!("insert event from {key}"))?;
        stats.lines_ingested += 1;
    }

    tx.execute(
        "
        INSERT INTO log_files (path, byte_offset) VALUES (?1, ?2)
        ON CONFLICT(path) DO UPDATE SET byte_offset = excluded.byte_offset
        ",
        params![key, i64::try_from(offset).unwrap_or(i64::MAX)],
    )
    .with_context(|| format!("save checkpoint for {key}"))?;
    Ok(())
}
