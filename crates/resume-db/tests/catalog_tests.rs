// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use resume_app::{CancelToken, CatalogSource, SourceError, UNKNOWN_PROJECT};
use resume_db::CatalogStore;
use resume_fetch::{Deadlines, FetchBridge, LoadedEvent};
use resume_testkit::{ConversationFaker, LogDir, LogEvent, fixture_datetime, ts};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const ALPHA: &str = "/work/alpha";
const BETA: &str = "/work/beta";

fn seeded_logs() -> Result<LogDir> {
    let logs = LogDir::new()?;
    logs.write_session(
        ALPHA,
        "a1",
        &[
            LogEvent::user("a1", ALPHA, ts(0), "set up the project"),
            LogEvent::assistant("a1", ALPHA, ts(1), json!([{"type": "text", "text": "ok"}])),
        ],
    )?;
    logs.write_session(
        ALPHA,
        "a2",
        &[
            LogEvent::user("a2", ALPHA, ts(20), "continue where we left off").with_parent("evt-old"),
            LogEvent::user("a2", ALPHA, ts(30), "now add tests"),
        ],
    )?;
    logs.write_session(
        BETA,
        "b1",
        &[LogEvent::user("b1", BETA, ts(50), "hello beta")],
    )?;
    logs.write_session(
        "orphans",
        "u1",
        &[LogEvent::user("u1", "", ts(5), "no cwd here").without_cwd()],
    )?;
    Ok(logs)
}

#[test]
fn projects_group_sessions_by_working_directory() -> Result<()> {
    let logs = seeded_logs()?;
    let store = CatalogStore::open(logs.path())?;

    let projects = store.fetch_projects(&CancelToken::new())?;
    let paths = projects.iter().map(|p| p.path.as_str()).collect::<Vec<_>>();
    assert_eq!(paths, vec![BETA, ALPHA, UNKNOWN_PROJECT]);

    let alpha = &projects[1];
    assert_eq!(alpha.name, "alpha");
    assert_eq!(alpha.session_count, 2);
    assert_eq!(alpha.last_activity, fixture_datetime(30));
    assert_eq!(projects[2].name, UNKNOWN_PROJECT);
    Ok(())
}

#[test]
fn project_limit_caps_results() -> Result<()> {
    let logs = seeded_logs()?;
    let store = CatalogStore::open(logs.path())?.with_limits(1, 100);
    let projects = store.fetch_projects(&CancelToken::new())?;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].path, BETA);
    Ok(())
}

#[test]
fn sessions_are_newest_first_and_flag_resumed_conversations() -> Result<()> {
    let logs = seeded_logs()?;
    let store = CatalogStore::open(logs.path())?;

    let sessions = store.fetch_sessions(&CancelToken::new(), ALPHA)?;
    let ids = sessions
        .iter()
        .map(|s| s.session_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["a2", "a1"]);
    assert!(sessions[0].is_resumed);
    assert!(!sessions[1].is_resumed);
    assert_eq!(sessions[0].project_path, ALPHA);
    assert!(sessions.iter().all(|s| s.summary.is_none()));

    let unknown = store.fetch_sessions(&CancelToken::new(), UNKNOWN_PROJECT)?;
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].session_id, "u1");
    Ok(())
}

#[test]
fn long_conversations_show_head_and_tail_with_marker() -> Result<()> {
    let logs = LogDir::new()?;
    let events = ConversationFaker::new(11).conversation("long", ALPHA, 0, 15);
    logs.write_session(ALPHA, "long", &events)?;
    let store = CatalogStore::open(logs.path())?;

    let lines = store.fetch_messages(&CancelToken::new(), "long")?;
    assert_eq!(lines.len(), 21);
    assert!(lines[0].starts_with("[User] "));
    assert!(lines[1].starts_with("[Assistant] "));
    assert!(lines[1].contains("🔧 "));
    assert_eq!(lines[10], "... (10 messages omitted) ...");
    assert!(lines[20].starts_with("[Assistant] "));
    Ok(())
}

#[test]
fn short_conversations_are_shown_whole() -> Result<()> {
    let logs = LogDir::new()?;
    let events = ConversationFaker::new(3).conversation("short", ALPHA, 0, 3);
    logs.write_session(ALPHA, "short", &events)?;
    let store = CatalogStore::open(logs.path())?;

    let lines = store.fetch_messages(&CancelToken::new(), "short")?;
    assert_eq!(lines.len(), 6);
    assert!(lines.iter().all(|line| !line.contains("omitted")));
    Ok(())
}

#[test]
fn sync_reads_only_complete_appended_lines() -> Result<()> {
    let logs = LogDir::new()?;
    let path = logs.write_session(
        ALPHA,
        "grow",
        &[LogEvent::user("grow", ALPHA, ts(0), "first")],
    )?;
    let store = CatalogStore::open(logs.path())?;
    let token = CancelToken::new();

    let stats = store.sync(&token)?;
    assert_eq!(stats.lines_ingested, 1);

    let next = LogEvent::user("grow", ALPHA, ts(1), "second").to_line();
    let (head, tail) = next.split_at(next.len() / 2);
    logs.append_raw(&path, head)?;
    assert_eq!(store.sync(&token)?.lines_ingested, 0);
    assert_eq!(store.fetch_messages(&token, "grow")?.len(), 1);

    logs.append_raw(&path, &format!("{tail}\nnot json at all\n"))?;
    let stats = store.sync(&token)?;
    assert_eq!(stats.lines_ingested, 1);
    assert_eq!(stats.lines_skipped, 1);
    assert_eq!(
        store.fetch_messages(&token, "grow")?,
        vec!["[User] first".to_owned(), "[User] second".to_owned()]
    );
    Ok(())
}

#[test]
fn rewritten_shorter_file_is_reingested() -> Result<()> {
    let logs = LogDir::new()?;
    logs.write_session(
        ALPHA,
        "redo",
        &[
            LogEvent::user("redo", ALPHA, ts(0), "one"),
            LogEvent::user("redo", ALPHA, ts(1), "two"),
        ],
    )?;
    let store = CatalogStore::open(logs.path())?;
    assert_eq!(store.fetch_messages(&CancelToken::new(), "redo")?.len(), 2);

    logs.write_session(
        ALPHA,
        "redo",
        &[LogEvent::user("redo", ALPHA, ts(2), "x")],
    )?;
    assert_eq!(
        store.fetch_messages(&CancelToken::new(), "redo")?,
        vec!["[User] x".to_owned()]
    );
    Ok(())
}

#[test]
fn summaries_prefer_summary_records_then_first_user_text() -> Result<()> {
    let logs = LogDir::new()?;
    let leaf = LogEvent::assistant("s1", ALPHA, ts(1), json!([{"type": "text", "text": "ok"}]));
    let leaf_uuid = leaf.uuid.clone();
    logs.write_session(
        ALPHA,
        "s1",
        &[
            LogEvent::user("s1", ALPHA, ts(0), "original ask"),
            leaf,
            LogEvent::summary(&leaf_uuid, "Refactor the widget loader"),
        ],
    )?;
    logs.write_session(
        ALPHA,
        "s2",
        &[
            LogEvent::user_blocks(
                "s2",
                ALPHA,
                ts(2),
                json!([{"type": "tool_result", "tool_use_id": "t", "content": "noise"}]),
            ),
            LogEvent::user("s2", ALPHA, ts(3), "please   fix\nthe parser"),
        ],
    )?;
    let store = CatalogStore::open(logs.path())?;

    let ids = vec!["s1".to_owned(), "s2".to_owned(), "missing".to_owned()];
    let summaries = store.fetch_summaries(&CancelToken::new(), &ids)?;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries["s1"], "Refactor the widget loader");
    assert_eq!(summaries["s2"], "please fix the parser");
    Ok(())
}

#[test]
fn cancelled_token_stops_queries() -> Result<()> {
    let logs = seeded_logs()?;
    let store = CatalogStore::open(logs.path())?;
    let token = CancelToken::new();
    token.cancel();

    let error = store
        .fetch_projects(&token)
        .expect_err("cancelled fetch should fail");
    assert!(matches!(error, SourceError::Cancelled), "got {error:?}");

    // The aborted sync must not have checkpointed anything.
    let projects = store.fetch_projects(&CancelToken::new())?;
    assert_eq!(projects.len(), 3);
    Ok(())
}

const BULK_SESSIONS: usize = 60_000;

/// One log file holding `count` single-message sessions.
fn bulk_sessions(logs: &LogDir, count: usize) -> Result<Vec<String>> {
    let ids = (0..count).map(|i| format!("bulk-{i}")).collect::<Vec<_>>();
    let events = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let minute = u32::try_from(i % 600).unwrap_or(0);
            LogEvent::user(id, ALPHA, ts(minute), &format!("ask number {i}"))
        })
        .collect::<Vec<_>>();
    logs.write_session(ALPHA, "bulk", &events)?;
    Ok(ids)
}

#[test]
fn cancelling_mid_ingest_commits_nothing() -> Result<()> {
    let logs = LogDir::new()?;
    bulk_sessions(&logs, BULK_SESSIONS)?;
    let store = CatalogStore::open(logs.path())?;

    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        })
    };
    let error = store.sync(&token).expect_err("sync should be cancelled mid-file");
    assert!(matches!(error, SourceError::Cancelled), "got {error:?}");
    let _ = canceller.join();

    // Neither the checkpoint nor the rows read before the cancel survived.
    let stats = store.sync(&CancelToken::new())?;
    assert_eq!(stats.lines_ingested, BULK_SESSIONS);
    assert_eq!(
        store.fetch_messages(&CancelToken::new(), "bulk-0")?,
        vec!["[User] ask number 0".to_owned()]
    );
    Ok(())
}

#[test]
fn summary_deadline_keeps_and_caches_what_resolved() -> Result<()> {
    let logs = LogDir::new()?;
    let ids = bulk_sessions(&logs, BULK_SESSIONS)?;
    let store = CatalogStore::open(logs.path())?;
    store.sync(&CancelToken::new())?;
    let deadlines = Deadlines {
        list: Duration::from_millis(200),
        messages: Duration::from_millis(200),
    };
    let mut bridge = FetchBridge::new(Arc::new(store), deadlines);

    let batch = bridge.load_summaries(ALPHA, &ids)?;
    assert!(batch.pending.is_some());
    let Some(LoadedEvent::SummariesLoaded { result, .. }) =
        bridge.wait_next(Duration::from_secs(10))
    else {
        bail!("expected a summary batch");
    };
    let resolved = result?;
    assert!(!resolved.is_empty());
    assert!(resolved.len() < ids.len(), "deadline should cut the batch short");
    for (session_id, summary) in &resolved {
        assert_eq!(bridge.cache().lookup_summary(session_id).as_ref(), Some(summary));
    }
    Ok(())
}

#[test]
fn message_fetch_interleaves_with_a_summary_batch() -> Result<()> {
    let logs = LogDir::new()?;
    let ids = bulk_sessions(&logs, BULK_SESSIONS)?;
    let store = Arc::new(CatalogStore::open(logs.path())?);
    store.sync(&CancelToken::new())?;

    let batch_token = CancelToken::new();
    let batch = {
        let store = Arc::clone(&store);
        let token = batch_token.clone();
        thread::spawn(move || store.session_summaries(&token, &ids))
    };
    thread::sleep(Duration::from_millis(20));

    let token = CancelToken::with_timeout(Duration::from_secs(5));
    let messages = store.fetch_messages(&token, "bulk-7")?;
    assert_eq!(messages, vec!["[User] ask number 7".to_owned()]);
    assert!(!batch.is_finished(), "messages should not wait for the whole batch");

    batch_token.cancel();
    let Ok(outcome) = batch.join() else {
        bail!("summary thread panicked");
    };
    assert!(matches!(outcome, Err(SourceError::Cancelled)), "got {outcome:?}");
    Ok(())
}

#[test]
fn expired_deadline_reports_deadline_exceeded() -> Result<()> {
    let logs = seeded_logs()?;
    let store = CatalogStore::open(logs.path())?;
    let token = CancelToken::with_deadline(Instant::now() - Duration::from_millis(1));

    let error = store
        .fetch_sessions(&token, ALPHA)
        .expect_err("expired fetch should fail");
    assert!(matches!(error, SourceError::DeadlineExceeded), "got {error:?}");
    Ok(())
}

#[test]
fn missing_projects_dir_is_an_empty_catalog() -> Result<()> {
    let logs = LogDir::new()?;
    let store = CatalogStore::open(&logs.path().join("does-not-exist"))?;
    assert!(store.fetch_projects(&CancelToken::new())?.is_empty());
    Ok(())
}

#[test]
fn debug_session_lists_user_messages() -> Result<()> {
    let logs = LogDir::new()?;
    logs.write_session(
        ALPHA,
        "dbg",
        &[
            LogEvent::user("dbg", ALPHA, ts(0), "plain ask"),
            LogEvent::user_blocks(
                "dbg",
                ALPHA,
                ts(1),
                json!([{"type": "tool_result", "tool_use_id": "t", "content": "out"}]),
            ),
        ],
    )?;
    let store = CatalogStore::open(logs.path())?;

    let debug = store.debug_session("dbg")?;
    assert_eq!(debug.summary.as_deref(), Some("plain ask"));
    assert_eq!(debug.user_messages.len(), 2);
    assert!(debug.user_messages[0].starts_with("User Message 1 (string) at "));
    assert!(debug.user_messages[1].ends_with("(tool_result) at 2025-06-01T10:01:00.000Z: [Tool Result]"));

    let empty = store.debug_session("nobody")?;
    assert_eq!(empty.user_messages, vec!["Found 0 user events but no text messages".to_owned()]);
    Ok(())
}
