// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_LEVEL_ENV: &str = "CLAUDE_RESUME_LOG_LEVEL";
const DEFAULT_LEVEL: &str = "warn";

/// Keeps the background log writer alive; dropping it flushes the file.
pub struct LogHandle {
    pub path: PathBuf,
    _guard: WorkerGuard,
}

/// Sends `tracing` output to a fresh file under the local data directory,
/// away from the terminal the TUI draws on.
pub fn init_logging() -> Result<LogHandle> {
    let log_dir = log_directory()?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;

    let path = log_file_path(&log_dir, OffsetDateTime::now_utc());
    let file =
        fs::File::create(&path).with_context(|| format!("create log file {}", path.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(build_log_filter(std::env::var(LOG_LEVEL_ENV).ok().as_deref()))
        .with(file_layer)
        .try_init()
        .context("install log subscriber")?;

    tracing::info!(path = %path.display(), "logging initialized");
    Ok(LogHandle {
        path,
        _guard: guard,
    })
}

fn build_log_filter(raw: Option<&str>) -> EnvFilter {
    let level = raw.and_then(normalize_log_level).unwrap_or(DEFAULT_LEVEL);
    EnvFilter::new(level)
}

fn normalize_log_level(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

pub fn log_directory() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("cannot resolve local data directory for logs"))?;
    Ok(data_dir.join(resume_db::APP_NAME).join("logs"))
}

fn log_file_path(log_dir: &Path, now: OffsetDateTime) -> PathBuf {
    let stamp = now
        .format(&format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    log_dir.join(format!("{}-{stamp}.log", resume_db::APP_NAME))
}
