// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use resume_fetch::{DEFAULT_LIST_TIMEOUT, DEFAULT_MESSAGE_TIMEOUT, Deadlines};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const CONFIG_PATH_ENV: &str = "CLAUDE_RESUME_CONFIG_PATH";
const DEFAULT_RESUME_COMMAND: &str = "claude";
const DEFAULT_LIST_TIMEOUT_TEXT: &str = "30s";
const DEFAULT_MESSAGE_TIMEOUT_TEXT: &str = "15s";
const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub resume: Resume,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            catalog: Catalog::default(),
            fetch: Fetch::default(),
            resume: Resume::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub projects_dir: Option<String>,
    pub project_limit: Option<i64>,
    pub session_limit: Option<i64>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            projects_dir: None,
            project_limit: Some(limit_value(resume_db::DEFAULT_PROJECT_LIMIT)),
            session_limit: Some(limit_value(resume_db::DEFAULT_SESSION_LIMIT)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fetch {
    pub list_timeout: Option<String>,
    pub message_timeout: Option<String>,
}

impl Default for Fetch {
    fn default() -> Self {
        Self {
            list_timeout: Some(DEFAULT_LIST_TIMEOUT_TEXT.to_owned()),
            message_timeout: Some(DEFAULT_MESSAGE_TIMEOUT_TEXT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resume {
    pub command: Option<String>,
}

impl Default for Resume {
    fn default() -> Self {
        Self {
            command: Some(DEFAULT_RESUME_COMMAND.to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(resume_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [catalog], [fetch], and [resume]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(projects_dir) = &self.catalog.projects_dir {
            resume_db::resolve_projects_dir(projects_dir).with_context(|| {
                format!("catalog.projects_dir in {} is invalid", path.display())
            })?;
        }

        for (name, limit) in [
            ("catalog.project_limit", self.catalog.project_limit),
            ("catalog.session_limit", self.catalog.session_limit),
        ] {
            if let Some(limit) = limit
                && limit <= 0
            {
                bail!(
                    "{name} in {} must be positive, got {limit}",
                    path.display()
                );
            }
        }

        for (name, timeout) in [
            ("fetch.list_timeout", &self.fetch.list_timeout),
            ("fetch.message_timeout", &self.fetch.message_timeout),
        ] {
            if let Some(timeout) = timeout {
                let parsed = parse_duration(timeout)?;
                if parsed <= Duration::ZERO {
                    bail!(
                        "{name} in {} must be positive, got {timeout}",
                        path.display()
                    );
                }
                if parsed > MAX_TIMEOUT {
                    bail!(
                        "{name} in {} must be at most 60m, got {timeout}",
                        path.display()
                    );
                }
            }
        }

        if let Some(command) = &self.resume.command
            && command.trim().is_empty()
        {
            bail!("resume.command in {} must not be empty", path.display());
        }

        Ok(())
    }

    pub fn projects_dir(&self) -> Result<PathBuf> {
        match &self.catalog.projects_dir {
            Some(raw) => resume_db::resolve_projects_dir(raw),
            None => resume_db::default_projects_dir(),
        }
    }

    pub fn project_limit(&self) -> usize {
        self.catalog
            .project_limit
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(resume_db::DEFAULT_PROJECT_LIMIT)
    }

    pub fn session_limit(&self) -> usize {
        self.catalog
            .session_limit
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(resume_db::DEFAULT_SESSION_LIMIT)
    }

    pub fn deadlines(&self) -> Result<Deadlines> {
        let list = match &self.fetch.list_timeout {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_LIST_TIMEOUT,
        };
        let messages = match &self.fetch.message_timeout {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_MESSAGE_TIMEOUT,
        };
        Ok(Deadlines { list, messages })
    }

    pub fn resume_command(&self) -> &str {
        self.resume
            .command
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_RESUME_COMMAND)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# claude-resume config\n# Place this file at: {}\n\nversion = 1\n\n[catalog]\n# Optional. Default is ~/.claude/projects (or ${})\n# projects_dir = \"~/.claude/projects\"\nproject_limit = {}\nsession_limit = {}\n\n[fetch]\nlist_timeout = \"{}\"\nmessage_timeout = \"{}\"\n\n[resume]\ncommand = \"{}\"\n",
            path.display(),
            resume_db::PROJECTS_DIR_ENV,
            resume_db::DEFAULT_PROJECT_LIMIT,
            resume_db::DEFAULT_SESSION_LIMIT,
            DEFAULT_LIST_TIMEOUT_TEXT,
            DEFAULT_MESSAGE_TIMEOUT_TEXT,
            DEFAULT_RESUME_COMMAND,
        )
    }
}

fn limit_value(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        let secs = mins
            .checked_mul(60)
            .ok_or_else(|| anyhow!("timeout duration {raw:?} is too large"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 15s)")
}

#[cfg(test)]
mod tests {
    use super::{CONFIG_PATH_ENV, Config, parse_duration};
    use anyhow::Result;
    use resume_fetch::Deadlines;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.project_limit(), 100);
        assert_eq!(config.session_limit(), 100);
        assert_eq!(config.resume_command(), "claude");
        assert_eq!(config.deadlines()?, Deadlines::default());
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[resume]\ncommand = \"claude\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[catalog], [fetch], and [resume]"));
        Ok(())
    }

    #[test]
    fn v1_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[catalog]\nprojects_dir = \"/srv/claude/projects\"\nproject_limit = 20\nsession_limit = 5\n[fetch]\nlist_timeout = \"2s\"\nmessage_timeout = \"500ms\"\n[resume]\ncommand = \"claude-beta\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.projects_dir()?, PathBuf::from("/srv/claude/projects"));
        assert_eq!(config.project_limit(), 20);
        assert_eq!(config.session_limit(), 5);
        assert_eq!(
            config.deadlines()?,
            Deadlines {
                list: Duration::from_secs(2),
                messages: Duration::from_millis(500),
            }
        );
        assert_eq!(config.resume_command(), "claude-beta");
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn projects_dir_prefers_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[catalog]\nprojects_dir = \"/from/config\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(resume_db::PROJECTS_DIR_ENV, "/from/env");
        }
        let config = Config::load(&path)?;
        let resolved = config.projects_dir();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(resume_db::PROJECTS_DIR_ENV);
        }
        assert_eq!(resolved?, PathBuf::from("/from/config"));
        Ok(())
    }

    #[test]
    fn projects_dir_uses_env_override_when_unset() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(resume_db::PROJECTS_DIR_ENV, "/from/env-only");
        }
        let config = Config::load(&path)?;
        let resolved = config.projects_dir();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(resume_db::PROJECTS_DIR_ENV);
        }
        assert_eq!(resolved?, PathBuf::from("/from/env-only"));
        Ok(())
    }

    #[test]
    fn uri_projects_dir_is_rejected() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[catalog]\nprojects_dir = \"https://example.com/logs\"\n")?;
        let error = Config::load(&path).expect_err("URI projects_dir should fail validation");
        assert!(format!("{error:#}").contains("catalog.projects_dir"));
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        let message = error.to_string();
        assert!(
            message.contains("invalid duration") || message.contains("invalid timeout duration"),
            "unexpected message: {message}"
        );
    }

    #[test]
    fn non_positive_values_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[fetch]\nlist_timeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("fetch.list_timeout"));

        let (_temp, path) = write_config("version = 1\n[catalog]\nsession_limit = 0\n")?;
        let error = Config::load(&path).expect_err("zero limit should fail");
        assert!(error.to_string().contains("must be positive"));

        let (_temp, path) = write_config("version = 1\n[resume]\ncommand = \"  \"\n")?;
        let error = Config::load(&path).expect_err("blank command should fail");
        assert!(error.to_string().contains("must not be empty"));
        Ok(())
    }

    #[test]
    fn oversized_timeouts_are_rejected() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[fetch]\nlist_timeout = \"18446744073709551615s\"\n",
        )?;
        let error = Config::load(&path).expect_err("huge timeout should fail");
        assert!(error.to_string().contains("must be at most 60m"));

        let (_temp, path) = write_config("version = 1\n[fetch]\nmessage_timeout = \"61m\"\n")?;
        let error = Config::load(&path).expect_err("61m timeout should fail");
        assert!(error.to_string().contains("fetch.message_timeout"));

        let (_temp, path) = write_config("version = 1\n[fetch]\nlist_timeout = \"60m\"\n")?;
        assert_eq!(Config::load(&path)?.deadlines()?.list, Duration::from_secs(3600));
        Ok(())
    }

    #[test]
    fn minute_overflow_is_a_parse_error() {
        let error = parse_duration("18446744073709551615m").expect_err("overflow should fail");
        assert!(error.to_string().contains("too large"));
    }

    #[test]
    fn example_config_round_trips() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        assert!(example.contains("[catalog]"));
        assert!(example.contains("[fetch]"));
        assert!(example.contains("[resume]"));

        std::fs::write(&path, example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.resume_command(), "claude");
        Ok(())
    }
}
