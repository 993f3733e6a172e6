// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use resume_app::{CancelToken, Project, Session, truncate};
use resume_db::{CatalogStore, SessionDebug};
use resume_fetch::Deadlines;
use std::io::Write;
use time::OffsetDateTime;
use time::macros::format_description;

const PREVIEW_MESSAGES: usize = 5;
const PREVIEW_CHARS: usize = 50;
const SAMPLE_SESSIONS: usize = 3;
const AVAILABLE_SESSIONS: usize = 10;

/// Non-interactive listings over the catalog, written to `out`.
pub struct Listing<'a> {
    store: &'a CatalogStore,
    deadlines: Deadlines,
}

impl<'a> Listing<'a> {
    pub fn new(store: &'a CatalogStore, deadlines: Deadlines) -> Self {
        Self { store, deadlines }
    }

    pub fn show(
        &self,
        out: &mut impl Write,
        project: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<()> {
        match (project, session_id) {
            (None, _) => self.write_projects(out),
            (Some(project), None) => self.write_sessions(out, project),
            (Some(project), Some(session_id)) => self.write_messages(out, project, session_id),
        }
    }

    pub fn write_projects(&self, out: &mut impl Write) -> Result<()> {
        let projects = self.projects()?;
        if projects.is_empty() {
            writeln!(out, "No projects found")?;
            return Ok(());
        }

        writeln!(out, "Projects:")?;
        writeln!(out, "=========")?;
        for (index, project) in projects.iter().enumerate() {
            writeln!(out, "{}. {}", index + 1, project.name)?;
            write_project_details(out, project)?;
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn write_sessions(&self, out: &mut impl Write, project_name: &str) -> Result<()> {
        let project = self.find_project(project_name)?;
        let sessions = self.sessions(&project)?;
        if sessions.is_empty() {
            writeln!(out, "No sessions found for project '{project_name}'")?;
            return Ok(());
        }

        writeln!(out, "Sessions for project '{}':", project.name)?;
        writeln!(out, "Path: {}", project.path)?;
        writeln!(out, "===================================")?;
        for (index, session) in sessions.iter().enumerate() {
            writeln!(out, "{}. Session ID: {}", index + 1, session.session_id)?;
            writeln!(
                out,
                "   Last Activity: {}",
                format_timestamp(session.last_activity)
            )?;

            match self.messages(&session.session_id) {
                Ok(messages) if !messages.is_empty() => {
                    writeln!(out, "   Recent Messages:")?;
                    for (number, message) in messages.iter().take(PREVIEW_MESSAGES).enumerate() {
                        writeln!(
                            out,
                            "     {}. {}",
                            number + 1,
                            truncate(message, PREVIEW_CHARS)
                        )?;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(session_id = %session.session_id, "skipping message preview: {error:#}");
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn write_messages(
        &self,
        out: &mut impl Write,
        project_name: &str,
        session_id: &str,
    ) -> Result<()> {
        let project = self.find_project(project_name)?;
        let sessions = self.sessions(&project)?;
        if !sessions
            .iter()
            .any(|session| session.session_id == session_id)
        {
            writeln!(
                out,
                "Session '{session_id}' not found in project '{project_name}'"
            )?;
            writeln!(out, "\nAvailable sessions in this project:")?;
            for session in sessions.iter().take(AVAILABLE_SESSIONS) {
                writeln!(
                    out,
                    "  - {} (Last activity: {})",
                    session.session_id,
                    format_timestamp(session.last_activity)
                )?;
            }
            if sessions.len() > AVAILABLE_SESSIONS {
                writeln!(
                    out,
                    "... and {} more sessions",
                    sessions.len() - AVAILABLE_SESSIONS
                )?;
            }
            return Ok(());
        }

        let messages = self.messages(session_id)?;
        if messages.is_empty() {
            writeln!(
                out,
                "No messages found for session '{session_id}' in project '{project_name}'"
            )?;
            writeln!(
                out,
                "\nThis might mean the session has no user messages or the messages couldn't be parsed."
            )?;
            return Ok(());
        }

        writeln!(
            out,
            "Recent messages for session '{session_id}' in project '{}':",
            project.name
        )?;
        writeln!(out, "================================================")?;
        for (index, message) in messages.iter().enumerate() {
            if index >= PREVIEW_MESSAGES {
                writeln!(out, "\n(showing first {PREVIEW_MESSAGES} messages only)")?;
                break;
            }
            writeln!(out, "\n{}. {message}", index + 1)?;
        }
        Ok(())
    }

    /// Every project, plus a few sessions of the most recent one.
    pub fn write_debug_overview(&self, out: &mut impl Write) -> Result<()> {
        let projects = self.projects()?;
        if projects.is_empty() {
            writeln!(out, "No projects found")?;
            return Ok(());
        }

        writeln!(out, "=== Debug Mode: Projects and Sessions ===")?;
        for (index, project) in projects.iter().enumerate() {
            writeln!(out, "\n{}. Project: {}", index + 1, project.name)?;
            write_project_details(out, project)?;
            if index != 0 {
                continue;
            }
            match self.sessions(project) {
                Ok(sessions) => {
                    writeln!(out, "   Sample sessions:")?;
                    for session in sessions.iter().take(SAMPLE_SESSIONS) {
                        writeln!(
                            out,
                            "   - {} (Session: {})",
                            format_timestamp(session.last_activity),
                            session.session_id
                        )?;
                    }
                }
                Err(error) => writeln!(out, "   Error loading sessions: {error:#}")?,
            }
        }
        Ok(())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        let token = CancelToken::with_timeout(self.deadlines.list);
        self.store
            .list_projects(&token)
            .context("fetch projects")
    }

    fn sessions(&self, project: &Project) -> Result<Vec<Session>> {
        let token = CancelToken::with_timeout(self.deadlines.list);
        self.store
            .list_sessions(&token, &project.path)
            .with_context(|| format!("fetch sessions for {}", project.path))
    }

    fn messages(&self, session_id: &str) -> Result<Vec<String>> {
        let token = CancelToken::with_timeout(self.deadlines.messages);
        self.store
            .recent_messages(&token, session_id)
            .with_context(|| format!("fetch messages for session {session_id}"))
    }

    /// Matches by display name or full path.
    fn find_project(&self, name: &str) -> Result<Project> {
        match self
            .projects()?
            .into_iter()
            .find(|project| project.name == name || project.path == name)
        {
            Some(project) => Ok(project),
            None => bail!("project '{name}' not found"),
        }
    }
}

pub fn write_session_debug(out: &mut impl Write, debug: &SessionDebug) -> Result<()> {
    writeln!(out, "Debugging session: {}", debug.session_id)?;
    writeln!(out, "==========================================")?;

    match &debug.summary {
        Some(summary) => {
            writeln!(out, "\n=== SESSION SUMMARY ===")?;
            writeln!(out, "{summary}")?;
            writeln!(out, "=======================")?;
        }
        None => writeln!(out, "\n=== NO SUMMARY AVAILABLE ===")?,
    }

    writeln!(out, "\n=== MESSAGES ===")?;
    if debug.user_messages.is_empty() {
        writeln!(out, "No messages found for this session")?;
        return Ok(());
    }
    writeln!(out, "Found {} messages:", debug.user_messages.len())?;
    for (index, message) in debug.user_messages.iter().enumerate() {
        writeln!(out, "\n--- Message {} ---\n{message}", index + 1)?;
    }
    Ok(())
}

fn write_project_details(out: &mut impl Write, project: &Project) -> Result<()> {
    writeln!(out, "   Path: {}", project.path)?;
    writeln!(out, "   Sessions: {}", project.session_count)?;
    writeln!(
        out,
        "   Last Activity: {}",
        format_timestamp(project.last_activity)
    )?;
    Ok(())
}

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| value.to_string())
}
