// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{CancelToken, Interrupt, Project, Session};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<Interrupt> for SourceError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => Self::Cancelled,
            Interrupt::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Read-only access to the session catalog. Every method may block and must
/// return promptly once `token` is interrupted.
pub trait CatalogSource: Send + Sync {
    fn fetch_projects(&self, token: &CancelToken) -> SourceResult<Vec<Project>>;

    fn fetch_sessions(&self, token: &CancelToken, project_path: &str)
    -> SourceResult<Vec<Session>>;

    /// Formatted preview lines, oldest first.
    fn fetch_messages(&self, token: &CancelToken, session_id: &str) -> SourceResult<Vec<String>>;

    /// Summaries for whichever of `session_ids` resolved. Missing keys are
    /// not an error.
    fn fetch_summaries(
        &self,
        token: &CancelToken,
        session_ids: &[String],
    ) -> SourceResult<BTreeMap<String, String>>;
}
