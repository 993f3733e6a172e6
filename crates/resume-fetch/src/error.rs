// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use resume_app::{FetchKind, RequestId};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("request {0} is already registered")]
    Duplicate(RequestId),
    #[error("request {0} is not registered")]
    Unknown(RequestId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("fetch executor is shut down")]
    Closed,
    #[error("spawn fetch worker: {0}")]
    Spawn(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A failed fetch, as seen by the consumer. Cancellation is never an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("loading {kind} failed: {message}")]
    Source { kind: FetchKind, message: String },
    #[error("loading {kind} timed out after {after:?}")]
    Timeout { kind: FetchKind, after: Duration },
}

impl FetchError {
    pub const fn kind(&self) -> FetchKind {
        match self {
            Self::Source { kind, .. } | Self::Timeout { kind, .. } => *kind,
        }
    }
}
