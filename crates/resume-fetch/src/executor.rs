// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{ExecutorError, FetchError, RequestRegistry, ResultCache};
use resume_app::{
    CancelToken, CatalogSource, FetchKind, FetchParams, Project, RequestId, Session, SourceError,
};
use anyhow::anyhow;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub list: Duration,
    pub messages: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            list: DEFAULT_LIST_TIMEOUT,
            messages: DEFAULT_MESSAGE_TIMEOUT,
        }
    }
}

impl Deadlines {
    pub const fn for_kind(&self, kind: FetchKind) -> Duration {
        if kind.is_list() {
            self.list
        } else {
            self.messages
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPayload {
    Projects(Vec<Project>),
    Sessions(Vec<Session>),
    Messages(Vec<String>),
    Summaries(BTreeMap<String, String>),
}

/// The single terminal result of a request that was not cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub request_id: RequestId,
    pub params: FetchParams,
    pub result: Result<FetchPayload, FetchError>,
}

/// Runs each fetch on its own worker thread and reports completions on one
/// channel. Cancelled requests report nothing.
pub struct FetchExecutor {
    source: Arc<dyn CatalogSource>,
    registry: Arc<RequestRegistry>,
    cache: Arc<ResultCache>,
    completions: Sender<FetchOutcome>,
    deadlines: Deadlines,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl FetchExecutor {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: Arc<ResultCache>,
        deadlines: Deadlines,
    ) -> (Self, Receiver<FetchOutcome>) {
        let (completions, receiver) = mpsc::channel();
        let executor = Self {
            source,
            registry: Arc::new(RequestRegistry::new()),
            cache,
            completions,
            deadlines,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        };
        (executor, receiver)
    }

    pub fn deadlines(&self) -> Deadlines {
        self.deadlines
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    pub fn submit(&self, params: FetchParams) -> Result<RequestId, ExecutorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecutorError::Closed);
        }

        let request_id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let kind = params.kind();
        let timeout = self.deadlines.for_kind(kind);
        let token = CancelToken::with_timeout(timeout);

        let registered = self.registry.register(request_id, token.clone());
        debug_assert!(registered.is_ok(), "request id {request_id} registered twice");
        if let Err(error) = registered {
            tracing::error!(%error, "request registry rejected a fresh id");
            return Err(error.into());
        }

        match &params {
            FetchParams::Messages { session_id } => {
                self.cache.note_messages_request(session_id, request_id);
            }
            FetchParams::Summaries { session_ids, .. } => {
                self.cache.note_summary_request(session_ids, request_id);
            }
            FetchParams::Projects | FetchParams::Sessions { .. } => {}
        }

        let job = Job {
            request_id,
            params,
            token,
            timeout,
            source: Arc::clone(&self.source),
            registry: Arc::clone(&self.registry),
            cache: Arc::clone(&self.cache),
            completions: self.completions.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("fetch-{kind}"))
            .spawn(move || job.run());
        if let Err(error) = spawned {
            let _ = self.registry.unregister(request_id);
            return Err(ExecutorError::Spawn(error.to_string()));
        }

        tracing::debug!(%request_id, %kind, ?timeout, "submitted fetch");
        Ok(request_id)
    }

    pub fn cancel(&self, request_id: RequestId) -> bool {
        let found = self.registry.cancel(request_id);
        if found {
            tracing::debug!(%request_id, "cancel requested");
        }
        found
    }

    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Rejects further submissions and cancels everything in flight.
    pub fn shutdown(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled in-flight fetches on shutdown");
        }
        cancelled
    }

    /// Waits until every worker has finished. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let until = Instant::now() + timeout;
        while !self.registry.is_empty() {
            if Instant::now() >= until {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

impl Drop for FetchExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Job {
    request_id: RequestId,
    params: FetchParams,
    token: CancelToken,
    timeout: Duration,
    source: Arc<dyn CatalogSource>,
    registry: Arc<RequestRegistry>,
    cache: Arc<ResultCache>,
    completions: Sender<FetchOutcome>,
}

impl Job {
    fn run(self) {
        // A panicking source still unregisters and reports an error.
        let fetched = panic::catch_unwind(AssertUnwindSafe(|| self.fetch())).unwrap_or_else(
            |panic| {
                Err(SourceError::Other(anyhow!(
                    "catalog source panicked: {}",
                    panic_message(panic.as_ref())
                )))
            },
        );
        if let Ok(payload) = &fetched {
            self.remember(payload);
        }

        let cancelled = self.token.is_cancelled();
        let unregistered = self.registry.unregister(self.request_id);
        debug_assert!(
            unregistered.is_ok(),
            "request {} unregistered twice",
            self.request_id
        );
        if let Err(error) = unregistered {
            tracing::error!(%error, "fetch worker finished an unregistered request");
        }

        let kind = self.params.kind();
        let result = match fetched {
            _ if cancelled => None,
            Ok(payload) => Some(Ok(payload)),
            Err(SourceError::Cancelled) => None,
            Err(SourceError::DeadlineExceeded) => Some(Err(FetchError::Timeout {
                kind,
                after: self.timeout,
            })),
            Err(SourceError::Other(error)) => {
                tracing::warn!(request_id = %self.request_id, %kind, "fetch failed: {error:#}");
                Some(Err(FetchError::Source {
                    kind,
                    message: format!("{error:#}"),
                }))
            }
        };
        let Some(result) = result else {
            tracing::debug!(request_id = %self.request_id, %kind, "dropping cancelled fetch");
            return;
        };

        let outcome = FetchOutcome {
            request_id: self.request_id,
            params: self.params,
            result,
        };
        if self.completions.send(outcome).is_err() {
            tracing::debug!(request_id = %self.request_id, "completion receiver gone");
        }
    }

    fn fetch(&self) -> Result<FetchPayload, SourceError> {
        self.token.check()?;
        let source = self.source.as_ref();
        match &self.params {
            FetchParams::Projects => source.fetch_projects(&self.token).map(FetchPayload::Projects),
            FetchParams::Sessions { project_path } => source
                .fetch_sessions(&self.token, project_path)
                .map(FetchPayload::Sessions),
            FetchParams::Messages { session_id } => source
                .fetch_messages(&self.token, session_id)
                .map(FetchPayload::Messages),
            FetchParams::Summaries { session_ids, .. } => source
                .fetch_summaries(&self.token, session_ids)
                .map(FetchPayload::Summaries),
        }
    }

    /// Results land in the cache even when the request was cancelled after
    /// the source finished, as long as no newer request owns the key.
    fn remember(&self, payload: &FetchPayload) {
        match (&self.params, payload) {
            (FetchParams::Messages { session_id }, FetchPayload::Messages(messages)) => {
                self.cache
                    .store_messages_if_current(session_id, self.request_id, messages.clone());
            }
            (FetchParams::Summaries { .. }, FetchPayload::Summaries(summaries)) => {
                self.cache
                    .store_summaries_if_current(self.request_id, summaries);
            }
            _ => {}
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
