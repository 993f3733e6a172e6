// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{
    Deadlines, ExecutorError, FetchError, FetchExecutor, FetchOutcome, FetchPayload, ResultCache,
};
use resume_app::{
    CatalogSource, FetchKind, FetchParams, LoadingCommand, LoadingEvent, LoadingState,
    LoadingTracker, Project, RequestId, Session,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

/// A completed fetch the view should apply. Only produced for the request
/// currently tracked for its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedEvent {
    ProjectsLoaded {
        request_id: RequestId,
        result: Result<Vec<Project>, FetchError>,
    },
    SessionsLoaded {
        request_id: RequestId,
        project_path: String,
        result: Result<Vec<Session>, FetchError>,
    },
    MessagesLoaded {
        request_id: RequestId,
        session_id: String,
        result: Result<Vec<String>, FetchError>,
    },
    SummariesLoaded {
        request_id: RequestId,
        project_path: String,
        result: Result<BTreeMap<String, String>, FetchError>,
    },
}

impl LoadedEvent {
    fn from_outcome(outcome: FetchOutcome) -> Option<Self> {
        let FetchOutcome {
            request_id,
            params,
            result,
        } = outcome;
        let event = match (params, result) {
            (FetchParams::Projects, Ok(FetchPayload::Projects(projects))) => {
                Self::ProjectsLoaded {
                    request_id,
                    result: Ok(projects),
                }
            }
            (FetchParams::Projects, Err(error)) => Self::ProjectsLoaded {
                request_id,
                result: Err(error),
            },
            (FetchParams::Sessions { project_path }, Ok(FetchPayload::Sessions(sessions))) => {
                Self::SessionsLoaded {
                    request_id,
                    project_path,
                    result: Ok(sessions),
                }
            }
            (FetchParams::Sessions { project_path }, Err(error)) => Self::SessionsLoaded {
                request_id,
                project_path,
                result: Err(error),
            },
            (FetchParams::Messages { session_id }, Ok(FetchPayload::Messages(messages))) => {
                Self::MessagesLoaded {
                    request_id,
                    session_id,
                    result: Ok(messages),
                }
            }
            (FetchParams::Messages { session_id }, Err(error)) => Self::MessagesLoaded {
                request_id,
                session_id,
                result: Err(error),
            },
            (
                FetchParams::Summaries { project_path, .. },
                Ok(FetchPayload::Summaries(summaries)),
            ) => Self::SummariesLoaded {
                request_id,
                project_path,
                result: Ok(summaries),
            },
            (FetchParams::Summaries { project_path, .. }, Err(error)) => Self::SummariesLoaded {
                request_id,
                project_path,
                result: Err(error),
            },
            (params, Ok(_)) => {
                tracing::error!(%request_id, kind = %params.kind(), "payload does not match request");
                return None;
            }
        };
        Some(event)
    }

    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::ProjectsLoaded { request_id, .. }
            | Self::SessionsLoaded { request_id, .. }
            | Self::MessagesLoaded { request_id, .. }
            | Self::SummariesLoaded { request_id, .. } => *request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagesLookup {
    /// Served from the cache; nothing was submitted.
    Cached(Vec<String>),
    /// The request already loading this session's messages.
    InFlight(RequestId),
    Submitted(RequestId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryBatch {
    pub cached: BTreeMap<String, String>,
    pub pending: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tracked {
    request_id: RequestId,
    params: FetchParams,
}

/// The consumer side of the fetch pipeline: decides cache hits, submits
/// work, drives the loading state, and turns completions into
/// [`LoadedEvent`]s. Owned by the presentation loop.
pub struct FetchBridge {
    executor: FetchExecutor,
    completions: Receiver<FetchOutcome>,
    cache: Arc<ResultCache>,
    loading: LoadingTracker,
    tracked: HashMap<FetchKind, Tracked>,
}

impl FetchBridge {
    pub fn new(source: Arc<dyn CatalogSource>, deadlines: Deadlines) -> Self {
        let cache = Arc::new(ResultCache::new());
        let (executor, completions) = FetchExecutor::new(source, Arc::clone(&cache), deadlines);
        Self {
            executor,
            completions,
            cache,
            loading: LoadingTracker::default(),
            tracked: HashMap::new(),
        }
    }

    pub fn loading_state(&self) -> &LoadingState {
        self.loading.state()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn executor(&self) -> &FetchExecutor {
        &self.executor
    }

    pub fn load_projects(&mut self) -> Result<RequestId, ExecutorError> {
        self.begin(FetchParams::Projects)
    }

    pub fn load_sessions(&mut self, project_path: &str) -> Result<RequestId, ExecutorError> {
        self.begin(FetchParams::Sessions {
            project_path: project_path.to_owned(),
        })
    }

    /// Shows `session_id`'s messages: from the cache when possible, else by
    /// reusing or starting a fetch. Any fetch for a different session is
    /// cancelled.
    pub fn select_session(&mut self, session_id: &str) -> Result<MessagesLookup, ExecutorError> {
        if let Some(tracked) = self.tracked.get(&FetchKind::Messages)
            && matches!(&tracked.params, FetchParams::Messages { session_id: loading } if loading == session_id)
        {
            return Ok(MessagesLookup::InFlight(tracked.request_id));
        }

        if let Some(messages) = self.cache.lookup_messages(session_id) {
            self.abandon(FetchKind::Messages);
            return Ok(MessagesLookup::Cached(messages));
        }

        self.begin(FetchParams::Messages {
            session_id: session_id.to_owned(),
        })
        .map(MessagesLookup::Submitted)
    }

    /// Returns cached summaries at once and submits one batch for the rest.
    /// Summary fetches never touch the loading state.
    pub fn load_summaries(
        &mut self,
        project_path: &str,
        session_ids: &[String],
    ) -> Result<SummaryBatch, ExecutorError> {
        let cached = self.cache.summaries_for(session_ids);
        let missing = self.cache.missing_summaries(session_ids);
        self.abandon(FetchKind::Summaries);
        if missing.is_empty() {
            return Ok(SummaryBatch {
                cached,
                pending: None,
            });
        }

        let params = FetchParams::Summaries {
            project_path: project_path.to_owned(),
            session_ids: missing,
        };
        let request_id = self.executor.submit(params.clone())?;
        self.tracked
            .insert(FetchKind::Summaries, Tracked { request_id, params });
        Ok(SummaryBatch {
            cached,
            pending: Some(request_id),
        })
    }

    /// Cancels the request behind the current loading state. Returns the
    /// cancelled id, or `None` when nothing was loading.
    pub fn cancel(&mut self) -> Option<RequestId> {
        let mut cancelled = None;
        for event in self.loading.dispatch(LoadingCommand::Cancel) {
            if let LoadingEvent::CancelRequested(request_id) = event {
                self.executor.cancel(request_id);
                self.forget(request_id);
                cancelled = Some(request_id);
            }
        }
        cancelled
    }

    /// Cancels every fetch scoped to the project being left: its session
    /// list, the selected session's messages and the summary batch.
    pub fn leave_project(&mut self) {
        for kind in [FetchKind::Sessions, FetchKind::Messages, FetchKind::Summaries] {
            self.abandon(kind);
        }
    }

    /// Leaves `Cancelling` once the cancelled worker has finished. Returns
    /// whether the state changed.
    pub fn poll_cancellation(&mut self) -> bool {
        let Some(request_id) = self.loading.cancelling_request() else {
            return false;
        };
        if self.executor.registry().contains(request_id) {
            return false;
        }
        !self
            .loading
            .dispatch(LoadingCommand::ConfirmCancelled { request_id })
            .is_empty()
    }

    pub fn dismiss_error(&mut self) -> bool {
        !self.loading.dispatch(LoadingCommand::Dismiss).is_empty()
    }

    /// Accepts an outcome only if it belongs to the request tracked for its
    /// kind; anything else is stale and dropped.
    pub fn apply(&mut self, outcome: FetchOutcome) -> Option<LoadedEvent> {
        let kind = outcome.params.kind();
        let request_id = outcome.request_id;
        let is_tracked = self
            .tracked
            .get(&kind)
            .is_some_and(|tracked| tracked.request_id == request_id);
        if !is_tracked {
            tracing::debug!(%request_id, %kind, "discarding stale fetch result");
            return None;
        }
        self.tracked.remove(&kind);

        let command = match &outcome.result {
            Ok(_) => LoadingCommand::Complete { request_id },
            Err(error) => LoadingCommand::Fail {
                request_id,
                message: error.to_string(),
            },
        };
        self.loading.dispatch(command);
        LoadedEvent::from_outcome(outcome)
    }

    /// Next applicable event without blocking.
    pub fn try_next(&mut self) -> Option<LoadedEvent> {
        loop {
            match self.completions.try_recv() {
                Ok(outcome) => {
                    if let Some(event) = self.apply(outcome) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Blocks up to `timeout` for the next applicable event.
    pub fn wait_next(&mut self, timeout: Duration) -> Option<LoadedEvent> {
        let until = Instant::now() + timeout;
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            match self.completions.recv_timeout(remaining) {
                Ok(outcome) => {
                    if let Some(event) = self.apply(outcome) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    pub fn shutdown(&self) -> usize {
        self.executor.shutdown()
    }

    fn begin(&mut self, params: FetchParams) -> Result<RequestId, ExecutorError> {
        let kind = params.kind();
        let request_id = self.executor.submit(params.clone())?;
        for event in self
            .loading
            .dispatch(LoadingCommand::Begin { request_id, kind })
        {
            if let LoadingEvent::Superseded(previous) = event {
                self.executor.cancel(previous);
                self.forget(previous);
            }
        }
        // A same-kind request that no longer owns the loading state.
        if let Some(previous) = self.tracked.insert(kind, Tracked { request_id, params }) {
            self.executor.cancel(previous.request_id);
        }
        Ok(request_id)
    }

    /// Stops waiting for any request of `kind`, cancelling it. A message
    /// fetch that owns the loading state goes through `Cancelling`.
    fn abandon(&mut self, kind: FetchKind) {
        let Some(tracked) = self.tracked.get(&kind) else {
            return;
        };
        if self.loading.active_request() == Some(tracked.request_id) {
            self.cancel();
        } else if let Some(tracked) = self.tracked.remove(&kind) {
            self.executor.cancel(tracked.request_id);
        }
    }

    fn forget(&mut self, request_id: RequestId) {
        self.tracked
            .retain(|_, tracked| tracked.request_id != request_id);
    }
}
