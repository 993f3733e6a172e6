// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{FetchKind, RequestId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingState {
    Idle,
    LoadingProjects,
    LoadingSessions,
    LoadingMessages,
    Cancelling,
    Error { message: String },
}

impl LoadingState {
    /// Summaries load in the background and never own the loading state.
    pub const fn for_kind(kind: FetchKind) -> Option<Self> {
        match kind {
            FetchKind::Projects => Some(Self::LoadingProjects),
            FetchKind::Sessions => Some(Self::LoadingSessions),
            FetchKind::Messages => Some(Self::LoadingMessages),
            FetchKind::Summaries => None,
        }
    }

    pub const fn is_loading(&self) -> bool {
        matches!(
            self,
            Self::LoadingProjects | Self::LoadingSessions | Self::LoadingMessages
        )
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::LoadingProjects => "loading projects",
            Self::LoadingSessions => "loading sessions",
            Self::LoadingMessages => "loading messages",
            Self::Cancelling => "cancelling",
            Self::Error { message } => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingCommand {
    Begin {
        request_id: RequestId,
        kind: FetchKind,
    },
    Complete {
        request_id: RequestId,
    },
    Fail {
        request_id: RequestId,
        message: String,
    },
    Cancel,
    ConfirmCancelled {
        request_id: RequestId,
    },
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingEvent {
    StateChanged(LoadingState),
    /// The tracked request was replaced by a newer one and should be cancelled.
    Superseded(RequestId),
    CancelRequested(RequestId),
}

/// Owns the single active [`LoadingState`] and the request it is waiting on.
/// Commands naming any other request leave the state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingTracker {
    state: LoadingState,
    active: Option<RequestId>,
    cancelling: Option<RequestId>,
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self {
            state: LoadingState::Idle,
            active: None,
            cancelling: None,
        }
    }
}

impl LoadingTracker {
    pub fn state(&self) -> &LoadingState {
        &self.state
    }

    pub fn active_request(&self) -> Option<RequestId> {
        self.active
    }

    pub fn cancelling_request(&self) -> Option<RequestId> {
        self.cancelling
    }

    pub fn dispatch(&mut self, command: LoadingCommand) -> Vec<LoadingEvent> {
        match command {
            LoadingCommand::Begin { request_id, kind } => {
                let Some(next) = LoadingState::for_kind(kind) else {
                    return Vec::new();
                };
                let mut events = Vec::new();
                if let Some(previous) = self.active.replace(request_id)
                    && previous != request_id
                {
                    events.push(LoadingEvent::Superseded(previous));
                }
                self.cancelling = None;
                events.push(self.transition(next));
                events
            }
            LoadingCommand::Complete { request_id } => {
                if self.active != Some(request_id) {
                    return Vec::new();
                }
                self.active = None;
                vec![self.transition(LoadingState::Idle)]
            }
            LoadingCommand::Fail {
                request_id,
                message,
            } => {
                if self.active != Some(request_id) {
                    return Vec::new();
                }
                self.active = None;
                vec![self.transition(LoadingState::Error { message })]
            }
            LoadingCommand::Cancel => {
                if !self.state.is_loading() {
                    return Vec::new();
                }
                let Some(request_id) = self.active.take() else {
                    return Vec::new();
                };
                self.cancelling = Some(request_id);
                vec![
                    LoadingEvent::CancelRequested(request_id),
                    self.transition(LoadingState::Cancelling),
                ]
            }
            LoadingCommand::ConfirmCancelled { request_id } => {
                if self.state != LoadingState::Cancelling || self.cancelling != Some(request_id) {
                    return Vec::new();
                }
                self.cancelling = None;
                vec![self.transition(LoadingState::Idle)]
            }
            LoadingCommand::Dismiss => {
                if !matches!(self.state, LoadingState::Error { .. }) {
                    return Vec::new();
                }
                vec![self.transition(LoadingState::Idle)]
            }
        }
    }

    fn transition(&mut self, next: LoadingState) -> LoadingEvent {
        self.state = next.clone();
        LoadingEvent::StateChanged(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadingCommand, LoadingEvent, LoadingState, LoadingTracker};
    use crate::{FetchKind, RequestId};

    fn begin(tracker: &mut LoadingTracker, id: u64, kind: FetchKind) -> Vec<LoadingEvent> {
        tracker.dispatch(LoadingCommand::Begin {
            request_id: RequestId::new(id),
            kind,
        })
    }

    #[test]
    fn load_then_complete_returns_to_idle() {
        let mut tracker = LoadingTracker::default();

        let events = begin(&mut tracker, 1, FetchKind::Projects);
        assert_eq!(
            events,
            vec![LoadingEvent::StateChanged(LoadingState::LoadingProjects)]
        );

        let events = tracker.dispatch(LoadingCommand::Complete {
            request_id: RequestId::new(1),
        });
        assert_eq!(events, vec![LoadingEvent::StateChanged(LoadingState::Idle)]);
        assert_eq!(tracker.active_request(), None);
    }

    #[test]
    fn untracked_results_do_not_move_state() {
        let mut tracker = LoadingTracker::default();
        begin(&mut tracker, 2, FetchKind::Messages);

        let events = tracker.dispatch(LoadingCommand::Complete {
            request_id: RequestId::new(1),
        });
        assert!(events.is_empty());
        let events = tracker.dispatch(LoadingCommand::Fail {
            request_id: RequestId::new(1),
            message: "boom".to_owned(),
        });
        assert!(events.is_empty());
        assert_eq!(tracker.state(), &LoadingState::LoadingMessages);
    }

    #[test]
    fn newer_request_supersedes_tracked_one() {
        let mut tracker = LoadingTracker::default();
        begin(&mut tracker, 1, FetchKind::Messages);

        let events = begin(&mut tracker, 2, FetchKind::Messages);
        assert_eq!(
            events,
            vec![
                LoadingEvent::Superseded(RequestId::new(1)),
                LoadingEvent::StateChanged(LoadingState::LoadingMessages),
            ]
        );
        assert_eq!(tracker.active_request(), Some(RequestId::new(2)));
    }

    #[test]
    fn summaries_never_own_the_state() {
        let mut tracker = LoadingTracker::default();
        assert!(begin(&mut tracker, 1, FetchKind::Summaries).is_empty());
        assert_eq!(tracker.state(), &LoadingState::Idle);
    }

    #[test]
    fn cancel_waits_for_confirmation_of_the_cancelled_request() {
        let mut tracker = LoadingTracker::default();
        begin(&mut tracker, 7, FetchKind::Sessions);

        let events = tracker.dispatch(LoadingCommand::Cancel);
        assert_eq!(
            events,
            vec![
                LoadingEvent::CancelRequested(RequestId::new(7)),
                LoadingEvent::StateChanged(LoadingState::Cancelling),
            ]
        );

        let wrong = tracker.dispatch(LoadingCommand::ConfirmCancelled {
            request_id: RequestId::new(8),
        });
        assert!(wrong.is_empty());
        assert_eq!(tracker.state(), &LoadingState::Cancelling);

        // A cancelled request that still delivers is not tracked anymore.
        let late = tracker.dispatch(LoadingCommand::Complete {
            request_id: RequestId::new(7),
        });
        assert!(late.is_empty());

        let events = tracker.dispatch(LoadingCommand::ConfirmCancelled {
            request_id: RequestId::new(7),
        });
        assert_eq!(events, vec![LoadingEvent::StateChanged(LoadingState::Idle)]);
        assert_eq!(tracker.cancelling_request(), None);
    }

    #[test]
    fn cancel_is_ignored_when_nothing_is_loading() {
        let mut tracker = LoadingTracker::default();
        assert!(tracker.dispatch(LoadingCommand::Cancel).is_empty());
        assert!(tracker.dispatch(LoadingCommand::Dismiss).is_empty());
    }

    #[test]
    fn failure_enters_error_until_dismissed() {
        let mut tracker = LoadingTracker::default();
        begin(&mut tracker, 3, FetchKind::Projects);
        tracker.dispatch(LoadingCommand::Fail {
            request_id: RequestId::new(3),
            message: "disk on fire".to_owned(),
        });
        assert_eq!(
            tracker.state(),
            &LoadingState::Error {
                message: "disk on fire".to_owned()
            }
        );
        assert_eq!(tracker.state().label(), "disk on fire");

        let events = tracker.dispatch(LoadingCommand::Dismiss);
        assert_eq!(events, vec![LoadingEvent::StateChanged(LoadingState::Idle)]);
    }

    #[test]
    fn new_load_from_cancelling_abandons_confirmation() {
        let mut tracker = LoadingTracker::default();
        begin(&mut tracker, 1, FetchKind::Sessions);
        tracker.dispatch(LoadingCommand::Cancel);

        begin(&mut tracker, 2, FetchKind::Projects);
        assert_eq!(tracker.state(), &LoadingState::LoadingProjects);
        assert!(
            tracker
                .dispatch(LoadingCommand::ConfirmCancelled {
                    request_id: RequestId::new(1),
                })
                .is_empty()
        );
        assert_eq!(tracker.state(), &LoadingState::LoadingProjects);
    }
}
