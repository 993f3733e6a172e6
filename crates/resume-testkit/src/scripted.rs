// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::anyhow;
use resume_app::{CancelToken, CatalogSource, Project, Session, SourceError, SourceResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    Projects,
    Sessions(String),
    Messages(String),
    Summaries,
}

impl Call {
    pub fn sessions(project_path: &str) -> Self {
        Self::Sessions(project_path.to_owned())
    }

    pub fn messages(session_id: &str) -> Self {
        Self::Messages(session_id.to_owned())
    }
}

/// Holds a scripted call until opened.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn open(&self) {
        let (lock, signal) = &*self.inner;
        *lock_or_recover(lock) = true;
        signal.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *lock_or_recover(&self.inner.0)
    }

    fn wait_step(&self) {
        let (lock, signal) = &*self.inner;
        let guard = lock_or_recover(lock);
        if !*guard {
            let _ = signal.wait_timeout(guard, POLL_STEP);
        }
    }
}

#[derive(Default)]
struct Script {
    delays: HashMap<Call, Duration>,
    zombies: HashSet<Call>,
    failures: HashMap<Call, String>,
    gates: HashMap<Call, Gate>,
    started: Vec<Call>,
    finished: Vec<Call>,
}

/// In-memory catalog whose calls can be delayed, held, failed, or made to
/// ignore cancellation.
#[derive(Default)]
pub struct ScriptedSource {
    projects: Vec<Project>,
    sessions: HashMap<String, Vec<Session>>,
    messages: HashMap<String, Vec<String>>,
    summaries: BTreeMap<String, String>,
    script: Mutex<Script>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(mut self, projects: Vec<Project>) -> Self {
        self.projects = projects;
        self
    }

    pub fn with_sessions(mut self, project_path: &str, sessions: Vec<Session>) -> Self {
        self.sessions.insert(project_path.to_owned(), sessions);
        self
    }

    pub fn with_messages(mut self, session_id: &str, messages: Vec<String>) -> Self {
        self.messages.insert(session_id.to_owned(), messages);
        self
    }

    pub fn with_summary(mut self, session_id: &str, summary: &str) -> Self {
        self.summaries
            .insert(session_id.to_owned(), summary.to_owned());
        self
    }

    pub fn set_delay(&self, call: Call, delay: Duration) {
        self.script().delays.insert(call, delay);
    }

    /// The call will run to completion even after its token is cancelled.
    pub fn set_zombie(&self, call: Call) {
        self.script().zombies.insert(call);
    }

    pub fn set_failure(&self, call: Call, message: &str) {
        self.script().failures.insert(call, message.to_owned());
    }

    pub fn clear_failure(&self, call: &Call) {
        self.script().failures.remove(call);
    }

    pub fn gate(&self, call: Call) -> Gate {
        self.script().gates.entry(call).or_default().clone()
    }

    pub fn started(&self, call: &Call) -> usize {
        self.script()
            .started
            .iter()
            .filter(|seen| *seen == call)
            .count()
    }

    pub fn finished(&self, call: &Call) -> usize {
        self.script()
            .finished
            .iter()
            .filter(|seen| *seen == call)
            .count()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        lock_or_recover(&self.script)
    }

    fn run(&self, call: Call, token: &CancelToken) -> SourceResult<()> {
        let (delay, zombie, gate) = {
            let mut script = self.script();
            script.started.push(call.clone());
            (
                script.delays.get(&call).copied().unwrap_or_default(),
                script.zombies.contains(&call),
                script.gates.get(&call).cloned(),
            )
        };

        let until = Instant::now() + delay;
        loop {
            if !zombie {
                token.check()?;
            }
            if let Some(gate) = &gate
                && !gate.is_open()
            {
                gate.wait_step();
                continue;
            }
            let now = Instant::now();
            if now >= until {
                break;
            }
            thread::sleep(POLL_STEP.min(until - now));
        }

        let mut script = self.script();
        script.finished.push(call.clone());
        match script.failures.get(&call) {
            Some(message) => Err(SourceError::Other(anyhow!("{message}"))),
            None => Ok(()),
        }
    }
}

impl CatalogSource for ScriptedSource {
    fn fetch_projects(&self, token: &CancelToken) -> SourceResult<Vec<Project>> {
        self.run(Call::Projects, token)?;
        Ok(self.projects.clone())
    }

    fn fetch_sessions(
        &self,
        token: &CancelToken,
        project_path: &str,
    ) -> SourceResult<Vec<Session>> {
        self.run(Call::sessions(project_path), token)?;
        Ok(self.sessions.get(project_path).cloned().unwrap_or_default())
    }

    fn fetch_messages(&self, token: &CancelToken, session_id: &str) -> SourceResult<Vec<String>> {
        self.run(Call::messages(session_id), token)?;
        Ok(self.messages.get(session_id).cloned().unwrap_or_default())
    }

    fn fetch_summaries(
        &self,
        token: &CancelToken,
        session_ids: &[String],
    ) -> SourceResult<BTreeMap<String, String>> {
        self.run(Call::Summaries, token)?;
        Ok(session_ids
            .iter()
            .filter_map(|id| {
                self.summaries
                    .get(id)
                    .map(|summary| (id.clone(), summary.clone()))
            })
            .collect())
    }
}

fn lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
