// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use resume_app::RequestId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Session-scoped memo of message previews and summaries. Unbounded; lives
/// as long as the process.
///
/// Each key remembers the newest request issued for it, and a result is only
/// stored when it comes from that request.
#[derive(Debug, Default)]
pub struct ResultCache {
    inner: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    messages: HashMap<String, Vec<String>>,
    summaries: HashMap<String, String>,
    latest_messages: HashMap<String, RequestId>,
    latest_summaries: HashMap<String, RequestId>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_messages(&self, session_id: &str) -> Option<Vec<String>> {
        self.state().messages.get(session_id).cloned()
    }

    pub fn store_messages(&self, session_id: &str, messages: Vec<String>) {
        self.state()
            .messages
            .insert(session_id.to_owned(), messages);
    }

    pub fn note_messages_request(&self, session_id: &str, request_id: RequestId) {
        self.state()
            .latest_messages
            .insert(session_id.to_owned(), request_id);
    }

    pub fn store_messages_if_current(
        &self,
        session_id: &str,
        request_id: RequestId,
        messages: Vec<String>,
    ) -> bool {
        let mut state = self.state();
        if state.latest_messages.get(session_id) != Some(&request_id) {
            return false;
        }
        state.messages.insert(session_id.to_owned(), messages);
        true
    }

    pub fn lookup_summary(&self, session_id: &str) -> Option<String> {
        self.state().summaries.get(session_id).cloned()
    }

    /// The cached subset of `session_ids`.
    pub fn summaries_for(&self, session_ids: &[String]) -> BTreeMap<String, String> {
        let state = self.state();
        session_ids
            .iter()
            .filter_map(|id| {
                state
                    .summaries
                    .get(id)
                    .map(|summary| (id.clone(), summary.clone()))
            })
            .collect()
    }

    pub fn missing_summaries(&self, session_ids: &[String]) -> Vec<String> {
        let state = self.state();
        session_ids
            .iter()
            .filter(|id| !state.summaries.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn note_summary_request(&self, session_ids: &[String], request_id: RequestId) {
        let mut state = self.state();
        for id in session_ids {
            state.latest_summaries.insert(id.clone(), request_id);
        }
    }

    /// Stores the entries whose key still points at `request_id`; returns how
    /// many were stored.
    pub fn store_summaries_if_current(
        &self,
        request_id: RequestId,
        summaries: &BTreeMap<String, String>,
    ) -> usize {
        let mut state = self.state();
        let mut stored = 0;
        for (id, summary) in summaries {
            if state.latest_summaries.get(id) == Some(&request_id) {
                state.summaries.insert(id.clone(), summary.clone());
                stored += 1;
            }
        }
        stored
    }

    pub fn cached_message_sessions(&self) -> usize {
        self.state().messages.len()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ResultCache;
    use resume_app::RequestId;
    use std::collections::BTreeMap;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    #[test]
    fn superseded_request_cannot_overwrite_messages() {
        let cache = ResultCache::new();
        cache.note_messages_request("s1", RequestId::new(1));
        cache.note_messages_request("s1", RequestId::new(2));

        assert!(!cache.store_messages_if_current("s1", RequestId::new(1), lines(&["old"])));
        assert_eq!(cache.lookup_messages("s1"), None);

        assert!(cache.store_messages_if_current("s1", RequestId::new(2), lines(&["new"])));
        assert_eq!(cache.lookup_messages("s1"), Some(lines(&["new"])));
    }

    #[test]
    fn unrequested_keys_are_never_stored_conditionally() {
        let cache = ResultCache::new();
        assert!(!cache.store_messages_if_current("s9", RequestId::new(1), lines(&["x"])));
        cache.store_messages("s9", lines(&["x"]));
        assert_eq!(cache.cached_message_sessions(), 1);
    }

    #[test]
    fn summaries_store_partially_and_report_missing() {
        let cache = ResultCache::new();
        let ids = lines(&["a", "b", "c"]);
        cache.note_summary_request(&ids, RequestId::new(5));
        cache.note_summary_request(&lines(&["c"]), RequestId::new(6));

        let mut resolved = BTreeMap::new();
        resolved.insert("a".to_owned(), "alpha".to_owned());
        resolved.insert("c".to_owned(), "stale".to_owned());
        assert_eq!(cache.store_summaries_if_current(RequestId::new(5), &resolved), 1);

        assert_eq!(cache.lookup_summary("a").as_deref(), Some("alpha"));
        assert_eq!(cache.missing_summaries(&ids), lines(&["b", "c"]));
        assert_eq!(cache.summaries_for(&ids).len(), 1);
    }
}
