// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::RegistryError;
use resume_app::{CancelToken, RequestId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Cancel handles for every request that has been submitted and whose worker
/// has not yet finished.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    entries: Mutex<HashMap<RequestId, CancelToken>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: RequestId, token: CancelToken) -> Result<(), RegistryError> {
        let mut entries = self.entries();
        if entries.contains_key(&request_id) {
            return Err(RegistryError::Duplicate(request_id));
        }
        entries.insert(request_id, token);
        Ok(())
    }

    /// Fires the request's token. Unknown ids are ignored; returns whether a
    /// token was found.
    pub fn cancel(&self, request_id: RequestId) -> bool {
        match self.entries().get(&request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Fires every token but leaves the entries for their workers to remove.
    pub fn cancel_all(&self) -> usize {
        let entries = self.entries();
        for token in entries.values() {
            token.cancel();
        }
        entries.len()
    }

    pub fn unregister(&self, request_id: RequestId) -> Result<CancelToken, RegistryError> {
        self.entries()
            .remove(&request_id)
            .ok_or(RegistryError::Unknown(request_id))
    }

    pub fn contains(&self, request_id: RequestId) -> bool {
        self.entries().contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, CancelToken>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
