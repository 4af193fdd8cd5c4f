//! In-process repository state store.
//!
//! The outer map lock is only held long enough to clone an `Arc` to the
//! per-repository mutex, so writers of different repositories never wait on
//! each other while writers of the same repository are serialized.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::repository::{normalize_repo_url, Credential, Registration, RepositoryState};
use crate::storage_traits::{RepositoryStateStore, StateMutator, StoreResult};

type Slot = Arc<Mutex<RepositoryState>>;

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: RwLock<HashMap<String, Slot>>,
    credentials: RwLock<HashMap<String, Credential>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &str) -> Option<Slot> {
        self.records.read().await.get(key).cloned()
    }
}

#[async_trait]
impl RepositoryStateStore for MemoryStateStore {
    async fn get(&self, url: &str) -> StoreResult<Option<RepositoryState>> {
        let key = normalize_repo_url(url);
        match self.slot(&key).await {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn register(&self, registration: Registration) -> StoreResult<RepositoryState> {
        let key = normalize_repo_url(&registration.url);
        let fresh = RepositoryState::new(&registration);

        if let Some(credential) = registration.credential {
            self.credentials
                .write()
                .await
                .insert(key.clone(), credential);
        }

        let existing = {
            let mut records = self.records.write().await;
            match records.get(&key) {
                Some(slot) => Some(Arc::clone(slot)),
                None => {
                    records.insert(key.clone(), Arc::new(Mutex::new(fresh.clone())));
                    None
                }
            }
        };

        if let Some(slot) = existing {
            debug!(url = %key, "overwriting existing repository registration");
            *slot.lock().await = fresh.clone();
        }
        Ok(fresh)
    }

    async fn update(&self, url: &str, mutator: StateMutator) -> StoreResult<RepositoryState> {
        let key = normalize_repo_url(url);
        let slot = self
            .slot(&key)
            .await
            .ok_or(StoreError::NotRegistered { url: key })?;
        let mut state = slot.lock().await;
        mutator(&mut *state);
        Ok(state.clone())
    }

    async fn credential(&self, url: &str) -> StoreResult<Option<Credential>> {
        let key = normalize_repo_url(url);
        Ok(self.credentials.read().await.get(&key).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<RepositoryState>> {
        let slots: Vec<(String, Slot)> = {
            let records = self.records.read().await;
            records
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect()
        };
        let mut out = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            out.push(slot.lock().await.clone());
        }
        out.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(out)
    }
}
