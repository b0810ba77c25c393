//! Typed repository over a [`KvStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::kv::{KvStore, MemoryKv, Namespaced};
use crate::list::{Upsert, upsert_by};
use crate::locks::{KeyGuard, KeyLocks};
use crate::records::{ActiveError, CardMapping, RoutingRule, UserMapping};

/// Reads and writes every record the engine persists.
///
/// Absent keys read as empty lists or `None`. A record that exists but does
/// not decode is reported as [`StoreError::Corrupt`] rather than treated as
/// empty, so a bad write never silently wipes a list on the next upsert.
#[derive(Clone)]
pub struct CardStore {
    kv: Arc<dyn KvStore>,
    locks: KeyLocks,
}

impl CardStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            locks: KeyLocks::new(),
        }
    }

    /// Namespaced in-memory store.
    pub fn in_memory(namespace: &str) -> Self {
        Self::new(Arc::new(Namespaced::new(MemoryKv::new(), namespace)))
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key).await? {
            None => Ok(None),
            Some(bytes) if bytes.is_empty() => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.kv.set(key, bytes).await
    }

    pub async fn routing_rules(&self) -> Result<Vec<RoutingRule>> {
        Ok(self.load(keys::ROUTING_RULES).await?.unwrap_or_default())
    }

    pub async fn save_routing_rules(&self, rules: &[RoutingRule]) -> Result<()> {
        let _guard = self.locks.lock(keys::ROUTING_RULES).await;
        self.save(keys::ROUTING_RULES, rules).await
    }

    pub async fn user_mappings(&self) -> Result<Vec<UserMapping>> {
        Ok(self.load(keys::USER_MAPPINGS).await?.unwrap_or_default())
    }

    pub async fn save_user_mappings(&self, mappings: &[UserMapping]) -> Result<()> {
        let _guard = self.locks.lock(keys::USER_MAPPINGS).await;
        self.save(keys::USER_MAPPINGS, mappings).await
    }

    pub async fn card_mapping(
        &self,
        project_id: &str,
        error_id: &str,
    ) -> Result<Option<CardMapping>> {
        self.load(&keys::card_mapping_key(project_id, error_id)).await
    }

    pub async fn save_card_mapping(&self, mapping: &CardMapping) -> Result<()> {
        let key = keys::card_mapping_key(&mapping.project_id, &mapping.error_id);
        self.save(&key, mapping).await
    }

    /// Exclusive access to one error's card for a whole read-create-persist
    /// or read-update sequence.
    pub async fn lock_card(&self, project_id: &str, error_id: &str) -> KeyGuard {
        self.locks
            .lock(&keys::card_mapping_key(project_id, error_id))
            .await
    }

    pub async fn active_errors(&self) -> Result<Vec<ActiveError>> {
        Ok(self.load(keys::ACTIVE_ERRORS).await?.unwrap_or_default())
    }

    pub async fn save_active_errors(&self, entries: &[ActiveError]) -> Result<()> {
        let _guard = self.locks.lock(keys::ACTIVE_ERRORS).await;
        self.save(keys::ACTIVE_ERRORS, entries).await
    }

    /// Register an error, replacing the entry for the same project/error pair.
    pub async fn upsert_active_error(&self, entry: ActiveError) -> Result<Upsert> {
        let _guard = self.locks.lock(keys::ACTIVE_ERRORS).await;
        let mut entries: Vec<ActiveError> = self
            .load(keys::ACTIVE_ERRORS)
            .await?
            .unwrap_or_default();
        let outcome = upsert_by(&mut entries, entry, ActiveError::same_error);
        self.save(keys::ACTIVE_ERRORS, &entries).await?;
        debug!(entries = entries.len(), ?outcome, "Active error registry updated");
        Ok(outcome)
    }

    /// Stamp `last_synced_at` on the given project/error pairs. Returns how
    /// many entries were updated; pairs no longer registered are ignored.
    pub async fn touch_active_errors(
        &self,
        synced: &[(String, String)],
        at: DateTime<Utc>,
    ) -> Result<usize> {
        if synced.is_empty() {
            return Ok(0);
        }
        let _guard = self.locks.lock(keys::ACTIVE_ERRORS).await;
        let mut entries: Vec<ActiveError> = self
            .load(keys::ACTIVE_ERRORS)
            .await?
            .unwrap_or_default();

        let mut touched = 0;
        for entry in entries.iter_mut() {
            let hit = synced
                .iter()
                .any(|(p, e)| *p == entry.project_id && *e == entry.error_id);
            if hit {
                entry.last_synced_at = Some(at);
                touched += 1;
            }
        }
        if touched > 0 {
            self.save(keys::ACTIVE_ERRORS, &entries).await?;
        }
        Ok(touched)
    }
}
