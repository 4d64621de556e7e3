//! In-process record store with fault injection.
//!
//! Assigns sequential integer ids and keeps rows in insertion order. Failures
//! and latency can be scheduled so callers can exercise rollback paths.

use super::{Credential, NewRecord, PantryStore, RemoteResult};
use crate::error::RemoteError;
use crate::model::record::{sanitize_quantity, OwnerId, RawRecord, RecordId, RecordPatch};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct MemoryState {
    records: Vec<RawRecord>,
    next_id: i64,
    scheduled_outcomes: VecDeque<Option<RemoteError>>,
    latency: Option<Duration>,
    required_token: Option<String>,
    calls: usize,
}

/// Record store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records`.
    ///
    /// Ids are kept; newly created rows get ids after the largest numeric id.
    pub fn with_records(records: Vec<RawRecord>) -> Self {
        let next_id = records
            .iter()
            .filter_map(|record| record.id.as_str().parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            state: Mutex::new(MemoryState {
                records,
                next_id,
                ..MemoryState::default()
            }),
        }
    }

    /// Makes the next unscripted call fail with `error`. Scripts queue up.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().scheduled_outcomes.push_back(Some(error));
    }

    /// Lets the next unscripted call through; used to place a failure later
    /// in a sequence of calls.
    pub fn succeed_next(&self) {
        self.lock().scheduled_outcomes.push_back(None);
    }

    /// Delays every call by `latency` before it touches state.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Rejects calls whose credential token differs from `token`.
    pub fn require_token(&self, token: impl Into<String>) {
        self.lock().required_token = Some(token.into());
    }

    /// Returns every stored row in insertion order.
    pub fn records(&self) -> Vec<RawRecord> {
        self.lock().records.clone()
    }

    /// Number of calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn begin_call(&self, credential: &Credential) -> RemoteResult<()> {
        let latency = {
            let mut state = self.lock();
            state.calls += 1;
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if let Some(Some(error)) = state.scheduled_outcomes.pop_front() {
            return Err(error);
        }
        if let Some(required) = &state.required_token {
            if required != credential.token() {
                return Err(RemoteError::Unauthorized("token not accepted".to_string()));
            }
        }
        Ok(())
    }
}

impl PantryStore for MemoryStore {
    async fn list(
        &self,
        credential: &Credential,
        owner_id: &OwnerId,
    ) -> RemoteResult<Vec<RawRecord>> {
        self.begin_call(credential).await?;
        Ok(self
            .lock()
            .records
            .iter()
            .filter(|record| &record.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create(&self, credential: &Credential, record: &NewRecord) -> RemoteResult<RawRecord> {
        self.begin_call(credential).await?;
        let mut state = self.lock();
        state.next_id += 1;
        let stored = RawRecord::new(
            RecordId::from(state.next_id),
            record.name.clone(),
            record.quantity,
            record.unit.clone(),
            record.owner_id.clone(),
        );
        state.records.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        credential: &Credential,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> RemoteResult<RawRecord> {
        self.begin_call(credential).await?;
        let mut state = self.lock();
        let record = state
            .records
            .iter_mut()
            .find(|record| &record.id == id)
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        patch.apply_to(record);
        record.quantity = sanitize_quantity(record.quantity);
        Ok(record.clone())
    }

    async fn delete(&self, credential: &Credential, id: &RecordId) -> RemoteResult<()> {
        self.begin_call(credential).await?;
        let mut state = self.lock();
        let before = state.records.len();
        state.records.retain(|record| &record.id != id);
        if state.records.len() == before {
            return Err(RemoteError::NotFound(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::error::RemoteError;
    use crate::model::record::{OwnerId, RecordId, RecordPatch};
    use crate::store::{Credential, NewRecord, PantryStore};

    fn credential() -> Credential {
        Credential::new("token").unwrap()
    }

    fn draft(name: &str, quantity: f64, owner: &str) -> NewRecord {
        NewRecord {
            name: name.to_string(),
            quantity,
            unit: None,
            owner_id: OwnerId::new(owner),
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids_and_filters_by_owner() {
        let store = MemoryStore::new();
        let first = store.create(&credential(), &draft("Egg", 2.0, "a")).await.unwrap();
        let second = store.create(&credential(), &draft("Milk", 1.0, "b")).await.unwrap();
        assert_eq!(first.id, RecordId::from(1));
        assert_eq!(second.id, RecordId::from(2));

        let owned = store.list(&credential(), &OwnerId::new("a")).await.unwrap();
        assert_eq!(owned, vec![first]);
    }

    #[tokio::test]
    async fn scheduled_failures_fire_once_in_order() {
        let store = MemoryStore::new();
        store.fail_next(RemoteError::Transport("down".to_string()));
        let err = store
            .create(&credential(), &draft("Egg", 1.0, "a"))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Transport("down".to_string()));
        assert!(store.records().is_empty());

        store.create(&credential(), &draft("Egg", 1.0, "a")).await.unwrap();
        assert_eq!(store.call_count(), 2);

        store.succeed_next();
        store.fail_next(RemoteError::rejected("nope"));
        store.list(&credential(), &OwnerId::new("a")).await.unwrap();
        assert!(store.list(&credential(), &OwnerId::new("a")).await.is_err());
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = MemoryStore::new();
        let missing = RecordId::from("404");
        assert!(matches!(
            store
                .update(&credential(), &missing, &RecordPatch::quantity(1.0))
                .await,
            Err(RemoteError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&credential(), &missing).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_unexpected_token() {
        let store = MemoryStore::new();
        store.require_token("right");
        let wrong = Credential::new("wrong").unwrap();
        assert!(matches!(
            store.list(&wrong, &OwnerId::new("a")).await,
            Err(RemoteError::Unauthorized(_))
        ));
    }
}
