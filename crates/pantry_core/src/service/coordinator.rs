//! Optimistic mutation coordinator.
//!
//! # Responsibility
//! - Apply add/remove/update intents to the local view before the store
//!   confirms them.
//! - Commit the store's canonical rows on success, restore the exact prior
//!   per-key snapshot on failure.
//! - Serialize mutations per normalized key; reconcile reads against
//!   in-flight mutations.
//!
//! # Invariants
//! - Validation and auth failures never touch local state or the store.
//! - A failed mutation leaves the touched keys identical to their snapshot.
//! - Each mutation moves `Requested -> OptimisticApplied -> Committed` or
//!   `-> RolledBack`.
//! - No automatic retries; timeouts count as remote failures.

use crate::config::PantryConfig;
use crate::consolidate::{display_names, find_entry, group};
use crate::error::{ConsistencyError, PantryError, PantryResult, RemoteError};
use crate::ledger::{apply_addition, plan_removal, RecordOp, RemovalDecision};
use crate::model::entry::LogicalEntry;
use crate::model::key::{normalize, ItemKey};
use crate::model::record::{OwnerId, RawRecord, RecordId, RecordPatch};
use crate::model::validation::{validate_positive, ValidationError};
use crate::service::keyed_queue::KeyedQueue;
use crate::service::state::{KeySnapshot, PantryState};
use crate::store::{Credential, NewRecord, PantryStore, RemoteResult};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lifecycle of one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Requested,
    OptimisticApplied,
    Committed,
    RolledBack,
}

impl MutationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::OptimisticApplied => "optimistic_applied",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Remove,
    UpdateFields,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::UpdateFields => "update_fields",
        }
    }
}

/// Result of a committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub kind: MutationKind,
    /// Key the mutation targeted (the new key for renames).
    pub key: ItemKey,
    /// Always `Committed`; failures surface as errors.
    pub phase: MutationPhase,
    /// Entry-level decision for removals.
    pub removal: Option<RemovalDecision>,
    /// Entry for `key` after commit; `None` once its last record is gone.
    pub entry: Option<LogicalEntry>,
}

/// Result of a read pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// `false` when a newer read had already been applied.
    pub applied: bool,
    /// Keys where fetched rows replaced a diverging local view.
    pub conflicts: Vec<ConsistencyError>,
}

enum PendingAdd {
    Merge { id: RecordId, patch: RecordPatch },
    Insert { id: RecordId, record: NewRecord },
}

/// Owns the local pantry view and drives every mutation against a store.
pub struct MutationCoordinator<S> {
    store: S,
    owner_id: OwnerId,
    remote_timeout: Duration,
    credential: Mutex<Option<Credential>>,
    state: Mutex<PantryState>,
    queue: KeyedQueue,
}

impl<S: PantryStore> MutationCoordinator<S> {
    pub fn new(store: S, owner_id: OwnerId, remote_timeout: Duration) -> Self {
        Self {
            store,
            owner_id,
            remote_timeout,
            credential: Mutex::new(None),
            state: Mutex::new(PantryState::default()),
            queue: KeyedQueue::new(),
        }
    }

    pub fn from_config(store: S, config: &PantryConfig) -> Self {
        Self::new(store, config.owner(), config.remote_timeout())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Attaches the credential sent with every store call.
    pub fn sign_in(&self, credential: Credential) {
        *self.lock_credential() = Some(credential);
        info!("event=sign_in module=coordinator status=ok");
    }

    /// Drops the credential; later calls fail with `Unauthenticated`.
    pub fn sign_out(&self) {
        *self.lock_credential() = None;
        info!("event=sign_out module=coordinator status=ok");
    }

    pub fn is_signed_in(&self) -> bool {
        self.lock_credential().is_some()
    }

    /// Current raw records, including optimistic ones, in view order.
    pub fn records(&self) -> Vec<RawRecord> {
        self.lock_state().records()
    }

    /// Current logical entries sorted by display name.
    pub fn entries(&self) -> Vec<LogicalEntry> {
        group(&self.records())
    }

    /// Distinct display names handed to the recipe collaborator.
    pub fn display_names(&self) -> Vec<String> {
        display_names(&self.entries())
    }

    /// Fetches the owner's records and reconciles them with the local view.
    ///
    /// # Errors
    /// - `Unauthenticated` without a credential.
    /// - `Remote` when listing fails; local state is untouched.
    pub async fn refresh(&self) -> PantryResult<RefreshReport> {
        let credential = self.require_credential()?;
        let started_at = Instant::now();
        let ticket = self.lock_state().begin_read();

        let fetched = match self
            .call(self.store.list(&credential, &self.owner_id))
            .await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(
                    "event=pantry_refresh module=coordinator status=error duration_ms={} error_code={}",
                    started_at.elapsed().as_millis(),
                    err.code()
                );
                return Err(err.into());
            }
        };
        let fetched_count = fetched.len();

        let mut state = self.lock_state();
        let Some(conflicts) = state.apply_read(ticket, fetched) else {
            debug!("event=pantry_refresh module=coordinator status=superseded");
            return Ok(RefreshReport::default());
        };
        for conflict in &conflicts {
            warn!(
                "event=pantry_refresh module=coordinator status=conflict discarded_local={} adopted_remote={}",
                conflict.discarded_local.len(),
                conflict.adopted_remote.len()
            );
        }
        info!(
            "event=pantry_refresh module=coordinator status=ok records={} conflicts={} duration_ms={}",
            fetched_count,
            conflicts.len(),
            started_at.elapsed().as_millis()
        );
        Ok(RefreshReport {
            applied: true,
            conflicts,
        })
    }

    /// Adds stock for `name`, merging into the existing entry for its key.
    ///
    /// An existing entry grows through its representative record; otherwise
    /// a provisional record is inserted and swapped for the created row.
    pub async fn add(
        &self,
        name: &str,
        quantity: f64,
        unit: Option<&str>,
    ) -> PantryResult<MutationOutcome> {
        let key = normalize(name)?;
        let amount = validate_positive(quantity)?;
        let unit = unit
            .map(str::trim)
            .filter(|unit| !unit.is_empty())
            .map(str::to_string);
        let credential = self.require_credential()?;
        let started_at = Instant::now();
        log_phase(MutationKind::Add, MutationPhase::Requested);

        let keys = [key.clone()];
        let _guard = self.queue.acquire_all(&keys).await;

        let (snapshot, pending) = {
            let mut state = self.lock_state();
            let snapshot = state.snapshot(&keys);
            let representative = state.members(&key).first().map(|record| (*record).clone());
            let pending = match representative {
                Some(existing) => {
                    let patch = RecordPatch {
                        name: None,
                        quantity: Some(apply_addition(Some(existing.quantity), amount)?),
                        unit: match (&existing.unit, &unit) {
                            (None, Some(unit)) => Some(Some(unit.clone())),
                            _ => None,
                        },
                    };
                    state.patch(&existing.id, &patch);
                    PendingAdd::Merge {
                        id: existing.id,
                        patch,
                    }
                }
                None => {
                    let quantity = apply_addition(None, amount)?;
                    let provisional = RawRecord::new(
                        RecordId::provisional(),
                        name.trim(),
                        quantity,
                        unit.clone(),
                        self.owner_id.clone(),
                    );
                    let record = NewRecord {
                        name: provisional.name.clone(),
                        quantity,
                        unit,
                        owner_id: self.owner_id.clone(),
                    };
                    let id = provisional.id.clone();
                    state.insert(provisional);
                    PendingAdd::Insert { id, record }
                }
            };
            state.begin_mutation(&keys);
            (snapshot, pending)
        };
        log_phase(MutationKind::Add, MutationPhase::OptimisticApplied);

        let (local_id, result) = match pending {
            PendingAdd::Merge { id, patch } => {
                let result = self
                    .call(self.store.update(&credential, &id, &patch))
                    .await;
                (id, result)
            }
            PendingAdd::Insert { id, record } => {
                let result = self.call(self.store.create(&credential, &record)).await;
                (id, result)
            }
        };

        match result {
            Ok(stored) => Ok(self.commit(
                MutationKind::Add,
                &key,
                &keys,
                vec![(local_id, Some(stored))],
                None,
                started_at,
            )),
            Err(err) => Err(self.roll_back(MutationKind::Add, &keys, snapshot, err, started_at)),
        }
    }

    /// Removes `delta` from the entry for `key`.
    ///
    /// `key` may be a display name; it is normalized first. Overshooting
    /// deletes every member record.
    pub async fn remove(&self, key: &str, delta: f64) -> PantryResult<MutationOutcome> {
        let key = ItemKey::parse(key)?;
        let delta = validate_positive(delta)?;
        let credential = self.require_credential()?;
        let started_at = Instant::now();
        log_phase(MutationKind::Remove, MutationPhase::Requested);

        let keys = [key.clone()];
        let _guard = self.queue.acquire_all(&keys).await;

        let (snapshot, plan) = {
            let mut state = self.lock_state();
            let members = state.members(&key);
            if members.is_empty() {
                return Err(ValidationError::UnknownKey(key).into());
            }
            let plan = plan_removal(&members, delta)?;
            let snapshot = state.snapshot(&keys);
            for op in &plan.ops {
                match op {
                    RecordOp::Update { id, quantity } => {
                        state.patch(id, &RecordPatch::quantity(*quantity));
                    }
                    RecordOp::Delete { id } => {
                        state.remove(id);
                    }
                }
            }
            state.begin_mutation(&keys);
            (snapshot, plan)
        };
        log_phase(MutationKind::Remove, MutationPhase::OptimisticApplied);

        let mut writes = Vec::with_capacity(plan.ops.len());
        for (index, op) in plan.ops.iter().enumerate() {
            let result = match op {
                RecordOp::Update { id, quantity } => self
                    .call(
                        self.store
                            .update(&credential, id, &RecordPatch::quantity(*quantity)),
                    )
                    .await
                    .map(Some),
                RecordOp::Delete { id } => self
                    .call(self.store.delete(&credential, id))
                    .await
                    .map(|()| None),
            };
            match result {
                Ok(stored) => writes.push((op.id().clone(), stored)),
                Err(err) => {
                    if index > 0 {
                        warn!(
                            "event=pantry_mutation module=coordinator kind=remove status=partial_remote applied_ops={} total_ops={}",
                            index,
                            plan.ops.len()
                        );
                    }
                    return Err(self.roll_back(
                        MutationKind::Remove,
                        &keys,
                        snapshot,
                        err,
                        started_at,
                    ));
                }
            }
        }

        Ok(self.commit(
            MutationKind::Remove,
            &key,
            &keys,
            writes,
            Some(plan.decision),
            started_at,
        ))
    }

    /// Changes mutable fields (name, quantity, unit) of one record.
    ///
    /// Renames lock both the old and the new key.
    pub async fn update_fields(
        &self,
        id: &RecordId,
        patch: RecordPatch,
    ) -> PantryResult<MutationOutcome> {
        let patch = validate_patch(patch)?;
        let credential = self.require_credential()?;
        let started_at = Instant::now();
        log_phase(MutationKind::UpdateFields, MutationPhase::Requested);

        let (target_key, keys, snapshot, _guard) = loop {
            let current_key = self.key_of(id)?;
            let target_key = match &patch.name {
                Some(name) => normalize(name)?,
                None => current_key.clone().ok_or(ValidationError::EmptyName)?,
            };
            let mut keys: Vec<ItemKey> = current_key.iter().cloned().collect();
            if !keys.contains(&target_key) {
                keys.push(target_key.clone());
            }

            let guard = self.queue.acquire_all(&keys).await;
            let mut state = self.lock_state();
            let Some(record) = state.find(id) else {
                return Err(ValidationError::UnknownRecord(id.clone()).into());
            };
            if normalize(&record.name).ok() != current_key {
                // Renamed while we waited; lock the new key set instead.
                continue;
            }
            let snapshot = state.snapshot(&keys);
            state.patch(id, &patch);
            state.begin_mutation(&keys);
            break (target_key, keys, snapshot, guard);
        };
        log_phase(MutationKind::UpdateFields, MutationPhase::OptimisticApplied);

        match self.call(self.store.update(&credential, id, &patch)).await {
            Ok(stored) => Ok(self.commit(
                MutationKind::UpdateFields,
                &target_key,
                &keys,
                vec![(id.clone(), Some(stored))],
                None,
                started_at,
            )),
            Err(err) => Err(self.roll_back(
                MutationKind::UpdateFields,
                &keys,
                snapshot,
                err,
                started_at,
            )),
        }
    }

    async fn call<T>(&self, request: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match tokio::time::timeout(self.remote_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout {
                after_ms: u64::try_from(self.remote_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Swaps local rows for the store's canonical rows and closes the
    /// mutation. `None` means the store deleted the row.
    fn commit(
        &self,
        kind: MutationKind,
        key: &ItemKey,
        keys: &[ItemKey],
        writes: Vec<(RecordId, Option<RawRecord>)>,
        removal: Option<RemovalDecision>,
        started_at: Instant,
    ) -> MutationOutcome {
        let mut state = self.lock_state();
        for (local_id, stored) in writes {
            match stored {
                Some(record) => {
                    if !state.replace(&local_id, record.clone()) {
                        state.insert(record);
                    }
                }
                None => {
                    state.remove(&local_id);
                }
            }
        }
        state.finish_mutation(keys, true);
        let members: Vec<RawRecord> = state.members(key).into_iter().cloned().collect();
        drop(state);

        info!(
            "event=pantry_mutation module=coordinator kind={} phase={} members={} duration_ms={}",
            kind.as_str(),
            MutationPhase::Committed.as_str(),
            members.len(),
            started_at.elapsed().as_millis()
        );
        MutationOutcome {
            kind,
            key: key.clone(),
            phase: MutationPhase::Committed,
            removal,
            entry: find_entry(&group(&members), key.as_str()).cloned(),
        }
    }

    fn roll_back(
        &self,
        kind: MutationKind,
        keys: &[ItemKey],
        snapshot: KeySnapshot,
        error: RemoteError,
        started_at: Instant,
    ) -> PantryError {
        let mut state = self.lock_state();
        state.restore(snapshot);
        state.finish_mutation(keys, false);
        drop(state);

        warn!(
            "event=pantry_mutation module=coordinator kind={} phase={} duration_ms={} error_code={}",
            kind.as_str(),
            MutationPhase::RolledBack.as_str(),
            started_at.elapsed().as_millis(),
            error.code()
        );
        PantryError::Remote(error)
    }

    fn key_of(&self, id: &RecordId) -> PantryResult<Option<ItemKey>> {
        let state = self.lock_state();
        let record = state
            .find(id)
            .ok_or_else(|| ValidationError::UnknownRecord(id.clone()))?;
        Ok(normalize(&record.name).ok())
    }

    fn require_credential(&self) -> PantryResult<Credential> {
        self.lock_credential()
            .clone()
            .ok_or(PantryError::Unauthenticated)
    }

    fn lock_state(&self) -> MutexGuard<'_, PantryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_credential(&self) -> MutexGuard<'_, Option<Credential>> {
        self.credential.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_phase(kind: MutationKind, phase: MutationPhase) {
    debug!(
        "event=pantry_mutation module=coordinator kind={} phase={}",
        kind.as_str(),
        phase.as_str()
    );
}

/// Trims and validates patch fields; rejects empty patches.
fn validate_patch(patch: RecordPatch) -> Result<RecordPatch, ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }
    let name = match patch.name {
        Some(name) => {
            normalize(&name)?;
            Some(name.trim().to_string())
        }
        None => None,
    };
    let quantity = patch.quantity.map(validate_positive).transpose()?;
    let unit = patch.unit.map(|unit| {
        unit.map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    });
    Ok(RecordPatch {
        name,
        quantity,
        unit,
    })
}
