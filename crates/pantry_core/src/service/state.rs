//! Coordinator-owned pantry state with per-key snapshots.
//!
//! # Responsibility
//! - Hold the ordered local view of raw records.
//! - Capture and restore immutable per-key snapshots for rollback.
//! - Reconcile fetched rows against in-flight and recently committed keys.
//!
//! # Invariants
//! - Slots stay sorted by their insertion order number.
//! - Restoring a snapshot rewrites only the snapshot's keys.
//! - A read older than the last applied read is never applied.
//! - Commit stamps are kept only while some open read predates them.

use crate::error::ConsistencyError;
use crate::model::key::{normalize, ItemKey};
use crate::model::record::{RawRecord, RecordId, RecordPatch};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    order: u64,
    key: Option<ItemKey>,
    record: RawRecord,
}

impl Slot {
    fn has_key(&self, keys: &[ItemKey]) -> bool {
        self.key.as_ref().is_some_and(|key| keys.contains(key))
    }
}

/// Immutable copy of every slot belonging to a set of keys.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    keys: Vec<ItemKey>,
    slots: Vec<Slot>,
}

/// Marker handed out when a read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTicket {
    generation: u64,
    revision: u64,
}

#[derive(Debug, Default)]
pub struct PantryState {
    slots: Vec<Slot>,
    next_order: u64,
    in_flight: HashMap<ItemKey, usize>,
    revision: u64,
    key_revisions: HashMap<ItemKey, u64>,
    reads_issued: u64,
    last_applied_read: u64,
    /// Tickets newer than the last applied read, oldest first.
    open_reads: VecDeque<ReadTicket>,
}

impl PantryState {
    pub fn records(&self) -> Vec<RawRecord> {
        self.slots.iter().map(|slot| slot.record.clone()).collect()
    }

    /// Records belonging to `key`, in view order.
    pub fn members(&self, key: &ItemKey) -> Vec<&RawRecord> {
        self.slots
            .iter()
            .filter(|slot| slot.key.as_ref() == Some(key))
            .map(|slot| &slot.record)
            .collect()
    }

    pub fn find(&self, id: &RecordId) -> Option<&RawRecord> {
        self.slots
            .iter()
            .find(|slot| &slot.record.id == id)
            .map(|slot| &slot.record)
    }

    pub fn snapshot(&self, keys: &[ItemKey]) -> KeySnapshot {
        KeySnapshot {
            keys: keys.to_vec(),
            slots: self
                .slots
                .iter()
                .filter(|slot| slot.has_key(keys))
                .cloned()
                .collect(),
        }
    }

    /// Puts the snapshot's keys back exactly as captured.
    pub fn restore(&mut self, snapshot: KeySnapshot) {
        let KeySnapshot { keys, slots } = snapshot;
        self.slots.retain(|slot| !slot.has_key(&keys));
        self.slots.extend(slots);
        self.slots.sort_by_key(|slot| slot.order);
    }

    pub fn insert(&mut self, record: RawRecord) {
        let order = self.take_order();
        self.slots.push(Slot {
            order,
            key: normalize(&record.name).ok(),
            record,
        });
    }

    /// Swaps the record with id `id` for `record`, keeping its position.
    pub fn replace(&mut self, id: &RecordId, record: RawRecord) -> bool {
        match self.slots.iter_mut().find(|slot| &slot.record.id == id) {
            Some(slot) => {
                slot.key = normalize(&record.name).ok();
                slot.record = record;
                true
            }
            None => false,
        }
    }

    pub fn patch(&mut self, id: &RecordId, patch: &RecordPatch) -> bool {
        match self.slots.iter_mut().find(|slot| &slot.record.id == id) {
            Some(slot) => {
                patch.apply_to(&mut slot.record);
                slot.key = normalize(&slot.record.name).ok();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &RecordId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| &slot.record.id != id);
        self.slots.len() != before
    }

    /// Marks `keys` as having an optimistic change in flight.
    pub fn begin_mutation(&mut self, keys: &[ItemKey]) {
        for key in keys {
            *self.in_flight.entry(key.clone()).or_insert(0) += 1;
        }
    }

    /// Clears the in-flight mark; committed mutations also stamp the keys so
    /// reads that started earlier do not overwrite them.
    pub fn finish_mutation(&mut self, keys: &[ItemKey], committed: bool) {
        for key in keys {
            if let Some(count) = self.in_flight.get_mut(key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.in_flight.remove(key);
                }
            }
        }
        if committed {
            self.revision += 1;
            for key in keys {
                self.key_revisions.insert(key.clone(), self.revision);
            }
            self.prune_key_revisions();
        }
    }

    pub fn begin_read(&mut self) -> ReadTicket {
        self.reads_issued += 1;
        let ticket = ReadTicket {
            generation: self.reads_issued,
            revision: self.revision,
        };
        self.open_reads.push_back(ticket);
        ticket
    }

    /// Merges a fetched record list into the local view.
    ///
    /// Returns `None` when a newer read was already applied. Keys with a
    /// mutation in flight, or committed after the read started, keep their
    /// local rows. Every other key takes the fetched rows; keys whose local
    /// ids disagreed with the fetched ids are reported.
    pub fn apply_read(
        &mut self,
        ticket: ReadTicket,
        fetched: Vec<RawRecord>,
    ) -> Option<Vec<ConsistencyError>> {
        if ticket.generation <= self.last_applied_read {
            return None;
        }
        self.last_applied_read = ticket.generation;

        let is_protected = |key: &Option<ItemKey>| match key {
            Some(key) => {
                self.in_flight.contains_key(key)
                    || self
                        .key_revisions
                        .get(key)
                        .is_some_and(|revision| *revision > ticket.revision)
            }
            None => false,
        };

        let mut remote: HashMap<RecordId, RawRecord> = HashMap::new();
        let mut remote_order = Vec::new();
        for record in fetched {
            remote_order.push(record.id.clone());
            remote.insert(record.id.clone(), record);
        }

        let mut local_ids_by_key: BTreeMap<ItemKey, Vec<RecordId>> = BTreeMap::new();
        for slot in &self.slots {
            if let Some(key) = &slot.key {
                local_ids_by_key
                    .entry(key.clone())
                    .or_default()
                    .push(slot.record.id.clone());
            }
        }

        let mut merged = Vec::with_capacity(self.slots.len());
        let mut seen = HashSet::new();
        for slot in std::mem::take(&mut self.slots) {
            if is_protected(&slot.key) {
                seen.insert(slot.record.id.clone());
                merged.push(slot);
                continue;
            }
            if let Some(record) = remote.get(&slot.record.id) {
                let key = normalize(&record.name).ok();
                if is_protected(&key) {
                    // Renamed remotely into a key we are still mutating.
                    continue;
                }
                seen.insert(slot.record.id.clone());
                merged.push(Slot {
                    order: slot.order,
                    key,
                    record: record.clone(),
                });
            }
        }

        let mut remote_ids_by_key: BTreeMap<ItemKey, Vec<RecordId>> = BTreeMap::new();
        for id in remote_order {
            let Some(record) = remote.remove(&id) else {
                continue;
            };
            let key = normalize(&record.name).ok();
            if let Some(key) = &key {
                remote_ids_by_key
                    .entry(key.clone())
                    .or_default()
                    .push(id.clone());
            }
            if is_protected(&key) || seen.contains(&id) {
                continue;
            }
            let order = self.next_order;
            self.next_order += 1;
            merged.push(Slot { order, key, record });
        }

        self.slots = merged;
        self.slots.sort_by_key(|slot| slot.order);

        let conflicts = local_ids_by_key
            .into_iter()
            .filter(|(key, _)| !is_protected(&Some(key.clone())))
            .filter_map(|(key, local_ids)| {
                let remote_ids = remote_ids_by_key.remove(&key).unwrap_or_default();
                let discarded_local: Vec<RecordId> = local_ids
                    .iter()
                    .filter(|id| !remote_ids.contains(id))
                    .cloned()
                    .collect();
                let adopted_remote: Vec<RecordId> = remote_ids
                    .iter()
                    .filter(|id| !local_ids.contains(id))
                    .cloned()
                    .collect();
                if discarded_local.is_empty() && adopted_remote.is_empty() {
                    None
                } else {
                    Some(ConsistencyError {
                        key,
                        discarded_local,
                        adopted_remote,
                    })
                }
            })
            .collect();

        self.prune_key_revisions();
        Some(conflicts)
    }

    /// Drops commit stamps no open read can be protected by.
    ///
    /// Tickets at or below the last applied read can never apply. A failed
    /// read stays open until a later read is applied.
    fn prune_key_revisions(&mut self) {
        let last_applied = self.last_applied_read;
        self.open_reads
            .retain(|ticket| ticket.generation > last_applied);
        match self.open_reads.front() {
            Some(oldest) => {
                let floor = oldest.revision;
                self.key_revisions.retain(|_, revision| *revision > floor);
            }
            None => self.key_revisions.clear(),
        }
    }

    fn take_order(&mut self) -> u64 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }
}

#[cfg(test)]
mod tests {
    use super::PantryState;
    use crate::model::key::normalize;
    use crate::model::record::{OwnerId, RawRecord, RecordId, RecordPatch};

    fn record(id: &str, name: &str, quantity: f64) -> RawRecord {
        RawRecord::new(RecordId::from(id), name, quantity, None, OwnerId::new("u"))
    }

    fn seeded() -> PantryState {
        let mut state = PantryState::default();
        state.insert(record("1", "Egg", 3.0));
        state.insert(record("2", "Milk", 1.0));
        state.insert(record("3", "egg", 2.0));
        state
    }

    #[test]
    fn restore_rewrites_only_snapshot_keys() {
        let mut state = seeded();
        let egg = normalize("egg").unwrap();
        let before = state.records();
        let snapshot = state.snapshot(&[egg.clone()]);

        state.remove(&RecordId::from("1"));
        state.patch(&RecordId::from("3"), &RecordPatch::quantity(9.0));
        state.restore(snapshot);
        assert_eq!(state.records(), before);
        assert_eq!(state.members(&egg).len(), 2);
    }

    #[test]
    fn restore_keeps_concurrent_changes_to_other_keys() {
        let mut state = seeded();
        let egg = normalize("egg").unwrap();
        let snapshot = state.snapshot(&[egg]);

        state.remove(&RecordId::from("1"));
        state.patch(&RecordId::from("2"), &RecordPatch::quantity(4.0));
        state.restore(snapshot);

        let milk = state.find(&RecordId::from("2")).unwrap();
        assert_eq!(milk.quantity, 4.0);
        assert!(state.find(&RecordId::from("1")).is_some());
    }

    #[test]
    fn superseded_reads_are_discarded() {
        let mut state = PantryState::default();
        let older = state.begin_read();
        let newer = state.begin_read();

        assert!(state
            .apply_read(newer, vec![record("1", "Egg", 1.0)])
            .is_some());
        assert!(state.apply_read(older, vec![]).is_none());
        assert_eq!(state.records().len(), 1);
    }

    #[test]
    fn read_keeps_keys_with_mutation_in_flight() {
        let mut state = seeded();
        let egg = normalize("egg").unwrap();
        state.begin_mutation(&[egg.clone()]);
        state.remove(&RecordId::from("1"));
        state.remove(&RecordId::from("3"));

        let ticket = state.begin_read();
        let conflicts = state
            .apply_read(
                ticket,
                vec![
                    record("1", "Egg", 3.0),
                    record("2", "Milk", 1.0),
                    record("3", "egg", 2.0),
                ],
            )
            .unwrap();
        assert!(conflicts.is_empty());
        assert!(state.members(&egg).is_empty());
    }

    #[test]
    fn read_started_before_commit_does_not_clobber_it() {
        let mut state = PantryState::default();
        let ticket = state.begin_read();

        let milk = normalize("milk").unwrap();
        state.begin_mutation(&[milk.clone()]);
        state.insert(record("7", "Milk", 1.0));
        state.finish_mutation(&[milk.clone()], true);

        state.apply_read(ticket, vec![]).unwrap();
        assert_eq!(state.members(&milk).len(), 1);
    }

    #[test]
    fn commit_stamps_are_dropped_once_no_older_read_is_open() {
        let mut state = PantryState::default();
        let milk = normalize("milk").unwrap();
        let egg = normalize("egg").unwrap();

        state.begin_mutation(&[egg.clone()]);
        state.finish_mutation(&[egg.clone()], true);
        assert!(state.key_revisions.is_empty());

        let ticket = state.begin_read();
        state.begin_mutation(&[milk.clone()]);
        state.insert(record("7", "Milk", 1.0));
        state.finish_mutation(&[milk.clone()], true);
        assert_eq!(state.key_revisions.len(), 1);

        let later = state.begin_read();
        state.apply_read(ticket, vec![]).unwrap();
        assert_eq!(state.members(&milk).len(), 1);
        assert!(state.key_revisions.is_empty());

        state
            .apply_read(later, vec![record("7", "Milk", 1.0)])
            .unwrap();
        assert!(state.open_reads.is_empty());
        assert!(state.key_revisions.is_empty());
    }

    #[test]
    fn unprotected_divergence_takes_server_rows_and_reports_it() {
        let mut state = seeded();
        let ticket = state.begin_read();
        let conflicts = state
            .apply_read(
                ticket,
                vec![record("2", "Milk", 5.0), record("9", "Egg", 1.0)],
            )
            .unwrap();

        let egg = normalize("egg").unwrap();
        let members: Vec<_> = state.members(&egg).iter().map(|r| r.id.clone()).collect();
        assert_eq!(members, vec![RecordId::from("9")]);
        assert_eq!(state.find(&RecordId::from("2")).unwrap().quantity, 5.0);

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, egg);
        assert_eq!(
            conflicts[0].discarded_local,
            vec![RecordId::from("1"), RecordId::from("3")]
        );
        assert_eq!(conflicts[0].adopted_remote, vec![RecordId::from("9")]);
    }

    #[test]
    fn initial_load_reports_no_conflicts() {
        let mut state = PantryState::default();
        let ticket = state.begin_read();
        let conflicts = state
            .apply_read(ticket, vec![record("1", "Egg", 1.0)])
            .unwrap();
        assert!(conflicts.is_empty());
        assert_eq!(state.records().len(), 1);
    }
}
