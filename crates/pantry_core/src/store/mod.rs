//! Record store contract consumed by the coordinator.
//!
//! # Responsibility
//! - Define the request/response surface of the remote record store.
//! - Carry the caller credential on every call.
//!
//! # Invariants
//! - The core never assigns persistent ids; `create` returns the canonical row.
//! - Stores never receive provisional ids.
//!
//! Transport is unspecified: `MemoryStore` serves tests and demos,
//! `SqliteStore` persists to a local database file.

pub mod memory;
pub mod sqlite;

use crate::error::RemoteError;
use crate::model::record::{OwnerId, RawRecord, RecordId, RecordPatch};
use std::fmt::{Debug, Formatter};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Bearer credential issued by the auth collaborator.
///
/// The token is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a token; blank tokens are treated as no credential.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Fields for a record the store has not seen yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub owner_id: OwnerId,
}

/// Remote record store.
///
/// Futures are not required to be `Send`; the coordinator drives them on a
/// single-threaded scheduler.
#[allow(async_fn_in_trait)]
pub trait PantryStore {
    /// Lists every record owned by `owner_id`.
    async fn list(&self, credential: &Credential, owner_id: &OwnerId)
        -> RemoteResult<Vec<RawRecord>>;
    /// Creates one record and returns the stored row.
    async fn create(&self, credential: &Credential, record: &NewRecord)
        -> RemoteResult<RawRecord>;
    /// Applies a patch and returns the stored row.
    async fn update(
        &self,
        credential: &Credential,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> RemoteResult<RawRecord>;
    /// Deletes one record.
    async fn delete(&self, credential: &Credential, id: &RecordId) -> RemoteResult<()>;
}
