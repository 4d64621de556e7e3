//! Error taxonomy shared by the coordinator and its callers.
//!
//! # Invariants
//! - `Validation` and `Unauthenticated` are raised before any state change.
//! - `Remote` is surfaced only after optimistic state was rolled back.
//! - `ConsistencyError` is informational: server state has already won, so
//!   it is reported by refresh and never returned as a failure.

use crate::db::DbError;
use crate::model::key::ItemKey;
use crate::model::record::RecordId;
use crate::model::validation::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PantryResult<T> = Result<T, PantryError>;

/// Failure reported by the record store or the transport in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Store answered with a non-success status.
    Rejected {
        status: Option<u16>,
        message: String,
    },
    /// Store has no record with the id.
    NotFound(RecordId),
    /// Store refused the credential.
    Unauthorized(String),
    /// Connection or storage backend failure.
    Transport(String),
    /// Call did not complete within the configured timeout.
    Timeout { after_ms: u64 },
}

impl RemoteError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: None,
            message: message.into(),
        }
    }

    /// Stable machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "remote_rejected",
            Self::NotFound(_) => "remote_not_found",
            Self::Unauthorized(_) => "remote_unauthorized",
            Self::Transport(_) => "remote_transport",
            Self::Timeout { .. } => "remote_timeout",
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected {
                status: Some(status),
                message,
            } => write!(f, "store rejected request ({status}): {message}"),
            Self::Rejected {
                status: None,
                message,
            } => write!(f, "store rejected request: {message}"),
            Self::NotFound(id) => write!(f, "store has no record `{id}`"),
            Self::Unauthorized(message) => write!(f, "store refused credential: {message}"),
            Self::Transport(message) => write!(f, "store unreachable: {message}"),
            Self::Timeout { after_ms } => write!(f, "store call timed out after {after_ms} ms"),
        }
    }
}

impl Error for RemoteError {}

impl From<DbError> for RemoteError {
    fn from(value: DbError) -> Self {
        if value.is_constraint_violation() {
            Self::rejected(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

impl From<rusqlite::Error> for RemoteError {
    fn from(value: rusqlite::Error) -> Self {
        DbError::from(value).into()
    }
}

/// A fetched key whose server rows disagree with local rows by id.
///
/// Resolved by keeping the server rows; reported for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyError {
    pub key: ItemKey,
    /// Local ids the server did not return.
    pub discarded_local: Vec<RecordId>,
    /// Server ids the local view did not know.
    pub adopted_remote: Vec<RecordId>,
}

impl Display for ConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "local view of `{}` diverged from store: discarded {} local, adopted {} remote",
            self.key,
            self.discarded_local.len(),
            self.adopted_remote.len()
        )
    }
}

impl Error for ConsistencyError {}

/// Umbrella error for coordinator operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PantryError {
    Validation(ValidationError),
    /// No credential is present; nothing was attempted.
    Unauthenticated,
    Remote(RemoteError),
}

impl PantryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated => "unauthenticated",
            Self::Remote(err) => err.code(),
        }
    }
}

impl Display for PantryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Unauthenticated => write!(f, "not signed in"),
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PantryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Unauthenticated => None,
            Self::Remote(err) => Some(err),
        }
    }
}

impl From<ValidationError> for PantryError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RemoteError> for PantryError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}
