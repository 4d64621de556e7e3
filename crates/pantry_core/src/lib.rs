//! Pantry consolidation and optimistic-mutation core.
//! This crate is the single source of truth for pantry invariants; views and
//! transports call into it.

pub mod config;
pub mod consolidate;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod recipes;
pub mod service;
pub mod store;

pub use config::{ConfigError, PantryConfig};
pub use consolidate::{display_names, group};
pub use error::{ConsistencyError, PantryError, PantryResult, RemoteError};
pub use ledger::{
    apply_addition, apply_removal, plan_removal, RecordOp, RemovalDecision, RemovalPlan,
};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::entry::LogicalEntry;
pub use model::key::{normalize, ItemKey};
pub use model::record::{OwnerId, RawRecord, RecordId, RecordPatch};
pub use model::validation::ValidationError;
pub use recipes::{empty_pantry_recipes, parse_recipes, recipe_prompt, Recipe};
pub use service::coordinator::{
    MutationCoordinator, MutationKind, MutationOutcome, MutationPhase, RefreshReport,
};
pub use store::{Credential, MemoryStore, NewRecord, PantryStore, SqliteStore};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
