//! Mutation orchestration over the record store.
//!
//! # Responsibility
//! - Own the local pantry view and its rollback snapshots.
//! - Keep callers decoupled from store transport details.

pub mod coordinator;
pub mod keyed_queue;
pub mod state;
