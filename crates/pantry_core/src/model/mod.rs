//! Pantry domain model.
//!
//! # Responsibility
//! - Define raw persisted rows and the derived logical entries built on them.
//! - Own name normalization and input validation rules.
//!
//! # Invariants
//! - A `RawRecord` quantity is never negative.
//! - `LogicalEntry` is derived; it has no persistent identity of its own.
//! - Two names denote the same ingredient iff their `ItemKey`s are equal.

pub mod entry;
pub mod key;
pub mod record;
pub mod validation;
