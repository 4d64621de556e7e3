//! Deduplicated, user-facing pantry rows.

use crate::model::key::ItemKey;
use crate::model::record::RecordId;
use serde::{Deserialize, Serialize};

/// Aggregate of every raw record sharing one normalized key.
///
/// Recomputed on every presentation pass; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalEntry {
    pub key: ItemKey,
    /// Name of the first member record in input order.
    pub display_name: String,
    /// Sum of member quantities.
    pub total_quantity: f64,
    /// First unit carried by any member, in input order.
    pub unit: Option<String>,
    /// Member record ids in input order; the first is the representative.
    pub member_ids: Vec<RecordId>,
}
