//! Quantity decisions for a single logical entry.
//!
//! # Responsibility
//! - Decide the outcome of additions and removals without touching state.
//! - Split a removal across the member records of one entry.
//!
//! # Invariants
//! - Amounts are validated before any decision is produced.
//! - A removal never yields a negative quantity; reaching zero deletes.

use crate::model::record::{RawRecord, RecordId};
use crate::model::validation::{validate_positive, ValidationError};

/// Remainders no larger than this fraction of the operands are rounding
/// residue and count as fully consumed.
const RESIDUE_RATIO: f64 = 1e-12;

/// Outcome of removing stock from an entry or record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemovalDecision {
    /// Keep the row with the new, strictly positive quantity.
    Update(f64),
    /// Remove the row entirely.
    Delete,
}

/// One record-level write produced by a removal plan.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOp {
    Update { id: RecordId, quantity: f64 },
    Delete { id: RecordId },
}

impl RecordOp {
    pub fn id(&self) -> &RecordId {
        match self {
            Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// Entry-level decision plus the record writes that realize it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalPlan {
    pub decision: RemovalDecision,
    pub ops: Vec<RecordOp>,
}

/// Decides the result of removing `delta` from `current_quantity`.
///
/// Overshooting deletes rather than rejecting.
///
/// # Errors
/// - `ValidationError::NonPositiveQuantity` when `delta` is not positive.
pub fn apply_removal(current_quantity: f64, delta: f64) -> Result<RemovalDecision, ValidationError> {
    let delta = validate_positive(delta)?;
    Ok(decide_removal(current_quantity, delta))
}

/// Computes the quantity after adding `amount` to an existing entry, or the
/// initial quantity of a fresh record when `existing_quantity` is `None`.
///
/// # Errors
/// - `ValidationError::NonPositiveQuantity` when `amount` is not positive.
/// - `ValidationError::QuantityOverflow` when the sum is not finite.
pub fn apply_addition(
    existing_quantity: Option<f64>,
    amount: f64,
) -> Result<f64, ValidationError> {
    let amount = validate_positive(amount)?;
    let total = match existing_quantity {
        Some(existing) => existing.max(0.0) + amount,
        None => amount,
    };
    if !total.is_finite() {
        return Err(ValidationError::QuantityOverflow);
    }
    Ok(total)
}

/// Splits a removal of `delta` over `members` in member order.
///
/// Each member absorbs as much of the remaining delta as it holds; fully
/// consumed members are deleted, the first partially consumed member is
/// updated and later members are left alone. When the entry-level decision is
/// `Delete`, every member is deleted.
pub fn plan_removal(members: &[&RawRecord], delta: f64) -> Result<RemovalPlan, ValidationError> {
    let delta = validate_positive(delta)?;
    let total: f64 = members.iter().map(|record| record.quantity).sum();
    let decision = decide_removal(total, delta);

    let ops = match decision {
        RemovalDecision::Delete => members
            .iter()
            .map(|record| RecordOp::Delete {
                id: record.id.clone(),
            })
            .collect(),
        RemovalDecision::Update(_) => {
            let mut remaining = delta;
            let mut ops = Vec::new();
            for record in members {
                if is_residue(remaining, delta) {
                    break;
                }
                match decide_removal(record.quantity, remaining) {
                    RemovalDecision::Delete => {
                        remaining -= record.quantity;
                        ops.push(RecordOp::Delete {
                            id: record.id.clone(),
                        });
                    }
                    RemovalDecision::Update(quantity) => {
                        remaining = 0.0;
                        ops.push(RecordOp::Update {
                            id: record.id.clone(),
                            quantity,
                        });
                    }
                }
            }
            ops
        }
    };

    Ok(RemovalPlan { decision, ops })
}

fn decide_removal(current_quantity: f64, delta: f64) -> RemovalDecision {
    let next = current_quantity - delta;
    if next > 0.0 && !is_residue(next, current_quantity.abs().max(delta)) {
        RemovalDecision::Update(next)
    } else {
        RemovalDecision::Delete
    }
}

fn is_residue(value: f64, scale: f64) -> bool {
    value <= scale * RESIDUE_RATIO
}
