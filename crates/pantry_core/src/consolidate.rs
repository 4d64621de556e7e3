//! Grouping of raw pantry rows into logical entries.
//!
//! # Responsibility
//! - Merge rows that share a normalized key into one `LogicalEntry`.
//! - Produce a stable, display-ordered entry list.
//!
//! # Invariants
//! - Every record lands in exactly one entry; blank names share one entry
//!   under the blank key.
//! - Sum of `total_quantity` equals the sum of member quantities.
//! - `display_name` comes from the first member in input order; merging
//!   happens before sorting.

use crate::model::entry::LogicalEntry;
use crate::model::key::ItemKey;
use crate::model::record::{sanitize_quantity, RawRecord};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Groups `records` into deduplicated entries sorted by display name.
///
/// Never fails: non-finite or negative quantities count as zero and rows
/// whose name is blank are grouped together under the blank key.
pub fn group(records: &[RawRecord]) -> Vec<LogicalEntry> {
    let mut entries: Vec<LogicalEntry> = Vec::new();
    let mut slots = HashMap::new();

    for record in records {
        let key = ItemKey::for_stored_name(&record.name);
        let quantity = sanitize_quantity(record.quantity);

        match slots.get(&key).copied() {
            Some(slot) => {
                let entry: &mut LogicalEntry = &mut entries[slot];
                entry.total_quantity += quantity;
                entry.member_ids.push(record.id.clone());
                if entry.unit.is_none() {
                    entry.unit = record.unit.clone();
                }
            }
            None => {
                slots.insert(key.clone(), entries.len());
                entries.push(LogicalEntry {
                    key,
                    display_name: record.name.clone(),
                    total_quantity: quantity,
                    unit: record.unit.clone(),
                    member_ids: vec![record.id.clone()],
                });
            }
        }
    }

    entries.sort_by(compare_entries);
    entries
}

/// Returns distinct, non-blank display names in entry order.
///
/// This is the only input the recipe-suggestion collaborator receives.
pub fn display_names(entries: &[LogicalEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|entry| !entry.key.is_blank())
        .filter(|entry| seen.insert(entry.display_name.clone()))
        .map(|entry| entry.display_name.clone())
        .collect()
}

/// Finds the entry for `key` in a grouping result.
pub fn find_entry<'a>(entries: &'a [LogicalEntry], key: &str) -> Option<&'a LogicalEntry> {
    entries.iter().find(|entry| entry.key.as_str() == key)
}

fn compare_entries(left: &LogicalEntry, right: &LogicalEntry) -> Ordering {
    compare_display_names(&left.display_name, &right.display_name)
        .then_with(|| left.key.cmp(&right.key))
}

/// Collation-style comparison: case-folded text first, then lowercase before
/// uppercase for otherwise equal names.
pub fn compare_display_names(left: &str, right: &str) -> Ordering {
    let folded_left = left.trim().to_lowercase();
    let folded_right = right.trim().to_lowercase();
    folded_left
        .cmp(&folded_right)
        .then_with(|| right.trim().cmp(left.trim()))
}
