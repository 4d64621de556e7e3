//! Canonical comparison keys for item names.
//!
//! # Invariants
//! - A key is the trimmed, lowercased name.
//! - User input never yields the empty key; only stored rows with blank
//!   names are grouped under it.
//! - `normalize(a) == normalize(b)` is the only identity test for names.

use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Normalized, case- and whitespace-insensitive item identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Normalizes caller input into a key.
    ///
    /// Accepts either a display name or an already normalized key, so
    /// `ItemKey::parse(" EGG ")` and `ItemKey::parse("egg")` agree.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        normalize(value)
    }

    /// Key shared by stored rows whose name is blank.
    pub(crate) fn blank() -> Self {
        ItemKey(String::new())
    }

    /// Key for a stored row's name; blank names map to [`ItemKey::blank`].
    pub(crate) fn for_stored_name(name: &str) -> Self {
        normalize(name).unwrap_or_else(|_| Self::blank())
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes the canonical key for an item name.
///
/// # Errors
/// - `ValidationError::EmptyName` when the trimmed name is empty.
pub fn normalize(name: &str) -> Result<ItemKey, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(ItemKey(trimmed.to_lowercase()))
}
