//! Raw pantry rows as persisted by the record store.
//!
//! # Responsibility
//! - Define the persisted row shape and its opaque identifiers.
//! - Decode loosely typed store payloads without failing on bad quantities.
//!
//! # Invariants
//! - `RawRecord::quantity` is finite and `>= 0` once decoded.
//! - Provisional ids are minted only by the coordinator and never persisted.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const PROVISIONAL_PREFIX: &str = "local-";

/// Opaque record identifier assigned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a local placeholder id for an optimistic insert.
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()))
    }

    /// Returns whether this id was minted locally and is unknown to the store.
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Stores in the wild emit either integer or string ids.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match WireId::deserialize(deserializer)? {
            WireId::Text(value) => Self(value),
            WireId::Signed(value) => Self(value.to_string()),
            WireId::Unsigned(value) => Self(value.to_string()),
        })
    }
}

/// Opaque owner identifier; every record belongs to exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One persisted pantry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: RecordId,
    /// Name as typed by the user; `item` is accepted on decode.
    #[serde(alias = "item")]
    pub name: String,
    /// Non-numeric, missing or negative quantities decode as `0`.
    #[serde(default, deserialize_with = "deserialize_lenient_quantity")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub unit: Option<String>,
    #[serde(alias = "ownerId", alias = "user_id")]
    pub owner_id: OwnerId,
}

impl RawRecord {
    pub fn new(
        id: RecordId,
        name: impl Into<String>,
        quantity: f64,
        unit: Option<String>,
        owner_id: OwnerId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            quantity: sanitize_quantity(quantity),
            unit,
            owner_id,
        }
    }
}

/// Mutable-field patch for a single record.
///
/// `unit: Some(None)` clears the unit; `unit: None` leaves it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Option<String>>,
}

impl RecordPatch {
    pub fn quantity(quantity: f64) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none() && self.unit.is_none()
    }

    /// Applies present fields onto `record` in place.
    pub fn apply_to(&self, record: &mut RawRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(quantity) = self.quantity {
            record.quantity = sanitize_quantity(quantity);
        }
        if let Some(unit) = &self.unit {
            record.unit = unit.clone();
        }
    }
}

/// Coerces a quantity into the stored domain: finite and non-negative.
pub fn sanitize_quantity(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn deserialize_lenient_quantity<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match value {
        serde_json::Value::Number(number) => number.as_f64().unwrap_or(0.0),
        serde_json::Value::String(text) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(sanitize_quantity(parsed))
}

fn deserialize_blank_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|unit| !unit.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::{RawRecord, RecordId, RecordPatch};
    use serde_json::json;

    #[test]
    fn provisional_ids_are_marked_and_unique() {
        let first = RecordId::provisional();
        let second = RecordId::provisional();
        assert!(first.is_provisional());
        assert_ne!(first, second);
        assert!(!RecordId::from(7).is_provisional());
    }

    #[test]
    fn decodes_store_payload_with_numeric_id_and_item_alias() {
        let record: RawRecord = serde_json::from_value(json!({
            "id": 12,
            "item": "Flour",
            "quantity": "2.5",
            "unit": "",
            "ownerId": "u-1"
        }))
        .unwrap();
        assert_eq!(record.id.as_str(), "12");
        assert_eq!(record.name, "Flour");
        assert_eq!(record.quantity, 2.5);
        assert_eq!(record.unit, None);
        assert_eq!(record.owner_id.as_str(), "u-1");
    }

    #[test]
    fn non_numeric_or_missing_quantity_decodes_as_zero() {
        for quantity in [json!("lots"), json!(null), json!(-4), json!({"n": 1})] {
            let record: RawRecord = serde_json::from_value(json!({
                "id": "a",
                "name": "Salt",
                "quantity": quantity,
                "owner_id": "u"
            }))
            .unwrap();
            assert_eq!(record.quantity, 0.0);
        }

        let missing: RawRecord = serde_json::from_value(json!({
            "id": "b",
            "name": "Pepper",
            "owner_id": "u"
        }))
        .unwrap();
        assert_eq!(missing.quantity, 0.0);
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut record = RawRecord::new(
            RecordId::from("1"),
            "Rice",
            3.0,
            Some("kg".to_string()),
            super::OwnerId::new("u"),
        );
        RecordPatch::quantity(1.0).apply_to(&mut record);
        assert_eq!(record.quantity, 1.0);
        assert_eq!(record.unit.as_deref(), Some("kg"));

        let clear_unit = RecordPatch {
            unit: Some(None),
            ..RecordPatch::default()
        };
        clear_unit.apply_to(&mut record);
        assert_eq!(record.unit, None);
        assert_eq!(record.name, "Rice");
    }
}
