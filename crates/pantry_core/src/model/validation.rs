//! Input validation errors raised before any state change.

use crate::model::key::ItemKey;
use crate::model::record::RecordId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Validation failures for pantry inputs.
///
/// Every variant is raised before local or remote state is touched.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Item name is empty after trimming.
    EmptyName,
    /// An add/remove amount is zero, negative or not finite.
    NonPositiveQuantity(f64),
    /// An addition would push the stored quantity past the largest finite value.
    QuantityOverflow,
    /// A patch carries no field to change.
    EmptyPatch,
    /// No logical entry exists for the key.
    UnknownKey(ItemKey),
    /// No record exists for the id.
    UnknownRecord(RecordId),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "item name must not be empty"),
            Self::NonPositiveQuantity(value) => {
                write!(f, "quantity must be a positive number, got {value}")
            }
            Self::QuantityOverflow => write!(f, "resulting quantity is too large"),
            Self::EmptyPatch => write!(f, "patch does not change any field"),
            Self::UnknownKey(key) => write!(f, "no pantry entry for `{key}`"),
            Self::UnknownRecord(id) => write!(f, "no pantry record with id `{id}`"),
        }
    }
}

impl Error for ValidationError {}

/// Ensures an add/remove/patch amount is finite and strictly positive.
pub fn validate_positive(amount: f64) -> Result<f64, ValidationError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(ValidationError::NonPositiveQuantity(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_positive, ValidationError};

    #[test]
    fn accepts_positive_amounts() {
        assert_eq!(validate_positive(0.5), Ok(0.5));
        assert_eq!(validate_positive(3.0), Ok(3.0));
    }

    #[test]
    fn rejects_zero_negative_and_nan() {
        assert_eq!(
            validate_positive(0.0),
            Err(ValidationError::NonPositiveQuantity(0.0))
        );
        assert_eq!(
            validate_positive(-2.0),
            Err(ValidationError::NonPositiveQuantity(-2.0))
        );
        assert!(validate_positive(f64::NAN).is_err());
        assert!(validate_positive(f64::INFINITY).is_err());
    }
}
