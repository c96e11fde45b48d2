//! Flux (J) values with their one-sigma uncertainty.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Relative uncertainty assigned to an estimated J value.
pub const ESTIMATED_RELATIVE_ERROR: f64 = 1e-3;

/// A J value decomposed into nominal value and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxValue {
    #[serde(rename = "j")]
    pub value: f64,
    #[serde(rename = "j_err")]
    pub error: f64,
}

impl FluxValue {
    /// Builds a flux value, rejecting non-finite numbers and negative
    /// uncertainties.
    pub fn new(value: f64, error: f64) -> Result<Self, CoreError> {
        if !value.is_finite() || !error.is_finite() || error < 0.0 {
            return Err(CoreError::InvalidFlux { value, error });
        }
        Ok(FluxValue { value, error })
    }

    /// An estimated J with the conventional 0.1% uncertainty.
    pub fn estimated(value: f64) -> Result<Self, CoreError> {
        Self::new(value, value.abs() * ESTIMATED_RELATIVE_ERROR)
    }

    pub fn nominal_value(&self) -> f64 {
        self.value
    }

    pub fn std_dev(&self) -> f64 {
        self.error
    }

    /// A zero J carries no information and is treated as unset.
    pub fn is_set(&self) -> bool {
        self.value != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nan_and_negative_error() {
        assert!(FluxValue::new(f64::NAN, 0.0).is_err());
        assert!(FluxValue::new(1.0, -0.1).is_err());
        assert!(FluxValue::new(1.0, f64::INFINITY).is_err());
    }

    #[test]
    fn estimated_uses_relative_error() {
        let j = FluxValue::estimated(0.002).unwrap();
        assert_eq!(j.nominal_value(), 0.002);
        assert!((j.std_dev() - 0.000002).abs() < 1e-15);
    }

    #[test]
    fn serializes_as_j_and_j_err() {
        let j = FluxValue::new(0.5, 0.01).unwrap();
        let json = serde_json::to_value(j).unwrap();
        assert_eq!(json["j"], 0.5);
        assert_eq!(json["j_err"], 0.01);
    }
}
