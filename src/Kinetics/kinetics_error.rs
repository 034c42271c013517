//! Error taxonomy of the kinetics engine.
//!
//! Structural failures are raised as [`KineticsError`]; local numerical edge cases
//! (one α without a usable slope, one non-finite sample) are masked where they occur
//! and never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KineticsError {
    /// Fewer heating rates or pooled samples than the operation needs.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    /// The optimiser stopped without reporting success.
    #[error("Convergence error: {0}")]
    Convergence(String),
    /// A required intermediate is non-finite or empty and cannot be masked.
    #[error("Numerical domain error: {0}")]
    NumericalDomain(String),
    /// Caller-supplied range or temperature outside its valid domain.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The ODE integration of a fitted model failed at this heating rate.
    #[error("Reconstruction error: {0}")]
    Reconstruction(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type KineticsResult<T> = Result<T, KineticsError>;

/// Validates an α window `0 < amin < amax < 1`.
pub fn check_alpha_range(amin: f64, amax: f64) -> KineticsResult<()> {
    if !(amin > 0.0 && amin < amax && amax < 1.0) {
        return Err(KineticsError::Configuration(format!(
            "alpha range must satisfy 0 < min < max < 1, got [{}, {}]",
            amin, amax
        )));
    }
    Ok(())
}

/// Validates a temperature in kelvin.
pub fn check_temperature(temp_k: f64) -> KineticsResult<()> {
    if !(temp_k.is_finite() && temp_k > 0.0) {
        return Err(KineticsError::Configuration(format!(
            "temperature must be a positive number of kelvin, got {}",
            temp_k
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_range_validation() {
        assert!(check_alpha_range(0.1, 0.9).is_ok());
        assert!(matches!(
            check_alpha_range(0.0, 0.9),
            Err(KineticsError::Configuration(_))
        ));
        assert!(check_alpha_range(0.5, 0.5).is_err());
        assert!(check_alpha_range(0.2, 1.0).is_err());
        assert!(check_alpha_range(f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_temperature_validation() {
        assert!(check_temperature(298.15).is_ok());
        assert!(check_temperature(0.0).is_err());
        assert!(check_temperature(-5.0).is_err());
    }

    #[test]
    fn test_display() {
        let e = KineticsError::InsufficientData("need 3 heating rates".to_string());
        assert_eq!(e.to_string(), "Insufficient data: need 3 heating rates");
    }
}
