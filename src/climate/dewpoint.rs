//! Dew point from temperature and relative humidity (Magnus approximation).

use crate::error::{NodeError, Result};

const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

/// Dew point in °C for `temperature` in °C and `humidity` in %.
///
/// Humidity must lie in `(0, 100]`.
pub fn calc_dewpoint(temperature: f64, humidity: f64) -> Result<f64> {
    if !(humidity > 0.0 && humidity <= 100.0) {
        return Err(NodeError::invalid_input(format!(
            "relative humidity {} is outside (0, 100]",
            humidity
        )));
    }
    if !temperature.is_finite() {
        return Err(NodeError::invalid_input(format!(
            "temperature {} is not a finite number",
            temperature
        )));
    }

    let alpha = (MAGNUS_A * temperature) / (MAGNUS_B + temperature) + (humidity / 100.0).ln();
    let dewpoint = (MAGNUS_B * alpha) / (MAGNUS_A - alpha);

    if dewpoint.is_finite() {
        Ok(dewpoint)
    } else {
        Err(NodeError::invalid_input(format!(
            "no dew point for {} °C at {} %",
            temperature, humidity
        )))
    }
}

/// Round `value` to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_value() {
        let dewpoint = calc_dewpoint(25.0, 50.0).unwrap();
        assert!((dewpoint - 13.86).abs() < 0.1, "got {}", dewpoint);
    }

    #[test]
    fn test_saturated_air() {
        // At 100 % the dew point equals the air temperature.
        let dewpoint = calc_dewpoint(18.3, 100.0).unwrap();
        assert!((dewpoint - 18.3).abs() < 1e-9);
    }

    #[test]
    fn test_below_freezing() {
        let dewpoint = calc_dewpoint(-5.0, 80.0).unwrap();
        assert!(dewpoint < -5.0);
        assert!(dewpoint > -10.0);
    }

    #[test]
    fn test_zero_humidity_is_invalid() {
        let result = calc_dewpoint(25.0, 0.0);
        assert!(matches!(result, Err(NodeError::InvalidInput(_))));
    }

    #[test]
    fn test_out_of_domain_humidity() {
        assert!(calc_dewpoint(20.0, -1.0).is_err());
        assert!(calc_dewpoint(20.0, 100.5).is_err());
        assert!(calc_dewpoint(20.0, f64::NAN).is_err());
        assert!(calc_dewpoint(f64::NAN, 50.0).is_err());
    }

    #[test]
    fn test_pole_of_formula() {
        // B + T == 0 makes the first term infinite.
        assert!(calc_dewpoint(-MAGNUS_B, 50.0).is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(13.8421, 1), 13.8);
        assert_eq!(round_to(21.456, 2), 21.46);
        assert_eq!(round_to(-3.25, 1), -3.3);
    }
}
