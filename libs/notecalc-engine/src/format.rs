//! Display formatting for computed values

use crate::normalize::{display_unit, normalize, UnitSystem};
use notecalc_units::Value;
use serde::{Deserialize, Serialize};

/// Fixed decimal places, trailing zeros and a dangling point trimmed
///
/// `precision` is a count of decimal places, so `0.000946` at 4 renders as
/// `0.0009`. Negative zero renders as `0`.
pub fn format_number(value: f64, precision: u32) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let mut text = format!("{:.*}", precision as usize, value);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// A value ready for display
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormattedValue {
    pub magnitude: String,
    /// Empty for plain numbers
    pub unit: String,
    pub display: String,
}

impl FormattedValue {
    /// Format `value` as-is (no unit system preference)
    pub fn exact(value: &Value, precision: u32) -> Self {
        let magnitude = format_number(value.magnitude(), precision);
        let unit = value.unit().map(display_unit).unwrap_or_default();
        let display = if unit.is_empty() {
            magnitude.clone()
        } else {
            format!("{} {}", magnitude, unit)
        };
        Self {
            magnitude,
            unit,
            display,
        }
    }

    /// Normalize to the preferred unit of `system`, then format
    pub fn normalized(value: &Value, system: UnitSystem, precision: u32) -> Self {
        Self::exact(&normalize(value, system), precision)
    }
}

/// Two-line equation rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquationParts {
    pub symbolic: String,
    pub result: String,
}

impl EquationParts {
    pub fn expression(expr: &str, display: &str) -> Self {
        Self::new(expr.to_string(), display)
    }

    pub fn assignment(name: &str, expr: &str, display: &str) -> Self {
        Self::new(format!("{} = {}", name, expr), display)
    }

    pub fn conversion(expr: &str, target: &str, display: &str) -> Self {
        Self::new(format!("{} → {}", expr, target), display)
    }

    fn new(symbolic: String, display: &str) -> Self {
        Self {
            symbolic,
            result: format!("= {}", display),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use notecalc_units::{evaluate, NoBindings};

    #[test]
    fn test_trailing_zeros_trimmed() {
        assert_eq!(format_number(5.0, 4), "5");
        assert_eq!(format_number(2.5, 4), "2.5");
        assert_eq!(format_number(11.023_113_1, 4), "11.0231");
    }

    #[test]
    fn test_precision_is_decimal_places() {
        assert_eq!(format_number(0.000_946_353, 4), "0.0009");
        assert_eq!(format_number(0.000_01, 4), "0");
        assert_eq!(format_number(1234.5678, 0), "1235");
    }

    #[test]
    fn test_negative_zero() {
        assert_eq!(format_number(-0.000_01, 2), "0");
        assert_eq!(format_number(-1.5, 1), "-1.5");
    }

    #[test]
    fn test_formatted_value_us() {
        let value = evaluate("5 kg", &NoBindings).unwrap();
        let formatted = FormattedValue::normalized(&value, UnitSystem::Us, 4);
        assert_eq!(formatted.display, "11.0231 lb");
        assert_eq!(formatted.magnitude, "11.0231");
        assert_eq!(formatted.unit, "lb");
    }

    #[test]
    fn test_formatted_number() {
        let formatted = FormattedValue::exact(&Value::Number(20.0), 4);
        assert_eq!(formatted.display, "20");
        assert!(formatted.unit.is_empty());
    }

    #[test]
    fn test_equation_parts() {
        let parts = EquationParts::assignment("b", "a + 1", "3");
        assert_eq!(parts.symbolic, "b = a + 1");
        assert_eq!(parts.result, "= 3");
        let parts = EquationParts::conversion("72 km/h", "m/s", "20 m/s");
        assert_eq!(parts.symbolic, "72 km/h → m/s");
    }
}
