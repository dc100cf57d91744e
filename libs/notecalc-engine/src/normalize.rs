//! Unit system normalization
//!
//! Maps a dimension signature to the preferred display unit of a unit
//! system. Signatures without an entry keep their native unit.

use notecalc_units::{Dimension, Unit, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Display unit system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum UnitSystem {
    #[default]
    #[serde(rename = "SI", alias = "si")]
    Si,
    #[serde(rename = "US", alias = "us")]
    Us,
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSystem::Si => write!(f, "SI"),
            UnitSystem::Us => write!(f, "US"),
        }
    }
}

/// (signature, SI unit, US unit)
const PREFERRED: &[([i8; 8], &str, &str)] = &[
    ([1, 0, 0, 0, 0, 0, 0, 0], "kg", "lb"),
    ([0, 1, 0, 0, 0, 0, 0, 0], "m", "ft"),
    ([0, 0, 1, 0, 0, 0, 0, 0], "s", "s"),
    ([0, 0, 0, 0, 1, 0, 0, 0], "degC", "degF"),
    ([0, 2, 0, 0, 0, 0, 0, 0], "m^2", "ft^2"),
    ([0, 3, 0, 0, 0, 0, 0, 0], "m^3", "ft^3"),
    ([0, 1, -1, 0, 0, 0, 0, 0], "m/s", "ft/s"),
    ([0, 1, -2, 0, 0, 0, 0, 0], "m/s^2", "ft/s^2"),
    ([0, 3, -1, 0, 0, 0, 0, 0], "m^3/s", "ft^3/min"),
    ([1, 0, -1, 0, 0, 0, 0, 0], "kg/s", "lb/s"),
    ([1, -3, 0, 0, 0, 0, 0, 0], "kg/m^3", "lb/ft^3"),
    ([1, 1, -2, 0, 0, 0, 0, 0], "N", "lbf"),
    ([1, -1, -2, 0, 0, 0, 0, 0], "Pa", "psi"),
    ([1, 2, -2, 0, 0, 0, 0, 0], "J", "BTU"),
    ([1, 2, -3, 0, 0, 0, 0, 0], "W", "hp"),
];

/// Symbols rendered with a special glyph
const GLYPHS: &[(&str, &str)] = &[
    ("degC", "°C"),
    ("degF", "°F"),
    ("degR", "°R"),
    ("deg", "°"),
    ("ohm", "Ω"),
    ("kohm", "kΩ"),
    ("um", "µm"),
    ("uF", "µF"),
];

/// Preferred display unit symbol for a dimension, if the system has one
pub fn preferred_unit(dimension: Dimension, system: UnitSystem) -> Option<&'static str> {
    let signature = dimension.signature();
    PREFERRED
        .iter()
        .find(|(sig, _, _)| *sig == signature)
        .map(|(_, si, us)| match system {
            UnitSystem::Si => *si,
            UnitSystem::Us => *us,
        })
}

/// Re-express a value in the preferred unit of `system`
///
/// The input is never modified. Dimensionless quantities (e.g. `km/m`) are
/// reduced to plain numbers. A failed conversion keeps the value as-is.
pub fn normalize(value: &Value, system: UnitSystem) -> Value {
    let quantity = match value {
        Value::Number(_) => return value.clone(),
        Value::Quantity(q) => q,
    };
    let dimension = quantity.dimension();
    if dimension.is_dimensionless() {
        return Value::Number(quantity.to_si());
    }
    let Some(symbol) = preferred_unit(dimension, system) else {
        return value.clone();
    };
    match Unit::parse(symbol).and_then(|unit| quantity.to(&unit)) {
        Ok(converted) => Value::Quantity(converted),
        Err(e) => {
            debug!(unit = %quantity.unit, target = symbol, error = %e, "normalization fallback");
            value.clone()
        }
    }
}

/// Display form of a single unit symbol
pub fn glyph(symbol: &str) -> String {
    GLYPHS
        .iter()
        .find(|(from, _)| *from == symbol)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| symbol.to_string())
}

/// Human-facing unit text (`degC` -> `°C`, `kg*m/s^2` unchanged)
pub fn display_unit(unit: &Unit) -> String {
    unit.render_with(glyph)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use notecalc_units::{evaluate, NoBindings};

    fn eval(expr: &str) -> Value {
        evaluate(expr, &NoBindings).unwrap()
    }

    #[test]
    fn test_si_keeps_kg() {
        let value = eval("5 kg");
        assert_eq!(normalize(&value, UnitSystem::Si), value);
    }

    #[test]
    fn test_us_converts_kg_to_lb() {
        let normalized = normalize(&eval("5 kg"), UnitSystem::Us);
        assert_eq!(normalized.unit().unwrap().to_string(), "lb");
        assert!((normalized.magnitude() - 11.023_113_1).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_signature_keeps_native_unit() {
        let value = eval("3 kg*m");
        assert_eq!(normalize(&value, UnitSystem::Si), value);
    }

    #[test]
    fn test_dimensionless_quantity_becomes_number() {
        let normalized = normalize(&eval("2 km/m"), UnitSystem::Si);
        assert_eq!(normalized, Value::Number(2000.0));
    }

    #[test]
    fn test_numbers_pass_through() {
        assert_eq!(normalize(&Value::Number(3.5), UnitSystem::Us), Value::Number(3.5));
    }

    #[test]
    fn test_glyph_substitution() {
        assert_eq!(display_unit(&Unit::parse("degC").unwrap()), "°C");
        assert_eq!(display_unit(&Unit::parse("ohm/m").unwrap()), "Ω/m");
        assert_eq!(display_unit(&Unit::parse("m^3/s").unwrap()), "m^3/s");
    }

    #[test]
    fn test_unit_system_serde_names() {
        let system: UnitSystem = serde_json::from_str("\"US\"").unwrap();
        assert_eq!(system, UnitSystem::Us);
        assert_eq!(serde_json::to_string(&UnitSystem::Si).unwrap(), "\"SI\"");
    }
}
