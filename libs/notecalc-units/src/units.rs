//! Unit registry and compound units
//!
//! Every registered symbol carries its SI scale, an additive offset (only
//! temperatures use one) and its dimension. A [`Unit`] is a product of
//! registered symbols raised to integer powers, e.g. `m^3/s`.

use crate::dimension::Dimension;
use crate::error::{CalcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;
use std::sync::OnceLock;

/// A registered unit symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDef {
    pub symbol: &'static str,
    /// Multiplier to the SI coherent unit
    pub scale: f64,
    /// Added after scaling (`si = magnitude * scale + offset`)
    pub offset: f64,
    pub dimension: Dimension,
}

const fn unit(symbol: &'static str, scale: f64, dimension: Dimension) -> UnitDef {
    UnitDef {
        symbol,
        scale,
        offset: 0.0,
        dimension,
    }
}

const fn offset_unit(symbol: &'static str, scale: f64, offset: f64, dimension: Dimension) -> UnitDef {
    UnitDef {
        symbol,
        scale,
        offset,
        dimension,
    }
}

const MASS: Dimension = Dimension::MASS;
const LENGTH: Dimension = Dimension::LENGTH;
const TIME: Dimension = Dimension::TIME;
const CURRENT: Dimension = Dimension::CURRENT;
const TEMPERATURE: Dimension = Dimension::TEMPERATURE;
const ANGLE: Dimension = Dimension::ANGLE;
const AREA: Dimension = Dimension::from_signature([0, 2, 0, 0, 0, 0, 0, 0]);
const VOLUME: Dimension = Dimension::from_signature([0, 3, 0, 0, 0, 0, 0, 0]);
const FREQUENCY: Dimension = Dimension::from_signature([0, 0, -1, 0, 0, 0, 0, 0]);
const FORCE: Dimension = Dimension::from_signature([1, 1, -2, 0, 0, 0, 0, 0]);
const PRESSURE: Dimension = Dimension::from_signature([1, -1, -2, 0, 0, 0, 0, 0]);
const ENERGY: Dimension = Dimension::from_signature([1, 2, -2, 0, 0, 0, 0, 0]);
const POWER: Dimension = Dimension::from_signature([1, 2, -3, 0, 0, 0, 0, 0]);
const CHARGE: Dimension = Dimension::from_signature([0, 0, 1, 1, 0, 0, 0, 0]);
const VOLTAGE: Dimension = Dimension::from_signature([1, 2, -3, -1, 0, 0, 0, 0]);
const RESISTANCE: Dimension = Dimension::from_signature([1, 2, -3, -2, 0, 0, 0, 0]);
const CAPACITANCE: Dimension = Dimension::from_signature([-1, -2, 4, 2, 0, 0, 0, 0]);
const SPEED: Dimension = Dimension::from_signature([0, 1, -1, 0, 0, 0, 0, 0]);

const LBF: f64 = 4.448_221_615_260_5;
const PSI: f64 = 6_894.757_293_168_361;
const GALLON: f64 = 0.003_785_411_784;

static UNITS: &[UnitDef] = &[
    // Length
    unit("m", 1.0, LENGTH),
    unit("km", 1e3, LENGTH),
    unit("cm", 1e-2, LENGTH),
    unit("mm", 1e-3, LENGTH),
    unit("um", 1e-6, LENGTH),
    unit("nm", 1e-9, LENGTH),
    unit("in", 0.0254, LENGTH),
    unit("ft", 0.3048, LENGTH),
    unit("yd", 0.9144, LENGTH),
    unit("mi", 1_609.344, LENGTH),
    unit("nmi", 1_852.0, LENGTH),
    unit("mil", 2.54e-5, LENGTH),
    // Mass
    unit("kg", 1.0, MASS),
    unit("g", 1e-3, MASS),
    unit("mg", 1e-6, MASS),
    unit("t", 1e3, MASS),
    unit("lb", 0.453_592_37, MASS),
    unit("lbm", 0.453_592_37, MASS),
    unit("oz", 0.028_349_523_125, MASS),
    unit("slug", 14.593_902_937_206_364, MASS),
    unit("ton", 907.184_74, MASS),
    // Time
    unit("s", 1.0, TIME),
    unit("ms", 1e-3, TIME),
    unit("us", 1e-6, TIME),
    unit("ns", 1e-9, TIME),
    unit("min", 60.0, TIME),
    unit("h", 3_600.0, TIME),
    unit("hr", 3_600.0, TIME),
    unit("day", 86_400.0, TIME),
    unit("week", 604_800.0, TIME),
    unit("yr", 31_557_600.0, TIME),
    // Current
    unit("A", 1.0, CURRENT),
    unit("mA", 1e-3, CURRENT),
    unit("kA", 1e3, CURRENT),
    // Temperature
    unit("K", 1.0, TEMPERATURE),
    offset_unit("degC", 1.0, 273.15, TEMPERATURE),
    offset_unit("degF", 5.0 / 9.0, 459.67 * 5.0 / 9.0, TEMPERATURE),
    unit("degR", 5.0 / 9.0, TEMPERATURE),
    // Amount, luminosity
    unit("mol", 1.0, Dimension::AMOUNT),
    unit("kmol", 1e3, Dimension::AMOUNT),
    unit("cd", 1.0, Dimension::LUMINOSITY),
    // Angle
    unit("rad", 1.0, ANGLE),
    unit("deg", PI / 180.0, ANGLE),
    unit("grad", PI / 200.0, ANGLE),
    unit("rev", 2.0 * PI, ANGLE),
    // Area
    unit("ha", 1e4, AREA),
    unit("acre", 4_046.856_422_4, AREA),
    // Volume
    unit("L", 1e-3, VOLUME),
    unit("mL", 1e-6, VOLUME),
    unit("gal", GALLON, VOLUME),
    unit("qt", GALLON / 4.0, VOLUME),
    unit("pt", GALLON / 8.0, VOLUME),
    unit("floz", GALLON / 128.0, VOLUME),
    unit("bbl", GALLON * 42.0, VOLUME),
    // Frequency
    unit("Hz", 1.0, FREQUENCY),
    unit("kHz", 1e3, FREQUENCY),
    unit("MHz", 1e6, FREQUENCY),
    unit("GHz", 1e9, FREQUENCY),
    unit("rpm", 1.0 / 60.0, FREQUENCY),
    // Speed
    unit("kn", 1_852.0 / 3_600.0, SPEED),
    unit("mph", 1_609.344 / 3_600.0, SPEED),
    unit("kph", 1e3 / 3_600.0, SPEED),
    // Force
    unit("N", 1.0, FORCE),
    unit("kN", 1e3, FORCE),
    unit("MN", 1e6, FORCE),
    unit("dyn", 1e-5, FORCE),
    unit("kgf", 9.806_65, FORCE),
    unit("lbf", LBF, FORCE),
    unit("kip", LBF * 1e3, FORCE),
    // Pressure
    unit("Pa", 1.0, PRESSURE),
    unit("kPa", 1e3, PRESSURE),
    unit("MPa", 1e6, PRESSURE),
    unit("GPa", 1e9, PRESSURE),
    unit("bar", 1e5, PRESSURE),
    unit("mbar", 1e2, PRESSURE),
    unit("atm", 101_325.0, PRESSURE),
    unit("psi", PSI, PRESSURE),
    unit("ksi", PSI * 1e3, PRESSURE),
    unit("psf", 47.880_258_980_335_84, PRESSURE),
    unit("inHg", 3_386.389, PRESSURE),
    unit("mmHg", 133.322_387_415, PRESSURE),
    unit("torr", 101_325.0 / 760.0, PRESSURE),
    // Energy
    unit("J", 1.0, ENERGY),
    unit("kJ", 1e3, ENERGY),
    unit("MJ", 1e6, ENERGY),
    unit("cal", 4.184, ENERGY),
    unit("kcal", 4_184.0, ENERGY),
    unit("BTU", 1_055.055_852_62, ENERGY),
    unit("Wh", 3_600.0, ENERGY),
    unit("kWh", 3.6e6, ENERGY),
    unit("eV", 1.602_176_634e-19, ENERGY),
    unit("erg", 1e-7, ENERGY),
    // Power
    unit("W", 1.0, POWER),
    unit("mW", 1e-3, POWER),
    unit("kW", 1e3, POWER),
    unit("MW", 1e6, POWER),
    unit("hp", 745.699_871_582_270_2, POWER),
    // Electrical
    unit("C", 1.0, CHARGE),
    unit("V", 1.0, VOLTAGE),
    unit("mV", 1e-3, VOLTAGE),
    unit("kV", 1e3, VOLTAGE),
    unit("ohm", 1.0, RESISTANCE),
    unit("kohm", 1e3, RESISTANCE),
    unit("F", 1.0, CAPACITANCE),
    unit("uF", 1e-6, CAPACITANCE),
];

fn registry() -> &'static HashMap<&'static str, &'static UnitDef> {
    static REGISTRY: OnceLock<HashMap<&'static str, &'static UnitDef>> = OnceLock::new();
    REGISTRY.get_or_init(|| UNITS.iter().map(|def| (def.symbol, def)).collect())
}

/// Look up a registered unit symbol
pub fn lookup(symbol: &str) -> Option<&'static UnitDef> {
    registry().get(symbol).copied()
}

/// All registered unit symbols, sorted
pub fn known_units() -> Vec<&'static str> {
    let mut symbols: Vec<&'static str> = UNITS.iter().map(|def| def.symbol).collect();
    symbols.sort_unstable();
    symbols
}

/// One factor of a compound unit: a registered symbol raised to a power
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFactor {
    pub symbol: String,
    pub power: i32,
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    pub dimension: Dimension,
}

/// Product of unit factors, e.g. `kg*m/s^2`
///
/// Every constructor checks that the combined dimension fits the exponent
/// range, so [`Unit::dimension`] never fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UnitFactors")]
pub struct Unit {
    factors: Vec<UnitFactor>,
    #[serde(skip)]
    dimension: Dimension,
}

#[derive(Deserialize)]
struct UnitFactors {
    factors: Vec<UnitFactor>,
}

impl TryFrom<UnitFactors> for Unit {
    type Error = CalcError;

    fn try_from(repr: UnitFactors) -> Result<Self> {
        Unit::from_factors(repr.factors)
    }
}

fn exponent_out_of_range() -> CalcError {
    CalcError::unit_mismatch("Unit exponent out of range")
}

impl Unit {
    pub fn from_def(def: &UnitDef) -> Self {
        Self {
            factors: vec![UnitFactor {
                symbol: def.symbol.to_string(),
                power: 1,
                scale: def.scale,
                offset: def.offset,
                dimension: def.dimension,
            }],
            dimension: def.dimension,
        }
    }

    fn from_factors(mut factors: Vec<UnitFactor>) -> Result<Self> {
        factors.retain(|f| f.power != 0);
        let dimension = factors
            .iter()
            .try_fold(Dimension::DIMENSIONLESS, |acc, f| {
                acc.checked_mul(f.dimension.checked_powi(f.power)?)
            })
            .ok_or_else(exponent_out_of_range)?;
        Ok(Self { factors, dimension })
    }

    /// Single registered symbol
    pub fn named(symbol: &str) -> Result<Self> {
        lookup(symbol)
            .map(Self::from_def)
            .ok_or_else(|| CalcError::unknown_unit(symbol))
    }

    /// Parse a unit expression such as `m^3/s` or `lb/ft^3`
    pub fn parse(text: &str) -> Result<Self> {
        crate::evaluator::parse_unit(text)
    }

    pub fn factors(&self) -> &[UnitFactor] {
        &self.factors
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Multiplier from this unit to the SI coherent unit
    pub fn scale(&self) -> f64 {
        self.factors
            .iter()
            .map(|f| f.scale.powi(f.power))
            .product()
    }

    /// Offsets only apply to a lone symbol at power one (`degC`, not `degC/s`)
    pub fn offset(&self) -> f64 {
        match self.factors.as_slice() {
            [single] if single.power == 1 => single.offset,
            _ => 0.0,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn multiply(&self, other: &Unit) -> Result<Unit> {
        let mut factors = self.factors.clone();
        for factor in &other.factors {
            match factors.iter_mut().find(|f| f.symbol == factor.symbol) {
                Some(existing) => {
                    existing.power = existing
                        .power
                        .checked_add(factor.power)
                        .ok_or_else(exponent_out_of_range)?;
                }
                None => factors.push(factor.clone()),
            }
        }
        Unit::from_factors(factors)
    }

    pub fn divide(&self, other: &Unit) -> Result<Unit> {
        self.multiply(&other.powi(-1)?)
    }

    pub fn powi(&self, n: i32) -> Result<Unit> {
        let factors = self
            .factors
            .iter()
            .map(|f| {
                let power = f.power.checked_mul(n).ok_or_else(exponent_out_of_range)?;
                Ok(UnitFactor {
                    power,
                    ..f.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Unit::from_factors(factors)
    }

    /// Fractional power, only when every resulting exponent is an integer
    pub fn powf(&self, exponent: f64) -> Result<Unit> {
        let mut factors = Vec::with_capacity(self.factors.len());
        for f in &self.factors {
            let power = f64::from(f.power) * exponent;
            if !power.is_finite() || (power - power.round()).abs() > 1e-9 {
                return Err(CalcError::unit_mismatch(format!(
                    "Cannot raise {} to a non-integer power {}",
                    self, exponent
                )));
            }
            if power.abs() > f64::from(i8::MAX) + 1.0 {
                return Err(exponent_out_of_range());
            }
            factors.push(UnitFactor {
                power: power.round() as i32,
                ..f.clone()
            });
        }
        Unit::from_factors(factors)
    }

    /// Render with a per-symbol mapping (used for display glyphs)
    pub fn render_with<F>(&self, symbol: F) -> String
    where
        F: Fn(&str) -> String,
    {
        let term = |f: &UnitFactor, power: i32| {
            if power == 1 {
                symbol(&f.symbol)
            } else {
                format!("{}^{}", symbol(&f.symbol), power)
            }
        };
        let numerator: Vec<String> = self
            .factors
            .iter()
            .filter(|f| f.power > 0)
            .map(|f| term(f, f.power))
            .collect();
        let denominator: Vec<String> = self
            .factors
            .iter()
            .filter(|f| f.power < 0)
            .map(|f| term(f, -f.power))
            .collect();

        let denominator = match denominator.len() {
            0 => return numerator.join("*"),
            1 => denominator.join("*"),
            _ => format!("({})", denominator.join("*")),
        };
        if numerator.is_empty() {
            format!("1/{}", denominator)
        } else {
            format!("{}/{}", numerator.join("*"), denominator)
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_with(str::to_string))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_symbols_are_unique() {
        let symbols = known_units();
        let mut deduped = symbols.clone();
        deduped.dedup();
        assert_eq!(symbols.len(), deduped.len());
        assert!(symbols.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_compound_rendering() {
        let m = Unit::named("m").unwrap();
        let s = Unit::named("s").unwrap();
        let kg = Unit::named("kg").unwrap();

        assert_eq!(m.powi(3).unwrap().divide(&s).unwrap().to_string(), "m^3/s");
        let force = kg.multiply(&m).unwrap().divide(&s.powi(2).unwrap()).unwrap();
        assert_eq!(force.to_string(), "kg*m/s^2");
        let mixed = m.divide(&s.multiply(&kg).unwrap()).unwrap();
        assert_eq!(mixed.to_string(), "m/(s*kg)");
        assert_eq!(Unit::default().divide(&s).unwrap().to_string(), "1/s");
    }

    #[test]
    fn test_cancellation_drops_factor() {
        let m = Unit::named("m").unwrap();
        let ratio = m.divide(&m).unwrap();
        assert!(ratio.is_empty());
        assert!(ratio.dimension().is_dimensionless());
    }

    #[test]
    fn test_scale_and_dimension() {
        let flow = Unit::named("gal")
            .unwrap()
            .divide(&Unit::named("min").unwrap())
            .unwrap();
        assert!((flow.scale() - GALLON / 60.0).abs() < 1e-15);
        assert_eq!(flow.dimension().signature(), [0, 3, -1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_offset_only_for_lone_symbol() {
        let deg_c = Unit::named("degC").unwrap();
        assert_eq!(deg_c.offset(), 273.15);
        let rate = deg_c.divide(&Unit::named("s").unwrap()).unwrap();
        assert_eq!(rate.offset(), 0.0);
    }

    #[test]
    fn test_powf_requires_integer_exponents() {
        let area = Unit::named("m").unwrap().powi(2).unwrap();
        assert_eq!(area.powf(0.5).unwrap().to_string(), "m");
        assert!(Unit::named("m").unwrap().powf(0.5).is_err());
    }

    #[test]
    fn test_exponent_range_is_enforced() {
        let m = Unit::named("m").unwrap();
        let ft = Unit::named("ft").unwrap();
        let huge = m.powi(127).unwrap();
        assert_eq!(
            huge.multiply(&ft).unwrap_err(),
            CalcError::unit_mismatch("Unit exponent out of range")
        );
        assert!(m.powi(256).is_err());
        assert!(m.powf(256.0).is_err());
        assert!(m.powi(i32::MAX).is_err());
    }

    #[test]
    fn test_deserialize_validates_dimension() {
        let flow = Unit::parse("m^3/s").unwrap();
        let json = serde_json::to_string(&flow).unwrap();
        let back: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flow);
        assert_eq!(back.dimension().signature(), [0, 3, -1, 0, 0, 0, 0, 0]);

        let bogus = json.replace("\"power\":3", "\"power\":300");
        assert!(serde_json::from_str::<Unit>(&bogus).is_err());
    }
}
