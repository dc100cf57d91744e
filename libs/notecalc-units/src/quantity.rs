//! Values carried through unit-aware arithmetic
//!
//! A [`Value`] is either a plain number or a [`Quantity`] (a magnitude
//! expressed in a compound unit). All arithmetic is explicit over the tag.

use crate::dimension::Dimension;
use crate::error::{CalcError, Result};
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Magnitude expressed in `unit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit }
    }

    pub fn dimension(&self) -> Dimension {
        self.unit.dimension()
    }

    /// Value in SI coherent units (kelvin for temperatures)
    pub fn to_si(&self) -> f64 {
        self.magnitude * self.unit.scale() + self.unit.offset()
    }

    /// Convert to another unit of the same dimension
    pub fn to(&self, target: &Unit) -> Result<Quantity> {
        if self.dimension() != target.dimension() {
            return Err(CalcError::unit_mismatch(format!(
                "Units do not match: cannot convert {} to {}",
                self.unit, target
            )));
        }
        let magnitude = (self.to_si() - target.offset()) / target.scale();
        Ok(Quantity::new(magnitude, target.clone()))
    }

    /// Convert to a unit given by name or unit expression
    pub fn to_unit_name(&self, target: &str) -> Result<Quantity> {
        self.to(&Unit::parse(target)?)
    }
}

/// Plain number or unit-bearing quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Number(f64),
    Quantity(Quantity),
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<Quantity> for Value {
    fn from(quantity: Quantity) -> Self {
        Value::Quantity(quantity)
    }
}

impl Value {
    /// Collapse a quantity whose unit cancelled out into a number
    fn reduce(magnitude: f64, unit: Unit) -> Value {
        if unit.is_empty() {
            Value::Number(magnitude)
        } else {
            Value::Quantity(Quantity::new(magnitude, unit))
        }
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Value::Number(_) => Dimension::DIMENSIONLESS,
            Value::Quantity(q) => q.dimension(),
        }
    }

    /// Numeric value in SI units (plain numbers pass through)
    pub fn to_si(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Quantity(q) => q.to_si(),
        }
    }

    pub fn unit(&self) -> Option<&Unit> {
        match self {
            Value::Number(_) => None,
            Value::Quantity(q) => Some(&q.unit),
        }
    }

    /// The magnitude as written, ignoring the unit
    pub fn magnitude(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Quantity(q) => q.magnitude,
        }
    }

    /// Convert to `target`; plain numbers can only convert when dimensionless
    pub fn to(&self, target: &Unit) -> Result<Value> {
        match self {
            Value::Quantity(q) => Ok(Value::Quantity(q.to(target)?)),
            Value::Number(n) if target.dimension().is_dimensionless() => Ok(Value::Quantity(
                Quantity::new(*n / target.scale(), target.clone()),
            )),
            Value::Number(_) => Err(CalcError::unit_mismatch(format!(
                "Units do not match: cannot convert a number to {}",
                target
            ))),
        }
    }

    /// A number, or a dimensionless quantity reduced to one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Quantity(q) if q.dimension().is_dimensionless() => Some(q.to_si()),
            Value::Quantity(_) => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Value::Number(_) => "number".to_string(),
            Value::Quantity(q) => q.unit.to_string(),
        }
    }

    fn additive(&self, rhs: &Value, op: &str, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(*a, *b))),
            (Value::Quantity(a), Value::Quantity(b)) => {
                if a.dimension() != b.dimension() {
                    return Err(CalcError::unit_mismatch(format!(
                        "Units do not match: cannot {} {} and {}",
                        op, a.unit, b.unit
                    )));
                }
                let b = b.to(&a.unit)?;
                Ok(Value::Quantity(Quantity::new(
                    f(a.magnitude, b.magnitude),
                    a.unit.clone(),
                )))
            }
            (lhs, rhs) => match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => Ok(Value::Number(f(a, b))),
                _ => Err(CalcError::unit_mismatch(format!(
                    "Units do not match: cannot {} {} and {}",
                    op,
                    lhs.describe(),
                    rhs.describe()
                ))),
            },
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value> {
        self.additive(rhs, "add", |a, b| a + b)
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value> {
        self.additive(rhs, "subtract", |a, b| a - b)
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value> {
        if rhs.magnitude() == 0.0 {
            return Err(CalcError::DivisionByZero);
        }
        self.additive(rhs, "take the remainder of", |a, b| a % b)
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value> {
        Ok(match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a * b),
            (Value::Number(n), Value::Quantity(q)) | (Value::Quantity(q), Value::Number(n)) => {
                Value::Quantity(Quantity::new(q.magnitude * n, q.unit.clone()))
            }
            (Value::Quantity(a), Value::Quantity(b)) => {
                let unit = a.unit.multiply(&b.unit)?;
                let magnitude = a.magnitude * b.magnitude;
                if unit.is_empty() {
                    // same-symbol factors cancelled, scales cancel with them
                    Value::Number(magnitude)
                } else {
                    Value::Quantity(Quantity::new(magnitude, unit))
                }
            }
        })
    }

    pub fn div(&self, rhs: &Value) -> Result<Value> {
        if rhs.magnitude() == 0.0 {
            return Err(CalcError::DivisionByZero);
        }
        Ok(match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a / b),
            (Value::Quantity(q), Value::Number(n)) => {
                Value::Quantity(Quantity::new(q.magnitude / n, q.unit.clone()))
            }
            (Value::Number(n), Value::Quantity(q)) => {
                Value::reduce(n / q.magnitude, Unit::default().divide(&q.unit)?)
            }
            (Value::Quantity(a), Value::Quantity(b)) => {
                Value::reduce(a.magnitude / b.magnitude, a.unit.divide(&b.unit)?)
            }
        })
    }

    pub fn neg(&self) -> Value {
        match self {
            Value::Number(n) => Value::Number(-n),
            Value::Quantity(q) => Value::Quantity(Quantity::new(-q.magnitude, q.unit.clone())),
        }
    }

    pub fn pow(&self, exponent: &Value) -> Result<Value> {
        let exp = exponent.as_number().ok_or_else(|| {
            CalcError::unit_mismatch(format!(
                "Exponent must be dimensionless, got {}",
                exponent.describe()
            ))
        })?;
        match self {
            Value::Number(base) => Ok(Value::Number(base.powf(exp))),
            Value::Quantity(q) => {
                let unit = q.unit.powf(exp)?;
                Ok(Value::reduce(q.magnitude.powf(exp), unit))
            }
        }
    }

    /// Compare two values of the same dimension
    pub fn compare(&self, rhs: &Value) -> Result<std::cmp::Ordering> {
        if self.dimension() != rhs.dimension() {
            return Err(CalcError::unit_mismatch(format!(
                "Units do not match: cannot compare {} and {}",
                self.describe(),
                rhs.describe()
            )));
        }
        self.to_si()
            .partial_cmp(&rhs.to_si())
            .ok_or_else(|| CalcError::expression("Cannot compare NaN"))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Quantity(q) => write!(f, "{} {}", q.magnitude, q.unit),
        }
    }
}
