//! Unit-aware built-in functions
//!
//! Magnitude functions (abs, round, floor, ceil, min, max, clamp, sign) keep
//! the unit of their first argument. Roots transform the unit. Transcendental
//! functions need a dimensionless argument, except trig functions which also
//! accept angles.

use crate::dimension::Dimension;
use crate::error::{CalcError, Result};
use crate::quantity::{Quantity, Value};
use tracing::trace;

/// Names recognised as function calls
pub const FUNCTION_NAMES: &[&str] = &[
    "abs", "acos", "asin", "atan", "cbrt", "ceil", "clamp", "cos", "exp", "floor", "ln", "log",
    "log10", "max", "min", "round", "sign", "sin", "sqrt", "tan",
];

pub fn is_function(name: &str) -> bool {
    FUNCTION_NAMES.contains(&name)
}

/// Dispatch a built-in function call
pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    trace!(function = name, arity = args.len(), "builtin call");
    match name {
        "abs" => map_magnitude(name, args, f64::abs),
        "floor" => map_magnitude(name, args, f64::floor),
        "ceil" => map_magnitude(name, args, f64::ceil),
        "sign" => {
            let [value] = expect_args::<1>(name, args)?;
            let magnitude = value.magnitude();
            Ok(Value::Number(if magnitude == 0.0 {
                0.0
            } else {
                magnitude.signum()
            }))
        }
        "round" => match args {
            [_] => map_magnitude(name, args, f64::round),
            [value, decimals] => Ok(round_to(value, number_arg(name, decimals)?)),
            _ => Err(arity_error(name, "1 or 2", args.len())),
        },
        "min" | "max" => extremum(name, args),
        "clamp" => {
            let [value, lo, hi] = expect_args::<3>(name, args)?;
            let lo = in_unit_of(value, lo)?;
            let hi = in_unit_of(value, hi)?;
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(CalcError::function(format!(
                    "clamp: lower bound {} exceeds upper bound {}",
                    lo, hi
                )));
            }
            Ok(with_magnitude(value, value.magnitude().clamp(lo, hi)))
        }
        "sqrt" => root(name, args, 2.0),
        "cbrt" => root(name, args, 3.0),
        "exp" => map_number(name, args, f64::exp),
        "ln" => map_number(name, args, f64::ln),
        "log10" => map_number(name, args, f64::log10),
        "log" => match args {
            [_] => map_number(name, args, f64::ln),
            [value, base] => {
                let value = number_arg(name, value)?;
                let base = number_arg(name, base)?;
                Ok(Value::Number(value.log(base)))
            }
            _ => Err(arity_error(name, "1 or 2", args.len())),
        },
        "sin" => trig(name, args, f64::sin),
        "cos" => trig(name, args, f64::cos),
        "tan" => trig(name, args, f64::tan),
        "asin" => map_number(name, args, f64::asin),
        "acos" => map_number(name, args, f64::acos),
        "atan" => map_number(name, args, f64::atan),
        _ => Err(CalcError::function(format!("Unknown function {}", name))),
    }
}

fn arity_error(name: &str, expected: &str, got: usize) -> CalcError {
    CalcError::function(format!(
        "{} expects {} argument(s), got {}",
        name, expected, got
    ))
}

fn expect_args<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<&'a [Value; N]> {
    args.try_into()
        .map_err(|_| arity_error(name, &N.to_string(), args.len()))
}

fn number_arg(name: &str, value: &Value) -> Result<f64> {
    value.as_number().ok_or_else(|| {
        CalcError::function(format!(
            "{}: argument must be dimensionless, got {}",
            name, value
        ))
    })
}

fn with_magnitude(value: &Value, magnitude: f64) -> Value {
    match value {
        Value::Number(_) => Value::Number(magnitude),
        Value::Quantity(q) => Value::Quantity(Quantity::new(magnitude, q.unit.clone())),
    }
}

/// Magnitude of `other` expressed in the unit of `reference`
fn in_unit_of(reference: &Value, other: &Value) -> Result<f64> {
    match reference {
        Value::Number(_) => other.as_number().ok_or_else(|| {
            CalcError::unit_mismatch(format!("Units do not match: expected a number, got {}", other))
        }),
        Value::Quantity(q) => Ok(other.to(&q.unit)?.magnitude()),
    }
}

fn map_magnitude(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value> {
    let [value] = expect_args::<1>(name, args)?;
    Ok(with_magnitude(value, f(value.magnitude())))
}

fn map_number(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value> {
    let [value] = expect_args::<1>(name, args)?;
    Ok(Value::Number(f(number_arg(name, value)?)))
}

fn trig(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value> {
    let [value] = expect_args::<1>(name, args)?;
    let radians = match value {
        Value::Quantity(q) if q.dimension() == Dimension::ANGLE => q.to_si(),
        other => number_arg(name, other)?,
    };
    Ok(Value::Number(f(radians)))
}

fn root(name: &str, args: &[Value], degree: f64) -> Result<Value> {
    let [value] = expect_args::<1>(name, args)?;
    value.pow(&Value::Number(1.0 / degree)).map_err(|_| {
        CalcError::function(format!("{}: cannot take root of {}", name, value))
    })
}

fn extremum(name: &str, args: &[Value]) -> Result<Value> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| arity_error(name, "at least 1", 0))?;
    let mut best = first.magnitude();
    for other in rest {
        let candidate = in_unit_of(first, other)?;
        best = if name == "min" {
            best.min(candidate)
        } else {
            best.max(candidate)
        };
    }
    Ok(with_magnitude(first, best))
}

/// Round the magnitude to `decimals` places, keeping the unit
fn round_to(value: &Value, decimals: f64) -> Value {
    let factor = 10_f64.powi(decimals as i32);
    with_magnitude(value, (value.magnitude() * factor).round() / factor)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
#[allow(clippy::approx_constant)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn qty(magnitude: f64, unit: &str) -> Value {
        Value::Quantity(Quantity::new(magnitude, Unit::parse(unit).unwrap()))
    }

    #[test]
    fn test_clamp_converts_bounds() {
        let result = call("clamp", &[qty(2.0, "m"), qty(0.0, "cm"), qty(150.0, "cm")]).unwrap();
        assert_eq!(result.unit().unwrap().to_string(), "m");
        assert!((result.magnitude() - 1.5).abs() < 1e-12);
        let inside = call("clamp", &[qty(0.5, "m"), qty(0.0, "m"), qty(1.0, "m")]).unwrap();
        assert_eq!(inside, qty(0.5, "m"));
        assert!(call("clamp", &[qty(1.0, "m"), qty(2.0, "m"), qty(1.0, "m")]).is_err());
    }

    #[test]
    fn test_round_keeps_unit() {
        let rounded = call("round", &[qty(3.14159, "kg"), Value::Number(2.0)]).unwrap();
        assert_eq!(rounded, qty(3.14, "kg"));
        assert_eq!(call("round", &[Value::Number(2.5)]).unwrap(), Value::Number(3.0));
        assert!(call("round", &[qty(1.0, "m"), qty(2.0, "m")]).is_err());
    }

    #[test]
    fn test_sign_of_quantity() {
        assert_eq!(call("sign", &[qty(-4.0, "N")]).unwrap(), Value::Number(-1.0));
        assert_eq!(call("sign", &[Value::Number(0.0)]).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_abs_keeps_unit() {
        let result = call("abs", &[qty(-3.0, "m")]).unwrap();
        assert_eq!(result, qty(3.0, "m"));
    }

    #[test]
    fn test_max_converts_units() {
        let result = call("max", &[qty(1.0, "m"), qty(150.0, "cm")]).unwrap();
        assert_eq!(result.unit().unwrap().to_string(), "m");
        assert!((result.magnitude() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_of_area() {
        let side = call("sqrt", &[qty(16.0, "m^2")]).unwrap();
        assert_eq!(side, qty(4.0, "m"));
        assert!(call("sqrt", &[qty(16.0, "m")]).is_err());
    }

    #[test]
    fn test_trig_accepts_angles() {
        let result = call("sin", &[qty(90.0, "deg")]).unwrap();
        assert!((result.magnitude() - 1.0).abs() < 1e-12);
        assert!(call("sin", &[qty(1.0, "m")]).is_err());
    }

    #[test]
    fn test_arity_is_checked() {
        assert!(call("clamp", &[Value::Number(1.0)]).is_err());
        assert!(call("nope", &[]).is_err());
    }
}
