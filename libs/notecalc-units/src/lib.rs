//! notecalc-units - Unit-aware arithmetic for notecalc
//!
//! Parses engineering expressions such as `15 gal/min` or `m * 9.81 m/s^2`
//! and evaluates them into plain numbers or dimensioned quantities.
//!
//! # Features
//!
//! - **Quantities**: magnitude + compound unit, with dimension checking on `+`/`-`
//! - **Conversions**: `Quantity::to`, including offset units (`degC`, `degF`)
//! - **Functions**: `sqrt()`, `abs()`, `round()`, `min()`, `max()`, `clamp()`, trig, logs
//! - **Introspection**: free variables of an expression, the known unit symbols
//!
//! # Example
//!
//! ```rust
//! use notecalc_units::{evaluate, NoBindings, Unit, Value};
//! use std::collections::HashMap;
//!
//! let flow = evaluate("15 gal/min", &NoBindings).unwrap();
//! let si = flow.to(&Unit::parse("m^3/s").unwrap()).unwrap();
//! assert!((si.magnitude() - 0.000946352946).abs() < 1e-12);
//!
//! let mut vars = HashMap::new();
//! vars.insert("mass".to_string(), evaluate("2 kg", &NoBindings).unwrap());
//! let weight = evaluate("mass * 9.81 m/s^2", &vars).unwrap();
//! assert_eq!(weight.dimension(), Unit::parse("N").unwrap().dimension());
//! ```
//!
//! # Built-in Functions
//!
//! | Function | Signature | Description |
//! |----------|-----------|-------------|
//! | `abs` | `abs(x)` | Absolute value, keeps unit |
//! | `sqrt` / `cbrt` | `sqrt(x)` | Root, unit exponents must divide evenly |
//! | `round` | `round(x)` or `round(x, decimals)` | Round magnitude |
//! | `floor` / `ceil` | `floor(x)` | Round magnitude down / up |
//! | `min` / `max` | `min(a, b, ...)` | Extremum, converted to the first unit |
//! | `clamp` | `clamp(x, lo, hi)` | Limit to range |
//! | `sign` | `sign(x)` | -1, 0, or 1 |
//! | `exp` / `ln` / `log10` | `ln(x)` | Dimensionless only |
//! | `log` | `log(x)` or `log(x, base)` | Natural or based logarithm |
//! | `sin` / `cos` / `tan` | `sin(30 deg)` | Numbers are radians |
//! | `asin` / `acos` / `atan` | `asin(x)` | Result in radians |

pub mod builtin_functions;
pub mod dimension;
pub mod error;
pub mod evaluator;
pub mod quantity;
pub mod units;

// Re-exports for convenience
pub use dimension::Dimension;
pub use error::{CalcError, Result};
pub use evaluator::{evaluate, free_variables, Expression, Lookup, NoBindings};
pub use quantity::{Quantity, Value};
pub use units::{known_units, Unit, UnitDef};
