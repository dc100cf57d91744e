//! Dimension vectors over the SI base quantities (plus plane angle)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exponents over the basis (mass, length, time, current, temperature, amount, luminosity, angle)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub mass: i8,
    pub length: i8,
    pub time: i8,
    pub current: i8,
    pub temperature: i8,
    pub amount: i8,
    pub luminosity: i8,
    pub angle: i8,
}

const LABELS: [&str; 8] = ["M", "L", "T", "I", "Θ", "N", "J", "A"];

impl Dimension {
    pub const DIMENSIONLESS: Self = Self::from_signature([0, 0, 0, 0, 0, 0, 0, 0]);
    pub const MASS: Self = Self::from_signature([1, 0, 0, 0, 0, 0, 0, 0]);
    pub const LENGTH: Self = Self::from_signature([0, 1, 0, 0, 0, 0, 0, 0]);
    pub const TIME: Self = Self::from_signature([0, 0, 1, 0, 0, 0, 0, 0]);
    pub const CURRENT: Self = Self::from_signature([0, 0, 0, 1, 0, 0, 0, 0]);
    pub const TEMPERATURE: Self = Self::from_signature([0, 0, 0, 0, 1, 0, 0, 0]);
    pub const AMOUNT: Self = Self::from_signature([0, 0, 0, 0, 0, 1, 0, 0]);
    pub const LUMINOSITY: Self = Self::from_signature([0, 0, 0, 0, 0, 0, 1, 0]);
    pub const ANGLE: Self = Self::from_signature([0, 0, 0, 0, 0, 0, 0, 1]);

    /// Build from an ordered exponent vector
    pub const fn from_signature(sig: [i8; 8]) -> Self {
        Self {
            mass: sig[0],
            length: sig[1],
            time: sig[2],
            current: sig[3],
            temperature: sig[4],
            amount: sig[5],
            luminosity: sig[6],
            angle: sig[7],
        }
    }

    /// Ordered exponent vector, the key used for preferred-unit lookup
    pub const fn signature(&self) -> [i8; 8] {
        [
            self.mass,
            self.length,
            self.time,
            self.current,
            self.temperature,
            self.amount,
            self.luminosity,
            self.angle,
        ]
    }

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::DIMENSIONLESS
    }

    /// Raise to an integer power, `None` when an exponent leaves the `i8` range
    pub fn checked_powi(self, n: i32) -> Option<Self> {
        let mut sig = self.signature();
        for exp in sig.iter_mut() {
            *exp = i8::try_from(i32::from(*exp).checked_mul(n)?).ok()?;
        }
        Some(Self::from_signature(sig))
    }

    /// Product of two dimensions (exponents add)
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let mut sig = self.signature();
        for (exp, other) in sig.iter_mut().zip(rhs.signature()) {
            *exp = exp.checked_add(other)?;
        }
        Some(Self::from_signature(sig))
    }

    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        let mut sig = self.signature();
        for (exp, other) in sig.iter_mut().zip(rhs.signature()) {
            *exp = exp.checked_sub(other)?;
        }
        Some(Self::from_signature(sig))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let parts: Vec<String> = self
            .signature()
            .iter()
            .zip(LABELS)
            .filter(|(exp, _)| **exp != 0)
            .map(|(exp, label)| {
                if *exp == 1 {
                    label.to_string()
                } else {
                    format!("{}^{}", label, exp)
                }
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}
