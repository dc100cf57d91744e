//! Error types for notecalc-units

use thiserror::Error;

/// Calculation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("{0}")]
    Expression(String),

    #[error("Undefined symbol {0}")]
    UndefinedSymbol(String),

    #[error("{0}")]
    UnitMismatch(String),

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Function error: {0}")]
    Function(String),

    #[error("Division by zero")]
    DivisionByZero,
}

impl CalcError {
    pub fn expression(msg: impl Into<String>) -> Self {
        Self::Expression(msg.into())
    }

    pub fn undefined_symbol(name: impl Into<String>) -> Self {
        Self::UndefinedSymbol(name.into())
    }

    pub fn unit_mismatch(msg: impl Into<String>) -> Self {
        Self::UnitMismatch(msg.into())
    }

    pub fn unknown_unit(name: impl Into<String>) -> Self {
        Self::UnknownUnit(name.into())
    }

    pub fn function(msg: impl Into<String>) -> Self {
        Self::Function(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
