//! Global constant store
//!
//! Named values shared by every document. Each constant keeps its source
//! expression so it can be re-evaluated on load; a constant may read other
//! constants but never itself.

use crate::error::{EngineError, Result};
use crate::format::FormattedValue;
use crate::normalize::UnitSystem;
use crate::persist::{ConstantPersistence, PersistedConstant, PersistedTable};
use notecalc_units::{Expression, Lookup, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A named, persisted value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConstant {
    pub name: String,
    pub value: Value,
    pub magnitude: String,
    pub unit: String,
    pub display: String,
    pub source_expression: Option<String>,
}

impl GlobalConstant {
    fn from_persisted(name: &str, entry: PersistedConstant) -> Self {
        Self {
            name: name.to_string(),
            value: entry.value,
            magnitude: entry.magnitude,
            unit: entry.unit,
            display: entry.display,
            source_expression: entry.source_expression,
        }
    }

    fn to_persisted(&self) -> PersistedConstant {
        PersistedConstant {
            value: self.value.clone(),
            magnitude: self.magnitude.clone(),
            unit: self.unit.clone(),
            display: self.display.clone(),
            source_expression: self.source_expression.clone(),
        }
    }
}

/// Every constant except `excluded`
struct Others<'a> {
    table: &'a BTreeMap<String, GlobalConstant>,
    excluded: &'a str,
}

impl Lookup for Others<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        if name == self.excluded {
            return None;
        }
        self.table.get(name).map(|c| &c.value)
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Process-wide constant table over a persistence backend
pub struct GlobalConstantStore<P: ConstantPersistence> {
    constants: BTreeMap<String, GlobalConstant>,
    persistence: P,
    unit_system: UnitSystem,
    precision: u32,
    revision: u64,
}

impl<P: ConstantPersistence> GlobalConstantStore<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            constants: BTreeMap::new(),
            persistence,
            unit_system: UnitSystem::default(),
            precision: 4,
            revision: 0,
        }
    }

    /// Display settings; existing entries are re-rendered from their value
    pub fn set_display(&mut self, unit_system: UnitSystem, precision: u32) {
        if (self.unit_system, self.precision) == (unit_system, precision) {
            return;
        }
        self.unit_system = unit_system;
        self.precision = precision;
        for constant in self.constants.values_mut() {
            let formatted = FormattedValue::normalized(&constant.value, unit_system, precision);
            constant.magnitude = formatted.magnitude;
            constant.unit = formatted.unit;
            constant.display = formatted.display;
        }
    }

    /// Replace the table with the backend's contents
    ///
    /// Constants with a source expression are re-evaluated against the
    /// others; a failure keeps the persisted value and display.
    pub fn load(&mut self) -> Result<usize> {
        let persisted = self.persistence.load()?;
        let mut table: BTreeMap<String, GlobalConstant> = persisted
            .into_iter()
            .map(|(name, entry)| {
                let constant = GlobalConstant::from_persisted(&name, entry);
                (name, constant)
            })
            .collect();

        let names: Vec<String> = table.keys().cloned().collect();
        for name in names {
            let Some(source) = table.get(&name).and_then(|c| c.source_expression.clone()) else {
                continue;
            };
            match self.evaluate_excluding(&table, &name, &source) {
                Ok(constant) => {
                    table.insert(name, constant);
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Constant re-evaluation failed, keeping persisted value");
                }
            }
        }

        let count = table.len();
        self.constants = table;
        self.revision += 1;
        info!(count, "Global constants loaded");
        Ok(count)
    }

    /// Create or replace a constant
    pub fn upsert(&mut self, name: &str, expr: &str) -> Result<GlobalConstant> {
        let name = name.trim();
        let expr = expr.trim();
        if name.is_empty() {
            return Err(EngineError::validation("Name is required"));
        }
        if !is_identifier(name) {
            return Err(EngineError::validation(format!(
                "Invalid identifier: {}",
                name
            )));
        }
        if expr.is_empty() {
            return Err(EngineError::validation("Expression is required"));
        }

        let constant = self.evaluate_excluding(&self.constants, name, expr)?;

        let mut table = self.constants.clone();
        table.insert(name.to_string(), constant.clone());
        self.persist(&table)?;
        self.constants = table;
        self.revision += 1;

        info!(name, display = %constant.display, "Global constant stored");
        Ok(constant)
    }

    /// Remove a constant; absent names are not an error
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let mut table = self.constants.clone();
        let removed = table.remove(name.trim()).is_some();
        self.persist(&table)?;
        if removed {
            self.constants = table;
            self.revision += 1;
            info!(name, "Global constant deleted");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&GlobalConstant> {
        self.constants.get(name)
    }

    /// All constants sorted by name
    pub fn snapshot(&self) -> Vec<GlobalConstant> {
        self.constants.values().cloned().collect()
    }

    /// Name to value map for evaluation bindings
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.constants
            .iter()
            .map(|(name, c)| (name.clone(), c.value.clone()))
            .collect()
    }

    /// Bumped on every change to the table
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    fn evaluate_excluding(
        &self,
        table: &BTreeMap<String, GlobalConstant>,
        name: &str,
        expr: &str,
    ) -> Result<GlobalConstant> {
        let bindings = Others {
            table,
            excluded: name,
        };
        let value = Expression::parse(expr)?.evaluate(&bindings)?;
        let formatted = FormattedValue::normalized(&value, self.unit_system, self.precision);
        Ok(GlobalConstant {
            name: name.to_string(),
            value,
            magnitude: formatted.magnitude,
            unit: formatted.unit,
            display: formatted.display,
            source_expression: Some(expr.to_string()),
        })
    }

    fn persist(&self, table: &BTreeMap<String, GlobalConstant>) -> Result<()> {
        let persisted: PersistedTable = table
            .iter()
            .map(|(name, c)| (name.clone(), c.to_persisted()))
            .collect();
        self.persistence.save(&persisted)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::persist::MemoryPersistence;

    fn store() -> GlobalConstantStore<MemoryPersistence> {
        GlobalConstantStore::new(MemoryPersistence::new())
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("g"));
        assert!(is_identifier("_rho2"));
        assert!(!is_identifier("2x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_upsert_validation_messages() {
        let mut store = store();
        assert_eq!(
            store.upsert(" ", "1").unwrap_err().to_string(),
            "Name is required"
        );
        assert_eq!(
            store.upsert("9g", "1").unwrap_err().to_string(),
            "Invalid identifier: 9g"
        );
        assert_eq!(
            store.upsert("g", "  ").unwrap_err().to_string(),
            "Expression is required"
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_persists_and_bumps_revision() {
        let mut store = store();
        let before = store.revision();
        let constant = store.upsert("g", "9.81 m/s^2").unwrap();
        assert_eq!(constant.display, "9.81 m/s^2");
        assert!(store.revision() > before);
        assert!(store.persistence().contents().contains_key("g"));
    }

    #[test]
    fn test_self_reference_fails() {
        let mut store = store();
        let err = store.upsert("g", "g + 1").unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(_)));
        assert!(store.get("g").is_none());
    }

    #[test]
    fn test_constants_reference_each_other() {
        let mut store = store();
        store.upsert("a", "2").unwrap();
        let b = store.upsert("b", "a * 3").unwrap();
        assert_eq!(b.value, Value::Number(6.0));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = store();
        store.upsert("a", "2").unwrap();
        store.delete("a").unwrap();
        let revision = store.revision();
        store.delete("a").unwrap();
        assert_eq!(store.revision(), revision);
        assert!(store.persistence().contents().is_empty());
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let mut store = store();
        store.upsert("zeta", "1").unwrap();
        store.upsert("alpha", "2").unwrap();
        let names: Vec<_> = store.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
