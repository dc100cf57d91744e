//! Dependency analysis

use notecalc_units::free_variables;
use std::collections::BTreeSet;
use tracing::warn;

/// Names an expression reads
///
/// Unit symbols are included since a scope variable may shadow one.
/// Unparseable input yields an empty set; the evaluation step reports the
/// actual error for that line.
pub fn dependencies(expr: &str) -> BTreeSet<String> {
    match free_variables(expr) {
        Ok(names) => names,
        Err(e) => {
            warn!(expr, error = %e, "Dependency analysis failed");
            BTreeSet::new()
        }
    }
}
