//! Calculation engine
//!
//! Evaluates calc blocks against the scope of their document. A line is
//! recomputed only when its text, its dependency set, something it reads
//! or the render settings it was shown under changed. Everything else is
//! served from the scope (assignments) or the line cache (expressions and
//! conversions).

use crate::classify::{LineClassifier, Statement};
use crate::config::CalcSettings;
use crate::constants::{GlobalConstant, GlobalConstantStore};
use crate::deps::dependencies;
use crate::error::{EngineError, Result};
use crate::format::{EquationParts, FormattedValue};
use crate::persist::{ConstantPersistence, NullPersistence};
use crate::scope::{
    line_key, LineCacheEntry, LineKind, LineRef, NoteScope, RenderStamp, ScopeStore, Variable,
};
use notecalc_units::{known_units, Expression, Unit, Value};
use rustc_hash::FxHasher;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use tracing::{debug, info, trace};

/// Per-call block options supplied by the document surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockOptions {
    /// Stable editor position of the block, if the surface has one
    pub position: Option<u64>,
    /// Clear the scope first (honoured only when auto-recalculate is off)
    pub reset_before: bool,
}

impl BlockOptions {
    pub fn at(position: u64) -> Self {
        Self {
            position: Some(position),
            reset_before: false,
        }
    }
}

/// Rendered outcome of one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineResult {
    Comment {
        text: String,
    },
    Assignment {
        name: String,
        expr: String,
        display: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        equation: Option<EquationParts>,
    },
    Conversion {
        expr: String,
        target: String,
        display: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        equation: Option<EquationParts>,
    },
    Expression {
        expr: String,
        display: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        equation: Option<EquationParts>,
    },
    Error {
        message: String,
    },
}

impl LineResult {
    fn error(err: impl std::fmt::Display) -> Self {
        LineResult::Error {
            message: err.to_string(),
        }
    }

    /// Display text of an evaluated line
    pub fn display(&self) -> Option<&str> {
        match self {
            LineResult::Assignment { display, .. }
            | LineResult::Conversion { display, .. }
            | LineResult::Expression { display, .. } => Some(display),
            LineResult::Comment { .. } | LineResult::Error { .. } => None,
        }
    }

    pub fn equation(&self) -> Option<&EquationParts> {
        match self {
            LineResult::Assignment { equation, .. }
            | LineResult::Conversion { equation, .. }
            | LineResult::Expression { equation, .. } => equation.as_ref(),
            LineResult::Comment { .. } | LineResult::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            LineResult::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LineResult::Error { .. })
    }
}

/// Cache partition of a block
///
/// `pos:<n>` when the surface supplies a position, otherwise a content
/// hash. Blocks with identical text share a partition under the hash form.
/// Only the most recently evaluated hash partitions keep their line cache.
pub fn block_key(source: &str, position: Option<u64>) -> String {
    match position {
        Some(position) => format!("pos:{}", position),
        None => format!("hash:{:016x}", content_hash(source)),
    }
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Partition shared by every inline statement of a document
const INLINE_BLOCK_KEY: &str = "inline";

/// Scope-change callback, receives the document id
pub type ScopeListener = Box<dyn Fn(&str)>;

/// Scoped, incremental evaluator for calc blocks
pub struct CalcEngine<P: ConstantPersistence = NullPersistence> {
    settings: CalcSettings,
    scopes: ScopeStore,
    constants: GlobalConstantStore<P>,
    classifier: LineClassifier,
    listeners: Vec<ScopeListener>,
}

impl CalcEngine<NullPersistence> {
    /// Engine with an empty, unpersisted constant store
    pub fn with_settings(settings: CalcSettings) -> Result<Self> {
        Self::new(settings, GlobalConstantStore::new(NullPersistence))
    }
}

impl<P: ConstantPersistence> CalcEngine<P> {
    pub fn new(settings: CalcSettings, mut constants: GlobalConstantStore<P>) -> Result<Self> {
        constants.set_display(settings.unit_system, settings.precision);
        Ok(Self {
            settings,
            scopes: ScopeStore::new(),
            constants,
            classifier: LineClassifier::new()?,
            listeners: Vec::new(),
        })
    }

    pub fn settings(&self) -> &CalcSettings {
        &self.settings
    }

    /// Replace the settings; displays refresh on the next pass
    pub fn set_settings(&mut self, settings: CalcSettings) {
        self.constants
            .set_display(settings.unit_system, settings.precision);
        self.settings = settings;
    }

    pub fn constants(&self) -> &GlobalConstantStore<P> {
        &self.constants
    }

    pub fn evaluate_block(&mut self, source: &str, document_id: &str) -> Vec<LineResult> {
        self.evaluate_block_with(source, document_id, BlockOptions::default())
    }

    pub fn evaluate_block_with(
        &mut self,
        source: &str,
        document_id: &str,
        options: BlockOptions,
    ) -> Vec<LineResult> {
        let key = block_key(source, options.position);
        let results = self.run(source, document_id, &key, options.reset_before);
        self.notify(document_id);
        results
    }

    /// Evaluate one free-standing statement in the document's scope
    pub fn evaluate_inline(&mut self, expression: &str, document_id: &str) -> LineResult {
        let Some(line) = expression.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return LineResult::error("Expression is required");
        };
        let result = self
            .run(line, document_id, INLINE_BLOCK_KEY, false)
            .into_iter()
            .next()
            .unwrap_or_else(|| LineResult::error("Expression is required"));
        self.notify(document_id);
        result
    }

    /// Reset one document's scope
    pub fn clear_scope(&mut self, document_id: &str) {
        if self.scopes.clear(document_id) {
            info!(document_id, "Scope cleared");
            self.notify(document_id);
        }
    }

    /// Reset every scope, notifying once per document that held state
    pub fn clear_all_scopes(&mut self) {
        let cleared = self.scopes.clear_all();
        info!("Cleared {} scopes", cleared.len());
        for document_id in &cleared {
            self.notify(document_id);
        }
    }

    pub fn peek_scope(&self, document_id: &str) -> Option<&NoteScope> {
        self.scopes.get(document_id)
    }

    pub fn global_variables(&self) -> BTreeMap<String, Value> {
        self.constants.values()
    }

    pub fn list_global_vars(&self) -> Vec<GlobalConstant> {
        self.constants.snapshot()
    }

    pub fn upsert_global_var(&mut self, name: &str, expr: &str) -> Result<GlobalConstant> {
        self.constants.upsert(name, expr)
    }

    pub fn delete_global_var(&mut self, name: &str) -> Result<()> {
        self.constants.delete(name)
    }

    pub fn list_known_units(&self) -> Vec<&'static str> {
        known_units()
    }

    pub fn on_scope_changed(&mut self, listener: impl Fn(&str) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&self, document_id: &str) {
        for listener in &self.listeners {
            listener(document_id);
        }
    }

    fn run(
        &mut self,
        source: &str,
        document_id: &str,
        block_key: &str,
        reset_before: bool,
    ) -> Vec<LineResult> {
        if reset_before && !self.settings.auto_recalculate && self.scopes.clear(document_id) {
            debug!(document_id, "Scope reset before evaluation");
        }

        let stamp = RenderStamp::new(&self.settings, self.constants.revision());
        let constants = self
            .settings
            .global_variables_enabled
            .then(|| self.constants.values());
        let scope = self.scopes.get_or_create(document_id);
        if block_key.starts_with("hash:") {
            let evicted = scope.retain_hash_partition(block_key);
            if evicted > 0 {
                debug!(document_id, evicted, "Evicted line cache of old block versions");
            }
        }

        let mut pass = Pass {
            scope,
            settings: &self.settings,
            constants: constants.as_ref(),
            block_key,
            stamp,
            touched: BTreeSet::new(),
        };

        let mut results = Vec::new();
        for (index, line) in source.lines().enumerate() {
            let Some(statement) = self.classifier.classify(line) else {
                continue;
            };
            let result = match statement {
                Ok(statement) => pass.line(index, statement),
                Err(e) => {
                    pass.forget(index);
                    LineResult::error(e)
                }
            };
            results.push(result);
        }

        let touched = std::mem::take(&mut pass.touched);
        let scope = pass.scope;
        let pruned = scope.prune_block(block_key, &touched);
        if pruned > 0 {
            debug!(block_key, pruned, "Pruned stale line cache entries");
        }
        scope.fresh = false;
        results
    }
}

/// State of one block evaluation
struct Pass<'a> {
    scope: &'a mut NoteScope,
    settings: &'a CalcSettings,
    constants: Option<&'a BTreeMap<String, Value>>,
    block_key: &'a str,
    stamp: RenderStamp,
    touched: BTreeSet<String>,
}

impl Pass<'_> {
    fn line(&mut self, index: usize, statement: Statement) -> LineResult {
        match statement {
            Statement::Comment(text) => LineResult::Comment { text },
            Statement::Assignment { name, expr, target } => {
                self.assignment(index, name, expr, target)
            }
            Statement::Conversion { expr, target } => self.cached(index, expr, Some(target)),
            Statement::Expression(expr) => self.cached(index, expr, None),
        }
    }

    /// Drop the cache entry of a line that failed to classify
    fn forget(&mut self, index: usize) {
        self.scope
            .line_cache
            .remove(&line_key(self.block_key, index));
    }

    fn assignment_reason(
        &self,
        name: &str,
        formula: &str,
        deps: &BTreeSet<String>,
    ) -> Option<&'static str> {
        let Some(variable) = self.scope.variables.get(name) else {
            return Some("new");
        };
        if self.scope.formula(name) != Some(formula) {
            return Some("formula changed");
        }
        if self.scope.depends_on.get(name) != Some(deps) {
            return Some("dependencies changed");
        }
        if self.scope.any_changed_since(deps, variable.computed_at) {
            return Some("upstream changed");
        }
        if variable.rendered != self.stamp {
            return Some("render settings changed");
        }
        None
    }

    fn assignment(
        &mut self,
        index: usize,
        name: String,
        expr: String,
        target: Option<String>,
    ) -> LineResult {
        let formula = match &target {
            Some(target) => format!("{} -> {}", expr, target),
            None => expr.clone(),
        };
        let deps = dependencies(&expr);

        let outcome = match self.assignment_reason(&name, &formula, &deps) {
            None => {
                trace!(name = %name, "Assignment unchanged");
                self.scope
                    .variables
                    .get(&name)
                    .map(|v| v.display.clone())
                    .ok_or_else(|| EngineError::parse(format!("Undefined symbol {}", name)))
            }
            Some(reason) => self.recompute_variable(index, &name, &expr, target.as_deref(), reason),
        };

        self.scope.set_dependencies(&name, &deps);
        if self.scope.formula(&name) != Some(formula.as_str()) {
            self.scope.formulas.insert(name.clone(), formula.clone());
        }

        match outcome {
            Ok(display) => LineResult::Assignment {
                equation: self
                    .settings
                    .equation_rendering_enabled
                    .then(|| EquationParts::assignment(&name, &formula, &display)),
                name,
                expr: formula,
                display,
            },
            Err(e) => LineResult::error(e),
        }
    }

    fn recompute_variable(
        &mut self,
        index: usize,
        name: &str,
        expr: &str,
        target: Option<&str>,
        reason: &'static str,
    ) -> Result<String> {
        match self.compute(expr, target) {
            Ok((value, formatted)) => {
                let changed = match self.scope.variables.get(name) {
                    Some(old) => old.display != formatted.display || old.value != value,
                    None => true,
                };
                if changed {
                    self.scope.mark_changed(name);
                }
                debug!(name, reason, display = %formatted.display, changed, "Assignment recomputed");

                let display = formatted.display.clone();
                let computed_at = self.scope.tick();
                self.scope.variables.insert(
                    name.to_string(),
                    Variable {
                        name: name.to_string(),
                        value,
                        magnitude: formatted.magnitude,
                        unit: formatted.unit,
                        display: formatted.display,
                        defining_line: Some(LineRef::new(self.block_key, index)),
                        computed_at,
                        rendered: self.stamp,
                    },
                );
                Ok(display)
            }
            Err(e) => {
                if self.scope.variables.remove(name).is_some() {
                    self.scope.mark_changed(name);
                }
                debug!(name, error = %e, "Assignment failed");
                Err(e)
            }
        }
    }

    /// Expression and conversion lines, served from the line cache when fresh
    fn cached(&mut self, index: usize, expr: String, target: Option<String>) -> LineResult {
        let key = line_key(self.block_key, index);
        self.touched.insert(key.clone());
        let deps = dependencies(&expr);

        if let Some(entry) = self.scope.line_cache.get(&key) {
            let fresh = entry.rendered == self.stamp
                && entry.expr == expr
                && entry.target_unit == target
                && entry.dependencies == deps
                && !self.scope.any_changed_since(&deps, entry.computed_at);
            if fresh {
                trace!(key = %key, "Line cache hit");
                let display = entry.display.clone();
                return self.line_result(expr, target, display);
            }
        }

        match self.compute(&expr, target.as_deref()) {
            Ok((value, formatted)) => {
                debug!(key = %key, display = %formatted.display, "Line recomputed");
                let computed_at = self.scope.tick();
                let kind = if target.is_some() {
                    LineKind::Conversion
                } else {
                    LineKind::Expression
                };
                self.scope.line_cache.insert(
                    key,
                    LineCacheEntry {
                        expr: expr.clone(),
                        value,
                        display: formatted.display.clone(),
                        dependencies: deps,
                        kind,
                        target_unit: target.clone(),
                        computed_at,
                        rendered: self.stamp,
                    },
                );
                self.line_result(expr, target, formatted.display)
            }
            Err(e) => {
                self.scope.line_cache.remove(&key);
                LineResult::error(e)
            }
        }
    }

    fn line_result(&self, expr: String, target: Option<String>, display: String) -> LineResult {
        let equations = self.settings.equation_rendering_enabled;
        match target {
            Some(target) => LineResult::Conversion {
                equation: equations.then(|| EquationParts::conversion(&expr, &target, &display)),
                expr,
                target,
                display,
            },
            None => LineResult::Expression {
                equation: equations.then(|| EquationParts::expression(&expr, &display)),
                expr,
                display,
            },
        }
    }

    /// Evaluate against scope variables over constants
    ///
    /// With a target the value is converted and shown as-is; otherwise it
    /// is normalized to the preferred unit system for display only.
    fn compute(&self, expr: &str, target: Option<&str>) -> Result<(Value, FormattedValue)> {
        let binding = self.scope.binding(self.constants);
        let value = Expression::parse(expr)?.evaluate(&binding)?;
        let precision = self.settings.precision;
        match target {
            Some(target) => {
                let unit = Unit::parse(target)?;
                let converted = value.to(&unit)?;
                let formatted = FormattedValue::exact(&converted, precision);
                Ok((converted, formatted))
            }
            None => {
                let formatted =
                    FormattedValue::normalized(&value, self.settings.unit_system, precision);
                Ok((value, formatted))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn engine() -> CalcEngine {
        CalcEngine::with_settings(CalcSettings::default()).unwrap()
    }

    #[test]
    fn test_block_key_forms() {
        assert_eq!(block_key("a = 1", Some(7)), "pos:7");
        assert!(block_key("a = 1", None).starts_with("hash:"));
        assert_eq!(block_key("a = 1", None), block_key("a = 1", None));
        assert_ne!(block_key("a = 1", None), block_key("a = 2", None));
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let mut engine = engine();
        let results = engine.evaluate_block("a = 1\n\n   \nb = 2", "doc");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_comment_row() {
        let mut engine = engine();
        let results = engine.evaluate_block("// heading", "doc");
        assert_eq!(
            results,
            vec![LineResult::Comment {
                text: "// heading".into()
            }]
        );
    }

    #[test]
    fn test_assignment_records_scope_state() {
        let mut engine = engine();
        engine.evaluate_block_with("a = 2\nb = a * 3 m", "doc", BlockOptions::at(4));
        let scope = engine.peek_scope("doc").unwrap();
        let b = scope.variable("b").unwrap();
        assert_eq!(b.display, "6 m");
        assert_eq!(b.defining_line, Some(LineRef::new("pos:4", 1)));
        assert_eq!(scope.formula("b"), Some("a * 3 m"));
        assert!(scope.dependents("a").unwrap().contains("b"));
    }

    #[test]
    fn test_independent_variable_is_not_recomputed() {
        let mut engine = engine();
        let options = BlockOptions::at(0);
        engine.evaluate_block_with("a = 1\nb = 5\nc = b + 1", "doc", options);
        let before = engine.peek_scope("doc").unwrap().variable("c").unwrap().clone();

        engine.evaluate_block_with("a = 2\nb = 5\nc = b + 1", "doc", options);
        let scope = engine.peek_scope("doc").unwrap();
        assert_eq!(scope.variable("a").unwrap().display, "2");
        let after = scope.variable("c").unwrap();
        assert_eq!(after.computed_at, before.computed_at);
        assert_eq!(after.display, before.display);
    }

    #[test]
    fn test_hash_keyed_edit_skips_independent_variable() {
        let mut engine = engine();
        engine.evaluate_block("a = 1\nb = 5\nc = b + 1", "doc");
        let scope = engine.peek_scope("doc").unwrap();
        let (b_before, c_before) = (
            scope.variable("b").unwrap().computed_at,
            scope.variable("c").unwrap().computed_at,
        );

        engine.evaluate_block("a = 2\nb = 5\nc = b + 1", "doc");
        let scope = engine.peek_scope("doc").unwrap();
        assert_eq!(scope.variable("a").unwrap().display, "2");
        assert_eq!(scope.variable("b").unwrap().computed_at, b_before);
        assert_eq!(scope.variable("c").unwrap().computed_at, c_before);
    }

    #[test]
    fn test_settings_change_rerenders_hash_keyed_block() {
        let mut engine = engine();
        let source = "mass = 5 kg\nmass * 2";
        engine.evaluate_block(source, "doc");
        engine.set_settings(CalcSettings {
            unit_system: crate::UnitSystem::Us,
            ..Default::default()
        });
        let results = engine.evaluate_block(source, "doc");
        assert_eq!(results[0].display(), Some("11.0231 lb"));
        assert_eq!(results[1].display(), Some("22.0462 lb"));
    }

    #[test]
    fn test_edits_and_inline_calls_do_not_grow_state() {
        let mut engine = engine();
        for n in 0..100 {
            engine.evaluate_block(&format!("x = {}\nx + 1", n), "doc");
            engine.evaluate_inline(&format!("x * {}", n), "doc");
        }
        let scope = engine.peek_scope("doc").unwrap();
        assert!(scope.hash_partitions.len() <= 32);
        // one entry per retained block version plus the single inline line
        assert!(scope.line_cache().len() <= 33, "{}", scope.line_cache().len());
        assert_eq!(
            scope.line_cache().keys().filter(|k| k.starts_with("inline:")).count(),
            1
        );
    }

    #[test]
    fn test_unchanged_block_leaves_clock_alone() {
        let mut engine = engine();
        let source = "a = 1 m\nb = a * 2\nb to ft\nb + 1 m";
        engine.evaluate_block(source, "doc");
        let clock = engine.peek_scope("doc").unwrap().clock;
        engine.evaluate_block(source, "doc");
        assert_eq!(engine.peek_scope("doc").unwrap().clock, clock);
    }

    #[test]
    fn test_later_change_reaches_earlier_reader_next_pass() {
        let mut engine = engine();
        let options = BlockOptions::at(0);
        engine.evaluate_block_with("x = 1", "doc", BlockOptions::at(1));
        let first = engine.evaluate_block_with("x + 1", "doc", options);
        assert_eq!(first[0].display(), Some("2"));

        engine.evaluate_block_with("x = 5", "doc", BlockOptions::at(1));
        let second = engine.evaluate_block_with("x + 1", "doc", options);
        assert_eq!(second[0].display(), Some("6"));
    }

    #[test]
    fn test_assignment_with_target_unit() {
        let mut engine = engine();
        let results = engine.evaluate_block("d = 3 m to ft", "doc");
        assert_eq!(results[0].display(), Some("9.8425 ft"));
    }

    #[test]
    fn test_conversion_failure_is_line_error() {
        let mut engine = engine();
        let results = engine.evaluate_block("5 kg -> m", "doc");
        let message = results[0].error_message().unwrap();
        assert!(message.starts_with("Units do not match"), "{message}");
        assert!(engine.peek_scope("doc").unwrap().line_cache().is_empty());
    }

    #[test]
    fn test_bad_convert_syntax_row() {
        let mut engine = engine();
        let results = engine.evaluate_block("5 m ->", "doc");
        assert_eq!(
            results[0].error_message(),
            Some("Bad convert syntax. Use: expr -> unit")
        );
    }

    #[test]
    fn test_equation_parts_when_enabled() {
        let settings = CalcSettings {
            equation_rendering_enabled: true,
            ..Default::default()
        };
        let mut engine = CalcEngine::with_settings(settings).unwrap();
        let results = engine.evaluate_block("a = 2\na * 3", "doc");
        let parts = results[1].equation().unwrap();
        assert_eq!(parts.symbolic, "a * 3");
        assert_eq!(parts.result, "= 6");
    }

    #[test]
    fn test_listener_receives_document_id() {
        let mut engine = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        engine.on_scope_changed(move |doc| sink.borrow_mut().push(doc.to_string()));
        engine.evaluate_block("a = 1", "notes/a.md");
        engine.evaluate_inline("a + 1", "notes/a.md");
        assert_eq!(*seen.borrow(), vec!["notes/a.md", "notes/a.md"]);
    }

    #[test]
    fn test_clear_all_notifies_each_document() {
        let mut engine = engine();
        engine.evaluate_block("a = 1", "a.md");
        engine.evaluate_block("b = 2", "b.md");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        engine.on_scope_changed(move |doc| sink.borrow_mut().push(doc.to_string()));

        engine.clear_all_scopes();
        assert_eq!(*seen.borrow(), vec!["a.md", "b.md"]);
        engine.clear_all_scopes();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_inline_uses_document_scope() {
        let mut engine = engine();
        engine.evaluate_block("rate = 3 m/s", "doc");
        let result = engine.evaluate_inline("rate * 2 s", "doc");
        assert_eq!(result.display(), Some("6 m"));
        assert!(engine.evaluate_inline("   ", "doc").is_error());
    }

    #[test]
    fn test_line_result_serializes_with_kind_tag() {
        let result = LineResult::Expression {
            expr: "1 + 1".into(),
            display: "2".into(),
            equation: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "expression");
        assert!(json.get("equation").is_none());
    }
}
