//! Per-document evaluation state
//!
//! A [`NoteScope`] holds the variables of one document together with the
//! formulas that produced them, a forward/reverse dependency graph and the
//! result cache of non-assignment lines.

use crate::config::CalcSettings;
use crate::normalize::UnitSystem;
use notecalc_units::Value;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Content-hash partitions whose line cache is kept per scope
const MAX_HASH_PARTITIONS: usize = 32;

/// Where a variable was defined
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LineRef {
    pub block_key: String,
    pub index: usize,
}

impl LineRef {
    pub fn new(block_key: &str, index: usize) -> Self {
        Self {
            block_key: block_key.to_string(),
            index,
        }
    }

    /// `blockKey:index`
    pub fn key(&self) -> String {
        line_key(&self.block_key, self.index)
    }
}

pub(crate) fn line_key(block_key: &str, index: usize) -> String {
    format!("{}:{}", block_key, index)
}

/// A named value in a document scope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub magnitude: String,
    pub unit: String,
    /// Derived from `value` under the display settings of the last pass
    pub display: String,
    pub defining_line: Option<LineRef>,
    #[serde(skip)]
    pub(crate) computed_at: u64,
    #[serde(skip)]
    pub(crate) rendered: RenderStamp,
}

/// Kind of a cached (non-assignment) line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Expression,
    Conversion,
}

/// Cached outcome of a plain expression or conversion line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineCacheEntry {
    pub expr: String,
    pub value: Value,
    pub display: String,
    pub dependencies: BTreeSet<String>,
    pub kind: LineKind,
    pub target_unit: Option<String>,
    #[serde(skip)]
    pub(crate) computed_at: u64,
    #[serde(skip)]
    pub(crate) rendered: RenderStamp,
}

/// Display settings and constants revision a value was rendered under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RenderStamp {
    pub unit_system: UnitSystem,
    pub precision: u32,
    pub globals: bool,
    pub constants_revision: u64,
}

impl RenderStamp {
    pub fn new(settings: &CalcSettings, constants_revision: u64) -> Self {
        let (unit_system, precision) = settings.display_key();
        Self {
            unit_system,
            precision,
            globals: settings.global_variables_enabled,
            constants_revision,
        }
    }
}

/// Evaluation state bound to one document
#[derive(Debug, Default)]
pub struct NoteScope {
    pub(crate) variables: BTreeMap<String, Variable>,
    pub(crate) formulas: BTreeMap<String, String>,
    pub(crate) depends_on: BTreeMap<String, BTreeSet<String>>,
    pub(crate) dependents: BTreeMap<String, BTreeSet<String>>,
    pub(crate) line_cache: BTreeMap<String, LineCacheEntry>,
    /// Tick of the last display change per name, removals included
    pub(crate) changed_at: BTreeMap<String, u64>,
    /// `hash:` block keys with cache entries, least recently evaluated first
    pub(crate) hash_partitions: VecDeque<String>,
    pub(crate) clock: u64,
    /// Cleared and not evaluated since
    pub(crate) fresh: bool,
}

impl NoteScope {
    pub fn new() -> Self {
        Self {
            fresh: true,
            ..Default::default()
        }
    }

    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn formula(&self, name: &str) -> Option<&str> {
        self.formulas.get(name).map(String::as_str)
    }

    pub fn depends_on(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.depends_on.get(name)
    }

    pub fn dependents(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependents.get(name)
    }

    /// Forward edges: name to the names it reads
    pub fn forward_edges(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.depends_on
    }

    /// Reverse edges: name to the names reading it
    pub fn reverse_edges(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.dependents
    }

    pub fn line_cache(&self) -> &BTreeMap<String, LineCacheEntry> {
        &self.line_cache
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
            && self.formulas.is_empty()
            && self.depends_on.is_empty()
            && self.line_cache.is_empty()
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Empty every map
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Record that `name` changed, so readers computed earlier go stale
    pub(crate) fn mark_changed(&mut self, name: &str) {
        let now = self.tick();
        self.changed_at.insert(name.to_string(), now);
    }

    /// Did any of `deps` change after tick `since`
    pub(crate) fn any_changed_since(&self, deps: &BTreeSet<String>, since: u64) -> bool {
        deps.iter()
            .any(|d| self.changed_at.get(d).is_some_and(|&t| t > since))
    }

    /// Replace the forward edges of `name`, keeping the reverse map in step
    pub(crate) fn set_dependencies(&mut self, name: &str, deps: &BTreeSet<String>) {
        if self.depends_on.get(name) == Some(deps) {
            return;
        }
        let previous = self.depends_on.get(name).cloned().unwrap_or_default();

        for removed in previous.difference(deps) {
            if let Some(set) = self.dependents.get_mut(removed) {
                set.remove(name);
                if set.is_empty() {
                    self.dependents.remove(removed);
                }
            }
        }
        for added in deps.difference(&previous) {
            self.dependents
                .entry(added.clone())
                .or_default()
                .insert(name.to_string());
        }
        self.depends_on.insert(name.to_string(), deps.clone());
    }

    /// Variables read by the binding: scope over constants
    pub(crate) fn binding<'a>(
        &'a self,
        constants: Option<&'a BTreeMap<String, Value>>,
    ) -> Binding<'a> {
        Binding {
            scope: &self.variables,
            constants,
        }
    }

    /// Drop cache entries of `block_key` not in `touched`
    pub(crate) fn prune_block(&mut self, block_key: &str, touched: &BTreeSet<String>) -> usize {
        let prefix = format!("{}:", block_key);
        let before = self.line_cache.len();
        self.line_cache
            .retain(|key, _| !key.starts_with(&prefix) || touched.contains(key));
        before - self.line_cache.len()
    }

    /// Mark a content-hash partition as most recent, evicting the oldest
    /// partitions past [`MAX_HASH_PARTITIONS`]. Returns the entries dropped.
    pub(crate) fn retain_hash_partition(&mut self, block_key: &str) -> usize {
        if self.hash_partitions.back().map(String::as_str) != Some(block_key) {
            self.hash_partitions.retain(|key| key != block_key);
            self.hash_partitions.push_back(block_key.to_string());
        }
        let mut evicted = 0;
        while self.hash_partitions.len() > MAX_HASH_PARTITIONS {
            if let Some(oldest) = self.hash_partitions.pop_front() {
                evicted += self.prune_block(&oldest, &BTreeSet::new());
            }
        }
        evicted
    }
}

/// Lookup over scope variables, falling back to global constants
pub(crate) struct Binding<'a> {
    scope: &'a BTreeMap<String, Variable>,
    constants: Option<&'a BTreeMap<String, Value>>,
}

impl notecalc_units::Lookup for Binding<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scope
            .get(name)
            .map(|v| &v.value)
            .or_else(|| self.constants.and_then(|c| c.get(name)))
    }
}

/// All scopes, keyed by document identity
#[derive(Debug, Default)]
pub struct ScopeStore {
    scopes: FxHashMap<String, NoteScope>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, document_id: &str) -> Option<&NoteScope> {
        self.scopes.get(document_id)
    }

    /// Resolve the scope, creating it lazily
    pub fn get_or_create(&mut self, document_id: &str) -> &mut NoteScope {
        self.scopes
            .entry(document_id.to_string())
            .or_insert_with(NoteScope::new)
    }

    /// Clear a document's scope; no-op if it is already fresh or absent
    pub fn clear(&mut self, document_id: &str) -> bool {
        match self.scopes.get_mut(document_id) {
            Some(scope) if !scope.fresh => {
                scope.clear();
                true
            }
            _ => false,
        }
    }

    /// Drop every scope, returning the documents that were not fresh
    pub fn clear_all(&mut self) -> Vec<String> {
        let mut cleared: Vec<String> = self
            .scopes
            .drain()
            .filter(|(_, scope)| !scope.fresh)
            .map(|(document_id, _)| document_id)
            .collect();
        cleared.sort_unstable();
        cleared
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
