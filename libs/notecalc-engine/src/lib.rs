//! notecalc-engine - Scoped, incremental evaluation of calc blocks
//!
//! A document contains fenced blocks of one-statement lines:
//!
//! ```text
//! // pump sizing
//! flow = 15 gal/min
//! head = 12 m
//! power = 1000 kg/m^3 * 9.81 m/s^2 * flow * head
//! power -> hp
//! ```
//!
//! [`CalcEngine`] keeps one [`NoteScope`] per document and re-evaluates
//! only the lines whose text, dependencies or upstream values changed.
//! Results are displayed in the configured unit system (SI or US) without
//! altering the stored values.
//!
//! # Example
//!
//! ```rust
//! use notecalc_engine::{CalcEngine, CalcSettings, UnitSystem};
//!
//! let settings = CalcSettings {
//!     unit_system: UnitSystem::Us,
//!     ..Default::default()
//! };
//! let mut engine = CalcEngine::with_settings(settings).unwrap();
//! let results = engine.evaluate_block("mass = 5 kg\nmass * 2", "notes/pump.md");
//! assert_eq!(results[0].display(), Some("11.0231 lb"));
//! assert_eq!(results[1].display(), Some("22.0462 lb"));
//! ```

pub mod classify;
pub mod config;
pub mod constants;
pub mod deps;
pub mod engine;
pub mod error;
pub mod format;
pub mod normalize;
pub mod persist;
pub mod scope;

// Re-exports for convenience
pub use classify::{LineClassifier, Statement};
pub use config::{load_settings, CalcSettings};
pub use constants::{GlobalConstant, GlobalConstantStore};
pub use engine::{block_key, BlockOptions, CalcEngine, LineResult};
pub use error::{EngineError, Result};
pub use format::{format_number, EquationParts, FormattedValue};
pub use normalize::{normalize, UnitSystem};
pub use persist::{
    ConstantPersistence, JsonFilePersistence, MemoryPersistence, NullPersistence,
    PersistedConstant,
};
pub use scope::{LineCacheEntry, LineKind, LineRef, NoteScope, Variable};
