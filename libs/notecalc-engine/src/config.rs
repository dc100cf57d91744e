//! Calculation settings and layered configuration loading

use crate::error::{EngineError, Result};
use crate::normalize::UnitSystem;
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix (`NOTECALC_UNIT_SYSTEM=US`)
pub const ENV_PREFIX: &str = "NOTECALC_";

/// Settings consumed by the calculation engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalcSettings {
    /// Keep scope state between passes; when false the caller resets explicitly
    #[serde(alias = "autoRecalculate")]
    pub auto_recalculate: bool,
    /// Preferred display unit system
    #[serde(alias = "unitSystem")]
    pub unit_system: UnitSystem,
    /// Decimal places (not significant digits)
    pub precision: u32,
    /// Expose global constants to every document
    #[serde(alias = "globalVariablesEnabled")]
    pub global_variables_enabled: bool,
    /// Two-line `symbolic / = result` rendering
    #[serde(alias = "equationRenderingEnabled")]
    pub equation_rendering_enabled: bool,
}

impl Default for CalcSettings {
    fn default() -> Self {
        Self {
            auto_recalculate: true,
            unit_system: UnitSystem::Si,
            precision: 4,
            global_variables_enabled: true,
            equation_rendering_enabled: false,
        }
    }
}

impl CalcSettings {
    /// The settings that shape display strings
    pub(crate) fn display_key(&self) -> (UnitSystem, u32) {
        (self.unit_system, self.precision)
    }
}

/// Load settings from multiple sources
///
/// Priority (highest to lowest):
/// 1. Environment variables (`NOTECALC_*`)
/// 2. The given file (TOML, YAML or JSON by extension)
/// 3. Default values (`CalcSettings::default`)
pub fn load_settings(path: Option<&Path>) -> Result<CalcSettings> {
    // Missing keys fall back through `#[serde(default)]`
    let mut figment = Figment::new();

    if let Some(path) = path {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EngineError::config("Config file must have an extension"))?;
        figment = match extension {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => {
                return Err(EngineError::config(format!(
                    "Unsupported config file format: {}",
                    extension
                )))
            }
        };
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .map_err(|e| EngineError::config(format!("Failed to load configuration: {}", e)))
}
