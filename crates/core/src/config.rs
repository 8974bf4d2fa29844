//! Typed project configuration (§6 "Configuration").
//!
//! The wire format is TOML rather than the original system's XML dialect —
//! `project.toml` — deserialized into a fully typed tree with `serde`, the
//! way the teacher types its on-disk state rather than hand-parsing it.
//! Call sites that need compile-time-checked field access use the struct
//! directly; [`ProjectConfig::get_path`] additionally exposes the tree as a
//! dotted-path key/value store for the handful of callers (output setup,
//! diagnostics) that only know a path string at runtime.

use crate::error::SetupError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_cell_size() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldLocation {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl Default for WorldLocation {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            rotation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    pub buffer: f64,
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    #[serde(default)]
    pub location: WorldLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClimateConfig {
    pub table_name: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_batch_years")]
    pub batch_years: u32,
    #[serde(default)]
    pub random_sampling_enabled: bool,
    #[serde(default)]
    pub random_sampling_list: Vec<u32>,
    #[serde(default)]
    pub temperature_shift: f64,
    #[serde(default)]
    pub precipitation_shift: f64,
    #[serde(default)]
    pub co2pathway: Option<String>,
    #[serde(default)]
    pub co2start_year: Option<i32>,
    #[serde(default = "default_co2_concentration")]
    pub co2concentration: f64,
}

fn default_batch_years() -> u32 {
    10
}
fn default_co2_concentration() -> f64 {
    380.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilSettings {
    #[serde(default = "default_swd12")]
    pub swd_dbh_class12: f64,
    #[serde(default = "default_swd23")]
    pub swd_dbh_class23: f64,
    #[serde(default = "default_swd_single")]
    pub swd_dbh_single: f64,
    /// 4 monotone thresholds in (0,1], one per decay class boundary.
    #[serde(default = "default_decay_thresholds")]
    pub decay_class_thresholds: [f64; 4],
}

fn default_swd12() -> f64 {
    20.0
}
fn default_swd23() -> f64 {
    40.0
}
fn default_swd_single() -> f64 {
    10.0
}
fn default_decay_thresholds() -> [f64; 4] {
    [0.25, 0.5, 0.75, 1.0]
}

impl Default for SoilSettings {
    fn default() -> Self {
        Self {
            swd_dbh_class12: default_swd12(),
            swd_dbh_class23: default_swd23(),
            swd_dbh_single: default_swd_single(),
            decay_class_thresholds: default_decay_thresholds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PermafrostSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub max_permafrost_depth: f64,
    #[serde(default)]
    pub thermal_conductivity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvdStateSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_structure")]
    pub structure: String,
    #[serde(default = "default_functioning")]
    pub functioning: String,
}

fn default_structure() -> String {
    "4m".to_string()
}
fn default_functioning() -> String {
    "3".to_string()
}

impl Default for SvdStateSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            structure: default_structure(),
            functioning: default_functioning(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub carbon_cycle_enabled: bool,
    #[serde(default)]
    pub regeneration_enabled: bool,
    #[serde(default)]
    pub use_dynamic_available_nitrogen: bool,
    #[serde(default)]
    pub microclimate_enabled: bool,
    #[serde(default = "default_true")]
    pub multithreading: bool,
    #[serde(default)]
    pub thread_count: Option<usize>,
    #[serde(default = "default_seed")]
    pub random_seed: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub expression_linearization_enabled: bool,
    #[serde(default = "default_extinction")]
    pub light_extinction_coefficient: f64,
    #[serde(default = "default_temp_tau")]
    pub temperature_tau: f64,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default)]
    pub torus_mode: bool,
    #[serde(default)]
    pub soil: SoilSettings,
    #[serde(default)]
    pub permafrost: PermafrostSettings,
    #[serde(default)]
    pub svd_states: SvdStateSettings,
}

fn default_true() -> bool {
    true
}
fn default_seed() -> u64 {
    42
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_extinction() -> f64 {
    0.5
}
fn default_temp_tau() -> f64 {
    5.0
}
fn default_latitude() -> f64 {
    48.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            carbon_cycle_enabled: false,
            regeneration_enabled: false,
            use_dynamic_available_nitrogen: false,
            microclimate_enabled: false,
            multithreading: default_true(),
            thread_count: None,
            random_seed: default_seed(),
            log_level: default_log_level(),
            expression_linearization_enabled: false,
            light_extinction_coefficient: default_extinction(),
            temperature_tau: default_temp_tau(),
            latitude: default_latitude(),
            torus_mode: false,
            soil: SoilSettings::default(),
            permafrost: PermafrostSettings::default(),
            svd_states: SvdStateSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SiteConfig {
    #[serde(default)]
    pub pct_sand: f64,
    #[serde(default)]
    pub pct_clay: f64,
    #[serde(default)]
    pub available_nitrogen: f64,
    #[serde(default)]
    pub som_c: f64,
    #[serde(default)]
    pub som_n: f64,
    #[serde(default)]
    pub young_labile_c: f64,
    #[serde(default)]
    pub young_labile_n: f64,
    #[serde(default)]
    pub young_labile_decomp_rate: f64,
    #[serde(default)]
    pub young_refractory_c: f64,
    #[serde(default)]
    pub young_refractory_n: f64,
    #[serde(default)]
    pub young_refractory_decomp_rate: f64,
    #[serde(default)]
    pub delta_available_nitrogen: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhenologyGroupConfig {
    pub id: i32,
    pub vpd_min: f64,
    pub vpd_max: f64,
    pub day_length_min: f64,
    pub day_length_max: f64,
    pub temp_min: f64,
    pub temp_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpeciesConfig {
    #[serde(default)]
    pub phenology: Vec<PhenologyGroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub r#in: Option<String>,
    #[serde(default)]
    pub climate: Option<String>,
    #[serde(default)]
    pub out: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputTableConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub rufilter: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
    /// For a "customagg" output: the entity iterated (tree | sapling | ru | snag).
    #[serde(default)]
    pub entity: Option<String>,
    /// For a "customagg" output: the spatial scope (landscape | ru | stand).
    #[serde(default)]
    pub spatial_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub world: WorldConfig,
    #[serde(default)]
    pub climate: ClimateConfig,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub species: SpeciesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// The root of a `project.toml` (§6 "Configuration"): a tree-shaped
/// key/value store addressable either by typed field or by dotted path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub output: BTreeMap<String, OutputTableConfig>,
}

impl ProjectConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, SetupError> {
        toml::from_str(text).map_err(|e| SetupError::InvalidConfig(e.to_string()))
    }

    /// Look up a value by dotted path, e.g. `"model.world.width"`. Round-trips
    /// the whole tree through `serde_json::Value` once; intended for the
    /// handful of runtime-path callers (diagnostics, generic output setup),
    /// not hot loops.
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut cur = &root;
        for segment in path.split('.') {
            cur = cur.as_object()?.get(segment)?;
        }
        Some(cur.clone())
    }

    /// Validate the §6 range requirements that aren't expressible as pure
    /// serde constraints.
    pub fn validate(&self) -> Result<(), SetupError> {
        let w = &self.model.world;
        if w.width <= 0.0 || w.width.rem_euclid(100.0) != 0.0 {
            return Err(SetupError::InvalidWorldGeometry(format!(
                "width {} is not a positive multiple of 100",
                w.width
            )));
        }
        if w.height <= 0.0 || w.height.rem_euclid(100.0) != 0.0 {
            return Err(SetupError::InvalidWorldGeometry(format!(
                "height {} is not a positive multiple of 100",
                w.height
            )));
        }
        if w.buffer <= 0.0 || w.buffer.rem_euclid(20.0) != 0.0 {
            return Err(SetupError::InvalidWorldGeometry(format!(
                "buffer {} is not a positive multiple of 20",
                w.buffer
            )));
        }
        if (w.cell_size - 2.0).abs() > f64::EPSILON {
            return Err(SetupError::InvalidWorldGeometry(format!(
                "cellSize {} must be 2",
                w.cell_size
            )));
        }

        let thresholds = self.model.settings.soil.decay_class_thresholds;
        for t in thresholds {
            if !(0.0 < t && t <= 1.0) {
                return Err(SetupError::InvalidConfig(format!(
                    "decayClassThresholds entry {t} must be in (0,1]"
                )));
            }
        }
        if !thresholds.windows(2).all(|w| w[0] <= w[1]) {
            return Err(SetupError::InvalidConfig(
                "decayClassThresholds must be monotone non-decreasing".to_string(),
            ));
        }

        match self.model.settings.svd_states.structure.as_str() {
            "2m" | "4m" => {}
            other => {
                return Err(SetupError::InvalidConfig(format!(
                    "svdStates.structure '{other}' must be '2m' or '4m'"
                )))
            }
        }
        match self.model.settings.svd_states.functioning.as_str() {
            "3" | "5" => {}
            other => {
                return Err(SetupError::InvalidConfig(format!(
                    "svdStates.functioning '{other}' must be '3' or '5'"
                )))
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            [model.world]
            width = 200.0
            height = 200.0
            buffer = 60.0

            [model.climate]
            table_name = "uniform"
        "#
    }

    #[test]
    fn parses_minimal_project() {
        let cfg = ProjectConfig::from_toml_str(minimal_toml()).unwrap();
        assert_eq!(cfg.model.world.width, 200.0);
        assert_eq!(cfg.model.world.cell_size, 2.0);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_non_multiple_of_100_width() {
        let mut cfg = ProjectConfig::from_toml_str(minimal_toml()).unwrap();
        cfg.model.world.width = 150.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn get_path_resolves_nested_dotted_key() {
        let cfg = ProjectConfig::from_toml_str(minimal_toml()).unwrap();
        let v = cfg.get_path("model.world.width").unwrap();
        assert_eq!(v.as_f64(), Some(200.0));
        assert!(cfg.get_path("model.world.nonexistent").is_none());
    }
}
