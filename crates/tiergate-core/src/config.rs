//! Multi-source configuration composition.
//!
//! A run's configuration is built fresh for every orchestrator invocation
//! from three layers: built-in defaults, the global config file, and the
//! project config file. Layers are merged with JSON-Merge-Patch semantics
//! (RFC 7396): objects merge recursively with later layers winning,
//! `null` deletes a key, and arrays are replaced wholesale — never
//! concatenated. Missing or unparseable files degrade to the layers that
//! did load; composition itself never fails.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::{BuiltinDimension, DimensionConfig, Tier};

/// Relative location of the global config under `$HOME`.
const GLOBAL_CONFIG_REL: &str = ".claude/validation/global-config.json";

/// Relative location of the project config under the project root.
const PROJECT_CONFIG_REL: &str = ".claude/validation/config.json";

/// Which configuration sources contributed to a composed [`RunConfig`].
///
/// Diagnostic only; never consulted for run logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Whether the global config file loaded successfully.
    pub used_global: bool,

    /// Whether the project config file loaded successfully.
    pub used_project: bool,
}

/// Circuit-breaker limits for the iteration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackpressureConfig {
    /// Hard cap on loop iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Hard cap on accrued cost in USD.
    #[serde(default = "default_max_budget_usd")]
    pub max_budget_usd: f64,

    /// Consecutive Tier 1 blocks tolerated before escalation.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Iterations with an unchanged score tolerated before escalation.
    #[serde(default = "default_max_no_progress")]
    pub max_no_progress: u32,

    /// Cost accrued per iteration when no external figure is supplied.
    #[serde(default = "default_cost_per_iteration")]
    pub estimated_cost_per_iteration: f64,

    /// Combined score at which the loop declares convergence.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_budget_usd() -> f64 {
    5.0
}
fn default_max_consecutive_errors() -> u32 {
    3
}
fn default_max_no_progress() -> u32 {
    3
}
fn default_cost_per_iteration() -> f64 {
    0.25
}
fn default_min_score() -> f64 {
    90.0
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_budget_usd: default_max_budget_usd(),
            max_consecutive_errors: default_max_consecutive_errors(),
            max_no_progress: default_max_no_progress(),
            estimated_cost_per_iteration: default_cost_per_iteration(),
            min_score: default_min_score(),
        }
    }
}

/// Weights for folding Tier 2/3 pass rates into one convergence score.
///
/// `score = 100 * (w2 * rate2 + w3 * rate3) / (w2 + w3)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of the Tier 2 (warning) pass rate.
    #[serde(default = "default_tier2_weight")]
    pub tier2_weight: f64,

    /// Weight of the Tier 3 (monitor) pass rate.
    #[serde(default = "default_tier3_weight")]
    pub tier3_weight: f64,
}

fn default_tier2_weight() -> f64 {
    0.7
}
fn default_tier3_weight() -> f64 {
    0.3
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tier2_weight: default_tier2_weight(),
            tier3_weight: default_tier3_weight(),
        }
    }
}

/// Fully merged, read-only configuration for one run.
///
/// Shared by reference across all concurrent checker invocations; never
/// mutated after composition, so no locking is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Project name used for tagging reports and metrics.
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Dimension name → settings.
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimensionConfig>,

    /// Plugin specs (registry name, local path, or `git+` URL).
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Iteration-loop circuit breakers.
    #[serde(default)]
    pub backpressure: BackpressureConfig,

    /// Convergence score weights.
    #[serde(default)]
    pub scoring: ScoreWeights,

    /// Maximum concurrently running checkers within one tier.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Default per-checker timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Which sources contributed (observability only).
    #[serde(skip)]
    pub source: ConfigSource,
}

fn default_project_name() -> String {
    "unnamed".to_string()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    120
}

impl RunConfig {
    /// Enabled dimensions in a given tier, names filled in.
    pub fn dimensions_in_tier(&self, tier: Tier) -> Vec<&DimensionConfig> {
        self.dimensions
            .values()
            .filter(|d| d.enabled && d.tier == tier)
            .collect()
    }

    /// Ensure a dimension exists for every successfully loaded plugin.
    ///
    /// Plugins that the composed config does not mention default to the
    /// monitor tier; blocking behaviour is strictly opt-in via config.
    pub fn register_plugin_dimensions<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.dimensions
                .entry(name.to_string())
                .or_insert_with(|| DimensionConfig::new(name, Tier::Monitor));
        }
    }
}

/// Default global config path: `~/.claude/validation/global-config.json`.
pub fn default_global_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(GLOBAL_CONFIG_REL))
}

/// Project config path: `<root>/.claude/validation/config.json`.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_CONFIG_REL)
}

/// Apply an RFC 7396 JSON Merge Patch to `base`.
///
/// Objects merge key-by-key with `patch` winning; a `null` patch value
/// removes the key; every non-object patch value (arrays included)
/// replaces the base value wholesale.
pub fn json_merge_patch(base: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if !base.is_object() {
                *base = Value::Object(Default::default());
            }
            let base_map = base.as_object_mut().expect("base coerced to object above");
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(key);
                } else {
                    let entry = base_map.entry(key.clone()).or_insert(Value::Null);
                    json_merge_patch(entry, patch_value);
                }
            }
        }
        _ => {
            *base = patch.clone();
        }
    }
}

/// Built-in defaults as the bottom configuration layer.
fn builtin_defaults() -> Value {
    let mut dimensions = serde_json::Map::new();
    for dim in BuiltinDimension::ALL {
        dimensions.insert(
            dim.name().to_string(),
            serde_json::json!({ "enabled": true, "tier": dim.default_tier().as_u8() }),
        );
    }
    serde_json::json!({ "dimensions": Value::Object(dimensions) })
}

/// Read one configuration layer; any failure degrades to absent.
fn load_layer(path: Option<&Path>, layer: &str) -> Option<Value> {
    let path = path?;
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            if path.exists() {
                warn!(layer, path = %path.display(), error = %e, "config file unreadable, treating as absent");
            }
            return None;
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Some(Value::Object(map)),
        Ok(_) => {
            warn!(layer, path = %path.display(), "config file is not a JSON object, treating as absent");
            None
        }
        Err(e) => {
            warn!(layer, path = %path.display(), error = %e, "invalid JSON in config file, treating as absent");
            None
        }
    }
}

/// Compose a run configuration from global and project layers.
///
/// Never fails: missing or invalid layers degrade to built-in defaults,
/// and a merged document that does not deserialize falls back to the
/// defaults layer alone.
pub fn compose(global_path: Option<&Path>, project_path: Option<&Path>) -> RunConfig {
    let mut merged = builtin_defaults();
    let mut source = ConfigSource::default();

    if let Some(global) = load_layer(global_path, "global") {
        json_merge_patch(&mut merged, &global);
        source.used_global = true;
    }
    if let Some(project) = load_layer(project_path, "project") {
        json_merge_patch(&mut merged, &project);
        source.used_project = true;
    }

    let mut config: RunConfig = match serde_json::from_value(merged) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "merged config failed to deserialize, falling back to defaults");
            serde_json::from_value(builtin_defaults()).unwrap_or(RunConfig {
                project_name: default_project_name(),
                dimensions: BTreeMap::new(),
                plugins: Vec::new(),
                backpressure: BackpressureConfig::default(),
                scoring: ScoreWeights::default(),
                max_concurrency: default_max_concurrency(),
                default_timeout_secs: default_timeout_secs(),
                source: ConfigSource::default(),
            })
        }
    };

    // Map keys become dimension names after deserialization.
    for (name, dim) in &mut config.dimensions {
        dim.name = name.clone();
    }
    config.source = source;
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, value: &Value) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(serde_json::to_string_pretty(value).unwrap().as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn test_merge_project_overrides_global_at_same_path() {
        let mut base = json!({ "dimensions": { "coverage": { "min_percent": 70 } } });
        let patch = json!({ "dimensions": { "coverage": { "min_percent": 90 } } });
        json_merge_patch(&mut base, &patch);
        assert_eq!(base["dimensions"]["coverage"]["min_percent"], json!(90));
    }

    #[test]
    fn test_merge_arrays_replaced_wholesale() {
        let mut base = json!({ "plugins": ["a", "b", "c"] });
        let patch = json!({ "plugins": ["d"] });
        json_merge_patch(&mut base, &patch);
        assert_eq!(base["plugins"], json!(["d"]));
    }

    #[test]
    fn test_merge_null_removes_key() {
        let mut base = json!({ "keep": 1, "drop": 2 });
        json_merge_patch(&mut base, &json!({ "drop": null }));
        assert_eq!(base, json!({ "keep": 1 }));
    }

    #[test]
    fn test_merge_preserves_unrelated_keys() {
        let mut base = json!({ "dimensions": { "security": { "tier": 1 } } });
        let patch = json!({ "dimensions": { "my_custom_check": { "tier": 3, "foo": true } } });
        json_merge_patch(&mut base, &patch);
        assert_eq!(base["dimensions"]["security"]["tier"], json!(1));
        assert_eq!(base["dimensions"]["my_custom_check"]["foo"], json!(true));
    }

    #[test]
    fn test_compose_missing_files_uses_defaults() {
        let config = compose(None, None);
        assert!(!config.source.used_global);
        assert!(!config.source.used_project);
        assert!(config.dimensions.contains_key("security"));
        assert_eq!(config.dimensions["security"].tier, Tier::Blocker);
        assert_eq!(config.dimensions["security"].name, "security");
        assert_eq!(config.backpressure.max_iterations, 10);
    }

    #[test]
    fn test_compose_coverage_example() {
        // Global sets coverage.min_percent = 70; project raises it to 90.
        let dir = tempfile::tempdir().unwrap();
        let global = write_config(
            &dir,
            "global.json",
            &json!({ "dimensions": { "coverage": { "tier": 2, "min_percent": 70 } } }),
        );
        let project = write_config(
            &dir,
            "project.json",
            &json!({ "project_name": "demo", "dimensions": { "coverage": { "min_percent": 90 } } }),
        );

        let config = compose(Some(&global), Some(&project));
        assert!(config.source.used_global);
        assert!(config.source.used_project);
        assert_eq!(config.project_name, "demo");
        assert_eq!(config.dimensions["coverage"].params["min_percent"], json!(90));
        assert_eq!(config.dimensions["coverage"].tier, Tier::Warning);
    }

    #[test]
    fn test_compose_invalid_json_degrades_to_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let config = compose(Some(&path), None);
        assert!(!config.source.used_global);
        assert!(config.dimensions.contains_key("format"));
    }

    #[test]
    fn test_compose_plugin_dimensions_survive() {
        let dir = tempfile::tempdir().unwrap();
        let project = write_config(
            &dir,
            "project.json",
            &json!({
                "plugins": ["./checks/axe-checker"],
                "dimensions": { "accessibility": { "tier": 2, "standard": "wcag21aa" } }
            }),
        );

        let config = compose(None, Some(&project));
        assert_eq!(config.plugins, vec!["./checks/axe-checker".to_string()]);
        let dim = &config.dimensions["accessibility"];
        assert_eq!(dim.tier, Tier::Warning);
        assert_eq!(dim.params["standard"], json!("wcag21aa"));
    }

    #[test]
    fn test_register_plugin_dimensions_defaults_to_monitor() {
        let mut config = compose(None, None);
        assert!(!config.dimensions.contains_key("axe"));

        config.register_plugin_dimensions(["axe", "security"]);

        // New plugin dimension lands in Tier 3; existing dimensions keep
        // their configured tier.
        assert_eq!(config.dimensions["axe"].tier, Tier::Monitor);
        assert_eq!(config.dimensions["security"].tier, Tier::Blocker);
    }

    #[test]
    fn test_dimensions_in_tier_filters_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let project = write_config(
            &dir,
            "project.json",
            &json!({ "dimensions": { "security": { "enabled": false } } }),
        );
        let config = compose(None, Some(&project));

        let tier1: Vec<_> = config
            .dimensions_in_tier(Tier::Blocker)
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert!(!tier1.contains(&"security".to_string()));
        assert!(tier1.contains(&"type_safety".to_string()));
    }
}
