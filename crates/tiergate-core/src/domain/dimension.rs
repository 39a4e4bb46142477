//! Validation dimensions, severity tiers and built-in dimension defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity tier of a dimension.
///
/// Serialized as the integers `1..=3` to match the configuration schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Tier 1 — a failure blocks everything downstream.
    Blocker,
    /// Tier 2 — failures are surfaced but never block.
    Warning,
    /// Tier 3 — purely observational.
    Monitor,
}

impl Tier {
    /// All tiers in execution order.
    pub const ALL: [Tier; 3] = [Tier::Blocker, Tier::Warning, Tier::Monitor];

    /// Numeric form used in configuration and reports.
    pub fn as_u8(self) -> u8 {
        match self {
            Tier::Blocker => 1,
            Tier::Warning => 2,
            Tier::Monitor => 3,
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Blocker),
            2 => Ok(Tier::Warning),
            3 => Ok(Tier::Monitor),
            other => Err(format!("invalid tier value: {other} (expected 1, 2 or 3)")),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.as_u8()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Configuration for a single checkable dimension.
///
/// Immutable once a run starts; produced only by configuration composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    /// Dimension name (the key under `dimensions` in the config file).
    #[serde(skip)]
    pub name: String,

    /// Whether this dimension participates in runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Severity tier (1 = blocker, 2 = warning, 3 = monitor).
    #[serde(default = "default_tier")]
    pub tier: Tier,

    /// Dimension-specific parameters, preserved verbatim through composition
    /// so plugin-declared keys survive the merge.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_tier() -> Tier {
    Tier::Monitor
}

impl DimensionConfig {
    /// Create a dimension with empty parameters.
    pub fn new(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            tier,
            params: Map::new(),
        }
    }

    /// Command override from params (`"command": ["prog", "arg", ...]`).
    pub fn command_param(&self) -> Option<Vec<String>> {
        let items = self.params.get("command")?.as_array()?;
        let cmd: Vec<String> = items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        if cmd.is_empty() {
            None
        } else {
            Some(cmd)
        }
    }

    /// Per-dimension timeout override in seconds.
    pub fn timeout_param(&self) -> Option<u64> {
        self.params.get("timeout_secs")?.as_u64()
    }

    /// File extensions this dimension applies to, if declared in params.
    pub fn extensions_param(&self) -> Option<Vec<String>> {
        let items = self.params.get("extensions")?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

/// Built-in dimensions with default commands and file-type mappings.
///
/// The extension mapping is the deterministic contract behind tier-scoped
/// subset execution: a dimension is skipped when a changed-file filter is
/// present and none of the files carry one of its extensions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinDimension {
    /// `cargo fmt --all -- --check`
    Format,

    /// `cargo clippy --workspace --all-targets -- -D warnings`
    CodeQuality,

    /// `cargo check --workspace`
    TypeSafety,

    /// `cargo test --workspace`
    Coverage,

    /// `cargo audit`
    Security,

    /// `cargo semver-checks check-release`
    ApiContract,
}

impl BuiltinDimension {
    /// All built-in dimensions.
    pub const ALL: [BuiltinDimension; 6] = [
        BuiltinDimension::Format,
        BuiltinDimension::CodeQuality,
        BuiltinDimension::TypeSafety,
        BuiltinDimension::Coverage,
        BuiltinDimension::Security,
        BuiltinDimension::ApiContract,
    ];

    /// Get the dimension name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinDimension::Format => "format",
            BuiltinDimension::CodeQuality => "code_quality",
            BuiltinDimension::TypeSafety => "type_safety",
            BuiltinDimension::Coverage => "coverage",
            BuiltinDimension::Security => "security",
            BuiltinDimension::ApiContract => "api_contract",
        }
    }

    /// Look up a built-in by dimension name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.name() == name)
    }

    /// Default tier when configuration does not assign one.
    pub fn default_tier(&self) -> Tier {
        match self {
            BuiltinDimension::TypeSafety | BuiltinDimension::Security => Tier::Blocker,
            BuiltinDimension::Format | BuiltinDimension::CodeQuality | BuiltinDimension::Coverage => {
                Tier::Warning
            }
            BuiltinDimension::ApiContract => Tier::Monitor,
        }
    }

    /// Get the dimension's default command.
    pub fn command(&self) -> Vec<String> {
        let parts: &[&str] = match self {
            BuiltinDimension::Format => &["cargo", "fmt", "--all", "--", "--check"],
            BuiltinDimension::CodeQuality => {
                &["cargo", "clippy", "--workspace", "--all-targets", "--", "-D", "warnings"]
            }
            BuiltinDimension::TypeSafety => &["cargo", "check", "--workspace"],
            BuiltinDimension::Coverage => &["cargo", "test", "--workspace"],
            BuiltinDimension::Security => &["cargo", "audit"],
            BuiltinDimension::ApiContract => &["cargo", "semver-checks", "check-release"],
        };
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    /// Get the dimension's auto-repair command (if available).
    pub fn fix_command(&self) -> Option<Vec<String>> {
        match self {
            BuiltinDimension::Format => {
                Some(vec!["cargo".to_string(), "fmt".to_string(), "--all".to_string()])
            }
            _ => None,
        }
    }

    /// File extensions this dimension applies to.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            BuiltinDimension::Format
            | BuiltinDimension::CodeQuality
            | BuiltinDimension::TypeSafety
            | BuiltinDimension::Coverage
            | BuiltinDimension::ApiContract => &["rs"],
            BuiltinDimension::Security => &["rs", "toml", "lock"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tier_numeric_round_trip() {
        assert_eq!(Tier::Blocker.as_u8(), 1);
        assert_eq!(Tier::try_from(2u8).unwrap(), Tier::Warning);
        assert_eq!(Tier::try_from(3u8).unwrap(), Tier::Monitor);
        assert!(Tier::try_from(0u8).is_err());
        assert!(Tier::try_from(4u8).is_err());
    }

    #[test]
    fn test_tier_serde_as_integer() {
        let json = serde_json::to_string(&Tier::Warning).unwrap();
        assert_eq!(json, "2");
        let tier: Tier = serde_json::from_str("1").unwrap();
        assert_eq!(tier, Tier::Blocker);
    }

    #[test]
    fn test_dimension_config_preserves_unknown_params() {
        let raw = json!({ "enabled": true, "tier": 2, "min_percent": 90, "custom_flag": "x" });
        let mut config: DimensionConfig = serde_json::from_value(raw).unwrap();
        config.name = "coverage".to_string();

        assert_eq!(config.tier, Tier::Warning);
        assert_eq!(config.params.get("min_percent"), Some(&json!(90)));
        assert_eq!(config.params.get("custom_flag"), Some(&json!("x")));
    }

    #[test]
    fn test_dimension_config_command_param() {
        let raw = json!({ "tier": 1, "command": ["npx", "axe", "."] });
        let config: DimensionConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(
            config.command_param().unwrap(),
            vec!["npx".to_string(), "axe".to_string(), ".".to_string()]
        );
    }

    #[test]
    fn test_dimension_config_defaults() {
        let config: DimensionConfig = serde_json::from_value(json!({})).unwrap();
        assert!(config.enabled);
        assert_eq!(config.tier, Tier::Monitor);
        assert!(config.command_param().is_none());
        assert!(config.timeout_param().is_none());
    }

    #[test]
    fn test_builtin_dimension_names() {
        assert_eq!(BuiltinDimension::Format.name(), "format");
        assert_eq!(BuiltinDimension::by_name("security"), Some(BuiltinDimension::Security));
        assert_eq!(BuiltinDimension::by_name("accessibility"), None);
    }

    #[test]
    fn test_builtin_dimension_commands() {
        let fmt_cmd = BuiltinDimension::Format.command();
        assert_eq!(fmt_cmd[0], "cargo");
        assert!(fmt_cmd.contains(&"--check".to_string()));

        assert!(BuiltinDimension::Format.fix_command().is_some());
        assert!(BuiltinDimension::Security.fix_command().is_none());
    }

    #[test]
    fn test_builtin_extension_mapping() {
        assert!(BuiltinDimension::Security.extensions().contains(&"lock"));
        assert_eq!(BuiltinDimension::CodeQuality.extensions(), &["rs"]);
    }
}
