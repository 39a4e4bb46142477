//! Plugin spec parsing and checker loading.
//!
//! A plugin is an external executable speaking the command-checker
//! contract (exit code verdict, optional JSON tail on stdout). Specs are
//! configuration strings classified deterministically by prefix:
//!
//! - `/`, `./` or `~/` — local path to an executable
//! - `git+` — git URL (not supported; fails to load with that reason)
//! - anything else — registry name, resolved by searching `$PATH` for
//!   `tiergate-check-<name>` and then the bare name
//!
//! Loading is failure-isolated: one bad spec is logged and skipped, and a
//! partially populated map is a success.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checker::CommandChecker;
use crate::domain::PluginError;
use crate::registry::Checker;

/// Prefix searched before the bare name when resolving registry plugins.
const REGISTRY_PREFIX: &str = "tiergate-check-";

/// How a plugin spec string is to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// Bare name resolved via `$PATH`.
    RegistryPackage,

    /// Absolute, relative or `~`-prefixed filesystem path.
    LocalPath,

    /// `git+` URL. Resolution is future work and always fails to load.
    GitUrl,
}

/// Parsed plugin spec, discarded once the checker is registered or
/// loading fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// The spec string exactly as configured.
    pub raw_source: String,

    /// Resolution strategy derived from the prefix.
    pub kind: PluginKind,

    /// Dimension name this plugin provides a checker for.
    pub resolved_name: String,
}

/// Classify a raw spec string by prefix.
pub fn parse_spec(raw: &str) -> Result<PluginSpec, PluginError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PluginError::EmptySpec);
    }

    let (kind, resolved_name) = if raw.starts_with("git+") {
        let name = raw
            .rsplit('/')
            .next()
            .unwrap_or(raw)
            .trim_end_matches(".git")
            .to_string();
        (PluginKind::GitUrl, name)
    } else if raw.starts_with('/') || raw.starts_with("./") || raw.starts_with("~/") {
        let name = Path::new(raw)
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or(raw)
            .to_string();
        (PluginKind::LocalPath, name)
    } else {
        (PluginKind::RegistryPackage, raw.to_string())
    };

    Ok(PluginSpec {
        raw_source: raw.to_string(),
        kind,
        resolved_name: strip_registry_prefix(&resolved_name),
    })
}

/// Dimension names never carry the executable prefix.
fn strip_registry_prefix(name: &str) -> String {
    name.strip_prefix(REGISTRY_PREFIX).unwrap_or(name).to_string()
}

/// Expand `~/` against `$HOME` and resolve relative paths against `cwd`.
fn resolve_local_path(raw: &str, cwd: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Search a PATH-style string for an executable plugin.
fn find_on_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(path_var) {
        for candidate in [format!("{REGISTRY_PREFIX}{name}"), name.to_string()] {
            let full = dir.join(&candidate);
            if full.is_file() {
                return Some(full);
            }
        }
    }
    None
}

/// Resolve one parsed spec to the executable backing it.
fn resolve_executable(spec: &PluginSpec, cwd: &Path) -> Result<PathBuf, PluginError> {
    match spec.kind {
        PluginKind::GitUrl => Err(PluginError::GitUnsupported {
            spec: spec.raw_source.clone(),
        }),
        PluginKind::LocalPath => {
            let path = resolve_local_path(&spec.raw_source, cwd);
            if path.is_file() {
                Ok(path)
            } else {
                Err(PluginError::MissingPath {
                    path: path.display().to_string(),
                })
            }
        }
        PluginKind::RegistryPackage => {
            let path_var = std::env::var_os("PATH").unwrap_or_default();
            find_on_path(&spec.resolved_name, &path_var).ok_or_else(|| PluginError::NotOnPath {
                name: spec.resolved_name.clone(),
            })
        }
    }
}

/// Load all plugin specs into dimension-name → checker.
///
/// Never fails; every per-spec error is a warning and an omission from
/// the returned map.
pub fn load_plugins(specs: &[String], default_timeout_secs: u64) -> HashMap<String, Arc<dyn Checker>> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut loaded: HashMap<String, Arc<dyn Checker>> = HashMap::new();

    for raw in specs {
        let spec = match parse_spec(raw) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(spec = %raw, error = %e, "skipping unparseable plugin spec");
                continue;
            }
        };

        match resolve_executable(&spec, &cwd) {
            Ok(path) => {
                let Some(checker) = CommandChecker::new(
                    vec![path.display().to_string()],
                    default_timeout_secs,
                ) else {
                    warn!(spec = %raw, "plugin resolved to an empty command, skipping");
                    continue;
                };
                info!(
                    plugin = %spec.resolved_name,
                    path = %path.display(),
                    kind = ?spec.kind,
                    "loaded plugin checker"
                );
                loaded.insert(spec.resolved_name, Arc::new(checker));
            }
            Err(e) => {
                warn!(spec = %raw, error = %e, "plugin failed to load, excluding it");
            }
        }
    }

    loaded
}
