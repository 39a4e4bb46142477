//! Checker registry: dimension name → checker implementation.
//!
//! The registry is the single point where "real implementation", "plugin"
//! and "not yet implemented" are told apart. Each dimension resolves once
//! to a [`CheckerHandle`] variant; the orchestrator's hot path only ever
//! calls [`CheckerHandle::run`] and never inspects the variant again.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::checker::CommandChecker;
use crate::config::RunConfig;
use crate::domain::{CheckOutcome, DimensionConfig};

/// Inputs shared by every checker invocation in a run.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// Root of the project under validation; checkers run with this cwd.
    pub project_root: PathBuf,

    /// Changed files for tier-scoped subset execution, when known.
    pub changed_files: Option<Vec<PathBuf>>,
}

impl CheckContext {
    /// Context for a full (unscoped) run over a project root.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            changed_files: None,
        }
    }

    /// Restrict the run to the given changed files.
    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.changed_files = Some(files);
        self
    }
}

/// One independently checkable concern.
///
/// Implementations report what they observed and may fail with an error;
/// the orchestrator contains every error at the call boundary.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Run the check for one dimension.
    async fn check(
        &self,
        dimension: &DimensionConfig,
        ctx: &CheckContext,
    ) -> anyhow::Result<CheckOutcome>;
}

/// Capability-typed reference to a checker, tagged at registration time.
#[derive(Clone)]
pub enum CheckerHandle {
    /// Built-in command-backed implementation.
    Builtin(Arc<dyn Checker>),

    /// Implementation supplied by a loaded plugin.
    Plugin(Arc<dyn Checker>),

    /// Fallback when no implementation is available. Always reports a
    /// neutral pass with a warning marker, never a silent failure.
    Stub,
}

impl CheckerHandle {
    /// Variant name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckerHandle::Builtin(_) => "builtin",
            CheckerHandle::Plugin(_) => "plugin",
            CheckerHandle::Stub => "stub",
        }
    }

    /// Invoke the underlying checker.
    pub async fn run(
        &self,
        dimension: &DimensionConfig,
        ctx: &CheckContext,
    ) -> anyhow::Result<CheckOutcome> {
        match self {
            CheckerHandle::Builtin(checker) | CheckerHandle::Plugin(checker) => {
                checker.check(dimension, ctx).await
            }
            CheckerHandle::Stub => Ok(CheckOutcome {
                passed: true,
                message: "no validator available".to_string(),
                details: json!({ "stub": true }),
                fix_suggestion: None,
            }),
        }
    }
}

impl std::fmt::Debug for CheckerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckerHandle::{}", self.kind())
    }
}

/// Maps dimension names to checker handles for one run.
#[derive(Debug, Default)]
pub struct CheckerRegistry {
    handles: HashMap<String, CheckerHandle>,
}

impl CheckerRegistry {
    /// Build a registry from a composed config and loaded plugins.
    ///
    /// Resolution order per dimension: plugin implementation, then a
    /// command-backed built-in (default command or the dimension's
    /// `command` param), then the stub fallback.
    pub fn build(config: &RunConfig, plugins: HashMap<String, Arc<dyn Checker>>) -> Self {
        let mut handles = HashMap::new();

        for (name, dim) in &config.dimensions {
            if let Some(checker) = plugins.get(name) {
                handles.insert(name.clone(), CheckerHandle::Plugin(Arc::clone(checker)));
                continue;
            }
            match CommandChecker::for_dimension(dim, config.default_timeout_secs) {
                Some(checker) => {
                    handles.insert(name.clone(), CheckerHandle::Builtin(Arc::new(checker)));
                }
                None => {
                    debug!(dimension = %name, "no implementation available, using stub fallback");
                }
            }
        }

        Self { handles }
    }

    /// Register or replace a handle (used by tests and embedders).
    pub fn register(&mut self, name: impl Into<String>, handle: CheckerHandle) {
        self.handles.insert(name.into(), handle);
    }

    /// Resolve a dimension to its handle; unknown names get the stub.
    pub fn resolve(&self, dimension: &str) -> CheckerHandle {
        self.handles
            .get(dimension)
            .cloned()
            .unwrap_or(CheckerHandle::Stub)
    }

    /// Number of registered non-stub handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the registry holds no non-stub handles.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
