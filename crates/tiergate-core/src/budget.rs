//! Durable budget state for the iteration loop.
//!
//! `BudgetState` is the only entity that outlives a single run. It is
//! loaded at loop start, mutated once per iteration by a single writer,
//! and persisted after every transition so a crash mid-iteration resumes
//! from the last completed iteration. Persistence is atomic
//! (write-to-temp-then-rename) and integrity-checked with a SHA-256
//! checksum; a mismatch is surfaced as corruption, never silently reset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::{Result, TiergateError};

/// Per-project loop bookkeeping, mutated once per iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    /// Completed iteration count.
    pub iteration: u32,

    /// Accrued cost in USD.
    pub cost_usd: f64,

    /// Consecutive iterations that ended Tier-1-blocked.
    pub consecutive_errors: u32,

    /// Consecutive iterations whose score did not change.
    pub iterations_without_progress: u32,

    /// Combined score of the most recent full run, if any.
    pub last_score: Option<f64>,
}

/// On-disk envelope: the state plus a checksum over it.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedBudget {
    state: BudgetState,
    checksum: String,
}

/// SHA-256 hex over the canonical JSON of the state fields.
fn state_checksum(state: &BudgetState) -> Result<String> {
    let canonical = serde_json::to_vec(state)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Stable state-file key for a project path.
fn project_key(project_root: &Path) -> String {
    let canonical = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// File-backed store for budget state, one file per project.
#[derive(Debug, Clone)]
pub struct BudgetStore {
    dir: PathBuf,
}

impl BudgetStore {
    /// Store rooted at an explicit directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default store under `~/.claude/validation/state`.
    pub fn default_location() -> Option<Self> {
        std::env::var_os("HOME").map(|home| {
            Self::new(PathBuf::from(home).join(".claude/validation/state"))
        })
    }

    /// State file path for a project.
    pub fn state_path(&self, project_root: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", project_key(project_root)))
    }

    /// Load a project's budget state.
    ///
    /// Returns `Ok(None)` when no state exists. A checksum mismatch or an
    /// undecodable file is an error — callers escalate, they never resume
    /// from corrupt bookkeeping.
    pub fn load(&self, project_root: &Path) -> Result<Option<BudgetState>> {
        let path = self.state_path(project_root);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let persisted: PersistedBudget =
            serde_json::from_slice(&raw).map_err(|e| TiergateError::CorruptState {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let actual = state_checksum(&persisted.state)?;
        if actual != persisted.checksum {
            return Err(TiergateError::ChecksumMismatch {
                expected: persisted.checksum,
                actual,
            });
        }

        debug!(
            path = %path.display(),
            iteration = persisted.state.iteration,
            "loaded budget state"
        );
        Ok(Some(persisted.state))
    }

    /// Persist a project's budget state atomically.
    pub fn save(&self, project_root: &Path, state: &BudgetState) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.state_path(project_root);

        let persisted = PersistedBudget {
            state: state.clone(),
            checksum: state_checksum(state)?,
        };
        let json = serde_json::to_vec_pretty(&persisted)?;

        // Write-to-temp-then-rename so a crash never leaves a torn file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), iteration = state.iteration, "persisted budget state");
        Ok(())
    }

    /// Remove a project's budget state, if present.
    pub fn clear(&self, project_root: &Path) -> Result<()> {
        let path = self.state_path(project_root);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_absent_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = BudgetStore::new(dir.path());
        assert!(store.load(Path::new(".")).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BudgetStore::new(dir.path());

        let state = BudgetState {
            iteration: 4,
            cost_usd: 1.25,
            consecutive_errors: 1,
            iterations_without_progress: 2,
            last_score: Some(72.5),
        };
        store.save(Path::new("."), &state).unwrap();

        let loaded = store.load(Path::new(".")).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_state_path_stable_per_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = BudgetStore::new(dir.path());
        let a = store.state_path(Path::new("."));
        let b = store.state_path(Path::new("."));
        assert_eq!(a, b);
        assert_ne!(a, store.state_path(dir.path()));
    }

    #[test]
    fn test_tampered_state_is_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = BudgetStore::new(dir.path());
        let project = Path::new(".");

        store.save(project, &BudgetState::default()).unwrap();

        // Flip a state field without recomputing the checksum.
        let path = store.state_path(project);
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        doc["state"]["iteration"] = serde_json::json!(99);
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let err = store.load(project).unwrap_err();
        assert!(matches!(err, TiergateError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_garbage_state_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = BudgetStore::new(dir.path());
        let project = Path::new(".");

        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(store.state_path(project), b"not json at all").unwrap();

        let err = store.load(project).unwrap_err();
        assert!(matches!(err, TiergateError::CorruptState { .. }));
    }

    #[test]
    fn test_clear_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = BudgetStore::new(dir.path());
        let project = Path::new(".");

        store.save(project, &BudgetState::default()).unwrap();
        store.clear(project).unwrap();
        assert!(store.load(project).unwrap().is_none());

        // Clearing twice is a no-op.
        store.clear(project).unwrap();
    }
}
