//! State persistence: the last submitted desired state and the
//! journal from the attempt that processed it, written on every
//! completion (success or failure) as a best-effort hint for the next
//! invocation, never a correctness oracle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DesiredState;
use crate::journal::Journal;
use vxfabric_common::error::{ReconcileError, ReconcileResult};

const STATE_FILE_NAME: &str = "vxfabric-state.json";

/// The persisted record of one reconciliation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub timestamp: String,
    pub config: DesiredState,
    pub success: bool,
    pub operations: Journal,
}

/// Reads and writes [`StateRecord`]s at a fixed path relative to the
/// running executable.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Resolves the state file path relative to the running
    /// executable's directory, falling back to the current working
    /// directory if that cannot be determined.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(STATE_FILE_NAME)
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_path() -> Self {
        Self::new(Self::default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the last persisted record. A missing or unreadable file,
    /// or one that fails to parse, is treated as "no prior state" and
    /// returns `Ok(None)` rather than propagating a fatal error
    /// (reconciliation proceeds as an initial apply in that case).
    pub fn load(&self) -> ReconcileResult<Option<StateRecord>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "state file unreadable, treating as no prior state");
                return Ok(None);
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "state file corrupt, treating as no prior state");
                Ok(None)
            }
        }
    }

    /// Writes a record, best-effort. Failures are logged and returned
    /// as a [`ReconcileError::StorePersistence`] but never treated as
    /// fatal by callers driving the reconciliation loop.
    pub fn save(&self, record: &StateRecord) -> ReconcileResult<()> {
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            ReconcileError::store("write", format!("failed to encode state record: {e}"))
        })?;
        std::fs::write(&self.path, json).map_err(|e| {
            ReconcileError::store(
                "write",
                format!("failed to write {}: {e}", self.path.display()),
            )
        })
    }
}
