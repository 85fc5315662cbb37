//! Error types for the vxfabric reconciler.
//!
//! All errors implement `std::error::Error` via `thiserror`. Every
//! variant corresponds to one of the five error kinds the reconciler
//! distinguishes: a bad input document, a failed precondition, a
//! failed kernel operation, a state-persistence hiccup, or a failure
//! while undoing a partially-applied attempt.

use std::io;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that can occur while loading configuration, diffing,
/// applying, or rolling back the desired network-datapath state.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired-state document is structurally invalid: missing
    /// field, out-of-range value, unparseable JSON, or an unimplemented
    /// mode.
    #[error("invalid configuration for {field}: {message}")]
    ConfigInvalid {
        /// The field (or document) that failed validation.
        field: String,
        /// Human-readable explanation.
        message: String,
    },

    /// A precondition the reconciler depends on does not hold: a named
    /// interface is missing, the underlay has no IPv4 address, or a
    /// VLAN binding references an L3VNI with no matching VRF.
    #[error("precondition failed: {message}")]
    Precondition {
        /// Human-readable explanation.
        message: String,
    },

    /// A kernel link/address operation failed.
    #[error("kernel operation '{operation}' on '{object}' failed: {message}")]
    KernelOp {
        /// The facade operation that failed (e.g. "createVxlan").
        operation: String,
        /// The kernel object name involved.
        object: String,
        /// Underlying failure detail.
        message: String,
    },

    /// The shell command underlying a kernel operation could not be
    /// spawned at all.
    #[error("failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The shell command underlying a kernel operation ran but
    /// returned a non-zero exit code.
    #[error("shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Reading or writing the persisted state file failed. Non-fatal:
    /// a read failure is treated as "no prior state".
    #[error("state store {operation} failed: {message}")]
    StorePersistence {
        /// "read" or "write".
        operation: String,
        /// Human-readable explanation.
        message: String,
    },

    /// Undoing a mutation during rollback failed. Logged per-entry;
    /// undo continues for the remaining journal entries.
    #[error("rollback of {object} failed: {message}")]
    RollbackOp {
        /// The kernel object whose undo failed.
        object: String,
        /// Human-readable explanation.
        message: String,
    },
}

impl ReconcileError {
    /// Creates a configuration-invalid error.
    pub fn config_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Creates a kernel-operation error.
    pub fn kernel_op(
        operation: impl Into<String>,
        object: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::KernelOp {
            operation: operation.into(),
            object: object.into(),
            message: message.into(),
        }
    }

    /// Creates a state-store error.
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorePersistence {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a rollback error.
    pub fn rollback(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RollbackOp {
            object: object.into(),
            message: message.into(),
        }
    }

    /// True for errors raised before any kernel mutation was attempted,
    /// where rollback is a no-op because nothing has been applied yet.
    pub fn is_pre_apply(&self) -> bool {
        matches!(self, ReconcileError::ConfigInvalid { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_invalid_display() {
        let err = ReconcileError::config_invalid("VlanID", "must be in 1..=4094");
        assert_eq!(
            err.to_string(),
            "invalid configuration for VlanID: must be in 1..=4094"
        );
        assert!(err.is_pre_apply());
    }

    #[test]
    fn test_kernel_op_display() {
        let err = ReconcileError::kernel_op("createVxlan", "vxlan10010", "device busy");
        assert!(err.to_string().contains("createVxlan"));
        assert!(err.to_string().contains("vxlan10010"));
        assert!(!err.is_pre_apply());
    }

    #[test]
    fn test_shell_command_failed_display() {
        let err = ReconcileError::ShellCommandFailed {
            command: "ip link add vxlan10010 type vxlan id 10010".to_string(),
            exit_code: 2,
            output: "RTNETLINK answers: File exists".to_string(),
        };
        assert!(err.to_string().contains("exit code 2"));
    }
}
