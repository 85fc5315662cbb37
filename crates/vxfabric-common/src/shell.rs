//! Shell command execution utilities for the vxfabric reconciler.
//!
//! This module provides safe shell command execution with proper
//! quoting to prevent command injection, mirroring the pattern the
//! other configuration-manager daemons in this workspace use to reach
//! the kernel's link/address tables without a raw netlink socket.
//!
//! ```ignore
//! use vxfabric_common::shell::{self, IP_CMD, shellquote};
//!
//! let name = "vxlan10010";
//! let cmd = format!("{} link set dev {} up", IP_CMD, shellquote(name));
//! let result = shell::exec(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{ReconcileError, ReconcileResult};

/// Path to the `ip` command for link/address configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `bridge` command for bridge/VLAN filtering configuration.
pub const BRIDGE_CMD: &str = "/sbin/bridge";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes the characters that
/// carry special meaning inside double quotes: `$`, `` ` ``, `"`, `\`,
/// and newline.
///
/// ```
/// use vxfabric_common::shell::shellquote;
///
/// assert_eq!(shellquote("vxlan10010"), "\"vxlan10010\"");
/// assert_eq!(shellquote("a$b"), "\"a\\$b\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code of the command (0 = success).
    pub exit_code: i32,
    /// Combined stdout output.
    pub stdout: String,
    /// Combined stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// True if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The combined output (stdout + stderr), for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// True if stderr indicates the kernel object referenced by the
    /// command was already absent (e.g. deleting a link that does not
    /// exist). Used by rollback to downgrade "not found" to a no-op.
    pub fn looks_like_not_found(&self) -> bool {
        let s = self.stderr.to_ascii_lowercase();
        s.contains("cannot find device") || s.contains("does not exist") || s.contains("no such device")
    }
}

/// Executes a shell command asynchronously through `/bin/sh -c`.
pub async fn exec(cmd: &str) -> ReconcileResult<ExecResult> {
    tracing::debug!(command = %cmd, "executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ReconcileError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code, "command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code,
            stderr = %result.stderr,
            "command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> ReconcileResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(ReconcileError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}
