//! Shell command execution for the plugin daemon.
//!
//! Per-VF attributes (MAC, VLAN, trust, spoof-check) and link state are
//! driven through `/sbin/ip`, with proper quoting of device names that
//! arrive from the orchestration host.
//!
//! # Example
//!
//! ```ignore
//! use sriovmgr_common::shell::{self, IP_CMD, shellquote};
//!
//! let cmd = format!("{} link set dev {} up", IP_CMD, shellquote("eth1"));
//! shell::exec_or_throw(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{DriverError, DriverResult};

/// Path to the `ip` command for netdevice and VF configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `ibdev2netdev` mapping tool used for dual-port discovery.
pub const IBDEV2NETDEV_CMD: &str = "/tmp/tools/ibdev2netdev";

/// Regex for characters that need escaping inside shell double-quotes:
/// $, `, ", \, and newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Device and interface names come straight out of lifecycle requests, so
/// anything interpolated into a command line is wrapped in double quotes
/// with the shell-special characters escaped.
///
/// # Example
///
/// ```
/// use sriovmgr_common::shell::shellquote;
///
/// assert_eq!(shellquote("eth1"), "\"eth1\"");
/// assert_eq!(shellquote("eth$1"), "\"eth\\$1\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// Trimmed stdout output.
    pub stdout: String,
    /// Trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command asynchronously through `/bin/sh -c`.
///
/// Returns the execution result even for non-zero exit codes; spawning
/// failures are the only error path.
pub async fn exec(cmd: &str) -> DriverResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| DriverError::ShellExec {
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
        tracing::trace!(command = %cmd, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
///
/// # Returns
///
/// * `Ok(String)` - The stdout output on success
/// * `Err(DriverError)` - If the command fails to spawn or exits non-zero
pub async fn exec_or_throw(cmd: &str) -> DriverResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(DriverError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shellquote_simple() {
        assert_eq!(shellquote("eth1"), "\"eth1\"");
        assert_eq!(shellquote("ens1f0"), "\"ens1f0\"");
    }

    #[test]
    fn test_shellquote_special_chars() {
        assert_eq!(shellquote("$PATH"), "\"\\$PATH\"");
        assert_eq!(shellquote("`id`"), "\"\\`id\\`\"");
        assert_eq!(shellquote("a\"b"), "\"a\\\"b\"");
        assert_eq!(shellquote("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_shellquote_empty() {
        assert_eq!(shellquote(""), "\"\"");
    }

    #[test]
    fn test_exec_result_combined_output() {
        let result = ExecResult {
            exit_code: 1,
            stdout: "".to_string(),
            stderr: "RTNETLINK answers: Operation not supported".to_string(),
        };
        assert!(!result.success());
        assert_eq!(
            result.combined_output(),
            "RTNETLINK answers: Operation not supported"
        );

        let result = ExecResult {
            exit_code: 0,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        };
        assert_eq!(result.combined_output(), "out\nerr");
    }

    #[tokio::test]
    async fn test_exec_success() {
        let result = exec("echo hello").await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit() {
        let result = exec("exit 3").await.unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_exec_or_throw_failure() {
        let result = exec_or_throw("exit 1").await;
        match result {
            Err(DriverError::ShellCommandFailed { exit_code, .. }) => {
                assert_eq!(exit_code, 1);
            }
            other => panic!("Expected ShellCommandFailed, got {:?}", other.err()),
        }
    }
}
