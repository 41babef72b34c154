//! Blocking process execution
//!
//! Every external tool (installers, `expand.exe`, `pnputil`, `net use`,
//! PowerShell queries) goes through `run_process`, which spawns the child,
//! waits for it and captures its output. Nothing is ever left running in the
//! background.

use crate::error::{DeployError, Result};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Exit code Windows installers use for "succeeded, reboot required".
pub const EXIT_REBOOT_REQUIRED: i32 = 3010;

/// Output from a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Standard output from the process.
    pub stdout: String,
    /// Standard error from the process.
    pub stderr: String,
    /// Exit code (None if the process was terminated externally).
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Whether the exit code counts as success (0, or 3010 reboot-required).
    pub fn success(&self) -> bool {
        is_success_code(self.exit_code.unwrap_or(-1))
    }

    /// Return an `InstallFailed` error unless the process succeeded.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            let code = self.exit_code.unwrap_or(-1);
            Err(DeployError::install_failed(format!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr.trim()
            )))
        }
    }
}

/// 0 and 3010 are both success for Windows setup programs.
pub fn is_success_code(code: i32) -> bool {
    code == 0 || code == EXIT_REBOOT_REQUIRED
}

/// Run a program to completion and capture its output.
///
/// Spawn failures surface as `Io`; a nonzero exit is NOT an error here, the
/// caller decides via `ProcessOutput::ensure_success`.
pub fn run_process<I, S>(program: &Path, args: I) -> Result<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_process_redacted(program, args, &[])
}

/// Same as `run_process`, but any argument containing one of `secrets` is
/// logged as `<redacted>`.
pub fn run_process_redacted<I, S>(program: &Path, args: I, secrets: &[&str]) -> Result<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    debug!("run_process: {} {:?}", program.display(), redact_args(&args, secrets));

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            DeployError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to spawn {}: {}", program.display(), e),
            ))
        })?;

    let result = ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    };

    info!(
        "{} exited with code {}",
        program.display(),
        result.exit_code.map_or_else(|| "none".to_string(), |c| c.to_string())
    );
    Ok(result)
}

/// Run a PowerShell snippet and return its trimmed stdout.
///
/// A nonzero exit is reported as `InventoryQuery`: PowerShell is only used
/// for host queries.
pub fn run_powershell(script: &str) -> Result<String> {
    let output = run_process(
        Path::new("powershell.exe"),
        ["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command", script],
    )?;
    if output.exit_code != Some(0) {
        return Err(DeployError::inventory(format!(
            "powershell exited with {:?}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }
    Ok(output.stdout.trim().to_string())
}

fn redact_args(args: &[OsString], secrets: &[&str]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            let text = arg.to_string_lossy();
            if secrets.iter().any(|s| !s.is_empty() && text.contains(s)) {
                "<redacted>".to_string()
            } else {
                text.into_owned()
            }
        })
        .collect()
}

/// Quote a value for embedding in a single-quoted PowerShell string.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
