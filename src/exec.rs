//! Actuation: running nmcli and capturing its result.

use std::path::PathBuf;

use tracing::debug;

use crate::{Error, Result};

/// Captured result of one nmcli invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    fn from_output(out: std::process::Output) -> Self {
        Self {
            // None means killed by a signal; fold into a generic failure code.
            code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        }
    }
}

/// Runs a synthesized argument list and reports (exit code, stdout, stderr).
///
/// Calls are synchronous from the reconciler's point of view: each one
/// blocks the invocation until the underlying process returns. Timeout and
/// retry policy, if any, belong to the caller environment.
pub trait Executor {
    fn run(&self, args: &[String]) -> impl Future<Output = Result<CommandOutput>> + Send;
}

/// The real executor: spawns the nmcli binary.
#[derive(Debug, Clone)]
pub struct NmcliExecutor {
    bin: PathBuf,
}

impl NmcliExecutor {
    /// Resolve `nmcli` on `PATH`.
    pub fn locate() -> Result<Self> {
        let path = std::env::var_os("PATH").ok_or(Error::NmcliNotFound)?;
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join("nmcli");
            if candidate.is_file() {
                debug!(bin = %candidate.display(), "located nmcli");
                return Ok(Self { bin: candidate });
            }
        }
        Err(Error::NmcliNotFound)
    }
}

impl Executor for NmcliExecutor {
    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        debug!(args = ?args, "invoking nmcli");
        let out = tokio::process::Command::new(&self.bin)
            .args(args)
            .output()
            .await?;
        let out = CommandOutput::from_output(out);
        debug!(code = out.code, "nmcli finished");
        Ok(out)
    }
}

/// Human text for the documented nmcli exit codes, for logs and reports.
pub fn describe_exit(code: i32) -> &'static str {
    match code {
        0 => "success",
        1 => "unknown or unspecified error",
        2 => "invalid user input or wrong nmcli invocation",
        3 => "timeout expired",
        4 => "connection activation failed",
        5 => "connection deactivation failed",
        6 => "disconnecting device failed",
        7 => "connection deletion failed",
        8 => "NetworkManager is not running",
        9 => "nmcli and NetworkManager versions mismatch",
        10 => "connection, device, or access point does not exist",
        _ => "unrecognized nmcli exit code",
    }
}
