//! Helpers for spawning external tools from the broll workspace.
//!
//! Two concerns live here: suppressing console windows for child processes on
//! Windows, and running short-lived capability probes (`nvidia-smi`, `vainfo`,
//! `ffmpeg -version`) where any failure simply means "not available".

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Captured result of a capability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Trimmed stdout, lossily decoded.
    pub stdout: String,
}

impl ProbeOutput {
    /// True when the probe exited cleanly and printed something.
    pub fn has_output(&self) -> bool {
        self.success && !self.stdout.is_empty()
    }
}

/// Run `program args...` and capture its stdout, giving up after `timeout`.
///
/// Returns `None` when the program is missing, cannot be spawned, or does not
/// finish in time. The child is killed on timeout.
#[cfg(feature = "tokio")]
pub async fn probe<I, S>(
    program: impl AsRef<OsStr>,
    args: I,
    timeout: std::time::Duration,
) -> Option<ProbeOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio_command(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true);

    let child = cmd.spawn().ok()?;
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .ok()?
        .ok()?;

    Some(ProbeOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
    })
}

#[cfg(all(test, feature = "tokio"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn probe_missing_program_is_none() {
        let out = probe(
            "definitely-not-a-real-binary-5c1e",
            ["--version"],
            Duration::from_secs(1),
        )
        .await;
        assert!(out.is_none());
    }

    #[test]
    fn has_output_requires_success_and_text() {
        let ok = ProbeOutput {
            success: true,
            stdout: "GeForce".into(),
        };
        assert!(ok.has_output());

        let empty = ProbeOutput {
            success: true,
            stdout: String::new(),
        };
        assert!(!empty.has_output());

        let failed = ProbeOutput {
            success: false,
            stdout: "error".into(),
        };
        assert!(!failed.has_output());
    }
}
