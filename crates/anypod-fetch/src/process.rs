//! Subprocess execution with scope-registered graceful termination
//!
//! Every external process is registered with a shared [`ProcessScope`] while
//! it runs. On shutdown the scope sends SIGTERM to everything still
//! registered, waits up to five seconds, then SIGKILLs the remainder.
//! Dropped futures fall back to tokio's kill-on-drop.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Command;

use crate::FetchError;
use crate::runner::RunOutput;

const TERM_GRACE: Duration = Duration::from_secs(5);
const TERM_POLL: Duration = Duration::from_millis(100);

/// Registry of live subprocess PIDs for coordinated shutdown.
#[derive(Debug, Default, Clone)]
pub struct ProcessScope {
    pids: Arc<Mutex<HashSet<u32>>>,
}

impl ProcessScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, pid: u32) {
        if let Ok(mut pids) = self.pids.lock() {
            pids.insert(pid);
        }
    }

    fn unregister(&self, pid: u32) {
        if let Ok(mut pids) = self.pids.lock() {
            pids.remove(&pid);
        }
    }

    fn live_pids(&self) -> Vec<u32> {
        self.pids.lock().map(|pids| pids.iter().copied().collect()).unwrap_or_default()
    }

    /// Terminate all registered subprocesses: SIGTERM, up to five seconds of
    /// grace, then SIGKILL for whatever is still alive.
    pub async fn terminate_all(&self) {
        let pids = self.live_pids();
        if pids.is_empty() {
            return;
        }
        tracing::info!(count = pids.len(), "terminating in-flight subprocesses");
        for pid in &pids {
            Self::send(*pid, Signal::SIGTERM);
        }

        let deadline = tokio::time::Instant::now() + TERM_GRACE;
        while tokio::time::Instant::now() < deadline {
            if self.live_pids().is_empty() {
                return;
            }
            tokio::time::sleep(TERM_POLL).await;
        }

        for pid in self.live_pids() {
            tracing::warn!(pid, "subprocess did not exit after SIGTERM, killing");
            Self::send(pid, Signal::SIGKILL);
        }
    }

    fn send(pid: u32, signal: Signal) {
        #[expect(clippy::cast_possible_wrap)]
        if let Err(err) = kill(Pid::from_raw(pid as i32), signal) {
            tracing::debug!(pid, %signal, %err, "signal delivery failed");
        }
    }
}

/// Run a program to completion, capturing stdout and stderr.
///
/// The child is registered with the scope for the duration of the run and is
/// killed on drop if the surrounding future is cancelled.
///
/// # Errors
///
/// Returns `FetchError::Io` on spawn/wait failures. A non-zero exit is NOT an
/// error here; callers interpret `RunOutput::exit_code`.
pub async fn run_captured(
    scope: &ProcessScope,
    program: &str,
    args: &[String],
) -> Result<RunOutput, FetchError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let pid = child.id();
    if let Some(pid) = pid {
        scope.register(pid);
    }

    let result = child.wait_with_output().await;

    if let Some(pid) = pid {
        scope.unregister(pid);
    }

    let output = result?;
    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    })
}
