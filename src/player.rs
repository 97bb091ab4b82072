// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! External player processes.
//!
//! Each [`PlayerHandle`] owns one running player process. The process itself is
//! owned by a monitor task that waits for it to exit, either on its own or after
//! a stop request, and publishes the exit status back to the handle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error};

use crate::registry::ButtonId;

/// How long a freshly launched player is watched for an immediate failure.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(100);

/// Global player handle ID counter.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// How a player process ended, as observed by its monitor task.
type PlayerExit = Result<ExitStatus, Arc<io::Error>>;

/// Errors that prevent a player from starting.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("sample {} is not readable: {source}", .path.display())]
    Sample {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sample {} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("failed to launch player {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("player {command} exited immediately with {status}")]
    Exited { command: String, status: ExitStatus },
}

/// Errors raised while waiting for a player to stop.
#[derive(Debug, thiserror::Error)]
pub enum TerminationError {
    #[error("player process (pid {pid:?}) did not exit within {timeout:?}")]
    Timeout { pid: Option<u32>, timeout: Duration },

    #[error("player monitor stopped without reporting an exit status")]
    MonitorLost,

    #[error("failed to wait for player process: {0}")]
    Wait(#[source] Arc<io::Error>),
}

/// Sent by a monitor task when its process ended without being asked to stop.
#[derive(Debug)]
pub struct Completion {
    /// The button the player belonged to.
    pub button: ButtonId,
    /// The ID of the handle whose process completed.
    pub handle: u64,
    /// The exit status, if it could be collected.
    pub status: Option<ExitStatus>,
}

/// Builds player commands. The sample is always the last argument.
#[derive(Clone, Debug)]
pub struct Launcher {
    command: String,
    args: Vec<String>,
    startup_grace: Duration,
}

impl Launcher {
    /// Creates a new launcher for the given player command and fixed arguments.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Launcher {
        Launcher {
            command: command.into(),
            args,
            startup_grace: DEFAULT_STARTUP_GRACE,
        }
    }

    /// Sets how long a new player may take to fail before it counts as started.
    pub fn with_startup_grace(mut self, startup_grace: Duration) -> Launcher {
        self.startup_grace = startup_grace;
        self
    }

    /// The player command.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn command_for(&self, sample: &Path) -> Command {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(sample)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// A handle to one running player process.
pub struct PlayerHandle {
    /// Unique ID for this handle.
    id: u64,
    /// The process ID reported at spawn time.
    pid: Option<u32>,
    /// The sample being played.
    sample: PathBuf,
    /// Asks the monitor task to kill the process. Dropping it has the same effect.
    stop_tx: Option<oneshot::Sender<()>>,
    /// Receives the exit status once the process has been reaped.
    exit_rx: watch::Receiver<Option<PlayerExit>>,
}

impl PlayerHandle {
    /// Launches the player for the given sample.
    ///
    /// The sample must be a readable regular file. If the process ends on its own, a
    /// [`Completion`] is sent on `completions`.
    pub async fn spawn(
        launcher: &Launcher,
        button: ButtonId,
        sample: &Path,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Result<PlayerHandle, SpawnError> {
        check_sample(sample)?;

        let mut child =
            launcher
                .command_for(sample)
                .spawn()
                .map_err(|source| SpawnError::Launch {
                    command: launcher.command.clone(),
                    source,
                })?;

        // Catch players that fail on startup, e.g. when the audio device is busy. A
        // player that succeeds this quickly is left for the monitor to report.
        let early_exit = tokio::time::timeout(launcher.startup_grace, child.wait()).await;
        if let Ok(Ok(status)) = early_exit {
            if !status.success() {
                return Err(SpawnError::Exited {
                    command: launcher.command.clone(),
                    status,
                });
            }
        }

        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::SeqCst);
        let pid = child.id();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(monitor(child, button, id, stop_rx, exit_tx, completions));

        debug!(button, handle = id, pid, "Player spawned");
        Ok(PlayerHandle {
            id,
            pid,
            sample: sample.to_path_buf(),
            stop_tx: Some(stop_tx),
            exit_rx,
        })
    }

    /// The unique ID of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The process ID of the player.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The sample this player was started with.
    pub fn sample(&self) -> &Path {
        &self.sample
    }

    /// Requests that the process be killed. Does not wait.
    pub fn request_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The monitor may already be gone if the process completed.
            let _ = stop_tx.send(());
        }
    }

    /// Waits for the process to exit, for at most `limit`.
    pub async fn await_termination(&self, limit: Duration) -> Result<ExitStatus, TerminationError> {
        let mut exit_rx = self.exit_rx.clone();
        let result =
            match tokio::time::timeout(limit, exit_rx.wait_for(|exit| exit.is_some())).await {
                Err(_) => Err(TerminationError::Timeout {
                    pid: self.pid,
                    timeout: limit,
                }),
                Ok(Err(_)) => Err(TerminationError::MonitorLost),
                Ok(Ok(exit)) => match exit.as_ref() {
                    Some(Ok(status)) => Ok(*status),
                    Some(Err(e)) => Err(TerminationError::Wait(e.clone())),
                    None => Err(TerminationError::MonitorLost),
                },
            };
        result
    }

    /// Returns true until the process has been observed to exit.
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }
}

#[cfg(test)]
impl PlayerHandle {
    /// Creates a handle with no process behind it that never reports an exit (test only).
    pub fn unresponsive() -> PlayerHandle {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let _stop_rx = stop_rx;
            let _exit_tx = exit_tx;
            std::future::pending::<()>().await;
        });
        PlayerHandle {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::SeqCst),
            pid: None,
            sample: PathBuf::from("unresponsive.wav"),
            stop_tx: Some(stop_tx),
            exit_rx,
        }
    }
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("sample", &self.sample)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Checks that the sample exists, is a file and can be opened.
fn check_sample(sample: &Path) -> Result<(), SpawnError> {
    let metadata = fs::metadata(sample).map_err(|source| SpawnError::Sample {
        path: sample.to_path_buf(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(SpawnError::NotAFile(sample.to_path_buf()));
    }
    fs::File::open(sample).map_err(|source| SpawnError::Sample {
        path: sample.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Owns the child process until it has been reaped.
async fn monitor(
    mut child: Child,
    button: ButtonId,
    handle: u64,
    stop_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<PlayerExit>>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    enum Ended {
        Naturally(io::Result<ExitStatus>),
        Stopped,
    }

    // A dropped stop sender counts as a stop request.
    let ended = tokio::select! {
        result = child.wait() => Ended::Naturally(result),
        _ = stop_rx => Ended::Stopped,
    };

    let (result, natural) = match ended {
        Ended::Naturally(result) => (result, true),
        Ended::Stopped => {
            if let Err(e) = child.start_kill() {
                debug!(button, handle, error = %e, "Kill request failed");
            }
            (child.wait().await, false)
        }
    };

    let status = match &result {
        Ok(status) => {
            debug!(button, handle, %status, natural, "Player exited");
            Some(*status)
        }
        Err(e) => {
            error!(button, handle, error = %e, "Failed to wait for player process");
            None
        }
    };
    exit_tx.send_replace(Some(result.map_err(Arc::new)));

    if natural {
        // The registry may be gone during shutdown.
        let _ = completions.send(Completion {
            button,
            handle,
            status,
        });
    }
}
