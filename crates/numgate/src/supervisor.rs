//! Helper process supervisor - owns the helper child's lifecycle.
//!
//! Flow:
//! 1. `start()` spawns `<command> <script> --host <h> --port <p>`
//! 2. A watcher task owns the child, logs its exit and clears the handle
//! 3. `stop()` signals the child, detaches the handle, and force-kills after
//!    `FORCE_KILL_TIMEOUT` if it is still alive
//!
//! `stop()` detaches before the child has exited, so a `start()` issued during
//! the termination window spawns a fresh helper alongside the exiting one.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};

use crate::config::{HelperConfig, HelperStdio};

/// How long a stopped helper gets to exit before it is force-killed.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Termination request received by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / ctrl-c
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownSignal {
    /// Signal to forward to the helper. Interrupts become SIGTERM so the
    /// helper always gets a signal it runs cleanup for.
    pub fn for_helper(self) -> Self {
        match self {
            Self::Interrupt | Self::Terminate => Self::Terminate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }

    #[cfg(unix)]
    fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            Self::Interrupt => nix::sys::signal::Signal::SIGINT,
            Self::Terminate => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HelperSpawnConfig {
    pub command: PathBuf,
    pub script_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub stdio: HelperStdio,
}

impl From<&HelperConfig> for HelperSpawnConfig {
    fn from(config: &HelperConfig) -> Self {
        Self {
            command: config.command.clone(),
            script_path: config.script_path.clone(),
            host: config.host.clone(),
            port: config.port,
            stdio: config.stdio,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn helper `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("helper process exited before its pid could be read")]
    MissingPid,
}

/// The one live helper the supervisor tracks.
struct TrackedHelper {
    generation: u64,
    pid: u32,
    kill_tx: oneshot::Sender<()>,
    exited: watch::Receiver<bool>,
}

type HelperSlot = Arc<StdMutex<Option<TrackedHelper>>>;

fn lock_slot(slot: &StdMutex<Option<TrackedHelper>>) -> MutexGuard<'_, Option<TrackedHelper>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct HelperSupervisor {
    config: HelperSpawnConfig,
    tracked: HelperSlot,
    next_generation: AtomicU64,
}

impl HelperSupervisor {
    pub fn new(config: HelperSpawnConfig) -> Self {
        Self {
            config,
            tracked: Arc::new(StdMutex::new(None)),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        lock_slot(&self.tracked).is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        lock_slot(&self.tracked).as_ref().map(|helper| helper.pid)
    }

    /// Spawn the helper unless one is already tracked.
    ///
    /// Spawn failures are logged and swallowed; the readiness gate is what
    /// turns a helper that never came up into a startup failure.
    pub fn start(&self) {
        let mut slot = lock_slot(&self.tracked);
        if let Some(helper) = slot.as_ref() {
            tracing::debug!(pid = helper.pid, "Helper already running, ignoring start");
            return;
        }

        let (child, pid) = match self.spawn_child() {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start helper");
                return;
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);

        *slot = Some(TrackedHelper {
            generation,
            pid,
            kill_tx,
            exited: exited_rx,
        });
        drop(slot);

        tracing::info!(
            pid,
            command = %self.config.command.display(),
            script = %self.config.script_path.display(),
            host = %self.config.host,
            port = self.config.port,
            "Spawned helper process"
        );

        tokio::spawn(watch_child(
            child,
            pid,
            generation,
            kill_rx,
            exited_tx,
            Arc::clone(&self.tracked),
        ));
    }

    /// Ask the helper to exit with `signal`.
    ///
    /// The handle is detached and the signal sent before this returns. The
    /// returned future resolves once the child has exited; a fallback timer
    /// force-kills it after `FORCE_KILL_TIMEOUT` whether or not the future
    /// is polled. With no helper tracked the future is already complete.
    pub fn stop(&self, signal: ShutdownSignal) -> impl Future<Output = ()> + Send + use<> {
        let detached = lock_slot(&self.tracked).take();

        let exited = detached.map(|helper| {
            let TrackedHelper {
                pid,
                kill_tx,
                exited,
                ..
            } = helper;

            tracing::info!(pid, %signal, "Stopping helper process");

            if send_signal(pid, signal) {
                let mut exited_for_timer = exited.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(FORCE_KILL_TIMEOUT) => {
                            tracing::warn!(
                                pid,
                                timeout_secs = FORCE_KILL_TIMEOUT.as_secs(),
                                "Helper did not exit in time, force killing"
                            );
                            let _ = kill_tx.send(());
                        }
                        _ = exited_for_timer.wait_for(|done| *done) => {}
                    }
                });
            } else {
                tracing::debug!(pid, "Graceful signal not delivered, force killing");
                let _ = kill_tx.send(());
            }

            exited
        });

        async move {
            if let Some(mut exited) = exited {
                let _ = exited.wait_for(|done| *done).await;
            }
        }
    }

    fn spawn_child(&self) -> Result<(Child, u32), SpawnError> {
        let config = &self.config;
        let mut command = Command::new(&config.command);
        command
            .arg(&config.script_path)
            .arg("--host")
            .arg(&config.host)
            .arg("--port")
            .arg(config.port.to_string())
            .kill_on_drop(true);

        match config.stdio {
            HelperStdio::Inherit => command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit()),
            HelperStdio::Null => command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null()),
        };

        let child = command.spawn().map_err(|source| SpawnError::Spawn {
            command: config.command.display().to_string(),
            source,
        })?;
        let pid = child.id().ok_or(SpawnError::MissingPid)?;
        Ok((child, pid))
    }
}

impl Drop for HelperSupervisor {
    fn drop(&mut self) {
        if let Some(helper) = lock_slot(&self.tracked).take() {
            tracing::debug!(pid = helper.pid, "Supervisor dropped, killing helper");
            let _ = helper.kill_tx.send(());
        }
    }
}

/// Own the child until it exits, then clear the tracked handle if it still
/// refers to this child.
async fn watch_child(
    mut child: Child,
    pid: u32,
    generation: u64,
    mut kill_rx: oneshot::Receiver<()>,
    exited_tx: watch::Sender<bool>,
    tracked: HelperSlot,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(pid, error = %e, "Failed to force kill helper");
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) => tracing::info!(
            pid,
            code = ?status.code(),
            signal = ?exit_signal(&status),
            "Helper process exited"
        ),
        Err(e) => tracing::warn!(pid, error = %e, "Failed to wait for helper process"),
    }

    {
        let mut slot = lock_slot(&tracked);
        if slot
            .as_ref()
            .is_some_and(|helper| helper.generation == generation)
        {
            *slot = None;
        }
    }

    let _ = exited_tx.send(true);
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Deliver `signal` to the helper. Returns false when it was not delivered.
#[cfg(unix)]
fn send_signal(pid: u32, signal: ShutdownSignal) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(pid_i32) = i32::try_from(pid) else {
        tracing::warn!(pid, "Helper pid exceeds i32::MAX, cannot signal it");
        return false;
    };

    match kill(Pid::from_raw(pid_i32), signal.as_nix()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(pid, %signal, error = %e, "Failed to signal helper");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: ShutdownSignal) -> bool {
    false
}
