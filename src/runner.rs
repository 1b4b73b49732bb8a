//! Run execution and supervision.
//!
//! This module contains the `Supervisor`, which spawns sqlmap child
//! processes, streams their combined output line-by-line to the event
//! channel, and handles cooperative cancellation. Each run is owned by its
//! own worker task; one stuck child never stalls another run or the caller.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::RunEvent;
use crate::process::RunId;

/// How long a cancelled process gets to exit on its own before being killed.
pub const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(2);

/// Timing for cooperative cancellation.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownConfig {
    term_grace: Duration,
}

impl ShutdownConfig {
    pub fn new(term_grace_ms: u64) -> Self {
        Self {
            term_grace: Duration::from_millis(term_grace_ms),
        }
    }

    fn term_grace(&self) -> Duration {
        self.term_grace
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            term_grace: DEFAULT_TERM_GRACE,
        }
    }
}

/// Supervises zero or more concurrently running sqlmap processes.
///
/// `start` allocates a fresh, never-reused handle and spawns a worker task
/// that owns the child and both of its pipes exclusively for the run's
/// lifetime. The handle-to-token map is the only shared state; `cancel`
/// merely trips the run's token.
pub struct Supervisor {
    next_id: AtomicU64,
    live: Arc<Mutex<HashMap<RunId, CancellationToken>>>,
    event_tx: mpsc::Sender<RunEvent>,
    shutdown: ShutdownConfig,
}

impl Supervisor {
    pub fn new(event_tx: mpsc::Sender<RunEvent>, shutdown: ShutdownConfig) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            live: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            shutdown,
        }
    }

    /// Starts a new run and returns its handle immediately.
    ///
    /// Launch failures surface asynchronously as a `Failed` event for the
    /// returned handle, never through this call.
    pub fn start(&self, argv: Vec<String>) -> RunId {
        let id = RunId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        lock(&self.live).insert(id, cancel.clone());

        let tx = self.event_tx.clone();
        let live = Arc::clone(&self.live);
        let shutdown = self.shutdown;
        tracing::info!(run = %id, "starting run");
        tokio::spawn(async move {
            let outcome = drive_run(id, &argv, &cancel, &tx, shutdown).await;
            lock(&live).remove(&id);
            match outcome {
                Outcome::Exited { code, cancelled } => {
                    tracing::info!(run = %id, code = ?code, cancelled, "run finished");
                    let _ = tx.send(RunEvent::Exited { id, code, cancelled }).await;
                }
                Outcome::Failed(error) => {
                    tracing::warn!(run = %id, %error, "run failed");
                    let _ = tx.send(RunEvent::Failed { id, error }).await;
                }
            }
        });
        id
    }

    /// Requests cooperative cancellation of a run.
    ///
    /// Unknown or already-terminal handles are ignored.
    pub fn cancel(&self, id: RunId) {
        if let Some(token) = lock(&self.live).get(&id) {
            tracing::info!(run = %id, "cancellation requested");
            token.cancel();
        }
    }

    /// Requests cancellation of every live run.
    pub fn cancel_all(&self) {
        for token in lock(&self.live).values() {
            token.cancel();
        }
    }

    /// Number of runs that have not yet reached a terminal state.
    pub fn live_runs(&self) -> usize {
        lock(&self.live).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Outcome {
    Exited { code: Option<i32>, cancelled: bool },
    Failed(String),
}

/// Spawns the child and drives it to completion.
///
/// Exactly one terminal outcome is produced per call, whatever happens in
/// between: spawn failure, read errors, cancellation, or a plain exit.
async fn drive_run(
    id: RunId,
    argv: &[String],
    cancel: &CancellationToken,
    tx: &mpsc::Sender<RunEvent>,
    shutdown: ShutdownConfig,
) -> Outcome {
    let Some((program, args)) = argv.split_first() else {
        return Outcome::Failed("empty argument vector".to_string());
    };

    let mut command = Command::new(program);
    command.args(args);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.kill_on_drop(true);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
    }

    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Outcome::Failed(format!("'{program}' was not found when spawning"));
        }
        Err(err) => {
            return Outcome::Failed(format!("failed to start '{program}': {err}"));
        }
    };
    tracing::debug!(run = %id, pid = ?child.id(), "process spawned");

    let Some(stdout) = child.stdout.take() else {
        return Outcome::Failed("stdout pipe unavailable".to_string());
    };
    let Some(stderr) = child.stderr.take() else {
        return Outcome::Failed("stderr pipe unavailable".to_string());
    };
    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);

    // Partial lines persist across loop iterations; read_until keeps
    // whatever it read in the buffer if another branch wins the select.
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut cancelled = false;

    while stdout_open || stderr_open {
        tokio::select! {
            biased;

            () = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                let _ = tx
                    .send(RunEvent::Output {
                        id,
                        line: "[info] run cancelled by user".to_string(),
                    })
                    .await;
                terminate(&mut child, shutdown.term_grace()).await;
                // The pipes drain to EOF below now that the child is gone.
            }
            read = stdout.read_until(b'\n', &mut stdout_buf), if stdout_open => {
                match read {
                    Ok(0) => stdout_open = false,
                    Ok(_) => {
                        let line = take_line(&mut stdout_buf);
                        let _ = tx.send(RunEvent::Output { id, line }).await;
                    }
                    Err(err) => {
                        stdout_open = false;
                        tracing::warn!(run = %id, error = %err, "stdout read error");
                    }
                }
            }
            read = stderr.read_until(b'\n', &mut stderr_buf), if stderr_open => {
                match read {
                    Ok(0) => stderr_open = false,
                    Ok(_) => {
                        let line = take_line(&mut stderr_buf);
                        let _ = tx.send(RunEvent::Output { id, line }).await;
                    }
                    Err(err) => {
                        stderr_open = false;
                        tracing::warn!(run = %id, error = %err, "stderr read error");
                    }
                }
            }
        }
    }

    // Closed pipes do not mean the process exited; always wait for the real
    // status, and keep honoring cancellation while doing so.
    let status = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                terminate(&mut child, shutdown.term_grace()).await;
            }
            status = child.wait() => break status,
        }
    };

    match status {
        Ok(status) => Outcome::Exited {
            code: status.code(),
            cancelled,
        },
        Err(err) => Outcome::Failed(format!("failed waiting for '{program}': {err}")),
    }
}

// Trims the line terminator and decodes with replacement; the buffer is
// left empty for the next read.
fn take_line(buf: &mut Vec<u8>) -> String {
    while let Some(&b'\n' | &b'\r') = buf.last() {
        buf.pop();
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}

// Graceful first: signal the process group, give it the grace period, then
// force-kill.
async fn terminate(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        send_term_signal(pid);
    }
    if let Ok(Some(_)) = wait_for_exit(child, grace).await {
        return;
    }
    let _ = child.kill().await;
}

async fn wait_for_exit(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    if timeout.is_zero() {
        return Ok(None);
    }
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(status)),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(None),
    }
}

#[cfg(unix)]
fn send_term_signal(pid: u32) {
    unsafe {
        let pid = pid as i32;
        // Signal the whole group; sqlmap forks helper processes.
        let _ = libc::kill(-pid, libc::SIGTERM);
        let _ = libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(windows)]
fn send_term_signal(pid: u32) {
    use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
    // Windows has no SIGTERM; CTRL_BREAK is the closest console signal we can emit.
    unsafe {
        let _ = GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid);
    }
}

#[cfg(not(any(unix, windows)))]
fn send_term_signal(_pid: u32) {}
