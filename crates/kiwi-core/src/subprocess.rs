//! Streaming, interruptible shell command execution.
//!
//! A run uses four tasks: one reader per pipe, one that owns the child and
//! reaps it, and one that listens for SIGINT/SIGTERM. Signal listeners are
//! installed before the child is spawned so an early Ctrl-C is never lost.
//! All four are joined (or aborted, for the listener) before `run` returns.
//!
//! Once installed, tokio keeps the process-level handlers for the life of
//! the process, so SIGINT and SIGTERM no longer stop kiwi by default. The
//! front end decides what they mean between commands; [`command_running`]
//! tells it whether a runner is currently handling them.

use crate::error::{InterruptCause, SubprocessError};
use crate::terminal::TerminalCoordinator;
use crate::ui_writer::OutputStream;
use kiwi_providers::decode_utf8_streaming;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const READ_BUFFER_SIZE: usize = 1024;
/// How long a child gets to exit after a forwarded signal before it is killed.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);
/// How long to keep reading after exit; background grandchildren may hold the pipes open.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

static ACTIVE_COMMANDS: AtomicUsize = AtomicUsize::new(0);

/// True while any [`SubprocessRunner::run`] is in progress in this process.
pub fn command_running() -> bool {
    ACTIVE_COMMANDS.load(Ordering::SeqCst) > 0
}

/// Counts one run in [`ACTIVE_COMMANDS`] until dropped.
struct ActiveCommand;

impl ActiveCommand {
    fn enter() -> Self {
        ACTIVE_COMMANDS.fetch_add(1, Ordering::SeqCst);
        ActiveCommand
    }
}

impl Drop for ActiveCommand {
    fn drop(&mut self) {
        ACTIVE_COMMANDS.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Interrupt,
    Terminate,
}

impl StopSignal {
    fn name(self) -> &'static str {
        match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
        }
    }
}

pub struct SubprocessRunner {
    terminal: Arc<TerminalCoordinator>,
    shell: String,
    working_dir: Option<PathBuf>,
    kill_grace: Duration,
    drain_grace: Duration,
}

impl SubprocessRunner {
    pub fn new(terminal: Arc<TerminalCoordinator>) -> Self {
        Self {
            terminal,
            shell: "bash".to_string(),
            working_dir: None,
            kill_grace: DEFAULT_KILL_GRACE,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn with_shell(mut self, shell: &str) -> Self {
        self.shell = shell.to_string();
        self
    }

    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Run `command_line` with `<shell> -c`, echoing output live through the
    /// terminal and returning everything it printed.
    ///
    /// A received SIGINT/SIGTERM or a fired `cancel` token stops the child and
    /// yields [`SubprocessError::Interrupted`] carrying the partial output.
    pub async fn run(&self, command_line: &str, cancel: &CancellationToken) -> Result<String, SubprocessError> {
        let _active = ActiveCommand::enter();
        let signals = SignalListener::register()?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| SubprocessError::Spawn {
            shell: self.shell.clone(),
            source,
        })?;
        debug!("Spawned {} -c {:?} (pid {:?})", self.shell, command_line, child.id());

        let output = Arc::new(Mutex::new(String::new()));
        let readers_cancel = CancellationToken::new();
        let interrupted: Arc<Mutex<Option<InterruptCause>>> = Arc::new(Mutex::new(None));

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_output(
                stdout,
                OutputStream::Stdout,
                output.clone(),
                self.terminal.clone(),
                readers_cancel.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_output(
                stderr,
                OutputStream::Stderr,
                output.clone(),
                self.terminal.clone(),
                readers_cancel.clone(),
            )));
        }

        let (stop_tx, stop_rx) = mpsc::channel(4);
        let mut wait_task = tokio::spawn(wait_for_exit(child, stop_rx, self.kill_grace));

        let signal_task = tokio::spawn(forward_signals(
            signals,
            stop_tx.clone(),
            readers_cancel.clone(),
            self.terminal.clone(),
            interrupted.clone(),
        ));

        let joined = tokio::select! {
            joined = &mut wait_task => joined,
            _ = cancel.cancelled() => {
                debug!("Cancellation requested, stopping child");
                lock(&interrupted).get_or_insert(InterruptCause::Cancelled);
                let _ = stop_tx.send(StopSignal::Terminate).await;
                readers_cancel.cancel();
                (&mut wait_task).await
            }
        };

        signal_task.abort();
        let _ = signal_task.await;

        // Readers normally hit EOF right after exit; cap the wait in case a
        // background grandchild still holds a pipe.
        let drain = join_readers(readers);
        tokio::pin!(drain);
        if tokio::time::timeout(self.drain_grace, &mut drain).await.is_err() {
            debug!("Output pipes still open after exit, abandoning readers");
            readers_cancel.cancel();
            drain.await;
        }

        let mut output = std::mem::take(&mut *lock(&output));
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }

        if let Some(cause) = lock(&interrupted).take() {
            return Err(SubprocessError::Interrupted { cause, output });
        }

        let status = joined.map_err(|e| SubprocessError::Io(io::Error::new(io::ErrorKind::Other, e)))??;
        if status.success() {
            Ok(output)
        } else {
            Err(SubprocessError::NonZeroExit {
                status: status.to_string(),
                code: status.code(),
                output,
            })
        }
    }
}

async fn join_readers(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Output reader task failed: {}", e);
        }
    }
}

async fn pump_output<R>(
    mut reader: R,
    stream: OutputStream,
    output: Arc<Mutex<String>>,
    terminal: Arc<TerminalCoordinator>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("Error reading {:?}: {}", stream, e);
                    break;
                }
            },
        };

        pending.extend_from_slice(&buf[..n]);
        if let Some(text) = decode_utf8_streaming(&mut pending) {
            let mut out = lock(&output);
            out.push_str(&text);
            terminal.write_output(stream, &text);
        }
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        lock(&output).push_str(&text);
        terminal.write_output(stream, &text);
    }
}

/// Owns the child: reaps it, and on request forwards a stop signal, then
/// kills it outright if it outlives the grace period.
async fn wait_for_exit(
    mut child: Child,
    mut stop_rx: mpsc::Receiver<StopSignal>,
    grace: Duration,
) -> io::Result<ExitStatus> {
    let signal = tokio::select! {
        status = child.wait() => return status,
        Some(signal) = stop_rx.recv() => signal,
    };

    let delivered = child
        .id()
        .map(|pid| send_signal(pid, signal))
        .unwrap_or(Ok(()));
    if let Err(e) = delivered {
        warn!("Failed to forward {} to child: {}, killing it", signal.name(), e);
        child.start_kill()?;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            debug!("Child ignored {}, killing it", signal.name());
            child.start_kill()?;
            child.wait().await
        }
    }
}

async fn forward_signals(
    mut signals: SignalListener,
    stop_tx: mpsc::Sender<StopSignal>,
    readers_cancel: CancellationToken,
    terminal: Arc<TerminalCoordinator>,
    interrupted: Arc<Mutex<Option<InterruptCause>>>,
) {
    let Some(signal) = signals.recv().await else {
        return;
    };

    lock(&interrupted).get_or_insert(InterruptCause::Signal(signal.name().to_string()));
    terminal.force_idle();
    terminal.println("");
    terminal.println(&format!("⚠️  Received {}, stopping command...", signal.name()));

    let _ = stop_tx.send(signal).await;
    readers_cancel.cancel();
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: StopSignal) -> io::Result<()> {
    let signo = match signal {
        StopSignal::Interrupt => libc::SIGINT,
        StopSignal::Terminate => libc::SIGTERM,
    };
    let pid = pid as libc::pid_t;
    // The child leads its own process group; signal the whole group first.
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(-pid, signo) } == 0 {
        return Ok(());
    }
    // SAFETY: as above.
    if unsafe { libc::kill(pid, signo) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: StopSignal) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "signal forwarding is not supported"))
}

#[cfg(unix)]
struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> Option<StopSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(StopSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(StopSignal::Terminate),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<StopSignal> {
        tokio::signal::ctrl_c().await.ok().map(|_| StopSignal::Interrupt)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
