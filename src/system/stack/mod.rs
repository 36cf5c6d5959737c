//! # Stack Lifecycle Watcher
//!
//! `docker compose` gives no structured "ready" signal, so readiness is
//! detected by scanning the merged stdout/stderr of an orchestration
//! subprocess for marker substrings.
//!
//! - **`scanner`**: the `ReadinessProbe` trait and the two-phase
//!   `MarkerScanner`, testable with synthetic chunks.
//! - This module: the per-stack session registry, the process plumbing that
//!   turns a child into an ordered stream of `StackEvent`s, and `watch`, which
//!   settles a `WatcherSession` on readiness, exit, timeout or cancellation.

pub mod scanner;

use crate::{errors::TaskError, system::executor::{self, ExecutionError}};
use lazy_static::lazy_static;
use scanner::{MarkerScanner, ReadinessProbe};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

lazy_static! {
    static ref ACTIVE_STACKS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

const READ_BUFFER_SIZE: usize = 8 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 64;
/// How long a process gets to honour SIGTERM before it is killed.
const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// How the subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

/// What the watcher observes from the subprocess, in order. `Exited` is only
/// sent once both output streams are drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    Output(String),
    Exited(ExitInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Scanning { armed: bool },
    Completed,
    Failed,
}

/// Holds the registry slot for one stack name. Dropping it frees the name.
#[derive(Debug)]
pub struct SessionGuard {
    stack: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut active = ACTIVE_STACKS.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.stack);
        log::debug!("Released stack session '{}'.", self.stack);
    }
}

/// Claims `stack` for one session. Fails if another session holds it.
pub fn acquire(stack: &str) -> Result<SessionGuard, TaskError> {
    let mut active = ACTIVE_STACKS.lock().unwrap_or_else(PoisonError::into_inner);
    if !active.insert(stack.to_string()) {
        return Err(TaskError::StackBusy(stack.to_string()));
    }
    log::debug!("Acquired stack session '{}'.", stack);
    Ok(SessionGuard {
        stack: stack.to_string(),
    })
}

/// Transient state for one stack operation.
#[derive(Debug)]
pub struct WatcherSession<P> {
    stack: String,
    probe: P,
    state: SessionState,
    complete_on_clean_exit: bool,
}

impl<P: ReadinessProbe> WatcherSession<P> {
    pub fn new(stack: &str, probe: P, complete_on_clean_exit: bool) -> Self {
        Self {
            stack: stack.to_string(),
            probe,
            state: SessionState::Starting,
            complete_on_clean_exit,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feeds a chunk and returns true once the session has completed.
    pub fn on_output(&mut self, chunk: &str) -> bool {
        if self.is_settled() {
            return self.state == SessionState::Completed;
        }
        self.probe.feed(chunk);
        let armed = self.probe.is_armed();
        if self.state != (SessionState::Scanning { armed }) {
            log::debug!("Stack '{}': {:?} -> Scanning(armed: {}).", self.stack, self.state, armed);
        }
        self.state = if self.probe.is_ready() {
            log::debug!("Stack '{}' is ready.", self.stack);
            SessionState::Completed
        } else {
            SessionState::Scanning { armed }
        };
        self.state == SessionState::Completed
    }

    /// Settles the session on process exit.
    pub fn on_exit(&mut self, exit: ExitInfo) -> Result<(), TaskError> {
        if self.state == SessionState::Completed || (exit.success() && self.complete_on_clean_exit) {
            self.state = SessionState::Completed;
            return Ok(());
        }
        self.state = SessionState::Failed;
        Err(TaskError::StackExited {
            stack: self.stack.clone(),
            code: exit.code,
            signal: exit.signal,
        })
    }

    fn fail(&mut self, err: TaskError) -> TaskError {
        self.state = SessionState::Failed;
        err
    }

    fn is_settled(&self) -> bool {
        matches!(self.state, SessionState::Completed | SessionState::Failed)
    }
}

/// Drives `session` from `events` until it settles.
///
/// Cancellation wins over the deadline, and the deadline wins over pending
/// output.
pub async fn watch<P, C>(
    session: &mut WatcherSession<P>,
    events: &mut mpsc::Receiver<StackEvent>,
    timeout: Duration,
    cancel: C,
    echo: bool,
) -> Result<(), TaskError>
where
    P: ReadinessProbe,
    C: Future<Output = ()>,
{
    let deadline = tokio::time::sleep_until(Instant::now() + timeout);
    tokio::pin!(deadline);
    tokio::pin!(cancel);

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                let stack = session.stack.clone();
                return Err(session.fail(TaskError::StackCancelled(stack)));
            }
            _ = &mut deadline => {
                let stack = session.stack.clone();
                return Err(session.fail(TaskError::StackTimeout { stack, timeout }));
            }
            event = events.recv() => match event {
                Some(StackEvent::Output(chunk)) => {
                    if echo {
                        print!("{chunk}");
                        let _ = std::io::stdout().flush();
                    }
                    if session.on_output(&chunk) {
                        return Ok(());
                    }
                }
                Some(StackEvent::Exited(exit)) => return session.on_exit(exit),
                None => {
                    return session.on_exit(ExitInfo { code: None, signal: None });
                }
            },
        }
    }
}

/// Everything needed to run one stack operation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub stack: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub arm_marker: Option<String>,
    pub ready_marker: String,
    pub timeout: Duration,
    /// A zero exit status counts as completion (teardown commands).
    pub complete_on_clean_exit: bool,
    /// Ask the process to terminate once ready (log followers).
    pub terminate_on_ready: bool,
    /// Mirror the process output to stdout.
    pub echo: bool,
}

impl SessionConfig {
    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Launches the subprocess described by `config` and waits for readiness.
///
/// The stack name is claimed before the launch, so a concurrent session on
/// the same name fails with `StackBusy` without spawning anything. On
/// timeout or cancellation the subprocess is asked to terminate, and the call
/// only returns once it has been reaped.
pub async fn run_session<C>(config: &SessionConfig, cancel: C) -> Result<(), TaskError>
where
    C: Future<Output = ()>,
{
    let _guard = acquire(&config.stack)?;
    log::debug!("Starting stack session '{}': {}", config.stack, config.command_line());

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (terminate_tx, terminate_rx) = oneshot::channel();
    let (reaped_tx, reaped_rx) = oneshot::channel();
    spawn_process(config, events_tx, terminate_rx, reaped_tx)?;

    let probe = MarkerScanner::new(config.arm_marker.as_deref(), &config.ready_marker);
    let mut session = WatcherSession::new(&config.stack, probe, config.complete_on_clean_exit);
    let outcome = watch(&mut session, &mut events_rx, config.timeout, cancel, config.echo).await;

    let terminate = match &outcome {
        Ok(()) => config.terminate_on_ready,
        Err(TaskError::StackTimeout { .. } | TaskError::StackCancelled(_)) => true,
        Err(_) => false,
    };
    // Once the waiter has finished the send fails and there is nothing left
    // to reap. Otherwise the child must be gone before the caller may exit.
    if terminate && terminate_tx.send(()).is_ok() {
        log::debug!("Requested termination of stack '{}' process.", config.stack);
        if reaped_rx.await.is_err() {
            log::warn!("Stack '{}' process waiter ended before reaping it.", config.stack);
        }
    }
    outcome
}

fn spawn_process(
    config: &SessionConfig,
    events: mpsc::Sender<StackEvent>,
    terminate: oneshot::Receiver<()>,
    reaped: oneshot::Sender<()>,
) -> Result<(), TaskError> {
    let mut command = executor::build_command(&config.program, &config.args, &config.cwd, &config.env);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| ExecutionError::CommandFailed(config.command_line(), e))?;
    log::debug!("Spawned stack process (PID: {:?}).", child.id());

    let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, events.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, events.clone()));
    }

    tokio::spawn(async move {
        let mut terminate = terminate;
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = &mut terminate => shut_down(&mut child).await,
        };
        // Reaped; output may still be draining from orphaned descendants.
        let _ = reaped.send(());
        for reader in readers {
            let _ = reader.await;
        }
        let exit = match status {
            Ok(status) => ExitInfo::from(status),
            Err(e) => {
                log::warn!("Could not collect stack process status: {}", e);
                ExitInfo { code: None, signal: None }
            }
        };
        let _ = events.send(StackEvent::Exited(exit)).await;
    });
    Ok(())
}

/// Forwards decoded output chunks. Once the watcher is gone the stream is
/// still drained so the child never blocks on a full pipe.
fn spawn_reader<R>(mut stream: R, events: mpsc::Sender<StackEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0_u8; READ_BUFFER_SIZE];
        let mut decoder = Utf8Carry::default();
        let mut forwarding = true;
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = decoder.decode(buf.get(..n).unwrap_or_default());
                    if forwarding && !text.is_empty() {
                        forwarding = events.send(StackEvent::Output(text)).await.is_ok();
                    }
                }
                Err(e) => {
                    log::warn!("Error reading stack process output: {}", e);
                    break;
                }
            }
        }
    })
}

/// Asks the child to stop and waits for it, killing it once the grace period
/// runs out.
async fn shut_down(child: &mut Child) -> std::io::Result<ExitStatus> {
    request_termination(child).await;
    match tokio::time::timeout(TERMINATION_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            log::warn!("Stack process ignored SIGTERM, killing it.");
            child.kill().await?;
            child.wait().await
        }
    }
}

/// Cooperative termination: SIGTERM where available, a hard kill otherwise.
async fn request_termination(child: &mut Child) {
    if let Some(pid) = child.id() {
        if send_sigterm(pid).await {
            return;
        }
    }
    if let Err(e) = child.start_kill() {
        log::warn!("Failed to kill stack process: {}", e);
    }
}

#[cfg(unix)]
async fn send_sigterm(pid: u32) -> bool {
    tokio::process::Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
async fn send_sigterm(_pid: u32) -> bool {
    false
}

/// Decodes UTF-8 across read boundaries, holding back an incomplete trailing
/// sequence until the next read.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let rest = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }
}
