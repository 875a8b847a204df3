//! Subprocess execution for backend CLIs.
//!
//! A [`CommandRunner`] starts one program invocation and hands back a
//! [`ProcessStream`]: stdout as a sequence of lines, then a [`WaitOutcome`].
//! Cancellation and the per-invocation timeout are enforced by a supervisor
//! task that kills the child and reports the reason.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SdkError;

/// Generic failure.
pub const EXIT_FAILURE: i32 = 1;
/// The invocation exceeded its timeout.
pub const EXIT_TIMEOUT: i32 = 124;
/// The backend executable was not found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// The invocation was cancelled.
pub const EXIT_CANCELLED: i32 = 130;

const LINE_BUFFER: usize = 256;

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,

    /// Ordered argument list.
    pub args: Vec<String>,

    /// Working directory for the child.
    pub work_dir: PathBuf,

    /// Payload written to stdin before it is closed. `None` means stdin is null.
    pub stdin: Option<String>,

    /// Kill the child once this much time has elapsed.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Create an invocation running in the current directory.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: PathBuf::from("."),
            stdin: None,
            timeout: None,
        }
    }

    /// Set the working directory.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Set a stdin payload.
    pub fn with_stdin(mut self, payload: Option<String>) -> Self {
        self.stdin = payload;
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Why an invocation did not produce an exit code of its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    #[error("not found on PATH")]
    NotFound,

    #[error("was cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("was terminated by signal {0}")]
    Signaled(i32),

    #[error("failed: {0}")]
    Io(String),
}

impl ExecutionFailure {
    /// Shell-style exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound => EXIT_NOT_FOUND,
            Self::Cancelled => EXIT_CANCELLED,
            Self::TimedOut(_) => EXIT_TIMEOUT,
            Self::Signaled(signal) => 128 + signal,
            Self::Io(_) => EXIT_FAILURE,
        }
    }
}

/// Resolved result of waiting for a backend process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Exit code 0.
    #[default]
    Success,
    /// Non-zero exit code.
    Exited(i32),
    /// The process never produced an exit code of its own.
    Failed(ExecutionFailure),
}

impl WaitOutcome {
    /// Map an OS exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Failed(ExecutionFailure::Signaled(signal));
            }
        }
        Self::Failed(ExecutionFailure::Io(
            "process exited without a status code".to_string(),
        ))
    }

    /// Exit code reported to the caller.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Exited(code) => *code,
            Self::Failed(failure) => failure.exit_code(),
        }
    }

    /// Returns true for exit code 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable description naming the program.
    pub fn describe(&self, program: &str) -> String {
        match self {
            Self::Success => format!("{program} exited successfully"),
            Self::Exited(code) => format!("{program} exited with status {code}"),
            Self::Failed(failure) => {
                format!("{program} {failure} (exit code {})", failure.exit_code())
            }
        }
    }
}

/// Streaming view of a running invocation.
pub struct ProcessStream {
    lines: mpsc::Receiver<String>,
    exit: oneshot::Receiver<WaitOutcome>,
}

impl ProcessStream {
    /// Assemble a stream from its channels.
    pub fn new(lines: mpsc::Receiver<String>, exit: oneshot::Receiver<WaitOutcome>) -> Self {
        Self { lines, exit }
    }

    /// A stream with no output that resolves immediately.
    pub fn finished(outcome: WaitOutcome) -> Self {
        let (line_tx, lines) = mpsc::channel(1);
        drop(line_tx);
        let (exit_tx, exit) = oneshot::channel();
        let _ = exit_tx.send(outcome);
        Self { lines, exit }
    }

    /// Next stdout line, or `None` once stdout is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the process to be resolved.
    pub async fn wait(self) -> WaitOutcome {
        match self.exit.await {
            Ok(outcome) => outcome,
            Err(_) => WaitOutcome::Failed(ExecutionFailure::Io(
                "process supervisor ended without reporting a status".to_string(),
            )),
        }
    }
}

/// Starts program invocations.
///
/// The task runner receives one of these explicitly, so tests can substitute
/// a scripted implementation without touching any global state.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Start `invocation`. `cancel` kills the process when it fires.
    async fn run(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<ProcessStream, SdkError>;
}

/// Runs real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<ProcessStream, SdkError> {
        let Invocation {
            program,
            args,
            work_dir,
            stdin,
            timeout,
        } = invocation;

        info!(
            program = %program,
            work_dir = %work_dir.display(),
            arg_count = args.len(),
            stdin = stdin.is_some(),
            "Spawning backend process"
        );
        debug!(args = ?args, "Full argument list");

        // A missing cwd also surfaces as NotFound from spawn.
        if !work_dir.is_dir() {
            return Err(SdkError::Io(format!(
                "working directory '{}' does not exist",
                work_dir.display()
            )));
        }

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&work_dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(program = %program, "Backend CLI not found");
                return Ok(ProcessStream::finished(WaitOutcome::Failed(
                    ExecutionFailure::NotFound,
                )));
            }
            Err(e) => {
                error!(program = %program, error = %e, "Failed to spawn backend process");
                return Err(SdkError::SpawnError(e));
            }
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SdkError::Io("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SdkError::Io("Failed to get stderr".to_string()))?;

        // Written on its own task so stdout keeps draining while the child
        // consumes input.
        let stdin_writer = match stdin {
            Some(payload) => {
                let mut pipe = child
                    .stdin
                    .take()
                    .ok_or_else(|| SdkError::Io("Failed to get stdin".to_string()))?;
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(payload.as_bytes()).await {
                        debug!(error = %e, "Backend closed stdin before payload was written");
                    }
                    // Dropping the pipe closes the child's stdin.
                }))
            }
            None => None,
        };

        let stderr_program = program.clone();
        tokio::spawn(async move {
            let mut lines = LineReader::new(stderr);
            while let Some(line) = lines.next().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    warn!(program = %stderr_program, stderr = %trimmed, "Backend stderr");
                }
            }
        });

        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let reader = tokio::spawn(forward_lines(stdout, line_tx));

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(supervise(
            child,
            reader,
            stdin_writer,
            cancel,
            timeout,
            program,
            exit_tx,
        ));

        Ok(ProcessStream::new(line_rx, exit_rx))
    }
}

/// Lossy line reader: invalid UTF-8 never ends the stream.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next(&mut self) -> Option<String> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) => None,
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.buf);
                Some(line.trim_end_matches(['\n', '\r']).to_string())
            }
            Err(e) => {
                warn!(error = %e, "Error reading backend output");
                None
            }
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(stdout: R, tx: mpsc::Sender<String>) {
    let mut lines = LineReader::new(stdout);
    let mut count = 0u64;
    while let Some(line) = lines.next().await {
        count += 1;
        if tx.send(line).await.is_err() {
            debug!("Line consumer dropped, stopping stdout reader");
            return;
        }
    }
    debug!(total_lines = count, "Backend stdout closed (EOF)");
}

async fn supervise(
    mut child: Child,
    mut reader: JoinHandle<()>,
    stdin_writer: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    program: String,
    exit_tx: oneshot::Sender<WaitOutcome>,
) {
    let deadline = sleep_or_pending(timeout);
    tokio::pin!(deadline);

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => WaitOutcome::from_status(status),
            Err(e) => WaitOutcome::Failed(ExecutionFailure::Io(e.to_string())),
        },
        _ = cancel.cancelled() => {
            info!(program = %program, "Cancellation requested, killing backend process");
            kill(&mut child, &program).await;
            WaitOutcome::Failed(ExecutionFailure::Cancelled)
        }
        _ = &mut deadline => {
            let limit = timeout.unwrap_or_default();
            warn!(program = %program, timeout_secs = limit.as_secs(), "Backend timed out, killing process");
            kill(&mut child, &program).await;
            WaitOutcome::Failed(ExecutionFailure::TimedOut(limit))
        }
    };

    // A grandchild may still hold stdout open after the child is gone.
    match outcome {
        WaitOutcome::Failed(ExecutionFailure::Cancelled | ExecutionFailure::TimedOut(_)) => {
            reader.abort();
        }
        _ => {
            tokio::select! {
                _ = &mut reader => {}
                _ = cancel.cancelled() => reader.abort(),
                _ = &mut deadline => reader.abort(),
            }
        }
    }
    if let Some(writer) = stdin_writer {
        writer.abort();
    }

    info!(
        program = %program,
        exit_code = outcome.exit_code(),
        success = outcome.is_success(),
        "Backend process finished"
    );
    let _ = exit_tx.send(outcome);
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

async fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        warn!(program = %program, error = %e, "Failed to kill backend process");
    }
}
