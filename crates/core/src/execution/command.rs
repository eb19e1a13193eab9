//! Command execution
//!
//! Runs one external process to completion and turns whatever happened into a
//! [`RunResult`]. Output is always captured in full; in streaming mode it is
//! also mirrored to the console as it arrives.

use std::env;
use std::future::pending;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::results::RunResult;
use crate::types::{CtError, CtResult};

/// Environment variable that overrides the default interpreter
pub const INTERPRETER_ENV: &str = "CT_PYTHON";
pub const DEFAULT_INTERPRETER: &str = "python3";

/// How long to keep draining output after the process was killed. Grandchildren
/// can hold the pipes open.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Mirror output to the console while capturing it
    pub stream: bool,
    /// Interpreter for scripts, ahead of the environment and the default
    pub interpreter: Option<String>,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
    /// Kill the process when this fires
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn streaming() -> Self {
        Self {
            stream: true,
            ..Default::default()
        }
    }

    pub fn buffered() -> Self {
        Self::default()
    }
}

/// Executes scripts and programs, producing one [`RunResult`] per run
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    default_interpreter: String,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CommandExecutor {
    pub fn new(default_interpreter: impl Into<String>) -> Self {
        Self {
            default_interpreter: default_interpreter.into(),
        }
    }

    /// Executor whose interpreter comes from `CT_PYTHON`, else `python3`
    pub fn from_env() -> Self {
        Self::new(resolve_interpreter(None, env::var(INTERPRETER_ENV).ok()))
    }

    pub fn interpreter_for(&self, opts: &RunOptions) -> String {
        opts.interpreter
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| self.default_interpreter.clone())
    }

    /// Run `<interpreter> <script> <args...>`.
    ///
    /// Fails with [`CtError::NotFound`] without spawning anything when the
    /// script does not exist. Any other failure comes back as
    /// [`CtError::Execution`] carrying the failed record.
    pub async fn run_script(
        &self,
        script: &Path,
        args: &[String],
        opts: &RunOptions,
    ) -> CtResult<RunResult> {
        if !script.exists() {
            return Err(CtError::NotFound(script.to_path_buf()));
        }

        let interpreter = self.interpreter_for(opts);
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(script.to_string_lossy().into_owned());
        argv.extend(args.iter().cloned());

        self.execute(&interpreter, argv, opts).await
    }

    /// Run a program directly, without an interpreter
    pub async fn run_program(
        &self,
        program: &str,
        args: &[String],
        opts: &RunOptions,
    ) -> CtResult<RunResult> {
        self.execute(program, args.to_vec(), opts).await
    }

    async fn execute(
        &self,
        program: &str,
        argv: Vec<String>,
        opts: &RunOptions,
    ) -> CtResult<RunResult> {
        let mut command = Command::new(program);
        command
            .args(&argv)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(program, args = ?argv, stream = opts.stream, "starting process");

        let started_at = Utc::now();
        let clock = Instant::now();
        let capture = capture(command, opts).await;
        let elapsed = chrono::Duration::from_std(clock.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let finished_at = started_at + elapsed;

        let (exit_code, error) = normalize(&capture.outcome);
        let result = RunResult::finished(
            program,
            argv,
            started_at,
            finished_at,
            exit_code,
            String::from_utf8_lossy(&capture.stdout).into_owned(),
            String::from_utf8_lossy(&capture.stderr).into_owned(),
            error,
        );

        if result.is_success() {
            info!(program, duration_ms = result.duration_ms, "process finished");
            Ok(result)
        } else {
            warn!(
                program,
                exit_code = result.exit_code,
                error = result.error.as_deref().unwrap_or_default(),
                "process failed"
            );
            Err(CtError::Execution {
                program: program.to_string(),
                result: Box::new(result),
            })
        }
    }
}

/// Pick the interpreter: explicit option, then environment, then `python3`
pub fn resolve_interpreter(explicit: Option<&str>, env_value: Option<String>) -> String {
    explicit
        .filter(|i| !i.is_empty())
        .map(str::to_string)
        .or_else(|| env_value.filter(|i| !i.is_empty()))
        .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string())
}

/// How a run ended
#[derive(Debug)]
enum Outcome {
    Exited(ExitStatus),
    FailedToStart(io::Error),
    Interrupted(String),
}

struct Capture {
    outcome: Outcome,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn normalize(outcome: &Outcome) -> (i32, Option<String>) {
    match outcome {
        Outcome::Exited(status) if status.success() => (0, None),
        Outcome::Exited(status) => match status.code() {
            Some(code) => (code, Some(format!("exit status {}", code))),
            None => (1, Some(format!("terminated: {}", status))),
        },
        Outcome::FailedToStart(e) => (1, Some(e.to_string())),
        Outcome::Interrupted(reason) => (1, Some(reason.clone())),
    }
}

async fn capture(mut command: Command, opts: &RunOptions) -> Capture {
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Capture {
                outcome: Outcome::FailedToStart(e),
                stdout: Vec::new(),
                stderr: Vec::new(),
            }
        }
    };

    let stdout_buf = OutputBuffer::default();
    let stderr_buf = OutputBuffer::default();
    let stdout = tokio::spawn(tee(
        child.stdout.take(),
        opts.stream.then(tokio::io::stdout),
        stdout_buf.clone(),
    ));
    let stderr = tokio::spawn(tee(
        child.stderr.take(),
        opts.stream.then(tokio::io::stderr),
        stderr_buf.clone(),
    ));

    let outcome = wait_for_exit(&mut child, opts).await;
    let interrupted = matches!(outcome, Outcome::Interrupted(_));

    for mut handle in [stdout, stderr] {
        let joined = if interrupted {
            match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // A grandchild still holds the pipe open
                    debug!("output still open after kill, keeping what was read");
                    handle.abort();
                    continue;
                }
            }
        } else {
            handle.await
        };
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to read process output"),
            Err(e) => warn!(error = %e, "output reader panicked"),
        }
    }

    Capture {
        outcome,
        stdout: stdout_buf.take(),
        stderr: stderr_buf.take(),
    }
}

async fn wait_for_exit(child: &mut Child, opts: &RunOptions) -> Outcome {
    let cancelled = async {
        match &opts.cancel {
            Some(token) => token.cancelled().await,
            None => pending().await,
        }
    };
    let deadline = async {
        match opts.timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => pending().await,
        }
    };

    let reason = tokio::select! {
        status = child.wait() => {
            return match status {
                Ok(status) => Outcome::Exited(status),
                Err(e) => Outcome::FailedToStart(e),
            };
        }
        _ = cancelled => "cancelled".to_string(),
        _ = deadline => format!(
            "timed out after {}s",
            opts.timeout.map(|t| t.as_secs_f64()).unwrap_or_default()
        ),
    };

    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill process");
    }
    Outcome::Interrupted(reason)
}

/// Bytes read from one output stream so far, shared with the reader task
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Take everything captured so far, leaving the buffer empty
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }
}

/// Copy a stream into `sink`, mirroring every chunk to `mirror` when given.
///
/// Each chunk lands in `sink` as soon as it is read, so aborting the task
/// keeps everything read up to that point. A mirror that stops accepting
/// writes is dropped; capture carries on.
pub async fn tee<R, W>(
    reader: Option<R>,
    mut mirror: Option<W>,
    sink: OutputBuffer,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };

    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        sink.push(&chunk[..n]);

        if let Some(out) = mirror.as_mut() {
            let mirrored = match out.write_all(&chunk[..n]).await {
                Ok(()) => out.flush().await,
                Err(e) => Err(e),
            };
            if mirrored.is_err() {
                mirror = None;
            }
        }
    }
    Ok(())
}
