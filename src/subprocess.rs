//! Managed process runner (exec-style, no shell).
//!
//! Spawns a tool directly, feeds its stdin, drains stdout/stderr on reader
//! threads, enforces a deadline and an optional cancellation token, and
//! settles exactly one [`RunOutcome`]. Every exit path reaps the child and
//! joins the helper threads before returning. Processes the child leaves
//! behind holding its output pipes are killed once the deadline passes, so
//! the deadline bounds the whole call and not just the direct child.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{self, ExitMessagePolicy};
use crate::error::ToolError;
use crate::hints::{HintRules, SpawnFailure};

/// Upper bound on bytes kept from each of stdout / stderr (10 MiB). Output
/// past the cap is drained and discarded so the child never blocks on a
/// full pipe.
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Polling interval while waiting on the child.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long a terminated process group gets to exit before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// One tool invocation. Built with the `with_*` methods, then only read.
#[derive(Debug, Clone)]
pub struct RunRequest {
    tool: String,
    program: PathBuf,
    args: Vec<OsString>,
    cwd: PathBuf,
    input: Option<String>,
    timeout: Duration,
    timeout_hint: Option<String>,
    hints: HintRules,
    exit_policy: ExitMessagePolicy,
    cancel: Option<CancellationToken>,
    redact_args: bool,
}

impl RunRequest {
    pub fn new(
        tool: impl Into<String>,
        program: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        RunRequest {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            input: None,
            timeout,
            timeout_hint: None,
            hints: HintRules::default(),
            exit_policy: ExitMessagePolicy::default(),
            cancel: None,
            redact_args: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_timeout_hint(mut self, hint: Option<String>) -> Self {
        self.timeout_hint = hint;
        self
    }

    pub fn with_hints(mut self, hints: HintRules) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_exit_policy(mut self, policy: ExitMessagePolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    pub fn with_cancel(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Keep argv out of debug logs (prompts travel as arguments).
    pub fn with_redacted_args(mut self) -> Self {
        self.redact_args = true;
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// The single, final result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success { output: String },
    Failure(ToolError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn into_result(self) -> Result<String, ToolError> {
        match self {
            RunOutcome::Success { output } => Ok(output),
            RunOutcome::Failure(err) => Err(err),
        }
    }
}

impl From<ToolError> for RunOutcome {
    fn from(err: ToolError) -> Self {
        RunOutcome::Failure(err)
    }
}

/// First-wins outcome slot. Later settlements are ignored.
#[derive(Debug, Default)]
struct Settlement {
    outcome: Option<RunOutcome>,
}

impl Settlement {
    fn settle(&mut self, outcome: RunOutcome) -> bool {
        if self.outcome.is_some() {
            debug!(?outcome, "ignoring late settlement");
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    fn into_outcome(self) -> Option<RunOutcome> {
        self.outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Deadline,
    Cancelled,
}

#[derive(Debug)]
enum Waited {
    Exited(ExitStatus),
    /// Forced stop; `reaped` is whatever exit status the killed child reported.
    Stopped {
        reason: StopReason,
        reaped: Option<ExitStatus>,
    },
    WaitFailed(io::Error),
}

/// Run the request to completion and return its outcome.
pub fn run(request: &RunRequest) -> RunOutcome {
    let started = Instant::now();
    info!(
        tool = %request.tool,
        program = %request.program.display(),
        cwd = %request.cwd.display(),
        arg_count = request.args.len(),
        input_len = request.input.as_ref().map_or(0, String::len),
        timeout_ms = request.timeout.as_millis() as u64,
        "spawning tool"
    );
    if !request.redact_args {
        debug!(tool = %request.tool, args = ?request.args, "tool argv");
    }

    // Superseded while queued: nothing to start.
    if request.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
        return stop_outcome(request, StopReason::Cancelled);
    }

    let mut command = Command::new(&request.program);
    command
        .args(&request.args)
        .current_dir(&request.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group, so wrapper scripts and the JVMs they start are
        // signalled together.
        command.process_group(0);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return spawn_error(request, &e),
    };

    let stdin_handle = child
        .stdin
        .take()
        .and_then(|stdin| feed_stdin(stdin, request.input.clone()));
    let stdout_handle = child
        .stdout
        .take()
        .map(|out| thread::spawn(move || read_bounded(out)));
    let stderr_handle = child
        .stderr
        .take()
        .map(|err| thread::spawn(move || read_bounded(err)));

    let deadline = started + request.timeout;
    let waited = wait_for_exit(&mut child, deadline, request.cancel.as_ref());
    let abandoned = match waited {
        Waited::Exited(_) => wait_for_streams(
            child.id(),
            [&stdout_handle, &stderr_handle],
            deadline,
            request.cancel.as_ref(),
        ),
        _ => None,
    };

    if let Some(handle) = stdin_handle {
        if handle.join().is_err() {
            warn!(tool = %request.tool, "stdin writer thread panicked");
        }
    }
    let stdout = join_reader(stdout_handle, &request.tool, "stdout");
    let stderr = join_reader(stderr_handle, &request.tool, "stderr");

    let mut settlement = Settlement::default();
    match waited {
        Waited::Exited(status) => {
            if let Some(reason) = abandoned {
                settlement.settle(stop_outcome(request, reason));
            }
            settlement.settle(exit_outcome(request, status, &stdout, &stderr));
        }
        Waited::Stopped { reason, reaped } => {
            settlement.settle(stop_outcome(request, reason));
            // The killed child's own exit arrives second and must not win.
            if let Some(status) = reaped {
                settlement.settle(exit_outcome(request, status, &stdout, &stderr));
            }
        }
        Waited::WaitFailed(e) => {
            settlement.settle(spawn_error(request, &e));
        }
    }

    let outcome = settlement
        .into_outcome()
        .unwrap_or_else(|| RunOutcome::Failure(internal_error(request)));

    let duration_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        RunOutcome::Success { output } => info!(
            tool = %request.tool,
            duration_ms,
            output_len = output.len(),
            "tool finished"
        ),
        RunOutcome::Failure(err) => warn!(
            tool = %request.tool,
            duration_ms,
            kind = err.kind(),
            err = %err,
            stderr_len = stderr.len(),
            "tool failed"
        ),
    }
    outcome
}

fn exit_outcome(request: &RunRequest, status: ExitStatus, stdout: &str, stderr: &str) -> RunOutcome {
    if status.success() {
        return RunOutcome::Success {
            output: stdout.trim().to_owned(),
        };
    }
    let exit_code = status.code();
    RunOutcome::Failure(ToolError::NonZeroExit {
        message: classify::nonzero_exit_message(
            &request.exit_policy,
            &request.tool,
            stderr,
            exit_code,
        ),
        exit_code,
    })
}

fn stop_outcome(request: &RunRequest, reason: StopReason) -> RunOutcome {
    let err = match reason {
        StopReason::Deadline => ToolError::TimedOut {
            tool: request.tool.clone(),
            timeout_ms: request.timeout.as_millis() as u64,
            hint: request.timeout_hint.clone(),
        },
        StopReason::Cancelled => ToolError::Cancelled {
            tool: request.tool.clone(),
        },
    };
    RunOutcome::Failure(err)
}

fn spawn_error(request: &RunRequest, err: &io::Error) -> RunOutcome {
    let failure = SpawnFailure::from_io(err);
    let hint = request.hints.lookup(&failure).map(str::to_owned);
    warn!(
        tool = %request.tool,
        program = %request.program.display(),
        code = failure.code.unwrap_or("-"),
        err = %failure.message,
        "failed to spawn tool"
    );
    RunOutcome::Failure(ToolError::SpawnError {
        message: failure.message,
        hint,
    })
}

fn internal_error(request: &RunRequest) -> ToolError {
    ToolError::SpawnError {
        message: format!("{} invocation ended without an outcome", request.tool),
        hint: None,
    }
}

/// Write `input` on its own thread and close stdin afterwards. Without
/// input, stdin is closed right away so the tool sees end-of-input.
fn feed_stdin(mut stdin: ChildStdin, input: Option<String>) -> Option<JoinHandle<()>> {
    let input = input?;
    Some(thread::spawn(move || {
        if let Err(e) = stdin.write_all(input.as_bytes()) {
            debug!(err = %e, "stdin write stopped early");
        }
        drop(stdin);
    }))
}

fn stop_reason(deadline: Instant, cancel: Option<&CancellationToken>) -> Option<StopReason> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        Some(StopReason::Cancelled)
    } else if Instant::now() >= deadline {
        Some(StopReason::Deadline)
    } else {
        None
    }
}

/// Poll the child until it exits, the deadline passes, or the token fires.
fn wait_for_exit(child: &mut Child, deadline: Instant, cancel: Option<&CancellationToken>) -> Waited {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Waited::Exited(status),
            Ok(None) => {}
            Err(e) => {
                terminate(child);
                return Waited::WaitFailed(e);
            }
        }

        if let Some(reason) = stop_reason(deadline, cancel) {
            let reaped = terminate(child);
            return Waited::Stopped { reason, reaped };
        }

        thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

/// The direct child has been reaped; wait for its output pipes to close.
/// Anything it left behind still holding them is killed when the deadline
/// passes or the token fires, and the reason is returned.
fn wait_for_streams(
    pgid: u32,
    readers: [&Option<JoinHandle<io::Result<String>>>; 2],
    deadline: Instant,
    cancel: Option<&CancellationToken>,
) -> Option<StopReason> {
    loop {
        if readers
            .iter()
            .all(|reader| reader.as_ref().is_none_or(JoinHandle::is_finished))
        {
            return None;
        }
        if let Some(reason) = stop_reason(deadline, cancel) {
            warn!(pid = pgid, ?reason, "tool left processes holding its output; killing them");
            kill_group(pgid);
            return Some(reason);
        }
        thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

/// SIGTERM the child's process group once, give it [`TERM_GRACE`] to go
/// away, then SIGKILL whatever is left. Always reaps the child.
#[cfg(unix)]
fn terminate(child: &mut Child) -> Option<ExitStatus> {
    let pgid = child.id() as libc::pid_t;
    debug!(pid = pgid, "sending SIGTERM to tool process group");
    signal_group(pgid, libc::SIGTERM);

    let grace_deadline = Instant::now() + TERM_GRACE;
    let mut reaped = None;
    loop {
        if reaped.is_none() {
            reaped = child.try_wait().ok().flatten();
        }
        if reaped.is_some() && !signal_group(pgid, 0) {
            return reaped;
        }
        if Instant::now() >= grace_deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    warn!(pid = pgid, "tool ignored SIGTERM; sending SIGKILL");
    signal_group(pgid, libc::SIGKILL);
    match reaped {
        Some(status) => Some(status),
        None => child.wait().ok(),
    }
}

#[cfg(unix)]
fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> bool {
    // SAFETY: kill(2) takes no pointers; a negative pid targets the process
    // group created for this child by `process_group(0)`.
    unsafe { libc::kill(-pgid, signal) == 0 }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    signal_group(pgid as libc::pid_t, libc::SIGKILL);
}

// Without process groups the leftovers cannot be reached; the readers end
// when they exit on their own.
#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Option<ExitStatus> {
    let _ = child.kill();
    child.wait().ok()
}

/// Read up to [`MAX_OUTPUT_BYTES`] from `reader` as (lossy) UTF-8, then
/// drain the rest.
fn read_bounded(mut reader: impl Read) -> io::Result<String> {
    let mut buf = Vec::new();
    (&mut reader).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf)?;
    io::copy(&mut reader, &mut io::sink())?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn join_reader(
    handle: Option<JoinHandle<io::Result<String>>>,
    tool: &str,
    stream: &'static str,
) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    match handle.join() {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(tool, stream, err = %e, "failed to read tool output");
            String::new()
        }
        Err(_) => {
            warn!(tool, stream, "reader thread panicked");
            String::new()
        }
    }
}
