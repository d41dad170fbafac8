//! Process-per-invocation artifacts
//!
//! Every invocation spawns a fresh OS process, so no test case can observe
//! another's state. A [`ProcessGuard`] owns the child for its whole life:
//! whatever path the wait loop takes, the child is killed and reaped. On unix
//! each child leads its own process group, and the whole group is killed so
//! helpers it started in the background cannot outlive the invocation.

use crate::artifact::{Artifact, ExecutionResult, ExecutionStatus, InvocationContext};
use parity_gen::TestCase;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

/// Poll interval of the wait loop
const POLL_INTERVAL: Duration = Duration::from_millis(2);
/// Longest stderr excerpt kept in a result
const STDERR_LIMIT: usize = 4096;

/// RAII guard that kills and reaps its child on drop
pub struct ProcessGuard {
    child: Option<Child>,
    pid: u32,
}

impl ProcessGuard {
    /// Take ownership of a spawned child
    #[must_use]
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Non-blocking exit check
    ///
    /// # Errors
    ///
    /// Returns an error if the process was already consumed or the check fails.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.as_mut().map_or_else(
            || Err(std::io::Error::other("Process already consumed")),
            Child::try_wait,
        )
    }

    /// Kill the child's process group, then kill and reap the child
    ///
    /// The group is signalled even after [`release`](Self::release), which
    /// reaches background processes the exited child left behind.
    pub fn kill(&mut self) {
        kill_process_group(self.pid);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Mutable access to the child, e.g. to take its pipes
    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    /// Mark the child as reaped so drop leaves it alone
    pub fn release(&mut self) {
        self.child = None;
    }

    /// Get the process ID
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            log::warn!("cleaning up child process {}", self.pid);
            kill_process_group(self.pid);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// How a test case's inputs reach the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputMode {
    /// One JSON object line on stdin, keys in declaration order
    #[default]
    StdinJson,
    /// Values as positional arguments after the configured arguments
    Args,
}

/// An external executable run once per invocation
#[derive(Debug, Clone)]
pub struct ProcessArtifact {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
    input_mode: InputMode,
}

impl ProcessArtifact {
    /// Artifact running `program`
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            name: program.display().to_string(),
            program,
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            input_mode: InputMode::default(),
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set fixed arguments passed before any input values
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set how inputs are delivered
    #[must_use]
    pub const fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    fn command(&self, case: &TestCase) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        match self.input_mode {
            InputMode::StdinJson => {
                cmd.stdin(Stdio::piped());
            }
            InputMode::Args => {
                cmd.args(case.inputs.values().map(parity_gen::Value::to_arg))
                    .stdin(Stdio::null());
            }
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    /// Kill everything the invocation started
    ///
    /// Reported as a timeout once the per-invocation budget is spent,
    /// otherwise as cancelled.
    fn abort(
        &self,
        guard: &mut ProcessGuard,
        case: &TestCase,
        ctx: &InvocationContext,
        start: Instant,
    ) -> ExecutionResult {
        guard.kill();
        let elapsed = start.elapsed();
        if elapsed < ctx.timeout {
            return ExecutionResult::failed(
                case.index,
                ExecutionStatus::Cancelled,
                "",
                elapsed.as_millis() as u64,
            );
        }
        log::warn!(
            "case {}: {} timed out after {}ms",
            case.index,
            self.name,
            ctx.timeout.as_millis()
        );
        ExecutionResult::failed(
            case.index,
            ExecutionStatus::Timeout,
            format!("exceeded {}ms", ctx.timeout.as_millis()),
            elapsed.as_millis() as u64,
        )
    }

    fn spawn_failure(&self, case: &TestCase, err: &std::io::Error) -> ExecutionResult {
        ExecutionResult::failed(
            case.index,
            ExecutionStatus::Crashed,
            format!("failed to spawn {}: {err}", self.program.display()),
            0,
        )
    }
}

impl Artifact for ProcessArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, case: &TestCase, ctx: &InvocationContext) -> ExecutionResult {
        if ctx.interrupted() {
            return ExecutionResult::failed(case.index, ExecutionStatus::Cancelled, "", 0);
        }

        let payload = match self.input_mode {
            InputMode::StdinJson => match case.inputs.to_json() {
                Ok(json) => Some(json + "\n"),
                Err(e) => return self.spawn_failure(case, &std::io::Error::other(e.to_string())),
            },
            InputMode::Args => None,
        };

        let start = Instant::now();
        let child = match self.command(case).spawn() {
            Ok(child) => child,
            Err(e) => return self.spawn_failure(case, &e),
        };
        let mut guard = ProcessGuard::new(child);
        log::debug!(
            "case {} started {} (pid {})",
            case.index,
            self.name,
            guard.pid()
        );

        let (stdin, stdout, stderr) = match guard.child_mut() {
            Some(child) => (child.stdin.take(), child.stdout.take(), child.stderr.take()),
            None => (None, None, None),
        };
        if let (Some(mut pipe), Some(payload)) = (stdin, payload) {
            // A child that never reads stdin must not block the wait loop
            std::thread::spawn(move || {
                let _ = pipe.write_all(payload.as_bytes());
            });
        }
        let mut stdout = OutputDrain::new(stdout);
        let mut stderr = OutputDrain::new(stderr);
        let should_stop = || start.elapsed() >= ctx.timeout || ctx.interrupted();

        let status = loop {
            match guard.try_wait() {
                Ok(Some(status)) => {
                    guard.release();
                    break Some(status);
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("case {}: wait on {} failed: {e}", case.index, self.name);
                    guard.kill();
                    break None;
                }
            }
            if should_stop() {
                return self.abort(&mut guard, case, ctx, start);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        // Background processes may still hold the pipes open after the child exits
        while !(stdout.poll() & stderr.poll()) {
            if should_stop() {
                return self.abort(&mut guard, case, ctx, start);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = stdout.into_text();
        let mut stderr = stderr.into_text();
        truncate_utf8(&mut stderr, STDERR_LIMIT);

        let status = match status {
            None => ExecutionStatus::Crashed,
            Some(status) => match status.code() {
                Some(0) => ExecutionStatus::Ok,
                Some(code) => ExecutionStatus::NonZeroExit(code),
                // Terminated by a signal
                None => ExecutionStatus::Crashed,
            },
        };
        log::debug!(
            "case {} finished {} with {status} in {duration_ms}ms",
            case.index,
            self.name
        );

        ExecutionResult {
            index: case.index,
            status,
            stdout,
            stderr,
            duration_ms,
        }
    }
}

/// Pipe contents collected on a reader thread
struct OutputDrain {
    rx: Option<Receiver<String>>,
    text: String,
}

impl OutputDrain {
    fn new<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let rx = pipe.map(|mut pipe| {
            let (tx, rx) = mpsc::channel();
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            });
            rx
        });
        Self {
            rx,
            text: String::new(),
        }
    }

    /// Whether the pipe has reached end of file
    fn poll(&mut self) -> bool {
        let Some(rx) = &self.rx else {
            return true;
        };
        match rx.try_recv() {
            Ok(text) => {
                self.text = text;
                self.rx = None;
                true
            }
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    fn into_text(self) -> String {
        self.text
    }
}

/// SIGKILL every process in the group led by `pgid`
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let _ = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pgid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

fn truncate_utf8(text: &mut String, limit: usize) {
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
}
