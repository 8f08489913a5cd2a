//! Host process backend
//!
//! Runs the execution target through a shell in a private working directory
//! with a cleared environment. Resource limits are applied through `rlimit`
//! in the child when the `resource-limits` feature is enabled.
//!
//! Each child leads its own process group. The whole group is killed once the
//! shell exits or the timeout fires, so nothing the target started outlives
//! the sandbox.
//!
//! This is process-level isolation only. The child shares the host kernel,
//! network namespace and filesystem permissions of the gateway user.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

use super::{ExecutionOutput, Sandbox, SandboxBackend, SandboxLimits, SandboxResource};
use crate::config::SandboxConfig;
use crate::types::{ExecutionRequest, SandboxError, SandboxProfile};

/// Executor name whose `parameters.args` are passed as positional arguments.
pub const ARGS_EXECUTOR: &str = "execution";

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
const RESTRICTED_PATH: &str = "/usr/bin:/bin";
const RESTRICTED_USER: &str = "nobody";

/// How long output is still read after the shell exits.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Backend that runs each sandbox as a host child process.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    config: SandboxConfig,
}

impl ProcessBackend {
    pub fn new(config: SandboxConfig) -> Self {
        if config.enforce_resource_limits && !cfg!(all(unix, feature = "resource-limits")) {
            tracing::warn!(
                "enforce_resource_limits is set but this build has no rlimit support; limits will not be applied"
            );
        }
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

#[async_trait]
impl SandboxBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn create(
        &self,
        sandbox: &Sandbox,
        request: &ExecutionRequest,
        limits: &SandboxLimits,
    ) -> Result<Box<dyn SandboxResource>, SandboxError> {
        if !sandbox.profile.is_admissible() {
            return Err(SandboxError::CreationFailed(format!(
                "profile {} is not supported by the process backend",
                sandbox.profile
            )));
        }

        let work_dir = self.config.work_root.join(sandbox.id.to_string());
        tokio::fs::create_dir_all(&work_dir).await.map_err(|e| {
            SandboxError::CreationFailed(format!(
                "cannot create working directory {}: {}",
                work_dir.display(),
                e
            ))
        })?;

        let spec = &request.execution_spec;
        let args = if spec.executor == ARGS_EXECUTOR {
            spec.string_args()
        } else {
            Vec::new()
        };

        Ok(Box::new(ProcessSandbox {
            shell: self.config.shell.clone(),
            target: spec.target.clone(),
            args,
            profile: sandbox.profile,
            work_dir,
            limits: *limits,
            max_output_bytes: self.config.max_output_bytes,
            enforce_resource_limits: self.config.enforce_resource_limits,
            output_files: request.artifacts.output_files.clone(),
            process_group: None,
            torn_down: false,
        }))
    }
}

/// One prepared child process and its working directory.
#[derive(Debug)]
struct ProcessSandbox {
    shell: PathBuf,
    target: String,
    args: Vec<String>,
    profile: SandboxProfile,
    work_dir: PathBuf,
    limits: SandboxLimits,
    max_output_bytes: usize,
    enforce_resource_limits: bool,
    output_files: Vec<String>,
    /// Group id of a child that may still have live members.
    process_group: Option<u32>,
    torn_down: bool,
}

impl ProcessSandbox {
    fn build_command(&self) -> Command {
        // sh -c <target> arg0 arg1 ... ; the first arg lands in $0
        let mut command = Command::new(&self.shell);
        command.arg("-c").arg(&self.target).args(&self.args);

        command.env_clear();
        command.env("HOME", &self.work_dir);
        match self.profile {
            SandboxProfile::Restricted => {
                command.env("PATH", RESTRICTED_PATH);
                command.env("USER", RESTRICTED_USER);
            }
            _ => {
                command.env("PATH", DEFAULT_PATH);
            }
        }

        command.current_dir(&self.work_dir);
        #[cfg(unix)]
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        command
    }

    #[cfg(all(unix, feature = "resource-limits"))]
    fn apply_resource_limits(&self, command: &mut Command) {
        if !self.enforce_resource_limits {
            return;
        }

        let memory_bytes = self.limits.memory.bytes();
        let cpu_seconds = self.limits.timeout.as_secs_f64().ceil().max(1.0) as u64;

        // SAFETY: pre_exec runs between fork() and exec() in the child;
        // setrlimit is async-signal-safe.
        unsafe {
            command.pre_exec(move || {
                rlimit::setrlimit(rlimit::Resource::AS, memory_bytes, memory_bytes).map_err(|e| {
                    std::io::Error::other(format!("Failed to set RLIMIT_AS: {}", e))
                })?;
                rlimit::setrlimit(rlimit::Resource::CPU, cpu_seconds, cpu_seconds).map_err(
                    |e| std::io::Error::other(format!("Failed to set RLIMIT_CPU: {}", e)),
                )?;
                Ok(())
            });
        }
    }

    #[cfg(not(all(unix, feature = "resource-limits")))]
    fn apply_resource_limits(&self, _command: &mut Command) {
        if self.enforce_resource_limits {
            tracing::debug!(
                cpu = %self.limits.cpu,
                memory = %self.limits.memory,
                "Resource limits requested but not enforced in this build"
            );
        }
    }

    /// Requested output files that exist in the working directory. Absolute
    /// paths and paths with `..` are ignored.
    async fn collect_artifacts(&self) -> Vec<String> {
        let mut found = Vec::new();
        for name in &self.output_files {
            let path = Path::new(name);
            let contained = !name.is_empty()
                && path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
            if !contained {
                tracing::debug!(file = %name, "Ignoring output file outside the sandbox");
                continue;
            }
            if tokio::fs::try_exists(self.work_dir.join(path))
                .await
                .unwrap_or(false)
            {
                found.push(name.clone());
            }
        }
        found
    }
}

/// Output read from one child stream.
#[derive(Debug, Default)]
struct CapturedStream {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CapturedStream {
    fn into_text(self, max_bytes: usize) -> (String, bool) {
        let output = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            (
                format!("{}\n... [output truncated at {} bytes]", output, max_bytes),
                true,
            )
        } else {
            (output, false)
        }
    }
}

/// Read a child stream into `captured`, keeping at most `max_bytes`. The rest
/// is drained so the child never blocks on a full pipe. Whatever was read
/// stays in `captured` if the future is dropped early.
async fn read_limited_output<R: AsyncRead + Unpin>(
    reader: Option<&mut R>,
    captured: &mut CapturedStream,
    max_bytes: usize,
) {
    let Some(reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = max_bytes.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                tracing::debug!("Error reading child output: {}", e);
                break;
            }
        }
    }
}

/// SIGKILL every process in the group led by `pgid`.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; a group that is already gone
    // yields ESRCH, which is ignored.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

#[async_trait]
impl SandboxResource for ProcessSandbox {
    async fn execute(&mut self) -> Result<ExecutionOutput, SandboxError> {
        let mut command = self.build_command();
        self.apply_resource_limits(&mut command);

        let start = std::time::Instant::now();
        let max_output = self.max_output_bytes;

        let mut child = command.spawn().map_err(|e| SandboxError::SpawnFailed {
            program: self.shell.display().to_string(),
            reason: e.to_string(),
        })?;
        // Taken now: `id()` returns None once the child is reaped.
        let pgid = child.id();
        self.process_group = pgid;

        let mut child_stdout = child.stdout.take();
        let mut child_stderr = child.stderr.take();
        let mut stdout = CapturedStream::default();
        let mut stderr = CapturedStream::default();

        let run_result = timeout(self.limits.timeout, async {
            let readers = async {
                tokio::join!(
                    read_limited_output(child_stdout.as_mut(), &mut stdout, max_output),
                    read_limited_output(child_stderr.as_mut(), &mut stderr, max_output),
                )
            };
            tokio::pin!(readers);

            // Readers first: a completed `readers` must never be polled again.
            let exited = tokio::select! {
                biased;
                _ = &mut readers => None,
                status = child.wait() => Some(status),
            };
            match exited {
                Some(status) => {
                    // Background children may still hold the pipes open.
                    if let Some(pgid) = pgid {
                        kill_process_group(pgid);
                    }
                    let _ = timeout(PIPE_DRAIN_GRACE, &mut readers).await;
                    status
                }
                None => child.wait().await,
            }
        })
        .await;

        let execution_time = start.elapsed();

        let status = match run_result {
            Ok(status) => status,
            Err(_) => {
                if let Some(pgid) = pgid {
                    kill_process_group(pgid);
                }
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill timed out process: {}", e);
                }
                self.process_group = None;
                tracing::warn!("Execution timed out after {:?}", self.limits.timeout);
                return Err(SandboxError::Timeout(self.limits.timeout));
            }
        };

        if let Some(pgid) = self.process_group.take() {
            kill_process_group(pgid);
        }
        let status = status.map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;

        // Killed by a signal: no exit code.
        let exit_code = status.code().unwrap_or(-1);
        let (stdout, stdout_truncated) = stdout.into_text(max_output);
        let (stderr, stderr_truncated) = stderr.into_text(max_output);
        if stdout_truncated || stderr_truncated {
            tracing::warn!(
                stdout_truncated,
                stderr_truncated,
                "Output truncated at {} bytes",
                max_output
            );
        }
        tracing::debug!(
            exit_code,
            duration_ms = execution_time.as_millis() as u64,
            "Process finished"
        );

        Ok(ExecutionOutput {
            exit_code,
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            artifacts: self.collect_artifacts().await,
            execution_time_ms: execution_time.as_millis() as u64,
        })
    }

    async fn destroy(&mut self) -> Result<(), SandboxError> {
        if let Some(pgid) = self.process_group.take() {
            kill_process_group(pgid);
        }
        match tokio::fs::remove_dir_all(&self.work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SandboxError::TeardownFailed(format!(
                    "cannot remove {}: {}",
                    self.work_dir.display(),
                    e
                )))
            }
        }
        self.torn_down = true;
        Ok(())
    }
}

impl Drop for ProcessSandbox {
    /// Teardown for a sandbox whose owner was dropped before `destroy` ran,
    /// e.g. a cancelled request future.
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if let Some(pgid) = self.process_group.take() {
            kill_process_group(pgid);
        }
        match std::fs::remove_dir_all(&self.work_dir) {
            Ok(()) => tracing::debug!(
                work_dir = %self.work_dir.display(),
                "Sandbox removed on drop"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                work_dir = %self.work_dir.display(),
                "Failed to remove sandbox on drop: {}",
                e
            ),
        }
    }
}
