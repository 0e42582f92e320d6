//! Subprocess Executor
//!
//! Spawns a tokenized command as a subprocess under a deadline, captures
//! bounded output, and classifies the outcome. The executor never consults
//! a shell: the argument vector from the tokenizer is handed straight to
//! the operating system.
//!
//! A non-zero exit status is not an executor failure. The subprocess ran;
//! interpreting its exit code belongs to the caller. The one exception is
//! an exit whose error stream carries a credential-expiry signature, which
//! is surfaced as [`ErrorKind::AuthFailed`] so the client can re-authenticate
//! and retry.

use super::error::{ErrorKind, GatewayError};
use super::tokenizer::tokenize;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Default per-call execution deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Hard ceiling on any per-call timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// Default cap on captured output (10 MiB).
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

/// Environment variables passed through to the subprocess by default.
/// Everything else from the ambient environment is withheld.
const DEFAULT_ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "AZURE_CONFIG_DIR",
    "AZURE_CLOUD_NAME",
    "MSI_ENDPOINT",
    "IDENTITY_ENDPOINT",
    "IDENTITY_HEADER",
    "REQUESTS_CA_BUNDLE",
    "http_proxy",
    "https_proxy",
    "no_proxy",
];

/// Error-stream signatures indicating expired or missing credentials.
///
/// Matching is case-insensitive and best-effort: a miss means no retry is
/// attempted, a spurious hit triggers one extra re-authentication, which is
/// idempotent and therefore safe.
const AUTH_FAILURE_SIGNATURES: &[&str] = &[
    "aadsts700082", // refresh token expired due to inactivity
    "aadsts70043",  // refresh token expired or revoked
    "aadsts50173",  // token invalid, fresh sign-in required
    "az login",
    "re-authenticate",
    "interactive authentication is needed",
    "token has expired",
    "refresh token is expired",
];

/// Configuration for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline applied when the caller does not supply one.
    pub timeout: Duration,

    /// Working directory for the subprocess; `None` uses the process's own.
    pub working_dir: Option<PathBuf>,

    /// Cap on captured standard output, in bytes.
    pub max_output_size: usize,

    /// Names of environment variables copied from the ambient environment
    /// into the subprocess. `None` inherits the full environment; that is
    /// an explicit opt-in, never the default.
    pub allowed_env_vars: Option<Vec<String>>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            working_dir: None,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            allowed_env_vars: Some(
                DEFAULT_ALLOWED_ENV_VARS
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
            ),
        }
    }
}

/// Outcome of one completed subprocess execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Raw standard output, passed through un-reinterpreted. The literal
    /// string `null` when the subprocess produced no output, so consumers
    /// never confuse "no output" with a parse failure.
    pub output: String,

    /// Subprocess exit code. Interpreting it is the caller's job.
    pub exit_code: i32,

    /// Captured standard error text.
    pub error: String,

    /// Wall-clock duration from spawn to completion.
    pub duration: Duration,
}

/// Seam between the client and the subprocess engine, so tests can
/// substitute a scripted executor.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `command` with an optional per-call timeout.
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, GatewayError>;
}

/// The real executor backed by `tokio::process`.
///
/// Constructed once at startup and shared read-only across concurrent
/// calls; each call spawns its own independent subprocess.
#[derive(Debug, Clone)]
pub struct AzExecutor {
    config: ExecutorConfig,
}

impl AzExecutor {
    /// Create an executor, normalizing zero values to their defaults.
    pub fn new(mut config: ExecutorConfig) -> Self {
        if config.timeout.is_zero() {
            config.timeout = DEFAULT_TIMEOUT;
        }
        if config.max_output_size == 0 {
            config.max_output_size = DEFAULT_MAX_OUTPUT_SIZE;
        }
        Self { config }
    }

    /// Deadline for one call: the caller's timeout when supplied, otherwise
    /// the configured default, clamped to the hard ceiling either way.
    fn effective_timeout(&self, per_call: Option<Duration>) -> Duration {
        per_call.unwrap_or(self.config.timeout).min(MAX_TIMEOUT)
    }

    fn build_command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        if let Some(allowed) = &self.config.allowed_env_vars {
            cmd.env_clear();
            for name in allowed {
                if let Ok(value) = std::env::var(name) {
                    cmd.env(name, value);
                }
            }
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // The child must never outlive a cancelled call.
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl CommandExecutor for AzExecutor {
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, GatewayError> {
        let start = Instant::now();

        let args = tokenize(command)
            .map_err(|err| GatewayError::new(ErrorKind::InvalidCommand, err.to_string(), command))?;

        let deadline = self.effective_timeout(timeout);
        let program = args[0].clone();
        debug!(%program, args = args.len() - 1, ?deadline, "spawning subprocess");

        let mut child = self.build_command(&args).spawn().map_err(|err| {
            GatewayError::new(
                ErrorKind::ExecutionFailed,
                format!("failed to spawn {}: {}", args[0], err),
                command,
            )
        })?;

        let cap = self.config.max_output_size;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let capture = async {
            let (stdout_res, stderr_res, status_res) = tokio::join!(
                read_capped(stdout_pipe, cap),
                read_capped(stderr_pipe, cap),
                child.wait(),
            );
            let stdout = stdout_res?;
            let stderr = stderr_res?;
            let status = status_res?;
            Ok::<_, std::io::Error>((stdout, stderr, status))
        };

        // The capture future borrows the child mutably; it must be dropped
        // before the kill paths below can touch the child again.
        let captured = tokio::time::timeout(deadline, capture).await;
        let (stdout, stderr, status) = match captured {
            Ok(Ok(captured)) => captured,
            Ok(Err(err)) => {
                kill_process_group(&mut child).await;
                return Err(GatewayError::new(
                    ErrorKind::ExecutionFailed,
                    format!("failed to capture output: {}", err),
                    command,
                ));
            }
            Err(_) => {
                warn!(?deadline, "command execution timed out, killing subprocess");
                kill_process_group(&mut child).await;
                return Err(GatewayError::new(
                    ErrorKind::Timeout,
                    "command execution timed out",
                    command,
                )
                .with_context("timeout_secs", deadline.as_secs()));
            }
        };

        let duration = start.elapsed();

        if stdout.overflowed {
            return Err(GatewayError::new(
                ErrorKind::ExecutionFailed,
                "output size exceeds limit",
                command,
            )
            .with_context("limit_bytes", cap as u64));
        }

        // Signal-terminated processes carry no exit code.
        let exit_code = status.code().unwrap_or(-1);
        let stderr_text = String::from_utf8_lossy(&stderr.bytes).into_owned();

        if exit_code != 0 && is_auth_failure(&stderr_text) {
            warn!("credential-expiry signature detected in command error stream");
            return Err(GatewayError::new(
                ErrorKind::AuthFailed,
                "azure authentication expired or missing",
                command,
            )
            .with_context("exit_code", exit_code));
        }

        let output = if stdout.bytes.is_empty() {
            "null".to_string()
        } else {
            String::from_utf8_lossy(&stdout.bytes).into_owned()
        };

        debug!(exit_code, ?duration, "subprocess completed");

        Ok(ExecutionResult {
            output,
            exit_code,
            error: stderr_text,
            duration,
        })
    }
}

struct CappedBuffer {
    bytes: Vec<u8>,
    overflowed: bool,
}

/// Read a stream to completion, keeping at most `cap` bytes and recording
/// whether the stream had more to give. The stream is always drained so the
/// subprocess never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<CappedBuffer>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(CappedBuffer { bytes: Vec::new(), overflowed: false });
    };

    let mut bytes = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut overflowed = false;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if !overflowed {
            let room = cap - bytes.len();
            if n > room {
                bytes.extend_from_slice(&chunk[..room]);
                overflowed = true;
            } else {
                bytes.extend_from_slice(&chunk[..n]);
            }
        }
    }

    Ok(CappedBuffer { bytes, overflowed })
}

/// Kill the subprocess and, on Unix, its whole process group so no
/// descendants are left running.
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child was spawned as its own process-group leader.
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
    }

    if let Err(err) = child.kill().await {
        warn!("failed to kill subprocess: {}", err);
    }
}

/// Scan captured error-stream text for credential-expiry signatures.
pub(crate) fn is_auth_failure(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    AUTH_FAILURE_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}
