//! Gateway Client
//!
//! Composes the validator and the executor, and wraps execution with the
//! one-shot authentication retry. Per call the sequence is strict and never
//! reordered: validate, execute, classify, optionally re-authenticate, and
//! execute at most once more.

use super::auth::AuthSetup;
use super::error::{ErrorKind, GatewayError};
use super::executor::{AzExecutor, CommandExecutor, ExecutionResult, ExecutorConfig};
use super::validator::{CommandValidator, ValidatorConfig};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Configuration for building an [`AzClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Only commands matching a read-only pattern are allowed.
    pub read_only_mode: bool,

    /// Enforce the deny list from the security policy.
    pub enable_security_policy: bool,

    /// Default per-call execution deadline.
    pub timeout: Duration,

    /// Working directory for spawned subprocesses.
    pub working_dir: Option<PathBuf>,

    /// Security policy document path; `None` uses the embedded default.
    pub security_policy_file: Option<PathBuf>,

    /// Read-only pattern document path; `None` uses the embedded default.
    pub read_only_patterns_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_only_mode: true,
            enable_security_policy: false,
            timeout: super::executor::DEFAULT_TIMEOUT,
            working_dir: None,
            security_policy_file: None,
            read_only_patterns_file: None,
        }
    }
}

/// The command gateway: validation, execution, and the one-shot
/// authentication retry behind a single entry point.
///
/// Constructed once at startup; immutable afterwards and safe to share
/// across concurrent calls.
pub struct AzClient {
    validator: CommandValidator,
    executor: Arc<dyn CommandExecutor>,
    auth_setup: Option<Arc<dyn AuthSetup>>,
}

impl AzClient {
    /// Build a client from configuration, with no re-authentication
    /// capability. Add one with [`AzClient::with_auth_setup`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let validator = CommandValidator::new(ValidatorConfig {
            read_only_mode: config.read_only_mode,
            enable_security_policy: config.enable_security_policy,
            security_policy_file: config.security_policy_file,
            read_only_patterns_file: config.read_only_patterns_file,
        })?;

        let executor = AzExecutor::new(ExecutorConfig {
            timeout: config.timeout,
            working_dir: config.working_dir,
            ..Default::default()
        });

        Ok(Self {
            validator,
            executor: Arc::new(executor),
            auth_setup: None,
        })
    }

    /// Inject the re-authentication capability. Without it, authentication
    /// failures are returned to the caller unchanged; there is no silent
    /// retry without an explicit capability.
    pub fn with_auth_setup(mut self, auth_setup: Arc<dyn AuthSetup>) -> Self {
        self.auth_setup = Some(auth_setup);
        self
    }

    /// Substitute the executor. Intended for embedding and tests; the
    /// default executor built by [`AzClient::new`] is the real subprocess
    /// engine.
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Validate a command without executing it.
    pub fn validate_command(&self, command: &str) -> Result<(), GatewayError> {
        self.validator.validate(command)
    }

    /// Validate and execute a command, retrying once after re-authentication
    /// when the failure looks like expired credentials.
    ///
    /// Azure CLI tokens expire during long-running server sessions. When the
    /// executor classifies a failure as [`ErrorKind::AuthFailed`] and a
    /// re-authentication capability is configured, credentials are
    /// re-established and the identical command is executed a second time.
    /// One retry, ever: whatever the second attempt returns is terminal. A
    /// failed re-authentication yields the original execution error, since
    /// that is what the caller asked about.
    pub async fn execute_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, GatewayError> {
        self.validator.validate(command)?;

        match self.executor.execute(command, timeout).await {
            Ok(result) => Ok(result),
            Err(err) if err.kind == ErrorKind::AuthFailed => {
                let Some(auth_setup) = &self.auth_setup else {
                    return Err(err);
                };

                info!("authentication failure detected, attempting to re-authenticate");
                if let Err(auth_err) = auth_setup.setup().await {
                    error!("re-authentication failed: {:#}", auth_err);
                    return Err(err);
                }

                info!("re-authentication succeeded, retrying command");
                self.executor.execute(command, timeout).await
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted executor: fails with the given kind for the first
    /// `failures` calls, then succeeds.
    struct ScriptedExecutor {
        calls: AtomicUsize,
        failures: usize,
        kind: ErrorKind,
    }

    impl ScriptedExecutor {
        fn failing(kind: ErrorKind, failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                kind,
            }
        }

        fn succeeding() -> Self {
            Self::failing(ErrorKind::ExecutionFailed, 0)
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            command: &str,
            _timeout: Option<Duration>,
        ) -> Result<ExecutionResult, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(GatewayError::new(self.kind, "scripted failure", command));
            }
            Ok(ExecutionResult {
                output: r#"{"status":"ok"}"#.to_string(),
                exit_code: 0,
                error: String::new(),
                duration: Duration::from_millis(10),
            })
        }
    }

    struct CountingAuthSetup {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingAuthSetup {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthSetup for CountingAuthSetup {
        async fn setup(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("re-authentication failed");
            }
            Ok(())
        }
    }

    /// Client with validation effectively open (basic screen only) and a
    /// scripted executor.
    fn client_with(
        executor: Arc<ScriptedExecutor>,
        auth: Option<Arc<CountingAuthSetup>>,
    ) -> AzClient {
        let mut client = AzClient::new(ClientConfig {
            read_only_mode: false,
            ..Default::default()
        })
        .unwrap()
        .with_executor(executor);

        if let Some(auth) = auth {
            client = client.with_auth_setup(auth);
        }
        client
    }

    #[tokio::test]
    async fn test_success_executes_once() {
        let executor = Arc::new(ScriptedExecutor::succeeding());
        let client = client_with(Arc::clone(&executor), None);

        let result = client.execute_command("az vm list", None).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_never_spawns() {
        let executor = Arc::new(ScriptedExecutor::succeeding());
        let client = client_with(Arc::clone(&executor), None);

        let err = client.execute_command("ls -la", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCommand);
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_retries_exactly_once() {
        let executor = Arc::new(ScriptedExecutor::failing(ErrorKind::AuthFailed, 1));
        let auth = Arc::new(CountingAuthSetup::new());
        let client = client_with(Arc::clone(&executor), Some(Arc::clone(&auth)));

        let result = client.execute_command("az vm list", None).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(executor.call_count(), 2);
        assert_eq!(auth.call_count(), 1);
    }

    #[tokio::test]
    async fn test_persistent_auth_failure_stops_after_one_retry() {
        // Executor always reports an auth failure: one re-auth, one retry,
        // then terminal. Never a loop.
        let executor = Arc::new(ScriptedExecutor::failing(ErrorKind::AuthFailed, usize::MAX));
        let auth = Arc::new(CountingAuthSetup::new());
        let client = client_with(Arc::clone(&executor), Some(Arc::clone(&auth)));

        let err = client.execute_command("az vm list", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailed);
        assert_eq!(executor.call_count(), 2);
        assert_eq!(auth.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_without_auth_capability() {
        let executor = Arc::new(ScriptedExecutor::failing(ErrorKind::AuthFailed, usize::MAX));
        let client = client_with(Arc::clone(&executor), None);

        let err = client.execute_command("az vm list", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailed);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_reauth_returns_original_error() {
        let executor = Arc::new(ScriptedExecutor::failing(ErrorKind::AuthFailed, usize::MAX));
        let auth = Arc::new(CountingAuthSetup::failing());
        let client = client_with(Arc::clone(&executor), Some(Arc::clone(&auth)));

        let err = client.execute_command("az vm list", None).await.unwrap_err();

        // The original execution error comes back, not the re-auth error.
        assert_eq!(err.kind, ErrorKind::AuthFailed);
        assert_eq!(err.message, "scripted failure");
        assert_eq!(executor.call_count(), 1);
        assert_eq!(auth.call_count(), 1);
    }

    #[tokio::test]
    async fn test_non_auth_errors_never_trigger_reauth() {
        for kind in [
            ErrorKind::ExecutionFailed,
            ErrorKind::Timeout,
            ErrorKind::InvalidCommand,
        ] {
            let executor = Arc::new(ScriptedExecutor::failing(kind, usize::MAX));
            let auth = Arc::new(CountingAuthSetup::new());
            let client = client_with(Arc::clone(&executor), Some(Arc::clone(&auth)));

            let err = client.execute_command("az vm show --name x", None).await.unwrap_err();
            assert_eq!(err.kind, kind);
            assert_eq!(executor.call_count(), 1);
            assert_eq!(auth.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_validate_command_matches_pipeline() {
        let client = AzClient::new(ClientConfig {
            read_only_mode: false,
            ..Default::default()
        })
        .unwrap();

        assert!(client.validate_command("az vm list").is_ok());
        assert_eq!(
            client.validate_command("az vm list; ls").unwrap_err().kind,
            ErrorKind::InvalidCommand
        );
    }
}
