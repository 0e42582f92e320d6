//! Azure Authentication Setup
//!
//! Establishes Azure CLI credentials non-interactively. Three concrete
//! methods are supported, matching the identities available to a server
//! workload:
//!
//! - **Workload identity**: `az login --federated-token` with a token read
//!   from a projected file (AKS workload identity federation).
//! - **Managed identity**: `az login --identity`, optionally pinned to a
//!   client id.
//! - **Service principal**: `az login --service-principal` with a client
//!   secret.
//!
//! The client invokes [`AuthSetup::setup`] as an opaque callback when it
//! detects a credential-expiry failure; it never inspects how credentials
//! are established. Setup is idempotent: logging in twice is wasteful but
//! harmless, which is what makes the one-shot retry safe.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, info};

/// How credentials are established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    /// Detect a method from the configuration and environment.
    #[default]
    Auto,

    /// Federated token file (AKS workload identity).
    WorkloadIdentity,

    /// Azure managed identity.
    ManagedIdentity,

    /// Service principal with a client secret.
    ServicePrincipal,
}

impl FromStr for AuthMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(AuthMethod::Auto),
            "workload-identity" => Ok(AuthMethod::WorkloadIdentity),
            "managed-identity" => Ok(AuthMethod::ManagedIdentity),
            "service-principal" => Ok(AuthMethod::ServicePrincipal),
            other => bail!(
                "unknown auth method: {} (supported: auto, workload-identity, managed-identity, service-principal)",
                other
            ),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthMethod::Auto => "auto",
            AuthMethod::WorkloadIdentity => "workload-identity",
            AuthMethod::ManagedIdentity => "managed-identity",
            AuthMethod::ServicePrincipal => "service-principal",
        };
        f.write_str(name)
    }
}

/// External-identity parameters. Immutable once constructed; owned by the
/// client and passed by reference into the setup flows.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Bypass credential setup entirely.
    pub skip_setup: bool,

    /// Selected method; `Auto` detects one.
    pub method: AuthMethod,

    /// Azure AD tenant id.
    pub tenant_id: Option<String>,

    /// Client (application) id.
    pub client_id: Option<String>,

    /// Path to a projected federated token file.
    pub federated_token_file: Option<PathBuf>,

    /// Service-principal client secret.
    pub client_secret: Option<String>,

    /// Subscription selected after login.
    pub default_subscription: Option<String>,
}

/// The re-authentication capability injected into the client.
#[async_trait]
pub trait AuthSetup: Send + Sync {
    /// Attempt to (re-)establish external credentials.
    async fn setup(&self) -> Result<()>;
}

/// Credential setup backed by the `az` CLI itself.
#[derive(Debug, Clone)]
pub struct AzAuthSetup {
    config: AuthConfig,
}

impl AzAuthSetup {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Pick a concrete method from configuration and environment.
    ///
    /// Order matters: a federated token file wins over a client secret, and
    /// a managed-identity endpoint is only consulted when neither is
    /// configured. Returns `None` when nothing is detected, in which case
    /// an existing `az login` session is assumed.
    fn detect_method(&self) -> Option<AuthMethod> {
        let cfg = &self.config;

        if cfg.federated_token_file.is_some() && cfg.client_id.is_some() && cfg.tenant_id.is_some()
        {
            return Some(AuthMethod::WorkloadIdentity);
        }

        if cfg.client_secret.is_some() && cfg.client_id.is_some() && cfg.tenant_id.is_some() {
            return Some(AuthMethod::ServicePrincipal);
        }

        if std::env::var("MSI_ENDPOINT").is_ok() || std::env::var("IDENTITY_ENDPOINT").is_ok() {
            return Some(AuthMethod::ManagedIdentity);
        }

        None
    }

    async fn login_workload_identity(&self) -> Result<()> {
        let token_file = self
            .config
            .federated_token_file
            .as_ref()
            .context("federated token file not configured")?;
        let client_id = self.config.client_id.as_ref().context("client id not configured")?;
        let tenant_id = self.config.tenant_id.as_ref().context("tenant id not configured")?;

        let token = tokio::fs::read_to_string(token_file)
            .await
            .with_context(|| format!("failed to read federated token {}", token_file.display()))?;
        let token = token.trim();

        run_az(&[
            "login",
            "--federated-token",
            token,
            "--service-principal",
            "-u",
            client_id,
            "-t",
            tenant_id,
            "--output",
            "json",
        ])
        .await
        .context("workload identity login failed")?;

        self.set_default_subscription().await
    }

    async fn login_managed_identity(&self) -> Result<()> {
        let mut args = vec!["login", "--identity", "--output", "json"];

        if let Some(client_id) = &self.config.client_id {
            args.push("-u");
            args.push(client_id.as_str());
        }

        run_az(&args)
            .await
            .context("managed identity login failed")?;

        self.set_default_subscription().await
    }

    async fn login_service_principal(&self) -> Result<()> {
        let client_secret = self
            .config
            .client_secret
            .as_ref()
            .context("client secret not configured")?;
        let client_id = self.config.client_id.as_ref().context("client id not configured")?;
        let tenant_id = self.config.tenant_id.as_ref().context("tenant id not configured")?;

        run_az(&[
            "login",
            "--service-principal",
            "-u",
            client_id,
            "-p",
            client_secret,
            "--tenant",
            tenant_id,
            "--output",
            "json",
        ])
        .await
        .context("service principal login failed")?;

        self.set_default_subscription().await
    }

    async fn set_default_subscription(&self) -> Result<()> {
        let Some(subscription) = &self.config.default_subscription else {
            return Ok(());
        };

        run_az(&["account", "set", "--subscription", subscription])
            .await
            .context("failed to set subscription")
            .map(|_| ())
    }
}

#[async_trait]
impl AuthSetup for AzAuthSetup {
    async fn setup(&self) -> Result<()> {
        if self.config.skip_setup {
            debug!("credential setup skipped by configuration");
            return Ok(());
        }

        let method = match self.config.method {
            AuthMethod::Auto => self.detect_method(),
            explicit => Some(explicit),
        };

        match method {
            Some(AuthMethod::WorkloadIdentity) => {
                info!("authenticating with workload identity");
                self.login_workload_identity().await
            }
            Some(AuthMethod::ManagedIdentity) => {
                info!("authenticating with managed identity");
                self.login_managed_identity().await
            }
            Some(AuthMethod::ServicePrincipal) => {
                info!("authenticating with service principal");
                self.login_service_principal().await
            }
            Some(AuthMethod::Auto) | None => {
                info!("no automatic authentication method detected, assuming an existing 'az login' session");
                Ok(())
            }
        }
    }
}

/// Startup preflight: confirm the Azure CLI has a working account.
#[derive(Debug, Clone, Default)]
pub struct AuthValidator;

impl AuthValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run `az account show`, surfacing its failure as ours.
    pub async fn validate(&self) -> Result<()> {
        run_az(&["account", "show", "--output", "json"])
            .await
            .context("azure CLI authentication check failed")
            .map(|_| ())
    }
}

/// Run `az` with `args`, bailing with combined output on failure.
///
/// Used for credential setup only; command-gateway executions go through
/// the executor with its validation and bounds.
async fn run_az(args: &[&str]) -> Result<String> {
    let output = Command::new("az")
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .context("failed to run az")?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "az exited with {}: {}{}",
            output.status,
            stdout.trim(),
            stderr.trim()
        );
    }

    Ok(stdout)
}
