// AzGuard - Main Entry Point
//
// Startup order matters: configuration first, then logging, then the
// authentication preflight (so a broken identity fails loudly before the
// first request), and only then the MCP server loop. All logs go to stderr;
// stdout belongs to the protocol.

use anyhow::{bail, Context, Result};
use azguard::azcli::{AuthSetup, AuthValidator, AzAuthSetup, AzClient, ClientConfig};
use azguard::config::Config;
use azguard::mcp::McpServer;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Deadline for the startup authentication steps. A hang here usually means
/// the Azure CLI is waiting for interactive input it will never get.
const AUTH_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let level = config.log_level()?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        read_only = config.read_only_mode,
        security_policy = config.enable_security_policy,
        "starting azguard"
    );

    let auth_config = config.auth_config()?;
    let auth_setup = Arc::new(AzAuthSetup::new(auth_config));

    if !config.skip_auth_setup {
        match tokio::time::timeout(AUTH_STARTUP_TIMEOUT, auth_setup.setup()).await {
            Err(_) => bail!(
                "authentication setup timed out after {:?}; az may be waiting for interactive input",
                AUTH_STARTUP_TIMEOUT
            ),
            Ok(Err(err)) => return Err(err.context("authentication setup failed")),
            Ok(Ok(())) => info!("authentication setup completed"),
        }
    }

    match tokio::time::timeout(AUTH_STARTUP_TIMEOUT, AuthValidator::new().validate()).await {
        Err(_) => bail!(
            "authentication validation timed out after {:?}; az may be unconfigured or waiting for interactive input",
            AUTH_STARTUP_TIMEOUT
        ),
        Ok(Err(err)) if config.skip_auth_setup => {
            return Err(err.context(
                "authentication validation failed; run 'az login' first or unset AZGUARD_SKIP_AUTH_SETUP",
            ))
        }
        Ok(Err(err)) => return Err(err.context("authentication validation failed")),
        Ok(Ok(())) => info!("authentication validated"),
    }

    let mut client = AzClient::new(ClientConfig {
        read_only_mode: config.read_only_mode,
        enable_security_policy: config.enable_security_policy,
        timeout: config.timeout_duration(),
        working_dir: config.working_dir.clone(),
        security_policy_file: config.security_policy_file.clone(),
        read_only_patterns_file: config.readonly_patterns_file.clone(),
    })
    .context("failed to build gateway client")?;

    if !config.skip_auth_setup {
        client = client.with_auth_setup(auth_setup);
    }

    let server = McpServer::new(Arc::new(client), config.read_only_mode);
    info!("listening for MCP requests on stdio");
    server.serve_stdio().await
}
