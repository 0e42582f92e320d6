// Server Configuration
//
// Flags come from the command line; authentication parameters come from the
// environment (the same variables the Azure SDKs use), so secrets never
// appear in process listings. Configuration is parsed and validated once at
// startup and immutable afterwards.

use crate::azcli::{AuthConfig, AuthMethod};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// MCP gateway for the Azure CLI with layered command validation.
#[derive(Parser, Debug, Clone)]
#[command(name = "azguard", version, about, long_about = None)]
pub struct Config {
    /// Enable read-only mode (only read operations allowed)
    #[arg(long = "readonly", default_value_t = true, action = clap::ArgAction::Set)]
    pub read_only_mode: bool,

    /// Enable security policy enforcement (deny list)
    #[arg(long)]
    pub enable_security_policy: bool,

    /// Timeout for command execution in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,

    /// Path to a security policy YAML file (embedded default when omitted)
    #[arg(long)]
    pub security_policy_file: Option<PathBuf>,

    /// Path to a read-only patterns YAML file (embedded default when omitted)
    #[arg(long)]
    pub readonly_patterns_file: Option<PathBuf>,

    /// Working directory for command execution
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Authentication method (auto, workload-identity, managed-identity, service-principal)
    #[arg(long, default_value = "auto")]
    pub auth_method: String,

    /// Skip authentication setup at startup
    #[arg(long)]
    pub skip_auth_setup: bool,

    // Auth parameters are environment-only; see apply_env_overrides.
    #[arg(skip)]
    pub tenant_id: Option<String>,

    #[arg(skip)]
    pub client_id: Option<String>,

    #[arg(skip)]
    pub federated_token_file: Option<PathBuf>,

    #[arg(skip)]
    pub client_secret: Option<String>,

    #[arg(skip)]
    pub default_subscription: Option<String>,
}

impl Config {
    /// Parse the command line and fold in environment overrides.
    pub fn load() -> Result<Self> {
        let config = Self::parse().apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Fold environment variables into the configuration.
    ///
    /// `AZURE_*` variables carry identity parameters; `AZGUARD_*` variables
    /// override gateway behavior. Environment wins over defaults but not
    /// over an explicit `--auth-method` flag.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(skip) = std::env::var("AZGUARD_SKIP_AUTH_SETUP") {
            self.skip_auth_setup = skip == "true" || skip == "1";
        }

        if self.auth_method == "auto" {
            if let Ok(method) = std::env::var("AZGUARD_AUTH_METHOD") {
                if !method.is_empty() {
                    self.auth_method = method;
                }
            }
        }

        if let Ok(tenant_id) = std::env::var("AZURE_TENANT_ID") {
            if !tenant_id.is_empty() {
                self.tenant_id = Some(tenant_id);
            }
        }

        if let Ok(client_id) = std::env::var("AZURE_CLIENT_ID") {
            if !client_id.is_empty() {
                self.client_id = Some(client_id);
            }
        }

        if let Ok(token_file) = std::env::var("AZURE_FEDERATED_TOKEN_FILE") {
            if !token_file.is_empty() {
                self.federated_token_file = Some(PathBuf::from(token_file));
            }
        }

        if let Ok(secret) = std::env::var("AZURE_CLIENT_SECRET") {
            if !secret.is_empty() {
                self.client_secret = Some(secret);
            }
        }

        if let Ok(subscription) = std::env::var("AZURE_SUBSCRIPTION_ID") {
            if !subscription.is_empty() {
                self.default_subscription = Some(subscription);
            }
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.timeout == 0 {
            bail!("timeout must be greater than 0");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => bail!(
                "invalid log level: {} (must be one of: trace, debug, info, warn, error)",
                other
            ),
        }

        self.auth_method
            .parse::<AuthMethod>()
            .context("invalid --auth-method")?;

        Ok(())
    }

    /// The default per-call execution deadline.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Convert the log level string to a tracing level.
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.log_level
            .to_lowercase()
            .parse()
            .map_err(|err| anyhow::anyhow!("failed to parse log level: {}", err))
    }

    /// Assemble the identity parameters for credential setup.
    pub fn auth_config(&self) -> Result<AuthConfig> {
        Ok(AuthConfig {
            skip_setup: self.skip_auth_setup,
            method: self.auth_method.parse()?,
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            federated_token_file: self.federated_token_file.clone(),
            client_secret: self.client_secret.clone(),
            default_subscription: self.default_subscription.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["azguard"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert!(config.read_only_mode);
        assert!(!config.enable_security_policy);
        assert_eq!(config.timeout, 120);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.auth_method, "auto");
        assert!(!config.skip_auth_setup);
        assert!(config.security_policy_file.is_none());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(parse(&[]).validate().is_ok());
    }

    #[test]
    fn test_readonly_flag_can_be_disabled() {
        let config = parse(&["--readonly", "false"]);
        assert!(!config.read_only_mode);
    }

    #[test]
    fn test_flags_parse() {
        let config = parse(&[
            "--enable-security-policy",
            "--timeout",
            "30",
            "--security-policy-file",
            "/etc/azguard/policy.yaml",
            "--log-level",
            "debug",
        ]);
        assert!(config.enable_security_policy);
        assert_eq!(config.timeout, 30);
        assert_eq!(
            config.security_policy_file,
            Some(PathBuf::from("/etc/azguard/policy.yaml"))
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = parse(&["--timeout", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = parse(&[]);
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_auth_method_rejected() {
        let config = parse(&["--auth-method", "kerberos"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_parses_to_tracing_level() {
        let mut config = parse(&[]);
        config.log_level = "debug".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_timeout_duration() {
        let config = parse(&["--timeout", "45"]);
        assert_eq!(config.timeout_duration(), Duration::from_secs(45));
    }

    #[test]
    fn test_env_overrides_identity() {
        std::env::set_var("AZURE_TENANT_ID", "tenant-from-env");
        std::env::set_var("AZURE_CLIENT_ID", "client-from-env");

        let config = parse(&[]).apply_env_overrides();
        assert_eq!(config.tenant_id.as_deref(), Some("tenant-from-env"));
        assert_eq!(config.client_id.as_deref(), Some("client-from-env"));

        std::env::remove_var("AZURE_TENANT_ID");
        std::env::remove_var("AZURE_CLIENT_ID");
    }

    #[test]
    fn test_env_skip_auth_setup() {
        std::env::set_var("AZGUARD_SKIP_AUTH_SETUP", "1");
        let config = parse(&[]).apply_env_overrides();
        assert!(config.skip_auth_setup);
        std::env::remove_var("AZGUARD_SKIP_AUTH_SETUP");
    }

    #[test]
    fn test_explicit_auth_method_beats_env() {
        std::env::set_var("AZGUARD_AUTH_METHOD", "managed-identity");
        let config = parse(&["--auth-method", "service-principal"]).apply_env_overrides();
        assert_eq!(config.auth_method, "service-principal");
        std::env::remove_var("AZGUARD_AUTH_METHOD");
    }

    #[test]
    fn test_auth_config_assembly() {
        let mut config = parse(&["--skip-auth-setup"]);
        config.tenant_id = Some("tenant".to_string());

        let auth = config.auth_config().unwrap();
        assert!(auth.skip_setup);
        assert_eq!(auth.method, AuthMethod::Auto);
        assert_eq!(auth.tenant_id.as_deref(), Some("tenant"));
    }
}
