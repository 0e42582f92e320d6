//! Command Validation Pipeline
//!
//! Validation is pure string analysis performed before any process is
//! spawned, so shell-metacharacter attacks are rejected while they are still
//! text. The pipeline applies three screens in a fixed order and fails fast
//! on the first rejection:
//!
//! 1. **Basic security screen**: the command must invoke the Azure CLI and
//!    must not contain shell metacharacters or path traversal.
//! 2. **Deny-list screen**: literal prefix match against the security
//!    policy (only when policy enforcement is enabled).
//! 3. **Read-only screen**: the command must match an allow pattern (only
//!    when read-only mode is enabled). With zero loaded patterns every
//!    command is denied: the screen fails closed, never open.

use super::error::{ErrorKind, GatewayError};
use super::policy::{ReadOnlyPatterns, SecurityPolicy};
use anyhow::Result;
use regex::Regex;
use std::path::PathBuf;
use tracing::warn;

/// Required invocation prefix: program name plus separating space.
const AZ_PREFIX: &str = "az ";

/// Character sequences that would let a command escape into a shell.
/// Checked in order; the first one found is the reported reason.
const FORBIDDEN_SEQUENCES: &[&str] = &["|", ">", "<", "&&", "||", ";", "$", "`", "\n"];

/// Configuration for building a [`CommandValidator`].
#[derive(Debug, Clone, Default)]
pub struct ValidatorConfig {
    /// Only commands matching a read-only pattern are allowed.
    pub read_only_mode: bool,

    /// Enforce the deny list from the security policy.
    pub enable_security_policy: bool,

    /// Path to a security policy document; `None` uses the embedded default.
    pub security_policy_file: Option<PathBuf>,

    /// Path to a read-only pattern document; `None` uses the embedded default.
    pub read_only_patterns_file: Option<PathBuf>,
}

/// The layered policy engine. Constructed once at startup, immutable for the
/// process lifetime, and safely shared across concurrent calls.
#[derive(Debug)]
pub struct CommandValidator {
    read_only_mode: bool,
    enable_security_policy: bool,
    policy: Option<SecurityPolicy>,
    read_only_patterns: Vec<Regex>,
}

impl CommandValidator {
    /// Build a validator, loading policy documents as configured.
    ///
    /// Policy and pattern documents are only loaded for the screens that are
    /// actually enabled.
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let policy = if config.enable_security_policy {
            Some(SecurityPolicy::load(config.security_policy_file.as_deref())?)
        } else {
            None
        };

        let read_only_patterns = if config.read_only_mode {
            ReadOnlyPatterns::load(config.read_only_patterns_file.as_deref())?.compile()
        } else {
            Vec::new()
        };

        Ok(Self {
            read_only_mode: config.read_only_mode,
            enable_security_policy: config.enable_security_policy,
            policy,
            read_only_patterns,
        })
    }

    /// Validate a command string against every enabled screen.
    ///
    /// Side-effect-free and fast: no subprocess, no network. The first
    /// failing screen wins.
    pub fn validate(&self, command: &str) -> Result<(), GatewayError> {
        self.check_basic_security(command)?;

        if self.enable_security_policy {
            self.check_deny_list(command)?;
        }

        if self.read_only_mode {
            self.check_read_only(command)?;
        }

        Ok(())
    }

    fn check_basic_security(&self, command: &str) -> Result<(), GatewayError> {
        if !command.starts_with(AZ_PREFIX) {
            return Err(GatewayError::new(
                ErrorKind::InvalidCommand,
                "command must start with 'az '",
                command,
            ));
        }

        for seq in FORBIDDEN_SEQUENCES {
            if command.contains(seq) {
                warn!("rejecting command containing forbidden sequence {:?}", seq);
                return Err(GatewayError::new(
                    ErrorKind::InvalidCommand,
                    format!("command contains forbidden character: {}", seq.escape_default()),
                    command,
                ));
            }
        }

        if command.contains("../") || command.contains("..\\") {
            warn!("rejecting command containing path traversal");
            return Err(GatewayError::new(
                ErrorKind::InvalidCommand,
                "path traversal detected",
                command,
            ));
        }

        Ok(())
    }

    fn check_deny_list(&self, command: &str) -> Result<(), GatewayError> {
        let Some(policy) = &self.policy else {
            return Ok(());
        };

        // Literal prefix comparison: "az vm delete" also denies
        // "az vm deletexyz". Over-matching is accepted in exchange for
        // never under-matching.
        for denied in &policy.policy.deny_list {
            if command.starts_with(denied.as_str()) {
                return Err(GatewayError::new(
                    ErrorKind::CommandDenied,
                    format!("command denied by security policy: {}", denied),
                    command,
                ));
            }
        }

        Ok(())
    }

    fn check_read_only(&self, command: &str) -> Result<(), GatewayError> {
        // Zero loaded patterns deny everything: fail closed.
        if self
            .read_only_patterns
            .iter()
            .any(|pattern| pattern.is_match(command))
        {
            return Ok(());
        }

        Err(GatewayError::new(
            ErrorKind::CommandDenied,
            "command not allowed in read-only mode",
            command,
        ))
    }
}
