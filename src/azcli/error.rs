//! Gateway Error Model
//!
//! Every failure that crosses a component boundary in the gateway is a
//! [`GatewayError`]: a fixed kind, a human-readable message, the offending
//! command string, and an open-ended context map for diagnostics. Callers
//! branch on [`ErrorKind`] rather than on concrete types, so the retry
//! logic in the client can match exhaustively.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Classification of a gateway failure.
///
/// The kind determines how callers react: only [`ErrorKind::AuthFailed`]
/// is ever retried, and at most once (see the client module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or disallowed command syntax: wrong prefix, forbidden
    /// character, path traversal, or tokenizer failure.
    InvalidCommand,

    /// Command rejected by the deny list or the read-only policy.
    CommandDenied,

    /// The subprocess could not be run, or its output exceeded the size bound.
    ExecutionFailed,

    /// The execution deadline expired before the subprocess completed.
    Timeout,

    /// Subprocess failure attributable to expired or missing credentials.
    AuthFailed,
}

impl ErrorKind {
    /// Stable wire name for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCommand => "invalid_command",
            ErrorKind::CommandDenied => "command_denied",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AuthFailed => "auth_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified gateway failure.
///
/// # Example
///
/// ```
/// use azguard::azcli::{ErrorKind, GatewayError};
///
/// let err = GatewayError::new(ErrorKind::Timeout, "command execution timed out", "az vm list")
///     .with_context("timeout_secs", 120);
/// assert_eq!(err.kind, ErrorKind::Timeout);
/// assert!(err.to_string().contains("az vm list"));
/// ```
#[derive(Debug, Clone)]
pub struct GatewayError {
    /// What class of failure this is.
    pub kind: ErrorKind,

    /// Human-readable description of the failure.
    pub message: String,

    /// The command string the caller submitted.
    pub command: String,

    /// Diagnostic key/value pairs (timeout values, size limits, ...).
    pub context: BTreeMap<String, serde_json::Value>,
}

impl GatewayError {
    /// Create a new error with an empty context map.
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            command: command.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic key/value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.command.is_empty() {
            write!(f, "[{}] {}", self.kind, self.message)
        } else {
            write!(f, "[{}] {} (command: {})", self.kind, self.message, self.command)
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_command() {
        let err = GatewayError::new(ErrorKind::CommandDenied, "denied by policy", "az vm delete");
        assert_eq!(
            err.to_string(),
            "[command_denied] denied by policy (command: az vm delete)"
        );
    }

    #[test]
    fn test_display_without_command() {
        let err = GatewayError::new(ErrorKind::ExecutionFailed, "spawn failed", "");
        assert_eq!(err.to_string(), "[execution_failed] spawn failed");
    }

    #[test]
    fn test_with_context_accumulates() {
        let err = GatewayError::new(ErrorKind::Timeout, "timed out", "az vm list")
            .with_context("timeout_secs", 120)
            .with_context("attempt", 1);
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.context["timeout_secs"], serde_json::json!(120));
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(ErrorKind::InvalidCommand.as_str(), "invalid_command");
        assert_eq!(ErrorKind::CommandDenied.as_str(), "command_denied");
        assert_eq!(ErrorKind::ExecutionFailed.as_str(), "execution_failed");
        assert_eq!(ErrorKind::Timeout.as_str(), "timeout");
        assert_eq!(ErrorKind::AuthFailed.as_str(), "auth_failed");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::AuthFailed).unwrap();
        assert_eq!(json, "\"auth_failed\"");
    }
}
