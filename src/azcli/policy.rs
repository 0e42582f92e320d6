//! Security Policy and Read-Only Pattern Documents
//!
//! Both documents are YAML, loaded once at startup and immutable for the
//! process lifetime. When no file path is configured, an embedded default
//! document is used so the gateway is never running without a policy.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Default deny list applied when no policy file is configured.
///
/// Entries are literal command prefixes; anything starting with one of them
/// is rejected when policy enforcement is enabled.
const DEFAULT_SECURITY_POLICY: &str = r#"version: "1.0"
policy:
  denyList:
    - "az account clear"
    - "az ad app delete"
    - "az ad sp delete"
    - "az group delete"
    - "az keyvault delete"
    - "az keyvault purge"
    - "az logout"
    - "az policy assignment delete"
    - "az role assignment create"
    - "az role assignment delete"
    - "az role definition create"
    - "az role definition delete"
    - "az sql db delete"
    - "az sql server delete"
    - "az storage account delete"
    - "az vm delete"
"#;

/// Default read-only patterns applied when no patterns file is configured.
///
/// A command must match at least one pattern to run in read-only mode.
const DEFAULT_READ_ONLY_PATTERNS: &str = r#"patterns:
  - "^az account (show|list|list-locations)($| )"
  - "^az ad signed-in-user show($| )"
  - "^az config get($| )"
  - "^az find($| )"
  - "^az graph query($| )"
  - "^az group (show|list|exists)($| )"
  - "^az [a-z-]+( [a-z-]+)* (list|list-[a-z-]+)($| )"
  - "^az [a-z-]+( [a-z-]+)* (show|show-[a-z-]+)($| )"
  - "^az [a-z-]+( [a-z-]+)* (get|get-[a-z-]+)($| )"
  - "^az version($| )"
  - "^az --version($| )"
"#;

/// A versioned deny-list document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Document schema version.
    pub version: String,

    /// The policy rules themselves.
    pub policy: PolicyRules,
}

/// Rules carried by a [`SecurityPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRules {
    /// Ordered list of denied command prefixes; first match governs the
    /// reported reason.
    #[serde(rename = "denyList")]
    pub deny_list: Vec<String>,
}

impl SecurityPolicy {
    /// A policy that denies nothing. Useful for tests and permissive
    /// deployments that still want policy enforcement wired up.
    pub fn allow_all() -> Self {
        Self {
            version: "1.0".to_string(),
            policy: PolicyRules { deny_list: Vec::new() },
        }
    }

    /// Load a policy document from `path`, or the embedded default when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let data = match path {
            None => DEFAULT_SECURITY_POLICY.to_string(),
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read policy file {}", path.display()))?,
        };

        serde_yaml::from_str(&data).context("failed to parse security policy")
    }
}

/// The read-only pattern document: an ordered list of regular expressions
/// describing allowed command shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyPatterns {
    /// Regular expression source strings. Patterns are expected to anchor
    /// themselves with `^`/`$` as needed.
    pub patterns: Vec<String>,
}

impl ReadOnlyPatterns {
    /// Load a pattern document from `path`, or the embedded default when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let data = match path {
            None => DEFAULT_READ_ONLY_PATTERNS.to_string(),
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read patterns file {}", path.display()))?,
        };

        serde_yaml::from_str(&data).context("failed to parse read-only patterns")
    }

    /// Compile the pattern list. A malformed pattern is skipped and surfaced
    /// as a load-time warning; it never aborts validation.
    pub fn compile(&self) -> Vec<Regex> {
        let mut compiled = Vec::with_capacity(self.patterns.len());
        for pattern in &self.patterns {
            match Regex::new(pattern) {
                Ok(re) => compiled.push(re),
                Err(err) => {
                    warn!("skipping malformed read-only pattern {:?}: {}", pattern, err);
                }
            }
        }
        compiled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_policy_loads() {
        let policy = SecurityPolicy::load(None).unwrap();
        assert_eq!(policy.version, "1.0");
        assert!(!policy.policy.deny_list.is_empty());
        assert!(policy
            .policy
            .deny_list
            .iter()
            .any(|entry| entry == "az vm delete"));
    }

    #[test]
    fn test_default_patterns_load_and_compile() {
        let patterns = ReadOnlyPatterns::load(None).unwrap();
        assert!(!patterns.patterns.is_empty());

        // Every embedded default must compile cleanly.
        let compiled = patterns.compile();
        assert_eq!(compiled.len(), patterns.patterns.len());
    }

    #[test]
    fn test_load_policy_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "version: \"2.0\"\npolicy:\n  denyList:\n    - \"az account clear\""
        )
        .unwrap();

        let policy = SecurityPolicy::load(Some(file.path())).unwrap();
        assert_eq!(policy.version, "2.0");
        assert_eq!(policy.policy.deny_list, vec!["az account clear"]);
    }

    #[test]
    fn test_load_policy_missing_file() {
        let result = SecurityPolicy::load(Some(Path::new("/nonexistent/policy.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_policy_malformed_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "version: [unterminated").unwrap();

        let result = SecurityPolicy::load(Some(file.path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_patterns_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "patterns:\n  - \"^az [a-z-]+ list($| )\"").unwrap();

        let patterns = ReadOnlyPatterns::load(Some(file.path())).unwrap();
        assert_eq!(patterns.patterns.len(), 1);
    }

    #[test]
    fn test_malformed_pattern_is_skipped() {
        let patterns = ReadOnlyPatterns {
            patterns: vec![
                "^az vm list".to_string(),
                "[unclosed".to_string(),
                "^az vm show".to_string(),
            ],
        };

        let compiled = patterns.compile();
        assert_eq!(compiled.len(), 2);
    }

    #[test]
    fn test_allow_all_policy_is_empty() {
        let policy = SecurityPolicy::allow_all();
        assert!(policy.policy.deny_list.is_empty());
    }

    #[test]
    fn test_default_patterns_allow_expected_shapes() {
        let compiled = ReadOnlyPatterns::load(None).unwrap().compile();
        let matches = |cmd: &str| compiled.iter().any(|re| re.is_match(cmd));

        assert!(matches("az vm list --resource-group myRG"));
        assert!(matches("az storage account show --name myaccount"));
        assert!(matches("az account show"));
        assert!(!matches("az vm delete --name myVM"));
        assert!(!matches("az group create --name myRG"));
    }
}
