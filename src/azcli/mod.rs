//! Azure CLI Command Gateway
//!
//! The core of the gateway: everything between an untrusted command string
//! and a bounded, classified subprocess execution.
//!
//! # Architecture
//!
//! - `tokenizer.rs`: command string → argument vector, honoring quoting.
//! - `policy.rs`: deny-list and read-only pattern documents (YAML, embedded
//!   defaults).
//! - `validator.rs`: the layered, fail-fast validation pipeline.
//! - `executor.rs`: subprocess spawning with deadline and output bounds.
//! - `auth.rs`: non-interactive Azure credential setup.
//! - `client.rs`: validator + executor composition with the one-shot
//!   authentication retry.
//!
//! # Security Model
//!
//! Commands are rejected as text before any process exists: shell
//! metacharacters, path traversal, denied prefixes, and (in read-only mode)
//! anything not matching an allow pattern. What survives is executed as an
//! argument vector, never through a shell, under a wall-clock deadline and
//! an output-size cap, with an explicit environment allow-list.

mod auth;
mod client;
mod error;
mod executor;
mod policy;
mod tokenizer;
mod validator;

pub use auth::{AuthConfig, AuthMethod, AuthSetup, AuthValidator, AzAuthSetup};
pub use client::{AzClient, ClientConfig};
pub use error::{ErrorKind, GatewayError};
pub use executor::{
    AzExecutor, CommandExecutor, ExecutionResult, ExecutorConfig, DEFAULT_MAX_OUTPUT_SIZE,
    DEFAULT_TIMEOUT, MAX_TIMEOUT,
};
pub use policy::{PolicyRules, ReadOnlyPatterns, SecurityPolicy};
pub use tokenizer::{tokenize, TokenizeError};
pub use validator::{CommandValidator, ValidatorConfig};
