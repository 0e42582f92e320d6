//! AzGuard Library
//!
//! A guarded command-execution gateway for the Azure CLI. Accepts a raw
//! command string from an MCP caller, validates it against layered security
//! rules, executes it as a bounded subprocess, and returns a structured
//! result, retrying exactly once after re-authentication when the failure
//! looks like expired credentials.

pub mod azcli;
pub mod config;
pub mod mcp;
