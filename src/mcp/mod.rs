//! MCP Server Surface
//!
//! Exposes the gateway to callers over the Model Context Protocol:
//! - `protocol.rs`: JSON-RPC 2.0 message types and error codes.
//! - `registry.rs`: the `call_az` tool definition and server identity.
//! - `server.rs`: request dispatch and the line-delimited stdio transport.

mod protocol;
mod registry;
mod server;

pub use protocol::{McpError, McpRequest, McpResponse, JSONRPC_VERSION, MCP_PROTOCOL_VERSION};
pub use registry::{call_az_tool, ToolDefinition, CALL_AZ_TOOL};
pub use server::McpServer;
