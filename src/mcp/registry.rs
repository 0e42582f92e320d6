//! Tool Registry
//!
//! Definitions of the tools this server advertises. There is exactly one:
//! `call_az`, which executes an Azure CLI command through the gateway.

use super::protocol::MCP_PROTOCOL_VERSION;
use serde::Serialize;
use serde_json::json;

/// A tool advertised in `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Tool name callers pass to `tools/call`.
    pub name: String,

    /// Human/model-facing description.
    pub description: String,

    /// JSON schema of the tool's arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Name of the single tool this server exposes.
pub const CALL_AZ_TOOL: &str = "call_az";

/// Build the `call_az` tool definition, with a description reflecting the
/// server's mode.
pub fn call_az_tool(read_only_mode: bool) -> ToolDefinition {
    ToolDefinition {
        name: CALL_AZ_TOOL.to_string(),
        description: tool_description(read_only_mode),
        input_schema: json!({
            "type": "object",
            "properties": {
                "cli_command": {
                    "type": "string",
                    "description": "The Azure CLI command to execute (e.g., 'az vm list --resource-group myRG')"
                },
                "timeout": {
                    "type": "number",
                    "description": "Optional timeout in seconds (default: 120)"
                }
            },
            "required": ["cli_command"]
        }),
    }
}

fn tool_description(read_only_mode: bool) -> String {
    let mut desc = String::from(
        "Execute Azure CLI commands with security validation and policy enforcement.\n\n",
    );

    if read_only_mode {
        desc.push_str("Mode: READ-ONLY - Only read operations are allowed.\n\n");
    } else {
        desc.push_str(
            "Mode: READ-WRITE - Both read and write operations are allowed (subject to policy).\n\n",
        );
    }

    desc.push_str("Security features:\n");
    desc.push_str("- Command validation and sanitization (no shell metacharacters)\n");
    desc.push_str("- Deny-list enforcement from the security policy\n");
    desc.push_str("- Execution timeout and output size limits\n\n");

    desc.push_str("Examples:\n");
    desc.push_str("- List VMs: cli_command=\"az vm list --resource-group myRG\"\n");
    desc.push_str("- Show storage account: cli_command=\"az storage account show --name myaccount\"\n");

    if !read_only_mode {
        desc.push_str(
            "- Create resource group: cli_command=\"az group create --name myRG --location eastus\"\n",
        );
    }

    desc
}

/// The `initialize` result: protocol revision, capabilities, server identity.
pub fn initialize_result() -> serde_json::Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definition_shape() {
        let tool = call_az_tool(true);
        assert_eq!(tool.name, "call_az");

        let schema = &tool.input_schema;
        assert_eq!(schema["required"], json!(["cli_command"]));
        assert_eq!(schema["properties"]["cli_command"]["type"], "string");
        assert_eq!(schema["properties"]["timeout"]["type"], "number");
    }

    #[test]
    fn test_description_reflects_mode() {
        let read_only = call_az_tool(true).description;
        assert!(read_only.contains("READ-ONLY"));
        assert!(!read_only.contains("az group create"));

        let read_write = call_az_tool(false).description;
        assert!(read_write.contains("READ-WRITE"));
        assert!(read_write.contains("az group create"));
    }

    #[test]
    fn test_input_schema_serializes_camel_case() {
        let serialized = serde_json::to_string(&call_az_tool(true)).unwrap();
        assert!(serialized.contains("\"inputSchema\""));
    }

    #[test]
    fn test_initialize_result_identifies_server() {
        let result = initialize_result();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert!(result["serverInfo"]["name"].is_string());
        assert!(result["capabilities"]["tools"].is_object());
    }
}
