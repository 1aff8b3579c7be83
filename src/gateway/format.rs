//! Human-readable text for tool results.
//!
//! Models read the `text` content; the same data is also returned as
//! `structuredContent` by the handler.

use std::fmt::Write;

use crate::mcp_client::{CapabilityDescriptor, EndpointSummary, GatewayError};

const INDENT: &str = "      ";

/// Listing of every endpoint, annotated with missing variables.
pub fn endpoint_listing(entries: &[(EndpointSummary, Vec<String>)]) -> String {
    if entries.is_empty() {
        return "No MCP servers are configured.\n".to_string();
    }

    let mut out = String::from("Available MCP Servers:\n\n");
    for (summary, missing) in entries {
        let _ = writeln!(out, "[MCP] {}", summary.name);
        if !summary.description.is_empty() {
            let _ = writeln!(out, "{INDENT}{}", summary.description);
        }
        if !missing.is_empty() {
            let _ = writeln!(out, "{INDENT}Missing env vars: {}", missing.join(", "));
        }
        out.push('\n');
    }
    out.push_str("To see a server's tools, call: load_mcp_tools(mcp_name='server_name')\n");
    out
}

/// Listing of the capabilities one endpoint advertised.
pub fn tool_listing(endpoint: &str, tools: &[CapabilityDescriptor]) -> String {
    if tools.is_empty() {
        return format!("[OK] {endpoint} exposes no tools.\n");
    }

    let mut out = format!("[OK] Tools from {endpoint}:\n\n");
    for tool in tools {
        let _ = writeln!(out, "[TOOL] {}", tool.name);
        if let Some(description) = tool.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "{INDENT} {description}");
        }
    }
    let _ = write!(
        out,
        "\nTo call a tool: call_mcp_tool(mcp_name='{endpoint}', tool_name='tool_name', arguments={{...}})\n"
    );
    out
}

pub fn error_text(error: &GatewayError) -> String {
    format!("[ERROR] {error}")
}
