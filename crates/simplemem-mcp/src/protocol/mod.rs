//! MCP protocol implementation: JSON-RPC 2.0 over Streamable HTTP.

pub mod http;
pub mod messages;
pub mod types;
