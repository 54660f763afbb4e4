//! MCP (Model Context Protocol) server.
//!
//! `mcp_handler` exposes the Drive tools as an MCP endpoint that clients call
//! via JSON-RPC 2.0 over HTTP POST.
//!
//! Protocol: <https://spec.modelcontextprotocol.io/2024-11-05/>

pub mod server;
