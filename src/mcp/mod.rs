//! Model Context Protocol (MCP) server.
//!
//! Exposes every manifest operation as a tool over line-delimited JSON-RPC
//! 2.0 on stdio.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │   │  Transport  │───▶│   Server    │───▶│    Tools    │      │
//! │   │   (lines)   │    │  (dispatch) │    │ (manifest)  │      │
//! │   └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                                │             │
//! │                                                ▼             │
//! │                                   ┌───────────────────────┐  │
//! │                                   │ request::build + API  │  │
//! │                                   └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, ServerState};
pub use tools::{tool_definitions, ToolDefinition, ToolDispatcher, API_REQUEST_TOOL};
pub use transport::{Line, LineTransport};
