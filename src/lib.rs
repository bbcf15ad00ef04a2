//! runos: manifest-driven CLI and MCP server for the RunOS platform
//!
//! The backend publishes a manifest of operations. This crate turns that
//! manifest into two front ends that share one request builder:
//!
//! - a nested command-line tree, one leaf per operation
//! - an MCP tool server, one tool per operation plus a raw request tool
//!
//! # Modules
//!
//! - [`manifest`]: Operation model, validation and cached loading
//! - [`request`]: Argument resolution and request building
//! - [`api`]: Authenticated HTTP transport
//! - [`cli`]: Command tree and leaf execution
//! - [`mcp`]: MCP protocol implementation
//! - [`output`]: Human-readable response formatting
//! - [`config`]: Configuration loading and persistence
//! - [`error`]: Error types

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod mcp;
pub mod output;
pub mod request;
