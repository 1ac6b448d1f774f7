//! MCP (Model Context Protocol) server for log queries
//!
//! This crate provides a stdio-based MCP server that exposes inline log
//! queries and the background query lifecycle of `obsquery-lib` to AI
//! assistants via the Model Context Protocol.
//!
//! # Architecture
//!
//! - `server`: JSON-RPC dispatch and the request loop
//! - `transport`: newline-delimited framing over stdin/stdout
//! - `tools`: tool implementations (query_logs and the background query tools)
//! - `format`: plain-text rendering of query results
//! - `error`: JSON-RPC error objects
//!
//! # Transport
//!
//! The server communicates via stdio using JSON-RPC 2.0 messages, one per
//! line. Standard output carries nothing but those messages; all logging
//! goes to stderr.

pub mod error;
pub mod format;
pub mod server;
pub mod tools;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use server::{run_server_loop, McpServer};
pub use transport::{FrameTransport, Inbound, StdioTransport};
