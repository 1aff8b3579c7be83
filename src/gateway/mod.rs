//! Upstream side of the gateway: the MCP server the host connects to.
//!
//! - `engine`: listing, discovery and invocation over the lifecycle manager
//! - `handler`: MCP method dispatch and tool-result shaping
//! - `format`: the text content models read
//! - `server`: concurrent line-oriented JSON-RPC loop over stdio

pub mod engine;
pub mod format;
pub mod handler;
pub mod server;

pub use engine::Gateway;
pub use server::{serve, serve_stdio};
