//! MCP Client — JSON-RPC over stdio to on-demand endpoint processes.
//!
//! This module handles:
//! - The immutable registry of endpoint descriptors
//! - Resolving the environment variables each endpoint requires
//! - Spawning one endpoint process per call and driving it through the
//!   MCP handshake and a single discovery or invocation exchange
//! - Timeouts, teardown and failure isolation for every call
//!
//! Nothing here outlives a call except the registry.

pub mod environment;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use errors::{ConfigError, GatewayError};
pub use lifecycle::{LifecycleManager, Timeouts};
pub use registry::EndpointRegistry;
pub use types::{CapabilityDescriptor, EndpointDescriptor, EndpointSummary};
