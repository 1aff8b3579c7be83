//! Execution engine: the three operations the gateway exposes.
//!
//! Listing is a pure registry read. Discovery and invocation each run a
//! fresh endpoint session through the lifecycle manager; nothing is cached
//! between calls.

use serde_json::Value;

use crate::mcp_client::environment;
use crate::mcp_client::{CapabilityDescriptor, EndpointSummary, GatewayError, LifecycleManager};

/// Front door for listing, discovery and invocation.
pub struct Gateway {
    lifecycle: LifecycleManager,
}

impl Gateway {
    pub fn new(lifecycle: LifecycleManager) -> Self {
        Self { lifecycle }
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Every registered endpoint, in registration order. Never spawns.
    pub fn list_available(&self) -> Vec<EndpointSummary> {
        self.lifecycle.registry().list_all()
    }

    /// Required variables `name` is currently missing (empty if unknown).
    pub fn missing_variables(&self, name: &str) -> Vec<String> {
        match self.lifecycle.registry().lookup(name) {
            Ok(descriptor) => {
                environment::missing(self.lifecycle.env_source(), &descriptor.required_env)
            }
            Err(_) => Vec::new(),
        }
    }

    /// Spawn `name` and return the capabilities it advertises.
    pub async fn load_tools(&self, name: &str) -> Result<Vec<CapabilityDescriptor>, GatewayError> {
        self.lifecycle.run_discovery(name).await
    }

    /// Spawn `name` and invoke `capability`.
    ///
    /// Missing or `null` arguments are sent as an empty object.
    pub async fn call_tool(
        &self,
        name: &str,
        capability: &str,
        arguments: Option<Value>,
    ) -> Result<Value, GatewayError> {
        let arguments = match arguments {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(args) => args,
        };
        self.lifecycle
            .run_invocation(name, capability, arguments)
            .await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
