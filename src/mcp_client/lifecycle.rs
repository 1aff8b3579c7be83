//! Connection lifecycle manager.
//!
//! The only place sessions are created. Every call looks up the descriptor,
//! resolves its environment, spawns one session, bounds the handshake and
//! the exchange with their own timeouts, and tears the session down before
//! returning. Calls share nothing but the read-only registry, so one hung or
//! crashed endpoint cannot affect another call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::environment::{self, EnvSource, ProcessEnv};
use super::errors::GatewayError;
use super::registry::EndpointRegistry;
use super::session::EndpointSession;
use super::types::CapabilityDescriptor;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default bound on the initialize handshake.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on one discovery or invocation exchange.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default time a finished endpoint gets to exit after stdin closes.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ─── Timeouts ────────────────────────────────────────────────────────────────

/// Per-phase time bounds, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub init: Duration,
    pub operation: Duration,
    pub shutdown_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            init: DEFAULT_INIT_TIMEOUT,
            operation: DEFAULT_OPERATION_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

// ─── LifecycleManager ────────────────────────────────────────────────────────

/// Creates, drives and tears down endpoint sessions.
pub struct LifecycleManager {
    registry: Arc<EndpointRegistry>,
    env: Arc<dyn EnvSource>,
    timeouts: Timeouts,
}

impl LifecycleManager {
    /// Manager resolving variables from the process environment.
    pub fn new(registry: Arc<EndpointRegistry>, timeouts: Timeouts) -> Self {
        Self::with_env_source(registry, timeouts, Arc::new(ProcessEnv))
    }

    /// Manager resolving variables from `env`.
    pub fn with_env_source(
        registry: Arc<EndpointRegistry>,
        timeouts: Timeouts,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            registry,
            env,
            timeouts,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// The environment view used to resolve required variables.
    pub fn env_source(&self) -> &dyn EnvSource {
        self.env.as_ref()
    }

    /// Spawn `name`, handshake, and return its capability list.
    pub async fn run_discovery(&self, name: &str) -> Result<Vec<CapabilityDescriptor>, GatewayError> {
        let started = Instant::now();
        let mut session = self.open(name)?;

        let result = match self.handshake(&mut session).await {
            Ok(()) => self.bounded(name, session.discover()).await,
            Err(e) => Err(e),
        };

        self.close(session, started, &result).await;
        result
    }

    /// Spawn `name`, handshake, and invoke `capability` with `arguments`.
    pub async fn run_invocation(
        &self,
        name: &str,
        capability: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let started = Instant::now();
        let mut session = self.open(name)?;

        let result = match self.handshake(&mut session).await {
            Ok(()) => {
                self.bounded(name, session.invoke(capability, arguments))
                    .await
            }
            Err(e) => Err(e),
        };

        self.close(session, started, &result).await;
        result
    }

    /// Lookup, resolve and spawn. Nothing is started when a variable is missing.
    fn open(&self, name: &str) -> Result<EndpointSession<'_>, GatewayError> {
        let descriptor = self.registry.lookup(name)?;

        let resolved = environment::resolve(self.env.as_ref(), &descriptor.required_env)
            .map_err(|names| GatewayError::MissingVariables {
                endpoint: name.to_string(),
                names,
            })?;

        EndpointSession::spawn(descriptor, &resolved).map_err(|e| {
            tracing::warn!(endpoint = name, error = %e, "failed to spawn server");
            e
        })
    }

    /// The initialize handshake under `init`.
    async fn handshake(&self, session: &mut EndpointSession<'_>) -> Result<(), GatewayError> {
        let endpoint = session.descriptor().name.clone();
        tokio::time::timeout(self.timeouts.init, session.handshake())
            .await
            .map_err(|_| GatewayError::HandshakeTimeout {
                endpoint,
                timeout: self.timeouts.init,
            })?
            .map(|_| ())
    }

    /// One exchange under `operation`.
    async fn bounded<T>(
        &self,
        endpoint: &str,
        exchange: impl std::future::Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout(self.timeouts.operation, exchange)
            .await
            .map_err(|_| GatewayError::OperationTimeout {
                endpoint: endpoint.to_string(),
                timeout: self.timeouts.operation,
            })?
    }

    /// Graceful shutdown after success, immediate kill after failure.
    async fn close<T>(
        &self,
        session: EndpointSession<'_>,
        started: Instant,
        result: &Result<T, GatewayError>,
    ) {
        let name = session.descriptor().name.clone();
        let pid = session.pid();

        match result {
            Ok(_) => {
                let status = session.shutdown(self.timeouts.shutdown_grace).await;
                tracing::info!(
                    endpoint = %name,
                    pid,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    exit = ?status,
                    "session complete"
                );
            }
            Err(e) => {
                let status = session.terminate(e).await;
                tracing::warn!(
                    endpoint = %name,
                    pid,
                    kind = e.kind(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    exit = ?status,
                    "session failed"
                );
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
