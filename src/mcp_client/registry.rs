//! Endpoint registry — the immutable table of endpoint descriptors.
//!
//! Built once at startup and shared as `Arc<EndpointRegistry>`. There is no
//! mutation API: two concurrent calls against the same name always observe
//! the same launch parameters.

use std::collections::HashMap;

use super::errors::{ConfigError, GatewayError};
use super::types::{EndpointDescriptor, EndpointSummary};

/// Validated, read-only mapping from endpoint name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    /// Descriptors in registration order.
    endpoints: Vec<EndpointDescriptor>,
    /// `name → index into endpoints`.
    index: HashMap<String, usize>,
}

impl EndpointRegistry {
    /// Build a registry, rejecting duplicate names and empty commands.
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(endpoints.len());

        for (i, endpoint) in endpoints.iter().enumerate() {
            if endpoint.name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if endpoint.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand {
                    name: endpoint.name.clone(),
                });
            }
            if index.insert(endpoint.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateName {
                    name: endpoint.name.clone(),
                });
            }
        }

        Ok(Self { endpoints, index })
    }

    /// Look up a descriptor by endpoint name.
    pub fn lookup(&self, name: &str) -> Result<&EndpointDescriptor, GatewayError> {
        self.index
            .get(name)
            .and_then(|&i| self.endpoints.get(i))
            .ok_or_else(|| GatewayError::NotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// `(name, description)` for every endpoint, in registration order.
    pub fn list_all(&self) -> Vec<EndpointSummary> {
        self.endpoints
            .iter()
            .map(|e| EndpointSummary {
                name: e.name.clone(),
                description: e.description.clone(),
            })
            .collect()
    }

    /// All endpoint descriptors, in registration order.
    pub fn descriptors(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// Endpoint names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> EndpointDescriptor {
        EndpointDescriptor::new("echo", "echo-mcp", &[], "test endpoint")
    }

    #[test]
    fn test_lookup_and_list() {
        let registry = EndpointRegistry::new(vec![
            echo(),
            EndpointDescriptor::new("alpha", "npx", &["-y", "alpha-mcp"], "Alpha"),
        ])
        .unwrap();

        assert_eq!(registry.lookup("echo").unwrap().command, "echo-mcp");
        assert_eq!(
            registry.list_all(),
            vec![
                EndpointSummary {
                    name: "echo".into(),
                    description: "test endpoint".into(),
                },
                EndpointSummary {
                    name: "alpha".into(),
                    description: "Alpha".into(),
                },
            ]
        );
    }

    #[test]
    fn test_lookup_unknown_is_not_found() {
        let registry = EndpointRegistry::new(vec![echo()]).unwrap();
        match registry.lookup("unknown") {
            Err(GatewayError::NotFound { name, available }) => {
                assert_eq!(name, "unknown");
                assert_eq!(available, vec!["echo"]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = EndpointRegistry::new(vec![echo(), echo()]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { name } if name == "echo"));
    }

    #[test]
    fn test_rejects_empty_command() {
        let blank = EndpointDescriptor::new("blank", "  ", &[], "no command");
        let err = EndpointRegistry::new(vec![blank]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCommand { name } if name == "blank"));
    }

    #[test]
    fn test_rejects_empty_name() {
        let nameless = EndpointDescriptor::new("", "echo-mcp", &[], "");
        assert!(matches!(
            EndpointRegistry::new(vec![nameless]),
            Err(ConfigError::EmptyName)
        ));
    }

    #[test]
    fn test_empty_registry() {
        let registry = EndpointRegistry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.list_all().is_empty());
    }
}
