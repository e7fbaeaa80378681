//! Environment - shared deployment-domain context for every service built in it

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::provider::{NamespaceHandle, ProviderResult};

/// Handle to the network (VPC equivalent) services are placed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkRef(pub String);

/// Handle to the compute cluster workloads are scheduled on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterRef(pub String);

/// Shared context injected into every service build.
///
/// Read-only once created, except for the discovery namespace which is set at
/// most once (first writer wins) by [`Environment::ensure_namespace`].
/// Shared by reference (`Arc<Environment>`) across all services built in it.
#[derive(Debug)]
pub struct Environment {
    id: String,
    network: NetworkRef,
    cluster: ClusterRef,
    namespace: OnceLock<NamespaceHandle>,
}

impl Environment {
    pub fn new(id: impl Into<String>, network: NetworkRef, cluster: ClusterRef) -> Self {
        Self {
            id: id.into(),
            network,
            cluster,
            namespace: OnceLock::new(),
        }
    }

    /// Seed an existing namespace, e.g. one imported from a shared-resources deployment.
    pub fn with_namespace(self, namespace: NamespaceHandle) -> Self {
        let _ = self.namespace.set(namespace);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn network(&self) -> &NetworkRef {
        &self.network
    }

    pub fn cluster(&self) -> &ClusterRef {
        &self.cluster
    }

    pub fn discovery_namespace(&self) -> Option<&NamespaceHandle> {
        self.namespace.get()
    }

    /// Return the discovery namespace, creating it with `create` if absent.
    ///
    /// `create` runs only when no namespace is attached yet. Builds are not
    /// concurrent, so the check-then-set cannot race; should two callers ever
    /// both create, the first one set is kept.
    pub fn ensure_namespace<F>(&self, create: F) -> ProviderResult<&NamespaceHandle>
    where
        F: FnOnce(&NetworkRef, &str) -> ProviderResult<NamespaceHandle>,
    {
        if let Some(existing) = self.namespace.get() {
            return Ok(existing);
        }
        let created = create(&self.network, &self.id)?;
        tracing::info!(
            environment = %self.id,
            namespace = %created.name,
            "Discovery namespace attached to environment"
        );
        Ok(self.namespace.get_or_init(|| created))
    }

    pub fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            id: self.id.clone(),
            network: self.network.clone(),
            cluster: self.cluster.clone(),
            namespace: self.namespace.get().map(|ns| ns.name.clone()),
        }
    }
}

/// Serializable snapshot of an environment for the deployment manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub id: String,
    pub network: NetworkRef,
    pub cluster: ClusterRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    fn env() -> Environment {
        Environment::new(
            "voting",
            NetworkRef("vpc-1".to_string()),
            ClusterRef("cluster-1".to_string()),
        )
    }

    fn ns(name: &str) -> NamespaceHandle {
        NamespaceHandle {
            id: format!("ns-{name}"),
            name: name.to_string(),
        }
    }

    #[test]
    fn ensure_namespace_creates_once() {
        let env = env();
        let mut calls = 0;

        let first = env
            .ensure_namespace(|_, name| {
                calls += 1;
                Ok(ns(name))
            })
            .unwrap()
            .clone();
        let second = env
            .ensure_namespace(|_, _| {
                calls += 1;
                Ok(ns("other"))
            })
            .unwrap()
            .clone();

        assert_eq!(calls, 1);
        assert_eq!(first, second);
        assert_eq!(first.name, "voting");
    }

    #[test]
    fn seeded_namespace_is_never_replaced() {
        let env = env().with_namespace(ns("voting-app.local"));
        let got = env
            .ensure_namespace(|_, _| panic!("must not create a namespace"))
            .unwrap();
        assert_eq!(got.name, "voting-app.local");
    }

    #[test]
    fn failed_creation_leaves_namespace_unset() {
        let env = env();
        let err = env
            .ensure_namespace(|_, _| Err(ProviderError::new("memory", "create_namespace", "denied")))
            .unwrap_err();
        assert_eq!(err.message, "denied");
        assert!(env.discovery_namespace().is_none());
    }
}
