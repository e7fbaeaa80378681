//! Service - a built workload plus the description it was built from

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::connection::{Connection, PeerEndpoint};
use crate::contracts::Extension;
use crate::description::ServiceDescription;
use crate::environment::Environment;
use crate::error::{BuildError, BuildResult};
use crate::provider::Providers;
use crate::workload::{IngressRule, NetworkIdentity, ServiceDescriptor, ServiceId, WorkloadHandle};

/// A service produced by [`crate::ServiceBuilder::build`].
///
/// After the build the only mutations are connection calls, which append
/// ingress rules (on the target) and environment entries (on the caller).
pub struct Service {
    id: ServiceId,
    environment: Arc<Environment>,
    description: ServiceDescription,
    workload: WorkloadHandle,
    descriptor: ServiceDescriptor,
    ingress: BTreeSet<IngressRule>,
    connections: Vec<Connection>,
    outputs: BTreeMap<String, String>,
    providers: Providers,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("environment", &self.environment.id())
            .field("description", &self.description)
            .field("workload", &self.workload)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub(crate) fn new(
        id: ServiceId,
        environment: Arc<Environment>,
        description: ServiceDescription,
        workload: WorkloadHandle,
        descriptor: ServiceDescriptor,
        outputs: BTreeMap<String, String>,
        providers: Providers,
    ) -> Self {
        Self {
            id,
            environment,
            description,
            workload,
            descriptor,
            ingress: BTreeSet::new(),
            connections: Vec::new(),
            outputs,
            providers,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn description(&self) -> &ServiceDescription {
        &self.description
    }

    /// Look up one of the extensions the service was built with.
    pub fn extension(&self, name: &str) -> Option<&dyn Extension> {
        self.description.get(name)
    }

    pub fn extension_as<T: Extension>(&self, name: &str) -> Option<&T> {
        self.description.get_as(name)
    }

    pub fn workload(&self) -> &WorkloadHandle {
        &self.workload
    }

    pub fn network_identity(&self) -> &NetworkIdentity {
        &self.workload.network_identity
    }

    pub fn traffic_port(&self) -> u16 {
        self.descriptor.container.traffic_port
    }

    /// The resolved container definition and build props, including
    /// entries appended after creation and by connections.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Rules allowing other services to reach this one.
    pub fn ingress_rules(&self) -> &BTreeSet<IngressRule> {
        &self.ingress
    }

    /// Outgoing connections opened by [`Service::connect_to`].
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Build outputs recorded by extensions (DNS names, queue URLs, ...).
    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    /// Allow this service to call `peer`, and inject the peer's endpoint if
    /// this service's connectable extension asks for it.
    ///
    /// Both services need a connectable extension and must live in the same
    /// environment; on failure nothing is granted. Connecting the same peer a
    /// second time returns the existing connection without side effects; a
    /// different peer that happens to share the id gets its own grant.
    pub fn connect_to(&mut self, peer: &mut Service) -> BuildResult<Connection> {
        let caller_ext = self
            .description
            .find_connectable()
            .ok_or_else(|| BuildError::NoDiscoveryCapability {
                service: self.id.clone(),
            })?;
        let target_ext = peer
            .description
            .find_connectable()
            .ok_or_else(|| BuildError::NoDiscoveryCapability {
                service: peer.id.clone(),
            })?;

        if self.environment.id() != peer.environment.id() {
            return Err(BuildError::CrossEnvironment {
                from: self.id.clone(),
                from_env: self.environment.id().to_string(),
                to: peer.id.clone(),
                to_env: peer.environment.id().to_string(),
            });
        }

        // An edge exists only if this peer already holds our ingress rule.
        let rule = IngressRule {
            source: self.workload.network_identity.clone(),
            port: peer.traffic_port(),
            description: format!("Accept inbound traffic from {}", self.id),
        };
        if peer.ingress.contains(&rule) {
            if let Some(existing) = self.connections.iter().find(|c| c.to == peer.id) {
                tracing::debug!(from = %self.id, to = %peer.id, "Connection already exists");
                return Ok(existing.clone());
            }
        }

        let (Some(caller), Some(target)) = (caller_ext.as_connectable(), target_ext.as_connectable())
        else {
            return Err(BuildError::NoDiscoveryCapability {
                service: self.id.clone(),
            });
        };
        let extension = caller_ext.name().to_string();

        let advertised = target.advertise(&peer.descriptor);
        let endpoint = PeerEndpoint {
            service_id: &peer.id,
            environment_id: peer.environment.id(),
            traffic_port: peer.traffic_port(),
            advertised: advertised.as_deref(),
        };
        let plan = caller.plan_connection(&endpoint);

        let current = &self.descriptor.container.environment;
        if let Some((key, _)) = plan
            .environment
            .iter()
            .find(|(key, value)| current.get(key).is_some_and(|v| v != value))
        {
            return Err(BuildError::PatchOverwrite {
                extension,
                key: key.clone(),
            });
        }
        // Entries already holding the planned value need no patch.
        let patch: Vec<(String, String)> = plan
            .environment
            .iter()
            .filter(|(key, _)| !current.contains_key(key))
            .cloned()
            .collect();

        self.providers
            .platform
            .grant_ingress(&peer.workload.network_identity, &rule)
            .map_err(|source| BuildError::Provisioning {
                extension: extension.clone(),
                source,
            })?;
        peer.ingress.insert(rule);

        if !patch.is_empty() {
            self.providers
                .platform
                .patch_environment(&self.workload, &patch)
                .map_err(|source| BuildError::Provisioning {
                    extension: extension.clone(),
                    source,
                })?;
            self.descriptor
                .container
                .environment
                .extend(patch);
        }

        let connection = Connection {
            from: self.id.clone(),
            to: peer.id.clone(),
            port: peer.traffic_port(),
            kind: plan.kind,
        };
        tracing::info!(
            from = %connection.from,
            to = %connection.to,
            port = connection.port,
            kind = ?connection.kind,
            "Services connected"
        );
        self.connections.push(connection.clone());
        Ok(connection)
    }
}
