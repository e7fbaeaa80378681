//! Extension contracts.
//!
//! An extension contributes to one service build through fixed hooks. The
//! builder invokes every hook of a phase for all extensions, in registration
//! order, before advancing to the next phase:
//!
//! prehook → mutate_container_definition → modify_build_props → (create workload)
//! → patch_after_create → post_hook

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connection::{ConnectionPlan, PeerEndpoint};
use crate::environment::Environment;
use crate::error::BuildError;
use crate::provider::Providers;
use crate::workload::{BuildProps, ContainerSpec, ServiceDescriptor, WorkloadHandle};

/// Capability tag an extension reports; used for typed lookups instead of name casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Container,
    Discovery,
    LoadBalancer,
    Queue,
    Topics,
    Database,
    Secrets,
    Logs,
    Custom,
}

/// A pluggable capability unit. Every hook is optional.
pub trait Extension: Send + Sync + 'static {
    /// Unique name within a service description.
    fn name(&self) -> &str;

    fn capability(&self) -> Capability {
        Capability::Custom
    }

    /// Runs before the workload exists. Provision owned resources and record handles here.
    /// Must not assume other extensions' prehooks have run.
    fn prehook(&mut self, _ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Pure transformation of the container definition; chained left to right.
    fn mutate_container_definition(&self, draft: ContainerSpec) -> anyhow::Result<ContainerSpec> {
        Ok(draft)
    }

    /// Pure transformation of the build props; chained left to right.
    fn modify_build_props(&self, props: BuildProps) -> anyhow::Result<BuildProps> {
        Ok(props)
    }

    /// Environment entries only knowable once the workload exists. Append-only:
    /// returning a key that is already set fails the build.
    fn patch_after_create(&self) -> anyhow::Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    /// Runs once the workload exists.
    fn post_hook(&mut self, _ctx: &mut PostHookCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    /// Return self as a [`Connectable`] if this extension can link services.
    fn as_connectable(&self) -> Option<&dyn Connectable> {
        None
    }
}

/// Networking capability used by the connection protocol.
///
/// Both sides of a connection must expose one; the caller side plans the
/// config injection, the peer side advertises how it is reached.
pub trait Connectable: Send + Sync {
    /// Endpoint peers should use to reach this service, if it is discoverable.
    fn advertise(&self, descriptor: &ServiceDescriptor) -> Option<String> {
        descriptor
            .props
            .discovery
            .as_ref()
            .map(|d| format!("{}:{}", d.hostname(), descriptor.container.traffic_port))
    }

    /// Plan the caller side of a connection to `peer`.
    fn plan_connection(&self, peer: &PeerEndpoint<'_>) -> ConnectionPlan;
}

/// Read-only view over the other extensions of the description being built.
#[derive(Clone, Copy)]
pub struct Peers<'a> {
    before: &'a [Box<dyn Extension>],
    after: &'a [Box<dyn Extension>],
}

impl<'a> Peers<'a> {
    pub(crate) fn new(before: &'a [Box<dyn Extension>], after: &'a [Box<dyn Extension>]) -> Self {
        Self { before, after }
    }

    pub fn get(&self, name: &str) -> Option<&'a dyn Extension> {
        self.before
            .iter()
            .chain(self.after.iter())
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    pub fn get_as<T: Extension>(&self, name: &str) -> Option<&'a T> {
        self.get(name).and_then(|e| e.as_any().downcast_ref::<T>())
    }

    pub fn find(&self, capability: Capability) -> Option<&'a dyn Extension> {
        self.before
            .iter()
            .chain(self.after.iter())
            .find(|e| e.capability() == capability)
            .map(|e| e.as_ref())
    }

    /// Look up a required peer, failing with a dependency error naming both sides.
    pub fn require(&self, requester: &str, name: &str) -> Result<&'a dyn Extension, BuildError> {
        self.get(name).ok_or_else(|| BuildError::MissingDependency {
            extension: requester.to_string(),
            requires: name.to_string(),
        })
    }
}

/// Context handed to prehooks.
pub struct PrehookCtx<'a> {
    pub(crate) service_id: &'a str,
    pub(crate) environment: &'a Arc<Environment>,
    pub(crate) providers: &'a Providers,
    pub(crate) peers: Peers<'a>,
    pub(crate) outputs: &'a mut BTreeMap<String, String>,
}

impl<'a> PrehookCtx<'a> {
    pub fn service_id(&self) -> &'a str {
        self.service_id
    }

    pub fn environment(&self) -> &'a Arc<Environment> {
        self.environment
    }

    pub fn providers(&self) -> &'a Providers {
        self.providers
    }

    pub fn peers(&self) -> Peers<'a> {
        self.peers
    }

    /// Name for a resource owned by this service, e.g. `api-load-balancer`.
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.service_id, suffix)
    }

    /// Record a build output (DNS name, queue URL, ...).
    pub fn add_output(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.outputs.insert(key.into(), value.into());
    }
}

/// Context handed to post-hooks, once the workload exists.
pub struct PostHookCtx<'a> {
    pub(crate) service_id: &'a str,
    pub(crate) environment: &'a Arc<Environment>,
    pub(crate) providers: &'a Providers,
    pub(crate) peers: Peers<'a>,
    pub(crate) workload: &'a WorkloadHandle,
    pub(crate) descriptor: &'a ServiceDescriptor,
    pub(crate) outputs: &'a mut BTreeMap<String, String>,
}

impl<'a> PostHookCtx<'a> {
    pub fn service_id(&self) -> &'a str {
        self.service_id
    }

    pub fn environment(&self) -> &'a Arc<Environment> {
        self.environment
    }

    pub fn providers(&self) -> &'a Providers {
        self.providers
    }

    pub fn peers(&self) -> Peers<'a> {
        self.peers
    }

    pub fn workload(&self) -> &'a WorkloadHandle {
        self.workload
    }

    /// The resolved descriptor the workload was created from.
    pub fn descriptor(&self) -> &'a ServiceDescriptor {
        self.descriptor
    }

    pub fn add_output(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.outputs.insert(key.into(), value.into());
    }
}
