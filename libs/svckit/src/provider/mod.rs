//! Resource provider contracts.
//!
//! The framework never provisions anything itself. Each external collaborator
//! (workload platform, messaging, secret store, datastore, load balancer, logs)
//! is a trait; extensions reach them through [`Providers`] during their hooks.
//! Every call is synchronous and either succeeds or fails before the next
//! phase proceeds.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::NetworkRef;
use crate::workload::{HealthCheck, IngressRule, NetworkIdentity, ServiceDescriptor, WorkloadHandle};

pub mod memory;
pub use memory::{Grant, InMemoryProvider, ProviderCall};

/// A provider rejected a request. The message is surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} rejected {operation}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub operation: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Discovery namespace attached to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceHandle {
    pub id: String,
    pub name: String,
}

/// Reference to a secret. Only the address travels; the value stays in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl SecretRef {
    /// Reference one JSON field of the secret instead of the whole document.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Pub/sub topic an extension publishes to or subscribes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRef {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHandle {
    pub name: String,
    pub address: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
    pub queue: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreHandle {
    pub identifier: String,
    pub hostname: String,
    pub port: u16,
    pub network_identity: NetworkIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerHandle {
    pub name: String,
    pub dns_name: String,
    pub listener_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogGroupHandle {
    pub name: String,
    pub retention_days: u32,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRequest {
    pub name: String,
    pub retention: Option<Duration>,
}

/// Ask the store to generate a credential document `{ <username_key>: username, <generate_key>: <random> }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSecretRequest {
    pub name: String,
    pub username: String,
    pub generate_key: String,
    pub exclude_characters: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreRequest {
    pub name: String,
    pub engine: String,
    pub database_name: String,
    pub port: u16,
    pub network: NetworkRef,
    pub credentials: SecretRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerRequest {
    pub name: String,
    pub network: NetworkRef,
    pub internet_facing: bool,
    pub listener_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistration {
    pub target_group: String,
    pub port: u16,
    pub deregistration_delay: Duration,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogGroupRequest {
    pub name: String,
    pub retention_days: u32,
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Container platform: namespaces, workloads and network grants.
pub trait WorkloadPlatform: Send + Sync {
    fn create_namespace(&self, network: &NetworkRef, name: &str) -> ProviderResult<NamespaceHandle>;

    fn create_workload(&self, descriptor: &ServiceDescriptor) -> ProviderResult<WorkloadHandle>;

    /// Append environment entries to an already created workload.
    fn patch_environment(
        &self,
        workload: &WorkloadHandle,
        entries: &[(String, String)],
    ) -> ProviderResult<()>;

    /// Allow `rule.source` to reach `target`. Re-issuing an existing rule is a no-op.
    fn grant_ingress(&self, target: &NetworkIdentity, rule: &IngressRule) -> ProviderResult<()>;
}

/// Queue and pub/sub topic provider.
pub trait MessagingProvider: Send + Sync {
    fn create_topic(&self, name: &str) -> ProviderResult<TopicRef>;

    fn provision_queue(&self, request: &QueueRequest) -> ProviderResult<QueueHandle>;

    fn subscribe(&self, queue: &QueueHandle, topic: &TopicRef) -> ProviderResult<SubscriptionHandle>;

    fn grant_publish(&self, topic: &TopicRef, identity: &NetworkIdentity) -> ProviderResult<()>;

    fn grant_consume(&self, queue: &QueueHandle, identity: &NetworkIdentity) -> ProviderResult<()>;
}

pub trait SecretStore: Send + Sync {
    fn generate_secret(&self, request: &GeneratedSecretRequest) -> ProviderResult<SecretRef>;

    fn lookup_secret(&self, name: &str) -> ProviderResult<SecretRef>;

    fn grant_read(&self, secret: &SecretRef, identity: &NetworkIdentity) -> ProviderResult<()>;
}

pub trait DatastoreProvider: Send + Sync {
    fn provision_datastore(&self, request: &DatastoreRequest) -> ProviderResult<DatastoreHandle>;
}

pub trait LoadBalancerProvider: Send + Sync {
    fn provision_load_balancer(
        &self,
        request: &LoadBalancerRequest,
    ) -> ProviderResult<LoadBalancerHandle>;

    fn register_target(
        &self,
        load_balancer: &LoadBalancerHandle,
        workload: &WorkloadHandle,
        registration: &TargetRegistration,
    ) -> ProviderResult<()>;
}

pub trait LogProvider: Send + Sync {
    fn provision_log_group(&self, request: &LogGroupRequest) -> ProviderResult<LogGroupHandle>;
}

/// One handle per provider contract, cloned cheaply into every service.
#[derive(Clone)]
pub struct Providers {
    pub platform: Arc<dyn WorkloadPlatform>,
    pub messaging: Arc<dyn MessagingProvider>,
    pub secrets: Arc<dyn SecretStore>,
    pub datastores: Arc<dyn DatastoreProvider>,
    pub load_balancers: Arc<dyn LoadBalancerProvider>,
    pub logs: Arc<dyn LogProvider>,
}

impl Providers {
    /// Fill every contract from one implementation.
    pub fn shared<P>(provider: Arc<P>) -> Self
    where
        P: WorkloadPlatform
            + MessagingProvider
            + SecretStore
            + DatastoreProvider
            + LoadBalancerProvider
            + LogProvider
            + 'static,
    {
        Self {
            platform: provider.clone(),
            messaging: provider.clone(),
            secrets: provider.clone(),
            datastores: provider.clone(),
            load_balancers: provider.clone(),
            logs: provider,
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
