//! In-memory provider: records every call and hands out predictable handles.
//!
//! Used as the dry-run planner by the synth binary and as the test double for
//! every provider contract.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{
    DatastoreHandle, DatastoreProvider, DatastoreRequest, GeneratedSecretRequest,
    LoadBalancerHandle, LoadBalancerProvider, LoadBalancerRequest, LogGroupHandle,
    LogGroupRequest, LogProvider, MessagingProvider, NamespaceHandle, ProviderError,
    ProviderResult, QueueHandle, QueueRequest, SecretRef, SecretStore, SubscriptionHandle,
    TargetRegistration, TopicRef, WorkloadPlatform,
};
use crate::environment::NetworkRef;
use crate::workload::{IngressRule, NetworkIdentity, ServiceDescriptor, WorkloadHandle};

const PROVIDER: &str = "memory";

/// One entry of the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: String,
    pub target: String,
}

/// Access granted to a network identity on a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Grant {
    pub action: String,
    pub resource: String,
    pub identity: NetworkIdentity,
}

#[derive(Default)]
pub struct InMemoryProvider {
    seq: AtomicU64,
    calls: Mutex<Vec<ProviderCall>>,
    failures: Mutex<HashMap<String, String>>,
    ingress: DashMap<NetworkIdentity, BTreeSet<IngressRule>>,
    patches: DashMap<String, Vec<(String, String)>>,
    secrets: DashMap<String, SecretRef>,
    grants: Mutex<BTreeSet<Grant>>,
}

impl std::fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryProvider")
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `operation` fail with `message`.
    pub fn fail_on(&self, operation: &str, message: &str) {
        self.failures
            .lock()
            .insert(operation.to_string(), message.to_string());
    }

    /// Register an existing secret so [`SecretStore::lookup_secret`] can resolve it.
    pub fn insert_secret(&self, name: &str) -> SecretRef {
        let secret = SecretRef {
            name: name.to_string(),
            address: format!("arn:memory:secretsmanager:{name}"),
            field: None,
        };
        self.secrets.insert(name.to_string(), secret.clone());
        secret
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, operation: &str) -> Vec<ProviderCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Ingress rules granted on `target`, in rule order.
    pub fn ingress_rules(&self, target: &NetworkIdentity) -> Vec<IngressRule> {
        self.ingress
            .get(target)
            .map(|rules| rules.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Environment entries appended to a workload after creation, in patch order.
    pub fn environment_patches(&self, workload_id: &str) -> Vec<(String, String)> {
        self.patches
            .get(workload_id)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    pub fn grants_for(&self, identity: &NetworkIdentity) -> Vec<Grant> {
        self.grants
            .lock()
            .iter()
            .filter(|g| &g.identity == identity)
            .cloned()
            .collect()
    }

    fn record(&self, operation: &str, target: impl Into<String>) -> ProviderResult<()> {
        let target = target.into();
        tracing::trace!(operation, target = %target, "provider call");
        self.calls.lock().push(ProviderCall {
            operation: operation.to_string(),
            target,
        });
        match self.failures.lock().get(operation) {
            Some(message) => Err(ProviderError::new(PROVIDER, operation, message.clone())),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn grant(&self, action: &str, resource: &str, identity: &NetworkIdentity) {
        self.grants.lock().insert(Grant {
            action: action.to_string(),
            resource: resource.to_string(),
            identity: identity.clone(),
        });
    }
}

impl WorkloadPlatform for InMemoryProvider {
    fn create_namespace(&self, network: &NetworkRef, name: &str) -> ProviderResult<NamespaceHandle> {
        self.record("create_namespace", format!("{}/{name}", network.0))?;
        Ok(NamespaceHandle {
            id: format!("ns-{:04}", self.next_id()),
            name: name.to_string(),
        })
    }

    fn create_workload(&self, descriptor: &ServiceDescriptor) -> ProviderResult<WorkloadHandle> {
        let id = format!("{}/{}", descriptor.environment_id, descriptor.service_id);
        self.record("create_workload", id.clone())?;
        Ok(WorkloadHandle {
            network_identity: NetworkIdentity::new(format!(
                "sg-{}-{}",
                descriptor.environment_id, descriptor.service_id
            )),
            id,
        })
    }

    fn patch_environment(
        &self,
        workload: &WorkloadHandle,
        entries: &[(String, String)],
    ) -> ProviderResult<()> {
        self.record("patch_environment", workload.id.clone())?;
        self.patches
            .entry(workload.id.clone())
            .or_default()
            .extend(entries.iter().cloned());
        Ok(())
    }

    fn grant_ingress(&self, target: &NetworkIdentity, rule: &IngressRule) -> ProviderResult<()> {
        self.record("grant_ingress", target.as_str())?;
        self.ingress
            .entry(target.clone())
            .or_default()
            .insert(rule.clone());
        Ok(())
    }
}

impl MessagingProvider for InMemoryProvider {
    fn create_topic(&self, name: &str) -> ProviderResult<TopicRef> {
        self.record("create_topic", name)?;
        Ok(TopicRef {
            name: name.to_string(),
            address: format!("arn:memory:sns:{name}"),
        })
    }

    fn provision_queue(&self, request: &QueueRequest) -> ProviderResult<QueueHandle> {
        self.record("provision_queue", request.name.clone())?;
        Ok(QueueHandle {
            name: request.name.clone(),
            address: format!("arn:memory:sqs:{}", request.name),
            url: format!("https://sqs.memory.local/{}", request.name),
        })
    }

    fn subscribe(&self, queue: &QueueHandle, topic: &TopicRef) -> ProviderResult<SubscriptionHandle> {
        self.record("subscribe", format!("{}->{}", topic.name, queue.name))?;
        Ok(SubscriptionHandle {
            id: format!("sub-{:04}", self.next_id()),
            queue: queue.address.clone(),
            topic: topic.address.clone(),
        })
    }

    fn grant_publish(&self, topic: &TopicRef, identity: &NetworkIdentity) -> ProviderResult<()> {
        self.record("grant_publish", topic.address.clone())?;
        self.grant("publish", &topic.address, identity);
        Ok(())
    }

    fn grant_consume(&self, queue: &QueueHandle, identity: &NetworkIdentity) -> ProviderResult<()> {
        self.record("grant_consume", queue.address.clone())?;
        self.grant("consume", &queue.address, identity);
        Ok(())
    }
}

impl SecretStore for InMemoryProvider {
    fn generate_secret(&self, request: &GeneratedSecretRequest) -> ProviderResult<SecretRef> {
        self.record("generate_secret", request.name.clone())?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let secret = SecretRef {
            name: request.name.clone(),
            address: format!("arn:memory:secretsmanager:{}-{}", request.name, &suffix[..6]),
            field: None,
        };
        self.secrets.insert(request.name.clone(), secret.clone());
        Ok(secret)
    }

    fn lookup_secret(&self, name: &str) -> ProviderResult<SecretRef> {
        self.record("lookup_secret", name)?;
        self.secrets
            .get(name)
            .map(|s| s.value().clone())
            .ok_or_else(|| ProviderError::new(PROVIDER, "lookup_secret", format!("secret '{name}' not found")))
    }

    fn grant_read(&self, secret: &SecretRef, identity: &NetworkIdentity) -> ProviderResult<()> {
        self.record("grant_read", secret.address.clone())?;
        self.grant("read", &secret.address, identity);
        Ok(())
    }
}

impl DatastoreProvider for InMemoryProvider {
    fn provision_datastore(&self, request: &DatastoreRequest) -> ProviderResult<DatastoreHandle> {
        self.record("provision_datastore", request.name.clone())?;
        Ok(DatastoreHandle {
            identifier: request.name.clone(),
            hostname: format!("{}.cluster.{}.memory.local", request.name, request.network.0),
            port: request.port,
            network_identity: NetworkIdentity::new(format!("sg-{}", request.name)),
        })
    }
}

impl LoadBalancerProvider for InMemoryProvider {
    fn provision_load_balancer(
        &self,
        request: &LoadBalancerRequest,
    ) -> ProviderResult<LoadBalancerHandle> {
        self.record("provision_load_balancer", request.name.clone())?;
        Ok(LoadBalancerHandle {
            name: request.name.clone(),
            dns_name: format!("{}.elb.memory.local", request.name),
            listener_port: request.listener_port,
        })
    }

    fn register_target(
        &self,
        load_balancer: &LoadBalancerHandle,
        workload: &WorkloadHandle,
        registration: &TargetRegistration,
    ) -> ProviderResult<()> {
        self.record(
            "register_target",
            format!("{}/{}->{}", load_balancer.name, registration.target_group, workload.id),
        )
    }
}

impl LogProvider for InMemoryProvider {
    fn provision_log_group(&self, request: &LogGroupRequest) -> ProviderResult<LogGroupHandle> {
        self.record("provision_log_group", request.name.clone())?;
        Ok(LogGroupHandle {
            name: request.name.clone(),
            retention_days: request.retention_days,
        })
    }
}
