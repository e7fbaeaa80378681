//! Workload model: the container definition draft, build props and the
//! resolved descriptor handed to the deployment synthesizer.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::SecretRef;

/// Identifier of a service within a deployment.
pub type ServiceId = String;

/// Network identity (security-group equivalent) a workload or resource is reachable through.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkIdentity(pub String);

impl NetworkIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single allow rule: `source` may reach the owner of the rule set on `port` (TCP).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    pub source: NetworkIdentity,
    pub port: u16,
    pub description: String,
}

/// Log driver configuration attached to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfiguration {
    pub driver: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Container definition accumulated across the mutate phase.
///
/// Secrets are carried as references only; a plaintext value never lands here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub traffic_port: u16,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LogConfiguration>,
}

impl ContainerSpec {
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_secret(mut self, key: impl Into<String>, secret: SecretRef) -> Self {
        self.secrets.insert(key.into(), secret);
        self
    }
}

/// HTTP health check policy used by load balancer targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheck {
    #[serde(default = "default_health_check_path")]
    pub path: String,
    #[serde(default = "default_health_check_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_health_check_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: default_health_check_path(),
            interval: default_health_check_interval(),
            timeout: default_health_check_timeout(),
        }
    }
}

fn default_health_check_path() -> String {
    "/".to_string()
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_health_check_timeout() -> Duration {
    Duration::from_secs(2)
}

/// DNS record type used for discovery registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    Srv,
}

/// Registration of the workload in the discovery namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRegistration {
    pub namespace: String,
    pub record_name: String,
    pub record_type: DnsRecordType,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub failure_threshold: u32,
}

impl DiscoveryRegistration {
    /// Fully qualified record, e.g. `api.voting-app.local`.
    pub fn hostname(&self) -> String {
        format!("{}.{}", self.record_name, self.namespace)
    }
}

/// Scaling hints forwarded to the platform; the framework never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingHints {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub target_cpu_percent: Option<u32>,
}

/// Deployment-shape parameters accumulated across the build-props phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProps {
    pub desired_count: u32,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub health_check_grace_period: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryRegistration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<ScalingHints>,
    #[serde(default)]
    pub assign_public_ip: bool,
}

impl Default for BuildProps {
    fn default() -> Self {
        Self {
            desired_count: 1,
            health_check_grace_period: None,
            discovery: None,
            scaling: None,
            assign_public_ip: false,
        }
    }
}

/// Fully resolved service: what the external synthesizer turns into a platform manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service_id: ServiceId,
    pub environment_id: String,
    pub container: ContainerSpec,
    pub props: BuildProps,
}

/// Handle to a workload materialized by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadHandle {
    pub id: String,
    pub network_identity: NetworkIdentity,
}
