use std::any::Any;

use anyhow::Context;
use svckit::provider::NamespaceHandle;
use svckit::{
    peer_endpoint_env_key, BuildProps, Capability, Connectable, ConnectionPlan, ContainerSpec,
    DiscoveryRegistration, Extension, PeerEndpoint, PrehookCtx, ServiceId,
};

use crate::config::DiscoveryConfig;

/// Environment variable carrying the discovery namespace name.
pub const DISCOVERY_ENDPOINT_ENV: &str = "SERVICE_DISCOVERY_ENDPOINT";

/// Registers the workload in the environment's discovery namespace and lets
/// the service take part in `connect_to`.
#[derive(Debug, Default)]
pub struct ServiceDiscoveryBinding {
    config: DiscoveryConfig,
    service: Option<ServiceId>,
    namespace: Option<NamespaceHandle>,
}

impl ServiceDiscoveryBinding {
    pub const NAME: &'static str = "service-discovery";

    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            service: None,
            namespace: None,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Namespace the service registered in, once the prehook ran.
    pub fn namespace(&self) -> Option<&NamespaceHandle> {
        self.namespace.as_ref()
    }

    fn namespace_name(&self) -> anyhow::Result<&str> {
        self.namespace
            .as_ref()
            .map(|ns| ns.name.as_str())
            .context("discovery namespace was not resolved")
    }
}

impl Extension for ServiceDiscoveryBinding {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capability(&self) -> Capability {
        Capability::Discovery
    }

    fn prehook(&mut self, ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        let platform = &ctx.providers().platform;
        let preferred = self.config.namespace.as_deref();
        let namespace = ctx
            .environment()
            .ensure_namespace(|network, env_id| {
                platform.create_namespace(network, preferred.unwrap_or(env_id))
            })?
            .clone();

        tracing::debug!(namespace = %namespace.name, service = ctx.service_id(), "Discovery namespace resolved");
        self.service = Some(ctx.service_id().to_string());
        self.namespace = Some(namespace);
        Ok(())
    }

    fn mutate_container_definition(&self, draft: ContainerSpec) -> anyhow::Result<ContainerSpec> {
        Ok(draft.with_env(DISCOVERY_ENDPOINT_ENV, self.namespace_name()?))
    }

    fn modify_build_props(&self, mut props: BuildProps) -> anyhow::Result<BuildProps> {
        let record_name = self
            .config
            .record_name
            .clone()
            .or_else(|| self.service.clone())
            .context("service id was not recorded before registration")?;

        props.discovery = Some(DiscoveryRegistration {
            namespace: self.namespace_name()?.to_string(),
            record_name,
            record_type: self.config.record_type,
            ttl: self.config.ttl,
            failure_threshold: self.config.failure_threshold,
        });
        Ok(props)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_connectable(&self) -> Option<&dyn Connectable> {
        Some(self)
    }
}

impl Connectable for ServiceDiscoveryBinding {
    fn plan_connection(&self, peer: &PeerEndpoint<'_>) -> ConnectionPlan {
        if !self.config.inject_peer_endpoint {
            return ConnectionPlan::network_only();
        }
        let endpoint = match (peer.advertised, &self.namespace) {
            (Some(advertised), _) => advertised.to_string(),
            (None, Some(ns)) => format!("{}.{}:{}", peer.service_id, ns.name, peer.traffic_port),
            (None, None) => format!("{}:{}", peer.service_id, peer.traffic_port),
        };
        ConnectionPlan::with_config(vec![(peer_endpoint_env_key(peer.service_id), endpoint)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svckit::ConnectionKind;

    fn bound(namespace: &str) -> ServiceDiscoveryBinding {
        let mut binding = ServiceDiscoveryBinding::default();
        binding.service = Some("vote".to_string());
        binding.namespace = Some(NamespaceHandle {
            id: "ns-1".to_string(),
            name: namespace.to_string(),
        });
        binding
    }

    fn peer(advertised: Option<&str>) -> PeerEndpoint<'_> {
        PeerEndpoint {
            service_id: "api",
            environment_id: "production",
            traffic_port: 8080,
            advertised,
        }
    }

    #[test]
    fn registration_uses_service_id_and_policy() {
        let props = bound("production").modify_build_props(BuildProps::default()).unwrap();
        let reg = props.discovery.unwrap();
        assert_eq!(reg.record_name, "vote");
        assert_eq!(reg.namespace, "production");
        assert_eq!(reg.hostname(), "vote.production");
        assert_eq!(reg.failure_threshold, 2);
    }

    #[test]
    fn plan_prefers_the_advertised_endpoint() {
        let plan = bound("production").plan_connection(&peer(Some("api.production:8080")));
        assert_eq!(plan.kind, ConnectionKind::NetworkAndConfig);
        assert_eq!(
            plan.environment,
            vec![("API_SERVICE_ENDPOINT".to_string(), "api.production:8080".to_string())]
        );
    }

    #[test]
    fn plan_falls_back_to_own_namespace() {
        let plan = bound("voting-app.local").plan_connection(&peer(None));
        assert_eq!(plan.environment[0].1, "api.voting-app.local:8080");
    }

    #[test]
    fn network_only_when_injection_disabled() {
        let mut binding = bound("production");
        binding.config.inject_peer_endpoint = false;
        let plan = binding.plan_connection(&peer(None));
        assert_eq!(plan, ConnectionPlan::network_only());
    }

    #[test]
    fn mutate_before_prehook_fails() {
        let binding = ServiceDiscoveryBinding::default();
        let spec = ContainerSpec {
            image: "img".to_string(),
            cpu: 256,
            memory_mib: 512,
            traffic_port: 8080,
            environment: Default::default(),
            secrets: Default::default(),
            logging: None,
        };
        assert!(binding.mutate_container_definition(spec).is_err());
    }
}
