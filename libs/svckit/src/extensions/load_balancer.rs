use std::any::Any;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::contracts::{Capability, Extension, PostHookCtx, PrehookCtx};
use crate::provider::{LoadBalancerHandle, LoadBalancerRequest, TargetRegistration};
use crate::workload::{BuildProps, HealthCheck};

/// Output key carrying the public DNS name of the load balancer.
pub const LOAD_BALANCER_DNS_OUTPUT: &str = "load-balancer-dns";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerOptions {
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,
    #[serde(default = "default_internet_facing")]
    pub internet_facing: bool,
    #[serde(default)]
    pub health_check: HealthCheck,
    /// Time a fresh task gets before failing health checks count against it.
    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,
    /// Time in-flight requests get to drain before a target is removed.
    #[serde(default = "default_deregistration_delay", with = "humantime_serde")]
    pub deregistration_delay: Duration,
}

impl Default for LoadBalancerOptions {
    fn default() -> Self {
        Self {
            listener_port: default_listener_port(),
            internet_facing: default_internet_facing(),
            health_check: HealthCheck::default(),
            grace_period: default_grace_period(),
            deregistration_delay: default_deregistration_delay(),
        }
    }
}

fn default_listener_port() -> u16 {
    80
}

fn default_internet_facing() -> bool {
    true
}

fn default_grace_period() -> Duration {
    Duration::from_secs(60)
}

fn default_deregistration_delay() -> Duration {
    Duration::from_secs(10)
}

/// Public HTTP listener in front of the service.
#[derive(Debug, Default)]
pub struct LoadBalancerFront {
    options: LoadBalancerOptions,
    handle: Option<LoadBalancerHandle>,
}

impl LoadBalancerFront {
    pub const NAME: &'static str = "load-balancer";

    pub fn new(options: LoadBalancerOptions) -> Self {
        Self {
            options,
            handle: None,
        }
    }

    pub fn options(&self) -> &LoadBalancerOptions {
        &self.options
    }

    /// Public DNS name, once provisioned.
    pub fn dns_name(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.dns_name.as_str())
    }
}

impl Extension for LoadBalancerFront {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capability(&self) -> Capability {
        Capability::LoadBalancer
    }

    fn prehook(&mut self, ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        let request = LoadBalancerRequest {
            name: ctx.resource_name("lb"),
            network: ctx.environment().network().clone(),
            internet_facing: self.options.internet_facing,
            listener_port: self.options.listener_port,
        };
        let handle = ctx.providers().load_balancers.provision_load_balancer(&request)?;
        tracing::debug!(dns = %handle.dns_name, "Load balancer provisioned");
        ctx.add_output(LOAD_BALANCER_DNS_OUTPUT, handle.dns_name.clone());
        self.handle = Some(handle);
        Ok(())
    }

    fn modify_build_props(&self, mut props: BuildProps) -> anyhow::Result<BuildProps> {
        props.health_check_grace_period = Some(self.options.grace_period);
        Ok(props)
    }

    fn post_hook(&mut self, ctx: &mut PostHookCtx<'_>) -> anyhow::Result<()> {
        let handle = self
            .handle
            .as_ref()
            .context("load balancer was not provisioned before target registration")?;
        let registration = TargetRegistration {
            target_group: format!("{}-targets", ctx.service_id()),
            port: ctx.descriptor().container.traffic_port,
            deregistration_delay: self.options.deregistration_delay,
            health_check: self.options.health_check.clone(),
        };
        ctx.providers()
            .load_balancers
            .register_target(handle, ctx.workload(), &registration)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
