//! The voting application: four services in one environment, wired through discovery.

use anyhow::{Context, Result};
use std::sync::Arc;

use api_database::{DatabaseBinding, DatabaseConfig};
use service_discovery::{DiscoveryConfig, ServiceDiscoveryBinding};
use svckit::extensions::{
    ContainerDefinition, LoadBalancerFront, LoadBalancerOptions, LogOptions, LogShipper,
    QueueBinding, QueueOptions, TopicInjector, TopicOptions,
};
use svckit::{Deployment, DeploymentManifest, InMemoryProvider, Providers, ServiceDescription};
use svckit_bootstrap::{extension_config_typed, AppConfig, AppConfigProvider, OutputFormat};

/// Logical key of the topic the vote service publishes ballots to.
pub const EVENTS_TOPIC: &str = "events";

/// Extension options read once from the configuration bag.
struct Options {
    load_balancer: LoadBalancerOptions,
    logs: LogOptions,
    discovery: DiscoveryConfig,
    database: DatabaseConfig,
    topics: TopicOptions,
    queue: QueueOptions,
}

impl Options {
    fn load(provider: &AppConfigProvider) -> Result<Self> {
        Ok(Self {
            load_balancer: extension_config_typed(provider, LoadBalancerFront::NAME)?,
            logs: extension_config_typed(provider, LogShipper::NAME)?,
            discovery: extension_config_typed(provider, ServiceDiscoveryBinding::NAME)?,
            database: extension_config_typed(provider, DatabaseBinding::NAME)?,
            topics: extension_config_typed(provider, TopicInjector::NAME)?,
            queue: extension_config_typed(provider, "queue")?,
        })
    }

    fn discovery(&self) -> ServiceDiscoveryBinding {
        ServiceDiscoveryBinding::new(self.discovery.clone())
    }

    fn logs(&self) -> LogShipper {
        LogShipper::new(self.logs.clone())
    }
}

/// Build every service of the voting application and connect the front ends to the api.
pub fn synthesize(config: &AppConfig, provider: Arc<InMemoryProvider>) -> Result<Deployment> {
    let config_provider = AppConfigProvider::new(config.clone());
    let options = Options::load(&config_provider)?;

    let mut deployment = Deployment::new(Providers::shared(provider));
    let env = deployment.add_environment(config.environment.to_environment())?;
    let env_id = env.id().to_string();
    tracing::info!(environment = %env_id, "Synthesizing voting application");

    let mut api = ServiceDescription::new();
    api.add(ContainerDefinition::new("voting/api:latest", 256, 512, 8080))?
        .add(options.logs())?
        .add(DatabaseBinding::new(options.database.clone()))?
        .add(options.discovery())?;
    deployment.build_service("api", &env_id, api)?;

    let mut topics = options.topics.clone();
    topics
        .create
        .entry(EVENTS_TOPIC.to_string())
        .or_insert_with(|| format!("{env_id}-events"));
    let mut vote = ServiceDescription::new();
    vote.add(ContainerDefinition::new("voting/vote:latest", 256, 512, 8080))?
        .add(TopicInjector::new(topics))?
        .add(LoadBalancerFront::new(options.load_balancer.clone()))?
        .add(options.logs())?
        .add(options.discovery())?;
    let events = deployment
        .build_service("vote", &env_id, vote)?
        .extension_as::<TopicInjector>(TopicInjector::NAME)
        .and_then(|injector| injector.topic(EVENTS_TOPIC))
        .cloned()
        .context("vote service did not expose the events topic")?;

    let mut processor = ServiceDescription::new();
    processor
        .add(ContainerDefinition::new("voting/processor:latest", 1024, 2048, 80))?
        .add(QueueBinding::new(options.queue.clone()).subscribe(events))?
        .add(options.logs())?
        .add(options.discovery())?;
    deployment.build_service("processor", &env_id, processor)?;

    let mut results = ServiceDescription::new();
    results
        .add(ContainerDefinition::new("voting/results:latest", 256, 512, 8080))?
        .add(LoadBalancerFront::new(options.load_balancer.clone()))?
        .add(options.logs())?
        .add(options.discovery())?;
    deployment.build_service("results", &env_id, results)?;

    for caller in ["vote", "results", "processor"] {
        let connection = deployment.connect(caller, "api")?;
        tracing::debug!(from = %connection.from, to = %connection.to, "Connected");
    }

    Ok(deployment)
}

pub fn render_manifest(manifest: &DeploymentManifest, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => {
            serde_yaml::to_string(manifest).context("Failed to render manifest as YAML")
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(manifest).context("Failed to render manifest as JSON")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svckit::extensions::LOAD_BALANCER_DNS_OUTPUT;

    fn synth_default() -> (Arc<InMemoryProvider>, Deployment) {
        let provider = Arc::new(InMemoryProvider::new());
        let deployment = synthesize(&AppConfig::default(), provider.clone()).unwrap();
        (provider, deployment)
    }

    #[test]
    fn builds_all_services_and_edges() {
        let (_provider, deployment) = synth_default();

        let ids: Vec<_> = deployment.services().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, ["api", "processor", "results", "vote"]);
        assert_eq!(deployment.connection_graph().len(), 3);
        assert!(deployment.connection_graph().contains("vote", "api"));
        assert_eq!(deployment.service("api").unwrap().ingress_rules().len(), 3);

        let ports: Vec<_> = deployment.services().map(|s| (s.id(), s.traffic_port())).collect();
        assert_eq!(
            ports,
            [("api", 8080), ("processor", 80), ("results", 8080), ("vote", 8080)]
        );
        let vote = &deployment.service("vote").unwrap().descriptor().container;
        assert_eq!((vote.cpu, vote.memory_mib), (256, 512));
    }

    #[test]
    fn callers_receive_the_api_endpoint() {
        let (_provider, deployment) = synth_default();

        for caller in ["vote", "results", "processor"] {
            let env = &deployment.service(caller).unwrap().descriptor().container.environment;
            assert_eq!(
                env.get("API_SERVICE_ENDPOINT").map(String::as_str),
                Some("api.production:8080"),
                "{caller}"
            );
        }
    }

    #[test]
    fn only_the_processor_gets_a_queue() {
        let (provider, deployment) = synth_default();

        let processor = &deployment.service("processor").unwrap().descriptor().container;
        assert!(processor.environment.contains_key("QUEUE_URI"));
        let vote = &deployment.service("vote").unwrap().descriptor().container;
        assert!(!vote.environment.contains_key("QUEUE_URI"));
        assert!(vote.environment.contains_key("SNS_TOPIC_ARNS"));
        assert_eq!(provider.calls_for("create_topic").len(), 1);
    }

    #[test]
    fn front_ends_expose_load_balancer_dns() {
        let (_provider, deployment) = synth_default();

        for id in ["vote", "results"] {
            let outputs = deployment.service(id).unwrap().outputs();
            assert!(outputs.contains_key(LOAD_BALANCER_DNS_OUTPUT), "{id}");
        }
        assert!(!deployment
            .service("api")
            .unwrap()
            .outputs()
            .contains_key(LOAD_BALANCER_DNS_OUTPUT));
    }

    #[test]
    fn configured_topic_prefix_is_used() {
        let mut config = AppConfig::default();
        config.extensions.insert(
            TopicInjector::NAME.to_string(),
            serde_json::json!({ "prefix": "COPILOT_SNS" }),
        );
        let deployment = synthesize(&config, Arc::new(InMemoryProvider::new())).unwrap();

        let vote = &deployment.service("vote").unwrap().descriptor().container;
        assert!(vote.environment.contains_key("COPILOT_SNS_TOPIC_ARNS"));
    }

    #[test]
    fn invalid_extension_options_are_reported() {
        let mut config = AppConfig::default();
        config.extensions.insert(
            LogShipper::NAME.to_string(),
            serde_json::json!({ "retention": "forever" }),
        );
        let err = synthesize(&config, Arc::new(InMemoryProvider::new())).unwrap_err();
        assert!(err.to_string().contains("logs"));
    }

    #[test]
    fn manifest_renders_in_both_formats() {
        let (_provider, deployment) = synth_default();
        let manifest = deployment.manifest();

        let json = render_manifest(&manifest, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["services"].as_array().unwrap().len(), 4);

        let yaml = render_manifest(&manifest, OutputFormat::Yaml).unwrap();
        let parsed: DeploymentManifest = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, manifest);
    }
}
