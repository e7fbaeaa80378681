//! End-to-end lifecycle tests for the built-in extensions against the in-memory provider

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use svckit::extensions::{
    ContainerDefinition, LoadBalancerFront, LogShipper, QueueBinding, QueueOptions,
    SecretInjector, TopicInjector, TopicOptions, LOAD_BALANCER_DNS_OUTPUT,
};
use svckit::provider::{MessagingProvider, TopicRef};
use svckit::{
    BuildError, ClusterRef, ContainerSpec, Environment, ErrorKind, Extension, InMemoryProvider,
    NetworkIdentity, NetworkRef, Providers, ServiceBuilder, ServiceDescription,
};

// ---------- Helpers ----------

struct Harness {
    provider: Arc<InMemoryProvider>,
    builder: ServiceBuilder,
    env: Arc<Environment>,
}

fn harness() -> Harness {
    let provider = Arc::new(InMemoryProvider::new());
    Harness {
        builder: ServiceBuilder::new(Providers::shared(provider.clone())),
        env: Arc::new(Environment::new(
            "production",
            NetworkRef("vpc-main".to_string()),
            ClusterRef("cluster-main".to_string()),
        )),
        provider,
    }
}

/// Records the order hooks are called in, across all instances sharing the log.
struct Probe {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    fn push(&self, hook: &str) {
        self.log.lock().push(format!("{}:{}", hook, self.name));
    }
}

impl Extension for Probe {
    fn name(&self) -> &str {
        self.name
    }
    fn prehook(&mut self, _ctx: &mut svckit::PrehookCtx<'_>) -> anyhow::Result<()> {
        self.push("pre");
        Ok(())
    }
    fn mutate_container_definition(&self, draft: ContainerSpec) -> anyhow::Result<ContainerSpec> {
        self.push("mutate");
        Ok(draft)
    }
    fn modify_build_props(&self, props: svckit::BuildProps) -> anyhow::Result<svckit::BuildProps> {
        self.push("props");
        Ok(props)
    }
    fn patch_after_create(&self) -> anyhow::Result<Vec<(String, String)>> {
        self.push("patch");
        Ok(Vec::new())
    }
    fn post_hook(&mut self, _ctx: &mut svckit::PostHookCtx<'_>) -> anyhow::Result<()> {
        self.push("post");
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------- Tests ----------

#[test]
fn phases_complete_for_all_extensions_before_the_next_starts() {
    let h = harness();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut desc = ServiceDescription::new();
    desc.add(Probe { name: "a", log: log.clone() })
        .unwrap()
        .add(ContainerDefinition::new("img", 256, 512, 80))
        .unwrap()
        .add(Probe { name: "b", log: log.clone() })
        .unwrap();

    h.builder.build("svc", &h.env, desc).unwrap();

    let expected: Vec<String> = [
        "pre:a", "pre:b", "mutate:a", "mutate:b", "props:a", "props:b", "patch:a", "patch:b",
        "post:a", "post:b",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(*log.lock(), expected);
}

#[test]
fn duplicate_extension_fails_before_any_hook() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut desc = ServiceDescription::new();
    desc.add(Probe { name: "probe", log: log.clone() }).unwrap();

    let err = desc.add(Probe { name: "probe", log: log.clone() }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(log.lock().is_empty());
}

#[test]
fn two_container_definitions_are_rejected() {
    struct SecondContainer(ContainerDefinition);
    impl Extension for SecondContainer {
        fn name(&self) -> &str {
            "sidecar"
        }
        fn capability(&self) -> svckit::Capability {
            svckit::Capability::Container
        }
        fn as_any(&self) -> &dyn Any {
            &self.0
        }
    }

    let h = harness();
    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("img", 256, 512, 80))
        .unwrap()
        .add(SecondContainer(ContainerDefinition::new("img2", 256, 512, 81)))
        .unwrap();

    match h.builder.build("svc", &h.env, desc).unwrap_err() {
        BuildError::MultipleContainers { names } => {
            assert_eq!(names, vec!["service-container", "sidecar"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.provider.calls().is_empty());
}

#[test]
fn load_balancer_front_provisions_and_registers() {
    let h = harness();
    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("registry.local/results:1", 256, 512, 80))
        .unwrap()
        .add(LoadBalancerFront::default())
        .unwrap();

    let svc = h.builder.build("results", &h.env, desc).unwrap();

    assert_eq!(
        svc.descriptor().props.health_check_grace_period,
        Some(Duration::from_secs(60))
    );
    assert_eq!(
        svc.outputs().get(LOAD_BALANCER_DNS_OUTPUT).map(String::as_str),
        Some("results-lb.elb.memory.local")
    );
    let front = svc.extension_as::<LoadBalancerFront>("load-balancer").unwrap();
    assert_eq!(front.dns_name(), Some("results-lb.elb.memory.local"));
    assert_eq!(h.provider.calls_for("register_target").len(), 1);
}

#[test]
fn queue_uri_only_present_with_queue_binding() {
    let h = harness();
    let topic = h.provider.create_topic("events").unwrap();

    let mut with_queue = ServiceDescription::new();
    with_queue
        .add(ContainerDefinition::new("registry.local/processor:1", 1024, 2048, 80))
        .unwrap()
        .add(QueueBinding::new(QueueOptions::default()).subscribe(topic.clone()))
        .unwrap();
    let processor = h.builder.build("processor", &h.env, with_queue).unwrap();

    let env = &processor.descriptor().container.environment;
    assert_eq!(
        env.get("QUEUE_URI").map(String::as_str),
        Some("https://sqs.memory.local/processor-queue")
    );
    let binding = processor.extension_as::<QueueBinding>("queue").unwrap();
    assert_eq!(binding.subscriptions().len(), 1);
    assert_eq!(binding.subscriptions()[0].topic, topic.address);
    assert!(h
        .provider
        .grants_for(processor.network_identity())
        .iter()
        .any(|g| g.action == "consume"));

    let mut without_queue = ServiceDescription::new();
    without_queue
        .add(ContainerDefinition::new("registry.local/processor:1", 1024, 2048, 80))
        .unwrap();
    let plain = h.builder.build("plain", &h.env, without_queue).unwrap();
    assert!(!plain.descriptor().container.environment.contains_key("QUEUE_URI"));
}

#[test]
fn topic_injector_creates_topics_and_grants_publish() {
    let h = harness();
    let mut options = TopicOptions {
        prefix: "COPILOT_SNS".to_string(),
        ..TopicOptions::default()
    };
    options.create.insert("events".to_string(), "vote-events".to_string());

    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("registry.local/vote:1", 256, 512, 8080))
        .unwrap()
        .add(TopicInjector::new(options))
        .unwrap();
    let vote = h.builder.build("vote", &h.env, desc).unwrap();

    assert_eq!(
        vote.descriptor()
            .container
            .environment
            .get("COPILOT_SNS_TOPIC_ARNS")
            .map(String::as_str),
        Some(r#"{"events":"arn:memory:sns:vote-events"}"#)
    );
    let grants = h.provider.grants_for(vote.network_identity());
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].action, "publish");
}

#[test]
fn secrets_are_injected_as_references_only() {
    let h = harness();
    let seeded = h.provider.insert_secret("api-key");

    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("img", 256, 512, 8080))
        .unwrap()
        .add(SecretInjector::default().with_secret("API_KEY", "api-key"))
        .unwrap();
    let svc = h.builder.build("svc", &h.env, desc).unwrap();

    let container = &svc.descriptor().container;
    assert_eq!(container.secrets.get("API_KEY"), Some(&seeded));
    assert!(!container.environment.contains_key("API_KEY"));
    assert_eq!(h.provider.grants_for(svc.network_identity())[0].action, "read");
}

#[test]
fn missing_secret_surfaces_provider_message() {
    let h = harness();
    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("img", 256, 512, 8080))
        .unwrap()
        .add(SecretInjector::default().with_secret("API_KEY", "nope"))
        .unwrap();

    match h.builder.build("svc", &h.env, desc).unwrap_err() {
        BuildError::Provisioning { extension, source } => {
            assert_eq!(extension, "secrets");
            assert_eq!(source.message, "secret 'nope' not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.provider.calls_for("create_workload").is_empty());
}

#[test]
fn log_shipper_configures_per_service_group() {
    let h = harness();
    let mut desc = ServiceDescription::new();
    desc.add(LogShipper::default())
        .unwrap()
        .add(ContainerDefinition::new("img", 256, 512, 8080))
        .unwrap();
    let svc = h.builder.build("api", &h.env, desc).unwrap();

    let logging = svc.descriptor().container.logging.as_ref().unwrap();
    assert_eq!(logging.driver, "awslogs");
    assert_eq!(
        logging.options.get("awslogs-group").map(String::as_str),
        Some("/production/api")
    );
    assert_eq!(
        logging.options.get("awslogs-stream-prefix").map(String::as_str),
        Some("api")
    );
}

#[test]
fn failed_prehook_aborts_remaining_phases() {
    let h = harness();
    h.provider.fail_on("provision_queue", "queue quota exceeded");

    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("img", 256, 512, 80))
        .unwrap()
        .add(QueueBinding::default())
        .unwrap()
        .add(LoadBalancerFront::default())
        .unwrap();

    let err = h.builder.build("processor", &h.env, desc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Provisioning);
    assert!(err.to_string().contains("queue"));
    assert!(h.provider.calls_for("provision_load_balancer").is_empty());
    assert!(h.provider.calls_for("create_workload").is_empty());
}

#[test]
fn workload_identity_is_not_shared_between_services() {
    let h = harness();
    let build = |id: &str| {
        let mut desc = ServiceDescription::new();
        desc.add(ContainerDefinition::new("img", 256, 512, 80)).unwrap();
        h.builder.build(id, &h.env, desc).unwrap()
    };
    let a = build("a");
    let b = build("b");
    assert_ne!(a.network_identity(), b.network_identity());
    assert_eq!(a.network_identity(), &NetworkIdentity::new("sg-production-a"));
}

#[test]
fn existing_topic_refs_are_injected_without_creation() {
    let h = harness();
    let topic = TopicRef {
        name: "shared".to_string(),
        address: "arn:memory:sns:shared".to_string(),
    };
    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("img", 256, 512, 80))
        .unwrap()
        .add(TopicInjector::default().with_topic("shared", topic))
        .unwrap();
    let svc = h.builder.build("svc", &h.env, desc).unwrap();

    assert!(h.provider.calls_for("create_topic").is_empty());
    assert!(svc
        .descriptor()
        .container
        .environment
        .contains_key("SNS_TOPIC_ARNS"));
}
