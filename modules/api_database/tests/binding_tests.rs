//! Database binding against the in-memory provider

use std::sync::Arc;

use api_database::{DatabaseBinding, DatabaseConfig, DATABASE_ENDPOINT_OUTPUT};
use svckit::extensions::ContainerDefinition;
use svckit::{
    BuildError, ClusterRef, Environment, ErrorKind, InMemoryProvider, NetworkIdentity, NetworkRef,
    Providers, ServiceBuilder, ServiceDescription,
};

fn setup() -> (Arc<InMemoryProvider>, ServiceBuilder, Arc<Environment>) {
    let provider = Arc::new(InMemoryProvider::new());
    let builder = ServiceBuilder::new(Providers::shared(provider.clone()));
    let env = Arc::new(Environment::new(
        "production",
        NetworkRef("vpc-main".to_string()),
        ClusterRef("cluster-main".to_string()),
    ));
    (provider, builder, env)
}

fn api_description(config: DatabaseConfig) -> ServiceDescription {
    let mut desc = ServiceDescription::new();
    desc.add(ContainerDefinition::new("registry.local/api:latest", 256, 512, 8080))
        .unwrap()
        .add(DatabaseBinding::new(config))
        .unwrap();
    desc
}

#[test]
fn injects_endpoint_and_secret_reference() {
    let (_provider, builder, env) = setup();
    let api = builder
        .build("api", &env, api_description(DatabaseConfig::default()))
        .unwrap();

    let binding = api.extension_as::<DatabaseBinding>(DatabaseBinding::NAME).unwrap();
    let datastore = binding.datastore().unwrap();
    let secret = binding.secret().unwrap();

    let container = &api.descriptor().container;
    assert_eq!(
        container.environment.get("DB_ENDPOINT"),
        Some(&datastore.hostname)
    );
    assert_eq!(container.secrets.get("DB_SECRET"), Some(secret));
    assert!(!container.environment.values().any(|v| v == &secret.address));
    assert_eq!(api.outputs().get(DATABASE_ENDPOINT_OUTPUT), Some(&datastore.hostname));
    assert_eq!(datastore.port, 5432);
}

#[test]
fn grants_workload_ingress_to_the_datastore_port() {
    let (provider, builder, env) = setup();
    let api = builder
        .build("api", &env, api_description(DatabaseConfig::default()))
        .unwrap();

    let rules = provider.ingress_rules(&NetworkIdentity::new("sg-api-db"));
    assert_eq!(rules.len(), 1);
    assert_eq!(&rules[0].source, api.network_identity());
    assert_eq!(rules[0].port, 5432);

    let grants = provider.grants_for(api.network_identity());
    assert!(grants.iter().any(|g| g.action == "read"));
}

#[test]
fn configured_names_and_port_are_used() {
    let (_provider, builder, env) = setup();
    let config = DatabaseConfig {
        port: 6432,
        endpoint_env: "RDS_ENDPOINT".to_string(),
        secret_env: "RDS_SECRET".to_string(),
        ..DatabaseConfig::default()
    };
    let api = builder.build("api", &env, api_description(config)).unwrap();

    let container = &api.descriptor().container;
    assert!(container.environment.contains_key("RDS_ENDPOINT"));
    assert!(container.secrets.contains_key("RDS_SECRET"));
    assert!(!container.environment.contains_key("DB_ENDPOINT"));
}

#[test]
fn datastore_rejection_aborts_before_workload_creation() {
    let (provider, builder, env) = setup();
    provider.fail_on("provision_datastore", "subnet group has no capacity");

    let err = builder
        .build("api", &env, api_description(DatabaseConfig::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Provisioning);
    match err {
        BuildError::Provisioning { extension, source } => {
            assert_eq!(extension, "database");
            assert_eq!(source.message, "subnet group has no capacity");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // the secret from the completed step is not rolled back
    assert_eq!(provider.calls_for("generate_secret").len(), 1);
    assert!(provider.calls_for("create_workload").is_empty());
}
