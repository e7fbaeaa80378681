//! # svckit - composable service extensions
//!
//! Assembles deployable service definitions from independent, pluggable
//! extensions and wires built services together.
//!
//! ## Features
//!
//! - **Extensible**: new capabilities implement [`Extension`]; the builder never changes
//! - **Phase-based lifecycle**: prehook → mutate → build props → create → patch → post-hook
//! - **Folded definitions**: container spec and build props are folded left to right, later wins
//! - **Checked topology**: services connect only within one [`Environment`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use svckit::{extensions::*, Deployment, Environment, InMemoryProvider, Providers, ServiceDescription};
//!
//! let mut deployment = Deployment::new(Providers::shared(Arc::new(InMemoryProvider::new())));
//! deployment.add_environment(environment)?;
//!
//! let mut api = ServiceDescription::new();
//! api.add(ContainerDefinition::new("registry.local/api:latest", 256, 512, 8080))?
//!     .add(LogShipper::default())?;
//! deployment.build_service("api", "production", api)?;
//! deployment.connect("vote", "api")?;
//! ```

pub mod builder;
pub mod connection;
pub mod contracts;
pub mod deployment;
pub mod description;
pub mod environment;
pub mod error;
pub mod extensions;
pub mod provider;
pub mod service;
pub mod workload;

pub use builder::ServiceBuilder;
pub use connection::{
    env_var_fragment, peer_endpoint_env_key, Connection, ConnectionGraph, ConnectionKind,
    ConnectionPlan, PeerEndpoint,
};
pub use contracts::{Capability, Connectable, Extension, Peers, PostHookCtx, PrehookCtx};
pub use deployment::{Deployment, DeploymentManifest, ServiceManifest};
pub use description::ServiceDescription;
pub use environment::{ClusterRef, Environment, EnvironmentSummary, NetworkRef};
pub use error::{BuildError, BuildResult, ErrorKind, HookPhase};
pub use provider::{InMemoryProvider, ProviderError, ProviderResult, Providers};
pub use service::Service;
pub use workload::{
    BuildProps, ContainerSpec, DiscoveryRegistration, DnsRecordType, HealthCheck, IngressRule,
    NetworkIdentity, ServiceDescriptor, ServiceId, WorkloadHandle,
};
