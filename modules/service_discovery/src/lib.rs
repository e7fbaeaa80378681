//! Service discovery binding.
//!
//! Registers each workload under `<service>.<namespace>` in the environment's
//! discovery namespace (created on first use) and provides the connectable
//! capability used by [`svckit::Service::connect_to`].

pub mod binding;
pub mod config;

pub use binding::{ServiceDiscoveryBinding, DISCOVERY_ENDPOINT_ENV};
pub use config::DiscoveryConfig;
