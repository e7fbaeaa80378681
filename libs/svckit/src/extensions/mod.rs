//! Built-in extensions.
//!
//! Discovery and database bindings live in their own crates under `modules/`
//! and plug in through the same [`crate::Extension`] contract.

mod container;
mod load_balancer;
mod logs;
mod queue;
mod secrets;
mod topics;

pub use container::{ContainerDefinition, ContainerOptions};
pub use load_balancer::{LoadBalancerFront, LoadBalancerOptions, LOAD_BALANCER_DNS_OUTPUT};
pub use logs::{LogOptions, LogShipper};
pub use queue::{QueueBinding, QueueOptions};
pub use secrets::{SecretInjector, SecretOptions, SecretSource};
pub use topics::{TopicInjector, TopicOptions};
