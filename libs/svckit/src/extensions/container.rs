use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contracts::{Capability, Extension};
use crate::workload::ContainerSpec;

/// The primary workload unit. Every description holds exactly one.
#[derive(Debug, Clone)]
pub struct ContainerDefinition {
    spec: ContainerSpec,
}

/// Deserializable form of a container definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerOptions {
    pub image: String,
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,
    pub traffic_port: u16,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

fn default_cpu() -> u32 {
    256
}

fn default_memory_mib() -> u32 {
    512
}

impl ContainerDefinition {
    pub const NAME: &'static str = "service-container";

    pub fn new(image: impl Into<String>, cpu: u32, memory_mib: u32, traffic_port: u16) -> Self {
        Self {
            spec: ContainerSpec {
                image: image.into(),
                cpu,
                memory_mib,
                traffic_port,
                environment: BTreeMap::new(),
                secrets: BTreeMap::new(),
                logging: None,
            },
        }
    }

    pub fn from_options(options: ContainerOptions) -> Self {
        let mut def = Self::new(
            options.image,
            options.cpu,
            options.memory_mib,
            options.traffic_port,
        );
        def.spec.environment = options.environment;
        def
    }

    pub fn with_environment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_cpu(mut self, cpu: u32) -> Self {
        self.spec.cpu = cpu;
        self
    }

    pub fn with_memory(mut self, memory_mib: u32) -> Self {
        self.spec.memory_mib = memory_mib;
        self
    }

    /// Spec the mutate phase starts folding from.
    pub fn base(&self) -> &ContainerSpec {
        &self.spec
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.spec.image.trim().is_empty() {
            return Err("image must not be empty".to_string());
        }
        if self.spec.cpu == 0 {
            return Err("cpu must be positive".to_string());
        }
        if self.spec.memory_mib == 0 {
            return Err("memory must be positive".to_string());
        }
        if self.spec.traffic_port == 0 {
            return Err("traffic port must be positive".to_string());
        }
        Ok(())
    }
}

impl Extension for ContainerDefinition {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capability(&self) -> Capability {
        Capability::Container
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
