use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contracts::{Capability, Extension, PrehookCtx};
use crate::provider::{LogGroupHandle, LogGroupRequest};
use crate::workload::{ContainerSpec, LogConfiguration, ServiceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogOptions {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Stream prefix; the service id when unset.
    #[serde(default)]
    pub stream_prefix: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            driver: default_driver(),
            stream_prefix: None,
        }
    }
}

fn default_retention_days() -> u32 {
    7
}

fn default_driver() -> String {
    "awslogs".to_string()
}

/// Ships container output to a per-service log group.
#[derive(Debug, Default)]
pub struct LogShipper {
    options: LogOptions,
    service: Option<ServiceId>,
    group: Option<LogGroupHandle>,
}

impl LogShipper {
    pub const NAME: &'static str = "logs";

    pub fn new(options: LogOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn log_group(&self) -> Option<&LogGroupHandle> {
        self.group.as_ref()
    }
}

impl Extension for LogShipper {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capability(&self) -> Capability {
        Capability::Logs
    }

    fn prehook(&mut self, ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        let group = ctx.providers().logs.provision_log_group(&LogGroupRequest {
            name: format!("/{}/{}", ctx.environment().id(), ctx.service_id()),
            retention_days: self.options.retention_days,
        })?;
        self.service = Some(ctx.service_id().to_string());
        self.group = Some(group);
        Ok(())
    }

    fn mutate_container_definition(&self, mut draft: ContainerSpec) -> anyhow::Result<ContainerSpec> {
        let Some(group) = &self.group else {
            anyhow::bail!("log group was not provisioned");
        };
        let prefix = self
            .options
            .stream_prefix
            .clone()
            .or_else(|| self.service.clone())
            .unwrap_or_default();

        let mut options = BTreeMap::new();
        options.insert("awslogs-group".to_string(), group.name.clone());
        options.insert("awslogs-stream-prefix".to_string(), prefix);
        draft.logging = Some(LogConfiguration {
            driver: self.options.driver.clone(),
            options,
        });
        Ok(draft)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
