use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contracts::{Capability, Extension, PostHookCtx, PrehookCtx};
use crate::provider::TopicRef;
use crate::workload::ContainerSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicOptions {
    /// Variable prefix, giving `<PREFIX>_TOPIC_ARNS`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Topics created during the prehook: logical key → topic name.
    #[serde(default)]
    pub create: BTreeMap<String, String>,
}

impl Default for TopicOptions {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            create: BTreeMap::new(),
        }
    }
}

fn default_prefix() -> String {
    "SNS".to_string()
}

/// Publishes a JSON map of logical topic keys to topic addresses into the
/// container and grants the workload publish rights on each topic.
#[derive(Debug, Default)]
pub struct TopicInjector {
    options: TopicOptions,
    topics: BTreeMap<String, TopicRef>,
}

impl TopicInjector {
    pub const NAME: &'static str = "injecter";

    pub fn new(options: TopicOptions) -> Self {
        Self {
            options,
            topics: BTreeMap::new(),
        }
    }

    /// Inject an existing topic under `key`.
    pub fn with_topic(mut self, key: impl Into<String>, topic: TopicRef) -> Self {
        self.topics.insert(key.into(), topic);
        self
    }

    pub fn topic(&self, key: &str) -> Option<&TopicRef> {
        self.topics.get(key)
    }

    pub fn env_key(&self) -> String {
        format!("{}_TOPIC_ARNS", self.options.prefix)
    }
}

impl Extension for TopicInjector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capability(&self) -> Capability {
        Capability::Topics
    }

    fn prehook(&mut self, ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        for (key, name) in &self.options.create {
            let topic = ctx.providers().messaging.create_topic(name)?;
            self.topics.insert(key.clone(), topic);
        }
        Ok(())
    }

    fn mutate_container_definition(&self, draft: ContainerSpec) -> anyhow::Result<ContainerSpec> {
        if self.topics.is_empty() {
            return Ok(draft);
        }
        let addresses: BTreeMap<&str, &str> = self
            .topics
            .iter()
            .map(|(key, topic)| (key.as_str(), topic.address.as_str()))
            .collect();
        Ok(draft.with_env(self.env_key(), serde_json::to_string(&addresses)?))
    }

    fn post_hook(&mut self, ctx: &mut PostHookCtx<'_>) -> anyhow::Result<()> {
        for topic in self.topics.values() {
            ctx.providers()
                .messaging
                .grant_publish(topic, &ctx.workload().network_identity)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
