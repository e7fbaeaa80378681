use std::any::Any;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::connection::env_var_fragment;
use crate::contracts::{Capability, Extension, PostHookCtx, PrehookCtx};
use crate::provider::{QueueHandle, QueueRequest, SubscriptionHandle, TopicRef};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueOptions {
    /// Logical queue name; unnamed queues use the `QUEUE_URI` variable.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub retention: Option<Duration>,
}

/// A work queue owned by the service, optionally fed by upstream topics.
///
/// The queue URL only exists once the queue is provisioned, so it reaches the
/// container through the patch-after-create hook.
#[derive(Debug, Default)]
pub struct QueueBinding {
    name: String,
    options: QueueOptions,
    topics: Vec<TopicRef>,
    queue: Option<QueueHandle>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl QueueBinding {
    pub fn new(options: QueueOptions) -> Self {
        let name = match &options.name {
            Some(logical) => format!("{logical}-queue"),
            None => "queue".to_string(),
        };
        Self {
            name,
            options,
            ..Self::default()
        }
    }

    pub fn named(logical: impl Into<String>) -> Self {
        Self::new(QueueOptions {
            name: Some(logical.into()),
            retention: None,
        })
    }

    /// Subscribe the queue to an upstream topic.
    pub fn subscribe(mut self, topic: TopicRef) -> Self {
        self.topics.push(topic);
        self
    }

    /// Environment variable the queue URL is published under.
    pub fn env_key(&self) -> String {
        match &self.options.name {
            Some(logical) => format!("{}_QUEUE_URI", env_var_fragment(logical)),
            None => "QUEUE_URI".to_string(),
        }
    }

    pub fn queue(&self) -> Option<&QueueHandle> {
        self.queue.as_ref()
    }

    pub fn subscriptions(&self) -> &[SubscriptionHandle] {
        &self.subscriptions
    }
}

impl Extension for QueueBinding {
    fn name(&self) -> &str {
        if self.name.is_empty() {
            "queue"
        } else {
            &self.name
        }
    }

    fn capability(&self) -> Capability {
        Capability::Queue
    }

    fn prehook(&mut self, ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        let messaging = &ctx.providers().messaging;
        let queue = messaging.provision_queue(&QueueRequest {
            name: ctx.resource_name(self.name()),
            retention: self.options.retention,
        })?;

        for topic in &self.topics {
            let subscription = messaging.subscribe(&queue, topic)?;
            tracing::debug!(queue = %queue.name, topic = %topic.name, "Queue subscribed to topic");
            self.subscriptions.push(subscription);
        }

        ctx.add_output(format!("{}-url", self.name()), queue.url.clone());
        self.queue = Some(queue);
        Ok(())
    }

    fn patch_after_create(&self) -> anyhow::Result<Vec<(String, String)>> {
        let queue = self
            .queue
            .as_ref()
            .context("queue was not provisioned before workload creation")?;
        Ok(vec![(self.env_key(), queue.url.clone())])
    }

    fn post_hook(&mut self, ctx: &mut PostHookCtx<'_>) -> anyhow::Result<()> {
        if let Some(queue) = &self.queue {
            ctx.providers()
                .messaging
                .grant_consume(queue, &ctx.workload().network_identity)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_queue_uses_plain_key() {
        let binding = QueueBinding::new(QueueOptions::default());
        assert_eq!(binding.name(), "queue");
        assert_eq!(binding.env_key(), "QUEUE_URI");
    }

    #[test]
    fn named_queue_prefixes_key() {
        let binding = QueueBinding::named("dead-letter");
        assert_eq!(binding.name(), "dead-letter-queue");
        assert_eq!(binding.env_key(), "DEAD_LETTER_QUEUE_URI");
    }

    #[test]
    fn dotted_queue_name_yields_a_valid_variable() {
        let binding = QueueBinding::named("dead.letter");
        assert_eq!(binding.env_key(), "DEAD_LETTER_QUEUE_URI");
    }

    #[test]
    fn patch_requires_a_provisioned_queue() {
        let binding = QueueBinding::new(QueueOptions::default());
        assert!(binding.patch_after_create().is_err());
    }
}
