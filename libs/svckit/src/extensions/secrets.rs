use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contracts::{Capability, Extension, PostHookCtx, PrehookCtx};
use crate::error::BuildError;
use crate::provider::SecretRef;
use crate::workload::ContainerSpec;

/// Where a secret variable comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretSource {
    pub name: String,
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretOptions {
    /// Container variable → secret in the store.
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretSource>,
}

/// Resolves existing secrets by name and hands them to the container as references.
#[derive(Debug, Default)]
pub struct SecretInjector {
    options: SecretOptions,
    resolved: BTreeMap<String, SecretRef>,
}

impl SecretInjector {
    pub const NAME: &'static str = "secrets";

    pub fn new(options: SecretOptions) -> Self {
        Self {
            options,
            resolved: BTreeMap::new(),
        }
    }

    pub fn with_secret(mut self, env_key: impl Into<String>, name: impl Into<String>) -> Self {
        self.options.secrets.insert(
            env_key.into(),
            SecretSource {
                name: name.into(),
                field: None,
            },
        );
        self
    }

    pub fn resolved(&self) -> &BTreeMap<String, SecretRef> {
        &self.resolved
    }
}

impl Extension for SecretInjector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capability(&self) -> Capability {
        Capability::Secrets
    }

    fn prehook(&mut self, ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        for (key, source) in &self.options.secrets {
            let mut secret = ctx.providers().secrets.lookup_secret(&source.name)?;
            if let Some(field) = &source.field {
                secret = secret.field(field.clone());
            }
            self.resolved.insert(key.clone(), secret);
        }
        Ok(())
    }

    fn mutate_container_definition(&self, mut draft: ContainerSpec) -> anyhow::Result<ContainerSpec> {
        for (key, source) in &self.options.secrets {
            let secret = self.resolved.get(key).ok_or_else(|| BuildError::MissingDependency {
                extension: Self::NAME.to_string(),
                requires: format!("secret '{}'", source.name),
            })?;
            draft = draft.with_secret(key.clone(), secret.clone());
        }
        Ok(draft)
    }

    fn post_hook(&mut self, ctx: &mut PostHookCtx<'_>) -> anyhow::Result<()> {
        for secret in self.resolved.values() {
            ctx.providers()
                .secrets
                .grant_read(secret, &ctx.workload().network_identity)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
