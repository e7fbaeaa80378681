use std::any::Any;

use anyhow::Context;
use svckit::provider::{DatastoreHandle, DatastoreRequest, GeneratedSecretRequest, SecretRef};
use svckit::{
    BuildError, Capability, ContainerSpec, Extension, IngressRule, PostHookCtx, PrehookCtx,
};

use crate::config::DatabaseConfig;

/// Output key carrying the datastore hostname.
pub const DATABASE_ENDPOINT_OUTPUT: &str = "database-endpoint";

/// Managed datastore owned by the service, reached through a generated credential secret.
#[derive(Debug, Default)]
pub struct DatabaseBinding {
    config: DatabaseConfig,
    secret: Option<SecretRef>,
    datastore: Option<DatastoreHandle>,
}

impl DatabaseBinding {
    pub const NAME: &'static str = "database";

    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            secret: None,
            datastore: None,
        }
    }

    pub fn secret(&self) -> Option<&SecretRef> {
        self.secret.as_ref()
    }

    pub fn datastore(&self) -> Option<&DatastoreHandle> {
        self.datastore.as_ref()
    }
}

impl Extension for DatabaseBinding {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capability(&self) -> Capability {
        Capability::Database
    }

    fn prehook(&mut self, ctx: &mut PrehookCtx<'_>) -> anyhow::Result<()> {
        let secret = ctx
            .providers()
            .secrets
            .generate_secret(&GeneratedSecretRequest {
                name: ctx.resource_name("db-credentials"),
                username: self.config.username.clone(),
                generate_key: "password".to_string(),
                exclude_characters: self.config.exclude_characters.clone(),
            })?;

        let datastore = ctx
            .providers()
            .datastores
            .provision_datastore(&DatastoreRequest {
                name: ctx.resource_name("db"),
                engine: self.config.engine.clone(),
                database_name: self
                    .config
                    .database_name
                    .clone()
                    .unwrap_or_else(|| ctx.service_id().to_string()),
                port: self.config.port,
                network: ctx.environment().network().clone(),
                credentials: secret.clone(),
            })?;

        tracing::debug!(datastore = %datastore.identifier, host = %datastore.hostname, "Datastore provisioned");
        ctx.add_output(DATABASE_ENDPOINT_OUTPUT, datastore.hostname.clone());
        self.secret = Some(secret);
        self.datastore = Some(datastore);
        Ok(())
    }

    fn mutate_container_definition(&self, draft: ContainerSpec) -> anyhow::Result<ContainerSpec> {
        let secret = self.secret.as_ref().ok_or_else(|| BuildError::MissingDependency {
            extension: Self::NAME.to_string(),
            requires: "database credential secret".to_string(),
        })?;
        let datastore = self
            .datastore
            .as_ref()
            .context("datastore was not provisioned")?;

        Ok(draft
            .with_env(self.config.endpoint_env.clone(), datastore.hostname.clone())
            .with_secret(self.config.secret_env.clone(), secret.clone()))
    }

    fn post_hook(&mut self, ctx: &mut PostHookCtx<'_>) -> anyhow::Result<()> {
        let (Some(secret), Some(datastore)) = (&self.secret, &self.datastore) else {
            anyhow::bail!("database resources were not provisioned");
        };
        let identity = &ctx.workload().network_identity;

        let rule = IngressRule {
            source: identity.clone(),
            port: datastore.port,
            description: format!("Allow {} to reach its database", ctx.service_id()),
        };
        ctx.providers()
            .platform
            .grant_ingress(&datastore.network_identity, &rule)?;
        ctx.providers().secrets.grant_read(secret, identity)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
