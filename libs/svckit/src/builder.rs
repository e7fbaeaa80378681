//! ServiceBuilder - drives the extension lifecycle for one service
//!
//! Phases run in a fixed order, each over every extension in registration order:
//! validate → prehook → mutate → build props → create → patch → post-hook.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contracts::{Capability, Peers, PostHookCtx, PrehookCtx};
use crate::description::ServiceDescription;
use crate::environment::Environment;
use crate::error::{BuildError, BuildResult, HookPhase};
use crate::extensions::ContainerDefinition;
use crate::provider::Providers;
use crate::service::Service;
use crate::workload::{BuildProps, ContainerSpec, ServiceDescriptor, ServiceId, WorkloadHandle};

/// Builds services from descriptions against a set of resource providers.
#[derive(Clone, Debug)]
pub struct ServiceBuilder {
    providers: Providers,
}

impl ServiceBuilder {
    pub fn new(providers: Providers) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Run the full lifecycle and return the built service.
    ///
    /// Configuration errors are reported before any provider is called. A
    /// failure in any phase aborts the remaining phases; resources created by
    /// completed prehooks are not rolled back.
    pub fn build(
        &self,
        service_id: impl Into<ServiceId>,
        environment: &Arc<Environment>,
        mut description: ServiceDescription,
    ) -> BuildResult<Service> {
        let service_id = service_id.into();
        let span = tracing::info_span!(
            "service_build",
            service = %service_id,
            environment = %environment.id()
        );
        let _enter = span.enter();

        let (container_name, base) = validate(&description)?;
        let mut outputs = BTreeMap::new();

        self.run_prehook_phase(&service_id, environment, &mut description, &mut outputs)?;
        let container = run_mutate_phase(&description, base)?;
        let props = run_props_phase(&description)?;

        let mut descriptor = ServiceDescriptor {
            service_id: service_id.clone(),
            environment_id: environment.id().to_string(),
            container,
            props,
        };

        tracing::info!("Phase: create");
        let workload = self
            .providers
            .platform
            .create_workload(&descriptor)
            .map_err(|source| BuildError::Provisioning {
                extension: container_name,
                source,
            })?;
        tracing::debug!(workload = %workload.id, identity = %workload.network_identity, "Workload created");

        self.run_patch_phase(&description, &workload, &mut descriptor)?;
        self.run_post_phase(
            &service_id,
            environment,
            &mut description,
            &workload,
            &descriptor,
            &mut outputs,
        )?;

        tracing::info!(extensions = ?description.names(), "Service built");

        Ok(Service::new(
            service_id,
            Arc::clone(environment),
            description,
            workload,
            descriptor,
            outputs,
            self.providers.clone(),
        ))
    }

    /// PREHOOK phase: extensions provision the resources they own.
    fn run_prehook_phase(
        &self,
        service_id: &str,
        environment: &Arc<Environment>,
        description: &mut ServiceDescription,
        outputs: &mut BTreeMap<String, String>,
    ) -> BuildResult<()> {
        tracing::info!("Phase: prehook");

        let entries = description.entries_mut();
        for i in 0..entries.len() {
            let (before, rest) = entries.split_at_mut(i);
            let Some((current, after)) = rest.split_first_mut() else {
                break;
            };
            let name = current.name().to_string();
            tracing::debug!(extension = %name, "Running prehook");

            let mut ctx = PrehookCtx {
                service_id,
                environment,
                providers: &self.providers,
                peers: Peers::new(before, after),
                outputs: &mut *outputs,
            };
            current
                .prehook(&mut ctx)
                .map_err(|e| BuildError::from_hook(HookPhase::Prehook, &name, e))?;
        }

        Ok(())
    }

    /// PATCH phase: append entries only knowable after creation, and push them to the workload.
    fn run_patch_phase(
        &self,
        description: &ServiceDescription,
        workload: &WorkloadHandle,
        descriptor: &mut ServiceDescriptor,
    ) -> BuildResult<()> {
        tracing::info!("Phase: patch_after_create");

        for ext in description.extensions() {
            let entries = ext
                .patch_after_create()
                .map_err(|e| BuildError::from_hook(HookPhase::PatchAfterCreate, ext.name(), e))?;
            if entries.is_empty() {
                continue;
            }

            for (key, value) in &entries {
                if descriptor.container.environment.contains_key(key) {
                    return Err(BuildError::PatchOverwrite {
                        extension: ext.name().to_string(),
                        key: key.clone(),
                    });
                }
                descriptor
                    .container
                    .environment
                    .insert(key.clone(), value.clone());
            }

            tracing::debug!(extension = ext.name(), count = entries.len(), "Patching workload environment");
            self.providers
                .platform
                .patch_environment(workload, &entries)
                .map_err(|source| BuildError::Provisioning {
                    extension: ext.name().to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    /// POST-HOOK phase: effects that need the workload's identity.
    fn run_post_phase(
        &self,
        service_id: &str,
        environment: &Arc<Environment>,
        description: &mut ServiceDescription,
        workload: &WorkloadHandle,
        descriptor: &ServiceDescriptor,
        outputs: &mut BTreeMap<String, String>,
    ) -> BuildResult<()> {
        tracing::info!("Phase: post_hook");

        let entries = description.entries_mut();
        for i in 0..entries.len() {
            let (before, rest) = entries.split_at_mut(i);
            let Some((current, after)) = rest.split_first_mut() else {
                break;
            };
            let name = current.name().to_string();
            tracing::debug!(extension = %name, "Running post_hook");

            let mut ctx = PostHookCtx {
                service_id,
                environment,
                providers: &self.providers,
                peers: Peers::new(before, after),
                workload,
                descriptor,
                outputs: &mut *outputs,
            };
            current
                .post_hook(&mut ctx)
                .map_err(|e| BuildError::from_hook(HookPhase::PostHook, &name, e))?;
        }

        Ok(())
    }
}

/// Exactly one valid container definition must be registered.
fn validate(description: &ServiceDescription) -> BuildResult<(String, ContainerSpec)> {
    let containers: Vec<_> = description.find_all(Capability::Container).collect();
    let container = match containers.as_slice() {
        [] => return Err(BuildError::MissingContainer),
        [single] => *single,
        many => {
            return Err(BuildError::MultipleContainers {
                names: many.iter().map(|e| e.name().to_string()).collect(),
            })
        }
    };

    let definition = container
        .as_any()
        .downcast_ref::<ContainerDefinition>()
        .ok_or_else(|| BuildError::InvalidContainer {
            extension: container.name().to_string(),
            reason: "extension reports the container capability but is not a container definition"
                .to_string(),
        })?;

    definition
        .validate()
        .map_err(|reason| BuildError::InvalidContainer {
            extension: container.name().to_string(),
            reason,
        })?;

    Ok((container.name().to_string(), definition.base().clone()))
}

/// MUTATE phase: left fold over the container definition, starting from the base spec.
fn run_mutate_phase(description: &ServiceDescription, base: ContainerSpec) -> BuildResult<ContainerSpec> {
    tracing::info!("Phase: mutate_container_definition");

    description.extensions().try_fold(base, |draft, ext| {
        ext.mutate_container_definition(draft)
            .map_err(|e| BuildError::from_hook(HookPhase::MutateContainer, ext.name(), e))
    })
}

/// BUILD PROPS phase: left fold over the deployment-shape parameters.
fn run_props_phase(description: &ServiceDescription) -> BuildResult<BuildProps> {
    tracing::info!("Phase: modify_build_props");

    description
        .extensions()
        .try_fold(BuildProps::default(), |props, ext| {
            ext.modify_build_props(props)
                .map_err(|e| BuildError::from_hook(HookPhase::ModifyBuildProps, ext.name(), e))
        })
}
