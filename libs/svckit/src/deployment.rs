//! Deployment - owns environments and built services, and records the connection graph

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::builder::ServiceBuilder;
use crate::connection::{Connection, ConnectionGraph};
use crate::description::ServiceDescription;
use crate::environment::{Environment, EnvironmentSummary};
use crate::error::{BuildError, BuildResult};
use crate::provider::Providers;
use crate::service::Service;
use crate::workload::{IngressRule, ServiceDescriptor, ServiceId, WorkloadHandle};

/// Top-level orchestrator: environments by id, services by id, and the edges between them.
#[derive(Debug)]
pub struct Deployment {
    builder: ServiceBuilder,
    environments: BTreeMap<String, Arc<Environment>>,
    services: BTreeMap<ServiceId, Service>,
    graph: ConnectionGraph,
}

impl Deployment {
    pub fn new(providers: Providers) -> Self {
        Self {
            builder: ServiceBuilder::new(providers),
            environments: BTreeMap::new(),
            services: BTreeMap::new(),
            graph: ConnectionGraph::new(),
        }
    }

    pub fn add_environment(&mut self, environment: Environment) -> BuildResult<Arc<Environment>> {
        if self.environments.contains_key(environment.id()) {
            return Err(BuildError::DuplicateEnvironment(environment.id().to_string()));
        }
        let environment = Arc::new(environment);
        tracing::info!(environment = %environment.id(), "Environment registered");
        self.environments
            .insert(environment.id().to_string(), Arc::clone(&environment));
        Ok(environment)
    }

    pub fn environment(&self, id: &str) -> Option<&Arc<Environment>> {
        self.environments.get(id)
    }

    /// Build a service into a registered environment.
    pub fn build_service(
        &mut self,
        service_id: impl Into<ServiceId>,
        environment_id: &str,
        description: ServiceDescription,
    ) -> BuildResult<&Service> {
        let service_id = service_id.into();
        if self.services.contains_key(&service_id) {
            return Err(BuildError::DuplicateService(service_id));
        }
        let environment = self
            .environments
            .get(environment_id)
            .ok_or_else(|| BuildError::UnknownEnvironment(environment_id.to_string()))?;

        let service = self.builder.build(service_id.clone(), environment, description)?;
        Ok(self.services.entry(service_id).or_insert(service))
    }

    pub fn service(&self, id: &str) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> + '_ {
        self.services.values()
    }

    /// Connect two built services by id, see [`Service::connect_to`].
    pub fn connect(&mut self, from: &str, to: &str) -> BuildResult<Connection> {
        if from == to {
            return Err(BuildError::SelfConnection(from.to_string()));
        }
        let mut caller = self
            .services
            .remove(from)
            .ok_or_else(|| BuildError::ServiceNotBuilt(from.to_string()))?;
        let Some(mut target) = self.services.remove(to) else {
            self.services.insert(from.to_string(), caller);
            return Err(BuildError::ServiceNotBuilt(to.to_string()));
        };

        let result = caller.connect_to(&mut target);
        self.services.insert(from.to_string(), caller);
        self.services.insert(to.to_string(), target);

        let connection = result?;
        self.graph.insert(connection.clone());
        Ok(connection)
    }

    pub fn connection_graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    /// Everything the external synthesizer needs, in a stable order.
    pub fn manifest(&self) -> DeploymentManifest {
        DeploymentManifest {
            environments: self.environments.values().map(|e| e.summary()).collect(),
            services: self.services.values().map(ServiceManifest::from).collect(),
            connections: self.graph.edges().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub environments: Vec<EnvironmentSummary>,
    pub services: Vec<ServiceManifest>,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceManifest {
    pub extensions: Vec<String>,
    pub workload: WorkloadHandle,
    pub descriptor: ServiceDescriptor,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<IngressRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

impl From<&Service> for ServiceManifest {
    fn from(service: &Service) -> Self {
        Self {
            extensions: service
                .description()
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            workload: service.workload().clone(),
            descriptor: service.descriptor().clone(),
            ingress: service.ingress_rules().iter().cloned().collect(),
            outputs: service.outputs().clone(),
        }
    }
}
