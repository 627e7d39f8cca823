//! In-memory orchestrator. Deployments become available and scale down
//! instantly unless held; every mutating call is appended to an operation
//! log so tests can assert ordering.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;

use super::resources::{
    DeploymentSpec, DeploymentStatus, PodInfo, ServiceKind, ServiceSpec, ServiceStatus,
};
use super::{Error, OrchestratorClient};

#[derive(Default)]
pub struct MemoryOrchestrator {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    deployments: BTreeMap<String, DeploymentRecord>,
    services: BTreeMap<String, ServiceRecord>,
    operations: Vec<String>,
    hold_available: HashSet<String>,
    hold_scale_down: HashSet<String>,
    fail_next: HashMap<String, Error>,
    withhold_ingress: HashSet<String>,
    lb_counter: u8,
}

#[derive(Clone)]
struct DeploymentRecord {
    spec: DeploymentSpec,
    replicas: u32,
}

#[derive(Clone)]
struct ServiceRecord {
    spec: ServiceSpec,
    selector: String,
    ingress: Option<String>,
}

impl MemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mutating call so far, in order, e.g.
    /// `"patch_deployment_replicas user-writer-0 0"`.
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    pub fn deployment(&self, name: &str) -> Option<(DeploymentSpec, u32)> {
        self.state
            .lock()
            .deployments
            .get(name)
            .map(|record| (record.spec.clone(), record.replicas))
    }

    pub fn service(&self, name: &str) -> Option<(ServiceSpec, String)> {
        self.state
            .lock()
            .services
            .get(name)
            .map(|record| (record.spec.clone(), record.selector.clone()))
    }

    pub fn deployment_names(&self) -> Vec<String> {
        self.state.lock().deployments.keys().cloned().collect()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.state.lock().services.keys().cloned().collect()
    }

    /// Keep the deployment from ever reporting an available replica.
    pub fn hold_available(&self, name: &str) {
        self.state.lock().hold_available.insert(name.into());
    }

    /// Keep one pod of the deployment alive through scale-down.
    pub fn hold_scale_down(&self, name: &str) {
        self.state.lock().hold_scale_down.insert(name.into());
    }

    /// Never assign a load balancer ingress to this service.
    pub fn withhold_ingress(&self, name: &str) {
        self.state.lock().withhold_ingress.insert(name.into());
    }

    /// Fail the next occurrence of an operation, keyed as it appears in
    /// the operation log, e.g. `"create_deployment group-writer-0"`.
    pub fn fail_next(&self, operation: &str, error: Error) {
        self.state.lock().fail_next.insert(operation.into(), error);
    }

    fn check_scripted(state: &mut State, operation: &str) -> Result<(), Error> {
        if let Some(error) = state.fail_next.remove(operation) {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl OrchestratorClient for MemoryOrchestrator {
    async fn create_deployment(&self, spec: &DeploymentSpec) -> Result<(), Error> {
        let mut state = self.state.lock();
        let operation = format!("create_deployment {}", spec.name);
        Self::check_scripted(&mut state, &operation)?;
        if state.deployments.contains_key(&spec.name) {
            return Err(Error::Conflict(format!("deployment \"{}\"", spec.name)));
        }
        state.operations.push(operation);
        state.deployments.insert(
            spec.name.clone(),
            DeploymentRecord {
                spec: spec.clone(),
                replicas: spec.replicas,
            },
        );

        Ok(())
    }

    async fn delete_deployment(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        let operation = format!("delete_deployment {}", name);
        Self::check_scripted(&mut state, &operation)?;
        if state.deployments.remove(name).is_none() {
            return Err(Error::NotFound(format!("deployment \"{}\"", name)));
        }
        state.operations.push(operation);

        Ok(())
    }

    async fn patch_deployment_replicas(&self, name: &str, replicas: u32) -> Result<(), Error> {
        let mut state = self.state.lock();
        let operation = format!("patch_deployment_replicas {} {}", name, replicas);
        Self::check_scripted(&mut state, &operation)?;
        match state.deployments.get_mut(name) {
            Some(record) => record.replicas = replicas,
            None => return Err(Error::NotFound(format!("deployment \"{}\"", name))),
        }
        state.operations.push(operation);

        Ok(())
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), Error> {
        let mut state = self.state.lock();
        let operation = format!("create_service {}", spec.name);
        Self::check_scripted(&mut state, &operation)?;
        if state.services.contains_key(&spec.name) {
            return Err(Error::Conflict(format!("service \"{}\"", spec.name)));
        }

        let ingress = match spec.kind {
            ServiceKind::LoadBalancer if !state.withhold_ingress.contains(&spec.name) => {
                state.lb_counter += 1;
                Some(format!("10.104.198.{}", state.lb_counter))
            }
            _ => None,
        };
        state.operations.push(operation);
        state.services.insert(
            spec.name.clone(),
            ServiceRecord {
                spec: spec.clone(),
                selector: spec.app_label.clone(),
                ingress,
            },
        );

        Ok(())
    }

    async fn patch_service_selector(&self, name: &str, app_label: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        let operation = format!("patch_service_selector {} {}", name, app_label);
        Self::check_scripted(&mut state, &operation)?;
        match state.services.get_mut(name) {
            Some(record) => record.selector = app_label.into(),
            None => return Err(Error::NotFound(format!("service \"{}\"", name))),
        }
        state.operations.push(operation);

        Ok(())
    }

    async fn delete_service(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        let operation = format!("delete_service {}", name);
        Self::check_scripted(&mut state, &operation)?;
        if state.services.remove(name).is_none() {
            return Err(Error::NotFound(format!("service \"{}\"", name)));
        }
        state.operations.push(operation);

        Ok(())
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentStatus>, Error> {
        let state = self.state.lock();
        Ok(state
            .deployments
            .values()
            .map(|record| DeploymentStatus {
                name: record.spec.name.clone(),
                replicas: record.replicas,
                available_replicas: if state.hold_available.contains(&record.spec.name) {
                    0
                } else {
                    record.replicas
                },
            })
            .collect())
    }

    async fn list_services(&self) -> Result<Vec<ServiceStatus>, Error> {
        let state = self.state.lock();
        Ok(state
            .services
            .values()
            .map(|record| ServiceStatus {
                name: record.spec.name.clone(),
                load_balancer_ingress: record.ingress.clone(),
            })
            .collect())
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>, Error> {
        let state = self.state.lock();
        let mut pods = vec![];
        for record in state.deployments.values() {
            let alive = if state.hold_scale_down.contains(&record.spec.name) {
                record.replicas.max(1)
            } else {
                record.replicas
            };
            for index in 0..alive {
                pods.push(PodInfo {
                    name: format!("{}-{}", record.spec.name, index),
                    app_label: record.spec.app_label.clone(),
                });
            }
        }

        Ok(pods)
    }
}
