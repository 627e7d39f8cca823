//! Narrow, namespaced view of the container orchestrator. The control
//! plane only ever touches deployments, services and pods, so that is all
//! the trait exposes; everything above it is testable against the
//! in-memory implementation.

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod resources;
pub mod wait;

pub use error::Error;
pub use memory::MemoryOrchestrator;
pub use resources::{
    DeploymentSpec, DeploymentStatus, EnvVar, PodInfo, ProbeSpec, ServiceKind, ServiceSpec,
    ServiceStatus,
};
pub use wait::{
    wait_for_deployment_available, wait_for_deployment_scaled_down, wait_for_load_balancer_address,
};

/// CRUD over deployments, services and pods in one namespace.
/// Implementations must be safe to share across concurrent operations.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    async fn create_deployment(&self, spec: &DeploymentSpec) -> Result<(), Error>;

    async fn delete_deployment(&self, name: &str) -> Result<(), Error>;

    async fn patch_deployment_replicas(&self, name: &str, replicas: u32) -> Result<(), Error>;

    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), Error>;

    /// Repoint a service at pods carrying a different app label.
    async fn patch_service_selector(&self, name: &str, app_label: &str) -> Result<(), Error>;

    async fn delete_service(&self, name: &str) -> Result<(), Error>;

    async fn list_deployments(&self) -> Result<Vec<DeploymentStatus>, Error>;

    async fn list_services(&self) -> Result<Vec<ServiceStatus>, Error>;

    async fn list_pods(&self) -> Result<Vec<PodInfo>, Error>;
}
