//! Shard group lifecycle. A group is three coordinated node deployments
//! (reader, writer, event cache) plus their cluster-internal services.
//! The event cache starts first and stops last: the reader and writer
//! need it resolvable for the whole time they run.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use accessops_config::Settings;

pub mod error;
pub mod names;

pub use error::Error;
pub use names::{external_service_name, internal_service_name, internal_url, node_identifier};

use crate::orchestrator::{
    wait_for_deployment_available, wait_for_deployment_scaled_down, DeploymentSpec, EnvVar,
    OrchestratorClient, ProbeSpec, ServiceKind, ServiceSpec,
};
use crate::sharding::DataElement;
use crate::storage::{storage_name, Credentials, StorageProvisioner};
use crate::template::{NodeConfigRenderer, NodeKind, RouterRouting};

/// Name of the coordinator node deployment. One per instance.
pub const COORDINATOR_NODE: &str = "coordinator";

pub struct ShardGroupLifecycle {
    orchestrator: Arc<dyn OrchestratorClient>,
    storage: Arc<dyn StorageProvisioner>,
    renderer: NodeConfigRenderer,
    settings: Settings,
}

impl ShardGroupLifecycle {
    pub fn new(
        orchestrator: Arc<dyn OrchestratorClient>,
        storage: Arc<dyn StorageProvisioner>,
        renderer: NodeConfigRenderer,
        settings: Settings,
    ) -> Self {
        Self {
            orchestrator,
            storage,
            renderer,
            settings,
        }
    }

    /// Stand up a complete shard group. Creates storage when no
    /// credentials are supplied, then the event cache, then the reader
    /// and writer in parallel. Returns the credentials the group runs on.
    ///
    /// Partial state is not rolled back on failure; the caller records
    /// the group in the instance configuration only after success.
    pub async fn create_shard_group(
        &self,
        element: DataElement,
        hash_range_start: i32,
        credentials: Option<Credentials>,
        cancel: &CancellationToken,
    ) -> Result<Credentials, Error> {
        self.renderer.validate(NodeKind::EventCache)?;
        self.renderer.validate(NodeKind::Reader)?;
        self.renderer.validate(NodeKind::Writer)?;

        let credentials = match credentials {
            Some(credentials) => credentials,
            None => {
                let name = storage_name(
                    &self.settings.general.storage_name_prefix,
                    element,
                    hash_range_start,
                );
                self.storage.create_access_manager_storage(&name).await?
            }
        };

        let event_cache = node_identifier(element, NodeKind::EventCache, hash_range_start);
        let env = self.renderer.render_event_cache(&event_cache)?;
        self.create_node(&event_cache, NodeKind::EventCache, env, cancel)
            .await?;

        let event_cache_url = internal_url(&event_cache, self.settings.general.pod_port)?;
        let reader = node_identifier(element, NodeKind::Reader, hash_range_start);
        let writer = node_identifier(element, NodeKind::Writer, hash_range_start);
        let reader_env = self
            .renderer
            .render_reader(&reader, &event_cache_url, &credentials)?;
        let writer_env = self
            .renderer
            .render_writer(&writer, &event_cache_url, &credentials)?;

        tokio::try_join!(
            self.create_node(&reader, NodeKind::Reader, reader_env, cancel),
            self.create_node(&writer, NodeKind::Writer, writer_env, cancel),
        )?;

        info!(
            "shard group {}/{} created",
            element,
            crate::sharding::hash_str(hash_range_start)
        );

        Ok(credentials)
    }

    /// Scale a shard group to zero. Reader and writer stop in parallel;
    /// the event cache stops only after both are gone, so it can absorb
    /// the writer's last events.
    pub async fn scale_down_shard_group(
        &self,
        element: DataElement,
        hash_range_start: i32,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let reader = node_identifier(element, NodeKind::Reader, hash_range_start);
        let writer = node_identifier(element, NodeKind::Writer, hash_range_start);
        let event_cache = node_identifier(element, NodeKind::EventCache, hash_range_start);

        tokio::try_join!(
            self.scale_to_zero(&reader, cancel),
            self.scale_to_zero(&writer, cancel),
        )?;
        self.scale_to_zero(&event_cache, cancel).await?;

        Ok(())
    }

    /// Mirror image of scale-down: event cache first, then reader and
    /// writer in parallel.
    pub async fn scale_up_shard_group(
        &self,
        element: DataElement,
        hash_range_start: i32,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let reader = node_identifier(element, NodeKind::Reader, hash_range_start);
        let writer = node_identifier(element, NodeKind::Writer, hash_range_start);
        let event_cache = node_identifier(element, NodeKind::EventCache, hash_range_start);

        self.scale_to_one(&event_cache, cancel).await?;
        tokio::try_join!(
            self.scale_to_one(&reader, cancel),
            self.scale_to_one(&writer, cancel),
        )?;

        Ok(())
    }

    pub async fn restart_shard_group(
        &self,
        element: DataElement,
        hash_range_start: i32,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        self.scale_down_shard_group(element, hash_range_start, cancel)
            .await?;
        self.scale_up_shard_group(element, hash_range_start, cancel)
            .await?;
        info!(
            "shard group {}/{} restarted",
            element,
            crate::sharding::hash_str(hash_range_start)
        );

        Ok(())
    }

    /// Remove a shard group's deployments and services. Resources already
    /// gone are skipped, so interrupted teardowns can be retried. Storage
    /// is left to the caller.
    pub async fn delete_shard_group(
        &self,
        element: DataElement,
        hash_range_start: i32,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        match self
            .scale_down_shard_group(element, hash_range_start, cancel)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        for kind in [NodeKind::Reader, NodeKind::Writer, NodeKind::EventCache] {
            let node = node_identifier(element, kind, hash_range_start);
            self.delete_node(&node).await?;
        }

        Ok(())
    }

    /// Deploy the splitter router in front of a source shard group.
    /// Returns the router's cluster-internal URL.
    pub async fn create_router_node(
        &self,
        element: DataElement,
        hash_range_start: i32,
        routing: &RouterRouting,
        cancel: &CancellationToken,
    ) -> Result<Url, Error> {
        self.renderer.validate(NodeKind::Router)?;

        let node = node_identifier(element, NodeKind::Router, hash_range_start);
        let env = self.renderer.render_router(&node, routing)?;
        self.create_node(&node, NodeKind::Router, env, cancel)
            .await?;

        Ok(internal_url(&node, self.settings.general.pod_port)?)
    }

    /// Tear the splitter router down: scale to zero first so the
    /// termination grace period is observed, then delete.
    pub async fn delete_router_node(
        &self,
        element: DataElement,
        hash_range_start: i32,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let node = node_identifier(element, NodeKind::Router, hash_range_start);
        self.scale_to_zero(&node, cancel).await?;
        self.delete_node(&node).await?;

        Ok(())
    }

    /// Deploy the coordinator node. Its external load balancer is the
    /// caller's concern.
    pub async fn create_coordinator_node(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        self.renderer.validate(NodeKind::Coordinator)?;

        let env = self
            .renderer
            .render_coordinator(COORDINATOR_NODE, credentials)?;
        let spec = self.deployment_spec(COORDINATOR_NODE, NodeKind::Coordinator, env);
        self.orchestrator.create_deployment(&spec).await?;
        wait_for_deployment_available(
            &*self.orchestrator,
            COORDINATOR_NODE,
            self.settings.general.poll_interval(),
            self.settings.probes.availability_timeout(),
            cancel,
        )
        .await?;
        info!("coordinator node available");

        Ok(())
    }

    pub async fn delete_coordinator_node(&self, cancel: &CancellationToken) -> Result<(), Error> {
        self.scale_to_zero(COORDINATOR_NODE, cancel).await?;
        self.delete_node(COORDINATOR_NODE).await?;

        Ok(())
    }

    async fn create_node(
        &self,
        node: &str,
        kind: NodeKind,
        env: Vec<EnvVar>,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let spec = self.deployment_spec(node, kind, env);
        self.orchestrator.create_deployment(&spec).await?;
        self.orchestrator
            .create_service(&ServiceSpec {
                name: internal_service_name(node),
                app_label: node.into(),
                kind: ServiceKind::ClusterIp,
                port: self.settings.general.pod_port,
                target_port: self.settings.general.pod_port,
            })
            .await?;
        wait_for_deployment_available(
            &*self.orchestrator,
            node,
            self.settings.general.poll_interval(),
            self.settings.probes.availability_timeout(),
            cancel,
        )
        .await?;
        info!("node {} available", node);

        Ok(())
    }

    async fn scale_to_zero(&self, node: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.orchestrator.patch_deployment_replicas(node, 0).await?;
        wait_for_deployment_scaled_down(
            &*self.orchestrator,
            node,
            self.settings.general.poll_interval(),
            self.settings.probes.scale_down_timeout(),
            cancel,
        )
        .await?;

        Ok(())
    }

    async fn scale_to_one(&self, node: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.orchestrator.patch_deployment_replicas(node, 1).await?;
        wait_for_deployment_available(
            &*self.orchestrator,
            node,
            self.settings.general.poll_interval(),
            self.settings.probes.availability_timeout(),
            cancel,
        )
        .await?;

        Ok(())
    }

    async fn delete_node(&self, node: &str) -> Result<(), Error> {
        for result in [
            self.orchestrator.delete_deployment(node).await,
            self.orchestrator
                .delete_service(&internal_service_name(node))
                .await,
        ] {
            match result {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    fn deployment_spec(&self, node: &str, kind: NodeKind, env: Vec<EnvVar>) -> DeploymentSpec {
        let image = match kind {
            NodeKind::Reader => &self.settings.images.reader,
            NodeKind::Writer => &self.settings.images.writer,
            NodeKind::EventCache => &self.settings.images.event_cache,
            NodeKind::Coordinator => &self.settings.images.coordinator,
            NodeKind::Router => &self.settings.images.router,
        };

        DeploymentSpec {
            name: node.into(),
            app_label: node.into(),
            image: image.clone(),
            replicas: 1,
            container_port: self.settings.general.pod_port,
            env,
            startup_probe: ProbeSpec {
                path: self.settings.probes.startup_probe_path.clone(),
                period_seconds: self.settings.probes.startup_probe_period,
                failure_threshold: self.settings.probes.startup_probe_failure_threshold,
            },
            termination_grace_period_seconds: self.settings.probes.termination_grace_period,
        }
    }
}
