//! The online split protocol. Takes one shard group's hash range and
//! divides it in two while the instance serves traffic: a splitter router
//! is slid in front of the source group, events are copied into a new
//! store behind held writes, traffic is flipped to the new target group,
//! and the router is removed again.
//!
//! Phases run strictly in order and every durable configuration write
//! happens only after the work it records has succeeded. A failure is
//! tagged with the phase it happened in; recovery from phase 2 onwards is
//! manual by design.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

use accessops_config::Settings;

pub mod copier;
pub mod error;

pub use copier::{CopyStats, EventFilterPolicy, ShardGroupSplitter};
pub use error::{Error, StepError};

use crate::clients::{AdminTransport, EventStoreFactory, RouterAdminClient, WriterAdminClient};
use crate::instance::config::InstanceConfiguration;
use crate::instance::{
    ROUTER_EXTERNAL_SERVICE, ROUTER_SELECTOR, WRITER_EXTERNAL_SERVICE, WRITER_SELECTOR,
};
use crate::lifecycle::{internal_url, node_identifier, ShardGroupLifecycle};
use crate::orchestrator::OrchestratorClient;
use crate::registry::{build_configuration_set, ShardConfigRegistry};
use crate::sharding::{
    ClientConfig, DataElement, OperationKind, ShardConfigurationEntry, ShardGroupConfig,
};
use crate::storage::{storage_name, StorageProvisioner};
use crate::template::{NodeKind, RouterRouting};

/// The seven ordered phases of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPhase {
    ProvisionTargetStorage,
    DeployRouter,
    RedirectConfiguration,
    CopyEvents,
    CreateTargetShardGroup,
    EnableRouting,
    RetargetConfiguration,
}

impl fmt::Display for SplitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitPhase::ProvisionTargetStorage => "provisioning target storage",
            SplitPhase::DeployRouter => "deploying the splitter router",
            SplitPhase::RedirectConfiguration => "redirecting shard configuration to the router",
            SplitPhase::CopyEvents => "copying events to the target",
            SplitPhase::CreateTargetShardGroup => "creating the target shard group",
            SplitPhase::EnableRouting => "enabling routing",
            SplitPhase::RetargetConfiguration => "retargeting shard configuration",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub data_element: DataElement,
    /// Hash range start of the group being split.
    pub hash_range_start: i32,
    /// Inclusive start of the range moving to the new group.
    pub split_hash_range_start: i32,
    /// Inclusive end of the range moving to the new group.
    pub split_hash_range_end: i32,
    /// Events per copy batch. Defaults to the configured batch size.
    pub batch_size: Option<usize>,
    /// Writer quiescence polling. Defaults to the configured values.
    pub writer_idle_checks: Option<u32>,
    pub writer_idle_check_interval: Option<Duration>,
    /// Which source events move. Defaults per data element.
    pub filter: Option<EventFilterPolicy>,
}

impl SplitRequest {
    pub fn new(
        data_element: DataElement,
        hash_range_start: i32,
        split_hash_range_start: i32,
        split_hash_range_end: i32,
    ) -> Self {
        Self {
            data_element,
            hash_range_start,
            split_hash_range_start,
            split_hash_range_end,
            batch_size: None,
            writer_idle_checks: None,
            writer_idle_check_interval: None,
            filter: None,
        }
    }
}

fn step<E: Into<StepError>>(phase: SplitPhase) -> impl FnOnce(E) -> Error {
    move |err| Error::Phase {
        phase,
        source: err.into(),
    }
}

pub struct SplitCoordinator<'a> {
    orchestrator: Arc<dyn OrchestratorClient>,
    storage: Arc<dyn StorageProvisioner>,
    lifecycle: &'a ShardGroupLifecycle,
    registry: &'a ShardConfigRegistry,
    admin_transport: Arc<dyn AdminTransport>,
    event_store: Arc<dyn EventStoreFactory>,
    settings: Settings,
}

impl<'a> SplitCoordinator<'a> {
    pub fn new(
        orchestrator: Arc<dyn OrchestratorClient>,
        storage: Arc<dyn StorageProvisioner>,
        lifecycle: &'a ShardGroupLifecycle,
        registry: &'a ShardConfigRegistry,
        admin_transport: Arc<dyn AdminTransport>,
        event_store: Arc<dyn EventStoreFactory>,
        settings: Settings,
    ) -> Self {
        Self {
            orchestrator,
            storage,
            lifecycle,
            registry,
            admin_transport,
            event_store,
            settings,
        }
    }

    pub async fn split(
        &self,
        configuration: &mut InstanceConfiguration,
        next_node_id: &mut u64,
        request: SplitRequest,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let element = request.data_element;
        let split_start = request.split_hash_range_start;
        let split_end = request.split_hash_range_end;

        let (source, router_external_url, writer_external_url, config_credentials) =
            validate(configuration, &request)?;

        let batch_size = request
            .batch_size
            .unwrap_or(self.settings.retry.event_copy_batch_size);
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be at least 1".into()));
        }
        let idle_checks = request
            .writer_idle_checks
            .unwrap_or(self.settings.retry.writer_idle_checks);
        let idle_interval = request
            .writer_idle_check_interval
            .unwrap_or_else(|| self.settings.retry.writer_idle_interval());
        let filter = request
            .filter
            .unwrap_or_else(|| EventFilterPolicy::for_element(element));
        let pod_port = self.settings.general.pod_port;

        info!(
            "splitting {} shard group at {}: moving [{}, {}] to a new group",
            element, source.hash_range_start, split_start, split_end
        );

        // Phase 1: storage for the target group.
        let phase = SplitPhase::ProvisionTargetStorage;
        let target_storage = storage_name(
            &self.settings.general.storage_name_prefix,
            element,
            split_start,
        );
        let target_credentials = self
            .storage
            .create_access_manager_storage(&target_storage)
            .await
            .map_err(step(phase))?;

        // Phase 2: splitter router in front of the source group. Routing
        // starts off, so traffic still reaches the source only.
        let phase = SplitPhase::DeployRouter;
        let target_reader_url = internal_url(
            &node_identifier(element, NodeKind::Reader, split_start),
            pod_port,
        )
        .map_err(step(phase))?;
        let target_writer_url = internal_url(
            &node_identifier(element, NodeKind::Writer, split_start),
            pod_port,
        )
        .map_err(step(phase))?;
        let routing = RouterRouting {
            data_element: element,
            source_query_url: source.reader_client.base_url.clone(),
            source_event_url: source.writer_client.base_url.clone(),
            source_range_start: source.hash_range_start,
            source_range_end: split_start - 1,
            target_query_url: target_reader_url.clone(),
            target_event_url: target_writer_url.clone(),
            target_range_start: split_start,
            target_range_end: split_end,
            routing_on: false,
        };
        let router_internal_url = self
            .lifecycle
            .create_router_node(element, source.hash_range_start, &routing, cancel)
            .await
            .map_err(step(phase))?;
        let router_node = node_identifier(element, NodeKind::Router, source.hash_range_start);
        self.orchestrator
            .patch_service_selector(ROUTER_EXTERNAL_SERVICE, &router_node)
            .await
            .map_err(step(phase))?;

        // Phase 3: hold a stable external path to the source writer, then
        // point both ranges at the router and wait out the coordinator
        // refresh window.
        let phase = SplitPhase::RedirectConfiguration;
        let source_writer_node =
            node_identifier(element, NodeKind::Writer, source.hash_range_start);
        self.orchestrator
            .patch_service_selector(WRITER_EXTERNAL_SERVICE, &source_writer_node)
            .await
            .map_err(step(phase))?;

        let target_reader_id = *next_node_id;
        *next_node_id += 1;
        let target_writer_id = *next_node_id;
        *next_node_id += 1;

        let router_client = ClientConfig::new(router_internal_url.clone());
        let mut set =
            build_configuration_set(configuration.all_shard_groups()).map_err(step(phase))?;
        set.set_clients_at(
            element,
            source.hash_range_start,
            router_client.clone(),
            router_client.clone(),
        )
        .map_err(step(phase))?;
        set.insert(ShardConfigurationEntry {
            id: target_reader_id,
            data_element: element,
            operation: OperationKind::Query,
            hash_range_start: split_start,
            client: router_client.clone(),
        })
        .map_err(step(phase))?;
        set.insert(ShardConfigurationEntry {
            id: target_writer_id,
            data_element: element,
            operation: OperationKind::Event,
            hash_range_start: split_start,
            client: router_client,
        })
        .map_err(step(phase))?;
        self.registry
            .write(&config_credentials, &set, true)
            .await
            .map_err(step(phase))?;
        sleep(self.settings.general.refresh_window()).await;

        // Phase 4: copy events behind held writes.
        let phase = SplitPhase::CopyEvents;
        let router_admin = RouterAdminClient::new(
            self.admin_transport.clone(),
            router_external_url.clone(),
            self.settings.retry.clone(),
        );
        let writer_admin = WriterAdminClient::new(
            self.admin_transport.clone(),
            writer_external_url.clone(),
            self.settings.retry.clone(),
        );
        router_admin.pause_operations().await.map_err(step(phase))?;

        let splitter = ShardGroupSplitter::new(
            self.event_store.reader(&source.storage_credentials),
            self.event_store.bulk_persister(&target_credentials),
            writer_admin,
            batch_size,
            idle_checks,
            idle_interval,
            filter,
        );
        let stats = splitter
            .copy_events_to_target(split_start..=split_end)
            .await
            .map_err(step(phase))?;
        info!(
            "copied {} events into {} in {} batches",
            stats.copied, target_storage, stats.batches
        );

        // Phase 5: target shard group on the copied store.
        let phase = SplitPhase::CreateTargetShardGroup;
        self.lifecycle
            .create_shard_group(element, split_start, Some(target_credentials.clone()), cancel)
            .await
            .map_err(step(phase))?;

        // Phase 6: flip the router over and release held operations.
        let phase = SplitPhase::EnableRouting;
        router_admin.set_routing_on(true).await.map_err(step(phase))?;
        router_admin.resume_operations().await.map_err(step(phase))?;

        // Phase 7: retarget configuration at the real shards, prune the
        // moved range from the source store, remove the router, and put
        // the external service selectors back.
        let phase = SplitPhase::RetargetConfiguration;
        let target_group = ShardGroupConfig {
            data_element: element,
            hash_range_start: split_start,
            storage_credentials: target_credentials,
            reader_node_id: target_reader_id,
            writer_node_id: target_writer_id,
            reader_client: ClientConfig::new(target_reader_url),
            writer_client: ClientConfig::new(target_writer_url),
        };
        let mut groups = configuration.shard_groups(element).to_vec();
        let position = groups
            .iter()
            .position(|group| group.hash_range_start > split_start)
            .unwrap_or(groups.len());
        groups.insert(position, target_group);

        let mut updated = configuration.clone();
        *updated.shard_groups_mut(element) = groups;
        let set = build_configuration_set(updated.all_shard_groups()).map_err(step(phase))?;
        self.registry
            .write(&config_credentials, &set, true)
            .await
            .map_err(step(phase))?;
        sleep(self.settings.general.refresh_window()).await;

        self.event_store
            .deleter(&source.storage_credentials)
            .delete_range(split_start..=split_end)
            .await
            .map_err(step(phase))?;

        self.lifecycle
            .delete_router_node(element, source.hash_range_start, cancel)
            .await
            .map_err(step(phase))?;
        self.orchestrator
            .patch_service_selector(WRITER_EXTERNAL_SERVICE, WRITER_SELECTOR)
            .await
            .map_err(step(phase))?;
        self.orchestrator
            .patch_service_selector(ROUTER_EXTERNAL_SERVICE, ROUTER_SELECTOR)
            .await
            .map_err(step(phase))?;

        *configuration = updated;
        info!(
            "split of {} shard group at {} complete",
            element, source.hash_range_start
        );

        Ok(())
    }
}

/// Everything that must hold before a split touches anything.
fn validate(
    configuration: &InstanceConfiguration,
    request: &SplitRequest,
) -> Result<(ShardGroupConfig, url::Url, url::Url, crate::storage::Credentials), Error> {
    let element = request.data_element;
    if element == DataElement::GroupToGroupMapping {
        return Err(Error::InvalidArgument(
            "group to group mapping shard groups cannot be split".into(),
        ));
    }

    let router_external_url = configuration
        .router_external_url
        .clone()
        .ok_or_else(|| Error::InvalidState("router load balancer has not been created".into()))?;
    let writer_external_url = configuration
        .writer_external_url
        .clone()
        .ok_or_else(|| Error::InvalidState("writer load balancer has not been created".into()))?;
    let config_credentials = configuration
        .config_storage_credentials
        .clone()
        .ok_or_else(|| {
            Error::InvalidState("instance has no configuration storage credentials".into())
        })?;

    let groups = configuration.shard_groups(element);
    let source = groups
        .iter()
        .find(|group| group.hash_range_start == request.hash_range_start)
        .cloned()
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "no shard group for {} with hash range start {}",
                element, request.hash_range_start
            ))
        })?;

    if request.split_hash_range_start <= request.hash_range_start {
        return Err(Error::InvalidArgument(format!(
            "split hash range start {} must be greater than the source hash range start {}",
            request.split_hash_range_start, request.hash_range_start
        )));
    }
    if request.split_hash_range_end <= request.split_hash_range_start {
        return Err(Error::InvalidArgument(format!(
            "split hash range end {} must be greater than the split hash range start {}",
            request.split_hash_range_end, request.split_hash_range_start
        )));
    }

    let next_group_start = groups
        .iter()
        .map(|group| group.hash_range_start)
        .filter(|start| *start > request.hash_range_start)
        .min();
    match next_group_start {
        Some(next_start) => {
            if request.split_hash_range_start >= next_start {
                return Err(Error::InvalidArgument(format!(
                    "split hash range start {} must be less than the next shard group's hash range start {}",
                    request.split_hash_range_start, next_start
                )));
            }
            if request.split_hash_range_end != next_start - 1 {
                return Err(Error::InvalidArgument(format!(
                    "split hash range end must be {} (one less than the next shard group's hash range start {})",
                    next_start - 1,
                    next_start
                )));
            }
        }
        None => {
            if request.split_hash_range_end != i32::MAX {
                return Err(Error::InvalidArgument(format!(
                    "split hash range end must be {} for the last shard group",
                    i32::MAX
                )));
            }
        }
    }

    Ok((
        source,
        router_external_url,
        writer_external_url,
        config_credentials,
    ))
}
