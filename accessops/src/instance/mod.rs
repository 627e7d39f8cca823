//! Top-level instance management: stand up a complete distributed
//! AccessManager instance, tear it down again, and reshape it through
//! online shard group splits.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use accessops_config::Settings;

pub mod config;
pub mod error;

pub use config::{InstanceConfiguration, ShardGroupDescriptor};
pub use error::Error;

use crate::clients::{AdminTransport, EventStoreFactory};
use crate::lifecycle::{internal_url, node_identifier, ShardGroupLifecycle, COORDINATOR_NODE};
use crate::orchestrator::{
    wait_for_load_balancer_address, OrchestratorClient, ServiceKind, ServiceSpec,
};
use crate::registry::{build_configuration_set, PersisterFactory, ShardConfigRegistry};
use crate::sharding::{validate_range_starts, ClientConfig, DataElement, ShardGroupConfig};
use crate::split::{SplitCoordinator, SplitRequest};
use crate::storage::{configuration_storage_name, storage_name, Credentials, StorageProvisioner};
use crate::template::{NodeConfigRenderer, NodeKind, NodeTemplates};

pub const ROUTER_EXTERNAL_SERVICE: &str = "router-externalservice";
pub const WRITER_EXTERNAL_SERVICE: &str = "writer-externalservice";
pub const COORDINATOR_EXTERNAL_SERVICE: &str = "coordinator-externalservice";

/// Selectors the router/writer external services carry when no split is
/// in progress. The split protocol repoints them and puts them back.
pub(crate) const ROUTER_SELECTOR: &str = "router";
pub(crate) const WRITER_SELECTOR: &str = "writer";

/// The two external load balancers a split needs in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancedEndpoint {
    Router,
    Writer,
}

/// Collaborators the manager drives. All shared, all safe for concurrent
/// use.
pub struct InstanceDependencies {
    pub orchestrator: Arc<dyn OrchestratorClient>,
    pub storage: Arc<dyn StorageProvisioner>,
    pub admin_transport: Arc<dyn AdminTransport>,
    pub event_store: Arc<dyn EventStoreFactory>,
    pub persister_factory: PersisterFactory,
}

pub struct InstanceManager {
    orchestrator: Arc<dyn OrchestratorClient>,
    storage: Arc<dyn StorageProvisioner>,
    admin_transport: Arc<dyn AdminTransport>,
    event_store: Arc<dyn EventStoreFactory>,
    lifecycle: ShardGroupLifecycle,
    registry: ShardConfigRegistry,
    settings: Settings,
    configuration: InstanceConfiguration,
    next_shard_group_id: u64,
}

impl InstanceManager {
    pub fn new(deps: InstanceDependencies, templates: NodeTemplates, settings: Settings) -> Self {
        Self::with_configuration(deps, templates, settings, InstanceConfiguration::default())
    }

    /// Manager over the process-wide settings (see [`crate::config`]).
    pub fn from_global(deps: InstanceDependencies, templates: NodeTemplates) -> Self {
        Self::new(deps, templates, (*crate::config::settings()).clone())
    }

    /// Resume management of an existing instance. Node id allocation
    /// continues from the largest id the configuration has handed out.
    pub fn with_configuration(
        deps: InstanceDependencies,
        templates: NodeTemplates,
        settings: Settings,
        configuration: InstanceConfiguration,
    ) -> Self {
        let renderer = NodeConfigRenderer::new(
            templates,
            settings.general.pod_port,
            settings.general.minimum_log_level,
        );
        let lifecycle = ShardGroupLifecycle::new(
            deps.orchestrator.clone(),
            deps.storage.clone(),
            renderer,
            settings.clone(),
        );
        let next_shard_group_id = configuration.max_node_id().map(|id| id + 1).unwrap_or(0);

        Self {
            orchestrator: deps.orchestrator,
            storage: deps.storage,
            admin_transport: deps.admin_transport,
            event_store: deps.event_store,
            lifecycle,
            registry: ShardConfigRegistry::new(deps.persister_factory),
            settings,
            configuration,
            next_shard_group_id,
        }
    }

    pub fn configuration(&self) -> &InstanceConfiguration {
        &self.configuration
    }

    pub fn next_shard_group_id(&self) -> u64 {
        self.next_shard_group_id
    }

    /// Provision one of the instance-level external load balancers and
    /// record its address.
    pub async fn create_load_balancer(
        &mut self,
        endpoint: LoadBalancedEndpoint,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<Url, Error> {
        let (service, selector, existing) = match endpoint {
            LoadBalancedEndpoint::Router => (
                ROUTER_EXTERNAL_SERVICE,
                ROUTER_SELECTOR,
                &self.configuration.router_external_url,
            ),
            LoadBalancedEndpoint::Writer => (
                WRITER_EXTERNAL_SERVICE,
                WRITER_SELECTOR,
                &self.configuration.writer_external_url,
            ),
        };
        if existing.is_some() {
            return Err(Error::InvalidState(format!(
                "load balancer service \"{}\" already exists",
                service
            )));
        }

        self.orchestrator
            .create_service(&ServiceSpec {
                name: service.into(),
                app_label: selector.into(),
                kind: ServiceKind::LoadBalancer,
                port,
                target_port: self.settings.general.pod_port,
            })
            .await?;
        let address = wait_for_load_balancer_address(
            &*self.orchestrator,
            service,
            self.settings.general.poll_interval(),
            self.settings.probes.availability_timeout(),
            cancel,
        )
        .await?;

        let url = Url::parse(&format!("http://{}:{}/", address, port))?;
        match endpoint {
            LoadBalancedEndpoint::Router => {
                self.configuration.router_external_url = Some(url.clone())
            }
            LoadBalancedEndpoint::Writer => {
                self.configuration.writer_external_url = Some(url.clone())
            }
        }
        info!("{} listening on {}", service, url);

        Ok(url)
    }

    /// Create every shard group, persist the shard configuration, and
    /// stand up the coordinator. Validation happens before any side
    /// effect; afterwards any failure leaves partial state in the
    /// orchestrator for the caller to retry or clean up.
    pub async fn create_distributed_instance(
        &mut self,
        user_groups: Vec<ShardGroupDescriptor>,
        group_mapping_groups: Vec<ShardGroupDescriptor>,
        group_groups: Vec<ShardGroupDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        if self.configuration.router_external_url.is_none()
            || self.configuration.writer_external_url.is_none()
        {
            return Err(Error::InvalidState(
                "router and writer load balancers must be created before the instance".into(),
            ));
        }
        if self.configuration.is_provisioned() {
            return Err(Error::InvalidState(
                "distributed instance already created".into(),
            ));
        }

        let inputs = [
            (DataElement::User, user_groups),
            (DataElement::GroupToGroupMapping, group_mapping_groups),
            (DataElement::Group, group_groups),
        ];
        for (element, descriptors) in &inputs {
            if *element == DataElement::GroupToGroupMapping && descriptors.len() != 1 {
                return Err(Error::InvalidArgument(
                    crate::sharding::Error::SingleRangeRequired {
                        element: *element,
                        count: descriptors.len(),
                    }
                    .to_string(),
                ));
            }
            let starts: Vec<i32> = inputs_starts(descriptors);
            validate_range_starts(*element, &starts)
                .map_err(|err| Error::InvalidArgument(err.to_string()))?;
        }

        let mut created: Vec<(DataElement, Vec<ShardGroupConfig>)> = vec![];
        for (element, mut descriptors) in inputs {
            descriptors.sort_by_key(|descriptor| descriptor.hash_range_start);
            let mut groups = Vec::with_capacity(descriptors.len());
            for descriptor in descriptors {
                let credentials = self
                    .lifecycle
                    .create_shard_group(
                        element,
                        descriptor.hash_range_start,
                        descriptor.storage_credentials,
                        cancel,
                    )
                    .await?;
                groups.push(self.shard_group_config(
                    element,
                    descriptor.hash_range_start,
                    credentials,
                )?);
            }
            created.push((element, groups));
        }

        let config_credentials = self.config_storage_credentials().await?;
        let set = build_configuration_set(created.iter().flat_map(|(_, groups)| groups.iter()))?;
        self.registry.write(&config_credentials, &set, true).await?;

        self.lifecycle
            .create_coordinator_node(&config_credentials, cancel)
            .await?;
        let coordinator_port = self.settings.general.pod_port;
        self.orchestrator
            .create_service(&ServiceSpec {
                name: COORDINATOR_EXTERNAL_SERVICE.into(),
                app_label: COORDINATOR_NODE.into(),
                kind: ServiceKind::LoadBalancer,
                port: coordinator_port,
                target_port: coordinator_port,
            })
            .await?;
        let address = wait_for_load_balancer_address(
            &*self.orchestrator,
            COORDINATOR_EXTERNAL_SERVICE,
            self.settings.general.poll_interval(),
            self.settings.probes.availability_timeout(),
            cancel,
        )
        .await?;
        self.configuration.coordinator_external_url =
            Some(Url::parse(&format!("http://{}:{}/", address, coordinator_port))?);

        for (element, groups) in created {
            *self.configuration.shard_groups_mut(element) = groups;
        }
        info!("distributed instance created");

        Ok(())
    }

    /// Tear the whole instance down: coordinator, every shard group and
    /// its storage, the external load balancers and the configuration
    /// store. Resources already gone are skipped.
    pub async fn delete_distributed_instance(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        self.delete_service_if_exists(COORDINATOR_EXTERNAL_SERVICE)
            .await?;
        match self.lifecycle.delete_coordinator_node(cancel).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        for element in DataElement::all() {
            let groups = self.configuration.shard_groups(element).to_vec();
            for group in groups {
                self.lifecycle
                    .delete_shard_group(element, group.hash_range_start, cancel)
                    .await?;
                self.storage
                    .drop_storage(&storage_name(
                        &self.settings.general.storage_name_prefix,
                        element,
                        group.hash_range_start,
                    ))
                    .await?;
            }
        }

        self.delete_service_if_exists(ROUTER_EXTERNAL_SERVICE).await?;
        self.delete_service_if_exists(WRITER_EXTERNAL_SERVICE).await?;

        if self.configuration.config_storage_credentials.is_some() {
            self.storage
                .drop_storage(&configuration_storage_name(
                    &self.settings.general.storage_name_prefix,
                ))
                .await?;
        }

        self.configuration = InstanceConfiguration::default();
        info!("distributed instance deleted");

        Ok(())
    }

    /// Restart one shard group's nodes: reader and writer scale down
    /// first, the event cache last, then everything comes back up in the
    /// reverse order.
    pub async fn restart_shard_group(
        &self,
        element: DataElement,
        hash_range_start: i32,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let known = self
            .configuration
            .shard_groups(element)
            .iter()
            .any(|group| group.hash_range_start == hash_range_start);
        if !known {
            return Err(Error::InvalidArgument(format!(
                "no shard group for {} with hash range start {}",
                element, hash_range_start
            )));
        }

        self.lifecycle
            .restart_shard_group(element, hash_range_start, cancel)
            .await?;

        Ok(())
    }

    /// Online-split one shard group's hash range in two. See the split
    /// module for the protocol.
    pub async fn split_shard_group(
        &mut self,
        request: SplitRequest,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let coordinator = SplitCoordinator::new(
            self.orchestrator.clone(),
            self.storage.clone(),
            &self.lifecycle,
            &self.registry,
            self.admin_transport.clone(),
            self.event_store.clone(),
            self.settings.clone(),
        );
        coordinator
            .split(
                &mut self.configuration,
                &mut self.next_shard_group_id,
                request,
                cancel,
            )
            .await?;

        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_shard_group_id;
        self.next_shard_group_id += 1;
        id
    }

    fn shard_group_config(
        &mut self,
        element: DataElement,
        hash_range_start: i32,
        credentials: Credentials,
    ) -> Result<ShardGroupConfig, Error> {
        let pod_port = self.settings.general.pod_port;
        let reader_node_id = self.next_id();
        let writer_node_id = self.next_id();

        Ok(ShardGroupConfig {
            data_element: element,
            hash_range_start,
            storage_credentials: credentials,
            reader_node_id,
            writer_node_id,
            reader_client: ClientConfig::new(internal_url(
                &node_identifier(element, NodeKind::Reader, hash_range_start),
                pod_port,
            )?),
            writer_client: ClientConfig::new(internal_url(
                &node_identifier(element, NodeKind::Writer, hash_range_start),
                pod_port,
            )?),
        })
    }

    async fn config_storage_credentials(&mut self) -> Result<Credentials, Error> {
        if let Some(credentials) = &self.configuration.config_storage_credentials {
            return Ok(credentials.clone());
        }

        let name = configuration_storage_name(&self.settings.general.storage_name_prefix);
        let credentials = self.storage.create_configuration_storage(&name).await?;
        self.configuration.config_storage_credentials = Some(credentials.clone());

        Ok(credentials)
    }

    async fn delete_service_if_exists(&self, name: &str) -> Result<(), Error> {
        match self.orchestrator.delete_service(name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn inputs_starts(descriptors: &[ShardGroupDescriptor]) -> Vec<i32> {
    descriptors
        .iter()
        .map(|descriptor| descriptor.hash_range_start)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::test::{descriptors, fixture, fixture_with_configuration};
    use super::*;
    use crate::orchestrator::Error as OrchestratorError;
    use crate::sharding::OperationKind;

    #[tokio::test]
    async fn test_create_load_balancers() {
        let mut fix = fixture();
        fix.create_load_balancers().await;

        let configuration = fix.manager.configuration();
        assert_eq!(
            configuration.router_external_url.as_ref().unwrap().as_str(),
            "http://10.104.198.1:7000/"
        );
        assert_eq!(
            configuration.writer_external_url.as_ref().unwrap().as_str(),
            "http://10.104.198.2:7001/"
        );

        let (_, selector) = fix.orchestrator.service(WRITER_EXTERNAL_SERVICE).unwrap();
        assert_eq!(selector, "writer");
    }

    #[tokio::test]
    async fn test_create_load_balancer_twice_is_invalid_state() {
        let mut fix = fixture();
        fix.create_load_balancers().await;

        let err = fix
            .manager
            .create_load_balancer(LoadBalancedEndpoint::Router, 7000, &fix.cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_create_minimal_instance() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        fix.create_instance(&[i32::MIN], &[i32::MIN], &[i32::MIN]).await;

        let configuration = fix.manager.configuration();
        assert_eq!(configuration.user_shard_groups.len(), 1);
        assert_eq!(configuration.group_to_group_shard_groups.len(), 1);
        assert_eq!(configuration.group_shard_groups.len(), 1);
        assert!(configuration.coordinator_external_url.is_some());

        // Two entries per group, ids 0..=5, routed at the internal services.
        let set = fix.persister.history().pop().unwrap();
        assert_eq!(set.len(), 6);
        let mut ids: Vec<u64> = set.iter().map(|entry| entry.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, [0, 1, 2, 3, 4, 5]);

        let user_query = set
            .lookup(DataElement::User, OperationKind::Query, 0)
            .unwrap();
        assert_eq!(
            user_query.client.base_url.as_str(),
            "http://user-reader-n2147483648-service:5000/"
        );
        let group_event = set
            .lookup(DataElement::Group, OperationKind::Event, 0)
            .unwrap();
        assert_eq!(
            group_event.client.base_url.as_str(),
            "http://group-writer-n2147483648-service:5000/"
        );

        assert!(fix.orchestrator.deployment(COORDINATOR_NODE).is_some());
        assert!(fix
            .orchestrator
            .service(COORDINATOR_EXTERNAL_SERVICE)
            .is_some());
        assert_eq!(fix.manager.next_shard_group_id(), 6);
    }

    #[tokio::test]
    async fn test_create_three_range_instance() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        // Group list deliberately unsorted.
        fix.create_instance(
            &[i32::MIN, 0],
            &[i32::MIN],
            &[715_827_884, i32::MIN, -715_827_882],
        )
        .await;

        let set = fix.persister.history().pop().unwrap();
        assert_eq!(set.len(), 12);
        let mut ids: Vec<u64> = set.iter().map(|entry| entry.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..12).collect::<Vec<u64>>());

        let starts: Vec<i32> = fix
            .manager
            .configuration()
            .group_shard_groups
            .iter()
            .map(|group| group.hash_range_start)
            .collect();
        assert_eq!(starts, [i32::MIN, -715_827_882, 715_827_884]);
    }

    #[tokio::test]
    async fn test_duplicate_hash_start_rejected_before_side_effects() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        let operations_before = fix.orchestrator.operations().len();

        let err = fix
            .manager
            .create_distributed_instance(
                descriptors(&[i32::MIN, 0, 0]),
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                &fix.cancel,
            )
            .await
            .unwrap_err();

        match err {
            Error::InvalidArgument(message) => {
                assert!(message.contains("contains duplicate hash range start value 0."))
            }
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
        assert_eq!(fix.orchestrator.operations().len(), operations_before);
        assert!(fix.storage.created().is_empty());
    }

    #[tokio::test]
    async fn test_instance_requires_load_balancers() {
        let mut fix = fixture();
        let err = fix
            .manager
            .create_distributed_instance(
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                &fix.cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_instance_cannot_be_created_twice() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        fix.create_instance(&[i32::MIN], &[i32::MIN], &[i32::MIN]).await;

        let err = fix
            .manager
            .create_distributed_instance(
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                &fix.cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_group_mapping_must_be_single_range() {
        let mut fix = fixture();
        fix.create_load_balancers().await;

        let err = fix
            .manager
            .create_distributed_instance(
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN, 0]),
                descriptors(&[i32::MIN]),
                &fix.cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_lists_must_start_at_minimum() {
        let mut fix = fixture();
        fix.create_load_balancers().await;

        let err = fix
            .manager
            .create_distributed_instance(
                descriptors(&[0]),
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                &fix.cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_node_id_allocation_recovers_from_configuration() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        fix.create_instance(&[i32::MIN, 0], &[i32::MIN], &[i32::MIN]).await;
        let configuration = fix.manager.configuration().clone();

        let recovered = fixture_with_configuration(configuration);
        assert_eq!(recovered.manager.next_shard_group_id(), 8);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_a_failed_create() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        // The user group comes up, then the mapping group's event cache
        // fails: the ids handed to the user group stay consumed.
        fix.orchestrator.fail_next(
            "create_deployment grouptogroupmapping-eventcache-n2147483648",
            OrchestratorError::Transport("scripted failure".into()),
        );

        let err = fix
            .manager
            .create_distributed_instance(
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                descriptors(&[i32::MIN]),
                &fix.cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lifecycle(_)));

        assert!(!fix.manager.configuration().is_provisioned());
        assert_eq!(fix.manager.next_shard_group_id(), 2);
    }

    #[tokio::test]
    async fn test_restart_shard_group() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        fix.create_instance(&[i32::MIN], &[i32::MIN], &[i32::MIN]).await;

        fix.manager
            .restart_shard_group(DataElement::User, i32::MIN, &fix.cancel)
            .await
            .unwrap();

        let operations = fix.orchestrator.operations();
        assert!(operations
            .iter()
            .any(|op| op == "patch_deployment_replicas user-reader-n2147483648 0"));
        assert!(operations
            .iter()
            .any(|op| op == "patch_deployment_replicas user-reader-n2147483648 1"));

        let err = fix
            .manager
            .restart_shard_group(DataElement::User, 42, &fix.cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delete_distributed_instance() {
        let mut fix = fixture();
        fix.create_load_balancers().await;
        fix.create_instance(&[i32::MIN], &[i32::MIN], &[i32::MIN]).await;

        fix.manager
            .delete_distributed_instance(&fix.cancel)
            .await
            .unwrap();

        assert!(fix.orchestrator.deployment_names().is_empty());
        assert!(fix.orchestrator.service_names().is_empty());
        let dropped = fix.storage.dropped();
        assert!(dropped.contains(&"user_n2147483648".to_string()));
        assert!(dropped.contains(&"grouptogroupmapping_n2147483648".to_string()));
        assert!(dropped.contains(&"group_n2147483648".to_string()));
        assert!(dropped.contains(&"configuration".to_string()));
        assert_eq!(fix.manager.configuration(), &InstanceConfiguration::default());
    }
}
