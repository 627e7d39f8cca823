//! The instance configuration: everything the control plane must remember
//! about a provisioned instance to manage and reshape it later. Operators
//! persist this document between control-plane runs; node id allocation
//! is recovered from it on load.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::sharding::{DataElement, ShardGroupConfig};
use crate::storage::Credentials;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstanceConfiguration {
    /// External URL of the splitter router load balancer, once provisioned.
    #[serde(default)]
    pub router_external_url: Option<Url>,
    /// External URL used to reach a writer directly during a split.
    #[serde(default)]
    pub writer_external_url: Option<Url>,
    /// External URL of the coordinator load balancer.
    #[serde(default)]
    pub coordinator_external_url: Option<Url>,
    /// Credentials of the shard configuration registry's own store.
    #[serde(default)]
    pub config_storage_credentials: Option<Credentials>,
    #[serde(default)]
    pub user_shard_groups: Vec<ShardGroupConfig>,
    #[serde(default)]
    pub group_to_group_shard_groups: Vec<ShardGroupConfig>,
    #[serde(default)]
    pub group_shard_groups: Vec<ShardGroupConfig>,
}

impl InstanceConfiguration {
    pub fn shard_groups(&self, element: DataElement) -> &[ShardGroupConfig] {
        match element {
            DataElement::User => &self.user_shard_groups,
            DataElement::GroupToGroupMapping => &self.group_to_group_shard_groups,
            DataElement::Group => &self.group_shard_groups,
        }
    }

    pub(crate) fn shard_groups_mut(&mut self, element: DataElement) -> &mut Vec<ShardGroupConfig> {
        match element {
            DataElement::User => &mut self.user_shard_groups,
            DataElement::GroupToGroupMapping => &mut self.group_to_group_shard_groups,
            DataElement::Group => &mut self.group_shard_groups,
        }
    }

    pub fn all_shard_groups(&self) -> impl Iterator<Item = &ShardGroupConfig> {
        self.user_shard_groups
            .iter()
            .chain(self.group_to_group_shard_groups.iter())
            .chain(self.group_shard_groups.iter())
    }

    /// Largest node id handed out so far, across every shard group.
    pub fn max_node_id(&self) -> Option<u64> {
        self.all_shard_groups()
            .flat_map(|group| [group.reader_node_id, group.writer_node_id])
            .max()
    }

    /// Shard groups have been created.
    pub fn is_provisioned(&self) -> bool {
        self.all_shard_groups().next().is_some()
    }
}

/// Input describing one shard group to create.
#[derive(Debug, Clone)]
pub struct ShardGroupDescriptor {
    pub hash_range_start: i32,
    /// Reuse existing storage instead of provisioning new.
    pub storage_credentials: Option<Credentials>,
}

impl ShardGroupDescriptor {
    pub fn new(hash_range_start: i32) -> Self {
        Self {
            hash_range_start,
            storage_credentials: None,
        }
    }

    pub fn with_credentials(hash_range_start: i32, credentials: Credentials) -> Self {
        Self {
            hash_range_start,
            storage_credentials: Some(credentials),
        }
    }
}
