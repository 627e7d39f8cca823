//! Persistent storage provisioning. The control plane never interprets
//! storage credentials, it only creates instances and threads the returned
//! credentials through to node configuration and the registry persister.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod error;
pub mod memory;

pub use error::Error;
pub use memory::MemoryStorageProvisioner;

use crate::sharding::{hash_str, DataElement};

/// Opaque credentials for one storage instance. Produced by a provisioner,
/// consumed verbatim by node config rendering and the registry persister.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[async_trait]
pub trait StorageProvisioner: Send + Sync {
    /// Create the persistent store backing one shard group.
    async fn create_access_manager_storage(&self, name: &str) -> Result<Credentials, Error>;

    /// Create the store backing the shard configuration registry.
    async fn create_configuration_storage(&self, name: &str) -> Result<Credentials, Error>;

    /// Destroy a storage instance. Unknown names are not an error, so
    /// teardown can be retried.
    async fn drop_storage(&self, name: &str) -> Result<(), Error>;
}

/// Storage instance name for a shard group. The leading underscore is
/// elided when the prefix is empty, e.g. `user_n2147483648`.
pub fn storage_name(prefix: &str, element: DataElement, hash_range_start: i32) -> String {
    if prefix.is_empty() {
        format!("{}_{}", element, hash_str(hash_range_start))
    } else {
        format!("{}_{}_{}", prefix, element, hash_str(hash_range_start))
    }
}

/// Storage instance name for the shard configuration registry.
pub fn configuration_storage_name(prefix: &str) -> String {
    if prefix.is_empty() {
        "configuration".into()
    } else {
        format!("{}_configuration", prefix)
    }
}
