//! The shard configuration registry: the authoritative, durable
//! `ShardConfigurationSet` coordinators route from. Every mutation
//! rewrites the whole set in one call; that write is the linearization
//! point of any configuration change.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use async_trait::async_trait;

pub mod error;
pub mod memory;

pub use error::Error;
pub use memory::MemoryShardConfigurationPersister;

use crate::sharding::{ShardConfigurationSet, ShardGroupConfig};
use crate::storage::Credentials;

#[async_trait]
pub trait ShardConfigurationPersister: Send + Sync {
    async fn read(&self) -> Result<ShardConfigurationSet, Error>;

    /// Atomically replace the persisted set. With `overwrite` off, the
    /// write is rejected when a set already exists.
    async fn write(&self, set: &ShardConfigurationSet, overwrite: bool) -> Result<(), Error>;
}

/// Builds a persister from the configuration storage credentials.
/// The registry calls it at most once, on first use.
pub type PersisterFactory =
    Arc<dyn Fn(&Credentials) -> Arc<dyn ShardConfigurationPersister> + Send + Sync>;

pub struct ShardConfigRegistry {
    factory: PersisterFactory,
    persister: OnceCell<Arc<dyn ShardConfigurationPersister>>,
}

impl ShardConfigRegistry {
    pub fn new(factory: PersisterFactory) -> Self {
        Self {
            factory,
            persister: OnceCell::new(),
        }
    }

    /// Registry over an already-constructed persister. Used by tests and
    /// by coordinator replicas that share one persister.
    pub fn with_persister(persister: Arc<dyn ShardConfigurationPersister>) -> Self {
        Self::new(Arc::new(move |_: &Credentials| persister.clone()))
    }

    pub async fn write(
        &self,
        credentials: &Credentials,
        set: &ShardConfigurationSet,
        overwrite: bool,
    ) -> Result<(), Error> {
        self.persister(credentials).write(set, overwrite).await
    }

    pub async fn read(&self, credentials: &Credentials) -> Result<ShardConfigurationSet, Error> {
        self.persister(credentials).read().await
    }

    fn persister(&self, credentials: &Credentials) -> &Arc<dyn ShardConfigurationPersister> {
        self.persister.get_or_init(|| (self.factory)(credentials))
    }
}

/// Materialize the configuration set from shard group configs: one query
/// entry and one event entry per group, ids taken from the groups.
pub fn build_configuration_set<'a>(
    groups: impl IntoIterator<Item = &'a ShardGroupConfig>,
) -> Result<ShardConfigurationSet, crate::sharding::Error> {
    let mut set = ShardConfigurationSet::new();
    for group in groups {
        for entry in group.entries() {
            set.insert(entry)?;
        }
    }

    Ok(set)
}
