//! In-memory persister. Keeps every written snapshot so tests can assert
//! that observers could never have seen a torn or intermediate set.

use parking_lot::Mutex;

use async_trait::async_trait;

use super::{Error, ShardConfigurationPersister};
use crate::sharding::ShardConfigurationSet;

#[derive(Default)]
pub struct MemoryShardConfigurationPersister {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    history: Vec<ShardConfigurationSet>,
    fail_next_write: bool,
}

impl MemoryShardConfigurationPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every set ever written, in write order.
    pub fn history(&self) -> Vec<ShardConfigurationSet> {
        self.state.lock().history.clone()
    }

    pub fn fail_next_write(&self) {
        self.state.lock().fail_next_write = true;
    }
}

#[async_trait]
impl ShardConfigurationPersister for MemoryShardConfigurationPersister {
    async fn read(&self) -> Result<ShardConfigurationSet, Error> {
        self.state.lock().history.last().cloned().ok_or(Error::NotFound)
    }

    async fn write(&self, set: &ShardConfigurationSet, overwrite: bool) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(Error::Persistence("scripted failure".into()));
        }
        if !overwrite && !state.history.is_empty() {
            return Err(Error::AlreadyExists);
        }
        state.history.push(set.clone());

        Ok(())
    }
}
