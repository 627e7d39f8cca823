//! In-memory provisioner. Hands out deterministic credentials and records
//! what was created and dropped, so tests can assert on provisioning order
//! and teardown completeness.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Credentials, Error, StorageProvisioner};

#[derive(Default)]
pub struct MemoryStorageProvisioner {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    created: Vec<String>,
    dropped: Vec<String>,
    fail_creates: Vec<String>,
}

impl MemoryStorageProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage names created so far, in creation order.
    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.state.lock().dropped.clone()
    }

    /// Make the next create of `name` fail.
    pub fn fail_create(&self, name: &str) {
        self.state.lock().fail_creates.push(name.into());
    }

    fn create(&self, name: &str) -> Result<Credentials, Error> {
        let mut state = self.state.lock();
        if let Some(position) = state.fail_creates.iter().position(|n| n == name) {
            state.fail_creates.remove(position);
            return Err(Error::Create {
                name: name.into(),
                message: "scripted failure".into(),
            });
        }
        state.created.push(name.into());

        Ok(Credentials::new([
            ("host", "storage.internal".to_string()),
            ("database", name.to_string()),
            ("user", "accessops".to_string()),
            ("password", format!("memory-{}", name)),
        ]))
    }
}

#[async_trait]
impl StorageProvisioner for MemoryStorageProvisioner {
    async fn create_access_manager_storage(&self, name: &str) -> Result<Credentials, Error> {
        self.create(name)
    }

    async fn create_configuration_storage(&self, name: &str) -> Result<Credentials, Error> {
        self.create(name)
    }

    async fn drop_storage(&self, name: &str) -> Result<(), Error> {
        self.state.lock().dropped.push(name.into());
        Ok(())
    }
}
