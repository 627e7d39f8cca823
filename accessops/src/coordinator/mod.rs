//! Query-path shard router run inside each coordinator replica. Holds a
//! periodically refreshed snapshot of the shard configuration set and
//! dispatches each incoming operation to the shard(s) responsible for
//! it. Snapshot swaps are atomic: a request sees the old set or the new
//! one, never a mix.

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use async_trait::async_trait;

pub mod error;

pub use error::Error;

use crate::registry::ShardConfigurationPersister;
use crate::sharding::{ClientConfig, DataElement, KeyHasher, OperationKind, ShardConfigurationSet};

/// Sends one routed operation to a shard node. The REST surface of the
/// nodes lives outside the control plane; this is its seam.
#[async_trait]
pub trait ShardRequestSender: Send + Sync {
    async fn send(
        &self,
        target: &ClientConfig,
        request: &ShardRequest,
    ) -> Result<ShardResponse, Error>;
}

#[derive(Debug, Clone)]
pub struct ShardRequest {
    pub element: DataElement,
    pub operation: OperationKind,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardResponse {
    pub values: Vec<String>,
}

pub struct ShardRouter {
    snapshot: ArcSwap<ShardConfigurationSet>,
    hasher: KeyHasher,
}

impl ShardRouter {
    pub fn new(hasher: KeyHasher) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ShardConfigurationSet::new()),
            hasher,
        }
    }

    pub fn with_set(set: ShardConfigurationSet, hasher: KeyHasher) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(set),
            hasher,
        }
    }

    /// Swap in a fresh configuration snapshot.
    pub fn refresh(&self, set: ShardConfigurationSet) {
        self.snapshot.store(Arc::new(set));
    }

    pub fn snapshot(&self) -> Arc<ShardConfigurationSet> {
        self.snapshot.load_full()
    }

    /// The client to reach the shard responsible for `key`.
    pub fn route(
        &self,
        element: DataElement,
        operation: OperationKind,
        key: &str,
    ) -> Result<ClientConfig, Error> {
        let key_hash = self.hasher.hash(key);
        self.snapshot
            .load()
            .lookup(element, operation, key_hash)
            .map(|entry| entry.client.clone())
            .ok_or(Error::NoShardConfigured {
                element,
                operation,
                key_hash,
            })
    }

    /// Clients for every shard of an element/operation pair, in range
    /// order.
    pub fn fan_out(&self, element: DataElement, operation: OperationKind) -> Vec<ClientConfig> {
        self.snapshot
            .load()
            .entries_for(element, operation)
            .map(|entry| entry.client.clone())
            .collect()
    }

    /// Route and send a single-key operation.
    pub async fn execute(
        &self,
        sender: &dyn ShardRequestSender,
        request: &ShardRequest,
    ) -> Result<ShardResponse, Error> {
        let target = self.route(request.element, request.operation, &request.key)?;
        sender.send(&target, request).await
    }

    /// Send an operation to every shard of the element and union the
    /// results, keeping first occurrences. Errors, including a downstream
    /// `ServiceUnavailable`, pass straight through without retry.
    pub async fn execute_fan_out(
        &self,
        sender: &dyn ShardRequestSender,
        request: &ShardRequest,
    ) -> Result<ShardResponse, Error> {
        let targets = self.fan_out(request.element, request.operation);
        if targets.is_empty() {
            return Err(Error::NoShardsConfigured {
                element: request.element,
                operation: request.operation,
            });
        }

        let responses = futures::future::try_join_all(
            targets.iter().map(|target| sender.send(target, request)),
        )
        .await?;

        let mut seen = HashSet::new();
        let mut values = vec![];
        for response in responses {
            for value in response.values {
                if seen.insert(value.clone()) {
                    values.push(value);
                }
            }
        }

        Ok(ShardResponse { values })
    }
}

/// Keep a router's snapshot fresh from the registry's persister. Runs
/// until cancelled; read failures are logged and the previous snapshot
/// stays in service.
pub fn spawn_refresh(
    router: Arc<ShardRouter>,
    persister: Arc<dyn ShardConfigurationPersister>,
    refresh_interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(refresh_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match persister.read().await {
                        Ok(set) => {
                            router.refresh(set);
                            debug!("shard configuration refreshed");
                        }
                        Err(err) => warn!("shard configuration refresh failed: {}", err),
                    }
                }
            }
        }
    })
}
