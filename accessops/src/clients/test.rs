//! Shared test doubles: a scripted admin transport and an in-memory
//! event store keyed by storage credentials.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use url::Url;

use async_trait::async_trait;

use super::error::TransportError;
use super::events::{Event, EventBulkPersister, EventDeleter, EventReader, EventStoreFactory};
use super::transport::{AdminResponse, AdminTransport};
use super::Error;
use crate::storage::Credentials;

#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    requests: Vec<(String, String, Option<Value>)>,
    responses: Vec<Result<AdminResponse, TransportError>>,
    in_flight_counts: Vec<u64>,
}

impl MockTransport {
    pub fn respond(&self, status: u16, body: &str) {
        self.state.lock().responses.push(Ok(AdminResponse {
            status,
            body: body.into(),
        }));
    }

    pub fn fail(&self, message: &str) {
        self.state
            .lock()
            .responses
            .push(Err(TransportError(message.into())));
    }

    /// Responses for successive `writer/inflight` reads. The last value
    /// repeats once the script runs out.
    pub fn in_flight_counts(&self, counts: &[u64]) {
        self.state.lock().in_flight_counts = counts.to_vec();
    }

    pub fn requests(&self) -> Vec<(String, String, Option<Value>)> {
        self.state.lock().requests.clone()
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.1).collect()
    }

    fn pop(
        &self,
        method: &str,
        url: &Url,
        body: Option<Value>,
    ) -> Result<AdminResponse, TransportError> {
        let mut state = self.state.lock();
        state.requests.push((method.into(), url.to_string(), body));

        if url.path().ends_with("/writer/inflight") && !state.in_flight_counts.is_empty() {
            let count = if state.in_flight_counts.len() > 1 {
                state.in_flight_counts.remove(0)
            } else {
                state.in_flight_counts[0]
            };
            return Ok(AdminResponse {
                status: 200,
                body: count.to_string(),
            });
        }

        if state.responses.is_empty() {
            Ok(AdminResponse {
                status: 200,
                body: String::new(),
            })
        } else {
            state.responses.remove(0)
        }
    }
}

#[async_trait]
impl AdminTransport for MockTransport {
    async fn get(&self, url: &Url) -> Result<AdminResponse, TransportError> {
        self.pop("GET", url, None)
    }

    async fn post(&self, url: &Url, body: Option<Value>) -> Result<AdminResponse, TransportError> {
        self.pop("POST", url, body)
    }
}

/// Event logs keyed by the `database` credential field.
#[derive(Default)]
pub struct MemoryEventStore {
    logs: Mutex<HashMap<String, Vec<Event>>>,
}

impl MemoryEventStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, database: &str, events: Vec<Event>) {
        self.logs.lock().insert(database.into(), events);
    }

    pub fn events(&self, database: &str) -> Vec<Event> {
        self.logs.lock().get(database).cloned().unwrap_or_default()
    }

    fn key(credentials: &Credentials) -> String {
        credentials.get("database").unwrap_or_default().to_string()
    }
}

struct StoreHandle {
    store: Arc<MemoryEventStore>,
    key: String,
}

#[async_trait]
impl EventReader for StoreHandle {
    async fn read_batch(&self, after: Option<u64>, limit: usize) -> Result<Vec<Event>, Error> {
        let logs = self.store.logs.lock();
        let events = logs.get(&self.key).cloned().unwrap_or_default();

        Ok(events
            .into_iter()
            .filter(|event| after.map(|seq| event.sequence > seq).unwrap_or(true))
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl EventBulkPersister for StoreHandle {
    async fn persist(&self, events: &[Event]) -> Result<(), Error> {
        let mut logs = self.store.logs.lock();
        let log = logs.entry(self.key.clone()).or_default();
        for event in events {
            if !log.iter().any(|existing| existing.sequence == event.sequence) {
                log.push(event.clone());
            }
        }
        log.sort_by_key(|event| event.sequence);

        Ok(())
    }
}

#[async_trait]
impl EventDeleter for StoreHandle {
    async fn delete_range(&self, range: RangeInclusive<i32>) -> Result<(), Error> {
        let mut logs = self.logs_for_key();
        logs.retain(|event| !range.contains(&event.hash_code));
        self.store.logs.lock().insert(self.key.clone(), logs);

        Ok(())
    }
}

impl StoreHandle {
    fn logs_for_key(&self) -> Vec<Event> {
        self.store
            .logs
            .lock()
            .get(&self.key)
            .cloned()
            .unwrap_or_default()
    }
}

pub struct MemoryEventStoreFactory {
    pub store: Arc<MemoryEventStore>,
}

impl EventStoreFactory for MemoryEventStoreFactory {
    fn reader(&self, credentials: &Credentials) -> Arc<dyn EventReader> {
        Arc::new(StoreHandle {
            store: self.store.clone(),
            key: MemoryEventStore::key(credentials),
        })
    }

    fn bulk_persister(&self, credentials: &Credentials) -> Arc<dyn EventBulkPersister> {
        Arc::new(StoreHandle {
            store: self.store.clone(),
            key: MemoryEventStore::key(credentials),
        })
    }

    fn deleter(&self, credentials: &Credentials) -> Arc<dyn EventDeleter> {
        Arc::new(StoreHandle {
            store: self.store.clone(),
            key: MemoryEventStore::key(credentials),
        })
    }
}

pub fn event(sequence: u64, hash_code: i32) -> Event {
    Event {
        sequence,
        hash_code,
        data: serde_json::json!({ "sequence": sequence }),
    }
}
