//! The shard configuration set: the durable table mapping
//! `(data element, operation, hash range start)` to a service endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use super::{DataElement, Error, OperationKind};
use crate::storage::Credentials;

/// REST client settings for reaching one shard node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: Url,
    #[serde(default = "ClientConfig::retry_count")]
    pub retry_count: u32,
    #[serde(default = "ClientConfig::retry_interval_seconds")]
    pub retry_interval_seconds: u32,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            retry_count: Self::retry_count(),
            retry_interval_seconds: Self::retry_interval_seconds(),
        }
    }

    fn retry_count() -> u32 {
        5
    }

    fn retry_interval_seconds() -> u32 {
        1
    }
}

/// One shard group as recorded in the instance configuration: the hash
/// range it owns, its storage credentials, and how to reach its nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ShardGroupConfig {
    pub data_element: DataElement,
    pub hash_range_start: i32,
    pub storage_credentials: Credentials,
    /// Names the query-routing entry for this group. Unique across the instance.
    pub reader_node_id: u64,
    /// Names the event-routing entry for this group. Unique across the instance.
    pub writer_node_id: u64,
    pub reader_client: ClientConfig,
    pub writer_client: ClientConfig,
}

impl ShardGroupConfig {
    /// The two configuration entries this group contributes to the set.
    pub fn entries(&self) -> [ShardConfigurationEntry; 2] {
        [
            ShardConfigurationEntry {
                id: self.reader_node_id,
                data_element: self.data_element,
                operation: OperationKind::Query,
                hash_range_start: self.hash_range_start,
                client: self.reader_client.clone(),
            },
            ShardConfigurationEntry {
                id: self.writer_node_id,
                data_element: self.data_element,
                operation: OperationKind::Event,
                hash_range_start: self.hash_range_start,
                client: self.writer_client.clone(),
            },
        ]
    }
}

/// One row of the shard configuration set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ShardConfigurationEntry {
    pub id: u64,
    pub data_element: DataElement,
    pub operation: OperationKind,
    pub hash_range_start: i32,
    #[serde(rename = "clientConfig")]
    pub client: ClientConfig,
}

type SetKey = (DataElement, OperationKind, i32);

/// The full set of shard configuration entries for an instance. Unique on
/// `(data element, operation, hash range start)` and on entry id; ordered
/// by that key. Persisted and transported as a flat array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<ShardConfigurationEntry>",
    into = "Vec<ShardConfigurationEntry>"
)]
pub struct ShardConfigurationSet {
    entries: BTreeMap<SetKey, ShardConfigurationEntry>,
}

impl ShardConfigurationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ShardConfigurationEntry) -> Result<(), Error> {
        let key = (entry.data_element, entry.operation, entry.hash_range_start);
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateEntry {
                element: entry.data_element,
                operation: entry.operation,
                start: entry.hash_range_start,
            });
        }
        if self.entries.values().any(|e| e.id == entry.id) {
            return Err(Error::DuplicateEntryId(entry.id));
        }
        self.entries.insert(key, entry);

        Ok(())
    }

    /// The entry responsible for `key_hash`: the one with the largest
    /// hash range start not exceeding it.
    pub fn lookup(
        &self,
        element: DataElement,
        operation: OperationKind,
        key_hash: i32,
    ) -> Option<&ShardConfigurationEntry> {
        self.entries
            .range((element, operation, i32::MIN)..=(element, operation, key_hash))
            .next_back()
            .map(|(_, entry)| entry)
    }

    /// All entries for an element/operation pair, ordered by range start.
    pub fn entries_for(
        &self,
        element: DataElement,
        operation: OperationKind,
    ) -> impl Iterator<Item = &ShardConfigurationEntry> {
        self.entries
            .range((element, operation, i32::MIN)..=(element, operation, i32::MAX))
            .map(|(_, entry)| entry)
    }

    pub fn remove(
        &mut self,
        element: DataElement,
        operation: OperationKind,
        start: i32,
    ) -> Option<ShardConfigurationEntry> {
        self.entries.remove(&(element, operation, start))
    }

    /// Point both the query and event entries at `start` to new clients.
    /// Entry ids are preserved.
    pub fn set_clients_at(
        &mut self,
        element: DataElement,
        start: i32,
        query_client: ClientConfig,
        event_client: ClientConfig,
    ) -> Result<(), Error> {
        for (operation, client) in [
            (OperationKind::Query, query_client),
            (OperationKind::Event, event_client),
        ] {
            let entry = self
                .entries
                .get_mut(&(element, operation, start))
                .ok_or(Error::UnknownRangeStart { element, start })?;
            entry.client = client;
        }

        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardConfigurationEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.entries.values().map(|e| e.id).max()
    }
}

impl TryFrom<Vec<ShardConfigurationEntry>> for ShardConfigurationSet {
    type Error = Error;

    fn try_from(entries: Vec<ShardConfigurationEntry>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry)?;
        }
        Ok(set)
    }
}

impl From<ShardConfigurationSet> for Vec<ShardConfigurationEntry> {
    fn from(set: ShardConfigurationSet) -> Self {
        set.entries.into_values().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn client(url: &str) -> ClientConfig {
        ClientConfig::new(Url::parse(url).unwrap())
    }

    fn entry(id: u64, operation: OperationKind, start: i32, url: &str) -> ShardConfigurationEntry {
        ShardConfigurationEntry {
            id,
            data_element: DataElement::User,
            operation,
            hash_range_start: start,
            client: client(url),
        }
    }

    fn two_range_set() -> ShardConfigurationSet {
        let mut set = ShardConfigurationSet::new();
        set.insert(entry(
            0,
            OperationKind::Query,
            i32::MIN,
            "http://user-reader-n2147483648-service:5000/",
        ))
        .unwrap();
        set.insert(entry(
            1,
            OperationKind::Event,
            i32::MIN,
            "http://user-writer-n2147483648-service:5000/",
        ))
        .unwrap();
        set.insert(entry(
            2,
            OperationKind::Query,
            0,
            "http://user-reader-0-service:5000/",
        ))
        .unwrap();
        set.insert(entry(
            3,
            OperationKind::Event,
            0,
            "http://user-writer-0-service:5000/",
        ))
        .unwrap();
        set
    }

    #[test]
    fn test_lookup_picks_largest_start_not_exceeding() {
        let set = two_range_set();

        let low = set
            .lookup(DataElement::User, OperationKind::Query, -1)
            .unwrap();
        assert_eq!(low.hash_range_start, i32::MIN);

        let boundary = set
            .lookup(DataElement::User, OperationKind::Query, 0)
            .unwrap();
        assert_eq!(boundary.hash_range_start, 0);

        let high = set
            .lookup(DataElement::User, OperationKind::Query, i32::MAX)
            .unwrap();
        assert_eq!(high.hash_range_start, 0);

        let min = set
            .lookup(DataElement::User, OperationKind::Event, i32::MIN)
            .unwrap();
        assert_eq!(min.id, 1);
    }

    #[test]
    fn test_lookup_misses_other_elements() {
        let set = two_range_set();
        assert!(set
            .lookup(DataElement::Group, OperationKind::Query, 0)
            .is_none());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut set = two_range_set();
        let err = set
            .insert(entry(9, OperationKind::Query, 0, "http://elsewhere:5000/"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry { start: 0, .. }));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut set = two_range_set();
        let err = set
            .insert(entry(0, OperationKind::Query, 100, "http://elsewhere:5000/"))
            .unwrap_err();
        assert_eq!(err, Error::DuplicateEntryId(0));
    }

    #[test]
    fn test_serde_round_trip_is_ordered_array() {
        let set = two_range_set();
        let json = serde_json::to_value(&set).unwrap();

        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array[0]["hashRangeStart"], i64::from(i32::MIN));
        assert!(array[0]["clientConfig"]["baseUrl"]
            .as_str()
            .unwrap()
            .contains("user-reader-n2147483648"));

        let back: ShardConfigurationSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_set_clients_at_repoints_both_operations() {
        let mut set = two_range_set();
        let router = client("http://user-router-0-service:5000/");
        set.set_clients_at(DataElement::User, 0, router.clone(), router.clone())
            .unwrap();

        for operation in [OperationKind::Query, OperationKind::Event] {
            let entry = set.lookup(DataElement::User, operation, 0).unwrap();
            assert_eq!(entry.client, router);
        }
        // Ids survive the repoint.
        assert_eq!(set.max_id(), Some(3));
    }

    #[test]
    fn test_set_clients_at_unknown_start() {
        let mut set = two_range_set();
        let c = client("http://x:5000/");
        let err = set
            .set_clients_at(DataElement::User, 42, c.clone(), c)
            .unwrap_err();
        assert_eq!(
            err,
            Error::UnknownRangeStart {
                element: DataElement::User,
                start: 42
            }
        );
    }
}
