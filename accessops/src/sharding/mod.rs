//! Shard data model: data elements, hash ranges and the shard configuration set.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod entry;
pub mod error;
pub mod hasher;
pub mod range;

pub use entry::{ClientConfig, ShardConfigurationEntry, ShardConfigurationSet, ShardGroupConfig};
pub use error::Error;
pub use hasher::KeyHasher;
pub use range::{range_end, validate_range_starts};

/// The kind of graph element a shard holds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DataElement {
    User,
    GroupToGroupMapping,
    Group,
}

impl DataElement {
    /// All element kinds, in instance-creation order.
    pub fn all() -> [DataElement; 3] {
        [
            DataElement::User,
            DataElement::GroupToGroupMapping,
            DataElement::Group,
        ]
    }
}

impl fmt::Display for DataElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataElement::User => "user",
            DataElement::GroupToGroupMapping => "grouptogroupmapping",
            DataElement::Group => "group",
        };
        write!(f, "{}", name)
    }
}

/// Distinguishes read traffic (reader nodes) from write traffic (writer nodes).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Query,
    Event,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Query => "query",
            OperationKind::Event => "event",
        };
        write!(f, "{}", name)
    }
}

/// Render a hash value for use in resource and storage names.
/// Negative values get an `n` prefix instead of a minus sign.
pub fn hash_str(hash: i32) -> String {
    if hash < 0 {
        format!("n{}", hash.unsigned_abs())
    } else {
        hash.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hash_str() {
        assert_eq!(hash_str(0), "0");
        assert_eq!(hash_str(715_827_884), "715827884");
        assert_eq!(hash_str(-1), "n1");
        assert_eq!(hash_str(i32::MIN), "n2147483648");
        assert_eq!(hash_str(i32::MAX), "2147483647");
    }

    #[test]
    fn test_element_names() {
        assert_eq!(DataElement::User.to_string(), "user");
        assert_eq!(
            DataElement::GroupToGroupMapping.to_string(),
            "grouptogroupmapping"
        );
        assert_eq!(DataElement::Group.to_string(), "group");
    }

    #[test]
    fn test_element_serde() {
        assert_eq!(
            serde_json::to_string(&DataElement::GroupToGroupMapping).unwrap(),
            "\"groupToGroupMapping\""
        );
        assert_eq!(
            serde_json::to_string(&OperationKind::Query).unwrap(),
            "\"query\""
        );
    }
}
