//! Resource naming. A node is identified by its element, kind and hash
//! range start; everything else derives from that identifier.

use url::Url;

use crate::sharding::{hash_str, DataElement};
use crate::template::NodeKind;

pub fn node_identifier(element: DataElement, kind: NodeKind, hash_range_start: i32) -> String {
    format!("{}-{}-{}", element, kind, hash_str(hash_range_start))
}

pub fn internal_service_name(node: &str) -> String {
    format!("{}-service", node)
}

pub fn external_service_name(node: &str) -> String {
    format!("{}-externalservice", node)
}

/// Cluster-internal URL a node is reached at through its service.
pub fn internal_url(node: &str, pod_port: u16) -> Result<Url, url::ParseError> {
    Url::parse(&format!("http://{}:{}/", internal_service_name(node), pod_port))
}
