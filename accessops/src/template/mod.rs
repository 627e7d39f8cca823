//! Node configuration rendering. Each node kind has a JSON template; the
//! renderer applies per-node overrides, validates that the template carries
//! the paths that kind requires, and emits the environment a launching
//! node consumes. Validation happens before any orchestrator or storage
//! call, so a bad template never leaves partial state behind.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use std::fmt;
use url::Url;

use accessops_config::LogLevel;

pub mod error;

pub use error::Error;

use crate::orchestrator::EnvVar;
use crate::sharding::DataElement;
use crate::storage::Credentials;

/// Mount point of the writer's event backup volume.
pub const EVENT_BACKUP_MOUNT: &str = "/eventbackup";

/// The kinds of node the control plane launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Reader,
    Writer,
    EventCache,
    Coordinator,
    Router,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Reader => "reader",
            NodeKind::Writer => "writer",
            NodeKind::EventCache => "eventcache",
            NodeKind::Coordinator => "coordinator",
            NodeKind::Router => "router",
        };
        write!(f, "{}", name)
    }
}

/// Hash ranges and shard endpoints a splitter router fans traffic over.
#[derive(Debug, Clone)]
pub struct RouterRouting {
    pub data_element: DataElement,
    pub source_query_url: Url,
    pub source_event_url: Url,
    pub source_range_start: i32,
    pub source_range_end: i32,
    pub target_query_url: Url,
    pub target_event_url: Url,
    pub target_range_start: i32,
    pub target_range_end: i32,
    /// Whether the router splits traffic from the start, or passes
    /// everything to the source until told otherwise.
    pub routing_on: bool,
}

/// Base JSON templates, one per node kind.
#[derive(Debug, Clone)]
pub struct NodeTemplates {
    pub reader: Value,
    pub writer: Value,
    pub event_cache: Value,
    pub coordinator: Value,
    pub router: Value,
}

impl Default for NodeTemplates {
    fn default() -> Self {
        Self {
            reader: json!({
                "DatabaseConnection": {},
                "EventCacheConnection": { "Host": "", "RetryCount": 10, "RetryInterval": 5 },
                "MetricLogging": { "MetricCategorySuffix": "" },
            }),
            writer: json!({
                "DatabaseConnection": {},
                "EventCacheConnection": { "Host": "", "RetryCount": 10, "RetryInterval": 5 },
                "EventPersistence": { "EventPersisterBackupFilePath": "" },
                "MetricLogging": { "MetricCategorySuffix": "" },
            }),
            event_cache: json!({
                "EventCaching": { "CachedEventCount": 5000 },
                "MetricLogging": { "MetricCategorySuffix": "" },
            }),
            coordinator: json!({
                "DatabaseConnection": {},
                "ShardConfigurationRefresh": { "RefreshInterval": 10000 },
                "MetricLogging": { "MetricCategorySuffix": "" },
            }),
            router: json!({
                "ShardRouting": {},
                "MetricLogging": { "MetricCategorySuffix": "" },
            }),
        }
    }
}

/// Renders the configuration environment for launching nodes.
#[derive(Debug, Clone)]
pub struct NodeConfigRenderer {
    templates: NodeTemplates,
    pod_port: u16,
    minimum_log_level: LogLevel,
}

impl NodeConfigRenderer {
    pub fn new(templates: NodeTemplates, pod_port: u16, minimum_log_level: LogLevel) -> Self {
        Self {
            templates,
            pod_port,
            minimum_log_level,
        }
    }

    pub fn render_event_cache(&self, node_name: &str) -> Result<Vec<EnvVar>, Error> {
        let mut template = self.templates.event_cache.clone();
        let kind = NodeKind::EventCache;
        set_path(&mut template, kind, "MetricLogging.MetricCategorySuffix", json!(node_name))?;

        self.encode(template)
    }

    pub fn render_reader(
        &self,
        node_name: &str,
        event_cache_url: &Url,
        credentials: &Credentials,
    ) -> Result<Vec<EnvVar>, Error> {
        let mut template = self.templates.reader.clone();
        let kind = NodeKind::Reader;
        set_path(
            &mut template,
            kind,
            "EventCacheConnection.Host",
            json!(event_cache_url.as_str()),
        )?;
        set_path(&mut template, kind, "MetricLogging.MetricCategorySuffix", json!(node_name))?;
        apply_credentials(&mut template, kind, credentials)?;

        self.encode(template)
    }

    pub fn render_writer(
        &self,
        node_name: &str,
        event_cache_url: &Url,
        credentials: &Credentials,
    ) -> Result<Vec<EnvVar>, Error> {
        let mut template = self.templates.writer.clone();
        let kind = NodeKind::Writer;
        set_path(
            &mut template,
            kind,
            "EventPersistence.EventPersisterBackupFilePath",
            json!(format!("{}/{}-eventbackup.json", EVENT_BACKUP_MOUNT, node_name)),
        )?;
        set_path(
            &mut template,
            kind,
            "EventCacheConnection.Host",
            json!(event_cache_url.as_str()),
        )?;
        set_path(&mut template, kind, "MetricLogging.MetricCategorySuffix", json!(node_name))?;
        apply_credentials(&mut template, kind, credentials)?;

        self.encode(template)
    }

    pub fn render_coordinator(
        &self,
        node_name: &str,
        credentials: &Credentials,
    ) -> Result<Vec<EnvVar>, Error> {
        let mut template = self.templates.coordinator.clone();
        let kind = NodeKind::Coordinator;
        set_path(&mut template, kind, "MetricLogging.MetricCategorySuffix", json!(node_name))?;
        apply_credentials(&mut template, kind, credentials)?;

        self.encode(template)
    }

    pub fn render_router(
        &self,
        node_name: &str,
        routing: &RouterRouting,
    ) -> Result<Vec<EnvVar>, Error> {
        let mut template = self.templates.router.clone();
        let kind = NodeKind::Router;
        let fields = [
            ("DataElementType", json!(routing.data_element.to_string())),
            ("SourceQueryShardBaseUrl", json!(routing.source_query_url.as_str())),
            ("SourceEventShardBaseUrl", json!(routing.source_event_url.as_str())),
            ("SourceShardHashRangeStart", json!(routing.source_range_start)),
            ("SourceShardHashRangeEnd", json!(routing.source_range_end)),
            ("TargetQueryShardBaseUrl", json!(routing.target_query_url.as_str())),
            ("TargetEventShardBaseUrl", json!(routing.target_event_url.as_str())),
            ("TargetShardHashRangeStart", json!(routing.target_range_start)),
            ("TargetShardHashRangeEnd", json!(routing.target_range_end)),
            ("RoutingInitiallyOn", json!(routing.routing_on)),
        ];
        for (field, value) in fields {
            set_path(&mut template, kind, &format!("ShardRouting.{}", field), value)?;
        }
        set_path(&mut template, kind, "MetricLogging.MetricCategorySuffix", json!(node_name))?;

        self.encode(template)
    }

    /// Check that the template for a node kind carries every object that
    /// kind's overrides write into. Called before any orchestrator or
    /// storage side effect, so a bad template fails the operation cleanly.
    pub fn validate(&self, kind: NodeKind) -> Result<(), Error> {
        let (template, required): (&Value, &[&str]) = match kind {
            NodeKind::Reader => (
                &self.templates.reader,
                &["EventCacheConnection", "MetricLogging", "DatabaseConnection"],
            ),
            NodeKind::Writer => (
                &self.templates.writer,
                &[
                    "EventPersistence",
                    "EventCacheConnection",
                    "MetricLogging",
                    "DatabaseConnection",
                ],
            ),
            NodeKind::EventCache => (&self.templates.event_cache, &["MetricLogging"]),
            NodeKind::Coordinator => (
                &self.templates.coordinator,
                &["MetricLogging", "DatabaseConnection"],
            ),
            NodeKind::Router => (&self.templates.router, &["ShardRouting", "MetricLogging"]),
        };

        for path in required {
            let present = template
                .as_object()
                .ok_or(Error::NotAnObject(kind))?
                .get(*path)
                .map(Value::is_object)
                .unwrap_or(false);
            if !present {
                return Err(Error::MissingPath {
                    kind,
                    path: path.to_string(),
                });
            }
        }

        Ok(())
    }

    fn encode(&self, template: Value) -> Result<Vec<EnvVar>, Error> {
        let encoded = STANDARD.encode(serde_json::to_vec(&template)?);

        Ok(vec![
            EnvVar::new("MODE", "Launch"),
            EnvVar::new("LISTEN_PORT", self.pod_port.to_string()),
            EnvVar::new("MINIMUM_LOG_LEVEL", self.minimum_log_level.to_string()),
            EnvVar::new("ENCODED_JSON_CONFIGURATION", encoded),
        ])
    }
}

/// Overwrite the value at a dotted path. Every segment but the last must
/// already exist in the template; the leaf is created or overwritten.
fn set_path(template: &mut Value, kind: NodeKind, path: &str, value: Value) -> Result<(), Error> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = &mut *template;
    let mut walked = String::new();

    for segment in &segments[..segments.len() - 1] {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);

        current = match current {
            Value::Object(map) => map.get_mut(*segment).ok_or_else(|| Error::MissingPath {
                kind,
                path: walked.clone(),
            })?,
            _ => return Err(Error::NotAnObject(kind)),
        };
    }

    let leaf = segments[segments.len() - 1];
    match current {
        Value::Object(map) => {
            map.insert(leaf.to_string(), value);
            Ok(())
        }
        _ => Err(Error::MissingPath {
            kind,
            path: walked,
        }),
    }
}

/// Write credential fields into the template's database connection
/// section. Credentials stay opaque: every field is copied verbatim.
fn apply_credentials(
    template: &mut Value,
    kind: NodeKind,
    credentials: &Credentials,
) -> Result<(), Error> {
    for (key, value) in credentials.iter() {
        set_path(
            template,
            kind,
            &format!("DatabaseConnection.{}", key),
            json!(value),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn renderer() -> NodeConfigRenderer {
        NodeConfigRenderer::new(NodeTemplates::default(), 5000, LogLevel::Information)
    }

    fn decode(env: &[EnvVar]) -> Value {
        let encoded = env
            .iter()
            .find(|var| var.name == "ENCODED_JSON_CONFIGURATION")
            .unwrap();
        serde_json::from_slice(&STANDARD.decode(&encoded.value).unwrap()).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new([("host", "db.internal"), ("database", "user_0")])
    }

    #[test]
    fn test_standard_env_always_injected() {
        let env = renderer().render_event_cache("user-eventcache-0").unwrap();
        let names: Vec<&str> = env.iter().map(|var| var.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "MODE",
                "LISTEN_PORT",
                "MINIMUM_LOG_LEVEL",
                "ENCODED_JSON_CONFIGURATION"
            ]
        );
        assert_eq!(env[0].value, "Launch");
        assert_eq!(env[1].value, "5000");
        assert_eq!(env[2].value, "Information");
    }

    #[test]
    fn test_reader_overrides() {
        let url = Url::parse("http://user-eventcache-0-service:5000/").unwrap();
        let env = renderer()
            .render_reader("user-reader-0", &url, &credentials())
            .unwrap();

        let config = decode(&env);
        assert_eq!(
            config["EventCacheConnection"]["Host"],
            "http://user-eventcache-0-service:5000/"
        );
        assert_eq!(config["MetricLogging"]["MetricCategorySuffix"], "user-reader-0");
        assert_eq!(config["DatabaseConnection"]["host"], "db.internal");
        assert_eq!(config["DatabaseConnection"]["database"], "user_0");
    }

    #[test]
    fn test_writer_backup_file_path() {
        let url = Url::parse("http://group-eventcache-0-service:5000/").unwrap();
        let env = renderer()
            .render_writer("group-writer-0", &url, &credentials())
            .unwrap();

        let config = decode(&env);
        assert_eq!(
            config["EventPersistence"]["EventPersisterBackupFilePath"],
            "/eventbackup/group-writer-0-eventbackup.json"
        );
    }

    #[test]
    fn test_router_overrides() {
        let routing = RouterRouting {
            data_element: DataElement::Group,
            source_query_url: Url::parse("http://group-reader-0-service:5000/").unwrap(),
            source_event_url: Url::parse("http://group-writer-0-service:5000/").unwrap(),
            source_range_start: 0,
            source_range_end: 715_827_883,
            target_query_url: Url::parse("http://group-reader-715827884-service:5000/").unwrap(),
            target_event_url: Url::parse("http://group-writer-715827884-service:5000/").unwrap(),
            target_range_start: 715_827_884,
            target_range_end: i32::MAX,
            routing_on: false,
        };
        let env = renderer().render_router("group-router-0", &routing).unwrap();

        let config = decode(&env);
        let shard_routing = &config["ShardRouting"];
        assert_eq!(shard_routing["DataElementType"], "group");
        assert_eq!(shard_routing["SourceShardHashRangeStart"], 0);
        assert_eq!(shard_routing["SourceShardHashRangeEnd"], 715_827_883);
        assert_eq!(shard_routing["TargetShardHashRangeStart"], 715_827_884);
        assert_eq!(shard_routing["TargetShardHashRangeEnd"], i32::MAX);
        assert_eq!(shard_routing["RoutingInitiallyOn"], false);
    }

    #[test]
    fn test_missing_event_cache_path_fails() {
        let mut templates = NodeTemplates::default();
        templates.reader = json!({
            "DatabaseConnection": {},
            "MetricLogging": { "MetricCategorySuffix": "" },
        });
        let renderer = NodeConfigRenderer::new(templates, 5000, LogLevel::Information);

        let url = Url::parse("http://user-eventcache-0-service:5000/").unwrap();
        let err = renderer
            .render_reader("user-reader-0", &url, &credentials())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "JSON path 'EventCacheConnection' doesn't exist in reader node template"
        );
    }

    #[test]
    fn test_missing_shard_routing_path_fails() {
        let mut templates = NodeTemplates::default();
        templates.router = json!({ "MetricLogging": { "MetricCategorySuffix": "" } });
        let renderer = NodeConfigRenderer::new(templates, 5000, LogLevel::Information);

        let routing = RouterRouting {
            data_element: DataElement::User,
            source_query_url: Url::parse("http://a:5000/").unwrap(),
            source_event_url: Url::parse("http://b:5000/").unwrap(),
            source_range_start: i32::MIN,
            source_range_end: -1,
            target_query_url: Url::parse("http://c:5000/").unwrap(),
            target_event_url: Url::parse("http://d:5000/").unwrap(),
            target_range_start: 0,
            target_range_end: i32::MAX,
            routing_on: false,
        };
        let err = renderer.render_router("user-router-0", &routing).unwrap_err();
        assert!(matches!(err, Error::MissingPath { path, .. } if path == "ShardRouting"));
    }
}
