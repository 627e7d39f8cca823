use serde::{Deserialize, Serialize};

/// Container image for each node kind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NodeImages {
    #[serde(default = "NodeImages::reader")]
    pub reader: String,
    #[serde(default = "NodeImages::writer")]
    pub writer: String,
    #[serde(default = "NodeImages::event_cache")]
    pub event_cache: String,
    #[serde(default = "NodeImages::coordinator")]
    pub coordinator: String,
    #[serde(default = "NodeImages::router")]
    pub router: String,
}

impl NodeImages {
    fn reader() -> String {
        "applicationaccess/readernode:latest".into()
    }

    fn writer() -> String {
        "applicationaccess/writernode:latest".into()
    }

    fn event_cache() -> String {
        "applicationaccess/eventcachenode:latest".into()
    }

    fn coordinator() -> String {
        "applicationaccess/coordinatornode:latest".into()
    }

    fn router() -> String {
        "applicationaccess/routernode:latest".into()
    }
}

impl Default for NodeImages {
    fn default() -> Self {
        Self {
            reader: Self::reader(),
            writer: Self::writer(),
            event_cache: Self::event_cache(),
            coordinator: Self::coordinator(),
            router: Self::router(),
        }
    }
}
