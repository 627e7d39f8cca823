use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;
use tracing::{info, warn};

use super::error::Error;
use super::general::General;
use super::images::NodeImages;
use super::probes::Probes;
use super::retry::Retry;

/// Control plane settings, usually loaded from `accessops.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub images: NodeImages,
    #[serde(default)]
    pub probes: Probes,
    #[serde(default)]
    pub retry: Retry,
}

impl Settings {
    /// Load settings from disk or use defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let settings = if let Ok(text) = read_to_string(path) {
            let settings = toml::from_str(&text)?;
            info!("loaded \"{}\"", path.display());
            settings
        } else {
            warn!(
                "\"{}\" doesn't exist, loading defaults instead",
                path.display()
            );
            Settings::default()
        };

        Ok(settings)
    }
}
