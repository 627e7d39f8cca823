//! Process-wide settings. Components take their settings through
//! constructors; this global is the convenience layer an embedding
//! application loads once at startup.

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Arc;

pub use accessops_config::{Error, General, LogLevel, NodeImages, Probes, Retry, Settings};

static SETTINGS: Lazy<ArcSwap<Settings>> = Lazy::new(|| ArcSwap::from_pointee(Settings::default()));

/// Current settings.
pub fn settings() -> Arc<Settings> {
    SETTINGS.load().clone()
}

/// Load settings from disk and make them current.
pub fn load(path: &Path) -> Result<Settings, Error> {
    let settings = Settings::load(path)?;
    set(settings.clone());

    Ok(settings)
}

pub fn set(settings: Settings) {
    SETTINGS.store(Arc::new(settings));
}
