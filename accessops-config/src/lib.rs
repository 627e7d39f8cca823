// Submodules
pub mod core;
pub mod error;
pub mod general;
pub mod images;
pub mod probes;
pub mod retry;

pub use core::Settings;
pub use error::Error;
pub use general::{General, LogLevel};
pub use images::NodeImages;
pub use probes::Probes;
pub use retry::Retry;
