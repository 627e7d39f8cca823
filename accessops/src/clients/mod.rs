//! Thin control-plane clients over node REST admin endpoints, and the
//! event log seams the split protocol copies through.

pub mod admin;
pub mod error;
pub mod events;
#[cfg(test)]
pub(crate) mod test;
pub mod transport;

pub use admin::{RouterAdminClient, WriterAdminClient};
pub use error::{Error, TransportError};
pub use events::{Event, EventBulkPersister, EventDeleter, EventReader, EventStoreFactory};
pub use transport::{AdminResponse, AdminTransport, HttpTransport};
