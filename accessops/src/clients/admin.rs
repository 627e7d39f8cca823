//! Admin clients for the router and writer nodes. The split protocol
//! drives both: the router to hold and redirect traffic, the writer to
//! verify quiescence before the final event copy batch.

use serde_json::json;
use std::sync::Arc;
use url::Url;

use accessops_config::Retry;

use super::error::Error;
use super::transport::{with_retries, AdminResponse, AdminTransport};

/// Map a delivered response onto the client error kinds. 400 means the
/// caller sent something invalid, 5xx is the node's problem; neither is
/// retried.
fn check_status(response: AdminResponse, what: &str) -> Result<AdminResponse, Error> {
    match response.status {
        200..=299 => Ok(response),
        400 => Err(Error::InvalidArgument(format!(
            "{}: {}",
            what, response.body
        ))),
        404 => Err(Error::NotFound(what.into())),
        500..=599 => Err(Error::Internal {
            what: what.into(),
            status: response.status,
        }),
        status => Err(Error::UnexpectedStatus {
            what: what.into(),
            status,
        }),
    }
}

pub struct RouterAdminClient {
    transport: Arc<dyn AdminTransport>,
    base_url: Url,
    retry: Retry,
}

impl RouterAdminClient {
    pub fn new(transport: Arc<dyn AdminTransport>, base_url: Url, retry: Retry) -> Self {
        Self {
            transport,
            base_url,
            retry,
        }
    }

    /// Start or stop splitting traffic between source and target ranges.
    pub async fn set_routing_on(&self, on: bool) -> Result<(), Error> {
        let url = self.base_url.join("routing")?;
        let response = with_retries(
            self.retry.admin_request_retries,
            self.retry.admin_base_delay(),
            || self.transport.post(&url, Some(json!({ "on": on }))),
        )
        .await?;
        check_status(response, "set routing")?;

        Ok(())
    }

    /// Hold incoming operations. Held operations complete when
    /// `resume_operations` is called.
    pub async fn pause_operations(&self) -> Result<(), Error> {
        let url = self.base_url.join("pause")?;
        let response = with_retries(
            self.retry.admin_request_retries,
            self.retry.admin_base_delay(),
            || self.transport.post(&url, None),
        )
        .await?;
        check_status(response, "pause operations")?;

        Ok(())
    }

    pub async fn resume_operations(&self) -> Result<(), Error> {
        let url = self.base_url.join("resume")?;
        let response = with_retries(
            self.retry.admin_request_retries,
            self.retry.admin_base_delay(),
            || self.transport.post(&url, None),
        )
        .await?;
        check_status(response, "resume operations")?;

        Ok(())
    }
}

pub struct WriterAdminClient {
    transport: Arc<dyn AdminTransport>,
    base_url: Url,
    retry: Retry,
}

impl WriterAdminClient {
    pub fn new(transport: Arc<dyn AdminTransport>, base_url: Url, retry: Retry) -> Self {
        Self {
            transport,
            base_url,
            retry,
        }
    }

    /// Number of events the writer has accepted but not yet persisted.
    pub async fn in_flight_event_count(&self) -> Result<u64, Error> {
        let url = self.base_url.join("writer/inflight")?;
        let response = with_retries(
            self.retry.admin_request_retries,
            self.retry.admin_base_delay(),
            || self.transport.get(&url),
        )
        .await?;
        let response = check_status(response, "in-flight event count")?;

        response
            .body
            .trim()
            .parse()
            .map_err(|_| Error::BadResponse {
                what: "in-flight event count".into(),
                message: format!("expected an integer, got \"{}\"", response.body),
            })
    }
}
