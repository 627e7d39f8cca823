//! Transport seam under the admin clients. Production goes through
//! reqwest; tests substitute a scripted transport. Only transport-level
//! failures are retried, a delivered non-2xx response never is.

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;
use url::Url;

use async_trait::async_trait;

use super::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait AdminTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<AdminResponse, TransportError>;

    async fn post(&self, url: &Url, body: Option<Value>) -> Result<AdminResponse, TransportError>;
}

/// Retry a call with doubling delays. Only transport failures count as
/// retryable; the final failure is returned as-is.
pub(super) async fn with_retries<F, Fut>(
    retries: u32,
    base_delay: Duration,
    mut call: F,
) -> Result<AdminResponse, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<AdminResponse, TransportError>>,
{
    let mut delay = base_delay;
    let mut attempt = 0;

    loop {
        match call().await {
            Ok(response) => return Ok(response),
            Err(err) => {
                attempt += 1;
                if attempt > retries {
                    return Err(err);
                }
                warn!("admin request failed ({}), retrying in {:?}", err, delay);
                sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdminTransport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<AdminResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| TransportError(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError(err.to_string()))?;

        Ok(AdminResponse { status, body })
    }

    async fn post(&self, url: &Url, body: Option<Value>) -> Result<AdminResponse, TransportError> {
        let mut request = self.client.post(url.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| TransportError(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError(err.to_string()))?;

        Ok(AdminResponse { status, body })
    }
}
