//! HTTPS transport for signed datasets.
//!
//! Payload and signature endpoints are plain `GET`s returning binary
//! bodies. Anything other than HTTP 200 is a service error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::{debug, info, instrument, warn};

use crate::error::VerifyError;

/// Header carrying the optional API token.
pub const TOKEN_HEADER: &str = "X-Token";

/// Fetches raw dataset and signature bodies.
#[async_trait]
pub trait DatasetTransport: Send + Sync {
    /// `GET url` and return the body of a 200 response.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, VerifyError>;
}

/// `reqwest`-backed transport.
pub struct HttpsClient {
    client: Client,
    api_token: Option<String>,
}

impl HttpsClient {
    /// Create a new HTTPS client.
    pub fn new(timeout: Duration, api_token: Option<String>) -> Result<Self, VerifyError> {
        let connect_timeout = timeout.min(Duration::from_secs(10));

        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent(format!("hcert-verify/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VerifyError::ServiceError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, api_token })
    }
}

#[async_trait]
impl DatasetTransport for HttpsClient {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, VerifyError> {
        debug!(url = %url, "HTTPS: fetching");

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/octet-stream");
        if let Some(token) = &self.api_token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "HTTPS request failed");
            VerifyError::ServiceError {
                message: format!("Request to {} failed: {}", url, e),
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(url = %url, status = %status, "HTTPS: Non-200 status");
            return Err(VerifyError::ServiceError {
                message: format!("HTTP {} from {}", status, url),
            });
        }

        let body = response.bytes().await.map_err(|e| VerifyError::ServiceError {
            message: format!("Failed to read body from {}: {}", url, e),
        })?;

        info!(url = %url, len = body.len(), "HTTPS: body received");
        Ok(body.to_vec())
    }
}
