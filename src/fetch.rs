//! Remote fetch boundary for URL-sourced datasets

use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Request timeout for remote dataset fetches
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure taxonomy for the fetch boundary.
///
/// Transport-level unreachability (DNS, refused connections, CORS-type
/// blocks) is reported distinctly from HTTP status failures and from parse
/// failures of an otherwise successful response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not reach '{url}': {reason}")]
    Network { url: String, reason: String },
    #[error("'{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to parse the payload from '{url}': {reason}")]
    Parse { url: String, reason: String },
}

/// HTTP client with a session-scoped response cache.
///
/// The cache lives for the lifetime of the client; `invalidate` forces the
/// next fetch of a URL to hit the network again (metadata refresh).
pub struct FetchClient {
    client: Client,
    cache: HashMap<String, String>,
}

impl FetchClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            cache: HashMap::new(),
        })
    }

    /// Fetch a URL as text, consulting the session cache first
    pub async fn fetch_text(&mut self, url: &str) -> Result<String, FetchError> {
        if let Some(cached) = self.cache.get(url) {
            debug!(url, "Serving fetch from session cache");
            return Ok(cached.clone());
        }

        debug!(url, "Fetching remote dataset");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        self.cache.insert(url.to_string(), body.clone());
        Ok(body)
    }

    /// Drop a cached response so the next fetch re-reads the remote
    pub fn invalidate(&mut self, url: &str) {
        self.cache.remove(url);
    }
}
