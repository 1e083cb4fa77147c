//! Outbound HTTP probing for link health checks.
//!
//! [`HttpProber`] is the seam the link job talks to; [`ReqwestProber`] is the
//! production implementation. A probe reports the final status code after
//! redirects, or an error if no response arrived in time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Errors that can occur while probing a URL.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The request could not be sent or the response could not be read.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// No response before the deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Issues a GET and reports the response status.
#[async_trait]
pub trait HttpProber: Send + Sync {
    /// Fetches `url` and returns the HTTP status code, giving up after `timeout`.
    async fn get_status(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

/// [`HttpProber`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestProber {
    client: Client,
}

impl ReqwestProber {
    /// Creates a prober with its own connection pool.
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("blog-server/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Creates a prober over an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpProber for ReqwestProber {
    async fn get_status(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let request = self.client.get(url).timeout(timeout).send();

        // The outer deadline also bounds DNS and connect.
        let response = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(ProbeError::Timeout(timeout)),
            Ok(Err(e)) => return Err(ProbeError::Request(e)),
            Err(_) => return Err(ProbeError::Timeout(timeout)),
        };

        Ok(response.status().as_u16())
    }
}
