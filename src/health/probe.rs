//! HAProxy health probing.
//!
//! # Responsibilities
//! - Ask the running proxy whether it serves traffic after a reload
//! - Treat timeouts and connection errors as unhealthy

use std::time::Duration;

/// HTTP probe against the proxy's monitor URI.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    url: Option<String>,
}

impl HealthProbe {
    /// Probe `url` with a per-request `timeout`. Without a URL every probe
    /// passes and the reload command's exit status is the only signal.
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .user_agent("haproxy-manager-health-check")
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default probe client");
                reqwest::Client::new()
            });

        Self { client, url }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// One probe: true when the proxy answered with a 2xx status.
    pub async fn check(&self) -> bool {
        let Some(url) = &self.url else {
            return true;
        };

        match self.client.get(url).send().await {
            Ok(response) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(url = %url, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(url = %url, "Health check failed: timeout");
                false
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Health check failed: connection error");
                false
            }
        }
    }
}
