use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::{QueueError, Result};
use crate::network::network_session::{HttpMethod, HttpRequest, HttpResponse, NetworkSession};

/// [`NetworkSession`] over a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestNetworkSession {
    client: Client,
}

impl ReqwestNetworkSession {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("offline-queue/{}", config.sdk_version))
            .build()
            .map_err(|e| {
                QueueError::ConfigurationError(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            timeout_ms = timeout.as_millis() as u64,
            "Created reqwest network session"
        );
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let config = NetworkConfig {
            request_timeout_ms: timeout.as_millis() as u64,
            ..NetworkConfig::default()
        };
        Self::new(&config)
    }
}

#[async_trait]
impl NetworkSession for ReqwestNetworkSession {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "Sending request");

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "Request failed before a response arrived");
            QueueError::transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| QueueError::transport(format!("Failed to read response body: {e}")))?;

        debug!(status, body_len = body.len(), "Received response");
        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    #[tokio::test]
    async fn test_unreachable_host_is_a_transport_error() {
        let session = ReqwestNetworkSession::with_timeout(Duration::from_millis(500)).unwrap();
        let request = HttpRequest {
            method: HttpMethod::Get,
            // Port 9 on loopback refuses connections
            url: Url::parse("http://127.0.0.1:9/api/events/track").unwrap(),
            headers: BTreeMap::new(),
            body: None,
        };

        let error = session.send(&request).await.unwrap_err();
        assert!(error.is_transport());
    }
}
