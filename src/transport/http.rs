// src/transport/http.rs
//
// Broker HTTP bridge: each message is a POST of the JSON payload to
// `<url>/<topic>`.

use std::time::Duration;
use tracing::debug;

use super::{Transport, TransportError};
use crate::types::TransportConfig;

pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::connect(&config.url, e))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}", self.base_url, topic.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    /// Any HTTP response counts as reachable; only network errors fail.
    async fn connect(&self) -> Result<(), TransportError> {
        let resp = self
            .http_client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| TransportError::connect(&self.base_url, e))?;
        debug!("Broker bridge {} answered {}", self.base_url, resp.status());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), TransportError> {
        let resp = self
            .http_client
            .post(self.topic_url(topic))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| TransportError::publish(topic, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::publish(topic, format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
