// src/transport/mod.rs
//
// Outbound telemetry. A transport moves one JSON payload to one topic;
// the dispatcher decides what gets sent and when.

pub mod dispatcher;
pub mod http;
pub mod jsonl;

use std::future::Future;
use thiserror::Error;

pub use dispatcher::{TelemetrySender, TelemetryTask};
pub use http::HttpTransport;
pub use jsonl::JsonlTransport;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect to {target} failed: {reason}")]
    Connect { target: String, reason: String },

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Transport not connected")]
    NotConnected,

    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn connect(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connect {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn publish(topic: impl Into<String>, reason: impl ToString) -> Self {
        Self::Publish {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }
}

pub trait Transport: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Establish whatever the transport needs. Called once before dispatching.
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// One attempt, no retries. The next scheduled publish is the retry.
    fn publish(
        &self,
        topic: &str,
        payload: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
