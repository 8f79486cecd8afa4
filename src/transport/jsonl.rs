// src/transport/jsonl.rs
//
// Local sink: appends one `{"topic": ..., "payload": {...}}` line per message.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::info;

use super::{Transport, TransportError};

pub struct JsonlTransport {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl JsonlTransport {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }
}

impl Transport for JsonlTransport {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TransportError::connect(self.path.display().to_string(), e))?;

        *self.writer.lock().await = Some(BufWriter::new(file));
        info!("📝 Telemetry written to {}", self.path.display());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), TransportError> {
        let payload: Value = serde_json::from_str(&payload)?;
        let mut line = serde_json::to_string(&json!({ "topic": topic, "payload": payload }))?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_appends_one_line_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("telemetry.jsonl");
        let transport = JsonlTransport::new(&path);

        transport.connect().await.unwrap();
        transport
            .publish("a/topic", r#"{"count":1,"timestamp":5}"#.to_string())
            .await
            .unwrap();
        transport
            .publish("b/topic", r#"{"count":2,"timestamp":6}"#.to_string())
            .await
            .unwrap();
        transport.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["topic"], "a/topic");
        assert_eq!(lines[0]["payload"]["count"], 1);
        assert_eq!(lines[1]["payload"]["timestamp"], 6);
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = JsonlTransport::new(dir.path().join("t.jsonl"));
        let err = transport.publish("t", "{}".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_non_json_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let transport = JsonlTransport::new(dir.path().join("t.jsonl"));
        transport.connect().await.unwrap();
        let err = transport.publish("t", "nope".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::Serialize(_)));
    }
}
