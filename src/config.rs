// src/config.rs

use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    File,
    BuiltIn,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path))?;
        Ok(config)
    }

    /// Load from `path`, falling back to built-in defaults when the default
    /// file is simply absent. An explicitly requested file must exist.
    /// Runs before logging is up, so the caller reports the fallback.
    pub fn load_or_default(path: Option<&str>) -> Result<(Self, ConfigOrigin)> {
        match path {
            Some(path) => Ok((Self::load(path)?, ConfigOrigin::File)),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Ok((Self::load(DEFAULT_CONFIG_PATH)?, ConfigOrigin::File))
            }
            None => Ok((Self::default(), ConfigOrigin::BuiltIn)),
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(source) = std::env::var("PASSENGER_VIDEO_SOURCE") {
            info!("Video source overridden by PASSENGER_VIDEO_SOURCE");
            self.video.source = source;
        }
        if let Ok(url) = std::env::var("PASSENGER_TRANSPORT_URL") {
            info!("Transport URL overridden by PASSENGER_TRANSPORT_URL");
            self.transport.url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("counting.line_position", self.counting.line_position),
            (
                "counting.right_side_threshold",
                self.counting.right_side_threshold,
            ),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                bail!("{} must be in (0, 1], got {}", name, value);
            }
        }

        let non_negative = [
            ("counting.min_movement_px", self.counting.min_movement_px),
            (
                "counting.right_side_min_shift_px",
                self.counting.right_side_min_shift_px,
            ),
            ("tracking.max_distance", self.tracking.max_distance),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                bail!("{} must be >= 0, got {}", name, value);
            }
        }

        if self.transport.publish_interval_secs == 0 {
            bail!("transport.publish_interval_secs must be at least 1");
        }
        if self.transport.queue_capacity == 0 {
            bail!("transport.queue_capacity must be at least 1");
        }

        Ok(())
    }
}
