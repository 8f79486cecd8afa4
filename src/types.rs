// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub counting: CountingConfig,
    pub tracking: TrackingConfig,
    pub alerts: AlertConfig,
    pub detector: DetectorConfig,
    pub video: VideoConfig,
    pub transport: TransportConfig,
    pub safety: SafetyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    /// Counting line position as a fraction of frame width (0 = left, 1 = right)
    pub line_position: f32,
    /// Minimum horizontal step between the last two positions for a crossing to count
    pub min_movement_px: f32,
    /// Fraction of frame width past which a person is flagged as having moved right
    pub right_side_threshold: f32,
    /// Minimum shift from the first observed position for the moved-right flag
    pub right_side_min_shift_px: f32,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            line_position: 0.8,
            min_movement_px: 10.0,
            right_side_threshold: 0.6,
            right_side_min_shift_px: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Largest centroid distance (pixels) at which a detection may continue an identity
    pub max_distance: f32,
    /// Consecutive unmatched frames tolerated before an identity is dropped
    pub max_disappeared: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_distance: 80.0,
            max_disappeared: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Low-occupancy alert fires while 0 < count_inside <= this bound
    pub low_occupancy_bound: u64,
    pub door_close_threshold: u64,
    /// Seats on the bus; only drives the dashboard status
    pub capacity: u64,
    pub low_occupancy_message: String,
    pub door_close_message: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            low_occupancy_bound: 10,
            door_close_threshold: 10,
            capacity: 10,
            low_occupancy_message:
                "Passenger count is low, allocate extra bus for better distribution".to_string(),
            door_close_message: "door close".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: String,
    pub confidence: f32,
    pub iou_threshold: f32,
    /// COCO class id for "person"
    pub person_class_id: u32,
    pub num_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence: 0.3,
            iou_threshold: 0.45,
            person_class_id: 0,
            num_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON-lines detection log, one frame per line
    Replay,
    /// Video file or camera URL decoded with OpenCV
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub source: String,
    pub kind: SourceKind,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            source: "passenger_video.jsonl".to_string(),
            kind: SourceKind::Replay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// POST each message to `<url>/<topic>` on a broker HTTP bridge
    Http,
    /// Append `{topic, payload}` lines to a local file
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub enabled: bool,
    pub kind: TransportKind,
    pub url: String,
    pub jsonl_path: String,
    pub topic: String,
    pub authorities_topic: String,
    pub publish_interval_secs: u64,
    pub timeout_secs: u64,
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: TransportKind::Jsonl,
            url: "http://broker.hivemq.com:8000".to_string(),
            jsonl_path: "output/telemetry.jsonl".to_string(),
            topic: "transport/bus1/passenger_count".to_string(),
            authorities_topic: "transport/bus1/authorities".to_string(),
            publish_interval_secs: 5,
            timeout_secs: 5,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub use_gpio: bool,
    pub door_alert_pin: u8,
    pub engine_stop_pin: u8,
    pub dashboard_link: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            use_gpio: false,
            door_alert_pin: 17,
            engine_stop_pin: 27,
            dashboard_link: "http://127.0.0.1:5000/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Axis-aligned box in pixel coordinates, `[x1, y1]` top-left, `[x2, y2]` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn centroid(&self) -> Centroid {
        Centroid {
            x: (self.x1 + self.x2) * 0.5,
            y: (self.y1 + self.y2) * 0.5,
        }
    }

    #[cfg(any(test, feature = "vision"))]
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    #[cfg(any(test, feature = "vision"))]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f32,
    pub y: f32,
}

impl Centroid {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Centroid) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}
