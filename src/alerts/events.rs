// src/alerts/events.rs
//
// Wire records for the telemetry and authority topics.
// One variant per event kind, each carrying only its own fields.

use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    PassengerEntered {
        total_entered: u64,
    },
    /// Low-occupancy alert. The wire name predates the semantics.
    BusFull {
        message: String,
        count_inside: u64,
    },
    DoorClose {
        message: String,
        threshold: u64,
        total_entered: u64,
        count_inside: u64,
    },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PassengerEntered { .. } => "passenger_entered",
            Self::BusFull { .. } => "bus_full",
            Self::DoorClose { .. } => "door_close",
        }
    }

    /// Authority copy of an operator-facing alert. Crossings are not forwarded.
    pub fn authority_notice(&self) -> Option<AuthorityNotice> {
        match self {
            Self::PassengerEntered { .. } => None,
            Self::BusFull {
                message,
                count_inside,
            } => Some(AuthorityNotice::new(
                self.name(),
                message.clone(),
                json!({ "count_inside": count_inside }),
            )),
            Self::DoorClose {
                message,
                threshold,
                total_entered,
                count_inside,
            } => Some(AuthorityNotice::new(
                self.name(),
                message.clone(),
                json!({
                    "threshold": threshold,
                    "total_entered": total_entered,
                    "count_inside": count_inside,
                }),
            )),
        }
    }
}

/// Periodic occupancy report. Carries no `event` key; dashboards tell it
/// apart from alerts by that absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorityNotice {
    pub event: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorityNotice {
    fn new(event: &'static str, message: String, extra: Value) -> Self {
        let extra = match extra {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            event,
            message,
            extra,
        }
    }
}

/// Any record plus the integer `timestamp` (seconds since epoch) every
/// message carries.
#[derive(Debug, Clone, Serialize)]
pub struct Stamped<T> {
    #[serde(flatten)]
    pub body: T,
    pub timestamp: i64,
}

impl<T: Serialize> Stamped<T> {
    pub fn now(body: T) -> Self {
        Self::at(body, chrono::Utc::now().timestamp())
    }

    pub fn at(body: T, timestamp: i64) -> Self {
        Self { body, timestamp }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
