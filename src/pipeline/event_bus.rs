// src/pipeline/event_bus.rs
//
// Per-frame event queue. Stages publish here while the frame is being
// processed; the driver drains it once the frame is complete, so nothing
// leaves the loop with a partial view of a frame.

use crate::alerts::TelemetryEvent;
use crate::tracking::CrossingEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PassengerEntered(CrossingEvent),
    Alert(TelemetryEvent),
}

impl PipelineEvent {
    /// Wire record for the telemetry topic.
    pub fn telemetry(&self) -> TelemetryEvent {
        match self {
            Self::PassengerEntered(crossing) => TelemetryEvent::PassengerEntered {
                total_entered: crossing.total_entered,
            },
            Self::Alert(event) => event.clone(),
        }
    }
}

/// Events raised while one frame is in progress. Unbounded: a frame raises
/// at most one crossing per live identity plus the two alerts.
#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, event: PipelineEvent) {
        self.events.push(event);
    }

    /// Hand over everything raised for the frame, leaving the bus empty.
    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.events)
    }
}
