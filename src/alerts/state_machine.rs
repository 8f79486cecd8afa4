// src/alerts/state_machine.rs
//
// One-shot occupancy alerts. Each kind has a latch that goes
// Unsent -> Sent at most once per run and never comes back.
//
// Evaluated once per frame, after crossings, in a fixed order:
//   1. low occupancy  (0 < count_inside <= low_occupancy_bound)
//   2. door close     (total_entered >= door_close_threshold)

use tracing::{info, warn};

use super::events::TelemetryEvent;
use crate::pipeline::session::CountSnapshot;
use crate::types::AlertConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Unsent,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    LowOccupancy,
    DoorClose,
}

pub struct AlertStateMachine {
    config: AlertConfig,
    low_occupancy: LatchState,
    door_close: LatchState,
}

impl AlertStateMachine {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            low_occupancy: LatchState::Unsent,
            door_close: LatchState::Unsent,
        }
    }

    pub fn state(&self, kind: AlertKind) -> LatchState {
        match kind {
            AlertKind::LowOccupancy => self.low_occupancy,
            AlertKind::DoorClose => self.door_close,
        }
    }

    /// Alerts that fire on this snapshot, in evaluation order.
    pub fn evaluate(&mut self, counts: CountSnapshot) -> Vec<TelemetryEvent> {
        let mut fired = Vec::new();

        if self.low_occupancy == LatchState::Unsent
            && counts.count_inside > 0
            && counts.count_inside <= self.config.low_occupancy_bound
        {
            self.low_occupancy = LatchState::Sent;
            warn!(
                "🚌 Low occupancy ({} inside): {}",
                counts.count_inside, self.config.low_occupancy_message
            );
            fired.push(TelemetryEvent::BusFull {
                message: self.config.low_occupancy_message.clone(),
                count_inside: counts.count_inside,
            });
        }

        if self.door_close == LatchState::Unsent
            && counts.total_entered >= self.config.door_close_threshold
        {
            self.door_close = LatchState::Sent;
            info!(
                "🚪 [ALERT] {} ({} entered, threshold {})",
                self.config.door_close_message,
                counts.total_entered,
                self.config.door_close_threshold
            );
            fired.push(TelemetryEvent::DoorClose {
                message: self.config.door_close_message.clone(),
                threshold: self.config.door_close_threshold,
                total_entered: counts.total_entered,
                count_inside: counts.count_inside,
            });
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(n: u64) -> CountSnapshot {
        CountSnapshot {
            count_inside: n,
            total_entered: n,
        }
    }

    #[test]
    fn test_nothing_fires_on_empty_bus() {
        let mut alerts = AlertStateMachine::new(AlertConfig::default());
        assert!(alerts.evaluate(counts(0)).is_empty());
        assert_eq!(alerts.state(AlertKind::LowOccupancy), LatchState::Unsent);
    }

    #[test]
    fn test_low_occupancy_fires_once() {
        let mut alerts = AlertStateMachine::new(AlertConfig::default());

        let fired = alerts.evaluate(counts(1));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name(), "bus_full");
        assert_eq!(alerts.state(AlertKind::LowOccupancy), LatchState::Sent);

        for n in 1..=9 {
            assert!(alerts.evaluate(counts(n)).is_empty(), "refired at {}", n);
        }
    }

    #[test]
    fn test_reaching_ten_fires_both_in_order() {
        let mut alerts = AlertStateMachine::new(AlertConfig::default());

        // First observed count is already 10: both predicates hold
        let fired = alerts.evaluate(counts(10));
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].name(), "bus_full");
        assert_eq!(
            fired[1],
            TelemetryEvent::DoorClose {
                message: "door close".to_string(),
                threshold: 10,
                total_entered: 10,
                count_inside: 10,
            }
        );

        assert!(alerts.evaluate(counts(10)).is_empty());
        assert!(alerts.evaluate(counts(11)).is_empty());
    }

    #[test]
    fn test_low_occupancy_bound_independent_of_door_threshold() {
        let mut alerts = AlertStateMachine::new(AlertConfig {
            low_occupancy_bound: 3,
            door_close_threshold: 5,
            ..AlertConfig::default()
        });

        // Above the bound: no low-occupancy alert, ever
        assert!(alerts.evaluate(counts(4)).is_empty());
        let fired = alerts.evaluate(counts(5));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name(), "door_close");
        assert_eq!(alerts.state(AlertKind::LowOccupancy), LatchState::Unsent);
    }

    #[test]
    fn test_door_close_carries_configured_message() {
        let mut alerts = AlertStateMachine::new(AlertConfig {
            door_close_threshold: 2,
            door_close_message: "close the doors".to_string(),
            ..AlertConfig::default()
        });
        alerts.evaluate(counts(1));
        let fired = alerts.evaluate(counts(2));
        match &fired[..] {
            [TelemetryEvent::DoorClose { message, threshold, .. }] => {
                assert_eq!(message, "close the doors");
                assert_eq!(*threshold, 2);
            }
            other => panic!("unexpected alerts: {:?}", other),
        }
    }
}
