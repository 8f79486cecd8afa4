// src/tracking/crossing.rs
//
// Left-to-right line crossing on top of the tracker's motion history.
//
// A person is counted when the last step of their history goes from
// strictly left of the line to on-or-past it, the step is at least
// min_movement_px wide, and they have not been counted before. Only the
// last two history entries matter.

use tracing::info;

use super::centroid_tracker::{CentroidTracker, PersonId, TrackedPerson};
use crate::pipeline::session::RunSession;
use crate::types::CountingConfig;

/// Vertical counting line, pinned to the width of the first frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountingLine {
    x: f32,
    frame_width: u32,
}

impl CountingLine {
    pub fn from_frame_width(frame_width: u32, fraction: f32) -> Self {
        Self {
            x: (frame_width as f32 * fraction).floor(),
            frame_width,
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub person_id: PersonId,
    pub passenger_number: u64,
    pub total_entered: u64,
    pub prev_x: f32,
    pub curr_x: f32,
}

pub struct CrossingDetector {
    line: CountingLine,
    min_movement: f32,
    /// Absolute x past which `moved_right` may latch
    right_side_x: f32,
    right_side_min_shift: f32,
}

impl CrossingDetector {
    pub fn new(config: &CountingConfig, frame_width: u32) -> Self {
        Self {
            line: CountingLine::from_frame_width(frame_width, config.line_position),
            min_movement: config.min_movement_px,
            right_side_x: frame_width as f32 * config.right_side_threshold,
            right_side_min_shift: config.right_side_min_shift_px,
        }
    }

    pub fn line(&self) -> CountingLine {
        self.line
    }

    /// True when the person's last step is a valid, not-yet-counted crossing.
    pub fn is_crossing(&self, person: &TrackedPerson) -> bool {
        if person.entered() {
            return false;
        }
        let Some((prev, curr)) = person.last_step() else {
            return false;
        };
        let line_x = self.line.x();
        prev.x < line_x && line_x <= curr.x && (curr.x - prev.x).abs() >= self.min_movement
    }

    /// Coarse "well into the right side" check. Never gates counting.
    pub fn has_moved_right(&self, person: &TrackedPerson) -> bool {
        if person.history().len() < 2 {
            return false;
        }
        person.centroid.x > self.right_side_x
            && (person.centroid.x - person.initial_centroid().x).abs() > self.right_side_min_shift
    }

    /// Check every live person after the tracker has absorbed the frame.
    /// Counted people get their passenger number from the session, in the
    /// order they are recognised.
    pub fn evaluate(
        &self,
        tracker: &mut CentroidTracker,
        session: &mut RunSession,
    ) -> Vec<CrossingEvent> {
        let mut events = Vec::new();

        for person in tracker.people_mut() {
            if !person.moved_right && self.has_moved_right(person) {
                person.moved_right = true;
            }

            if !self.is_crossing(person) {
                continue;
            }

            let Some((prev, curr)) = person.last_step() else {
                continue;
            };
            let passenger_number = session.record_entry();
            person.mark_entered(passenger_number);

            let event = CrossingEvent {
                person_id: person.id,
                passenger_number: person.passenger_number(),
                total_entered: session.counts().total_entered,
                prev_x: prev.x,
                curr_x: curr.x,
            };
            info!(
                "🚶 Passenger #{} entered (P-ID {}, x {:.0} → {:.0}, line {:.0})",
                event.passenger_number,
                event.person_id,
                event.prev_x,
                event.curr_x,
                self.line.x()
            );
            events.push(event);
        }

        events
    }
}
