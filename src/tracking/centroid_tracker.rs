// src/tracking/centroid_tracker.rs
//
// Greedy nearest-centroid tracker for people walking past a fixed camera.
// Owns every live identity and the id allocator; ids are never reused.
//
// Design:
//   - Pairwise Euclidean distance between live centroids and new detections
//   - Candidate pairs visited in ascending distance; a pair is accepted when
//     neither side is consumed yet and the distance is within max_distance
//   - Heuristic, not an optimal bipartite assignment. Ambiguous frames go to
//     whichever pair is globally closest first, and callers rely on that.
//   - Unmatched identities coast for up to max_disappeared frames

use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{BoundingBox, Centroid, TrackingConfig};

pub type PersonId = u64;

// ============================================================================
// TRACKED PERSON
// ============================================================================

#[derive(Debug, Clone)]
pub struct TrackedPerson {
    pub id: PersonId,
    pub centroid: Centroid,
    pub bbox: BoundingBox,
    /// Consecutive frames without a matching detection
    pub disappeared: u32,
    /// Advisory flag, set once the person is well into the right side of the frame
    pub moved_right: bool,
    history: Vec<Centroid>,
    initial_centroid: Centroid,
    entered: bool,
    passenger_number: u64,
}

impl TrackedPerson {
    fn new(id: PersonId, bbox: BoundingBox) -> Self {
        let centroid = bbox.centroid();
        Self {
            id,
            centroid,
            bbox,
            disappeared: 0,
            moved_right: false,
            history: vec![centroid],
            initial_centroid: centroid,
            entered: false,
            passenger_number: 0,
        }
    }

    /// Every matched centroid since registration, oldest first.
    pub fn history(&self) -> &[Centroid] {
        &self.history
    }

    /// The last two recorded positions as `(previous, current)`.
    pub fn last_step(&self) -> Option<(Centroid, Centroid)> {
        match self.history.as_slice() {
            [.., prev, curr] => Some((*prev, *curr)),
            _ => None,
        }
    }

    pub fn initial_centroid(&self) -> Centroid {
        self.initial_centroid
    }

    pub fn entered(&self) -> bool {
        self.entered
    }

    /// 0 until the person has been counted.
    pub fn passenger_number(&self) -> u64 {
        self.passenger_number
    }

    /// Latch the entered flag. Returns false (and changes nothing) when the
    /// person was already counted.
    pub(crate) fn mark_entered(&mut self, passenger_number: u64) -> bool {
        if self.entered {
            return false;
        }
        self.entered = true;
        self.passenger_number = passenger_number;
        true
    }

    fn update_with_detection(&mut self, bbox: BoundingBox) {
        self.centroid = bbox.centroid();
        self.bbox = bbox;
        self.history.push(self.centroid);
        self.disappeared = 0;
    }
}

// ============================================================================
// TRACKER
// ============================================================================

/// What a single `update` did to the identity store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub matched: usize,
    pub registered: Vec<PersonId>,
    pub evicted: Vec<PersonId>,
}

pub struct CentroidTracker {
    config: TrackingConfig,
    /// Keyed by id, so iteration follows allocation order
    people: BTreeMap<PersonId, TrackedPerson>,
    next_id: PersonId,
}

impl CentroidTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            people: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Process one frame of person boxes.
    pub fn update(&mut self, detections: &[BoundingBox]) -> TrackerUpdate {
        let mut outcome = TrackerUpdate::default();

        if detections.is_empty() {
            let ids: Vec<PersonId> = self.people.keys().copied().collect();
            for id in ids {
                self.mark_missed(id, &mut outcome);
            }
            return outcome;
        }

        if self.people.is_empty() {
            for bbox in detections {
                let id = self.register(*bbox);
                outcome.registered.push(id);
            }
            return outcome;
        }

        let ids: Vec<PersonId> = self.people.keys().copied().collect();
        let input_centroids: Vec<Centroid> =
            detections.iter().map(BoundingBox::centroid).collect();

        // ════════════════════════════════════════════════════════════════════
        // GREEDY MATCHING
        //
        // Rows are live identities, columns are detections. Sorting the full
        // distance matrix and walking it once means every accepted pair is
        // the globally closest pair whose row and column are both still free.
        // Ties fall back to allocation order, then detection order.
        // ════════════════════════════════════════════════════════════════════
        let mut pairs: Vec<(usize, usize, f32)> =
            Vec::with_capacity(ids.len() * input_centroids.len());
        for (row, id) in ids.iter().enumerate() {
            let centroid = self.people[id].centroid;
            for (col, input) in input_centroids.iter().enumerate() {
                pairs.push((row, col, centroid.distance(input)));
            }
        }
        pairs.sort_by(|a, b| {
            a.2.total_cmp(&b.2)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });

        let mut used_rows = vec![false; ids.len()];
        let mut used_cols = vec![false; detections.len()];

        for (row, col, distance) in pairs {
            if used_rows[row] || used_cols[col] {
                continue;
            }
            if distance > self.config.max_distance {
                continue;
            }

            if let Some(person) = self.people.get_mut(&ids[row]) {
                person.update_with_detection(detections[col]);
            }
            used_rows[row] = true;
            used_cols[col] = true;
            outcome.matched += 1;
        }

        for (row, used) in used_rows.iter().enumerate() {
            if !used {
                self.mark_missed(ids[row], &mut outcome);
            }
        }

        for (col, used) in used_cols.iter().enumerate() {
            if !used {
                let id = self.register(detections[col]);
                outcome.registered.push(id);
            }
        }

        outcome
    }

    fn register(&mut self, bbox: BoundingBox) -> PersonId {
        let id = self.next_id;
        self.next_id += 1;
        let person = TrackedPerson::new(id, bbox);
        debug!(
            "🆕 Person P-ID {} registered at ({:.0}, {:.0})",
            id, person.centroid.x, person.centroid.y
        );
        self.people.insert(id, person);
        id
    }

    fn mark_missed(&mut self, id: PersonId, outcome: &mut TrackerUpdate) {
        let Some(person) = self.people.get_mut(&id) else {
            return;
        };
        person.disappeared += 1;
        if person.disappeared > self.config.max_disappeared {
            debug!(
                "🗑️  Person P-ID {} deregistered (missing {} frames)",
                id, person.disappeared
            );
            self.people.remove(&id);
            outcome.evicted.push(id);
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: PersonId) -> Option<&TrackedPerson> {
        self.people.get(&id)
    }

    /// Live identities in allocation order.
    pub fn people(&self) -> impl Iterator<Item = &TrackedPerson> {
        self.people.values()
    }

    pub(crate) fn people_mut(&mut self) -> impl Iterator<Item = &mut TrackedPerson> {
        self.people.values_mut()
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// The id the next registration will receive.
    pub fn next_id(&self) -> PersonId {
        self.next_id
    }
}

// ============================================================================
// TESTS
// ============================================================================
