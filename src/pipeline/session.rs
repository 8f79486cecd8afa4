// src/pipeline/session.rs
//
// Run-scoped counters. Owned by the frame loop; everything else sees
// copies (CountSnapshot / DashboardSnapshot).

use serde::Serialize;

/// Point-in-time copy of the aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountSnapshot {
    pub count_inside: u64,
    pub total_entered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyStatus {
    Normal,
    Full,
}

/// Read-only view for whatever renders the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    pub count_inside: u64,
    pub total_entered: u64,
    pub status: OccupancyStatus,
}

#[derive(Debug, Clone)]
pub struct RunSession {
    total_entered: u64,
    count_inside: u64,
    capacity: u64,
}

impl RunSession {
    pub fn new(capacity: u64) -> Self {
        Self {
            total_entered: 0,
            count_inside: 0,
            capacity,
        }
    }

    /// Count one boarding and return its passenger number (1-based, gap-free).
    pub fn record_entry(&mut self) -> u64 {
        self.total_entered += 1;
        // No exit detection: occupancy only ever grows
        self.count_inside += 1;
        self.total_entered
    }

    pub fn counts(&self) -> CountSnapshot {
        CountSnapshot {
            count_inside: self.count_inside,
            total_entered: self.total_entered,
        }
    }

    pub fn dashboard(&self) -> DashboardSnapshot {
        let status = if self.count_inside >= self.capacity {
            OccupancyStatus::Full
        } else {
            OccupancyStatus::Normal
        };
        DashboardSnapshot {
            count_inside: self.count_inside,
            total_entered: self.total_entered,
            status,
        }
    }
}
