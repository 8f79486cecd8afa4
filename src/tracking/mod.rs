// src/tracking/mod.rs

mod centroid_tracker;
mod crossing;

pub use centroid_tracker::CentroidTracker;
pub use crossing::{CrossingDetector, CrossingEvent};
