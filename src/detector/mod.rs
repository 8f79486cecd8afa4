// src/detector/mod.rs

#[cfg(feature = "vision")]
pub mod yolo;

use anyhow::Result;

use crate::source::Frame;
use crate::types::BoundingBox;

/// One detector output row: `(x1, y1, x2, y2, confidence, class_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// Confidence filtering is the detector's job; class filtering is not.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    fn name(&self) -> &str;
}

/// Keep only person boxes, dropping anything with non-finite coordinates.
pub fn person_boxes(detections: &[RawDetection], person_class_id: u32) -> Vec<BoundingBox> {
    detections
        .iter()
        .filter(|d| d.class_id == person_class_id)
        .filter(|d| {
            let b = d.bbox;
            b.x1.is_finite() && b.y1.is_finite() && b.x2.is_finite() && b.y2.is_finite()
        })
        .map(|d| d.bbox)
        .collect()
}
