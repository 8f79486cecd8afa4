// src/source/replay.rs
//
// Detection-log replay. Each non-blank line is one frame:
//
//   {"width": 640, "height": 480, "detections": [[x1, y1, x2, y2, conf, class], ...]}
//
// Lets the whole pipeline run without a camera or a model.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::info;

use super::{Frame, FrameData, FrameSource};
use crate::detector::{Detector, RawDetection};
use crate::types::{BoundingBox, DetectorConfig};

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    width: u32,
    height: u32,
    #[serde(default)]
    detections: Vec<[f32; 6]>,
}

pub struct ReplaySource<R> {
    path: String,
    lines: Lines<R>,
    line_number: usize,
    frames_read: u64,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            bail!("Replay file not found: {}", path);
        }
        let file = File::open(path).with_context(|| format!("Failed to open replay {}", path))?;
        info!("📼 Replaying detections from {}", path);
        Ok(Self::from_reader(path, BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn from_reader(path: &str, reader: R) -> Self {
        Self {
            path: path.to_string(),
            lines: reader.lines(),
            line_number: 0,
            frames_read: 0,
        }
    }
}

impl<R: BufRead + Send> FrameSource for ReplaySource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        for line in self.lines.by_ref() {
            self.line_number += 1;
            let line =
                line.with_context(|| format!("{}:{}: read failed", self.path, self.line_number))?;
            if line.trim().is_empty() {
                continue;
            }

            let recorded: RecordedFrame = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: malformed frame", self.path, self.line_number))?;

            let detections = recorded
                .detections
                .iter()
                .map(|[x1, y1, x2, y2, confidence, class]| -> Result<RawDetection> {
                    let class_id = class_id_of(*class).with_context(|| {
                        format!(
                            "{}:{}: class {} is not a non-negative integer",
                            self.path, self.line_number, class
                        )
                    })?;
                    Ok(RawDetection {
                        bbox: BoundingBox::new(*x1, *y1, *x2, *y2),
                        confidence: *confidence,
                        class_id,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            self.frames_read += 1;

            return Ok(Some(Frame {
                index: self.frames_read,
                width: recorded.width,
                height: recorded.height,
                data: FrameData::Recorded(detections),
            }));
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.path)
    }
}

fn class_id_of(value: f32) -> Option<u32> {
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f32 {
        Some(value as u32)
    } else {
        None
    }
}

/// Hands back the detections stored in the frame, with the confidence
/// threshold a live detector would have applied.
pub struct ReplayDetector {
    confidence: f32,
}

impl ReplayDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            confidence: config.confidence,
        }
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        match &frame.data {
            FrameData::Recorded(detections) => Ok(detections
                .iter()
                .filter(|d| d.confidence >= self.confidence)
                .cloned()
                .collect()),
            #[cfg(feature = "vision")]
            FrameData::Rgb(_) => bail!("replay detector cannot run on raw pixels"),
        }
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    fn source(text: &str) -> ReplaySource<Cursor<Vec<u8>>> {
        ReplaySource::from_reader("test.jsonl", Cursor::new(text.as_bytes().to_vec()))
    }

    fn recorded(frame: &Frame) -> &[RawDetection] {
        match &frame.data {
            FrameData::Recorded(d) => d,
            #[cfg(feature = "vision")]
            other => panic!("unexpected frame data {:?}", other),
        }
    }

    #[test]
    fn test_reads_frames_in_order_and_skips_blank_lines() {
        let mut src = source(
            "{\"width\":640,\"height\":480,\"detections\":[[10,20,50,120,0.9,0]]}\n\
             \n\
             {\"width\":640,\"height\":480,\"detections\":[]}\n",
        );

        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!((first.width, first.height), (640, 480));
        let d = recorded(&first);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].bbox, BoundingBox::new(10.0, 20.0, 50.0, 120.0));
        assert_eq!(d[0].class_id, 0);

        let second = src.next_frame().unwrap().unwrap();
        assert_eq!(second.index, 2);
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_detections_key_means_empty_frame() {
        let mut src = source("{\"width\":320,\"height\":240}\n");
        let frame = src.next_frame().unwrap().unwrap();
        assert!(recorded(&frame).is_empty());
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let mut src = source("{\"width\":320,\"height\":240}\nnot json\n");
        assert!(src.next_frame().unwrap().is_some());
        let err = src.next_frame().unwrap_err();
        assert!(format!("{:#}", err).contains("test.jsonl:2"));
    }

    #[test]
    fn test_negative_or_fractional_class_is_rejected() {
        let mut src = source(
            "{\"width\":640,\"height\":480,\"detections\":[[0,0,10,10,0.9,-1]]}\n\
             {\"width\":640,\"height\":480,\"detections\":[[0,0,10,10,0.9,0.5]]}\n\
             {\"width\":640,\"height\":480,\"detections\":[[0,0,10,10,0.9,2]]}\n",
        );

        let err = src.next_frame().unwrap_err();
        assert!(format!("{:#}", err).contains("test.jsonl:1"));
        let err = src.next_frame().unwrap_err();
        assert!(format!("{:#}", err).contains("test.jsonl:2"));

        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.index, 1);
        assert_eq!(recorded(&frame)[0].class_id, 2);
    }

    #[test]
    fn test_class_id_conversion() {
        assert_eq!(class_id_of(0.0), Some(0));
        assert_eq!(class_id_of(7.0), Some(7));
        assert_eq!(class_id_of(-1.0), None);
        assert_eq!(class_id_of(0.5), None);
        assert_eq!(class_id_of(f32::NAN), None);
    }

    #[test]
    fn test_detector_applies_confidence_threshold() {
        let mut src = source(
            "{\"width\":640,\"height\":480,\"detections\":[[0,0,10,10,0.9,0],[0,0,10,10,0.1,0]]}\n",
        );
        let frame = src.next_frame().unwrap().unwrap();
        let mut detector = ReplayDetector::new(&DetectorConfig::default());
        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.9);
    }

    #[test]
    fn test_open_missing_file_fails() {
        assert!(ReplaySource::open("/no/such/replay.jsonl").is_err());
    }

    #[test]
    fn test_open_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"width\":100,\"height\":100,\"detections\":[]}}").unwrap();
        let mut src = ReplaySource::open(file.path().to_str().unwrap()).unwrap();
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.describe().starts_with("replay:"));
    }
}
