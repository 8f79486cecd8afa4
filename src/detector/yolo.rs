// src/detector/yolo.rs
//
// YOLOv8 ONNX person detector.
//
// Pipeline: letterbox to 640x640 (gray pad) -> CHW float -> ONNX ->
// decode [1, 4 + classes, N] -> confidence filter -> NMS -> undo letterbox.

use anyhow::{bail, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

use super::{Detector, RawDetection};
use crate::source::{Frame, FrameData};
use crate::types::{BoundingBox, DetectorConfig};

const INPUT_SIZE: usize = 640;
const PAD_VALUE: u8 = 114;

struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

pub struct YoloDetector {
    session: Session,
    confidence: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        info!("Loading YOLO model: {}", config.model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .commit_from_file(&config.model_path)?;

        info!(
            "✓ YOLO person detector initialized (conf {:.2}, iou {:.2})",
            config.confidence, config.iou_threshold
        );
        Ok(Self {
            session,
            confidence: config.confidence,
            iou_threshold: config.iou_threshold,
        })
    }

    fn preprocess(&self, rgb: &[u8], width: usize, height: usize) -> (Vec<f32>, Letterbox) {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let scaled_w = ((width as f32 * scale) as usize).clamp(1, INPUT_SIZE);
        let scaled_h = ((height as f32 * scale) as usize).clamp(1, INPUT_SIZE);
        let pad_x = (INPUT_SIZE - scaled_w) / 2;
        let pad_y = (INPUT_SIZE - scaled_h) / 2;

        let resized = resize_bilinear(rgb, width, height, scaled_w, scaled_h);

        let plane = INPUT_SIZE * INPUT_SIZE;
        let mut input = vec![PAD_VALUE as f32 / 255.0; 3 * plane];
        for y in 0..scaled_h {
            for x in 0..scaled_w {
                let src = (y * scaled_w + x) * 3;
                let dst = (y + pad_y) * INPUT_SIZE + (x + pad_x);
                for c in 0..3 {
                    input[c * plane + dst] = resized[src + c] as f32 / 255.0;
                }
            }
        }

        (
            input,
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        )
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<(Vec<i64>, Vec<f32>)> {
        let shape = [1, 3, INPUT_SIZE, INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok((shape.to_vec(), data.to_vec()))
    }

    fn postprocess(&self, shape: &[i64], output: &[f32], letterbox: &Letterbox) -> Result<Vec<RawDetection>> {
        // [1, 4 + classes, predictions]
        let (rows, predictions) = match shape {
            [1, rows, predictions] if *rows > 4 => (*rows as usize, *predictions as usize),
            _ => bail!("unexpected YOLO output shape {:?}", shape),
        };
        let classes = rows - 4;

        let mut detections = Vec::new();
        for i in 0..predictions {
            let mut best_conf = 0.0f32;
            let mut best_class = 0usize;
            for c in 0..classes {
                let conf = output[predictions * (4 + c) + i];
                if conf > best_conf {
                    best_conf = conf;
                    best_class = c;
                }
            }
            if best_conf < self.confidence {
                continue;
            }

            let cx = output[i];
            let cy = output[predictions + i];
            let w = output[predictions * 2 + i];
            let h = output[predictions * 3 + i];

            let unpad = |v: f32, pad: f32| (v - pad) / letterbox.scale;
            detections.push(RawDetection {
                bbox: BoundingBox::new(
                    unpad(cx - w / 2.0, letterbox.pad_x),
                    unpad(cy - h / 2.0, letterbox.pad_y),
                    unpad(cx + w / 2.0, letterbox.pad_x),
                    unpad(cy + h / 2.0, letterbox.pad_y),
                ),
                confidence: best_conf,
                class_id: best_class as u32,
            });
        }

        Ok(nms(detections, self.iou_threshold))
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let FrameData::Rgb(rgb) = &frame.data else {
            bail!("YOLO detector needs pixel frames");
        };
        let (width, height) = (frame.width as usize, frame.height as usize);
        if rgb.len() < width * height * 3 {
            bail!("frame {} is truncated", frame.index);
        }

        let (input, letterbox) = self.preprocess(rgb, width, height);
        let (shape, output) = self.infer(input)?;
        let detections = self.postprocess(&shape, &output, &letterbox)?;

        debug!("Frame {}: {} detections", frame.index, detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "yolov8"
    }
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_w * dst_h * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        let sy = dy as f32 * y_ratio;
        let sy0 = (sy.floor() as usize).min(src_h - 1);
        let sy1 = (sy0 + 1).min(src_h - 1);
        let fy = sy - sy0 as f32;

        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sx0 = (sx.floor() as usize).min(src_w - 1);
            let sx1 = (sx0 + 1).min(src_w - 1);
            let fx = sx - sx0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;
                let top = p00 + (p10 - p00) * fx;
                let bottom = p01 + (p11 - p01) * fx;
                dst[(dy * dst_w + dx) * 3 + c] = (top + (bottom - top) * fy).round() as u8;
            }
        }
    }
    dst
}

/// Class-aware greedy NMS, highest confidence first.
fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) >= iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}
