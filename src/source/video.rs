// src/source/video.rs
//
// OpenCV-backed frame source for video files and camera URLs.

use anyhow::{bail, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::info;

use super::{Frame, FrameData, FrameSource};

pub struct VideoSource {
    source: String,
    cap: VideoCapture,
    frames_read: u64,
}

impl VideoSource {
    pub fn open(source: &str) -> Result<Self> {
        info!("🎥 Opening video source: {}", source);

        // A bare integer selects a local camera
        let cap = match source.parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY)?,
            Err(_) => VideoCapture::from_file(source, videoio::CAP_ANY)?,
        };

        if !cap.is_opened()? {
            bail!("Error opening video source: {}", source);
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        info!("Video properties: {}x{} @ {:.1} FPS", width, height, fps);

        Ok(Self {
            source: source.to_string(),
            cap,
            frames_read: 0,
        })
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }
        self.frames_read += 1;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        Ok(Some(Frame {
            index: self.frames_read,
            width: rgb.cols() as u32,
            height: rgb.rows() as u32,
            data: FrameData::Rgb(rgb.data_bytes()?.to_vec()),
        }))
    }

    fn describe(&self) -> String {
        format!("video:{}", self.source)
    }
}
