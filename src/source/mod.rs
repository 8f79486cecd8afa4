// src/source/mod.rs

pub mod replay;
#[cfg(feature = "vision")]
pub mod video;

use anyhow::Result;

use crate::detector::RawDetection;

#[derive(Debug, Clone)]
pub enum FrameData {
    /// Packed RGB8, `width * height * 3` bytes
    #[cfg(feature = "vision")]
    Rgb(Vec<u8>),
    /// Detector output captured in an earlier run
    Recorded(Vec<RawDetection>),
}

#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based position in the stream
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: FrameData,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Anything that yields frames in order. `Ok(None)` means the stream is over.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn describe(&self) -> String;
}
