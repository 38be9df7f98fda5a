// Data structures for decoded video frames

use serde::{Deserialize, Serialize};

/// A decoded frame handed from a video source to the pose estimator
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 0-based position in presentation order, before any sampling
    pub index: u64,
    pub timestamp_ms: i64,
    pub width: u32,
    pub height: u32,
    /// Pixel bytes; empty for frames replayed from a keypoint track
    pub data: Vec<u8>,
    pub format: PixelFormat,
}

impl VideoFrame {
    /// A frame that carries only its position, no pixels
    pub fn placeholder(index: u64, timestamp_ms: i64) -> Self {
        Self {
            index,
            timestamp_ms,
            width: 0,
            height: 0,
            data: Vec::new(),
            format: PixelFormat::RGBA8,
        }
    }

    pub fn has_pixels(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }
}

/// Pixel format of decoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA8,
    RGB8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGBA8 => 4,
            PixelFormat::RGB8 => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_has_no_pixels() {
        let frame = VideoFrame::placeholder(7, 233);
        assert_eq!(frame.index, 7);
        assert!(!frame.has_pixels());
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::RGBA8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::RGB8.bytes_per_pixel(), 3);
    }
}
