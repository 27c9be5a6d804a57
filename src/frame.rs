use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

/// Axis-aligned box in working-frame pixel coordinates.
///
/// `max_x`/`max_y` are exclusive, so `width() == max_x - min_x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Smallest box enclosing both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Result of one successful motion detection
#[derive(Debug, Clone)]
pub struct MotionRegion {
    /// Box enclosing every detected contour
    pub bounds: BoundingBox,
    /// Cleaned binary change mask the box was derived from
    pub mask: GrayImage,
    /// Number of outer contours merged into `bounds`
    pub contour_count: usize,
}

/// Annotated frame as handed to viewers
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    /// Monotonic publish version, starting at 1
    pub version: u64,
    /// Index of the processed frame this was produced from
    pub frame_index: u64,
    /// When the frame was published
    pub timestamp: SystemTime,
    /// Immutable annotated image
    pub image: Arc<RgbImage>,
    /// Motion box drawn on the image, if any
    pub motion: Option<BoundingBox>,
}

impl PublishedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
