use super::background::BackgroundModel;
use crate::error::AnalyzerError;
use crate::frame::{BoundingBox, MotionRegion};

use image::{GrayImage, Luma};
use imageproc::{
    contours::{find_contours, BorderType, Contour},
    contrast::threshold,
    distance_transform::Norm,
    morphology::{dilate, erode},
};
use tracing::{debug, trace};

/// Difference above which a pixel counts as changed
pub const DEFAULT_THRESHOLD: u8 = 25;

/// Erosion/dilation rounds used to open the change mask
pub const DEFAULT_MORPH_ITERATIONS: u32 = 2;

/// Turns a grayscale frame and a background model into one motion region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSegmenter {
    erode_iterations: u32,
    dilate_iterations: u32,
}

impl MotionSegmenter {
    pub fn new(erode_iterations: u32, dilate_iterations: u32) -> Self {
        Self {
            erode_iterations,
            dilate_iterations,
        }
    }

    /// Detect with the default threshold
    pub fn detect_default(
        &self,
        model: &BackgroundModel,
        frame: &GrayImage,
    ) -> Result<Option<MotionRegion>, AnalyzerError> {
        self.detect(model, frame, DEFAULT_THRESHOLD)
    }

    /// Find the box enclosing all change between `frame` and the model.
    ///
    /// Returns `Ok(None)` when the cleaned mask has no foreground contours.
    /// Calling this before the model has been seeded is a contract
    /// violation and yields `BackgroundUninitialized`.
    pub fn detect(
        &self,
        model: &BackgroundModel,
        frame: &GrayImage,
        delta_threshold: u8,
    ) -> Result<Option<MotionRegion>, AnalyzerError> {
        let background = model
            .to_gray()
            .ok_or(AnalyzerError::BackgroundUninitialized)?;

        if background.dimensions() != frame.dimensions() {
            return Err(AnalyzerError::DimensionMismatch {
                expected: background.dimensions(),
                actual: frame.dimensions(),
            });
        }

        let delta = absolute_difference(&background, frame);
        let binary_mask = threshold(&delta, delta_threshold);
        let mask = self.open(binary_mask);

        // Trace on a padded copy so blobs touching the frame edge still get
        // an outer border; points are shifted back by one afterwards.
        let contours: Vec<Contour<u32>> = find_contours(&pad_mask(&mask));
        let outer: Vec<BoundingBox> = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(contour_bounds)
            .map(|b| unpad_bounds(b, mask.dimensions()))
            .collect();

        trace!(
            "Segmentation found {} contours, {} outer",
            contours.len(),
            outer.len()
        );

        let Some(bounds) = outer.iter().copied().reduce(|acc, b| acc.union(&b)) else {
            return Ok(None);
        };

        debug!(
            "Motion region ({}, {}) - ({}, {}) from {} contours",
            bounds.min_x,
            bounds.min_y,
            bounds.max_x,
            bounds.max_y,
            outer.len()
        );

        Ok(Some(MotionRegion {
            bounds,
            mask,
            contour_count: outer.len(),
        }))
    }

    /// Erode then dilate with a 3x3 square element
    fn open(&self, mut mask: GrayImage) -> GrayImage {
        for _ in 0..self.erode_iterations {
            mask = erode(&mask, Norm::LInf, 1);
        }
        for _ in 0..self.dilate_iterations {
            mask = dilate(&mask, Norm::LInf, 1);
        }
        mask
    }
}

impl Default for MotionSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MORPH_ITERATIONS, DEFAULT_MORPH_ITERATIONS)
    }
}

/// Per-pixel |a - b|
fn absolute_difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0])])
    })
}

/// Copy of `mask` with a one-pixel background border
fn pad_mask(mask: &GrayImage) -> GrayImage {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    for (x, y, pixel) in mask.enumerate_pixels() {
        padded.put_pixel(x + 1, y + 1, *pixel);
    }
    padded
}

/// Map a box traced on the padded mask back to mask coordinates
fn unpad_bounds(bounds: BoundingBox, (width, height): (u32, u32)) -> BoundingBox {
    BoundingBox::new(
        bounds.min_x.saturating_sub(1),
        bounds.min_y.saturating_sub(1),
        bounds.max_x.saturating_sub(1).min(width),
        bounds.max_y.saturating_sub(1).min(height),
    )
}

/// Bounding rectangle of a contour, max edges exclusive
fn contour_bounds(contour: &Contour<u32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let mut bounds = BoundingBox::new(first.x, first.y, first.x + 1, first.y + 1);
    for point in &contour.points[1..] {
        bounds.min_x = bounds.min_x.min(point.x);
        bounds.min_y = bounds.min_y.min(point.y);
        bounds.max_x = bounds.max_x.max(point.x + 1);
        bounds.max_y = bounds.max_y.max(point.y + 1);
    }
    Some(bounds)
}
