use crate::error::AnalyzerError;

use image::{GrayImage, ImageBuffer, Luma};
use tracing::{debug, info};

/// Per-pixel running average stored at double precision
pub type FloatImage = ImageBuffer<Luma<f64>, Vec<f64>>;

/// Adaptation rate used when none is configured
pub const DEFAULT_ACCUM_WEIGHT: f64 = 0.5;

/// Exponentially weighted running average of a grayscale frame stream.
///
/// Smaller weights give a stable, slowly adapting background; larger ones
/// follow lighting changes quickly but absorb slow movers into the scene.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    accum_weight: f64,
    background: Option<FloatImage>,
    samples: u64,
}

impl BackgroundModel {
    pub fn new(accum_weight: f64) -> Self {
        debug!("Creating background model with accum weight {}", accum_weight);
        Self {
            accum_weight,
            background: None,
            samples: 0,
        }
    }

    /// Blend `frame` into the model, seeding it on first use.
    ///
    /// `bg = (1 - a) * bg + a * frame` for every pixel. A frame whose size
    /// differs from the seeded model is rejected and the model is left as is.
    pub fn update(&mut self, frame: &GrayImage) -> Result<(), AnalyzerError> {
        let background = match self.background.as_mut() {
            Some(background) => background,
            None => {
                info!(
                    "Seeding background model from {}x{} frame",
                    frame.width(),
                    frame.height()
                );
                self.background = Some(FloatImage::from_fn(frame.width(), frame.height(), |x, y| {
                    Luma([frame.get_pixel(x, y)[0] as f64])
                }));
                self.samples = 1;
                return Ok(());
            }
        };

        if background.dimensions() != frame.dimensions() {
            return Err(AnalyzerError::DimensionMismatch {
                expected: background.dimensions(),
                actual: frame.dimensions(),
            });
        }

        let alpha = self.accum_weight;
        for (bg, px) in background.iter_mut().zip(frame.iter()) {
            *bg = (1.0 - alpha) * *bg + alpha * *px as f64;
        }
        self.samples += 1;

        Ok(())
    }

    /// Drop the learned background; the next `update` reseeds it
    pub fn reset(&mut self) {
        if self.background.is_some() {
            info!(
                "Resetting background model after {} samples",
                self.samples
            );
        }
        self.background = None;
        self.samples = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.background.is_some()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.background.as_ref().map(|bg| bg.dimensions())
    }

    pub fn accum_weight(&self) -> f64 {
        self.accum_weight
    }

    /// Frames absorbed since the model was last seeded
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn value_at(&self, x: u32, y: u32) -> Option<f64> {
        self.background
            .as_ref()
            .and_then(|bg| bg.get_pixel_checked(x, y))
            .map(|px| px[0])
    }

    /// The model cast back to 8-bit, truncating toward zero
    pub fn to_gray(&self) -> Option<GrayImage> {
        self.background.as_ref().map(|bg| {
            GrayImage::from_fn(bg.width(), bg.height(), |x, y| {
                Luma([bg.get_pixel(x, y)[0] as u8])
            })
        })
    }
}

impl Default for BackgroundModel {
    fn default() -> Self {
        Self::new(DEFAULT_ACCUM_WEIGHT)
    }
}
