use crate::error::AnalyzerError;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::separable_filter_equal;

/// Side length of the square blur kernel applied before differencing
pub const BLUR_KERNEL_SIZE: u32 = 7;

/// Gaussian sigma matching a `ksize` x `ksize` kernel with automatic sigma
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Sampled Gaussian of `ksize` taps, normalized to sum to one
pub fn gaussian_kernel(ksize: u32) -> Vec<f32> {
    let sigma = kernel_sigma(ksize);
    let radius = (ksize / 2) as i32;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Working-size height for a frame scaled to `target_width`, aspect preserved
pub fn working_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = (height as u64 * target_width as u64 / width.max(1) as u64) as u32;
    scaled.max(1)
}

/// Scale a frame to `target_width`, keeping the aspect ratio
pub fn resize_to_width(frame: &RgbImage, target_width: u32) -> Result<RgbImage, AnalyzerError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(AnalyzerError::InvalidFrame {
            details: format!("degenerate {}x{} frame", width, height),
        });
    }

    if width == target_width {
        return Ok(frame.clone());
    }

    let target_height = working_height(width, height, target_width);
    Ok(imageops::resize(
        frame,
        target_width,
        target_height,
        FilterType::Triangle,
    ))
}

/// Convert RGB to luma with the ITU-R BT.601 weights
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    let mut gray_image = GrayImage::new(frame.width(), frame.height());
    for (x, y, rgb) in frame.enumerate_pixels() {
        let gray_value =
            (0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32).round();
        gray_image.put_pixel(x, y, Luma([gray_value.min(255.0) as u8]));
    }
    gray_image
}

/// Separable Gaussian blur with a normalized `ksize` kernel.
///
/// Both passes run in f32 and the result is rounded once, so flat regions
/// keep their exact value.
pub fn gaussian_blur(gray: &GrayImage, ksize: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let samples: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(width, height, |x, y| Luma([gray.get_pixel(x, y)[0] as f32]));

    let blurred = separable_filter_equal(&samples, &gaussian_kernel(ksize));

    GrayImage::from_fn(width, height, |x, y| {
        Luma([blurred.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// Grayscale and blur a working-size frame for background subtraction
pub fn prepare_gray(frame: &RgbImage) -> GrayImage {
    gaussian_blur(&to_gray(frame), BLUR_KERNEL_SIZE)
}
