use crate::config::OverlayConfig;
use crate::frame::BoundingBox;

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use tracing::{debug, warn};

/// Annotation color for both the timestamp and the motion box
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// strftime pattern of the live timestamp, e.g. "Sunday 17 November 2019 09:41:07PM"
pub const TIMESTAMP_FORMAT: &str = "%A %d %B %Y %I:%M:%S%p";

/// Distance of the timestamp baseline from the left and bottom edges
const TIMESTAMP_MARGIN: i32 = 10;

/// Resolve configured timezone, falling back to UTC on parse errors
pub(crate) fn resolve_timestamp_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(
                "Invalid timestamp timezone '{}', falling back to UTC",
                tz_name
            );
            chrono_tz::UTC
        }
    }
}

/// Draws the live timestamp and motion boxes onto output frames
pub struct FrameAnnotator {
    font: Option<Font<'static>>,
    scale: Scale,
    timezone: Option<Tz>,
}

impl FrameAnnotator {
    /// Build from configuration; a missing or unreadable font disables the timestamp
    pub fn from_config(config: &OverlayConfig) -> Self {
        let timezone = config.timezone.as_deref().map(resolve_timestamp_timezone);
        let scale = Scale::uniform(config.font_size);

        if !config.timestamp {
            debug!("Timestamp overlay disabled by configuration");
            return Self {
                font: None,
                scale,
                timezone,
            };
        }

        let font = match std::fs::read(&config.font_path) {
            Ok(data) => Font::try_from_vec(data).or_else(|| {
                warn!(
                    "Failed to parse font file '{}', timestamps disabled",
                    config.font_path
                );
                None
            }),
            Err(e) => {
                warn!(
                    "Failed to read font file '{}': {}, timestamps disabled",
                    config.font_path, e
                );
                None
            }
        };

        Self {
            font,
            scale,
            timezone,
        }
    }

    /// Annotator that never draws a timestamp
    pub fn without_timestamp() -> Self {
        Self {
            font: None,
            scale: Scale::uniform(12.0),
            timezone: None,
        }
    }

    pub fn timestamps_enabled(&self) -> bool {
        self.font.is_some()
    }

    pub fn format_timestamp(&self, now: DateTime<Utc>) -> String {
        match self.timezone {
            Some(tz) => now.with_timezone(&tz).format(TIMESTAMP_FORMAT).to_string(),
            None => now
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        }
    }

    /// Write the time near the bottom-left corner
    pub fn stamp_time(&self, frame: &mut RgbImage, now: DateTime<Utc>) {
        let Some(font) = self.font.as_ref() else {
            return;
        };

        let text = self.format_timestamp(now);
        let (_, text_height) = text_size(self.scale, font, &text);
        let y = (frame.height() as i32 - TIMESTAMP_MARGIN - text_height).max(0);

        draw_text_mut(
            frame,
            ANNOTATION_COLOR,
            TIMESTAMP_MARGIN,
            y,
            self.scale,
            font,
            &text,
        );
    }
}

/// Outline `bounds` with a two pixel border
pub fn draw_motion_box(frame: &mut RgbImage, bounds: &BoundingBox) {
    let (width, height) = (bounds.width(), bounds.height());
    if width == 0 || height == 0 {
        return;
    }

    let outer = Rect::at(bounds.min_x as i32, bounds.min_y as i32).of_size(width, height);
    draw_hollow_rect_mut(frame, outer, ANNOTATION_COLOR);

    if width > 2 && height > 2 {
        let inner =
            Rect::at(bounds.min_x as i32 + 1, bounds.min_y as i32 + 1).of_size(width - 2, height - 2);
        draw_hollow_rect_mut(frame, inner, ANNOTATION_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_motion_box_outline() {
        let mut frame = RgbImage::new(100, 80);
        draw_motion_box(&mut frame, &BoundingBox::new(10, 20, 40, 50));

        // Outer and inner edges are painted
        assert_eq!(frame.get_pixel(10, 20), &ANNOTATION_COLOR);
        assert_eq!(frame.get_pixel(39, 49), &ANNOTATION_COLOR);
        assert_eq!(frame.get_pixel(11, 30), &ANNOTATION_COLOR);
        // Interior and outside untouched
        assert_eq!(frame.get_pixel(25, 35), &Rgb([0, 0, 0]));
        assert_eq!(frame.get_pixel(5, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_motion_box_clipped_at_frame_edge() {
        let mut frame = RgbImage::new(50, 50);
        draw_motion_box(&mut frame, &BoundingBox::new(30, 30, 50, 50));
        assert_eq!(frame.get_pixel(49, 49), &ANNOTATION_COLOR);
    }

    #[test]
    fn test_timestamp_format_in_timezone() {
        let config = OverlayConfig {
            timestamp: false,
            timezone: Some("UTC".to_string()),
            ..OverlayConfig::default()
        };
        let annotator = FrameAnnotator::from_config(&config);
        let now = Utc.with_ymd_and_hms(2019, 11, 17, 21, 41, 7).unwrap();

        assert_eq!(
            annotator.format_timestamp(now),
            "Sunday 17 November 2019 09:41:07PM"
        );
    }

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timestamp_timezone("Mars/Olympus"), chrono_tz::UTC);
        assert_eq!(
            resolve_timestamp_timezone("Asia/Jerusalem"),
            chrono_tz::Asia::Jerusalem
        );
    }

    #[test]
    fn test_missing_font_disables_timestamp() {
        let config = OverlayConfig {
            font_path: "/nonexistent/font.ttf".to_string(),
            ..OverlayConfig::default()
        };
        let annotator = FrameAnnotator::from_config(&config);
        assert!(!annotator.timestamps_enabled());

        let mut frame = RgbImage::new(60, 40);
        annotator.stamp_time(&mut frame, Utc::now());
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
