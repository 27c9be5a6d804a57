use super::FrameSource;
use crate::error::SourceError;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

const BACKDROP: Rgb<u8> = Rgb([70, 80, 90]);
const SUBJECT: Rgb<u8> = Rgb([235, 235, 225]);

/// Generated scene: a static backdrop with a bright square sweeping across it
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_no: u64,
    period: Duration,
    ticker: Option<Interval>,
    name: String,
}

impl SyntheticSource {
    pub fn new(resolution: (u32, u32), fps: u32) -> Self {
        let (width, height) = resolution;
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

        Self {
            width,
            height,
            frame_no: 0,
            period,
            ticker: None,
            name: format!("synthetic {}x{} @ {}fps", width, height, fps),
        }
    }

    /// Side length of the moving square
    pub fn subject_size(&self) -> u32 {
        (self.width.min(self.height) / 6).max(1)
    }

    /// Top-left corner of the square in frame `frame_no`
    pub fn subject_origin(&self, frame_no: u64) -> (u32, u32) {
        let size = self.subject_size();
        let travel = self.width.saturating_sub(size).max(1) as u64;
        let step = (self.width as u64 / 80).max(1);

        // Sweep right then back left
        let offset = (frame_no * step) % (2 * travel);
        let x = if offset < travel { offset } else { 2 * travel - offset };
        let y = self.height.saturating_sub(size) / 2;
        (x as u32, y)
    }

    /// Render frame `frame_no` without waiting
    pub fn render(&self, frame_no: u64) -> RgbImage {
        let size = self.subject_size();
        let (sx, sy) = self.subject_origin(frame_no);

        RgbImage::from_fn(self.width, self.height, |x, y| {
            if x >= sx && x < sx + size && y >= sy && y < sy + size {
                SUBJECT
            } else {
                BACKDROP
            }
        })
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn read_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let period = self.period;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;

        let frame = self.render(self.frame_no);
        self.frame_no += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
