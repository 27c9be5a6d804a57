use super::background::BackgroundModel;
use super::overlay::{draw_motion_box, FrameAnnotator};
use super::preprocess::{prepare_gray, resize_to_width};
use super::segmenter::MotionSegmenter;
use crate::config::{DetectorConfig, MotionCamConfig};
use crate::error::AnalyzerError;
use crate::frame::BoundingBox;
use crate::frame_buffer::FrameBuffer;

use chrono::Utc;
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of processing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    /// Zero-based index of the processed frame
    pub frame_index: u64,
    /// Whether the warm-up gate let detection run
    pub detection_ran: bool,
    /// Box drawn on the published frame
    pub motion: Option<BoundingBox>,
    /// Version assigned by the frame buffer
    pub version: u64,
}

/// Counters describing processing so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorMetrics {
    pub frames_processed: u64,
    pub detections_run: u64,
    pub motion_frames: u64,
    pub background_initialized: bool,
    pub background_samples: u64,
}

/// Turns raw captured frames into annotated, published frames
pub struct FrameProcessor {
    config: DetectorConfig,
    model: BackgroundModel,
    segmenter: MotionSegmenter,
    annotator: FrameAnnotator,
    buffer: Arc<FrameBuffer>,
    frame_count: u64,
    warmup_start: u64,
    working_size: Option<(u32, u32)>,
    detections_run: u64,
    motion_frames: u64,
}

impl FrameProcessor {
    pub fn new(config: DetectorConfig, annotator: FrameAnnotator, buffer: Arc<FrameBuffer>) -> Self {
        info!(
            "Creating frame processor (width {}, alpha {}, warm-up {} frames, threshold {})",
            config.frame_width, config.accum_weight, config.warmup_frames, config.delta_threshold
        );

        Self {
            model: BackgroundModel::new(config.accum_weight),
            segmenter: MotionSegmenter::new(config.erode_iterations, config.dilate_iterations),
            config,
            annotator,
            buffer,
            frame_count: 0,
            warmup_start: 0,
            working_size: None,
            detections_run: 0,
            motion_frames: 0,
        }
    }

    pub fn from_config(config: &MotionCamConfig, buffer: Arc<FrameBuffer>) -> Self {
        Self::new(
            config.detector.clone(),
            FrameAnnotator::from_config(&config.overlay),
            buffer,
        )
    }

    /// Process one raw frame and publish the annotated result.
    ///
    /// Detection runs against the model as it was before this frame; the
    /// frame is folded into the model afterwards.
    pub fn process(&mut self, raw: &RgbImage) -> Result<ProcessReport, AnalyzerError> {
        let mut frame = resize_to_width(raw, self.config.frame_width)?;
        let gray = prepare_gray(&frame);
        self.track_working_size(gray.dimensions());

        self.annotator.stamp_time(&mut frame, Utc::now());

        let frame_index = self.frame_count;
        let detection_ran = self.warmup_complete();
        let mut motion = None;

        if detection_ran {
            self.detections_run += 1;
            let region = self
                .segmenter
                .detect(&self.model, &gray, self.config.delta_threshold)?;

            if let Some(region) = region {
                draw_motion_box(&mut frame, &region.bounds);
                self.motion_frames += 1;
                motion = Some(region.bounds);
            }
        }

        self.model.update(&gray)?;

        let version = self.buffer.publish(frame, frame_index, motion);
        self.frame_count += 1;

        debug!(
            "Processed frame {} (detection: {}, motion: {:?})",
            frame_index, detection_ran, motion
        );

        Ok(ProcessReport {
            frame_index,
            detection_ran,
            motion,
            version,
        })
    }

    /// Reseed the model when the working size changes
    fn track_working_size(&mut self, size: (u32, u32)) {
        match self.working_size {
            Some(current) if current == size => {}
            Some(current) => {
                warn!(
                    "Working frame size changed from {:?} to {:?}, reseeding background",
                    current, size
                );
                self.model.reset();
                self.working_size = Some(size);
                self.warmup_start = self.frame_count;
            }
            None => {
                self.working_size = Some(size);
                self.warmup_start = self.frame_count;
            }
        }
    }

    fn warmup_complete(&self) -> bool {
        self.frame_count - self.warmup_start > self.config.warmup_frames
    }

    /// Frames processed so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmup_complete()
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.model
    }

    pub fn buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn metrics(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            frames_processed: self.frame_count,
            detections_run: self.detections_run,
            motion_frames: self.motion_frames,
            background_initialized: self.model.is_initialized(),
            background_samples: self.model.samples(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::overlay::ANNOTATION_COLOR;
    use image::Rgb;

    fn detector_config(warmup_frames: u64, accum_weight: f64) -> DetectorConfig {
        DetectorConfig {
            accum_weight,
            warmup_frames,
            ..DetectorConfig::default()
        }
    }

    fn processor(config: DetectorConfig) -> (FrameProcessor, Arc<FrameBuffer>) {
        let buffer = Arc::new(FrameBuffer::new());
        let processor =
            FrameProcessor::new(config, FrameAnnotator::without_timestamp(), Arc::clone(&buffer));
        (processor, buffer)
    }

    fn scene(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([40, 40, 40]))
    }

    fn scene_with_patch(width: u32, height: u32) -> RgbImage {
        let mut frame = scene(width, height);
        for y in 100..180 {
            for x in 150..250 {
                frame.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        frame
    }

    #[test]
    fn test_warmup_gates_detection() {
        let (mut processor, _buffer) = processor(detector_config(32, 0.1));
        let frame = scene(400, 300);

        for i in 0..33u64 {
            let report = processor.process(&frame).unwrap();
            assert_eq!(report.frame_index, i);
            assert!(!report.detection_ran, "frame {} ran detection", i);
            assert_eq!(processor.background().samples(), i + 1);
        }

        let report = processor.process(&frame).unwrap();
        assert!(report.detection_ran);
        assert_eq!(report.motion, None);

        let metrics = processor.metrics();
        assert_eq!(metrics.frames_processed, 34);
        assert_eq!(metrics.detections_run, 1);
        assert_eq!(metrics.background_samples, 34);
    }

    #[test]
    fn test_detection_uses_model_before_update() {
        // alpha = 1 makes the model equal to the last frame it absorbed
        let (mut processor, _buffer) = processor(detector_config(0, 1.0));

        processor.process(&scene(400, 300)).unwrap();

        let report = processor.process(&scene_with_patch(400, 300)).unwrap();
        assert!(report.detection_ran);
        let motion = report.motion.expect("patch differs from previous model");
        assert!(motion.min_x.abs_diff(150) <= 4 && motion.max_x.abs_diff(250) <= 4);
        assert!(motion.min_y.abs_diff(100) <= 4 && motion.max_y.abs_diff(180) <= 4);

        // The patch frame is now the background
        let report = processor.process(&scene_with_patch(400, 300)).unwrap();
        assert_eq!(report.motion, None);
    }

    #[test]
    fn test_publishes_annotated_working_frame() {
        let (mut processor, buffer) = processor(detector_config(0, 1.0));

        let first = processor.process(&scene(800, 600)).unwrap();
        assert_eq!(first.version, 1);
        let published = buffer.latest().unwrap();
        assert_eq!(published.image.dimensions(), (400, 300));
        assert_eq!(published.motion, None);

        let mut moved = scene(800, 600);
        for y in 200..360 {
            for x in 300..500 {
                moved.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let report = processor.process(&moved).unwrap();
        let motion = report.motion.unwrap();

        let published = buffer.latest().unwrap();
        assert_eq!(published.version, 2);
        assert_eq!(published.frame_index, 1);
        assert_eq!(published.motion, Some(motion));
        assert_eq!(
            published.image.get_pixel(motion.min_x, motion.min_y),
            &ANNOTATION_COLOR
        );
    }

    #[test]
    fn test_size_change_reseeds_and_restarts_warmup() {
        let (mut processor, _buffer) = processor(detector_config(2, 0.1));

        for _ in 0..4 {
            processor.process(&scene(640, 480)).unwrap();
        }
        assert!(processor.is_warmed_up());
        assert_eq!(processor.background().dimensions(), Some((400, 300)));

        let report = processor.process(&scene(640, 360)).unwrap();
        assert!(!report.detection_ran);
        assert_eq!(processor.background().dimensions(), Some((400, 225)));
        assert_eq!(processor.background().samples(), 1);
        assert_eq!(processor.frame_count(), 5);

        processor.process(&scene(640, 360)).unwrap();
        processor.process(&scene(640, 360)).unwrap();
        assert!(processor.process(&scene(640, 360)).unwrap().detection_ran);
    }

    #[test]
    fn test_degenerate_frame_leaves_state_unchanged() {
        let (mut processor, buffer) = processor(detector_config(0, 0.1));
        processor.process(&scene(400, 300)).unwrap();
        let before = buffer.latest().unwrap();

        let err = processor.process(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidFrame { .. }));
        assert_eq!(processor.frame_count(), 1);
        assert_eq!(buffer.version(), before.version);
        assert_eq!(buffer.latest().unwrap().image, before.image);
    }
}
