use crate::analyzer::{FrameProcessor, ProcessReport, ProcessorMetrics};
use crate::error::AnalyzerError;
use crate::frame_buffer::FrameBuffer;
use crate::source::FrameSource;

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a cycle produced no new frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The source had nothing to deliver
    NoFrame,
    /// The source reported an error
    ReadFailed(String),
    /// The frame could not be processed (e.g. zero-sized)
    InvalidFrame(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Published(ProcessReport),
    Skipped(SkipReason),
}

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineMetrics {
    pub processor: ProcessorMetrics,
    pub reads_skipped: u64,
}

/// Counters published by the pipeline after every step.
///
/// Readers such as the health endpoint use this instead of locking the
/// pipeline, which a worker may hold for a whole slow camera read.
#[derive(Debug)]
pub struct PipelineStatus {
    source: String,
    metrics: RwLock<PipelineMetrics>,
}

impl PipelineStatus {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            metrics: RwLock::new(PipelineMetrics::default()),
        }
    }

    /// Name of the frame source feeding the pipeline
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Metrics as of the last completed step
    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.read().clone()
    }

    fn store(&self, metrics: PipelineMetrics) {
        *self.metrics.write() = metrics;
    }
}

/// A frame source wired to a frame processor.
///
/// One `step` is one read-process-publish cycle. In background mode a
/// worker task steps continuously; in on-demand mode each viewer steps it
/// under the shared lock.
pub struct MotionPipeline {
    source: Box<dyn FrameSource>,
    processor: FrameProcessor,
    startup_delay: Duration,
    started: bool,
    reads_skipped: u64,
    status: Arc<PipelineStatus>,
}

impl MotionPipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        processor: FrameProcessor,
        startup_delay: Duration,
    ) -> Self {
        let status = Arc::new(PipelineStatus::new(source.name()));
        Self {
            source,
            processor,
            startup_delay,
            started: false,
            reads_skipped: 0,
            status,
        }
    }

    /// Run one cycle.
    ///
    /// Read failures and unusable frames skip the cycle without touching
    /// the frame counter, the background or the published frame. Only
    /// errors that leave the model unusable are returned.
    pub async fn step(&mut self) -> Result<StepOutcome, AnalyzerError> {
        let outcome = self.run_cycle().await;
        self.status.store(self.metrics());
        outcome
    }

    async fn run_cycle(&mut self) -> Result<StepOutcome, AnalyzerError> {
        if !self.started {
            self.started = true;
            if !self.startup_delay.is_zero() {
                info!(
                    "Waiting {:?} for {} to settle",
                    self.startup_delay,
                    self.source.name()
                );
                tokio::time::sleep(self.startup_delay).await;
            }
        }

        let frame = match self.source.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(self.skip(SkipReason::NoFrame)),
            Err(e) => {
                warn!("Frame read from {} failed: {}", self.source.name(), e);
                return Ok(self.skip(SkipReason::ReadFailed(e.to_string())));
            }
        };

        match self.processor.process(&frame) {
            Ok(report) => Ok(StepOutcome::Published(report)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Dropping unusable frame: {}", e);
                Ok(self.skip(SkipReason::InvalidFrame(e.to_string())))
            }
        }
    }

    fn skip(&mut self, reason: SkipReason) -> StepOutcome {
        self.reads_skipped += 1;
        debug!("Skipping cycle: {:?}", reason);
        StepOutcome::Skipped(reason)
    }

    pub fn buffer(&self) -> Arc<FrameBuffer> {
        self.processor.buffer()
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    pub fn metrics(&self) -> PipelineMetrics {
        PipelineMetrics {
            processor: self.processor.metrics(),
            reads_skipped: self.reads_skipped,
        }
    }

    /// Shared status cell, readable without locking the pipeline
    pub fn status(&self) -> Arc<PipelineStatus> {
        Arc::clone(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FrameAnnotator;
    use crate::config::DetectorConfig;
    use crate::error::SourceError;

    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;

    /// Replays a fixed script of read results
    struct ScriptedSource {
        script: VecDeque<Result<Option<RgbImage>, SourceError>>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn read_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn frame(value: u8) -> RgbImage {
        RgbImage::from_pixel(400, 300, Rgb([value, value, value]))
    }

    fn pipeline(script: Vec<Result<Option<RgbImage>, SourceError>>) -> MotionPipeline {
        let buffer = Arc::new(FrameBuffer::new());
        let processor = FrameProcessor::new(
            DetectorConfig {
                warmup_frames: 0,
                ..DetectorConfig::default()
            },
            FrameAnnotator::without_timestamp(),
            buffer,
        );
        let source = ScriptedSource {
            script: script.into(),
        };
        MotionPipeline::new(Box::new(source), processor, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_failed_read_changes_nothing() {
        let mut pipeline = pipeline(vec![
            Ok(Some(frame(50))),
            Err(SourceError::Decode {
                details: "truncated jpeg".to_string(),
            }),
        ]);
        let buffer = pipeline.buffer();

        assert!(matches!(
            pipeline.step().await.unwrap(),
            StepOutcome::Published(_)
        ));
        let before = buffer.latest().unwrap();
        let background_before = pipeline.processor().background().to_gray();

        let outcome = pipeline.step().await.unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Skipped(SkipReason::ReadFailed(_))
        ));

        assert_eq!(pipeline.processor().frame_count(), 1);
        assert_eq!(pipeline.processor().background().to_gray(), background_before);
        let after = buffer.latest().unwrap();
        assert_eq!(after.version, before.version);
        assert_eq!(after.image, before.image);
    }

    #[tokio::test]
    async fn test_empty_and_degenerate_reads_are_skipped() {
        let mut pipeline = pipeline(vec![Ok(None), Ok(Some(RgbImage::new(0, 0)))]);

        assert_eq!(
            pipeline.step().await.unwrap(),
            StepOutcome::Skipped(SkipReason::NoFrame)
        );
        assert!(matches!(
            pipeline.step().await.unwrap(),
            StepOutcome::Skipped(SkipReason::InvalidFrame(_))
        ));

        let metrics = pipeline.metrics();
        assert_eq!(metrics.reads_skipped, 2);
        assert_eq!(metrics.processor.frames_processed, 0);
        assert!(pipeline.buffer().is_empty());
    }

    #[tokio::test]
    async fn test_steps_publish_in_order() {
        let mut pipeline = pipeline((0..5).map(|i| Ok(Some(frame(40 + i)))).collect());

        for expected in 0..5u64 {
            match pipeline.step().await.unwrap() {
                StepOutcome::Published(report) => {
                    assert_eq!(report.frame_index, expected);
                    assert_eq!(report.version, expected + 1);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(pipeline.buffer().latest().unwrap().frame_index, 4);
    }

    #[tokio::test]
    async fn test_status_tracks_completed_steps() {
        let mut pipeline = pipeline(vec![Ok(Some(frame(30))), Ok(None), Ok(Some(frame(30)))]);
        let status = pipeline.status();

        assert_eq!(status.source(), "scripted");
        assert_eq!(status.metrics(), PipelineMetrics::default());

        for _ in 0..3 {
            pipeline.step().await.unwrap();
        }

        let metrics = status.metrics();
        assert_eq!(metrics, pipeline.metrics());
        assert_eq!(metrics.processor.frames_processed, 2);
        assert_eq!(metrics.reads_skipped, 1);
        assert!(metrics.processor.background_initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_delay_applies_once() {
        let buffer = Arc::new(FrameBuffer::new());
        let processor = FrameProcessor::new(
            DetectorConfig::default(),
            FrameAnnotator::without_timestamp(),
            buffer,
        );
        let source = ScriptedSource {
            script: vec![Ok(Some(frame(10))), Ok(Some(frame(10)))].into(),
        };
        let mut pipeline = MotionPipeline::new(Box::new(source), processor, Duration::from_millis(200));

        let start = tokio::time::Instant::now();
        pipeline.step().await.unwrap();
        let first = start.elapsed();
        assert!(first >= Duration::from_millis(200) && first < Duration::from_millis(201));

        // Frame processing does not advance the paused clock
        let second = tokio::time::Instant::now();
        pipeline.step().await.unwrap();
        assert!(second.elapsed() < Duration::from_millis(1));
    }
}
