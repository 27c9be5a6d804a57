pub mod analyzer;
pub mod app;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_buffer;
pub mod pipeline;
pub mod source;
pub mod streaming;

pub use analyzer::{
    BackgroundModel, FrameAnnotator, FrameProcessor, MotionSegmenter, ProcessReport,
    ProcessorMetrics,
};
pub use app::{ComponentState, MotionCamOrchestrator, ShutdownReason, ShutdownTrigger};
pub use config::{
    DetectorConfig, MotionCamConfig, OverlayConfig, SourceConfig, SourceKind, StreamConfig,
    StreamMode,
};
pub use error::{AnalyzerError, MotionCamError, Result, SourceError, StreamError};
pub use frame::{BoundingBox, MotionRegion, PublishedFrame};
pub use frame_buffer::{FrameBuffer, FrameBufferStatsSnapshot};
pub use pipeline::{MotionPipeline, PipelineMetrics, SkipReason, StepOutcome};
pub use source::{FrameSource, SnapshotSource, SyntheticSource};
pub use streaming::{StreamServer, StreamServerBuilder, StreamStats};
