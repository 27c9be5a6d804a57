use super::types::{ComponentState, ShutdownReason, ShutdownTrigger};
use crate::analyzer::FrameProcessor;
use crate::config::MotionCamConfig;
use crate::error::Result;
use crate::frame_buffer::FrameBuffer;
use crate::pipeline::MotionPipeline;
use crate::source;
use crate::streaming::{StreamServer, StreamServerBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main application coordinator owning the pipeline, worker and server
pub struct MotionCamOrchestrator {
    pub(super) config: MotionCamConfig,
    pub(super) buffer: Arc<FrameBuffer>,
    pub(super) pipeline: Arc<Mutex<MotionPipeline>>,
    pub(super) stream_server: Arc<StreamServer>,

    // Running tasks
    pub(super) worker_handle: Option<JoinHandle<Result<()>>>,
    pub(super) server_handle: Option<JoinHandle<Result<()>>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_trigger: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl MotionCamOrchestrator {
    /// Create a new orchestrator with the given configuration
    pub async fn new(config: MotionCamConfig) -> Result<Self> {
        let buffer = Arc::new(FrameBuffer::new());
        let cancellation_token = CancellationToken::new();
        let (shutdown_trigger, shutdown_receiver) = ShutdownTrigger::new();

        let frame_source = source::from_config(&config.source)?;
        let processor = FrameProcessor::from_config(&config, Arc::clone(&buffer));
        let pipeline = MotionPipeline::new(
            frame_source,
            processor,
            Duration::from_millis(config.source.startup_delay_ms),
        );
        let status = pipeline.status();
        let pipeline = Arc::new(Mutex::new(pipeline));

        let stream_server = StreamServerBuilder::new()
            .config(config.stream.clone())
            .buffer(Arc::clone(&buffer))
            .pipeline(Arc::clone(&pipeline))
            .status(status)
            .token(cancellation_token.clone())
            .retry_delay(Duration::from_millis(config.source.retry_delay_ms))
            .build()?;

        info!(
            "Motion pipeline assembled ({:?} mode, source {:?})",
            config.stream.mode, config.source.kind
        );

        Ok(Self {
            config,
            buffer,
            pipeline,
            stream_server: Arc::new(stream_server),
            worker_handle: None,
            server_handle: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_trigger,
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        })
    }

    /// The shared output frame cell
    pub fn frame_buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn pipeline(&self) -> Arc<Mutex<MotionPipeline>> {
        Arc::clone(&self.pipeline)
    }

    pub fn config(&self) -> &MotionCamConfig {
        &self.config
    }

    /// Handle for requesting shutdown from another task
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown_trigger.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
