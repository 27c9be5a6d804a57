use crate::{
    config::{StreamConfig, StreamMode},
    error::{MotionCamError, Result, StreamError},
    frame_buffer::FrameBuffer,
    pipeline::{MotionPipeline, PipelineStatus},
};
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{health_handler, index_handler, video_feed_handler};
use super::stats::StreamStats;

/// Pause before an on-demand viewer retries after a skipped read
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) buffer: Arc<FrameBuffer>,
    pub(crate) pipeline: Arc<Mutex<MotionPipeline>>,
    pub(crate) status: Arc<PipelineStatus>,
    pub(crate) mode: StreamMode,
    pub(crate) jpeg_quality: u8,
    pub(crate) retry_delay: Duration,
    pub(crate) stats: Arc<StreamStats>,
    pub(crate) token: CancellationToken,
}

/// MJPEG server publishing the annotated frames over HTTP
pub struct StreamServer {
    pub(crate) config: StreamConfig,
    state: ServerState,
}

impl StreamServer {
    pub fn new(
        config: StreamConfig,
        buffer: Arc<FrameBuffer>,
        pipeline: Arc<Mutex<MotionPipeline>>,
        status: Arc<PipelineStatus>,
        token: CancellationToken,
        retry_delay: Duration,
    ) -> Self {
        let state = ServerState {
            buffer,
            pipeline,
            status,
            mode: config.mode,
            jpeg_quality: config.jpeg_quality,
            retry_delay,
            stats: Arc::new(StreamStats::default()),
            token,
        };

        Self { config, state }
    }

    /// Routes served by this server
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/video_feed", get(video_feed_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.state.stats)
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("MJPEG server listening on {} ({:?} mode)", addr, self.state.mode);
        Ok(listener)
    }

    /// Serve on `listener` until the cancellation token fires
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let token = self.state.token.clone();

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("MJPEG server stopped");
        Ok(())
    }

    /// Bind and serve
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

/// Stream server builder for configuration
pub struct StreamServerBuilder {
    config: Option<StreamConfig>,
    buffer: Option<Arc<FrameBuffer>>,
    pipeline: Option<Arc<Mutex<MotionPipeline>>>,
    status: Option<Arc<PipelineStatus>>,
    token: Option<CancellationToken>,
    retry_delay: Duration,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            buffer: None,
            pipeline: None,
            status: None,
            token: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn buffer(mut self, buffer: Arc<FrameBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<Mutex<MotionPipeline>>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Status cell of the same pipeline, read by `/health`
    pub fn status(mut self, status: Arc<PipelineStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Token whose cancellation stops the server and all open streams
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn build(self) -> Result<StreamServer> {
        let missing = |what: &str| {
            MotionCamError::Stream(StreamError::StartupFailed {
                details: format!("{} is required", what),
            })
        };

        let config = self.config.ok_or_else(|| missing("Stream configuration"))?;
        let buffer = self.buffer.ok_or_else(|| missing("Frame buffer"))?;
        let pipeline = self.pipeline.ok_or_else(|| missing("Motion pipeline"))?;
        let status = self.status.ok_or_else(|| missing("Pipeline status"))?;

        Ok(StreamServer::new(
            config,
            buffer,
            pipeline,
            status,
            self.token.unwrap_or_default(),
            self.retry_delay,
        ))
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
