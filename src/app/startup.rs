use super::worker::spawn_worker;
use super::{ComponentState, MotionCamOrchestrator};
use crate::config::StreamMode;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub(super) const PIPELINE_COMPONENT: &str = "pipeline";
pub(super) const STREAMING_COMPONENT: &str = "streaming";

impl MotionCamOrchestrator {
    /// Initialize all system components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing motioncam components");

        let mut states = self.component_states.lock().await;
        states.insert(PIPELINE_COMPONENT.to_string(), ComponentState::Stopped);
        states.insert(STREAMING_COMPONENT.to_string(), ComponentState::Stopped);
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the worker (background mode) and the stream server
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting motioncam");

        match self.config.stream.mode {
            StreamMode::Background => {
                self.set_component_state(PIPELINE_COMPONENT, ComponentState::Starting)
                    .await;
                self.worker_handle = Some(spawn_worker(
                    Arc::clone(&self.pipeline),
                    self.cancellation_token.clone(),
                    Duration::from_millis(self.config.source.retry_delay_ms),
                    self.shutdown_trigger.clone(),
                ));
                self.set_component_state(PIPELINE_COMPONENT, ComponentState::Running)
                    .await;
                info!("Background worker started");
            }
            StreamMode::OnDemand => {
                // Viewers drive the pipeline themselves
                self.set_component_state(PIPELINE_COMPONENT, ComponentState::Running)
                    .await;
                info!("On-demand mode: frames are processed per viewer request");
            }
        }

        self.set_component_state(STREAMING_COMPONENT, ComponentState::Starting)
            .await;

        let listener = self.stream_server.bind().await.map_err(|e| {
            error!("Failed to start stream server: {}", e);
            e
        })?;

        let server = Arc::clone(&self.stream_server);
        self.server_handle = Some(tokio::spawn(async move { server.serve(listener).await }));

        self.set_component_state(STREAMING_COMPONENT, ComponentState::Running)
            .await;
        info!("Streaming server started on {}", self.stream_server.address());

        Ok(())
    }
}
