use super::startup::{PIPELINE_COMPONENT, STREAMING_COMPONENT};
use super::{ComponentState, MotionCamOrchestrator};
use crate::error::{MotionCamError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl MotionCamOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Stops the worker loop, the server and every open stream
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        let server = self.server_handle.take();
        if let Err(e) = self
            .stop_component(STREAMING_COMPONENT, server, SERVER_STOP_TIMEOUT)
            .await
        {
            error!("Error stopping streaming: {}", e);
            exit_code = 1;
        }

        let worker = self.worker_handle.take();
        if let Err(e) = self
            .stop_component(PIPELINE_COMPONENT, worker, WORKER_STOP_TIMEOUT)
            .await
        {
            error!("Error stopping pipeline: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for a component's task to finish within `limit`
    async fn stop_component(
        &self,
        component: &str,
        handle: Option<JoinHandle<Result<()>>>,
        limit: Duration,
    ) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let Some(handle) = handle else {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
            return Ok(());
        };

        let result = match timeout(limit, handle).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join_error)) => Err(MotionCamError::component(
                component.to_string(),
                format!("task panicked: {}", join_error),
            )),
            Err(_) => Err(MotionCamError::component(
                component.to_string(),
                "stop timeout".to_string(),
            )),
        };

        match &result {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
            }
            Err(e) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
            }
        }

        result
    }
}
