use super::{MotionCamOrchestrator, ShutdownReason, ShutdownTrigger};
use crate::error::{MotionCamError, Result};
use tokio::signal;
use tracing::{info, warn};

impl MotionCamOrchestrator {
    /// Run until a signal, a shutdown request or a fatal error, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("motioncam is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| MotionCamError::system("Shutdown receiver already taken"))?;

        setup_signal_handlers(self.shutdown_trigger.clone());

        let token = self.cancellation_token.clone();
        let reason = tokio::select! {
            reason = shutdown_receiver => reason.map_err(|_| {
                MotionCamError::system("Shutdown channel closed unexpectedly")
            })?,
            _ = token.cancelled() => {
                ShutdownReason::Error("pipeline stopped by a fatal processing error".to_string())
            }
        };

        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown().await?.max(reason.exit_code());

        info!("motioncam shutdown complete");
        Ok(exit_code)
    }
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(trigger: ShutdownTrigger) {
    // Handle SIGTERM (systemd stop) - Unix only
    #[cfg(unix)]
    {
        let trigger = trigger.clone();
        tokio::spawn(async move {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("Received SIGTERM signal");
                        trigger
                            .trigger(ShutdownReason::Signal("SIGTERM".to_string()))
                            .await;
                    }
                }
                Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            trigger
                .trigger(ShutdownReason::Signal("SIGINT".to_string()))
                .await;
        }
    });
}
