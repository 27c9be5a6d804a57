use super::types::{ShutdownReason, ShutdownTrigger};
use crate::error::Result;
use crate::pipeline::{MotionPipeline, StepOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

/// Frames between periodic progress logs
const PROGRESS_LOG_INTERVAL: u64 = 100;

/// Spawn the background processing loop.
///
/// The loop checks for cancellation between cycles, backs off after a
/// skipped read and stops with an error when processing becomes
/// impossible, requesting shutdown on the way out.
pub(super) fn spawn_worker(
    pipeline: Arc<Mutex<MotionPipeline>>,
    token: CancellationToken,
    retry_delay: Duration,
    shutdown: ShutdownTrigger,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let result = run_worker(&pipeline, &token, retry_delay).await;
        if let Err(e) = &result {
            error!("Background worker failed: {}", e);
            shutdown.trigger(ShutdownReason::Error(e.to_string())).await;
        }
        result
    })
}

async fn run_worker(
    pipeline: &Mutex<MotionPipeline>,
    token: &CancellationToken,
    retry_delay: Duration,
) -> Result<()> {
    info!("Background worker started");

    loop {
        let outcome = tokio::select! {
            _ = token.cancelled() => break,
            outcome = async { pipeline.lock().await.step().await } => outcome?,
        };

        match outcome {
            StepOutcome::Published(report) => {
                if report.frame_index > 0 && report.frame_index % PROGRESS_LOG_INTERVAL == 0 {
                    let metrics = pipeline.lock().await.metrics();
                    info!(
                        "Processed {} frames ({} with motion, {} reads skipped)",
                        metrics.processor.frames_processed,
                        metrics.processor.motion_frames,
                        metrics.reads_skipped
                    );
                }
            }
            StepOutcome::Skipped(reason) => {
                trace!("Worker cycle skipped: {:?}", reason);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }

    info!("Background worker stopped");
    Ok(())
}
