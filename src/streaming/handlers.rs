use crate::config::StreamMode;
use crate::error::AnalyzerError;
use crate::frame::PublishedFrame;
use crate::pipeline::StepOutcome;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::convert::Infallible;
use tracing::{debug, error, info, trace, warn};

use super::encode::{encode_jpeg, multipart_part, MJPEG_CONTENT_TYPE};
use super::server::ServerState;

/// Handler for the multipart MJPEG endpoint
pub async fn video_feed_handler(State(state): State<ServerState>) -> Response {
    let guard = state.stats.connect();
    info!(
        "MJPEG viewer connected ({} active)",
        state.stats.snapshot().active_connections
    );

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut seen_version = 0u64;

        loop {
            let frame = match state.mode {
                StreamMode::Background => tokio::select! {
                    _ = state.token.cancelled() => break,
                    frame = state.buffer.wait_for_newer(seen_version) => frame,
                },
                StreamMode::OnDemand => tokio::select! {
                    _ = state.token.cancelled() => break,
                    result = next_on_demand_frame(&state) => match result {
                        Ok(Some(frame)) => frame,
                        Ok(None) => {
                            tokio::time::sleep(state.retry_delay).await;
                            continue;
                        }
                        Err(e) => {
                            error!("Frame processing failed, shutting down: {}", e);
                            state.token.cancel();
                            break;
                        }
                    },
                },
            };
            seen_version = frame.version;

            // Encode from the shared immutable image with no lock held
            match encode_jpeg(&frame.image, state.jpeg_quality) {
                Ok(jpeg) => {
                    state.stats.record_frame(jpeg.len());
                    trace!("Streaming version {} ({} bytes)", frame.version, jpeg.len());
                    yield Ok::<_, Infallible>(multipart_part(&jpeg));
                }
                Err(e) => {
                    warn!("Skipping frame version {}: {}", frame.version, e);
                    state.stats.record_encode_error();
                }
            }
        }

        debug!("MJPEG viewer stream closed");
    };

    (
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, private"),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Step the shared pipeline once and return what it published
async fn next_on_demand_frame(
    state: &ServerState,
) -> Result<Option<PublishedFrame>, AnalyzerError> {
    let outcome = {
        let mut pipeline = state.pipeline.lock().await;
        pipeline.step().await?
    };

    match outcome {
        StepOutcome::Published(_) => Ok(state.buffer.latest()),
        StepOutcome::Skipped(reason) => {
            trace!("On-demand step skipped: {:?}", reason);
            Ok(None)
        }
    }
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let latest = state.buffer.latest();
    let buffer_stats = state.buffer.stats();
    let metrics = state.status.metrics();

    let health_status = if state.token.is_cancelled() {
        "stopping"
    } else {
        "healthy"
    };

    let health_info = serde_json::json!({
        "status": health_status,
        "mode": state.mode,
        "source": state.status.source(),
        "latest_version": latest.as_ref().map(|f| f.version),
        "latest_frame_age_ms": latest.as_ref().map(|f| f.age_ms()),
        "motion": latest.as_ref().and_then(|f| f.motion),
        "frames_published": buffer_stats.frames_published,
        "frames_processed": metrics.processor.frames_processed,
        "reads_skipped": metrics.reads_skipped,
        "detections_run": metrics.processor.detections_run,
        "motion_frames": metrics.processor.motion_frames,
        "background_initialized": metrics.processor.background_initialized,
        "viewers": state.stats.snapshot(),
    });

    (StatusCode::OK, axum::Json(health_info))
}

/// Landing page embedding the live stream
pub async fn index_handler() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Motion Detection</title>
    <style>
        :root { color-scheme: dark; }
        body {
            margin: 0;
            background: #111;
            color: #ddd;
            font-family: sans-serif;
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            min-height: 100vh;
        }
        img.stream { display: block; max-width: 100vw; height: auto; }
    </style>
</head>
<body>
    <h1>Live Motion Detection</h1>
    <img class="stream" src="/video_feed" alt="Live stream">
</body>
</html>
"#,
    )
}
