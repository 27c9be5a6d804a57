use super::FrameSource;
use crate::config::SourceConfig;
use crate::error::SourceError;

use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use image::{ImageFormat, RgbImage};
use tracing::{debug, info, warn};

/// How long one read waits for the appsink before reporting no frame
const PULL_TIMEOUT_MS: u64 = 1000;

/// Local V4L2 camera delivering MJPEG through a GStreamer appsink
pub struct DeviceSource {
    pipeline: Pipeline,
    appsink: AppSink,
    name: String,
}

impl DeviceSource {
    pub fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        let device_error = |details: String| SourceError::Device { details };

        gstreamer::init().map_err(|e| device_error(format!("Failed to initialize GStreamer: {}", e)))?;

        let description = pipeline_description(config);
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| device_error(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| device_error("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| device_error("Pipeline has no appsink".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| device_error("Failed to downcast to AppSink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| device_error(format!("Failed to start pipeline: {}", e)))?;

        Ok(Self {
            pipeline,
            appsink,
            name: format!(
                "/dev/video{} {}x{} @ {}fps",
                config.device_index, config.resolution.0, config.resolution.1, config.fps
            ),
        })
    }
}

fn pipeline_description(config: &SourceConfig) -> String {
    let (width, height) = config.resolution;
    format!(
        "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
         image/jpeg,width={},height={},framerate={}/1 ! \
         queue max-size-buffers=2 leaky=downstream ! \
         appsink name=sink sync=false max-buffers=1 drop=true",
        config.device_index, width, height, config.fps
    )
}

#[async_trait]
impl FrameSource for DeviceSource {
    async fn read_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let appsink = self.appsink.clone();
        let sample = tokio::task::spawn_blocking(move || {
            appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
        })
        .await
        .map_err(|e| SourceError::Device {
            details: format!("capture task failed: {}", e),
        })?;

        let Some(sample) = sample else {
            debug!("No sample from {} within {}ms", self.name, PULL_TIMEOUT_MS);
            return Ok(None);
        };

        let buffer = sample.buffer().ok_or_else(|| SourceError::Device {
            details: "No buffer in sample".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| SourceError::Device {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let image = image::load_from_memory_with_format(map.as_slice(), ImageFormat::Jpeg)
            .map_err(|e| SourceError::Decode {
                details: e.to_string(),
            })?;
        Ok(Some(image.to_rgb8()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline: {}", e);
        }
    }
}
