//! Frame acquisition.
//!
//! Every source yields owned RGB frames. A read that produces nothing
//! (`Ok(None)`) or fails is a skipped cycle for the caller, never a
//! reason to stop.

mod mjpeg;
mod snapshot;
mod synthetic;

#[cfg(all(feature = "camera", target_os = "linux"))]
mod device;

#[cfg(test)]
mod tests;

pub use mjpeg::{multipart_boundary, MjpegParser};
pub use snapshot::{snapshot_url, SnapshotSource, COUNTER_TOKEN};
pub use synthetic::SyntheticSource;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use device::DeviceSource;

use crate::config::{SourceConfig, SourceKind};
use crate::error::SourceError;

use async_trait::async_trait;
use image::RgbImage;
use tracing::info;

#[async_trait]
pub trait FrameSource: Send {
    /// Read the next frame; `Ok(None)` when no frame was available
    async fn read_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;

    /// Short human-readable description for logs
    fn name(&self) -> &str;
}

/// Build the source selected by configuration
pub fn from_config(config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    let source: Box<dyn FrameSource> = match config.kind {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(config.resolution, config.fps)),
        SourceKind::Snapshot => Box::new(SnapshotSource::from_config(config)?),
        SourceKind::Device => open_device(config)?,
    };

    info!("Using frame source: {}", source.name());
    Ok(source)
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn open_device(config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    Ok(Box::new(DeviceSource::open(config)?))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn open_device(_config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    Err(SourceError::Device {
        details: "device capture requires a Linux build with the `camera` feature".to_string(),
    })
}
