use crate::frame::{BoundingBox, PublishedFrame};
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Single-slot cell holding the latest annotated frame.
///
/// Writers replace the slot under a short mutex; readers clone the `Arc`
/// under the same mutex and do all further work (encoding, sending) after
/// releasing it. A published image is never mutated again, so a reader
/// holding an older frame can never observe a partially written one.
pub struct FrameBuffer {
    slot: Mutex<Option<PublishedFrame>>,
    published: Notify,
    stats: FrameBufferStats,
}

/// Counters for monitoring the buffer
#[derive(Debug, Default)]
pub struct FrameBufferStats {
    /// Total frames published
    pub frames_published: AtomicU64,
    /// Total successful reads
    pub frames_read: AtomicU64,
}

impl FrameBufferStats {
    pub fn snapshot(&self) -> FrameBufferStatsSnapshot {
        FrameBufferStatsSnapshot {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBufferStatsSnapshot {
    pub frames_published: u64,
    pub frames_read: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            published: Notify::new(),
            stats: FrameBufferStats::default(),
        }
    }

    /// Replace the current frame and wake every waiting reader.
    ///
    /// Returns the version assigned to the new frame.
    pub fn publish(
        &self,
        image: RgbImage,
        frame_index: u64,
        motion: Option<BoundingBox>,
    ) -> u64 {
        let image = Arc::new(image);
        let version = {
            let mut slot = self.slot.lock();
            let version = slot.as_ref().map_or(1, |frame| frame.version + 1);
            *slot = Some(PublishedFrame {
                version,
                frame_index,
                timestamp: SystemTime::now(),
                image,
                motion,
            });
            version
        };

        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        self.published.notify_waiters();
        trace!("Published frame {} as version {}", frame_index, version);
        version
    }

    /// Latest frame, if anything has been published yet
    pub fn latest(&self) -> Option<PublishedFrame> {
        let frame = self.peek();
        if frame.is_some() {
            self.record_read();
        }
        frame
    }

    /// Clone the slot without counting a read
    fn peek(&self) -> Option<PublishedFrame> {
        self.slot.lock().clone()
    }

    fn record_read(&self) {
        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Version of the latest frame, 0 before the first publish
    pub fn version(&self) -> u64 {
        self.slot.lock().as_ref().map_or(0, |frame| frame.version)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Wait until at least one frame has been published
    pub async fn wait_for_frame(&self) -> PublishedFrame {
        self.wait_for_newer(0).await
    }

    /// Wait for a frame whose version is greater than `seen_version`
    pub async fn wait_for_newer(&self, seen_version: u64) -> PublishedFrame {
        loop {
            // Register interest before checking so a publish in between is not lost
            let notified = self.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.peek() {
                if frame.version > seen_version {
                    self.record_read();
                    return frame;
                }
            }

            debug!("Waiting for a frame newer than version {}", seen_version);
            notified.await;
        }
    }

    pub fn stats(&self) -> FrameBufferStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
