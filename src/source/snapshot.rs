use super::mjpeg::{multipart_boundary, MjpegParser};
use super::FrameSource;
use crate::config::SourceConfig;
use crate::error::SourceError;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use image::RgbImage;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Placeholder in snapshot URLs replaced by a per-request counter
pub const COUNTER_TOKEN: &str = "COUNTER";

/// Expand the request counter into a snapshot URL template
pub fn snapshot_url(template: &str, counter: u64) -> String {
    template.replace(COUNTER_TOKEN, &counter.to_string())
}

/// Open multipart response and the parser splitting it into images
struct MjpegStream {
    url: String,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: MjpegParser,
}

impl MjpegStream {
    async fn next_image(&mut self) -> Result<Bytes, SourceError> {
        loop {
            if let Some(image) = self.parser.next_part() {
                return Ok(image);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.parser.push(&chunk),
                Some(Err(e)) => {
                    return Err(SourceError::Http {
                        url: self.url.clone(),
                        details: e.to_string(),
                    })
                }
                None => {
                    return Err(SourceError::Http {
                        url: self.url.clone(),
                        details: "MJPEG stream ended".to_string(),
                    })
                }
            }
        }
    }
}

/// Reads a remote network camera over HTTP.
///
/// Still-image endpoints are requested once per frame. When the camera
/// answers with `multipart/x-mixed-replace` the response is kept open and
/// each read takes the next part; a broken stream is reopened on the
/// following read.
pub struct SnapshotSource {
    client: Client,
    url_template: String,
    timeout: Duration,
    counter: u64,
    stream: Option<MjpegStream>,
    name: String,
}

impl SnapshotSource {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let url_template = url_template.into();
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SourceError::Http {
                url: url_template.clone(),
                details: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            name: format!("snapshot {}", url_template),
            client,
            url_template,
            timeout,
            counter: 0,
            stream: None,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        let url = config.url.clone().ok_or_else(|| SourceError::Http {
            url: String::new(),
            details: "snapshot source configured without a url".to_string(),
        })?;
        Self::new(url, Duration::from_millis(config.request_timeout_ms))
    }

    /// Requests issued so far
    pub fn requests(&self) -> u64 {
        self.counter
    }

    /// Whether a multipart stream is currently open
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Request `url` and return either a still image or the first part of a
    /// newly opened stream
    async fn fetch(&mut self, url: &str) -> Result<Bytes, SourceError> {
        let http_error = |details: String| SourceError::Http {
            url: url.to_string(),
            details,
        };

        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| http_error(format!("no response within {:?}", self.timeout)))?
            .map_err(|e| http_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(http_error(format!("HTTP {}", response.status())));
        }

        let boundary = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(multipart_boundary);

        if let Some(boundary) = boundary {
            info!("Opened MJPEG stream from {} (boundary {:?})", url, boundary);
            let stream = self.stream.insert(MjpegStream {
                url: url.to_string(),
                body: response.bytes_stream().boxed(),
                parser: MjpegParser::new(&boundary),
            });
            return next_with_timeout(stream, self.timeout).await;
        }

        let body = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| http_error(format!("body not received within {:?}", self.timeout)))?
            .map_err(|e| http_error(e.to_string()))?;
        trace!("Snapshot body of {} bytes from {}", body.len(), url);
        Ok(body)
    }

    async fn next_encoded(&mut self) -> Result<Bytes, SourceError> {
        if let Some(stream) = self.stream.as_mut() {
            return next_with_timeout(stream, self.timeout).await;
        }

        let url = snapshot_url(&self.url_template, self.counter);
        self.counter += 1;
        self.fetch(&url).await
    }
}

async fn next_with_timeout(stream: &mut MjpegStream, timeout: Duration) -> Result<Bytes, SourceError> {
    tokio::time::timeout(timeout, stream.next_image())
        .await
        .map_err(|_| SourceError::Http {
            url: stream.url.clone(),
            details: format!("no MJPEG part within {:?}", timeout),
        })?
}

fn decode(encoded: &[u8]) -> Result<RgbImage, SourceError> {
    let image = image::load_from_memory(encoded).map_err(|e| SourceError::Decode {
        details: e.to_string(),
    })?;
    Ok(image.to_rgb8())
}

#[async_trait]
impl FrameSource for SnapshotSource {
    async fn read_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let encoded = match self.next_encoded().await {
            Ok(encoded) => encoded,
            Err(e) => {
                if self.stream.take().is_some() {
                    warn!("Closing MJPEG stream: {}", e);
                }
                return Err(e);
            }
        };

        let frame = decode(&encoded)?;
        debug!(
            "Fetched {}x{} frame ({} requests, streaming: {})",
            frame.width(),
            frame.height(),
            self.counter,
            self.is_streaming()
        );
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
