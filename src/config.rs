use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct MotionCamConfig {
    pub source: SourceConfig,
    pub detector: DetectorConfig,
    pub overlay: OverlayConfig,
    pub stream: StreamConfig,
}

/// Where frames come from
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Generated test scene, no hardware required
    Synthetic,
    /// Remote network camera: a still-image endpoint polled per frame, or a
    /// multipart MJPEG stream kept open across reads
    Snapshot,
    /// Local V4L2 device (requires the `camera` feature)
    Device,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,

    /// Camera URL; every `COUNTER` token is replaced by a request counter
    #[serde(default)]
    pub url: Option<String>,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_device_index")]
    pub device_index: u32,

    /// Capture resolution (width, height) for device and synthetic sources
    #[serde(default = "default_source_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second for device and synthetic sources
    #[serde(default = "default_source_fps")]
    pub fps: u32,

    /// Connect timeout, and the limit on each snapshot or stream part
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Pause after a failed or empty read before trying again
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Sensor settle time before the first read
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Background adaptation rate (alpha)
    #[serde(default = "default_accum_weight")]
    pub accum_weight: f64,

    /// Frames absorbed into the background before detection starts
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u64,

    /// Per-pixel difference above which a pixel counts as motion
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: u8,

    /// Working width every frame is resized to
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    #[serde(default = "default_morph_iterations")]
    pub erode_iterations: u32,

    #[serde(default = "default_morph_iterations")]
    pub dilate_iterations: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OverlayConfig {
    /// Stamp the wall-clock time on every frame
    #[serde(default = "default_timestamp_overlay")]
    pub timestamp: bool,

    /// TrueType font used for the timestamp
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Font height in pixels
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// IANA timezone for the timestamp; local time when unset
    #[serde(default)]
    pub timezone: Option<String>,
}

/// How processing is scheduled relative to viewers
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// A dedicated task processes frames continuously
    Background,
    /// Every viewer iteration pulls and processes one frame inline
    OnDemand,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StreamConfig {
    /// IP address to bind to
    #[serde(default = "default_stream_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_stream_port")]
    pub port: u16,

    #[serde(default = "default_stream_mode")]
    pub mode: StreamMode,

    /// JPEG quality for streamed frames (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl MotionCamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("motioncam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("source.kind", "synthetic")?
            .set_default(
                "source.resolution",
                vec![default_source_resolution().0, default_source_resolution().1],
            )?
            .set_default("source.device_index", default_device_index())?
            .set_default("source.fps", default_source_fps())?
            .set_default("source.request_timeout_ms", default_request_timeout_ms() as i64)?
            .set_default("source.retry_delay_ms", default_retry_delay_ms() as i64)?
            .set_default("source.startup_delay_ms", default_startup_delay_ms() as i64)?
            .set_default("detector.accum_weight", default_accum_weight())?
            .set_default("detector.warmup_frames", default_warmup_frames() as i64)?
            .set_default("detector.delta_threshold", default_delta_threshold() as i64)?
            .set_default("detector.frame_width", default_frame_width())?
            .set_default("detector.erode_iterations", default_morph_iterations())?
            .set_default("detector.dilate_iterations", default_morph_iterations())?
            .set_default("overlay.timestamp", default_timestamp_overlay())?
            .set_default("overlay.font_path", default_font_path())?
            .set_default("overlay.font_size", default_font_size() as f64)?
            .set_default("stream.ip", default_stream_ip())?
            .set_default("stream.port", default_stream_port())?
            .set_default("stream.mode", "background")?
            .set_default("stream.jpeg_quality", default_jpeg_quality() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // MOTIONCAM_DETECTOR__WARMUP_FRAMES=16 style overrides
            .add_source(
                Environment::with_prefix("MOTIONCAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: MotionCamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.detector.accum_weight > 0.0 && self.detector.accum_weight <= 1.0) {
            return Err(ConfigError::Message(format!(
                "Detector accum_weight must be in (0, 1], got {}",
                self.detector.accum_weight
            )));
        }

        if self.detector.frame_width == 0 {
            return Err(ConfigError::Message(
                "Detector frame_width must be greater than 0".to_string(),
            ));
        }

        if self.detector.erode_iterations == 0 && self.detector.dilate_iterations == 0 {
            return Err(ConfigError::Message(
                "At least one erode or dilate iteration is required to suppress noise".to_string(),
            ));
        }

        if self.stream.jpeg_quality == 0 || self.stream.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Stream jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.stream.port == 0 {
            return Err(ConfigError::Message(
                "Stream port must be greater than 0".to_string(),
            ));
        }

        match self.source.kind {
            SourceKind::Snapshot => {
                if self.source.url.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Message(
                        "Snapshot source requires source.url".to_string(),
                    ));
                }
            }
            SourceKind::Synthetic | SourceKind::Device => {
                if self.source.resolution.0 == 0 || self.source.resolution.1 == 0 {
                    return Err(ConfigError::Message(
                        "Source resolution must be greater than 0".to_string(),
                    ));
                }
                if self.source.fps == 0 {
                    return Err(ConfigError::Message(
                        "Source fps must be greater than 0".to_string(),
                    ));
                }
            }
        }

        if self.overlay.font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Overlay font_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            url: None,
            device_index: default_device_index(),
            resolution: default_source_resolution(),
            fps: default_source_fps(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            startup_delay_ms: default_startup_delay_ms(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            accum_weight: default_accum_weight(),
            warmup_frames: default_warmup_frames(),
            delta_threshold: default_delta_threshold(),
            frame_width: default_frame_width(),
            erode_iterations: default_morph_iterations(),
            dilate_iterations: default_morph_iterations(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            timestamp: default_timestamp_overlay(),
            font_path: default_font_path(),
            font_size: default_font_size(),
            timezone: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ip: default_stream_ip(),
            port: default_stream_port(),
            mode: default_stream_mode(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

// Default value functions
fn default_source_kind() -> SourceKind {
    SourceKind::Synthetic
}
fn default_device_index() -> u32 {
    0
}
fn default_source_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_source_fps() -> u32 {
    15
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_retry_delay_ms() -> u64 {
    100
}
fn default_startup_delay_ms() -> u64 {
    2000
}

fn default_accum_weight() -> f64 {
    0.1
}
fn default_warmup_frames() -> u64 {
    32
}
fn default_delta_threshold() -> u8 {
    25
}
fn default_frame_width() -> u32 {
    400
}
fn default_morph_iterations() -> u32 {
    2
}

fn default_timestamp_overlay() -> bool {
    true
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    12.0
}

fn default_stream_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_stream_port() -> u16 {
    8000
}
fn default_stream_mode() -> StreamMode {
    StreamMode::Background
}
fn default_jpeg_quality() -> u8 {
    80
}
