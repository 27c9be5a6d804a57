use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotionCamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl MotionCamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures inside the background model, segmenter and frame processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("Background model used for detection before it was seeded")]
    BackgroundUninitialized,

    #[error("Frame is {actual:?} but the background model is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid frame: {details}")]
    InvalidFrame { details: String },
}

impl AnalyzerError {
    /// Errors that mean the pipeline can no longer produce meaningful output
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AnalyzerError::InvalidFrame { .. })
    }
}

/// Failures while acquiring frames
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request to {url} failed: {details}")]
    Http { url: String, details: String },

    #[error("Failed to decode frame: {details}")]
    Decode { details: String },

    #[error("Capture device error: {details}")]
    Device { details: String },
}

/// Failures in the MJPEG publishing layer
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("Stream server startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Frame encoding failed: {details}")]
    Encode { details: String },
}

pub type Result<T> = std::result::Result<T, MotionCamError>;
