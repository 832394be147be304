use thiserror::Error;

use crate::manifest::MediaType;

/// Failure of the byte transport behind a manifest fetch.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

/// The manifest bytes arrived but could not be understood.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Manifest is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error(transparent)]
    MpdParseError(#[from] dash_mpd::DashMpdError),

    #[error("Invalid manifest: {0}")]
    Invalid(String),
}

/// Either half of a manifest fetch failed. Both are retried the same way.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Error, Debug)]
pub enum ClockError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    DateTimeParsing(#[from] chrono::ParseError),

    #[error("Missing Date header in timing response")]
    MissingDateHeader,

    #[error("Missing value for timing scheme {0}")]
    MissingValue(String),

    #[error("Unsupported timing scheme: {0}")]
    UnsupportedScheme(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtectionError {
    #[error("Unsupported protection scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Failed to create protection session: {0}")]
    SessionCreation(String),
}

/// Reasons a source build pass is aborted. Reported to the host, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Platform does not support protection scheme {0}")]
    PlatformUnsupported(String),

    #[error(transparent)]
    Protection(#[from] ProtectionError),

    #[error("No period found in manifest")]
    NoPeriodFound,

    #[error("No {0} adaptation set found in period")]
    NoTrackFound(MediaType),
}

/// A [`SessionConfig`](crate::config::SessionConfig) no session can run with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("manifest_retry_interval_ms must be greater than zero")]
    ZeroRetryInterval,

    #[error("buffer_segment_size must be greater than zero")]
    ZeroSegmentSize,

    #[error("Buffer budget overflows: {segments} segments of {segment_size} bytes")]
    BufferOverflow { segments: usize, segment_size: usize },
}

#[derive(Error, Debug)]
pub enum StreamlineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Rest(#[from] crate::rest::RestError),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

pub type StreamlineResult<T> = Result<T, StreamlineError>;
