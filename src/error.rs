//! Error types for report export

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing and exporting a report.
///
/// Any error surfaced by the export pipeline is reported only after the
/// capture target's layout has been restored.
#[derive(Error, Debug)]
pub enum Error {
    /// The capture target is not attached to the surface
    #[error("Capture target not found: {0}")]
    MissingTarget(String),

    /// Failed to rasterize the capture target
    #[error("Capture failed: {0}")]
    Capture(String),

    /// The rasterized image could not be decoded for pagination
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// Another export is already running against the same target
    #[error("An export is already in progress for {0}")]
    ExportInProgress(String),

    /// The export was aborted by its caller
    #[error("Export aborted during {0}")]
    Aborted(&'static str),

    /// Failed to assemble the PDF document
    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    /// Failed to parse HTML or a selector
    #[error("HTML error: {0}")]
    Html(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The analysis service rejected the chat export
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    /// Network error talking to the analysis service
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

#[cfg(feature = "api")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}
