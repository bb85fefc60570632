use thiserror::Error;

/// Failure modes of the chart pipeline.
///
/// Everything here surfaces to the request boundary as one generic failure;
/// the variant and message are for operator logs.
#[derive(Debug, Error)]
pub enum ChartError {
    /// Malformed coordinate or request text
    #[error("invalid input: {0}")]
    InputFormat(String),

    /// Survey image retrieval failed
    #[error("survey image retrieval failed: {0}")]
    Fetch(String),

    /// Missing or malformed FITS header content
    #[error("FITS header error: {0}")]
    HeaderParse(String),

    /// The plate solution is absent or cannot map the requested position
    #[error("astrometry error: {0}")]
    Astrometry(String),

    /// Anything else that goes wrong while building the chart
    #[error("chart processing failed: {0}")]
    Processing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ChartError {
    fn from(err: reqwest::Error) -> Self {
        ChartError::Fetch(err.to_string())
    }
}

impl From<image::ImageError> for ChartError {
    fn from(err: image::ImageError) -> Self {
        ChartError::Processing(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChartError>;
