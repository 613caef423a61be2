//! Error types for the tiler services.

use thiserror::Error;

/// Result type alias using TilerError.
pub type TilerResult<T> = Result<T, TilerError>;

/// Primary error type for tile rendering and metadata operations.
#[derive(Debug, Error)]
pub enum TilerError {
    // === Source access ===
    #[error("Source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("Unsupported raster format: {0}")]
    UnsupportedFormat(String),

    // === Request geometry ===
    #[error("Tile {z}/{x}/{y} is outside the dataset bounds")]
    TileOutOfBounds { z: u32, x: u32, y: u32 },

    #[error("Point is outside the raster bounds")]
    PointOutOfBounds,

    // === Parameter validation ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Band index {index} out of range (dataset has {count} bands)")]
    BandIndexOutOfRange { index: usize, count: usize },

    #[error("Invalid band expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid color formula: {0}")]
    InvalidColorFormula(String),

    #[error("Invalid color map: {0}")]
    InvalidColorMap(String),

    #[error("Color map requires a single band input, got {0}")]
    ColorMapBandMismatch(usize),

    // === Encoding ===
    #[error("Format '{format}' does not support {bands}-band output")]
    UnsupportedBandCountForFormat { format: String, bands: usize },

    // === Infrastructure ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TilerError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TilerError::SourceUnreachable(_) => 502,

            TilerError::TileOutOfBounds { .. } => 404,

            TilerError::UnsupportedFormat(_)
            | TilerError::PointOutOfBounds
            | TilerError::MissingParameter(_)
            | TilerError::InvalidParameter { .. }
            | TilerError::BandIndexOutOfRange { .. }
            | TilerError::InvalidExpression(_)
            | TilerError::InvalidColorFormula(_)
            | TilerError::InvalidColorMap(_)
            | TilerError::ColorMapBandMismatch(_) => 400,

            TilerError::UnsupportedBandCountForFormat { .. } | TilerError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for TilerError {
    fn from(err: std::io::Error) -> Self {
        TilerError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for TilerError {
    fn from(err: serde_json::Error) -> Self {
        TilerError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            TilerError::SourceUnreachable("x".into()).http_status_code(),
            502
        );
        assert_eq!(
            TilerError::TileOutOfBounds { z: 1, x: 0, y: 0 }.http_status_code(),
            404
        );
        assert_eq!(
            TilerError::InvalidExpression("b9".into()).http_status_code(),
            400
        );
        assert_eq!(
            TilerError::UnsupportedBandCountForFormat {
                format: "jpg".into(),
                bands: 2
            }
            .http_status_code(),
            500
        );
    }
}
