use thiserror::Error;

/// Coarse error classes, used by callers that map errors onto a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller; nothing was changed.
    Validation,
    /// A single frame could not be processed; the pipeline keeps going.
    TransientFrame,
    /// The operation is not possible in the current controller state.
    ResourceState,
    /// I/O, parsing and other plumbing failures.
    Internal,
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("Unsupported export format '{0}'. Accepted formats: csv, txt")]
    UnsupportedExportFormat(String),

    #[error("Invalid ROI ({x}, {y}, {width}x{height}): {reason}")]
    InvalidRoi {
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        reason: String,
    },

    #[error("Unknown metric '{0}'. Use 'width', 'height', 'diameter' or 'area'")]
    UnknownMetric(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Degenerate contour moments (zero area)")]
    Moments,

    #[error("ROI is not configured on the camera; set a region of interest before starting detection")]
    RoiNotConfigured,

    #[error("Detection is already running; stop it before starting again")]
    AlreadyRunning,

    #[error("Detection is not running")]
    NotRunning,

    #[error("No measurements recorded yet; nothing to export")]
    NoExportData,

    #[error("Operation not supported by {0}")]
    Unsupported(String),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Failed to spawn processing thread: {0}")]
    ThreadSpawn(String),
}

impl DetectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_)
            | Self::UnsupportedExportFormat(_)
            | Self::InvalidRoi { .. }
            | Self::UnknownMetric(_)
            | Self::InvalidCommand(_) => ErrorKind::Validation,
            Self::InvalidFrame(_) | Self::Moments => ErrorKind::TransientFrame,
            Self::RoiNotConfigured
            | Self::AlreadyRunning
            | Self::NotRunning
            | Self::NoExportData
            | Self::Unsupported(_) => ErrorKind::ResourceState,
            Self::Io(_)
            | Self::Json(_)
            | Self::TomlDe(_)
            | Self::TomlSer(_)
            | Self::Image(_)
            | Self::InvalidSer(_)
            | Self::FrameIndexOutOfRange { .. }
            | Self::ThreadSpawn(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status a web layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoExportData => 404,
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::ResourceState => 409,
                ErrorKind::TransientFrame | ErrorKind::Internal => 500,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_errors_are_distinct() {
        let roi = DetectorError::RoiNotConfigured.to_string();
        let running = DetectorError::AlreadyRunning.to_string();
        assert_ne!(roi, running);
        assert!(roi.contains("ROI"));
        assert!(running.contains("already running"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(DetectorError::NoExportData.http_status(), 404);
        assert_eq!(
            DetectorError::UnsupportedExportFormat("xml".into()).http_status(),
            400
        );
        assert_eq!(DetectorError::AlreadyRunning.http_status(), 409);
        assert_eq!(DetectorError::Moments.kind(), ErrorKind::TransientFrame);
    }

    #[test]
    fn test_invalid_config_lists_every_error() {
        let err = DetectorError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }
}
