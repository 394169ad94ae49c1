use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ScrawlError {
    InvalidConfiguration(String),
    Background { path: PathBuf, message: String },
    Asset(String),
    Encode(String),
    EmptyBackgroundSet,
    BatchAlreadyRunning,
    WorkerPanicked,
    Io(std::io::Error),
}

impl ScrawlError {
    pub(crate) fn background(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        ScrawlError::Background {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ScrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrawlError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ScrawlError::Background { path, message } => {
                write!(f, "background {} unusable: {}", path.display(), message)
            }
            ScrawlError::Asset(message) => write!(f, "asset error: {}", message),
            ScrawlError::Encode(message) => write!(f, "encode error: {}", message),
            ScrawlError::EmptyBackgroundSet => write!(f, "no background images provided"),
            ScrawlError::BatchAlreadyRunning => write!(f, "a batch run is already in progress"),
            ScrawlError::WorkerPanicked => write!(f, "render worker panicked"),
            ScrawlError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ScrawlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScrawlError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScrawlError {
    fn from(value: std::io::Error) -> Self {
        ScrawlError::Io(value)
    }
}

impl From<serde_json::Error> for ScrawlError {
    fn from(value: serde_json::Error) -> Self {
        ScrawlError::InvalidConfiguration(value.to_string())
    }
}

impl From<image::ImageError> for ScrawlError {
    fn from(value: image::ImageError) -> Self {
        match value {
            image::ImageError::IoError(err) => ScrawlError::Io(err),
            other => ScrawlError::Encode(other.to_string()),
        }
    }
}
