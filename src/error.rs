//! Error type shared by the loaders, the estimator and the writers.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Failed to open, read or write a file.
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed data file.
    #[error("failed to parse {}: {msg}", .path.display())]
    Parse { path: PathBuf, msg: String },

    /// Dimensions that do not line up.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Class label outside of [0, n_classes).
    #[error("invalid class label {value} in row {row}")]
    Label { row: usize, value: f64 },

    /// Inconsistent model file.
    #[error("invalid model: {0}")]
    Model(String),

    /// The eigensolver did not converge.
    #[error("eigendecomposition failed: {0}")]
    Eigen(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
