use thiserror::Error;

use std::path::{Path, PathBuf};

#[derive(Debug, Error)]
pub enum AttackError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection failed: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("could not build request: {0}")]
    Request(#[from] hyper::http::Error),

    /// Socket-level failure talking to the oracle.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("could not read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid target url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The baseline could not be measured, so no threshold exists.
    #[error("calibration failed, oracle unreachable: {0}")]
    Calibration(Box<AttackError>),

    #[error("worker {worker} failed to warm up: {source}")]
    WarmUp {
        worker: usize,
        source: Box<AttackError>,
    },

    #[error("worker pool stopped before the batch completed")]
    WorkerLost,
}

impl AttackError {
    pub(crate) fn read_file(path: &Path, source: std::io::Error) -> Self {
        AttackError::ReadFile {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error means the oracle could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            AttackError::Http(e) => e.is_connect() || e.is_timeout(),
            AttackError::Hyper(_) | AttackError::Io(_) | AttackError::Timeout(_) => true,
            AttackError::Calibration(_) => true,
            AttackError::WarmUp { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }
}
