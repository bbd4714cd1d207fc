use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while loading, shaping, and plotting CPU usage data.
#[derive(Error, Debug)]
pub enum CpuPlotError {
    /// The input file could not be read from disk.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input bytes are not well-formed JSON.
    #[error("invalid JSON format: {0}")]
    MalformedInput(#[source] serde_json::Error),

    /// The top-level JSON value is none of the accepted shapes.
    #[error(
        "JSON must be a list of timestamped CPU usage records, \
         a single record, or an object with a \"data\" list; found {found}"
    )]
    InvalidSchema { found: String },

    /// A record is missing a required field or has fields of the wrong type.
    #[error("invalid record format at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid cpu core id: {0}")]
    InvalidCoreId(String),

    /// Two rows share the same (timestamp, core) cell.
    #[error("duplicate entry for cpu {cpu} at {timestamp}, cannot pivot")]
    AmbiguousPivot { timestamp: DateTime<Utc>, cpu: i64 },

    /// The plotting backend failed to draw or encode a chart.
    #[error("failed to render {path}: {message}")]
    Render { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, CpuPlotError>;
