//! Error kinds for the tree engine, per the error handling design.
//!
//! Library code never panics on malformed input; recoverable conditions
//! (missing config, non-metadata files, duplicate keys) are logged and
//! skipped by the caller rather than propagated as errors here.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MetatreeError {
    #[error("{path}: not a recognized metadata file (no root tag within the first three lines)")]
    NotMetadata { path: PathBuf },

    #[error("{path}: diff log missing required column(s): {columns}")]
    MalformedDiffLog { path: PathBuf, columns: String },

    #[error("{path}: unknown merge action {action:?}")]
    UnknownMergeAction { path: PathBuf, action: String },

    #[error("{path}: I/O error during reconstruction: {source}")]
    Reconstruct {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: I/O error: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MetatreeError>;

/// Per-row error collected during a merge run, keyed by target file.
#[derive(Debug, Clone)]
pub struct RowError {
    pub row_index: usize,
    pub message: String,
}
