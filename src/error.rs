//! Error types for the analysis pipeline.

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Input table lacks a required column.
    #[error("{path}: missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("line {line}: unrecognised timestamp `{value}`")]
    Timestamp { line: u64, value: String },

    #[error("line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("render failed: {0}")]
    Render(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io { .. } => ExitCode::from(3),
            Self::Csv(_) | Self::MalformedRecord { .. } => ExitCode::from(4),
            Self::MissingColumn { .. } => ExitCode::from(5),
            Self::Timestamp { .. } => ExitCode::from(6),
            Self::Render(_) => ExitCode::from(7),
        }
    }
}
