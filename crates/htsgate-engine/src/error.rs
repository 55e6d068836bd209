//! Error taxonomy for the gateway core.
//!
//! Validation problems fail fast before anything is spawned and map to 4xx
//! at the controller. Trailer-protocol violations are programmer errors.
//! Everything that can go wrong after the first body byte is reported
//! through the truncation trailer instead of an error value.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Query validation failures, raised before any subprocess is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query has no input files")]
    NoFiles,
    #[error("cannot merge mixed BAM and CRAM inputs")]
    InconsistentFormat,
    #[error("VCF output requires a reference path")]
    MissingReference,
    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

impl From<htsgate_types::UnknownFormat> for QueryError {
    fn from(err: htsgate_types::UnknownFormat) -> Self {
        QueryError::UnknownFormat(err.0)
    }
}

/// Trailer-protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrailerError {
    #[error("trailers declared after the first body byte")]
    HeadersAlreadySent,
    #[error("trailer values set without a prior declaration")]
    TrailerNotDeclared,
}

/// Terminal failure of one pipeline stage.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("exited with status {code}")]
    Exit { code: i32 },
    #[error("terminated by signal {signal}")]
    Signal { signal: i32 },
    #[error("stream error: {0}")]
    Io(#[from] io::Error),
}

impl StageFailure {
    /// Classify a non-success exit status.
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => StageFailure::Exit { code },
            None => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    StageFailure::Signal {
                        signal: status.signal().unwrap_or(0),
                    }
                }
                #[cfg(not(unix))]
                StageFailure::Exit { code: -1 }
            }
        }
    }
}

/// Failures while driving one request, outside the byte stream.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("failed to create working directory under {base}: {source}")]
    Workdir { base: PathBuf, source: io::Error },
    #[error("failed to spawn {title}: {source}")]
    Spawn {
        title: &'static str,
        source: io::Error,
    },
    #[error(transparent)]
    Trailer(#[from] TrailerError),
}

/// Catalog resolution failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
