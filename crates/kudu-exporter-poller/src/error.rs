//! Poller error types.

use std::time::Duration;

use thiserror::Error;

use kudu_exporter_metrics::{FilterFileError, SnapshotDecodeError};

/// A single upstream fetch attempt failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid upstream url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    #[error("upstream returned {0}")]
    Status(http::StatusCode),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Decode(#[from] SnapshotDecodeError),
}

/// Conditions that stop the exporter.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("upstream failed {failures} consecutive times, last error: {last}")]
    FetchBudgetExhausted {
        failures: u32,
        #[source]
        last: FetchError,
    },

    #[error(transparent)]
    FilterFile(#[from] FilterFileError),

    #[error("failed to register exporter metrics: {0}")]
    SelfMetrics(#[from] prometheus::Error),
}

pub type PollerResult<T> = Result<T, PollerError>;
