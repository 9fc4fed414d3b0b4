//! Error taxonomy for the prediction pipeline.
//!
//! Fatal conditions are `PipelineError` variants and abort a run. Per-source,
//! per-model and persistence errors are recoverable and only degrade the run.

use thiserror::Error;

/// Fatal errors surfaced to the top-level caller.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no data available for {symbol}: primary: {primary}; fallback: {fallback}")]
    DataUnavailable {
        symbol: String,
        primary: String,
        fallback: String,
    },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("required column '{0}' not found")]
    MissingColumn(String),

    #[error("every model failed to train ({0} attempted)")]
    NoModelTrained(usize),
}

/// Errors raised by a single data source.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("failed to parse response: {0}")]
    ParseError(String),

    #[error("source returned no rows for '{0}'")]
    Empty(String),

    #[error("no catalog id known for ticker '{0}'")]
    UnmappedSymbol(String),
}

/// Errors raised while fitting or querying an estimator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("model has not been fitted yet")]
    NotFitted,

    #[error("model '{0}' has not been trained")]
    NotTrained(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("cannot fit on an empty training set")]
    EmptyInput,

    #[error("matrix is singular and cannot be solved")]
    SingularMatrix,

    #[error("fitting produced non-finite parameters")]
    NonFinite,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("estimator backend failed: {0}")]
    Backend(String),
}

/// Errors raised while saving or restoring artifacts.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("table export error: {0}")]
    Table(#[from] polars::error::PolarsError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
