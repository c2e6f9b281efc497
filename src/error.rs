//! Error types for the archive pipeline.
//!
//! Each layer has its own enum: the document store reports raw read/write
//! failures, the archive and report layers wrap them with the collection
//! and operation that failed so an operator-visible warning can name it.

use std::time::Duration;

/// Failure inside a [`crate::store::DocumentStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid record body: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record for {collection} must be a JSON object")]
    NotAnObject { collection: String },

    #[error("invalid field name: {0}")]
    InvalidField(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    /// The backend refused or dropped the request (network stores, fault
    /// injection in tests).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of an archive operation.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to read {collection}: {source}")]
    StoreRead {
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("failed to write {collection}: {source}")]
    StoreWrite {
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("undecodable {collection} record {id}: {source}")]
    InvalidRecord {
        collection: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record in {0} has no id")]
    MissingId(&'static str),

    #[error("order migration timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid archive date: {0}")]
    InvalidDate(String),
}

impl ArchiveError {
    pub(crate) fn read(collection: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::StoreRead { collection, source }
    }

    pub(crate) fn write(collection: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::StoreWrite { collection, source }
    }
}

/// Failure while building a settlement report or accounting export.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read {collection}: {source}")]
    StoreRead {
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("invalid report date: {0}")]
    InvalidDate(String),

    #[error("invalid report range: {start} is after {end}")]
    InvalidRange { start: String, end: String },

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl ReportError {
    pub(crate) fn read(collection: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::StoreRead { collection, source }
    }
}

/// Invalid configuration value in `local_settings` or the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}
