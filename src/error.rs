//! Library error types
//!
//! Configuration problems are reported when the MSU type catalog is loaded,
//! never later during matching or conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating MSU type configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid track number '{entry}' in list \"{list}\"")]
    InvalidTrackNumber { list: String, entry: String },

    #[error("type '{msu_type}': {field} has {remapped} remapped entries for {original} originals")]
    RemapLengthMismatch {
        msu_type: String,
        field: String,
        original: usize,
        remapped: usize,
    },

    #[error("type '{msu_type}': {field} range is inverted ({min} > {max})")]
    InvertedRange {
        msu_type: String,
        field: String,
        min: i64,
        max: i64,
    },

    #[error("type '{msu_type}': conversion targets unknown type '{target}'")]
    UnknownConversionTarget { msu_type: String, target: String },

    #[error("duplicate MSU type name '{0}'")]
    DuplicateType(String),

    #[error("MSU type name cannot be empty")]
    EmptyTypeName,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors raised by the notification channel itself
///
/// Delivery failures are not errors; they are logged and dropped.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("receiver already initialized")]
    AlreadyInitialized,

    #[error("failed to bind receiver listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to publish discovery record {}: {source}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
