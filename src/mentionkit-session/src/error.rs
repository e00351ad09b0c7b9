//! Error types for mention sessions and their collaborators.

use std::path::PathBuf;

use thiserror::Error;

use crate::editor::SurfaceId;

/// Result type alias for mention operations.
pub type MentionResult<T> = std::result::Result<T, MentionError>;

/// Errors surfaced by sessions and the controller.
#[derive(Error, Debug)]
pub enum MentionError {
    /// The host document store (or a child source) failed.
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    /// The provider backing a category is not installed or not ready.
    ///
    /// This is a setup problem, not an empty search, and is reported as such.
    #[error("Data source for category '{category}' is not available")]
    SourceUnavailable { category: String },

    /// A keydown or open request named a surface that was never registered.
    #[error("Unknown editor surface: {0}")]
    UnknownSurface(SurfaceId),

    /// The session has already exited.
    #[error("Mention session is closed")]
    SessionClosed,

    /// Invalid settings value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for [`MentionSettings`](crate::MentionSettings).
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl MentionError {
    /// Creates a `SourceUnavailable` error.
    pub fn source_unavailable(category: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            category: category.into(),
        }
    }

    /// Creates a `Config` error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Errors reported by host store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// A query against a collection failed.
    #[error("Query against '{collection}' failed: {message}")]
    Query { collection: String, message: String },

    /// Entity creation failed (as opposed to being cancelled).
    #[error("Failed to create entity in '{collection}': {message}")]
    Create { collection: String, message: String },

    /// Generic error wrapper.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Creates a `Query` error.
    pub fn query(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates a `Create` error.
    pub fn create(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Create {
            collection: collection.into(),
            message: message.into(),
        }
    }
}
