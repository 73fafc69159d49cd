// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for ModelFlow operations

use thiserror::Error;

/// Error types for ModelFlow operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Flow topology violation (cyclic flow, ambiguous tail, occupied port, ...)
    ///
    /// Raised from the graph algebra when an operator wires nodes in a way
    /// that breaks the flow invariants. This always indicates a programming
    /// error in operator authoring and callers are not expected to recover.
    #[error("Invalid flow topology: {0}")]
    Topology(String),

    /// DSL construct the target dialect cannot express
    #[error("Unsupported DSL construct: {0}")]
    Unsupported(String),

    /// Invalid argument or value
    #[error("Invalid value: {0}")]
    Invalid(String),

    /// Invalid asset level key or unknown asset reference
    #[error("Invalid level: {0}")]
    Level(String),

    /// Listing of an asset level with no entries
    ///
    /// Callers that tolerate emptiness (generation bootstrap) catch this
    /// variant explicitly and substitute the null tag.
    #[error("Empty level listing: {0}")]
    EmptyListing(String),

    /// Missing configuration or dependency
    #[error("Missing configuration: {0}")]
    Missing(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for ModelFlow operations
pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = Error::Topology("cyclic flow".to_string());
        assert_eq!(err.to_string(), "Invalid flow topology: cyclic flow");

        let err = Error::EmptyListing("generation".to_string());
        assert_eq!(err.to_string(), "Empty level listing: generation");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
