//! Unified error types for geocache.
//!
//! Each variant renders with a stable code prefix so hosts can map failures
//! to their own status codes without matching on message text.

use crate::geometry::GeometryError;

/// Unified error types for the geospatial cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No info record or document exists for the given key.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Invalid input parameters (e.g., a bad layer or an unusable option).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Geometry parameter could not be turned into a spatial filter.
    #[error("INVALID_GEOMETRY: {0}")]
    Geometry(#[from] GeometryError),

    /// The document store failed or could not be reached.
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),

    /// A store call exceeded its deadline.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// The store answered with a structure we do not understand.
    #[error("MALFORMED_RESPONSE: {0}")]
    MalformedResponse(String),

    /// JSON (de)serialization of a document failed.
    #[error("SERIALIZATION: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable error code, the prefix of the rendered message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Geometry(_) => "INVALID_GEOMETRY",
            Error::Upstream(_) => "UPSTREAM_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Error::Serialization(_) => "SERIALIZATION",
        }
    }

    /// Whether this error means the requested dataset or document is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("test_0".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("test_0"));
    }

    #[test]
    fn test_error_code_matches_prefix() {
        let errors = [
            Error::NotFound("a".into()),
            Error::InvalidInput("b".into()),
            Error::Geometry(GeometryError::Unparseable("c".into())),
            Error::Upstream("d".into()),
            Error::Timeout("e".into()),
            Error::MalformedResponse("f".into()),
        ];
        for err in errors {
            assert!(err.to_string().starts_with(err.code()), "{err}");
        }
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::Upstream("x".into()).is_not_found());
    }
}
