//! Error types for the try-on composer.
//!
//! Two layers live here: [`BackendError`] describes what went wrong on a
//! single HTTP round trip, and [`TryOnError`] is what the session and the
//! composer surface to callers. Every backend failure is folded into one of
//! the two uniform outcomes, `CompositionFailed` or `RecommendationFailed`.

use std::path::PathBuf;
use std::time::Duration;

/// A specialized `Result` type for try-on operations.
pub type Result<T> = std::result::Result<T, TryOnError>;

/// Errors that can occur while composing an outfit.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible. None of the runtime variants are fatal: each one is
/// recovered by retrying the user action that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your tryon.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// A required input is absent (no photo, no garment selected, no result yet).
    ///
    /// The UI normally prevents this by disabling the triggering control.
    #[error("Missing precondition: {what}\n\nSuggestion: {suggestion}")]
    MissingPrecondition {
        /// What is missing.
        what: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// A garment of this category is already part of the outfit.
    #[error("Category '{category}' is already worn\n\nSuggestion: Reset the outfit to choose a different {category} item")]
    DuplicateCategory {
        /// The category that is already worn.
        category: String,
    },

    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// A composition call is already outstanding for this session.
    #[error("A composition is already in progress\n\nSuggestion: Wait for the current try-on to finish")]
    CompositionInFlight,

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// A composition call failed; the outfit is unchanged.
    #[error("Composition failed: {message}\n\nSuggestion: Retry the try-on")]
    CompositionFailed {
        /// Human-readable failure description.
        message: String,
    },

    /// A recommendation call failed; composition state is unaffected.
    #[error("Recommendation request failed: {message}")]
    RecommendationFailed {
        /// Human-readable failure description.
        message: String,
    },

    /// The catalog could not be listed.
    #[error("Catalog unavailable: {message}\n\nSuggestion: Check that the backend is running at the configured backendUrl")]
    CatalogUnavailable {
        /// Human-readable failure description.
        message: String,
    },

    // ========================================================================
    // Image Errors
    // ========================================================================
    /// Image file was not found at the specified path.
    #[error("Image not found: '{path}'\n\nSuggestion: Check the photo path")]
    ImageNotFound {
        /// Path where the image was expected.
        path: PathBuf,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TryOnError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingPrecondition` error.
    #[must_use]
    pub fn missing(what: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::MissingPrecondition {
            what: what.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `DuplicateCategory` error.
    #[must_use]
    pub fn duplicate_category(category: impl Into<String>) -> Self {
        Self::DuplicateCategory {
            category: category.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `CompositionFailed` error.
    #[must_use]
    pub fn composition_failed(message: impl Into<String>) -> Self {
        Self::CompositionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `RecommendationFailed` error.
    #[must_use]
    pub fn recommendation_failed(message: impl Into<String>) -> Self {
        Self::RecommendationFailed {
            message: message.into(),
        }
    }

    /// Creates a new `CatalogUnavailable` error.
    #[must_use]
    pub fn catalog_unavailable(message: impl Into<String>) -> Self {
        Self::CatalogUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `ImageNotFound` error.
    #[must_use]
    pub fn image_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ImageNotFound { path: path.into() }
    }

    /// Returns `true` if retrying the triggering action may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Returns `true` if this error prevents the composer from starting.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. }
        )
    }
}

/// Failure of a single round trip to the try-on backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response (connect, DNS, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The call did not finish within the configured ceiling.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The response carried an image that could not be decoded.
    #[error("invalid image payload: {0}")]
    InvalidImage(String),
}

impl BackendError {
    /// Returns `true` if the failure was a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}
