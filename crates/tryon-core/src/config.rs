//! Configuration for the try-on composer.
//!
//! Settings are read from a `tryon.json` file (camelCase keys). Every field
//! has a default, unknown keys are ignored, and a missing file yields the
//! default configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TryOnError};
use crate::image::MediaType;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "tryon.json";

/// Default backend base URL.
fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

/// Default prefix under which garment images are served.
fn default_static_path() -> String {
    "/static".to_string()
}

/// Default ceiling for a composition call in seconds.
///
/// Generative compositions are slow; a couple of minutes is normal.
const fn default_request_timeout() -> u64 {
    120
}

/// Default ceiling for a recommendation call in seconds.
const fn default_recommendation_timeout() -> u64 {
    60
}

/// Default event channel capacity.
const fn default_event_capacity() -> usize {
    100
}

/// Default media type of backend results.
const fn default_result_media_type() -> MediaType {
    MediaType::Png
}

/// Recommendations follow every composition unless turned off.
const fn default_auto_recommend() -> bool {
    true
}

/// Main configuration for the composer and its HTTP backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the try-on backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Path prefix for static garment images.
    #[serde(default = "default_static_path")]
    pub static_path: String,

    /// Timeout for each composition call in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for each recommendation or catalog call in seconds.
    #[serde(default = "default_recommendation_timeout")]
    pub recommendation_timeout_secs: u64,

    /// Capacity of the outfit event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Media type used to label composed results for display.
    #[serde(default = "default_result_media_type")]
    pub result_media_type: MediaType,

    /// Request recommendations after each successful composition.
    #[serde(default = "default_auto_recommend")]
    pub auto_recommend: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            static_path: default_static_path(),
            request_timeout_secs: default_request_timeout(),
            recommendation_timeout_secs: default_recommendation_timeout(),
            event_capacity: default_event_capacity(),
            result_media_type: default_result_media_type(),
            auto_recommend: default_auto_recommend(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `tryon.json` in the current directory, falling back to
    /// defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            TryOnError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `tryon.json` inside a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TryOnError::ConfigParseError` if the file exists but contains
    /// invalid JSON, and `TryOnError::ConfigValidationError` if the values
    /// are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TryOnError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TryOnError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `TryOnError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend_url.trim();
        if url.is_empty() {
            return Err(TryOnError::config_validation(
                "backendUrl must not be empty",
                "Set backendUrl to the try-on backend, e.g. http://localhost:8000",
            ));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TryOnError::config_validation(
                format!("backendUrl must be an http(s) URL, got '{url}'"),
                "Prefix backendUrl with http:// or https://",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(TryOnError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your tryon.json",
            ));
        }

        if self.recommendation_timeout_secs == 0 {
            return Err(TryOnError::config_validation(
                "recommendationTimeoutSecs must be greater than 0",
                "Set recommendationTimeoutSecs to at least 1 second in your tryon.json",
            ));
        }

        if self.event_capacity == 0 {
            return Err(TryOnError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 in your tryon.json",
            ));
        }

        Ok(())
    }

    /// Composition timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Recommendation timeout as a `Duration`.
    #[must_use]
    pub const fn recommendation_timeout(&self) -> Duration {
        Duration::from_secs(self.recommendation_timeout_secs)
    }
}
