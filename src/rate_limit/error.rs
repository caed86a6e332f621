//! Rate Limit Configuration Error Types
//!
//! Admission itself never fails. These errors only describe configuration
//! values that could not be parsed; callers downgrade them to warnings and
//! keep the built-in default.

/// Error types for rate limit configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Value is not a valid non-negative integer
    #[error("{var}: expected a non-negative integer, got {value:?}")]
    InvalidInteger { var: String, value: String },

    /// Value is not a valid positive, finite number
    #[error("{var}: expected a positive number, got {value:?}")]
    InvalidMultiplier { var: String, value: String },

    /// Window or interval must be greater than zero
    #[error("{var}: must be greater than zero")]
    ZeroDuration { var: String },

    /// Override map is not valid JSON
    #[error("{var}: invalid tenant override map: {source}")]
    InvalidOverrides {
        var: String,
        #[source]
        source: serde_json::Error,
    },

    /// Boolean flag could not be parsed
    #[error("{var}: expected true or false, got {value:?}")]
    InvalidFlag { var: String, value: String },
}
