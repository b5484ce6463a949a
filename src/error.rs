//! Error types for the Intelligent Cache
//!
//! Provides structured error types for the cache engine, its tier stores
//! and the service binary.

use thiserror::Error;

/// Unified error type for the cache
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Tier Store Errors
    // =========================================================================
    #[error("Tier unavailable: {tier}")]
    TierUnavailable { tier: String },

    #[error("Tier operation timed out: {tier} - {operation} after {timeout_ms}ms")]
    TierTimeout {
        tier: String,
        operation: String,
        timeout_ms: u64,
    },

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    #[error("Value serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Check if this error is transient (the tier may recover on its own)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TierUnavailable { .. } | Error::TierTimeout { .. }
        )
    }
}

/// Result type alias for the cache
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = Error::TierTimeout {
            tier: "L2".into(),
            operation: "get".into(),
            timeout_ms: 250,
        };
        assert!(err.is_transient());
        assert!(Error::TierUnavailable { tier: "l2".into() }.is_transient());

        let config_err = Error::Configuration("l1_max_size must be > 0".into());
        assert!(!config_err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = Error::TierTimeout {
            tier: "L2".into(),
            operation: "setex".into(),
            timeout_ms: 500,
        };
        assert_eq!(
            err.to_string(),
            "Tier operation timed out: L2 - setex after 500ms"
        );
    }
}
