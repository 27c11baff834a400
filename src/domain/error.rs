//! Crate error type.
//!
//! Data-quality degradations are not errors; see [`super::quality`].

/// Top-level error type for foliotrack.
#[derive(Debug, thiserror::Error)]
pub enum FoliotrackError {
    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("portfolio {portfolio_id} not found")]
    NotFound { portfolio_id: String },

    #[error("price source timed out after {seconds}s")]
    UpstreamTimeout { seconds: u64 },

    #[error("price source error: {reason}")]
    Upstream { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FoliotrackError {
    pub fn validation(reason: impl Into<String>) -> Self {
        FoliotrackError::Validation {
            reason: reason.into(),
        }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FoliotrackError::UpstreamTimeout { .. } | FoliotrackError::Upstream { .. }
        )
    }

    /// Client-side failures: the request itself was bad.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FoliotrackError::Validation { .. } | FoliotrackError::NotFound { .. }
        )
    }
}

impl From<&FoliotrackError> for std::process::ExitCode {
    fn from(err: &FoliotrackError) -> Self {
        let code: u8 = match err {
            FoliotrackError::Io(_) => 1,
            FoliotrackError::ConfigParse { .. }
            | FoliotrackError::ConfigMissing { .. }
            | FoliotrackError::ConfigInvalid { .. } => 2,
            FoliotrackError::Database { .. } | FoliotrackError::DatabaseQuery { .. } => 3,
            FoliotrackError::Validation { .. } => 4,
            FoliotrackError::NotFound { .. } => 5,
            FoliotrackError::UpstreamTimeout { .. } | FoliotrackError::Upstream { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        let err = FoliotrackError::UpstreamTimeout { seconds: 10 };
        assert!(err.is_retryable());
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "price source timed out after 10s");
    }

    #[test]
    fn validation_is_client_error_and_final() {
        let err = FoliotrackError::validation("unknown window label 2D");
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "validation error: unknown window label 2D");
    }

    #[test]
    fn not_found_is_client_error() {
        let err = FoliotrackError::NotFound {
            portfolio_id: "p-1".into(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn database_errors_are_neither() {
        let err = FoliotrackError::Database {
            reason: "locked".into(),
        };
        assert!(!err.is_client_error());
        assert!(!err.is_retryable());
    }
}
