//! Error types for storedesk.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::auth::error::StorageError;

/// Transport-level failure: the request never produced a usable answer.
///
/// Kept separate from [`DeskError::AuthFailure`] because a transport failure
/// is retried by the caller's backoff policy and never triggers a refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },
}

/// Primary error type for all storedesk operations.
#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportFailure),

    #[error("Unauthorized (401): {0}")]
    AuthFailure(String),

    #[error("Session ended: {0}")]
    Unauthenticated(String),

    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request rejected (status {status_code}): {message}")]
    Business { status_code: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl DeskError {
    /// Create an API error for a non-success status.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(TransportFailure::Network(_)) => ErrorCategory::Network,
            Self::Transport(TransportFailure::Timeout(_)) => ErrorCategory::Timeout,
            Self::Transport(TransportFailure::Server { .. }) => ErrorCategory::Server,
            Self::AuthFailure(_) => ErrorCategory::Authentication,
            Self::Unauthenticated(_) => ErrorCategory::SessionEnded,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Api { .. } => ErrorCategory::Api,
            Self::Business { .. } => ErrorCategory::Business,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::UnknownEndpoint(_) | Self::InvalidArgument(_) => ErrorCategory::Usage,
        }
    }

    /// Whether a caller-side retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Server
        )
    }

    /// True when the session is over and the user has to sign in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Authentication | ErrorCategory::SessionEnded => {
                RecoverySuggestion::SignInAgain
            }
            ErrorCategory::Storage => RecoverySuggestion::UseMemorySession,
            ErrorCategory::Api | ErrorCategory::Business => RecoverySuggestion::ShowMessage,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Serialization | ErrorCategory::Usage => {
                RecoverySuggestion::ContactSupport
            }
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, DeskError>;
