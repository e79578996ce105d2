//! Error classification and recovery.

use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Server,
    Authentication,
    SessionEnded,
    Storage,
    Api,
    Business,
    Serialization,
    Configuration,
    Usage,
}

/// Suggested recovery action for the application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecoverySuggestion {
    /// Transient; offer a retry.
    RetryWithBackoff,
    /// The session is over; show the login screen.
    SignInAgain,
    /// Token persistence is broken; continue with an in-memory session or re-login.
    UseMemorySession,
    /// The backend answered with a message meant for the user.
    ShowMessage,
    CheckConfiguration,
    ContactSupport,
}
