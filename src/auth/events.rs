use strum::Display;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionEndReason {
    /// Explicit logout from this client.
    LoggedOut,
    /// `/auth/refresh` answered with a non-success status.
    RefreshRejected,
    /// A 401 arrived and no refresh token was stored.
    MissingRefreshToken,
}

/// Session changes published by the pipeline instead of touching UI state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { has_refresh_token: bool },
    TokensRefreshed,
    SessionEnded { reason: SessionEndReason },
}
