use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::events::SessionEndReason;
use super::token::TokenPair;
use crate::envelope::{check_business, Envelope};
use crate::error::{DeskError, Result};
use crate::transport::pipeline::Pipeline;
use crate::transport::request::RequestDescriptor;

pub const LOGIN_PATH: &str = "/auth/login";
pub const VERIFY_OTP_PATH: &str = "/auth/verify-otp";
pub const LOGOUT_ALL_PATH: &str = "/auth/logout-all";

/// Result of a login or OTP verification step.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Tokens were issued and stored.
    SignedIn { message: Option<String> },
    /// The backend wants a second factor; call
    /// [`SessionService::verify_otp`] next.
    OtpRequired {
        message: Option<String>,
        data: Option<Value>,
    },
}

/// Login, OTP verification and logout.
///
/// Tokens returned by the backend go straight to the token store; the only
/// other side effect is a [`SessionEvent`](super::events::SessionEvent) on the coordinator's channel.
#[derive(Clone)]
pub struct SessionService {
    pipeline: Arc<Pipeline>,
}

impl SessionService {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// `POST /auth/login` with the given credentials.
    pub async fn login(&self, credentials: Value) -> Result<LoginOutcome> {
        self.exchange(LOGIN_PATH, credentials).await
    }

    /// `POST /auth/verify-otp` with the code (and whatever the login step returned).
    pub async fn verify_otp(&self, payload: Value) -> Result<LoginOutcome> {
        self.exchange(VERIFY_OTP_PATH, payload).await
    }

    /// Currently stored tokens, if any.
    pub fn status(&self) -> Result<Option<TokenPair>> {
        Ok(self.pipeline.executor().store().get()?)
    }

    /// Forget credentials locally. In-flight refreshes resolve to
    /// `Unauthenticated`.
    pub fn logout(&self) -> Result<()> {
        self.pipeline
            .coordinator()
            .end_session(SessionEndReason::LoggedOut)
    }

    /// Revoke every session server-side, then log out locally.
    ///
    /// Local credentials are cleared even when the remote call fails; the
    /// remote error is still returned.
    pub async fn logout_all(&self) -> Result<()> {
        let descriptor = RequestDescriptor::post(LOGOUT_ALL_PATH);
        let remote = self
            .pipeline
            .send(&descriptor)
            .await
            .and_then(|response| response.json_value())
            .and_then(|body| check_business(&body));
        self.logout()?;
        remote
    }

    async fn exchange(&self, path: &str, payload: Value) -> Result<LoginOutcome> {
        let descriptor = RequestDescriptor::post(path).json(payload);
        let response = match self
            .pipeline
            .executor()
            .execute_with(&descriptor, None)
            .await
        {
            Ok(response) => response,
            // Wrong credentials are a user-facing rejection, not a session to refresh.
            Err(DeskError::AuthFailure(message)) => return Err(DeskError::api(401, message)),
            Err(e) => return Err(e),
        };
        let body = response.json_value()?;
        check_business(&body)?;

        let envelope = Envelope::from_value(&body);
        let message = envelope.as_ref().and_then(|e| e.message.clone());
        match TokenPair::from_payload(&body) {
            Some(pair) => {
                self.pipeline.coordinator().begin_session(&pair)?;
                debug!(path, "session established");
                Ok(LoginOutcome::SignedIn { message })
            }
            None => Ok(LoginOutcome::OtpRequired {
                message,
                data: envelope.and_then(|e| e.data),
            }),
        }
    }
}
