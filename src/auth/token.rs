use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The access/refresh credential pair held by a token store.
///
/// # Example
/// ```
/// use storedesk::auth::TokenPair;
///
/// let pair = TokenPair::new("access", Some("refresh".to_string()));
/// assert_eq!(pair.refresh_token.as_deref(), Some("refresh"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Pull a token pair out of an auth payload.
    ///
    /// Accepts the bare `{accessToken, refreshToken?}` shape as well as the
    /// `{message, data: {...}, statusCode}` envelope. Returns `None` when no
    /// non-empty access token is present.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let source = match payload.get("data") {
            Some(data) if data.is_object() => data,
            _ => payload,
        };
        let access_token = source
            .get("accessToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())?;
        let refresh_token = source
            .get("refreshToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        Some(Self::new(access_token, refresh_token))
    }

    /// Keep the previous refresh token when a rotation omits one.
    pub fn or_refresh_token(mut self, previous: Option<String>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous;
        }
        self
    }
}
