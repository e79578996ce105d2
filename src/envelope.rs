//! The backend's `{message, data, statusCode}` response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DeskError, Result};

/// Standard response wrapper returned by the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

impl Envelope {
    /// Read an envelope out of a JSON body; non-envelope bodies yield `None`.
    pub fn from_value(body: &Value) -> Option<Self> {
        let object = body.as_object()?;
        if !object.contains_key("statusCode") && !object.contains_key("data") {
            return None;
        }
        serde_json::from_value(body.clone()).ok()
    }

    pub fn is_success(&self) -> bool {
        self.status_code.map_or(true, |code| (200..300).contains(&code))
    }
}

/// Reject business errors carried inside a 2xx response.
pub fn check_business(body: &Value) -> Result<()> {
    match Envelope::from_value(body) {
        Some(envelope) if !envelope.is_success() => Err(DeskError::Business {
            status_code: envelope.status_code.unwrap_or_default(),
            message: envelope
                .message
                .unwrap_or_else(|| "request rejected".to_string()),
        }),
        _ => Ok(()),
    }
}
