//! Convenience re-exports for common use.

pub use crate::auth::events::{SessionEndReason, SessionEvent};
pub use crate::auth::session::LoginOutcome;
pub use crate::auth::store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use crate::auth::token::TokenPair;
pub use crate::cache::{CacheKey, QuerySnapshot, Subscription, Tag};
pub use crate::client::ApiClient;
pub use crate::config::DeskConfig;
pub use crate::endpoint::{EndpointDef, EndpointRegistry, TagSpec};
pub use crate::error::{DeskError, Result};
pub use crate::transport::request::{Method, MultipartForm};
