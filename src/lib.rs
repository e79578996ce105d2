//! storedesk: data layer for the storefront admin console API.
//!
//! Every call goes through one authenticated pipeline: the current access
//! token is attached from a [`TokenStore`](auth::store::TokenStore), a 401
//! triggers a single shared refresh, and the request is retried once with
//! the new token. Reads are cached under tags; successful writes invalidate
//! the tags they declare and refetch the affected live queries.
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use storedesk::prelude::*;
//!
//! # async fn example() -> storedesk::error::Result<()> {
//! let client = ApiClient::new(DeskConfig::from_env()?)?;
//! client
//!     .session()
//!     .login(json!({"email": "ops@shop.test", "password": "secret"}))
//!     .await?;
//!
//! let mut pending = client.subscribe("orders.list", json!({"status": "pending"})).await?;
//! client
//!     .mutate("orders.updateStatus", json!({"id": "A", "status": "shipped"}))
//!     .await?;
//! println!("{:?}", pending.snapshot().data);
//! # let _ = pending.changed().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod prelude;
pub mod transport;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
