//! Token storage, session flows and single-flight refresh.

pub mod error;
pub mod events;
pub mod refresh;
pub mod session;
pub mod store;
pub mod token;

pub use error::StorageError;
pub use events::{SessionEndReason, SessionEvent};
pub use refresh::{RefreshCoordinator, RefreshFailure};
pub use session::{LoginOutcome, SessionService};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreConfig};
pub use token::TokenPair;
