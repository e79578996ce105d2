//! Tag-based query cache.

pub mod graph;
pub mod subscription;
pub mod tag;

use std::fmt;

use serde_json::Value;

pub use graph::{CacheTagGraph, Completion, FetchClaim, FetchTicket, QuerySnapshot};
pub use subscription::Subscription;
pub use tag::{Tag, TagId};

use crate::error::Result;

/// Identity of a cached query: endpoint name plus canonical JSON arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub endpoint: String,
    pub args: String,
}

impl CacheKey {
    pub fn new(endpoint: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            args: args.into(),
        }
    }

    /// The arguments this key was built from.
    pub fn args_value(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.args)?)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint, self.args)
    }
}
