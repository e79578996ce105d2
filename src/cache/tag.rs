use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier half of a [`Tag`]: either the whole collection or one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagId {
    #[serde(rename = "LIST")]
    List,
    #[serde(untagged)]
    Id(String),
}

/// Opaque invalidation key binding cached reads to the writes that stale them.
///
/// # Example
/// ```
/// use storedesk::cache::Tag;
///
/// assert_eq!(Tag::list("Order").to_string(), "Order:LIST");
/// assert_eq!(Tag::id("Order", "42").to_string(), "Order:42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: TagId,
}

impl Tag {
    pub fn list(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: TagId::List,
        }
    }

    pub fn id(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: TagId::Id(id.into()),
        }
    }

    pub fn is_list(&self) -> bool {
        self.id == TagId::List
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            TagId::List => write!(f, "{}:LIST", self.kind),
            TagId::Id(id) => write!(f, "{}:{}", self.kind, id),
        }
    }
}
