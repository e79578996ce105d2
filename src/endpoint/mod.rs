//! Endpoint catalog: names, paths and tag bindings.

pub mod catalog;
pub mod key;
pub mod registry;

pub use key::{cache_key, canonical_json};
pub use registry::{EndpointDef, EndpointKind, EndpointRegistry, TagSpec};
