//! Outbound HTTP: request descriptors, the executor and the authenticated pipeline.

pub mod executor;
pub mod http;
pub mod pipeline;
pub mod request;

pub use executor::RequestExecutor;
pub use pipeline::Pipeline;
pub use request::{ApiResponse, Method, MultipartForm, MultipartPart, RequestBody, RequestDescriptor};
