use std::sync::Arc;

use super::executor::RequestExecutor;
use super::request::{ApiResponse, RequestDescriptor};
use crate::auth::refresh::RefreshCoordinator;
use crate::error::{DeskError, Result};

/// The authenticated request path: execute, and on 401 hand over to the
/// shared refresh coordinator.
#[derive(Clone)]
pub struct Pipeline {
    executor: Arc<RequestExecutor>,
    coordinator: RefreshCoordinator,
}

impl Pipeline {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        let coordinator = RefreshCoordinator::new(Arc::clone(&executor));
        Self {
            executor,
            coordinator,
        }
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse> {
        let token = self.executor.current_access_token()?;
        match self.executor.execute_with(descriptor, token.as_deref()).await {
            Err(DeskError::AuthFailure(_)) => {
                self.coordinator
                    .handle_auth_failure(descriptor, token.as_deref())
                    .await
            }
            other => other,
        }
    }
}
