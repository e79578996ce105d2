//! Single-request execution with bearer attachment and outcome classification.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::http::{bearer_headers, build_client, send_error, status_to_error};
use super::request::{ApiResponse, RequestBody, RequestDescriptor};
use crate::auth::store::TokenStore;
use crate::config::DeskConfig;
use crate::error::Result;
use crate::util::timeout::with_timeout;

/// Issues one HTTP request and classifies the outcome.
///
/// Holds no per-request state; retry decisions belong to the
/// [`RefreshCoordinator`](crate::auth::RefreshCoordinator).
pub struct RequestExecutor {
    client: reqwest::Client,
    config: DeskConfig,
    store: Arc<dyn TokenStore>,
}

impl RequestExecutor {
    pub fn new(config: DeskConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: build_client(config.request_timeout)?,
            config,
            store,
        })
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The access token a request sent right now would carry.
    pub fn current_access_token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get()?
            .map(|pair| pair.access_token)
            .filter(|token| !token.is_empty()))
    }

    /// Send with whatever access token the store currently holds.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse> {
        let token = self.current_access_token()?;
        self.execute_with(descriptor, token.as_deref()).await
    }

    /// Send with an explicit access token (or none).
    pub async fn execute_with(
        &self,
        descriptor: &RequestDescriptor,
        access_token: Option<&str>,
    ) -> Result<ApiResponse> {
        let timeout = self.config.request_timeout;
        with_timeout(timeout, self.send(descriptor, access_token, timeout)).await
    }

    async fn send(
        &self,
        descriptor: &RequestDescriptor,
        access_token: Option<&str>,
        timeout: Duration,
    ) -> Result<ApiResponse> {
        let url = self.config.url_for(&descriptor.path);
        let is_multipart = matches!(descriptor.body, RequestBody::Multipart(_));
        let mut request = self
            .client
            .request(descriptor.method.as_reqwest(), &url)
            .headers(bearer_headers(access_token, !is_multipart));
        if !descriptor.query.is_empty() {
            request = request.query(&descriptor.query);
        }
        request = match &descriptor.body {
            RequestBody::Empty => request,
            RequestBody::Json(body) => request.json(body),
            RequestBody::Multipart(form) => request.multipart(form.to_reqwest()?),
        };

        debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            authenticated = access_token.is_some_and(|t| !t.is_empty()),
            "dispatching request"
        );

        let resp = request.send().await.map_err(|e| send_error(e, timeout))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| send_error(e, timeout))?;

        if !(200..300).contains(&status) {
            debug!(method = %descriptor.method, path = %descriptor.path, status, "request failed");
            return Err(status_to_error(status, &body));
        }
        Ok(ApiResponse { status, body })
    }
}
