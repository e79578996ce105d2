//! Single-flight token refresh.
//!
//! Every 401 observed while a refresh is running joins the same shared
//! future, so N concurrent auth failures cost exactly one `/auth/refresh`
//! call. Each original request is then retried once with the new access
//! token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::error::StorageError;
use super::events::{SessionEndReason, SessionEvent};
use super::store::TokenStore;
use super::token::TokenPair;
use crate::error::{DeskError, Result, TransportFailure};
use crate::transport::executor::RequestExecutor;
use crate::transport::request::{ApiResponse, RequestDescriptor};

const EVENT_CAPACITY: usize = 32;

/// Outcome of a failed refresh episode, shared by every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("refresh rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("refresh did not complete: {0}")]
    Transport(TransportFailure),
    #[error("session ended while the refresh was in flight")]
    Cancelled,
    #[error("could not persist refreshed tokens: {0}")]
    Storage(StorageError),
}

impl From<RefreshFailure> for DeskError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Transport(transport) => DeskError::Transport(transport),
            RefreshFailure::Storage(storage) => DeskError::Storage(storage),
            other => DeskError::Unauthenticated(other.to_string()),
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, std::result::Result<TokenPair, RefreshFailure>>>;

struct InFlight {
    episode: u64,
    future: RefreshFuture,
}

enum Join {
    /// Another episode already rotated the token this request failed with.
    Rotated(TokenPair),
    Wait(RefreshFuture),
}

struct Inner {
    executor: Arc<RequestExecutor>,
    refresh_path: String,
    in_flight: Mutex<Option<InFlight>>,
    next_episode: AtomicU64,
    session_epoch: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

/// Recovers from auth failures by refreshing the session at most once at a time.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        let refresh_path = executor.config().refresh_path.clone();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                executor,
                refresh_path,
                in_flight: Mutex::new(None),
                next_episode: AtomicU64::new(1),
                session_epoch: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.inner.executor
    }

    /// Subscribe to session events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a refresh exchange is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.slot().is_some()
    }

    /// Recover `descriptor` after it failed with 401 while carrying `failed_token`.
    ///
    /// The retry budget is one: a second 401 ends as
    /// [`DeskError::Unauthenticated`] without another refresh.
    pub async fn handle_auth_failure(
        &self,
        descriptor: &RequestDescriptor,
        failed_token: Option<&str>,
    ) -> Result<ApiResponse> {
        let epoch = self.inner.session_epoch.load(Ordering::SeqCst);
        let pair = match self.join_or_start(failed_token)? {
            Join::Rotated(pair) => pair,
            Join::Wait(future) => future.await?,
        };
        if self.inner.session_epoch.load(Ordering::SeqCst) != epoch {
            return Err(RefreshFailure::Cancelled.into());
        }

        match self
            .inner
            .executor
            .execute_with(descriptor, Some(&pair.access_token))
            .await
        {
            Err(DeskError::AuthFailure(message)) => {
                warn!(
                    method = %descriptor.method,
                    path = %descriptor.path,
                    "request rejected again after token refresh"
                );
                Err(DeskError::Unauthenticated(format!(
                    "rejected after token refresh: {message}"
                )))
            }
            other => other,
        }
    }

    /// End the session locally: waiters of an in-flight refresh resolve to
    /// `Unauthenticated` and the refreshed pair is discarded.
    pub fn end_session(&self, reason: SessionEndReason) -> Result<()> {
        self.inner.new_epoch();
        self.inner.executor.store().clear()?;
        self.inner.emit(SessionEvent::SessionEnded { reason });
        Ok(())
    }

    /// Install the pair issued by a fresh login. A refresh still running for
    /// the previous session settles as cancelled instead of overwriting it.
    pub fn begin_session(&self, pair: &TokenPair) -> Result<()> {
        self.inner.new_epoch();
        self.inner.executor.store().set(pair)?;
        self.inner.emit(SessionEvent::SignedIn {
            has_refresh_token: pair.refresh_token.is_some(),
        });
        Ok(())
    }

    fn join_or_start(&self, failed_token: Option<&str>) -> Result<Join> {
        let mut slot = self.inner.slot();
        if let Some(in_flight) = slot.as_ref() {
            debug!(episode = in_flight.episode, "joining in-flight refresh");
            return Ok(Join::Wait(in_flight.future.clone()));
        }

        let current = self.inner.executor.store().get()?;
        if let Some(pair) = &current {
            let stored = Some(pair.access_token.as_str()).filter(|t| !t.is_empty());
            if stored.is_some() && stored != failed_token {
                return Ok(Join::Rotated(pair.clone()));
            }
        }

        let Some(current) = current else {
            // Already ended, e.g. by a rejected refresh this request raced.
            return Err(DeskError::Unauthenticated("no session".to_string()));
        };
        let Some(refresh_token) = current.refresh_token else {
            drop(slot);
            warn!("auth failure without a refresh token; ending session");
            self.end_session(SessionEndReason::MissingRefreshToken)?;
            return Err(DeskError::Unauthenticated(
                "no refresh token available".to_string(),
            ));
        };

        let episode = self.inner.next_episode.fetch_add(1, Ordering::SeqCst);
        let future = self.spawn_exchange(episode, refresh_token);
        *slot = Some(InFlight {
            episode,
            future: future.clone(),
        });
        debug!(episode, "started token refresh");
        Ok(Join::Wait(future))
    }

    fn spawn_exchange(&self, episode: u64, refresh_token: String) -> RefreshFuture {
        let inner = Arc::clone(&self.inner);
        let epoch = inner.session_epoch.load(Ordering::SeqCst);
        // Spawned so the episode settles even if every waiter is dropped.
        let handle = tokio::spawn(async move {
            let outcome = inner.exchange(&refresh_token).await;
            let outcome = inner.settle(epoch, outcome);
            inner.release(episode);
            outcome
        });
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(RefreshFailure::Transport(TransportFailure::Network(format!(
                    "refresh task failed: {e}"
                ))))
            })
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new session epoch and detach any in-flight episode so later
    /// failures start their own refresh.
    fn new_epoch(&self) {
        self.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.slot().take();
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn exchange(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<TokenPair, RefreshFailure> {
        let descriptor = RequestDescriptor::post(&self.refresh_path)
            .json(json!({ "refreshToken": refresh_token }));
        match self.executor.execute_with(&descriptor, None).await {
            Ok(response) => {
                let payload = response.json_value().map_err(|e| RefreshFailure::Rejected {
                    status: response.status,
                    message: format!("unreadable refresh response: {e}"),
                })?;
                TokenPair::from_payload(&payload)
                    .map(|pair| pair.or_refresh_token(Some(refresh_token.to_string())))
                    .ok_or_else(|| RefreshFailure::Rejected {
                        status: response.status,
                        message: "refresh response carried no access token".to_string(),
                    })
            }
            Err(DeskError::Transport(transport)) => Err(RefreshFailure::Transport(transport)),
            Err(DeskError::AuthFailure(message)) => Err(RefreshFailure::Rejected {
                status: 401,
                message,
            }),
            Err(DeskError::Api { status, message }) => {
                Err(RefreshFailure::Rejected { status, message })
            }
            Err(DeskError::Storage(storage)) => Err(RefreshFailure::Storage(storage)),
            Err(other) => Err(RefreshFailure::Rejected {
                status: 0,
                message: other.to_string(),
            }),
        }
    }

    fn settle(
        &self,
        epoch: u64,
        outcome: std::result::Result<TokenPair, RefreshFailure>,
    ) -> std::result::Result<TokenPair, RefreshFailure> {
        if self.session_epoch.load(Ordering::SeqCst) != epoch {
            debug!("discarding refresh result for an ended session");
            return Err(RefreshFailure::Cancelled);
        }
        match outcome {
            Ok(pair) => {
                self.executor
                    .store()
                    .set(&pair)
                    .map_err(RefreshFailure::Storage)?;
                self.emit(SessionEvent::TokensRefreshed);
                Ok(pair)
            }
            Err(RefreshFailure::Rejected { status, message }) => {
                warn!(status, %message, "token refresh rejected; clearing credentials");
                self.session_epoch.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = self.executor.store().clear() {
                    return Err(RefreshFailure::Storage(e));
                }
                self.emit(SessionEvent::SessionEnded {
                    reason: SessionEndReason::RefreshRejected,
                });
                Err(RefreshFailure::Rejected { status, message })
            }
            Err(other) => {
                warn!(error = %other, "token refresh did not complete");
                Err(other)
            }
        }
    }

    fn release(&self, episode: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|f| f.episode == episode) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_map_to_the_error_taxonomy() {
        let rejected: DeskError = RefreshFailure::Rejected {
            status: 403,
            message: "revoked".into(),
        }
        .into();
        assert!(rejected.is_session_ended());

        let cancelled: DeskError = RefreshFailure::Cancelled.into();
        assert!(cancelled.is_session_ended());

        let timeout: DeskError = RefreshFailure::Transport(TransportFailure::Timeout(30)).into();
        assert!(timeout.is_retryable());

        let storage: DeskError =
            RefreshFailure::Storage(StorageError::Io("disk full".into())).into();
        assert!(matches!(storage, DeskError::Storage(_)));
    }
}
