//! High-level client for the admin API.
//!
//! Reads go through the tag cache, writes go through the authenticated
//! pipeline and invalidate the tags they declare once they succeed.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::events::SessionEvent;
use crate::auth::session::SessionService;
use crate::auth::store::{FileTokenStore, TokenStore};
use crate::cache::{CacheKey, CacheTagGraph, Completion, FetchClaim, FetchTicket, Subscription, Tag};
use crate::config::DeskConfig;
use crate::endpoint::{EndpointDef, EndpointKind, EndpointRegistry};
use crate::envelope::check_business;
use crate::error::{DeskError, Result};
use crate::transport::executor::RequestExecutor;
use crate::transport::pipeline::Pipeline;
use crate::transport::request::{MultipartForm, RequestDescriptor};
use crate::util::retry::RetryPolicy;

/// Entry point for the admin console's data layer.
///
/// # Example
/// ```no_run
/// use serde_json::json;
/// use storedesk::client::ApiClient;
/// use storedesk::config::DeskConfig;
///
/// # async fn run() -> storedesk::error::Result<()> {
/// let client = ApiClient::new(DeskConfig::from_env()?)?;
/// let orders = client.query("orders.list", json!({"status": "pending"})).await?;
/// client
///     .mutate("orders.updateStatus", json!({"id": "A", "status": "shipped"}))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<Pipeline>,
    session: SessionService,
    cache: Arc<CacheTagGraph>,
    registry: Arc<EndpointRegistry>,
    retry: Option<RetryPolicy>,
}

impl ApiClient {
    /// Client with the admin catalog and a file-backed token store under
    /// `config.token_dir`.
    pub fn new(config: DeskConfig) -> Result<Self> {
        let store = Arc::new(FileTokenStore::new(config.token_store_config()));
        Self::with_store(config, store)
    }

    pub fn with_store(config: DeskConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        Self::with_registry(config, store, EndpointRegistry::admin())
    }

    pub fn with_registry(
        config: DeskConfig,
        store: Arc<dyn TokenStore>,
        registry: EndpointRegistry,
    ) -> Result<Self> {
        let keep_unused_for = config.keep_unused_for;
        let executor = Arc::new(RequestExecutor::new(config, store)?);
        let pipeline = Arc::new(Pipeline::new(executor));
        Ok(Self {
            session: SessionService::new(Arc::clone(&pipeline)),
            pipeline,
            cache: Arc::new(CacheTagGraph::new(keep_unused_for)),
            registry: Arc::new(registry),
            retry: None,
        })
    }

    /// Retry query fetches that fail in transport. Mutations are never retried.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn session(&self) -> &SessionService {
        &self.session
    }

    pub fn cache(&self) -> &Arc<CacheTagGraph> {
        &self.cache
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.pipeline.coordinator().events()
    }

    /// Cache key of a query call, for optimistic patches and inspection.
    pub fn cache_key(&self, endpoint: &str, args: &Value) -> Result<CacheKey> {
        self.registry.cache_key(endpoint, args)
    }

    /// One-shot cached read.
    ///
    /// Fresh data is returned without a request. If another caller is already
    /// fetching the same key, this waits for that fetch instead of sending a
    /// second one.
    pub async fn query(&self, endpoint: &str, args: Value) -> Result<Value> {
        self.expect_kind(endpoint, EndpointKind::Query)?;
        let key = self.registry.cache_key(endpoint, &args)?;
        loop {
            match self.cache.claim(&key) {
                FetchClaim::Fresh(data) => return Ok(data),
                FetchClaim::Owner(ticket) => return self.run_fetch(ticket).await,
                FetchClaim::Join(mut receiver) => {
                    let joined = receiver
                        .wait_for(|snapshot| !snapshot.fetching)
                        .await
                        .ok()
                        .and_then(|snapshot| snapshot.is_fresh().then(|| snapshot.data.clone()))
                        .flatten();
                    if let Some(data) = joined {
                        return Ok(data);
                    }
                    // The joined fetch failed or was discarded; claim again.
                    debug!(key = %key, "joined fetch did not produce data");
                }
            }
        }
    }

    /// Live read. The returned subscription keeps the entry cached and is
    /// refetched whenever a mutation invalidates one of its tags.
    pub async fn subscribe(&self, endpoint: &str, args: Value) -> Result<Subscription> {
        self.expect_kind(endpoint, EndpointKind::Query)?;
        let key = self.registry.cache_key(endpoint, &args)?;
        let (subscription, ticket) = self.cache.subscribe(&key);
        if let Some(ticket) = ticket {
            self.run_fetch(ticket).await?;
        }
        Ok(subscription)
    }

    /// Run a mutation and refetch every subscribed query it invalidates.
    pub async fn mutate(&self, endpoint: &str, args: Value) -> Result<Value> {
        let def = self.expect_kind(endpoint, EndpointKind::Mutation)?;
        let descriptor = self.registry.build_request(endpoint, &args, None)?;
        self.commit(def, &args, &descriptor).await
    }

    /// Mutation with a multipart attachment; `args` become text fields.
    pub async fn upload(&self, endpoint: &str, args: Value, form: MultipartForm) -> Result<Value> {
        let def = self.expect_kind(endpoint, EndpointKind::Mutation)?;
        let descriptor = self.registry.build_request(endpoint, &args, Some(form))?;
        self.commit(def, &args, &descriptor).await
    }

    /// Apply `edit` to the cached data at `target` right away, then run the
    /// mutation. On failure the cached data is put back before the error is
    /// returned.
    pub async fn mutate_optimistic(
        &self,
        endpoint: &str,
        args: Value,
        target: &CacheKey,
        edit: impl FnOnce(&mut Value),
    ) -> Result<Value> {
        let previous = self.cache.patch(target, edit);
        match self.mutate(endpoint, args).await {
            Ok(body) => Ok(body),
            Err(e) => {
                if let Some(previous) = previous {
                    debug!(key = %target, "rolling back optimistic update");
                    self.cache.restore(target, previous);
                }
                Err(e)
            }
        }
    }

    /// Invalidate `tags` by hand and wait for the resulting refetches.
    pub async fn invalidate(&self, tags: &[Tag]) {
        let tickets = self.cache.invalidate(tags);
        self.refetch(tickets).await;
    }

    /// Local logout; drops every cached entry.
    pub fn logout(&self) -> Result<()> {
        let result = self.session.logout();
        self.cache.reset();
        result
    }

    /// Server-side logout of every session, then local logout.
    pub async fn logout_all(&self) -> Result<()> {
        let result = self.session.logout_all().await;
        self.cache.reset();
        result
    }

    fn expect_kind(&self, endpoint: &str, kind: EndpointKind) -> Result<&EndpointDef> {
        let def = self.registry.get(endpoint)?;
        if def.kind != kind {
            return Err(DeskError::InvalidArgument(format!(
                "{endpoint} is a {}, not a {kind}",
                def.kind
            )));
        }
        Ok(def)
    }

    async fn commit(
        &self,
        def: &EndpointDef,
        args: &Value,
        descriptor: &RequestDescriptor,
    ) -> Result<Value> {
        let body = match self.send_checked(descriptor).await {
            Ok(body) => body,
            Err(e) => return Err(self.on_error(e)),
        };
        let tags = def.invalidated_tags(args, &body);
        debug!(endpoint = %def.name, tags = tags.len(), "mutation committed");
        self.invalidate(&tags).await;
        Ok(body)
    }

    async fn send_checked(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let response = self.pipeline.send(descriptor).await?;
        let body = response.json_value()?;
        check_business(&body)?;
        Ok(body)
    }

    async fn fetch(&self, key: &CacheKey) -> Result<(Value, Vec<Tag>)> {
        let args = key.args_value()?;
        let def = self.registry.get(&key.endpoint)?;
        let descriptor = self.registry.build_request(&key.endpoint, &args, None)?;
        let body = match &self.retry {
            Some(policy) => policy.run(|| self.send_checked(&descriptor)).await?,
            None => self.send_checked(&descriptor).await?,
        };
        let tags = def.provided_tags(&args, &body);
        Ok((body, tags))
    }

    /// Run `ticket`, then any follow-up the graph hands back because the
    /// entry was invalidated while the fetch was running.
    async fn run_fetch(&self, mut ticket: FetchTicket) -> Result<Value> {
        loop {
            match self.fetch(&ticket.key).await {
                Ok((data, tags)) => match self.cache.complete_fetch(&ticket, data.clone(), tags) {
                    Completion::Outdated(Some(follow_up)) => {
                        debug!(key = %ticket.key, "invalidated mid-fetch; fetching again");
                        ticket = follow_up;
                    }
                    Completion::Superseded => {
                        debug!(key = %ticket.key, "discarded result of superseded fetch");
                        return Ok(data);
                    }
                    Completion::Fresh | Completion::Outdated(None) => return Ok(data),
                },
                Err(e) => {
                    let follow_up = self.cache.fail_fetch(&ticket, e.to_string());
                    let e = self.on_error(e);
                    match follow_up {
                        Some(next) if !e.is_session_ended() => ticket = next,
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    async fn refetch(&self, tickets: Vec<FetchTicket>) {
        if tickets.is_empty() {
            return;
        }
        let keys: Vec<CacheKey> = tickets.iter().map(|ticket| ticket.key.clone()).collect();
        let results = join_all(tickets.into_iter().map(|ticket| self.run_fetch(ticket))).await;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                warn!(key = %key, error = %e, "refetch after invalidation failed");
            }
        }
    }

    /// Cached data from a session that just ended must not outlive it.
    fn on_error(&self, error: DeskError) -> DeskError {
        if error.is_session_ended() {
            self.cache.reset();
        }
        error
    }
}
