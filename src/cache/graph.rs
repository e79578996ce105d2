//! Tag graph over cached query results.
//!
//! Each entry remembers which tags it provides. A successful mutation
//! invalidates a set of tags: intersecting entries go stale, subscribed ones
//! receive a refetch ticket, unsubscribed ones are dropped and refetched
//! lazily on their next read.
//!
//! Fetches are ticketed. Only the holder of an entry's current ticket may
//! complete it, and an entry has at most one outstanding ticket. Ticket ids
//! and invalidation generations come from one counter, so a ticket older than
//! the entry's last invalidation may have read pre-mutation data: its result
//! is stored but the entry stays stale, and a subscribed entry gets exactly one
//! follow-up ticket no matter how many invalidations arrived meanwhile.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use super::subscription::Subscription;
use super::tag::Tag;
use super::CacheKey;

/// What subscribers observe for one cache entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub data: Option<Value>,
    pub stale: bool,
    pub fetching: bool,
    pub error: Option<String>,
}

impl QuerySnapshot {
    /// Has data that no invalidation has touched since it was fetched.
    pub fn is_fresh(&self) -> bool {
        self.data.is_some() && !self.stale
    }
}

/// Permission to run the fetch for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: CacheKey,
    id: u64,
}

/// Result of asking the graph for a one-shot read.
#[derive(Debug)]
pub enum FetchClaim {
    /// Cached and fresh.
    Fresh(Value),
    /// Caller must fetch and report back with the ticket.
    Owner(FetchTicket),
    /// Someone else is fetching; wait on the receiver.
    Join(watch::Receiver<QuerySnapshot>),
}

/// What happened to the result of a ticketed fetch.
#[derive(Debug)]
pub enum Completion {
    /// Stored; the entry is fresh.
    Fresh,
    /// Stored, but an invalidation arrived while the fetch was running. The
    /// entry stays stale; subscribed entries come with a follow-up ticket.
    Outdated(Option<FetchTicket>),
    /// The ticket was no longer current; nothing was stored.
    Superseded,
}

impl Completion {
    pub fn is_stored(&self) -> bool {
        !matches!(self, Self::Superseded)
    }
}

struct CacheEntry {
    entry_id: u64,
    data: Option<Value>,
    stale: bool,
    provides: HashSet<Tag>,
    subscribers: usize,
    fetch: Option<u64>,
    /// Generation of the last invalidation that hit this entry.
    invalidated: u64,
    error: Option<String>,
    unused_since: Option<Instant>,
    notify: watch::Sender<QuerySnapshot>,
}

impl CacheEntry {
    fn new(entry_id: u64) -> Self {
        let (notify, _) = watch::channel(QuerySnapshot::default());
        Self {
            entry_id,
            data: None,
            stale: false,
            provides: HashSet::new(),
            subscribers: 0,
            fetch: None,
            invalidated: 0,
            error: None,
            unused_since: None,
            notify,
        }
    }

    fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            data: self.data.clone(),
            stale: self.stale,
            fetching: self.fetch.is_some(),
            error: self.error.clone(),
        }
    }

    fn publish(&self) {
        self.notify.send_replace(self.snapshot());
    }

    fn needs_fetch(&self) -> bool {
        self.fetch.is_none() && (self.data.is_none() || self.stale)
    }

    /// The outstanding fetch started before the last invalidation.
    fn fetch_outdated(&self) -> bool {
        self.fetch.is_some_and(|id| id < self.invalidated)
    }
}

#[derive(Default)]
struct GraphState {
    entries: HashMap<CacheKey, CacheEntry>,
    index: HashMap<Tag, HashSet<CacheKey>>,
    next_id: u64,
}

impl GraphState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn entry_mut(&mut self, key: &CacheKey) -> &mut CacheEntry {
        let next_id = &mut self.next_id;
        self.entries.entry(key.clone()).or_insert_with(|| {
            *next_id += 1;
            CacheEntry::new(*next_id)
        })
    }

    fn issue_ticket(&mut self, key: &CacheKey) -> FetchTicket {
        let id = self.next_id();
        let entry = self.entry_mut(key);
        entry.fetch = Some(id);
        entry.error = None;
        entry.publish();
        FetchTicket {
            key: key.clone(),
            id,
        }
    }

    fn reindex(&mut self, key: &CacheKey, tags: HashSet<Tag>) {
        let old = match self.entries.get_mut(key) {
            Some(entry) => std::mem::replace(&mut entry.provides, tags.clone()),
            None => return,
        };
        for tag in old.difference(&tags) {
            self.unindex(tag, key);
        }
        for tag in tags {
            self.index.entry(tag).or_default().insert(key.clone());
        }
    }

    fn unindex(&mut self, tag: &Tag, key: &CacheKey) {
        if let Some(keys) = self.index.get_mut(tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(tag);
            }
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            for tag in &entry.provides {
                self.unindex(tag, key);
            }
        }
    }

    /// Apply retention rules to an entry nobody subscribes to.
    fn release_if_unused(&mut self, key: &CacheKey, keep_unused_for: Duration) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        if entry.subscribers > 0 || entry.fetch.is_some() {
            return;
        }
        if entry.data.is_none() || keep_unused_for.is_zero() {
            self.remove(key);
        } else if entry.unused_since.is_none() {
            entry.unused_since = Some(Instant::now());
        }
    }
}

/// Tag-indexed cache of query results.
pub struct CacheTagGraph {
    state: Mutex<GraphState>,
    keep_unused_for: Duration,
}

impl CacheTagGraph {
    pub fn new(keep_unused_for: Duration) -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            keep_unused_for,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current view of an entry.
    pub fn snapshot(&self, key: &CacheKey) -> Option<QuerySnapshot> {
        self.lock().entries.get(key).map(CacheEntry::snapshot)
    }

    pub fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        self.lock().entries.get(key).map(|entry| entry.stale)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn provided_tags(&self, key: &CacheKey) -> Option<HashSet<Tag>> {
        self.lock().entries.get(key).map(|entry| entry.provides.clone())
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.subscribers)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a successful result and the tags it provides; the entry becomes fresh.
    pub fn record_provider(&self, key: &CacheKey, data: Value, tags: impl IntoIterator<Item = Tag>) {
        let mut state = self.lock();
        let entry = state.entry_mut(key);
        entry.data = Some(data);
        entry.stale = false;
        entry.error = None;
        entry.unused_since = None;
        Self::reindex_and_publish(&mut state, key, tags.into_iter().collect());
        state.release_if_unused(key, self.keep_unused_for);
    }

    fn reindex_and_publish(state: &mut GraphState, key: &CacheKey, tags: HashSet<Tag>) {
        state.reindex(key, tags);
        if let Some(entry) = state.entries.get(key) {
            debug!(
                key = %key,
                tags = entry.provides.len(),
                stale = entry.stale,
                "cache entry stored"
            );
            entry.publish();
        }
    }

    /// Claim a one-shot read of `key`.
    ///
    /// A fetch that started before the entry's last invalidation is not
    /// joined: the caller takes over with a new ticket and the old one is
    /// superseded.
    pub fn claim(&self, key: &CacheKey) -> FetchClaim {
        let mut state = self.lock();
        self.prune_locked(&mut state);
        if let Some(entry) = state.entries.get(key) {
            if entry.fetch.is_some() && !entry.fetch_outdated() {
                return FetchClaim::Join(entry.notify.subscribe());
            }
            if let (Some(data), false) = (&entry.data, entry.stale) {
                return FetchClaim::Fresh(data.clone());
            }
        }
        FetchClaim::Owner(state.issue_ticket(key))
    }

    /// Register a subscriber; returns a ticket when the entry has to be (re)fetched.
    pub fn subscribe(self: &Arc<Self>, key: &CacheKey) -> (Subscription, Option<FetchTicket>) {
        let mut state = self.lock();
        self.prune_locked(&mut state);
        let entry = state.entry_mut(key);
        entry.subscribers += 1;
        entry.unused_since = None;
        let entry_id = entry.entry_id;
        let receiver = entry.notify.subscribe();
        let ticket = entry.needs_fetch().then(|| state.issue_ticket(key));
        drop(state);
        let subscription = Subscription::new(Arc::clone(self), key.clone(), entry_id, receiver);
        (subscription, ticket)
    }

    /// Drop one subscriber reference. Ignored for entries replaced since the
    /// subscription was made (e.g. after a reset).
    pub(crate) fn unsubscribe(&self, key: &CacheKey, entry_id: u64) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        if entry.entry_id != entry_id || entry.subscribers == 0 {
            return;
        }
        entry.subscribers -= 1;
        if entry.subscribers == 0 {
            state.release_if_unused(key, self.keep_unused_for);
        }
    }

    /// Finish a ticketed fetch.
    pub fn complete_fetch(
        &self,
        ticket: &FetchTicket,
        data: Value,
        tags: impl IntoIterator<Item = Tag>,
    ) -> Completion {
        let mut state = self.lock();
        let follow_up_id = state.next_id();
        let key = &ticket.key;
        let Some(entry) = state.entries.get_mut(key) else {
            return Completion::Superseded;
        };
        if entry.fetch != Some(ticket.id) {
            return Completion::Superseded;
        }
        let outdated = entry.fetch_outdated();
        entry.fetch = None;
        entry.data = Some(data);
        entry.stale = outdated;
        entry.error = None;
        entry.unused_since = None;

        if !outdated {
            Self::reindex_and_publish(&mut state, key, tags.into_iter().collect());
            state.release_if_unused(key, self.keep_unused_for);
            return Completion::Fresh;
        }
        if entry.subscribers == 0 {
            state.remove(key);
            debug!(key = %key, "dropped unsubscribed entry invalidated mid-fetch");
            return Completion::Outdated(None);
        }
        entry.fetch = Some(follow_up_id);
        Self::reindex_and_publish(&mut state, key, tags.into_iter().collect());
        Completion::Outdated(Some(FetchTicket {
            key: key.clone(),
            id: follow_up_id,
        }))
    }

    /// Record a failed fetch; previous data (if any) stays available.
    ///
    /// Returns a follow-up ticket when the entry is subscribed and was
    /// invalidated while the failed fetch was running.
    pub fn fail_fetch(&self, ticket: &FetchTicket, error: impl Into<String>) -> Option<FetchTicket> {
        let mut state = self.lock();
        let follow_up_id = state.next_id();
        let entry = state.entries.get_mut(&ticket.key)?;
        if entry.fetch != Some(ticket.id) {
            return None;
        }
        let follow_up = entry.fetch_outdated() && entry.subscribers > 0;
        entry.fetch = follow_up.then_some(follow_up_id);
        entry.error = Some(error.into());
        entry.publish();
        if !follow_up {
            state.release_if_unused(&ticket.key, self.keep_unused_for);
            return None;
        }
        Some(FetchTicket {
            key: ticket.key.clone(),
            id: follow_up_id,
        })
    }

    /// Mark every entry providing any of `tags` stale.
    ///
    /// Subscribed entries without an outstanding fetch get a ticket;
    /// unsubscribed idle entries are dropped. Entries with an outstanding
    /// fetch get no ticket now; that fetch lands outdated and is followed up.
    pub fn invalidate<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> Vec<FetchTicket> {
        let mut state = self.lock();
        self.prune_locked(&mut state);
        let generation = state.next_id();

        let mut affected: Vec<CacheKey> = Vec::new();
        let mut seen = HashSet::new();
        for tag in tags {
            if let Some(keys) = state.index.get(tag) {
                for key in keys {
                    if seen.insert(key.clone()) {
                        affected.push(key.clone());
                    }
                }
            }
        }

        let mut tickets = Vec::new();
        let mut dropped = 0usize;
        for key in &affected {
            let Some(entry) = state.entries.get_mut(key) else {
                continue;
            };
            entry.stale = true;
            entry.invalidated = generation;
            if entry.fetch.is_some() {
                entry.publish();
            } else if entry.subscribers > 0 {
                tickets.push(state.issue_ticket(key));
            } else {
                state.remove(key);
                dropped += 1;
            }
        }

        debug!(
            affected = affected.len(),
            refetch = tickets.len(),
            dropped,
            "cache tags invalidated"
        );
        tickets
    }

    /// Apply a local edit to cached data, returning the previous value for rollback.
    pub fn patch(&self, key: &CacheKey, edit: impl FnOnce(&mut Value)) -> Option<Value> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(key)?;
        let data = entry.data.as_mut()?;
        let previous = data.clone();
        edit(data);
        entry.publish();
        Some(previous)
    }

    /// Undo a [`patch`](Self::patch).
    pub fn restore(&self, key: &CacheKey, previous: Value) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.data = Some(previous);
            entry.publish();
        }
    }

    /// Drop expired unused entries.
    pub fn prune(&self) {
        let mut state = self.lock();
        self.prune_locked(&mut state);
    }

    fn prune_locked(&self, state: &mut GraphState) {
        let keep = self.keep_unused_for;
        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.subscribers == 0
                    && entry.fetch.is_none()
                    && entry
                        .unused_since
                        .is_some_and(|since| since.elapsed() >= keep)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            state.remove(&key);
        }
    }

    /// Drop every entry (logout).
    pub fn reset(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.index.clear();
        debug!("cache reset");
    }
}
