//! In-flight request registry.
//!
//! At most one network call runs per [`RequestKey`]. Callers that arrive
//! while it runs attach to the same shared outcome. Each group carries a
//! generation so that a call superseded by a tenant switch or logout never
//! writes its result into the cache, and remembers the tags mutations wrote
//! while it ran so a pre-write result for those tags is not cached either.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fold_core::{FoldResult, RequestKey};
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

pub(crate) type SharedFetch = Shared<BoxFuture<'static, FoldResult<Arc<Value>>>>;

/// Identifies one query subscription inside a dedup group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        SubscriptionId(SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Group {
    generation: u64,
    fetch: SharedFetch,
    listeners: HashSet<SubscriptionId>,
    /// Tags written by mutations that succeeded while this call ran.
    written: BTreeSet<String>,
}

#[derive(Default)]
pub struct InflightRegistry {
    groups: Mutex<HashMap<RequestKey, Group>>,
    generations: AtomicU64,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the group for `key`, or start one with `start(generation)`.
    ///
    /// Returns the shared outcome and whether an existing call was joined.
    pub(crate) fn attach_or_start<F>(
        &self,
        key: &RequestKey,
        listener: SubscriptionId,
        start: F,
    ) -> (SharedFetch, bool)
    where
        F: FnOnce(u64) -> SharedFetch,
    {
        let mut groups = self.groups.lock();
        if let Some(group) = groups.get_mut(key) {
            group.listeners.insert(listener);
            debug!(key = %key, listeners = group.listeners.len(), "attached to in-flight request");
            return (group.fetch.clone(), true);
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let fetch = start(generation);
        groups.insert(
            key.clone(),
            Group {
                generation,
                fetch: fetch.clone(),
                listeners: HashSet::from([listener]),
                written: BTreeSet::new(),
            },
        );
        (fetch, false)
    }

    /// Drop a listener. The group and its network call stay alive.
    pub fn detach(&self, key: &RequestKey, listener: SubscriptionId) -> bool {
        let mut groups = self.groups.lock();
        match groups.get_mut(key) {
            Some(group) => group.listeners.remove(&listener),
            None => false,
        }
    }

    /// Retire the group for `key` if it is still `generation`, running
    /// `on_current` with the tags written during the call under the
    /// registry lock first.
    ///
    /// Returns whether the group was current.
    pub(crate) fn complete_with<F>(&self, key: &RequestKey, generation: u64, on_current: F) -> bool
    where
        F: FnOnce(&BTreeSet<String>),
    {
        let mut groups = self.groups.lock();
        let current = groups
            .get(key)
            .is_some_and(|group| group.generation == generation);
        if current {
            if let Some(group) = groups.remove(key) {
                on_current(&group.written);
            }
        }
        current
    }

    /// Record that a mutation wrote `tags`. Running calls keep their
    /// listeners and dedup, but will not cache a result carrying any of them.
    pub fn mark_written(&self, tags: &BTreeSet<String>) -> usize {
        if tags.is_empty() {
            return 0;
        }
        let mut groups = self.groups.lock();
        for group in groups.values_mut() {
            group.written.extend(tags.iter().cloned());
        }
        groups.len()
    }

    /// Supersede every group. Their calls finish but write nothing.
    pub fn clear(&self) -> usize {
        let mut groups = self.groups.lock();
        let dropped = groups.len();
        groups.clear();
        if dropped > 0 {
            debug!(dropped, "in-flight requests superseded");
        }
        dropped
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.groups.lock().contains_key(key)
    }

    pub fn listeners(&self, key: &RequestKey) -> usize {
        self.groups
            .lock()
            .get(key)
            .map_or(0, |group| group.listeners.len())
    }

    pub fn len(&self) -> usize {
        self.groups.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
