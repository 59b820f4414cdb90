//! Normalized in-memory result cache.
//!
//! Entries are addressed by [`RequestKey`] and indexed by the entity tags
//! found in their data, so a mutation can drop every dependent entry by tag
//! without a round-trip. Locks are held only for the duration of each call.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::key::RequestKey;
use crate::tenant::{OrganisationId, TenantScope};

/// A cached query result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub data: Arc<Value>,
    pub fetched_at: DateTime<Utc>,
    pub dependent_tags: BTreeSet<String>,
    /// Scope the entry was written under.
    pub scope: TenantScope,
}

/// Optional size/time bounds. Tag invalidation works without either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheLimits {
    pub ttl: Option<Duration>,
    pub max_entries: Option<usize>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<RequestKey, CacheEntry>,
    by_tag: HashMap<String, HashSet<RequestKey>>,
}

impl CacheInner {
    fn remove(&mut self, key: &RequestKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.dependent_tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .values()
            .min_by_key(|e| e.fetched_at)
            .map(|e| e.key.clone());
        if let Some(key) = oldest {
            debug!(key = %key, "cache evict (capacity)");
            self.remove(&key);
        }
    }
}

/// Tag-indexed result cache shared by the executors.
#[derive(Default)]
pub struct CacheStore {
    inner: RwLock<CacheInner>,
    limits: CacheLimits,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: CacheLimits) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            limits,
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    fn is_stale(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match self.limits.ttl {
            Some(ttl) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => entry.fetched_at + ttl <= now,
                Err(_) => false,
            },
            None => false,
        }
    }

    /// Look up an entry. Entries past their TTL are dropped and reported missing.
    pub fn get(&self, key: &RequestKey) -> Option<CacheEntry> {
        let now = Utc::now();
        {
            let inner = self.inner.read();
            let entry = inner.entries.get(key)?;
            if !self.is_stale(entry, now) {
                return Some(entry.clone());
            }
        }

        self.drop_if_stale(key, now)
    }

    /// Remove `key` if it is still stale under the write lock. An entry
    /// rewritten since the read check is returned instead.
    fn drop_if_stale(&self, key: &RequestKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut inner = self.inner.write();
        let entry = inner.entries.get(key)?;
        if !self.is_stale(entry, now) {
            return Some(entry.clone());
        }
        debug!(key = %key, "cache entry expired");
        inner.remove(key);
        None
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite the entry for `key`.
    pub fn put(
        &self,
        key: RequestKey,
        data: Arc<Value>,
        tags: BTreeSet<String>,
        scope: TenantScope,
    ) {
        let mut inner = self.inner.write();
        inner.remove(&key);

        if let Some(max) = self.limits.max_entries {
            while max > 0 && inner.entries.len() >= max {
                inner.evict_oldest();
            }
        }

        for tag in &tags {
            inner
                .by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }

        debug!(key = %key, tags = tags.len(), scope = %scope, "cache put");
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                data,
                fetched_at: Utc::now(),
                dependent_tags: tags,
                scope,
            },
        );
    }

    /// Remove every entry whose tags include `tag`. Returns how many went.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut inner = self.inner.write();
        let Some(keys) = inner.by_tag.remove(tag) else {
            return 0;
        };

        let mut removed = 0;
        for key in keys {
            if inner.remove(&key).is_some() {
                removed += 1;
            }
        }
        debug!(tag, removed, "cache invalidate");
        removed
    }

    /// Remove every entry written under `organisation`.
    pub fn purge_organisation(&self, organisation: &OrganisationId) -> usize {
        let mut inner = self.inner.write();
        let keys: Vec<RequestKey> = inner
            .entries
            .values()
            .filter(|e| &e.scope.organisation_id == organisation)
            .map(|e| e.key.clone())
            .collect();

        for key in &keys {
            inner.remove(key);
        }
        debug!(organisation = %organisation, removed = keys.len(), "cache purge tenant");
        keys.len()
    }

    pub fn purge_all(&self) -> usize {
        let mut inner = self.inner.write();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.by_tag.clear();
        debug!(removed, "cache purge all");
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RequestKeyer;
    use crate::operation::{OperationDescriptor, Variables};
    use serde_json::json;

    fn key(name: &str, scope: &TenantScope) -> RequestKey {
        let op = OperationDescriptor::query(name, "query { ... }");
        RequestKeyer::new().compute_key(&op, &Variables::new(), scope)
    }

    fn tags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn put_then_get_returns_latest_write() {
        let cache = CacheStore::new();
        let scope = TenantScope::organisation("org-1");
        let k = key("GetFunds", &scope);

        cache.put(k.clone(), Arc::new(json!({ "v": 1 })), tags(&["Fund"]), scope.clone());
        cache.put(k.clone(), Arc::new(json!({ "v": 2 })), tags(&["Fund"]), scope);

        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get(&k).unwrap().data, json!({ "v": 2 }));
    }

    #[test]
    fn invalidate_by_tag_removes_only_intersecting_entries() {
        let cache = CacheStore::new();
        let scope = TenantScope::organisation("org-1");
        let funds = key("GetFunds", &scope);
        let fund = key("GetFund", &scope);
        let members = key("GetMembers", &scope);

        cache.put(funds.clone(), Arc::new(json!([])), tags(&["Fund"]), scope.clone());
        cache.put(fund.clone(), Arc::new(json!({})), tags(&["Fund", "Fund:1"]), scope.clone());
        cache.put(members.clone(), Arc::new(json!([])), tags(&["Member"]), scope);

        assert_eq!(cache.invalidate_by_tag("Fund:1"), 1);
        assert!(cache.get(&fund).is_none());
        assert!(cache.get(&funds).is_some());

        assert_eq!(cache.invalidate_by_tag("Fund"), 1);
        assert!(cache.get(&funds).is_none());
        assert!(cache.get(&members).is_some());
        assert_eq!(cache.invalidate_by_tag("Fund"), 0);
    }

    #[test]
    fn overwrite_drops_stale_tag_index() {
        let cache = CacheStore::new();
        let scope = TenantScope::organisation("org-1");
        let k = key("GetFund", &scope);

        cache.put(k.clone(), Arc::new(json!({})), tags(&["Fund:1"]), scope.clone());
        cache.put(k.clone(), Arc::new(json!({})), tags(&["Fund:2"]), scope);

        assert_eq!(cache.invalidate_by_tag("Fund:1"), 0);
        assert!(cache.get(&k).is_some());
    }

    #[test]
    fn purge_organisation_leaves_other_tenants() {
        let cache = CacheStore::new();
        let a = TenantScope::organisation("org-a");
        let b = TenantScope::organisation("org-b");
        let ka = key("GetFunds", &a);
        let kb = key("GetFunds", &b);

        cache.put(ka.clone(), Arc::new(json!(1)), tags(&["Fund"]), a.clone());
        cache.put(kb.clone(), Arc::new(json!(2)), tags(&["Fund"]), b);

        assert_eq!(cache.purge_organisation(&a.organisation_id), 1);
        assert!(cache.get(&ka).is_none());
        assert!(cache.get(&kb).is_some());

        // tag index must not resurrect purged keys
        assert_eq!(cache.invalidate_by_tag("Fund"), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let cache = CacheStore::with_limits(CacheLimits {
            ttl: None,
            max_entries: Some(2),
        });
        let scope = TenantScope::organisation("org-1");
        let first = key("A", &scope);
        let second = key("B", &scope);
        let third = key("C", &scope);

        cache.put(first.clone(), Arc::new(json!(1)), BTreeSet::new(), scope.clone());
        std::thread::sleep(Duration::from_millis(2));
        cache.put(second.clone(), Arc::new(json!(2)), BTreeSet::new(), scope.clone());
        std::thread::sleep(Duration::from_millis(2));
        cache.put(third.clone(), Arc::new(json!(3)), BTreeSet::new(), scope);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&first).is_none());
        assert!(cache.get(&third).is_some());
    }

    #[test]
    fn entry_rewritten_after_stale_read_survives() {
        let cache = CacheStore::with_limits(CacheLimits {
            ttl: Some(Duration::from_secs(3600)),
            max_entries: None,
        });
        let scope = TenantScope::organisation("org-1");
        let k = key("GetFunds", &scope);
        cache.put(k.clone(), Arc::new(json!(2)), tags(&["Fund"]), scope);

        // a fresh put landed between the stale read and the removal
        let kept = cache.drop_if_stale(&k, Utc::now()).unwrap();
        assert_eq!(*kept.data, json!(2));
        assert_eq!(cache.len(), 1);

        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(cache.drop_if_stale(&k, later).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.invalidate_by_tag("Fund"), 0);
    }

    #[test]
    fn expired_entries_are_reported_missing() {
        let cache = CacheStore::with_limits(CacheLimits {
            ttl: Some(Duration::from_millis(1)),
            max_entries: None,
        });
        let scope = TenantScope::organisation("org-1");
        let k = key("GetFunds", &scope);
        cache.put(k.clone(), Arc::new(json!(1)), tags(&["Fund"]), scope);

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&k).is_none());
        assert!(cache.is_empty());
    }
}
