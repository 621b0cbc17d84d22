//! services/entity_cache.rs
//! Size-bounded entity resolution cache in front of the entity directory.
//!
//! Eviction is FIFO by first insertion: once `capacity` keys are held, the
//! oldest-inserted key goes, however recently it was read. Reads do not
//! refresh anything and overwriting a key keeps its original position.
//! This is not an LRU.

use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use parking_lot::Mutex;

use crate::model::EntityKind;
use crate::services::memory::Memory;
use crate::services::mentions::{EntityDirectory, EntityNames};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct EntityCache<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    order: VecDeque<String>,
    stats: CacheStats,
}

impl<V: Clone> EntityCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(v) => {
                self.stats.hits += 1;
                Some(v.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: String, value: V) {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

fn names_key(user_id: &str, entity_id: &str) -> String {
    format!("{user_id}\u{1f}{entity_id}")
}

fn id_key(user_id: &str, kind: EntityKind, name: &str) -> String {
    format!("{user_id}\u{1f}{}\u{1f}{}", kind.as_str(), name.trim().to_lowercase())
}

/// Caches directory lookups and name -> id resolution.
/// Holds no connection; the store is passed to each call.
#[derive(Debug)]
pub struct EntityResolver {
    names: Mutex<EntityCache<EntityNames>>,
    ids: Mutex<EntityCache<String>>,
}

impl EntityResolver {
    pub fn new(capacity: usize) -> Self {
        Self {
            names: Mutex::new(EntityCache::new(capacity)),
            ids: Mutex::new(EntityCache::new(capacity)),
        }
    }

    /// Directory lookup through the cache. Only found entities are cached.
    pub fn names(
        &self,
        directory: &dyn EntityDirectory,
        user_id: &str,
        entity_id: &str,
        kind: EntityKind,
    ) -> Result<Option<EntityNames>> {
        let key = names_key(user_id, entity_id);
        if let Some(hit) = self.names.lock().get(&key) {
            return Ok(Some(hit));
        }
        let found = directory.entity_names(user_id, entity_id, kind)?;
        if let Some(names) = &found {
            self.names.lock().insert(key, names.clone());
        }
        Ok(found)
    }

    /// Map a display name to an entity id, creating the entity on first sight.
    /// New aliases always go to the store and drop the cached names.
    pub fn resolve_or_create(
        &self,
        store: &Memory,
        user_id: &str,
        kind: EntityKind,
        name: &str,
        aliases: &[String],
    ) -> Result<String> {
        let key = id_key(user_id, kind, name);
        if aliases.is_empty() {
            if let Some(id) = self.ids.lock().get(&key) {
                return Ok(id);
            }
        }
        let id = store.upsert_entity(user_id, kind, name, aliases)?;
        self.ids.lock().insert(key, id.clone());
        self.invalidate(user_id, &id);
        Ok(id)
    }

    pub fn invalidate(&self, user_id: &str, entity_id: &str) {
        self.names.lock().remove(&names_key(user_id, entity_id));
    }

    pub fn stats(&self) -> CacheStats {
        self.names.lock().stats()
    }
}

/// [`EntityDirectory`] view that consults the resolver cache first.
pub struct CachedDirectory<'a> {
    pub inner: &'a dyn EntityDirectory,
    pub resolver: &'a EntityResolver,
}

impl EntityDirectory for CachedDirectory<'_> {
    fn entity_names(&self, user_id: &str, entity_id: &str, kind: EntityKind) -> Result<Option<EntityNames>> {
        self.resolver.names(self.inner, user_id, entity_id, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn evicts_oldest_inserted_even_after_reads() {
        let mut cache = EntityCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        // an LRU would now keep "a"
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".into(), 3);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn overwrite_keeps_insertion_position() {
        let mut cache = EntityCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("a".into(), 10);
        assert_eq!(cache.len(), 2);
        cache.insert("c".into(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn remove_frees_a_slot() {
        let mut cache = EntityCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(cache.remove("a"), Some(1));
        cache.insert("c".into(), 3);
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 0);
    }

    struct CountingDirectory {
        calls: Cell<usize>,
    }

    impl EntityDirectory for CountingDirectory {
        fn entity_names(&self, _user: &str, entity_id: &str, kind: EntityKind) -> Result<Option<EntityNames>> {
            self.calls.set(self.calls.get() + 1);
            if entity_id == "missing" {
                return Ok(None);
            }
            Ok(Some(EntityNames {
                entity_id: entity_id.to_string(),
                kind,
                name: "Sam".into(),
                aliases: vec![],
            }))
        }
    }

    #[test]
    fn resolver_caches_found_entities_only() {
        let dir = CountingDirectory { calls: Cell::new(0) };
        let resolver = EntityResolver::new(8);
        let view = CachedDirectory { inner: &dir, resolver: &resolver };

        for _ in 0..3 {
            let names = view.entity_names("u", "sam", EntityKind::Person).unwrap();
            assert_eq!(names.map(|n| n.name).as_deref(), Some("Sam"));
        }
        assert_eq!(dir.calls.get(), 1);

        for _ in 0..2 {
            assert!(view.entity_names("u", "missing", EntityKind::Person).unwrap().is_none());
        }
        assert_eq!(dir.calls.get(), 3);

        resolver.invalidate("u", "sam");
        view.entity_names("u", "sam", EntityKind::Person).unwrap();
        assert_eq!(dir.calls.get(), 4);
    }
}
