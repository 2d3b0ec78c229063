// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// A map from key to a non-owning observer of a shared handle.
///
/// Lookups upgrade the observer; a dead entry counts as a miss and is
/// dropped. The cache never keeps a handle alive on its own.
#[derive(Debug)]
pub struct WeakCache<T> {
    entries: HashMap<String, Weak<T>>,
}

impl<T> WeakCache<T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the live handle for `key`.
    pub fn get(&mut self, key: &str) -> Option<Rc<T>> {
        let handle = self.entries.get(key)?.upgrade();
        if handle.is_none() {
            self.entries.remove(key);
        }
        handle
    }

    /// Returns `true` if `key` has a live handle. Does not prune.
    pub fn contains_live(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Remembers `handle` under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: impl Into<String>, handle: &Rc<T>) {
        self.entries.insert(key.into(), Rc::downgrade(handle));
    }

    /// Drops dead entries and returns how many remain.
    pub fn purge(&mut self) -> usize {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        self.entries.len()
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache has no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for WeakCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_same_instance() {
        let mut cache = WeakCache::new();
        let handle = Rc::new(5);
        cache.insert("a", &handle);
        let hit = cache.get("a").unwrap();
        assert!(Rc::ptr_eq(&hit, &handle));
        assert_eq!(Rc::strong_count(&handle), 2);
    }

    #[test]
    fn dead_entry_is_a_miss() {
        let mut cache = WeakCache::new();
        let handle = Rc::new("asset");
        cache.insert("a", &handle);
        assert!(cache.contains_live("a"));
        drop(handle);

        assert!(!cache.contains_live("a"));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_keeps_live_entries() {
        let mut cache = WeakCache::new();
        let kept = Rc::new(1);
        cache.insert("kept", &kept);
        cache.insert("gone", &Rc::new(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge(), 1);
    }
}
