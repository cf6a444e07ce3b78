use parking_lot::RwLock;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const DEFAULT_SHARDS: usize = 16;

/// String-keyed map split across independently locked shards
///
/// Operations on different keys only contend when the keys hash to the same
/// shard; there is no lock spanning the whole map.
pub(crate) struct ShardedMap<V> {
    shards: Box<[RwLock<HashMap<String, V>>]>,
}

impl<V: Clone> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ShardedMap<V> {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(count: usize) -> Self {
        Self {
            shards: (0..count.max(1))
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    /// Insert unless the key is taken; on conflict returns the existing value
    pub fn insert_if_absent(&self, key: String, value: V) -> Result<(), V> {
        let mut shard = self.shard(&key).write();
        match shard.entry(key) {
            Entry::Occupied(existing) => Err(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn keys(&self) -> Vec<String> {
        self.shards
            .iter()
            .flat_map(|shard| shard.read().keys().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Empty every shard, returning what was held
    pub fn drain(&self) -> Vec<(String, V)> {
        self.shards
            .iter()
            .flat_map(|shard| shard.write().drain().collect::<Vec<_>>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let map = ShardedMap::new();
        assert!(map.insert_if_absent("conn-1".to_string(), 1).is_ok());
        assert_eq!(map.insert_if_absent("conn-1".to_string(), 2), Err(1));
        assert_eq!(map.get("conn-1"), Some(1));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let map = ShardedMap::new();
        map.insert_if_absent("a".to_string(), "x".to_string()).unwrap();
        assert_eq!(map.remove("a"), Some("x".to_string()));
        assert_eq!(map.remove("a"), None);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_keys_and_drain_span_all_shards() {
        let map = ShardedMap::with_shards(4);
        for i in 0..50 {
            map.insert_if_absent(format!("key-{}", i), i).unwrap();
        }
        assert_eq!(map.len(), 50);
        assert_eq!(map.keys().len(), 50);

        let drained = map.drain();
        assert_eq!(drained.len(), 50);
        assert_eq!(map.len(), 0);
    }
}
