//! The client index: which tags does each connected client currently own.
//!
//! Grants and releases for one client can land on different shard workers,
//! so the index itself must take concurrent updates. The map is a concurrent
//! hash map keyed by client id; the per-client value is a plain `HashSet`
//! mutated under the map's own entry lock. Removals happen in the same shard
//! action that releases the lock, which keeps the index free of entries for
//! locks the client no longer holds; a snapshot taken at disconnect is
//! therefore never larger than the client's true holdings.

use std::collections::HashSet;

use scc::hash_map::Entry;

#[derive(Default)]
pub struct OwnerIndex {
    map: scc::HashMap<String, HashSet<String>>,
}

impl OwnerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `client` now owns `tag`.
    pub(crate) fn record(&self, client: &str, tag: &str) {
        match self.map.entry_sync(client.to_string()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().insert(tag.to_string());
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(HashSet::from([tag.to_string()]));
            }
        }
    }

    /// Record that `client` no longer owns `tag`. Empty per-client sets are
    /// dropped from the map.
    pub(crate) fn forget(&self, client: &str, tag: &str) {
        if let Entry::Occupied(mut occupied) = self.map.entry_sync(client.to_string()) {
            let tags = occupied.get_mut();
            tags.remove(tag);
            if tags.is_empty() {
                let _ = occupied.remove();
            }
        }
    }

    /// Snapshot of the tags currently owned by `client`.
    pub fn owned_tags(&self, client: &str) -> Vec<String> {
        self.map
            .read_sync(client, |_, tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the whole entry for a disconnected client.
    pub(crate) fn drop_client(&self, client: &str) {
        let _ = self.map.remove_sync(client);
    }

    #[cfg(test)]
    pub(crate) fn owns(&self, client: &str, tag: &str) -> bool {
        self.map.read_sync(client, |_, tags| tags.contains(tag)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_forget() {
        let index = OwnerIndex::new();
        index.record("client-a", "t1");
        index.record("client-a", "t2");
        index.record("client-b", "t1");

        let mut tags = index.owned_tags("client-a");
        tags.sort();
        assert_eq!(tags, vec!["t1".to_string(), "t2".to_string()]);

        index.forget("client-a", "t1");
        assert_eq!(index.owned_tags("client-a"), vec!["t2".to_string()]);
        assert!(index.owns("client-b", "t1"));
    }

    #[test]
    fn test_empty_sets_are_dropped() {
        let index = OwnerIndex::new();
        index.record("client-a", "t1");
        index.forget("client-a", "t1");
        assert!(index.owned_tags("client-a").is_empty());
    }

    #[test]
    fn test_forget_unknown_is_a_noop() {
        let index = OwnerIndex::new();
        index.forget("client-a", "t1");
        index.record("client-a", "t2");
        index.forget("client-a", "t1");
        assert_eq!(index.owned_tags("client-a"), vec!["t2".to_string()]);
    }

    #[test]
    fn test_drop_client() {
        let index = OwnerIndex::new();
        index.record("client-a", "t1");
        index.record("client-a", "t2");
        index.drop_client("client-a");
        assert!(index.owned_tags("client-a").is_empty());
    }
}
