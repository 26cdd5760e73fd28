//! Rendezvous (highest-random-weight) hashing.

use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Error, Result};

/// Rendezvous hash ring over partition-id strings.
///
/// For each candidate id the ring scores `xxh3_128(id ++ key)` and routes
/// the key to the id with the maximum score. An exact weight collision
/// breaks on the id's string order, so routing stays deterministic.
///
/// Adding or removing one id only remaps the keys whose maximum moved, in
/// expectation `1/n` of them. That property is what makes elastic partition
/// creation cheap compared to mod-N placement.
#[derive(Clone, Debug, Default)]
pub struct RendezvousRing {
    // kept sorted so iteration order (and tie-breaking) is stable
    ids: Vec<String>,
}

impl RendezvousRing {
    /// Creates an empty ring.
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Number of ids on the ring.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if the ring has no ids.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// True if `id` is on the ring.
    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .binary_search_by(|probe| probe.as_str().cmp(id))
            .is_ok()
    }

    /// Adds an id to the ring. Returns false if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        match self.ids.binary_search(&id) {
            Ok(_) => false,
            Err(at) => {
                self.ids.insert(at, id);
                true
            }
        }
    }

    /// Removes an id from the ring. Returns false if it was not present.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.ids.binary_search_by(|probe| probe.as_str().cmp(id)) {
            Ok(at) => {
                self.ids.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes every id from the ring.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// All ids on the ring, in stable (sorted) order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Routes a key to the id with the highest rendezvous weight.
    ///
    /// Fails with [`Error::NoPartitionAvailable`] on an empty ring; callers
    /// must not route before at least one partition is live.
    pub fn route(&self, key: &[u8]) -> Result<&str> {
        let mut best: Option<(u128, &str)> = None;
        for id in &self.ids {
            let weight = rendezvous_weight(id, key);
            // ids are visited in ascending order, so `>=` lets the greater
            // id win an exact weight collision
            if best.map_or(true, |(max, _)| weight >= max) {
                best = Some((weight, id));
            }
        }
        best.map(|(_, id)| id).ok_or(Error::NoPartitionAvailable)
    }
}

/// Combined hash of (id, key): the "random weight" in HRW.
fn rendezvous_weight(id: &str, key: &[u8]) -> u128 {
    let mut buf = Vec::with_capacity(id.len() + key.len());
    buf.extend_from_slice(id.as_bytes());
    buf.extend_from_slice(key);
    xxh3_128(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut ring = RendezvousRing::new();
        assert!(ring.is_empty());

        assert!(ring.insert("partition-b"));
        assert!(ring.insert("partition-a"));
        assert!(!ring.insert("partition-a"), "duplicate insert is a no-op");
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.ids(), ["partition-a", "partition-b"]);

        assert!(ring.contains("partition-a"));
        assert!(ring.remove("partition-a"));
        assert!(!ring.remove("partition-a"));
        assert!(!ring.contains("partition-a"));
        assert_eq!(ring.len(), 1);

        ring.clear();
        assert!(ring.is_empty());
    }

    #[test]
    fn test_empty_ring_routing_fails() {
        let ring = RendezvousRing::new();
        assert!(matches!(
            ring.route(b"key"),
            Err(Error::NoPartitionAvailable)
        ));
    }

    #[test]
    fn test_route_is_deterministic() {
        let mut ring = RendezvousRing::new();
        for id in ["partition-a", "partition-b", "partition-c"] {
            ring.insert(id);
        }

        let first = ring.route(b"some-key").unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(ring.route(b"some-key").unwrap(), first);
        }
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut forward = RendezvousRing::new();
        let mut reverse = RendezvousRing::new();
        let ids = ["partition-a", "partition-b", "partition-c", "partition-d"];
        for id in ids {
            forward.insert(id);
        }
        for id in ids.iter().rev() {
            reverse.insert(*id);
        }

        for n in 0..100u32 {
            let key = n.to_le_bytes();
            assert_eq!(forward.route(&key).unwrap(), reverse.route(&key).unwrap());
        }
    }
}
