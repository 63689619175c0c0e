//! Integer-weighted load balancing.
//!
//! Smooth weighted round-robin: every pick raises each entry's running score
//! by its weight, selects the highest score and lowers it by the total. Over
//! one cycle of `total_weight` picks each entry is chosen exactly `weight`
//! times, and heavy entries are interleaved rather than picked in bursts.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

/// Mapping from upstream address to integer weight, plus selection state.
#[derive(Debug)]
pub struct WeightedUpstreamSet {
    entries: Vec<(SocketAddr, u32)>,
    scores: Mutex<Vec<i64>>,
    total: i64,
}

impl WeightedUpstreamSet {
    /// Build a set from `(address, weight)` pairs.
    ///
    /// Every pair keeps its own entry, even when addresses repeat.
    /// Zero weights are dropped.
    pub fn new(pairs: impl IntoIterator<Item = (SocketAddr, u32)>) -> Self {
        let entries: Vec<(SocketAddr, u32)> = pairs.into_iter().filter(|(_, w)| *w > 0).collect();

        let total = entries.iter().map(|(_, w)| i64::from(*w)).sum();
        Self {
            scores: Mutex::new(vec![0; entries.len()]),
            entries,
            total,
        }
    }

    /// Select the next upstream.
    pub fn next(&self) -> Option<SocketAddr> {
        if self.entries.is_empty() {
            return None;
        }

        let mut scores = self.scores.lock().unwrap_or_else(PoisonError::into_inner);
        let mut best = 0;
        for (i, (_, weight)) in self.entries.iter().enumerate() {
            scores[i] += i64::from(*weight);
            if scores[i] > scores[best] {
                best = i;
            }
        }
        scores[best] -= self.total;

        Some(self.entries[best].0)
    }

    /// Registered `(address, weight)` pairs in insertion order.
    pub fn weights(&self) -> &[(SocketAddr, u32)] {
        &self.entries
    }

    /// Combined weight registered for `addr`, if any.
    pub fn weight_of(&self, addr: SocketAddr) -> Option<u32> {
        self.entries
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, w)| *w)
            .reduce(u32::saturating_add)
    }

    /// Sum of all registered weights.
    pub fn total_weight(&self) -> u64 {
        self.total as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_one_cycle_matches_weights() {
        let set = WeightedUpstreamSet::new([(addr(1), 3), (addr(2), 1)]);
        let mut hits: HashMap<SocketAddr, u32> = HashMap::new();
        for _ in 0..set.total_weight() * 10 {
            *hits.entry(set.next().unwrap()).or_default() += 1;
        }
        assert_eq!(hits[&addr(1)], 30);
        assert_eq!(hits[&addr(2)], 10);
    }

    #[test]
    fn test_picks_are_interleaved() {
        let set = WeightedUpstreamSet::new([(addr(1), 2), (addr(2), 2)]);
        let picks: Vec<_> = (0..4).map(|_| set.next().unwrap()).collect();
        assert_eq!(picks, vec![addr(1), addr(2), addr(1), addr(2)]);
    }

    #[test]
    fn test_duplicate_addresses_keep_their_entries() {
        let set = WeightedUpstreamSet::new([(addr(1), 2), (addr(2), 1), (addr(1), 3)]);
        assert_eq!(set.weights(), &[(addr(1), 2), (addr(2), 1), (addr(1), 3)]);
        assert_eq!(set.weight_of(addr(1)), Some(5));
        assert_eq!(set.total_weight(), 6);

        let hits = (0..6).filter(|_| set.next() == Some(addr(1))).count();
        assert_eq!(hits, 5);
    }

    #[test]
    fn test_empty_set_selects_nothing() {
        let set = WeightedUpstreamSet::new([(addr(1), 0)]);
        assert!(set.is_empty());
        assert_eq!(set.next(), None);
    }
}
