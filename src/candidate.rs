//! Peer selection strategies for a mix cycle.
//!
//! A filter takes the current membership snapshot and returns the subset to
//! exchange with this cycle, preserving snapshot order. Filters must be
//! pure: repeated invocation over the same snapshot is always safe.
use std::net::SocketAddr;

use rand::seq::index::sample;

/// Strategy hook selecting which peers to exchange with this cycle.
pub trait CandidateFilter: Send + Sync {
    fn select<'a>(&self, peers: &'a [SocketAddr]) -> Vec<&'a SocketAddr>;
}

/// Default strategy: exchange with every registered peer.
pub struct AllPeers;

impl CandidateFilter for AllPeers {
    fn select<'a>(&self, peers: &'a [SocketAddr]) -> Vec<&'a SocketAddr> {
        peers.iter().collect()
    }
}

/// Exchange with everyone except this node's own registration.
pub struct SkipSelf {
    self_id: SocketAddr,
}

impl SkipSelf {
    pub fn new(self_id: SocketAddr) -> Self {
        Self { self_id }
    }
}

impl CandidateFilter for SkipSelf {
    fn select<'a>(&self, peers: &'a [SocketAddr]) -> Vec<&'a SocketAddr> {
        peers.iter().filter(|&&peer| peer != self.self_id).collect()
    }
}

/// Exchange with at most `count` peers chosen uniformly at random,
/// keeping snapshot order among the chosen.
pub struct RandomSubset {
    count: usize,
}

impl RandomSubset {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl CandidateFilter for RandomSubset {
    fn select<'a>(&self, peers: &'a [SocketAddr]) -> Vec<&'a SocketAddr> {
        if peers.len() <= self.count {
            return peers.iter().collect();
        }
        let mut indices = sample(&mut rand::rng(), peers.len(), self.count).into_vec();
        indices.sort_unstable();
        indices.into_iter().map(|i| &peers[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_list() -> Vec<SocketAddr> {
        (0..5)
            .map(|i| format!("10.0.0.{}:8631", i + 1).parse().unwrap())
            .collect()
    }

    #[test]
    fn test_all_peers_returns_everything_in_order() {
        let peers = peer_list();
        let selected = AllPeers.select(&peers);
        assert_eq!(selected.len(), peers.len());
        for (chosen, peer) in selected.iter().zip(&peers) {
            assert_eq!(**chosen, *peer);
        }
    }

    #[test]
    fn test_skip_self_excludes_own_address() {
        let peers = peer_list();
        let filter = SkipSelf::new(peers[2]);
        let selected = filter.select(&peers);

        assert_eq!(selected.len(), peers.len() - 1);
        assert!(selected.iter().all(|&&peer| peer != peers[2]));
    }

    #[test]
    fn test_skip_self_when_absent_is_identity() {
        let peers = peer_list();
        let filter = SkipSelf::new("192.168.0.9:1234".parse().unwrap());
        assert_eq!(filter.select(&peers).len(), peers.len());
    }

    #[test]
    fn test_random_subset_bounds_and_order() {
        let peers = peer_list();
        let filter = RandomSubset::new(3);

        for _ in 0..20 {
            let selected = filter.select(&peers);
            assert_eq!(selected.len(), 3);

            // Chosen peers appear in snapshot order.
            let mut positions: Vec<usize> = selected
                .iter()
                .map(|&chosen| peers.iter().position(|p| p == chosen).unwrap())
                .collect();
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            assert_eq!(positions, sorted);
            positions.dedup();
            assert_eq!(positions.len(), 3);
        }
    }

    #[test]
    fn test_random_subset_larger_than_list() {
        let peers = peer_list();
        let filter = RandomSubset::new(100);
        assert_eq!(filter.select(&peers).len(), peers.len());
    }

    #[test]
    fn test_empty_snapshot() {
        let peers: Vec<SocketAddr> = vec![];
        assert!(AllPeers.select(&peers).is_empty());
        assert!(RandomSubset::new(2).select(&peers).is_empty());
    }
}
