//! Incremental chunk sizing.
//!
//! A single property write must fit in one protocol message, so the baseline
//! chunk size is the transport's maximum request size minus a fixed margin
//! for the message header. On top of that sit two caps: an optional global
//! one, and per-peer caps keyed by window name for clients whose property
//! reads choke on very large chunks. `xsel` is the known offender and gets a
//! 4,000,000 byte cap by default.

use std::collections::HashMap;

/// Fixed allowance for the property-write message header.
const HEADER_MARGIN: usize = 1024;

/// Chunk cap applied to `xsel` peers.
const XSEL_CAP: usize = 4_000_000;

/// Policy deciding the maximum incremental chunk size for a transfer.
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    /// Bytes reserved for the message header of each write.
    pub header_margin: usize,
    /// Cap applied to every transfer regardless of the peer, if set.
    pub global_cap: Option<usize>,
    /// Caps applied when the peer window's name matches a key exactly.
    pub per_peer: HashMap<String, usize>,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        let mut per_peer = HashMap::new();
        per_peer.insert("xsel".to_owned(), XSEL_CAP);
        Self {
            header_margin: HEADER_MARGIN,
            global_cap: None,
            per_peer,
        }
    }
}

impl ChunkPolicy {
    /// A policy with no caps at all, header margin only.
    pub fn unrestricted() -> Self {
        Self {
            header_margin: HEADER_MARGIN,
            global_cap: None,
            per_peer: HashMap::new(),
        }
    }

    /// The chunk size to use against a transport whose maximum message size
    /// is `max_request_size`, talking to a peer named `peer_name`.
    ///
    /// Never returns zero, even for absurdly small transports.
    pub fn resolve(&self, max_request_size: usize, peer_name: Option<&str>) -> usize {
        let mut chunk = max_request_size.saturating_sub(self.header_margin);
        if let Some(cap) = self.global_cap {
            chunk = chunk.min(cap);
        }
        if let Some(cap) = peer_name.and_then(|name| self.per_peer.get(name)) {
            chunk = chunk.min(*cap);
        }
        chunk.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_is_max_request_minus_margin() {
        let policy = ChunkPolicy::default();
        assert_eq!(policy.resolve(262_144, None), 262_144 - 1024);
    }

    #[test]
    fn xsel_peers_are_capped_by_default() {
        let policy = ChunkPolicy::default();
        assert_eq!(policy.resolve(16_777_216, Some("xsel")), 4_000_000);
        assert_eq!(policy.resolve(16_777_216, Some("xterm")), 16_777_216 - 1024);
        assert_eq!(policy.resolve(16_777_216, None), 16_777_216 - 1024);
    }

    #[test]
    fn peer_cap_only_applies_below_the_baseline() {
        let policy = ChunkPolicy::default();
        // Transport smaller than the cap: the transport wins.
        assert_eq!(policy.resolve(262_144, Some("xsel")), 262_144 - 1024);
    }

    #[test]
    fn global_cap_applies_to_everyone() {
        let policy = ChunkPolicy {
            global_cap: Some(4096),
            ..ChunkPolicy::default()
        };
        assert_eq!(policy.resolve(262_144, None), 4096);
        assert_eq!(policy.resolve(262_144, Some("xterm")), 4096);
    }

    #[test]
    fn resolve_never_returns_zero() {
        let policy = ChunkPolicy::default();
        assert_eq!(policy.resolve(16, None), 1);
        assert_eq!(policy.resolve(0, None), 1);
    }
}
