//! Per-peer outbound transfer records.
//!
//! A peer may run several conversions at once as long as each uses its own
//! destination property, so records are keyed by the `(peer window,
//! destination property)` pair. Records are created on the first request for
//! a pair, dropped when the transfer completes or is refused, and swept when
//! the peer window vanishes mid-transfer.

use std::collections::HashMap;

use tracing::debug;

use crate::engine::responder::{RequestorRecord, ResponderState};
use crate::proto::display::Display;
use crate::proto::{Atom, WindowId};

/// Live outbound transfers, keyed by `(peer window, destination property)`.
#[derive(Debug, Default)]
pub struct RequestorRegistry {
    records: HashMap<(WindowId, Atom), RequestorRecord>,
}

impl RequestorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for `(peer, property)`, created in the initial state if
    /// this is the first request for the pair.
    pub fn get_or_insert(&mut self, peer: WindowId, property: Atom) -> &mut RequestorRecord {
        self.records
            .entry((peer, property))
            .or_insert_with(|| RequestorRecord {
                peer,
                property,
                state: ResponderState::AwaitingRequest,
            })
    }

    /// The record for `(peer, property)`, if one is live.
    pub fn get_mut(&mut self, peer: WindowId, property: Atom) -> Option<&mut RequestorRecord> {
        self.records.get_mut(&(peer, property))
    }

    /// Drop the record for `(peer, property)`.
    pub fn remove(&mut self, peer: WindowId, property: Atom) {
        self.records.remove(&(peer, property));
    }

    /// Whether any transfer for `peer` is still live, on any property.
    pub fn has_peer(&self, peer: WindowId) -> bool {
        self.records.keys().any(|(w, _)| *w == peer)
    }

    /// Number of live transfers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no transfer is live.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record whose peer window no longer exists.
    ///
    /// Returns the number of records dropped. Uses the silent liveness probe:
    /// peers vanishing mid-transfer is routine, not an error.
    pub fn sweep<D: Display + ?Sized>(&mut self, display: &D) -> usize {
        let before = self.records.len();
        self.records.retain(|(peer, property), _| {
            let alive = display.window_exists(*peer);
            if !alive {
                debug!(peer = %peer, property = ?property, "dropping transfer to vanished peer");
            }
            alive
        });
        before - self.records.len()
    }
}
