//! Outbound transfer state machine.
//!
//! While this agent owns a selection, every paste request is answered by a
//! [`Responder`] driving one [`RequestorRecord`] per `(peer, property)` pair.
//! Payloads that fit in one protocol message are written atomically; larger
//! ones go through the incremental sub-protocol: stage an `INCR` placeholder,
//! then write one chunk per property-delete acknowledgement from the peer,
//! finishing with a zero-length chunk. The answer notify is sent once per
//! transfer, when the request is accepted; refusal at any point is a notify
//! with no property.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::engine::chunk::ChunkPolicy;
use crate::engine::diag;
use crate::engine::Outcome;
use crate::proto::atom::{Atom, Atoms};
use crate::proto::codec::{PropertyFormat, PropertyValue};
use crate::proto::display::Display;
use crate::proto::WindowId;

/// Where one outbound transfer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    /// No data staged yet; the next request starts the transfer.
    AwaitingRequest,
    /// Mid-incremental: `offset` bytes already delivered, the next
    /// property-delete acknowledgement sends up to `chunk_size` more.
    Incremental {
        /// Bytes of the payload already written to the peer.
        offset: usize,
        /// Maximum bytes per chunk, fixed when the transfer started.
        chunk_size: usize,
    },
}

/// State for one peer's transfer, keyed by `(peer, property)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestorRecord {
    /// The requesting peer's window.
    pub peer: WindowId,
    /// Destination property on the peer's window.
    pub property: Atom,
    /// Transfer progress.
    pub state: ResponderState,
}

/// Answers paste requests for one owned selection and payload.
pub struct Responder<'a, D: Display + ?Sized> {
    display: &'a D,
    atoms: &'a Atoms,
    selection: Atom,
    target: Atom,
    payload: &'a [u8],
    policy: &'a ChunkPolicy,
}

impl<'a, D: Display + ?Sized> Responder<'a, D> {
    /// A responder serving `payload` as `target` for `selection`.
    pub fn new(
        display: &'a D,
        atoms: &'a Atoms,
        selection: Atom,
        target: Atom,
        payload: &'a [u8],
        policy: &'a ChunkPolicy,
    ) -> Self {
        Self {
            display,
            atoms,
            selection,
            target,
            payload,
            policy,
        }
    }

    /// Answer a TARGETS request: the supported formats, as an atom list.
    ///
    /// TARGETS requests are side-effect free and never create a transfer
    /// record.
    pub fn answer_targets(&self, requestor: WindowId, property: Atom) -> Outcome {
        let value = PropertyValue::atom_list(self.atoms.atom, &[self.atoms.targets, self.target]);
        match self.display.change_property(requestor, property, value) {
            Ok(()) => {
                self.display
                    .send_notify(requestor, self.selection, self.atoms.targets, Some(property));
                self.display.flush();
                Outcome::Complete
            }
            Err(err) => {
                warn!(requestor = %requestor, %err, "failed to stage TARGETS reply");
                self.refuse(requestor, self.atoms.targets);
                Outcome::Refused
            }
        }
    }

    /// Feed a conversion request for the configured target to `record`.
    pub fn handle_request(&self, record: &mut RequestorRecord) -> Outcome {
        match record.state {
            ResponderState::AwaitingRequest => {
                let peer_name = diag::window_title(self.display, record.peer);
                let chunk_size = self
                    .policy
                    .resolve(self.display.max_request_size(), peer_name.as_deref());
                if self.payload.len() > chunk_size {
                    self.start_incremental(record, chunk_size)
                } else {
                    self.answer_atomic(record)
                }
            }
            ResponderState::Incremental { .. } => {
                // Duplicate request for an in-flight pair; the peer will be
                // answered by the chunk stream already running.
                debug!(peer = %record.peer, "ignoring repeat request mid-transfer");
                Outcome::Pending
            }
        }
    }

    /// The peer consumed the staged chunk; send the next one.
    ///
    /// A zero-length chunk (offset past the payload end) terminates the
    /// transfer.
    pub fn handle_property_deleted(&self, record: &mut RequestorRecord) -> Outcome {
        let ResponderState::Incremental { offset, chunk_size } = record.state else {
            debug!(peer = %record.peer, "property delete outside a transfer");
            return Outcome::Pending;
        };
        let start = offset.min(self.payload.len());
        let end = (offset.saturating_add(chunk_size)).min(self.payload.len());
        let chunk = &self.payload[start..end];
        let value = PropertyValue::bytes(self.target, Bytes::copy_from_slice(chunk));
        if let Err(err) = self.display.change_property(record.peer, record.property, value) {
            warn!(peer = %record.peer, %err, "chunk write failed, abandoning transfer");
            self.refuse(record.peer, self.target);
            return Outcome::Refused;
        }
        self.display.flush();
        record.state = ResponderState::Incremental {
            offset: end,
            chunk_size,
        };
        if chunk.is_empty() {
            debug!(peer = %record.peer, total = self.payload.len(), "incremental transfer complete");
            Outcome::Complete
        } else {
            debug!(peer = %record.peer, sent = end, "sent chunk");
            Outcome::Pending
        }
    }

    fn answer_atomic(&self, record: &RequestorRecord) -> Outcome {
        let value = PropertyValue::bytes(self.target, Bytes::copy_from_slice(self.payload));
        match self
            .display
            .change_property(record.peer, record.property, value)
        {
            Ok(()) => {
                self.display.send_notify(
                    record.peer,
                    self.selection,
                    self.target,
                    Some(record.property),
                );
                self.display.flush();
                Outcome::Complete
            }
            Err(err) => {
                warn!(peer = %record.peer, %err, "atomic write failed, refusing");
                self.refuse(record.peer, self.target);
                Outcome::Refused
            }
        }
    }

    fn start_incremental(&self, record: &mut RequestorRecord, chunk_size: usize) -> Outcome {
        let placeholder = PropertyValue {
            type_atom: self.atoms.incr,
            format: PropertyFormat::Format32,
            data: Bytes::new(),
        };
        if let Err(err) = self
            .display
            .change_property(record.peer, record.property, placeholder)
        {
            warn!(peer = %record.peer, %err, "failed to stage INCR placeholder");
            self.refuse(record.peer, self.target);
            return Outcome::Refused;
        }
        // Chunks are paced by the peer deleting the property.
        self.display.watch_properties(record.peer);
        record.state = ResponderState::Incremental {
            offset: 0,
            chunk_size,
        };
        self.display.send_notify(
            record.peer,
            self.selection,
            self.target,
            Some(record.property),
        );
        self.display.flush();
        debug!(peer = %record.peer, chunk_size, total = self.payload.len(), "started incremental transfer");
        Outcome::Pending
    }

    fn refuse(&self, requestor: WindowId, target: Atom) {
        self.display.send_notify(requestor, self.selection, target, None);
        self.display.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::event::Event;
    use crate::proto::loopback::LoopbackServer;
    use std::time::Duration;

    fn record(peer: WindowId, property: Atom) -> RequestorRecord {
        RequestorRecord {
            peer,
            property,
            state: ResponderState::AwaitingRequest,
        }
    }

    #[test]
    fn small_payloads_are_written_atomically() {
        let server = LoopbackServer::new();
        let owner = server.connect();
        let peer = server.connect();
        let atoms = Atoms::intern(&owner);
        let sel = owner.intern_atom("PRIMARY");
        let prop = owner.intern_atom("DEST");
        let policy = ChunkPolicy::default();

        let responder = Responder::new(&owner, &atoms, sel, atoms.utf8_string, b"hello", &policy);
        let mut rec = record(peer.window(), prop);
        assert_eq!(responder.handle_request(&mut rec), Outcome::Complete);

        let writes = server.writes_to(peer.window(), prop);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len, 5);
        assert_eq!(writes[0].type_atom, atoms.utf8_string);

        // Skip the property notify the peer's own watch would see.
        let notify = loop {
            match peer.next_event(Some(Duration::from_millis(100))) {
                Some(Event::SelectionNotify { property, .. }) => break property,
                Some(_) => continue,
                None => panic!("no notify"),
            }
        };
        assert_eq!(notify, Some(prop));
    }

    #[test]
    fn oversized_payloads_stage_an_incr_placeholder() {
        let server = LoopbackServer::with_max_request_size(2048);
        let owner = server.connect();
        let peer = server.connect();
        let atoms = Atoms::intern(&owner);
        let sel = owner.intern_atom("PRIMARY");
        let prop = owner.intern_atom("DEST");
        let policy = ChunkPolicy::default();

        let payload = vec![7u8; 5000];
        let responder =
            Responder::new(&owner, &atoms, sel, atoms.utf8_string, &payload, &policy);
        let mut rec = record(peer.window(), prop);
        assert_eq!(responder.handle_request(&mut rec), Outcome::Pending);
        assert_eq!(
            rec.state,
            ResponderState::Incremental {
                offset: 0,
                chunk_size: 1024,
            }
        );

        let writes = server.writes_to(peer.window(), prop);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].type_atom, atoms.incr);
        assert_eq!(writes[0].len, 0);
    }

    #[test]
    fn delete_acknowledgements_pace_the_chunk_stream() {
        let server = LoopbackServer::with_max_request_size(2048);
        let owner = server.connect();
        let peer = server.connect();
        let atoms = Atoms::intern(&owner);
        let sel = owner.intern_atom("PRIMARY");
        let prop = owner.intern_atom("DEST");
        let policy = ChunkPolicy::default();

        let payload: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let responder =
            Responder::new(&owner, &atoms, sel, atoms.utf8_string, &payload, &policy);
        let mut rec = record(peer.window(), prop);
        assert_eq!(responder.handle_request(&mut rec), Outcome::Pending);

        // 2500 bytes at 1024 per chunk: 1024, 1024, 452, then the terminator.
        assert_eq!(responder.handle_property_deleted(&mut rec), Outcome::Pending);
        assert_eq!(responder.handle_property_deleted(&mut rec), Outcome::Pending);
        assert_eq!(responder.handle_property_deleted(&mut rec), Outcome::Pending);
        assert_eq!(responder.handle_property_deleted(&mut rec), Outcome::Complete);

        let lens: Vec<usize> = server
            .writes_to(peer.window(), prop)
            .iter()
            .skip(1)
            .map(|w| w.len)
            .collect();
        assert_eq!(lens, vec![1024, 1024, 452, 0]);
    }

    #[test]
    fn write_failure_refuses_with_an_empty_notify() {
        let server = LoopbackServer::new();
        let owner = server.connect();
        let peer = server.connect();
        let atoms = Atoms::intern(&owner);
        let sel = owner.intern_atom("PRIMARY");
        let prop = owner.intern_atom("DEST");
        let policy = ChunkPolicy::default();

        server.fail_writes_to(peer.window());
        let responder = Responder::new(&owner, &atoms, sel, atoms.utf8_string, b"data", &policy);
        let mut rec = record(peer.window(), prop);
        assert_eq!(responder.handle_request(&mut rec), Outcome::Refused);

        assert_eq!(
            peer.next_event(Some(Duration::from_millis(100))),
            Some(Event::SelectionNotify {
                requestor: peer.window(),
                selection: sel,
                target: atoms.utf8_string,
                property: None,
            })
        );
    }

    #[test]
    fn targets_reply_lists_supported_formats() {
        let server = LoopbackServer::new();
        let owner = server.connect();
        let peer = server.connect();
        let atoms = Atoms::intern(&owner);
        let sel = owner.intern_atom("PRIMARY");
        let prop = owner.intern_atom("DEST");
        let policy = ChunkPolicy::default();

        let responder = Responder::new(&owner, &atoms, sel, atoms.utf8_string, b"x", &policy);
        assert_eq!(
            responder.answer_targets(peer.window(), prop),
            Outcome::Complete
        );

        let value = peer.read_property(peer.window(), prop).unwrap();
        assert_eq!(value.type_atom, atoms.atom);
        assert_eq!(
            value.decode_atom_list(),
            vec![atoms.targets, atoms.utf8_string]
        );
    }
}
