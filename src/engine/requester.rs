//! Inbound transfer state machine.
//!
//! A [`Fetcher`] asks the current owner of a selection to stage its content
//! on this agent's staging property, then reassembles the answer. Atomic
//! answers finish in one read; an `INCR`-typed answer switches to the
//! incremental sub-protocol, where each property delete acknowledges the
//! previous chunk and a zero-size write terminates the stream. A notify
//! without a property means the owner cannot produce the target; mid-stream
//! it means the owner gave up.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::proto::atom::{Atom, Atoms};
use crate::proto::display::Display;
use crate::proto::event::{Event, PropertyState};

/// Where an inbound transfer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    /// Not started, or finished.
    Idle,
    /// Conversion requested, waiting for the owner's notify.
    SentRequest,
    /// Mid-incremental, waiting for the next chunk write.
    Incremental,
    /// The owner refused the requested target outright.
    BadTarget,
    /// The owner abandoned the transfer mid-stream.
    Refused,
}

/// Result of feeding one event to a [`Fetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// More events are needed.
    Pending,
    /// The full payload has been reassembled.
    Complete,
    /// The owner cannot produce the requested target; the caller may retry
    /// with a fallback target.
    BadTarget,
    /// The owner gave up mid-transfer; no retry will help.
    Refused,
}

/// Fetches one selection's content from its current owner.
pub struct Fetcher<'a, D: Display + ?Sized> {
    display: &'a D,
    atoms: &'a Atoms,
    selection: Atom,
    target: Atom,
    property: Atom,
    state: FetchState,
    buf: BytesMut,
    value_type: Option<Atom>,
}

impl<'a, D: Display + ?Sized> Fetcher<'a, D> {
    /// A fetcher for `selection` converted to `target`, staging on the
    /// agent's private property.
    pub fn new(display: &'a D, atoms: &'a Atoms, selection: Atom, target: Atom) -> Self {
        Self {
            display,
            atoms,
            selection,
            target,
            property: atoms.staging,
            state: FetchState::Idle,
            buf: BytesMut::new(),
            value_type: None,
        }
    }

    /// Issue the conversion request.
    pub fn start(&mut self) {
        self.buf.clear();
        self.value_type = None;
        self.display.watch_properties(self.display.window());
        self.display
            .convert_selection(self.selection, self.target, self.property);
        self.display.flush();
        self.state = FetchState::SentRequest;
    }

    /// Restart the fetch with a different target (the fallback path).
    pub fn restart_with(&mut self, target: Atom) {
        debug!(from = ?self.target, to = ?target, "retrying fetch with fallback target");
        self.target = target;
        self.start();
    }

    /// The target currently being fetched.
    pub fn target(&self) -> Atom {
        self.target
    }

    /// Feed one protocol event to the state machine.
    pub fn step(&mut self, event: &Event) -> FetchOutcome {
        match self.state {
            FetchState::SentRequest => self.step_sent_request(event),
            FetchState::Incremental => self.step_incremental(event),
            _ => FetchOutcome::Pending,
        }
    }

    /// The reassembled payload and the type the owner declared for it.
    pub fn into_result(self) -> (Bytes, Option<Atom>) {
        (self.buf.freeze(), self.value_type)
    }

    fn step_sent_request(&mut self, event: &Event) -> FetchOutcome {
        match event {
            Event::SelectionNotify {
                requestor,
                property,
                ..
            } if *requestor == self.display.window() => {
                if property.is_none() {
                    self.state = FetchState::BadTarget;
                    return FetchOutcome::BadTarget;
                }
                self.read_answer()
            }
            other => {
                debug!(event = ?other, "ignoring event while awaiting notify");
                FetchOutcome::Pending
            }
        }
    }

    fn step_incremental(&mut self, event: &Event) -> FetchOutcome {
        match event {
            Event::SelectionNotify { property: None, .. } => {
                self.state = FetchState::Refused;
                FetchOutcome::Refused
            }
            Event::PropertyNotify {
                window,
                property,
                state: PropertyState::NewValue,
            } if *window == self.display.window() && *property == self.property => {
                self.read_chunk()
            }
            _ => FetchOutcome::Pending,
        }
    }

    /// First read after the owner's notify: either the whole payload, or the
    /// `INCR` placeholder announcing a chunked stream.
    fn read_answer(&mut self) -> FetchOutcome {
        let window = self.display.window();
        match self.display.property_info(window, self.property) {
            Some((type_atom, _)) if type_atom == self.atoms.incr => {
                self.state = FetchState::Incremental;
                // Deleting the placeholder tells the owner to start sending.
                self.display.delete_property(window, self.property);
                self.display.flush();
                debug!("owner announced an incremental transfer");
                FetchOutcome::Pending
            }
            Some(_) => {
                self.append_staged();
                self.display.delete_property(window, self.property);
                self.display.flush();
                self.state = FetchState::Idle;
                FetchOutcome::Complete
            }
            None => {
                // Notify without a staged value: treat as an empty payload.
                self.state = FetchState::Idle;
                FetchOutcome::Complete
            }
        }
    }

    fn read_chunk(&mut self) -> FetchOutcome {
        let window = self.display.window();
        match self.display.property_info(window, self.property) {
            Some((_, 0)) => {
                // Zero-size chunk terminates the stream.
                self.display.delete_property(window, self.property);
                self.display.flush();
                self.state = FetchState::Idle;
                debug!(total = self.buf.len(), "incremental transfer complete");
                FetchOutcome::Complete
            }
            Some(_) => {
                self.append_staged();
                self.display.delete_property(window, self.property);
                self.display.flush();
                FetchOutcome::Pending
            }
            None => FetchOutcome::Pending,
        }
    }

    fn append_staged(&mut self) {
        if let Some(value) = self.display.read_property(self.display.window(), self.property) {
            self.value_type = Some(value.type_atom);
            // byte_len floors partial trailing elements for wide formats.
            self.buf.extend_from_slice(&value.data[..value.byte_len()]);
        }
    }
}
