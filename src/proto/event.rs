//! The protocol event vocabulary.
//!
//! Only the events the selection engine consumes are modelled. Everything
//! else a real transport might deliver is simply never constructed by the
//! loopback display, and a future transport backend is expected to filter
//! before handing events to the engine.

use crate::proto::atom::Atom;
use crate::proto::WindowId;

/// State change reported by a property notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyState {
    /// The property was written with a new value.
    NewValue,
    /// The property was deleted.
    Deleted,
}

/// A protocol event routed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A peer asks the current owner to convert a selection into the given
    /// target and stage it on `property` of the requestor's window.
    SelectionRequest {
        /// Window of the requesting peer.
        requestor: WindowId,
        /// Which selection is being requested.
        selection: Atom,
        /// Requested content format.
        target: Atom,
        /// Destination property on the requestor's window.
        property: Atom,
    },

    /// The owner's answer to a conversion request. `property: None` signals
    /// refusal: the owner cannot produce the requested target.
    SelectionNotify {
        /// Window of the requesting peer (the event's destination).
        requestor: WindowId,
        /// Which selection was requested.
        selection: Atom,
        /// The target that was requested.
        target: Atom,
        /// Where the data was staged, or `None` on refusal.
        property: Option<Atom>,
    },

    /// A watched window's property changed.
    PropertyNotify {
        /// The window whose property changed.
        window: WindowId,
        /// The property in question.
        property: Atom,
        /// Whether it gained a new value or was deleted.
        state: PropertyState,
    },

    /// Another process took ownership of a selection this agent held.
    SelectionClear {
        /// The selection that was revoked.
        selection: Atom,
    },

    /// Private self-directed message used to break a blocked event wait,
    /// e.g. after an asynchronous bad-window report.
    WakeUp,
}
