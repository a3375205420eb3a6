//! The display connection seam.
//!
//! [`Display`] covers exactly the wire operations the transfer engine needs:
//! selection ownership, conversion requests, property staging, the blocking
//! event wait, and the liveness/name probes used for peer bookkeeping and
//! error reporting. The engine is generic over this trait, so it can run
//! against the in-process [`loopback`](crate::proto::loopback) transport in
//! tests or against a real window-system backend supplied by an embedder.

use std::time::Duration;

use crate::error::ProtocolError;
use crate::proto::atom::Atom;
use crate::proto::codec::PropertyValue;
use crate::proto::event::Event;
use crate::proto::WindowId;

/// A connection to a display server, scoped to one agent window.
///
/// # Error flag
///
/// Property writes are confirmed synchronously: [`Display::change_property`]
/// round-trips to the server and reports a failure (peer-side allocation
/// failure, vanished peer window) as an `Err`. The same report is also left
/// in the connection's error slot so callers following the
/// clear-before/inspect-after discipline can pick it up with
/// [`Display::take_error`]. A bad-window report additionally posts a
/// [`Event::WakeUp`] to the connection's own queue so a blocked
/// [`Display::next_event`] returns promptly instead of waiting on a peer
/// that no longer exists.
pub trait Display {
    /// The agent's own window on this connection.
    fn window(&self) -> WindowId;

    /// Intern `name`, returning its atom.
    fn intern_atom(&self, name: &str) -> Atom;

    /// Resolve an atom back to its name, if interned.
    fn atom_name(&self, atom: Atom) -> Option<String>;

    /// Claim or release ownership of `selection` for `owner`.
    fn set_selection_owner(&self, selection: Atom, owner: Option<WindowId>);

    /// Query the current owner of `selection`.
    fn selection_owner(&self, selection: Atom) -> Option<WindowId>;

    /// Ask the current owner of `selection` to stage its content, converted
    /// to `target`, on `property` of this connection's window.
    fn convert_selection(&self, selection: Atom, target: Atom, property: Atom);

    /// Write a property on `window`, replacing any previous value.
    ///
    /// Confirmed synchronously; see the trait-level notes on the error flag.
    fn change_property(
        &self,
        window: WindowId,
        property: Atom,
        value: PropertyValue,
    ) -> Result<(), ProtocolError>;

    /// Delete a property on `window`. Watchers observe a deletion event.
    fn delete_property(&self, window: WindowId, property: Atom);

    /// Probe a property's type and byte size without reading its data.
    fn property_info(&self, window: WindowId, property: Atom) -> Option<(Atom, usize)>;

    /// Read a property's full value.
    fn read_property(&self, window: WindowId, property: Atom) -> Option<PropertyValue>;

    /// Subscribe this connection to property-change events on `window`.
    fn watch_properties(&self, window: WindowId);

    /// Deliver a conversion answer to `requestor`. `property: None` refuses.
    fn send_notify(
        &self,
        requestor: WindowId,
        selection: Atom,
        target: Atom,
        property: Option<Atom>,
    );

    /// Block until the next event arrives, or until `timeout` elapses.
    ///
    /// `None` as a timeout blocks indefinitely; a `None` return means the
    /// wait timed out.
    fn next_event(&self, timeout: Option<Duration>) -> Option<Event>;

    /// Flush any buffered requests to the server.
    fn flush(&self);

    /// Maximum size in bytes of a single protocol message.
    fn max_request_size(&self) -> usize;

    /// Silent liveness probe: does `window` still exist?
    ///
    /// Never records into the error slot and never logs; used by the
    /// registry sweep where a vanished peer is expected, not exceptional.
    fn window_exists(&self, window: WindowId) -> bool;

    /// The window's human-readable name, if it has one.
    fn window_name(&self, window: WindowId) -> Option<String>;

    /// The window's parent, or `None` at the root.
    fn window_parent(&self, window: WindowId) -> Option<WindowId>;

    /// Post a [`Event::WakeUp`] to this connection's own event queue.
    fn post_wakeup(&self);

    /// Take and clear the most recent protocol error report.
    fn take_error(&self) -> Option<ProtocolError>;

    /// Clear the error slot without inspecting it.
    fn clear_error(&self);
}
