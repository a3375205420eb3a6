//! In-process virtual display.
//!
//! [`LoopbackServer`] implements the selection-protocol semantics the engine
//! depends on: windows, per-window properties, property-change notification,
//! and selection ownership with revocation events, carried over crossbeam
//! channels with one event queue per connection. It exists so the
//! whole transfer engine can be exercised end to end without a live window
//! system: tests connect an owner and any number of requestors to the same
//! server and let the state machines talk to each other.
//!
//! Fault injection mirrors the failure modes a real server produces:
//! [`LoopbackServer::kill_window`] makes subsequent writes to that window
//! fail with a bad-window report (and silent liveness probes answer no), and
//! [`LoopbackServer::fail_writes_to`] simulates the peer-side allocation
//! failure that obliges an owner to refuse a conversion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{ErrorKind, ProtocolError};
use crate::proto::atom::Atom;
use crate::proto::codec::{PropertyFormat, PropertyValue};
use crate::proto::display::Display;
use crate::proto::event::{Event, PropertyState};
use crate::proto::WindowId;

/// Default maximum single-message size, in bytes.
const DEFAULT_MAX_REQUEST_SIZE: usize = 256 * 1024;

/// Reserved room for the message header of a property write.
const WRITE_HEADER_BYTES: usize = 32;

type ClientId = u32;

/// One recorded property write, for test instrumentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyWrite {
    /// Window the property was written on.
    pub window: WindowId,
    /// The property that was written.
    pub property: Atom,
    /// Declared type of the value.
    pub type_atom: Atom,
    /// Declared element format of the value.
    pub format: PropertyFormat,
    /// Payload length in bytes.
    pub len: usize,
}

struct WindowState {
    client: ClientId,
    parent: Option<WindowId>,
    name: Option<String>,
    properties: HashMap<Atom, PropertyValue>,
    watchers: HashSet<ClientId>,
}

struct ServerState {
    next_client: ClientId,
    next_window: u32,
    next_atom: u32,
    atoms: HashMap<String, Atom>,
    atom_names: HashMap<Atom, String>,
    windows: HashMap<WindowId, WindowState>,
    dead: HashSet<WindowId>,
    alloc_fail: HashSet<WindowId>,
    selections: HashMap<Atom, WindowId>,
    clients: HashMap<ClientId, Sender<Event>>,
    write_log: Vec<PropertyWrite>,
    max_request_size: usize,
}

impl ServerState {
    fn alive(&self, window: WindowId) -> bool {
        self.windows.contains_key(&window) && !self.dead.contains(&window)
    }

    fn send_to_client(&self, client: ClientId, event: Event) {
        if let Some(tx) = self.clients.get(&client) {
            let _ = tx.send(event);
        }
    }

    fn notify_watchers(&self, window: WindowId, property: Atom, state: PropertyState) {
        let Some(win) = self.windows.get(&window) else {
            return;
        };
        for client in &win.watchers {
            self.send_to_client(
                *client,
                Event::PropertyNotify {
                    window,
                    property,
                    state,
                },
            );
        }
    }
}

/// An in-process display server shared by any number of connections.
#[derive(Clone)]
pub struct LoopbackServer {
    inner: Arc<Mutex<ServerState>>,
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackServer {
    /// A server with the default maximum message size.
    pub fn new() -> Self {
        Self::with_max_request_size(DEFAULT_MAX_REQUEST_SIZE)
    }

    /// A server whose transport accepts at most `bytes` per message.
    ///
    /// Tests use small values here to force incremental transfers without
    /// multi-megabyte fixtures.
    pub fn with_max_request_size(bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServerState {
                next_client: 1,
                next_window: 1,
                next_atom: 1,
                atoms: HashMap::new(),
                atom_names: HashMap::new(),
                windows: HashMap::new(),
                dead: HashSet::new(),
                alloc_fail: HashSet::new(),
                selections: HashMap::new(),
                clients: HashMap::new(),
                write_log: Vec::new(),
                max_request_size: bytes,
            })),
        }
    }

    /// Open a new connection with its own window and event queue.
    pub fn connect(&self) -> LoopbackDisplay {
        let (tx, rx) = unbounded();
        let mut st = self.inner.lock();
        let client = st.next_client;
        st.next_client += 1;
        let window = WindowId(st.next_window);
        st.next_window += 1;
        st.clients.insert(client, tx.clone());
        st.windows.insert(
            window,
            WindowState {
                client,
                parent: None,
                name: None,
                properties: HashMap::new(),
                watchers: HashSet::new(),
            },
        );
        LoopbackDisplay {
            inner: Arc::clone(&self.inner),
            client,
            window,
            tx,
            rx,
            last_error: Mutex::new(None),
        }
    }

    /// Give `window` a human-readable name, as window managers do.
    pub fn set_window_name(&self, window: WindowId, name: &str) {
        if let Some(win) = self.inner.lock().windows.get_mut(&window) {
            win.name = Some(name.to_owned());
        }
    }

    /// Reparent `window` under `parent` (for ancestor-walk name lookups).
    pub fn set_window_parent(&self, window: WindowId, parent: WindowId) {
        if let Some(win) = self.inner.lock().windows.get_mut(&window) {
            win.parent = Some(parent);
        }
    }

    /// Make `window` disappear: writes to it fail with a bad-window report
    /// and liveness probes answer no.
    pub fn kill_window(&self, window: WindowId) {
        self.inner.lock().dead.insert(window);
    }

    /// Make property writes to `window` fail with an allocation error.
    pub fn fail_writes_to(&self, window: WindowId) {
        self.inner.lock().alloc_fail.insert(window);
    }

    /// Snapshot of every property write the server has accepted.
    pub fn write_log(&self) -> Vec<PropertyWrite> {
        self.inner.lock().write_log.clone()
    }

    /// Writes accepted for one (window, property) destination, in order.
    pub fn writes_to(&self, window: WindowId, property: Atom) -> Vec<PropertyWrite> {
        self.inner
            .lock()
            .write_log
            .iter()
            .filter(|w| w.window == window && w.property == property)
            .cloned()
            .collect()
    }
}

/// One client connection to a [`LoopbackServer`].
pub struct LoopbackDisplay {
    inner: Arc<Mutex<ServerState>>,
    client: ClientId,
    window: WindowId,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    last_error: Mutex<Option<ProtocolError>>,
}

impl LoopbackDisplay {
    fn record_error(&self, error: ProtocolError) {
        let wake = error.kind == ErrorKind::BadWindow;
        *self.last_error.lock() = Some(error);
        if wake {
            // Break the owner of this connection out of a blocked wait so it
            // can drop the vanished peer before the id gets reused.
            let _ = self.tx.send(Event::WakeUp);
        }
    }
}

impl Display for LoopbackDisplay {
    fn window(&self) -> WindowId {
        self.window
    }

    fn intern_atom(&self, name: &str) -> Atom {
        let mut st = self.inner.lock();
        if let Some(atom) = st.atoms.get(name) {
            return *atom;
        }
        let atom = Atom(st.next_atom);
        st.next_atom += 1;
        st.atoms.insert(name.to_owned(), atom);
        st.atom_names.insert(atom, name.to_owned());
        atom
    }

    fn atom_name(&self, atom: Atom) -> Option<String> {
        self.inner.lock().atom_names.get(&atom).cloned()
    }

    fn set_selection_owner(&self, selection: Atom, owner: Option<WindowId>) {
        let mut st = self.inner.lock();
        let prev = st.selections.get(&selection).copied();
        match owner {
            Some(window) => {
                st.selections.insert(selection, window);
            }
            None => {
                st.selections.remove(&selection);
            }
        }
        // The displaced owner learns about the revocation, unless it was the
        // one doing the displacing.
        if let Some(prev_win) = prev {
            if owner != Some(prev_win) {
                if let Some(win) = st.windows.get(&prev_win) {
                    if win.client != self.client {
                        st.send_to_client(win.client, Event::SelectionClear { selection });
                    }
                }
            }
        }
    }

    fn selection_owner(&self, selection: Atom) -> Option<WindowId> {
        let st = self.inner.lock();
        st.selections
            .get(&selection)
            .copied()
            .filter(|w| st.alive(*w))
    }

    fn convert_selection(&self, selection: Atom, target: Atom, property: Atom) {
        let st = self.inner.lock();
        let owner = st.selections.get(&selection).copied().filter(|w| st.alive(*w));
        match owner.and_then(|w| st.windows.get(&w)) {
            Some(win) => {
                st.send_to_client(
                    win.client,
                    Event::SelectionRequest {
                        requestor: self.window,
                        selection,
                        target,
                        property,
                    },
                );
            }
            None => {
                // No owner to answer: the server refuses on its behalf.
                let _ = self.tx.send(Event::SelectionNotify {
                    requestor: self.window,
                    selection,
                    target,
                    property: None,
                });
            }
        }
    }

    fn change_property(
        &self,
        window: WindowId,
        property: Atom,
        value: PropertyValue,
    ) -> Result<(), ProtocolError> {
        self.clear_error();
        let mut st = self.inner.lock();
        if !st.alive(window) {
            let err = ProtocolError::new(ErrorKind::BadWindow, Some(window));
            drop(st);
            self.record_error(err.clone());
            return Err(err);
        }
        if st.alloc_fail.contains(&window) {
            let err = ProtocolError::new(ErrorKind::AllocFailed, Some(window));
            drop(st);
            self.record_error(err.clone());
            return Err(err);
        }
        if value.data.len() + WRITE_HEADER_BYTES > st.max_request_size {
            let err = ProtocolError::new(ErrorKind::LengthExceeded, Some(window));
            drop(st);
            self.record_error(err.clone());
            return Err(err);
        }
        st.write_log.push(PropertyWrite {
            window,
            property,
            type_atom: value.type_atom,
            format: value.format,
            len: value.data.len(),
        });
        if let Some(win) = st.windows.get_mut(&window) {
            win.properties.insert(property, value);
        }
        st.notify_watchers(window, property, PropertyState::NewValue);
        Ok(())
    }

    fn delete_property(&self, window: WindowId, property: Atom) {
        let mut st = self.inner.lock();
        if !st.alive(window) {
            return;
        }
        let removed = st
            .windows
            .get_mut(&window)
            .map(|win| win.properties.remove(&property).is_some())
            .unwrap_or(false);
        if removed {
            st.notify_watchers(window, property, PropertyState::Deleted);
        }
    }

    fn property_info(&self, window: WindowId, property: Atom) -> Option<(Atom, usize)> {
        let st = self.inner.lock();
        if !st.alive(window) {
            return None;
        }
        st.windows
            .get(&window)?
            .properties
            .get(&property)
            .map(|v| (v.type_atom, v.byte_len()))
    }

    fn read_property(&self, window: WindowId, property: Atom) -> Option<PropertyValue> {
        let st = self.inner.lock();
        if !st.alive(window) {
            return None;
        }
        st.windows.get(&window)?.properties.get(&property).cloned()
    }

    fn watch_properties(&self, window: WindowId) {
        let mut st = self.inner.lock();
        if !st.alive(window) {
            return;
        }
        if let Some(win) = st.windows.get_mut(&window) {
            win.watchers.insert(self.client);
        }
    }

    fn send_notify(
        &self,
        requestor: WindowId,
        selection: Atom,
        target: Atom,
        property: Option<Atom>,
    ) {
        let st = self.inner.lock();
        if !st.alive(requestor) {
            drop(st);
            self.record_error(ProtocolError::new(ErrorKind::BadWindow, Some(requestor)));
            return;
        }
        if let Some(win) = st.windows.get(&requestor) {
            st.send_to_client(
                win.client,
                Event::SelectionNotify {
                    requestor,
                    selection,
                    target,
                    property,
                },
            );
        }
    }

    fn next_event(&self, timeout: Option<Duration>) -> Option<Event> {
        match timeout {
            None => self.rx.recv().ok(),
            Some(limit) => self.rx.recv_timeout(limit).ok(),
        }
    }

    fn flush(&self) {
        // Requests are applied synchronously; nothing is buffered.
    }

    fn max_request_size(&self) -> usize {
        self.inner.lock().max_request_size
    }

    fn window_exists(&self, window: WindowId) -> bool {
        self.inner.lock().alive(window)
    }

    fn window_name(&self, window: WindowId) -> Option<String> {
        let st = self.inner.lock();
        if !st.alive(window) {
            return None;
        }
        st.windows.get(&window)?.name.clone()
    }

    fn window_parent(&self, window: WindowId) -> Option<WindowId> {
        let st = self.inner.lock();
        if !st.alive(window) {
            return None;
        }
        st.windows.get(&window)?.parent
    }

    fn post_wakeup(&self) {
        let _ = self.tx.send(Event::WakeUp);
    }

    fn take_error(&self) -> Option<ProtocolError> {
        self.last_error.lock().take()
    }

    fn clear_error(&self) {
        *self.last_error.lock() = None;
    }
}
