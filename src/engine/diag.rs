//! Peer descriptions for diagnostics.
//!
//! Error messages name the peer window a transfer failed against. Windows
//! rarely carry a name themselves, so the lookup walks up the ancestor chain
//! until it finds one, and falls back to the bare id when the whole chain is
//! nameless or the window is already gone.

use crate::proto::display::Display;
use crate::proto::{Atom, WindowId};

/// Upper bound on the ancestor walk, in case a backend reports a cycle.
const MAX_ANCESTOR_DEPTH: usize = 32;

/// The name of `window`, or the nearest named ancestor's name.
pub fn window_title<D: Display + ?Sized>(display: &D, window: WindowId) -> Option<String> {
    let mut cursor = Some(window);
    for _ in 0..MAX_ANCESTOR_DEPTH {
        let current = cursor?;
        if let Some(name) = display.window_name(current) {
            return Some(name);
        }
        cursor = display.window_parent(current);
    }
    None
}

/// A human-readable description of `window`: `'Name' (0x2a)` when a name is
/// found on the window or one of its ancestors, `window id 0x2a` otherwise.
pub fn window_description<D: Display + ?Sized>(display: &D, window: WindowId) -> String {
    match window_title(display, window) {
        Some(name) => format!("'{name}' ({window})"),
        None => format!("window id {window}"),
    }
}

/// Describe the current owner of `selection`, if it has one.
pub fn selection_owner_description<D: Display + ?Sized>(
    display: &D,
    selection: Atom,
) -> Option<String> {
    display
        .selection_owner(selection)
        .map(|owner| window_description(display, owner))
}
