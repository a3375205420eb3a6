//! Wire-level protocol model.
//!
//! This module defines the subset of the windowing protocol the selection
//! engine actually touches: interned atoms, the event vocabulary, property
//! values with their element-width rules, and the [`Display`] trait that is
//! the seam between the engine and a concrete transport. The only transport
//! shipped in this crate is [`loopback`], an in-process virtual display used
//! by the test suite and by embedders that want to move data between two
//! engine instances without a live window system.

pub mod atom;
pub mod codec;
pub mod display;
pub mod event;
pub mod loopback;

pub use atom::{names, Atom, Atoms};
pub use codec::{PropertyFormat, PropertyValue};
pub use display::Display;
pub use event::{Event, PropertyState};

use std::fmt;

/// An opaque window handle.
///
/// Windows identify the two parties of a transfer: the owner's window and
/// each requestor's window. The engine never creates windows other than its
/// own; peer handles arrive inside protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}
