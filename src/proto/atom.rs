//! Atom interning model.
//!
//! Atoms are small integers naming strings interned on the display
//! connection. The engine only ever deals with a fixed vocabulary of
//! well-known names plus whatever custom target the caller asks for, so the
//! usual pattern is to intern the whole set once at startup via
//! [`Atoms::intern`] and pass the struct around by reference.

use crate::proto::display::Display;

/// An interned protocol atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

/// Well-known atom names used by the selection transfer protocol.
pub mod names {
    /// The primary selection.
    pub const PRIMARY: &str = "PRIMARY";
    /// The secondary selection.
    pub const SECONDARY: &str = "SECONDARY";
    /// The clipboard selection.
    pub const CLIPBOARD: &str = "CLIPBOARD";
    /// The reserved "list supported formats" pseudo-target.
    pub const TARGETS: &str = "TARGETS";
    /// The reserved incremental-transfer type tag.
    pub const INCR: &str = "INCR";
    /// UTF-8 text, the default content target.
    pub const UTF8_STRING: &str = "UTF8_STRING";
    /// Legacy Latin-1 text, the single-level fallback target.
    pub const STRING: &str = "STRING";
    /// The type tag of an atom-list property (the TARGETS reply).
    pub const ATOM: &str = "ATOM";
    /// The agent's private staging property for inbound transfers.
    pub const STAGING_PROPERTY: &str = "SELAGENT_OUT";
}

/// The well-known atoms, interned once per connection.
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    /// `TARGETS` pseudo-target.
    pub targets: Atom,
    /// `INCR` incremental-transfer marker.
    pub incr: Atom,
    /// `ATOM` property type.
    pub atom: Atom,
    /// `UTF8_STRING` text target.
    pub utf8_string: Atom,
    /// `STRING` legacy text target.
    pub string: Atom,
    /// The private inbound staging property.
    pub staging: Atom,
}

impl Atoms {
    /// Intern the well-known atom set on `display`.
    pub fn intern<D: Display + ?Sized>(display: &D) -> Self {
        Self {
            targets: display.intern_atom(names::TARGETS),
            incr: display.intern_atom(names::INCR),
            atom: display.intern_atom(names::ATOM),
            utf8_string: display.intern_atom(names::UTF8_STRING),
            string: display.intern_atom(names::STRING),
            staging: display.intern_atom(names::STAGING_PROPERTY),
        }
    }
}
