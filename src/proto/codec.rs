//! Property value codec.
//!
//! Property payloads are arrays of 8-, 16- or 32-bit elements. The protocol
//! reports element counts; the engine works in bytes, so every read goes
//! through [`PropertyFormat::element_width`] to recover the byte length.
//! This matters for 16- and 32-bit formats (atom lists, integer lists):
//! treating the element count as a byte count there silently truncates the
//! payload. 32-bit elements occupy the platform's native word in client
//! memory, which is wider than four bytes on 64-bit hosts.

use bytes::Bytes;

use crate::proto::atom::Atom;

/// Declared element format of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyFormat {
    /// 8-bit elements (raw bytes, text).
    Format8,
    /// 16-bit elements.
    Format16,
    /// 32-bit elements (atoms, integers); native word width in memory.
    Format32,
}

impl PropertyFormat {
    /// Parse a raw on-the-wire format declaration.
    ///
    /// Unknown formats yield `None`; callers treat that as a zero-width
    /// element and must guard against zero-length copies.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            8 => Some(Self::Format8),
            16 => Some(Self::Format16),
            32 => Some(Self::Format32),
            _ => None,
        }
    }

    /// The raw on-the-wire format declaration.
    pub fn raw(self) -> u8 {
        match self {
            Self::Format8 => 8,
            Self::Format16 => 16,
            Self::Format32 => 32,
        }
    }

    /// Bytes occupied by one element in client memory.
    pub fn element_width(self) -> usize {
        match self {
            Self::Format8 => 1,
            Self::Format16 => 2,
            Self::Format32 => std::mem::size_of::<usize>(),
        }
    }
}

/// A typed property value as staged on a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    /// The type tag (a content target, `INCR`, or `ATOM`).
    pub type_atom: Atom,
    /// Element format of `data`.
    pub format: PropertyFormat,
    /// Raw element data, `element_count * element_width` bytes.
    pub data: Bytes,
}

impl PropertyValue {
    /// A format-8 value carrying raw bytes of the given content type.
    pub fn bytes(type_atom: Atom, data: Bytes) -> Self {
        Self {
            type_atom,
            format: PropertyFormat::Format8,
            data,
        }
    }

    /// A format-32 value encoding a list of atoms (the TARGETS reply).
    pub fn atom_list(type_atom: Atom, atoms: &[Atom]) -> Self {
        let width = PropertyFormat::Format32.element_width();
        let mut data = Vec::with_capacity(atoms.len() * width);
        for atom in atoms {
            data.extend_from_slice(&(atom.0 as usize).to_ne_bytes());
        }
        Self {
            type_atom,
            format: PropertyFormat::Format32,
            data: Bytes::from(data),
        }
    }

    /// Number of whole elements in the value.
    pub fn element_count(&self) -> usize {
        let width = self.format.element_width();
        if width == 0 {
            return 0;
        }
        self.data.len() / width
    }

    /// Payload size in bytes: element count times element width.
    ///
    /// Trailing bytes that do not fill a whole element are not counted.
    pub fn byte_len(&self) -> usize {
        self.element_count() * self.format.element_width()
    }

    /// Decode a format-32 value back into a list of atoms.
    ///
    /// Values of any other format decode to an empty list.
    pub fn decode_atom_list(&self) -> Vec<Atom> {
        if self.format != PropertyFormat::Format32 {
            return Vec::new();
        }
        let width = PropertyFormat::Format32.element_width();
        self.data
            .chunks_exact(width)
            .map(|chunk| {
                let mut word = [0u8; std::mem::size_of::<usize>()];
                word.copy_from_slice(chunk);
                Atom(usize::from_ne_bytes(word) as u32)
            })
            .collect()
    }
}
