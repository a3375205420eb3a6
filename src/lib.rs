//! # selagent
//!
//! A selection-transfer agent for ICCCM-style clipboard protocols.
//!
//! A process can either publish a byte payload as the content of a named
//! selection and answer paste requests from arbitrary peers, or request and
//! reassemble the current content of a selection owned by some other peer.
//! Payloads larger than one protocol message are moved with the incremental
//! (INCR) sub-protocol: a sentinel placeholder, one chunk per property-delete
//! acknowledgement, and a zero-length terminal chunk.
//!
//! # Architecture
//!
//! ```text
//! selagent
//!   ├─> proto::codec       (property values, element widths)
//!   ├─> proto::display     (wire-operation seam, per-connection error flag)
//!   ├─> proto::loopback    (in-process virtual display for tests/embedding)
//!   ├─> engine::registry   (per-(peer, property) transfer records)
//!   ├─> engine::responder  (outbound state machine: answer paste requests)
//!   ├─> engine::requester  (inbound state machine: fetch and reassemble)
//!   └─> engine::orchestrator (event loop, ownership, fallback, timeouts)
//! ```
//!
//! The engine is single threaded and event driven: all work happens in
//! response to protocol events pulled one at a time from the connection.
//! Multiple peers may nevertheless be mid-transfer at once, so all outbound
//! state is keyed per `(peer window, destination property)` pair through
//! [`engine::registry::RequestorRegistry`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Agent configuration consumed by the orchestrator.
pub mod config;

/// Structured error types for the engine and the transport.
pub mod error;

/// Glue: reading the outbound payload from files or standard input.
pub mod input;

/// Wire-level protocol model: atoms, events, property codec, display seam.
pub mod proto;

/// The selection transfer protocol engine.
pub mod engine;

pub use config::{AgentConfig, SelectionKind, TargetSpec};
pub use error::{AgentError, ErrorKind, ProtocolError};
pub use proto::{Atom, Display, Event, PropertyFormat, PropertyValue, WindowId};
