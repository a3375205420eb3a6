//! The selection transfer engine.
//!
//! Two state machines do the actual byte moving: [`responder`] answers paste
//! requests from peers while this agent owns a selection, and [`requester`]
//! fetches a selection owned by somebody else. [`orchestrator`] runs the
//! event loop around them, [`registry`] keys outbound transfer state per
//! peer, [`chunk`] sizes incremental chunks, and [`diag`] renders peer
//! windows for error messages.

pub mod chunk;
pub mod diag;
pub mod orchestrator;
pub mod registry;
pub mod requester;
pub mod responder;

pub use chunk::ChunkPolicy;
pub use orchestrator::{fetch, serve, FetchResult, ServeSummary};
pub use registry::RequestorRegistry;
pub use requester::{FetchOutcome, Fetcher};
pub use responder::Responder;

/// Result of feeding one protocol event to an outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The transfer needs more events before it finishes.
    Pending,
    /// The transfer delivered the full payload.
    Complete,
    /// The transfer was refused or abandoned.
    Refused,
}
