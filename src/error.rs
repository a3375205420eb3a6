//! Error types for the selection transfer engine.
//!
//! Protocol-level asynchronous errors (a peer window vanishing, a property
//! write the server could not allocate) surface as [`ProtocolError`] through
//! the per-connection error flag on [`crate::proto::Display`]. Everything the
//! orchestrator can fail with is an [`AgentError`].

use thiserror::Error;

use crate::proto::WindowId;

/// Classification of a protocol-level error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// The referenced window no longer exists.
    #[error("bad window")]
    BadWindow,

    /// The referenced atom is not interned.
    #[error("bad atom")]
    BadAtom,

    /// The server could not allocate storage for a property write.
    #[error("allocation failed")]
    AllocFailed,

    /// A single request exceeded the transport's maximum message size.
    #[error("request too large")]
    LengthExceeded,

    /// The display connection itself failed.
    #[error("connection failure")]
    Connection,
}

/// A protocol-level error recorded by the display connection.
///
/// Mirrors the asynchronous error report of the wire protocol: an error code
/// plus the resource (window) the failed request referred to. Callers that
/// need to distinguish "no error" from "error happened" must clear the
/// connection's flag immediately before the operation they are checking and
/// inspect it immediately after.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("protocol error: {kind}{}", resource.map(|w| format!(" on {w}")).unwrap_or_default())]
pub struct ProtocolError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The window the failed request referred to, when known.
    pub resource: Option<WindowId>,
}

impl ProtocolError {
    /// A protocol error of `kind` concerning `resource`.
    pub fn new(kind: ErrorKind, resource: Option<WindowId>) -> Self {
        Self { kind, resource }
    }
}

/// Errors the orchestrator can surface to the caller.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Claimed selection ownership but a verification query showed otherwise.
    #[error("could not acquire ownership of the {0} selection")]
    AcquireFailed(String),

    /// Nobody currently owns the requested selection.
    #[error("there is no owner for the {0} selection")]
    NoOwner(String),

    /// The owner cannot produce the requested target, and no fallback is
    /// available (or the fallback failed too).
    #[error("{owner} cannot convert the {selection} selection to target '{target}'")]
    ConversionRefused {
        /// Human-readable description of the owning window.
        owner: String,
        /// Name of the selection that was requested.
        selection: String,
        /// Name of the content format that failed.
        target: String,
    },

    /// The owner signalled failure in the middle of an incremental transfer.
    #[error("selection owner refused the transfer mid-stream")]
    TransferRefused,

    /// The legacy cut-buffer mechanism is not a selection and is not
    /// supported by this transport.
    #[error("cut buffers are not supported by this transport")]
    CutBufferUnsupported,

    /// No protocol event arrived within the configured timeout.
    #[error("timed out waiting for a protocol event")]
    Timeout,

    /// A transport-level failure that is fatal to the whole agent.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O failure in the glue layer (reading input, writing output).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
