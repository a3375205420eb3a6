//! The event loop around the two state machines.
//!
//! [`serve`] takes ownership of a selection and answers paste requests until
//! its quota is met, ownership is revoked, or the idle timeout fires, then
//! releases ownership cleanly. [`fetch`] asks the current owner for the
//! selection's content and reassembles the answer, falling back from UTF-8
//! to legacy text once when the owner refuses.
//!
//! Exit conditions never abandon a peer: a serve session that has hit its
//! quota or lost ownership keeps draining in-flight transfers and only stops
//! once the registry is empty.

use bytes::Bytes;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::config::{AgentConfig, SelectionKind};
use crate::engine::diag;
use crate::engine::registry::RequestorRegistry;
use crate::engine::requester::{FetchOutcome, Fetcher};
use crate::engine::responder::Responder;
use crate::engine::Outcome;
use crate::error::AgentError;
use crate::proto::atom::{Atom, Atoms};
use crate::proto::display::Display;
use crate::proto::event::{Event, PropertyState};

/// How a serving session ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Number of paste requests served to completion.
    pub served: u64,
    /// Another process took the selection away.
    pub ownership_lost: bool,
    /// The session ended because the idle timeout fired.
    pub timed_out: bool,
}

/// A fetched selection payload.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The reassembled content.
    pub data: Bytes,
    /// The type the owner declared for the content, when it staged any.
    pub type_atom: Option<Atom>,
    /// The target that actually succeeded (differs from the requested one
    /// after a fallback).
    pub target: Atom,
}

/// Own `config.selection` and serve `payload` to requesting peers.
///
/// With `config.sensitive` set, `payload` is zeroed in place before this
/// returns, on every path including errors.
pub fn serve<D: Display + ?Sized>(
    display: &D,
    config: &AgentConfig,
    payload: &mut [u8],
) -> Result<ServeSummary, AgentError> {
    let result = serve_inner(display, config, payload);
    if config.sensitive {
        payload.zeroize();
    }
    result
}

fn serve_inner<D: Display + ?Sized>(
    display: &D,
    config: &AgentConfig,
    payload: &[u8],
) -> Result<ServeSummary, AgentError> {
    if config.selection == SelectionKind::CutBuffer {
        return Err(AgentError::CutBufferUnsupported);
    }
    let atoms = Atoms::intern(display);
    let selection = display.intern_atom(config.selection.name());
    let target = display.intern_atom(config.target.atom_name());

    display.set_selection_owner(selection, Some(display.window()));
    display.flush();
    // Ownership claims can be raced or denied; verify before serving.
    if display.selection_owner(selection) != Some(display.window()) {
        return Err(AgentError::AcquireFailed(config.selection.name().into()));
    }
    info!(
        selection = config.selection.name(),
        target = config.target.atom_name(),
        bytes = payload.len(),
        "serving selection"
    );

    let responder = Responder::new(display, &atoms, selection, target, payload, &config.chunk);
    let mut registry = RequestorRegistry::new();
    let mut summary = ServeSummary::default();
    let mut lost = false;

    loop {
        let quota_met = config.loops > 0 && summary.served >= config.loops;
        if (lost || quota_met) && registry.is_empty() {
            break;
        }
        let Some(event) = display.next_event(config.idle_timeout) else {
            registry.sweep(display);
            if registry.is_empty() {
                debug!("idle timeout with no transfer in flight");
                summary.timed_out = true;
                break;
            }
            continue;
        };
        match event {
            Event::SelectionRequest {
                requestor,
                selection: requested,
                target: requested_target,
                property,
            } if requested == selection => {
                if requested_target == atoms.targets {
                    responder.answer_targets(requestor, property);
                    continue;
                }
                if requested_target != target {
                    debug!(
                        peer = %requestor,
                        target = ?requested_target,
                        "refusing unsupported target"
                    );
                    display.send_notify(requestor, selection, requested_target, None);
                    display.flush();
                    continue;
                }
                let outcome = responder.handle_request(registry.get_or_insert(requestor, property));
                match outcome {
                    Outcome::Complete => {
                        registry.remove(requestor, property);
                        // A peer with another transfer still outstanding has
                        // not finished its top-level request yet.
                        if !registry.has_peer(requestor) {
                            summary.served += 1;
                        }
                    }
                    Outcome::Refused => {
                        let peer = diag::window_description(display, requestor);
                        warn!(peer = %peer, "transfer refused");
                        registry.remove(requestor, property);
                    }
                    Outcome::Pending => {}
                }
            }
            Event::PropertyNotify {
                window,
                property,
                state: PropertyState::Deleted,
            } => {
                let Some(record) = registry.get_mut(window, property) else {
                    continue;
                };
                match responder.handle_property_deleted(record) {
                    Outcome::Complete => {
                        registry.remove(window, property);
                        if !registry.has_peer(window) {
                            summary.served += 1;
                        }
                    }
                    Outcome::Refused => {
                        let peer = diag::window_description(display, window);
                        warn!(peer = %peer, "transfer abandoned mid-stream");
                        registry.remove(window, property);
                    }
                    Outcome::Pending => {}
                }
            }
            Event::SelectionClear {
                selection: cleared,
            } if cleared == selection => {
                info!("selection ownership lost, draining in-flight transfers");
                summary.ownership_lost = true;
                lost = true;
                registry.sweep(display);
            }
            Event::WakeUp => {
                registry.sweep(display);
            }
            other => {
                debug!(event = ?other, "ignoring event");
            }
        }
    }

    // Do not yank ownership from whoever took it away from us.
    if display.selection_owner(selection) == Some(display.window()) {
        display.set_selection_owner(selection, None);
        display.flush();
    }
    info!(served = summary.served, "serving session ended");
    Ok(summary)
}

/// Fetch the current content of `config.selection` from its owner.
pub fn fetch<D: Display + ?Sized>(
    display: &D,
    config: &AgentConfig,
) -> Result<FetchResult, AgentError> {
    if config.selection == SelectionKind::CutBuffer {
        return Err(AgentError::CutBufferUnsupported);
    }
    let atoms = Atoms::intern(display);
    let selection = display.intern_atom(config.selection.name());
    let target = display.intern_atom(config.target.atom_name());

    if display.selection_owner(selection).is_none() {
        return Err(AgentError::NoOwner(config.selection.name().into()));
    }

    let mut fetcher = Fetcher::new(display, &atoms, selection, target);
    fetcher.start();
    let mut fell_back = false;

    loop {
        let Some(event) = display.next_event(config.idle_timeout) else {
            return Err(AgentError::Timeout);
        };
        match fetcher.step(&event) {
            FetchOutcome::Pending => {}
            FetchOutcome::Complete => {
                let target = fetcher.target();
                let (data, type_atom) = fetcher.into_result();
                debug!(bytes = data.len(), "fetch complete");
                return Ok(FetchResult {
                    data,
                    type_atom,
                    target,
                });
            }
            FetchOutcome::BadTarget => {
                let can_fall_back =
                    target == atoms.utf8_string && !config.disable_fallback && !fell_back;
                if can_fall_back {
                    fell_back = true;
                    fetcher.restart_with(atoms.string);
                    continue;
                }
                let failing = fetcher.target();
                let owner = diag::selection_owner_description(display, selection)
                    .unwrap_or_else(|| "the selection owner".to_owned());
                return Err(AgentError::ConversionRefused {
                    owner,
                    selection: config.selection.name().to_owned(),
                    target: display
                        .atom_name(failing)
                        .unwrap_or_else(|| format!("atom {}", failing.0)),
                });
            }
            FetchOutcome::Refused => return Err(AgentError::TransferRefused),
        }
    }
}
