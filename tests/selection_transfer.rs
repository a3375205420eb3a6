//! End-to-end transfer scenarios over the loopback display.

use std::thread;
use std::time::Duration;

use selagent::engine::{fetch, serve, ChunkPolicy};
use selagent::proto::atom::names;
use selagent::proto::loopback::{LoopbackDisplay, LoopbackServer};
use selagent::{
    AgentConfig, AgentError, Atom, Display, Event, PropertyFormat, SelectionKind, TargetSpec,
};

const STEP: Option<Duration> = Some(Duration::from_millis(500));

fn config() -> AgentConfig {
    AgentConfig {
        idle_timeout: Some(Duration::from_secs(2)),
        ..AgentConfig::default()
    }
}

fn wait_for_owner(display: &LoopbackDisplay, selection: Atom) {
    for _ in 0..500 {
        if display.selection_owner(selection).is_some() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("no selection owner appeared");
}

#[test]
fn small_payload_is_served_in_one_atomic_write() {
    let server = LoopbackServer::new();
    let owner = server.connect();
    let requestor = server.connect();

    let serve_cfg = config();
    let handle = thread::spawn(move || {
        let mut payload = b"hello".to_vec();
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    wait_for_owner(&requestor, sel);
    let result = fetch(&requestor, &config()).unwrap();
    assert_eq!(&result.data[..], b"hello");

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.served, 1);

    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    let incr = requestor.intern_atom(names::INCR);
    let writes = server.writes_to(requestor.window(), staging);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len, 5);
    assert_eq!(writes[0].format, PropertyFormat::Format8);
    assert_ne!(writes[0].type_atom, incr);
}

#[test]
fn empty_and_binary_payloads_round_trip() {
    for payload in [b"".to_vec(), b"nul\0in\0the\0middle\0".to_vec()] {
        let server = LoopbackServer::new();
        let owner = server.connect();
        let requestor = server.connect();

        let serve_cfg = config();
        let expected = payload.clone();
        let handle = thread::spawn(move || {
            let mut payload = payload;
            serve(&owner, &serve_cfg, &mut payload)
        });

        let sel = requestor.intern_atom(names::PRIMARY);
        wait_for_owner(&requestor, sel);
        let result = fetch(&requestor, &config()).unwrap();
        assert_eq!(&result.data[..], &expected[..]);
        handle.join().unwrap().unwrap();
    }
}

#[test]
fn large_payload_goes_incremental_with_capped_chunks() {
    // Chunk size resolves to exactly 4,000,000 bytes.
    let server = LoopbackServer::with_max_request_size(4_001_024);
    let owner = server.connect();
    let requestor = server.connect();

    let payload: Vec<u8> = (0..10_000_000u32).map(|i| (i % 239) as u8).collect();
    let expected = payload.clone();
    let serve_cfg = config();
    let handle = thread::spawn(move || {
        let mut payload = payload;
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    wait_for_owner(&requestor, sel);
    let result = fetch(&requestor, &config()).unwrap();
    assert_eq!(result.data.len(), expected.len());
    assert_eq!(&result.data[..], &expected[..]);
    handle.join().unwrap().unwrap();

    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    let incr = requestor.intern_atom(names::INCR);
    let writes = server.writes_to(requestor.window(), staging);
    // Placeholder, three full-rate chunks, the remainder, the terminator.
    assert_eq!(writes[0].type_atom, incr);
    assert_eq!(writes[0].len, 0);
    let lens: Vec<usize> = writes.iter().skip(1).map(|w| w.len).collect();
    assert_eq!(lens, vec![4_000_000, 4_000_000, 2_000_000, 0]);
}

#[test]
fn peers_named_xsel_get_smaller_chunks() {
    let server = LoopbackServer::with_max_request_size(6_000_000);
    let owner = server.connect();
    let requestor = server.connect();
    server.set_window_name(requestor.window(), "xsel");

    let payload = vec![1u8; 5_000_000];
    let serve_cfg = config();
    let handle = thread::spawn(move || {
        let mut payload = payload;
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    wait_for_owner(&requestor, sel);
    let result = fetch(&requestor, &config()).unwrap();
    assert_eq!(result.data.len(), 5_000_000);
    handle.join().unwrap().unwrap();

    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    let lens: Vec<usize> = server
        .writes_to(requestor.window(), staging)
        .iter()
        .skip(1)
        .map(|w| w.len)
        .collect();
    assert_eq!(lens, vec![4_000_000, 1_000_000, 0]);
}

#[test]
fn concurrent_peers_have_independent_transfer_state() {
    let server = LoopbackServer::with_max_request_size(2048);
    let owner = server.connect();
    let first = server.connect();
    let second = server.connect();

    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 199) as u8).collect();
    let expected = payload.clone();
    let serve_cfg = AgentConfig {
        loops: 2,
        ..config()
    };
    let handle = thread::spawn(move || {
        let mut payload = payload;
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = first.intern_atom(names::PRIMARY);
    wait_for_owner(&first, sel);

    let expected_a = expected.clone();
    let racer = thread::spawn(move || {
        let result = fetch(&first, &config()).unwrap();
        assert_eq!(&result.data[..], &expected_a[..]);
    });
    let result = fetch(&second, &config()).unwrap();
    assert_eq!(&result.data[..], &expected[..]);
    racer.join().unwrap();

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.served, 2);
}

#[test]
fn ownership_loss_drains_the_transfer_in_flight() {
    let server = LoopbackServer::with_max_request_size(2048);
    let owner = server.connect();
    let requestor = server.connect();
    let thief = server.connect();

    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 211) as u8).collect();
    let serve_cfg = config();
    let handle = thread::spawn(move || {
        let mut payload = payload;
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    let utf8 = requestor.intern_atom(names::UTF8_STRING);
    let incr = requestor.intern_atom(names::INCR);
    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    wait_for_owner(&requestor, sel);

    // Drive the requestor side by hand so ownership can be stolen between
    // chunks.
    requestor.watch_properties(requestor.window());
    requestor.convert_selection(sel, utf8, staging);
    let mut collected = Vec::new();
    let mut stole = false;
    // Property events for the INCR placeholder arrive ahead of the notify;
    // chunks only start once the placeholder has been probed and deleted.
    let mut incr_started = false;
    loop {
        match requestor.next_event(STEP).expect("requestor starved") {
            Event::SelectionNotify {
                property: Some(_), ..
            } => {
                let (ty, _) = requestor
                    .property_info(requestor.window(), staging)
                    .unwrap();
                assert_eq!(ty, incr);
                requestor.delete_property(requestor.window(), staging);
                incr_started = true;
            }
            Event::PropertyNotify {
                window,
                property,
                state: selagent::proto::PropertyState::NewValue,
            } if incr_started && window == requestor.window() && property == staging => {
                let value = requestor.read_property(window, staging).unwrap();
                let done = value.data.is_empty();
                collected.extend_from_slice(&value.data);
                requestor.delete_property(window, staging);
                if done {
                    break;
                }
                if !stole {
                    // Revoke ownership after the first chunk lands.
                    thief.set_selection_owner(sel, Some(thief.window()));
                    stole = true;
                }
            }
            _ => {}
        }
    }
    assert_eq!(collected.len(), 5000);

    let summary = handle.join().unwrap().unwrap();
    assert!(summary.ownership_lost);
    assert_eq!(summary.served, 1);
    // The thief keeps its ownership after the drained session exits.
    assert_eq!(thief.selection_owner(sel), Some(thief.window()));
}

/// A hand-rolled owner that refuses UTF-8 and serves legacy text, recording
/// the targets it was asked for.
fn legacy_only_owner(display: LoopbackDisplay, rounds: usize) -> thread::JoinHandle<Vec<Atom>> {
    thread::spawn(move || {
        let sel = display.intern_atom(names::PRIMARY);
        let utf8 = display.intern_atom(names::UTF8_STRING);
        let string = display.intern_atom(names::STRING);
        display.set_selection_owner(sel, Some(display.window()));

        let mut seen = Vec::new();
        for _ in 0..rounds {
            let Some(Event::SelectionRequest {
                requestor,
                target,
                property,
                ..
            }) = display.next_event(Some(Duration::from_secs(2)))
            else {
                break;
            };
            seen.push(target);
            if target == utf8 {
                display.send_notify(requestor, sel, target, None);
            } else if target == string {
                let value = selagent::PropertyValue::bytes(
                    string,
                    bytes::Bytes::from_static(b"legacy text"),
                );
                display.change_property(requestor, property, value).unwrap();
                display.send_notify(requestor, sel, target, Some(property));
            }
        }
        seen
    })
}

#[test]
fn utf8_refusal_falls_back_to_legacy_text_once() {
    let server = LoopbackServer::new();
    let owner = server.connect();
    let requestor = server.connect();

    let sel = requestor.intern_atom(names::PRIMARY);
    let utf8 = requestor.intern_atom(names::UTF8_STRING);
    let string = requestor.intern_atom(names::STRING);
    let handle = legacy_only_owner(owner, 2);
    wait_for_owner(&requestor, sel);

    let result = fetch(&requestor, &config()).unwrap();
    assert_eq!(&result.data[..], b"legacy text");
    assert_eq!(result.target, string);

    assert_eq!(handle.join().unwrap(), vec![utf8, string]);
}

#[test]
fn disabled_fallback_reports_the_refusal() {
    let server = LoopbackServer::new();
    let owner = server.connect();
    let requestor = server.connect();
    server.set_window_name(owner.window(), "Legacy App");

    let sel = requestor.intern_atom(names::PRIMARY);
    let utf8 = requestor.intern_atom(names::UTF8_STRING);
    let handle = legacy_only_owner(owner, 1);
    wait_for_owner(&requestor, sel);

    let cfg = AgentConfig {
        disable_fallback: true,
        ..config()
    };
    match fetch(&requestor, &cfg) {
        Err(AgentError::ConversionRefused {
            owner,
            selection,
            target,
        }) => {
            assert!(owner.contains("Legacy App"), "owner was {owner:?}");
            assert_eq!(selection, "PRIMARY");
            assert_eq!(target, "UTF8_STRING");
        }
        other => panic!("unexpected: {other:?}"),
    }

    assert_eq!(handle.join().unwrap(), vec![utf8]);
}

#[test]
fn targets_requests_list_formats_and_do_not_count_as_served() {
    let server = LoopbackServer::new();
    let owner = server.connect();
    let requestor = server.connect();

    let serve_cfg = config();
    let handle = thread::spawn(move || {
        let mut payload = b"content".to_vec();
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    let targets = requestor.intern_atom(names::TARGETS);
    let utf8 = requestor.intern_atom(names::UTF8_STRING);
    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    wait_for_owner(&requestor, sel);

    requestor.watch_properties(requestor.window());
    requestor.convert_selection(sel, targets, staging);
    let listed = loop {
        match requestor.next_event(STEP).expect("no TARGETS answer") {
            Event::SelectionNotify {
                property: Some(prop),
                ..
            } => {
                let value = requestor.read_property(requestor.window(), prop).unwrap();
                requestor.delete_property(requestor.window(), prop);
                break value.decode_atom_list();
            }
            _ => continue,
        }
    };
    assert_eq!(listed, vec![targets, utf8]);

    // The quota is still open; a real fetch satisfies it.
    let result = fetch(&requestor, &config()).unwrap();
    assert_eq!(&result.data[..], b"content");

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.served, 1);
}

#[test]
fn vanished_peer_is_swept_and_the_session_times_out() {
    let server = LoopbackServer::with_max_request_size(2048);
    let owner = server.connect();
    let requestor = server.connect();

    let serve_cfg = AgentConfig {
        idle_timeout: Some(Duration::from_millis(100)),
        ..AgentConfig::default()
    };
    let handle = thread::spawn(move || {
        let mut payload = vec![9u8; 50_000];
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    let utf8 = requestor.intern_atom(names::UTF8_STRING);
    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    wait_for_owner(&requestor, sel);

    // Start an incremental transfer, consume one chunk, then vanish.
    requestor.watch_properties(requestor.window());
    requestor.convert_selection(sel, utf8, staging);
    let mut incr_started = false;
    let mut got_chunk = false;
    while !got_chunk {
        match requestor.next_event(STEP).expect("requestor starved") {
            Event::SelectionNotify {
                property: Some(_), ..
            } => {
                requestor.delete_property(requestor.window(), staging);
                incr_started = true;
            }
            Event::PropertyNotify {
                window,
                property,
                state: selagent::proto::PropertyState::NewValue,
            } if incr_started && window == requestor.window() && property == staging => {
                got_chunk = true;
            }
            _ => {}
        }
    }
    server.kill_window(requestor.window());

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.served, 0);
    assert!(summary.timed_out);
}

#[test]
fn peer_side_write_failure_is_reported_as_refusal() {
    let server = LoopbackServer::new();
    let owner = server.connect();
    let requestor = server.connect();
    server.fail_writes_to(requestor.window());

    let serve_cfg = AgentConfig {
        idle_timeout: Some(Duration::from_millis(100)),
        ..AgentConfig::default()
    };
    let handle = thread::spawn(move || {
        let mut payload = b"unreachable".to_vec();
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    wait_for_owner(&requestor, sel);

    // Both the UTF-8 attempt and the fallback are refused.
    match fetch(&requestor, &config()) {
        Err(AgentError::ConversionRefused { target, .. }) => {
            assert_eq!(target, "STRING");
        }
        other => panic!("unexpected: {other:?}"),
    }

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.served, 0);
}

#[test]
fn mid_stream_write_failure_abandons_only_that_transfer() {
    let server = LoopbackServer::with_max_request_size(2048);
    let owner = server.connect();
    let requestor = server.connect();

    let serve_cfg = AgentConfig {
        idle_timeout: Some(Duration::from_millis(100)),
        ..AgentConfig::default()
    };
    let handle = thread::spawn(move || {
        let mut payload = vec![5u8; 5000];
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    let utf8 = requestor.intern_atom(names::UTF8_STRING);
    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    wait_for_owner(&requestor, sel);

    // Consume the placeholder and the first chunk, then make further writes
    // to this window fail so the next chunk is refused.
    requestor.watch_properties(requestor.window());
    requestor.convert_selection(sel, utf8, staging);
    let mut incr_started = false;
    let refusal = loop {
        match requestor.next_event(STEP).expect("requestor starved") {
            Event::SelectionNotify {
                property: Some(_), ..
            } => {
                requestor.delete_property(requestor.window(), staging);
                incr_started = true;
            }
            Event::SelectionNotify { property: None, .. } => break true,
            Event::PropertyNotify {
                window,
                property,
                state: selagent::proto::PropertyState::NewValue,
            } if incr_started && window == requestor.window() && property == staging => {
                server.fail_writes_to(requestor.window());
                requestor.delete_property(window, staging);
            }
            _ => {}
        }
    };
    assert!(refusal);

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.served, 0);
    assert!(summary.timed_out);
}

#[test]
fn global_chunk_cap_is_honoured() {
    let server = LoopbackServer::new();
    let owner = server.connect();
    let requestor = server.connect();

    let serve_cfg = AgentConfig {
        chunk: ChunkPolicy {
            global_cap: Some(1000),
            ..ChunkPolicy::default()
        },
        ..config()
    };
    let handle = thread::spawn(move || {
        let mut payload = vec![3u8; 2500];
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    wait_for_owner(&requestor, sel);
    let result = fetch(&requestor, &config()).unwrap();
    assert_eq!(result.data.len(), 2500);
    handle.join().unwrap().unwrap();

    let staging = requestor.intern_atom(names::STAGING_PROPERTY);
    let lens: Vec<usize> = server
        .writes_to(requestor.window(), staging)
        .iter()
        .skip(1)
        .map(|w| w.len)
        .collect();
    assert_eq!(lens, vec![1000, 1000, 500, 0]);
}

#[test]
fn serving_a_custom_target_refuses_text_fetches() {
    let server = LoopbackServer::new();
    let owner = server.connect();
    let requestor = server.connect();

    let serve_cfg = AgentConfig {
        target: TargetSpec::Custom("image/png".into()),
        idle_timeout: Some(Duration::from_millis(200)),
        ..AgentConfig::default()
    };
    let handle = thread::spawn(move || {
        let mut payload = b"\x89PNG".to_vec();
        serve(&owner, &serve_cfg, &mut payload)
    });

    let sel = requestor.intern_atom(names::PRIMARY);
    wait_for_owner(&requestor, sel);

    // Text fetch: both UTF-8 and the fallback get refused.
    assert!(matches!(
        fetch(&requestor, &config()),
        Err(AgentError::ConversionRefused { .. })
    ));

    // Asking for the right target succeeds.
    let cfg = AgentConfig {
        target: TargetSpec::Custom("image/png".into()),
        disable_fallback: true,
        ..config()
    };
    let result = fetch(&requestor, &cfg).unwrap();
    assert_eq!(&result.data[..], b"\x89PNG");

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.served, 1);
}

#[test]
fn cut_buffer_selection_is_rejected_up_front() {
    let server = LoopbackServer::new();
    let display = server.connect();
    let cfg = AgentConfig {
        selection: SelectionKind::CutBuffer,
        ..config()
    };
    assert!(matches!(
        fetch(&display, &cfg),
        Err(AgentError::CutBufferUnsupported)
    ));
}
