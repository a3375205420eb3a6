//! Command-line front end.
//!
//! Runs the transfer engine end to end over the in-process loopback display:
//! copy mode (`-i`, the default) reads a payload and serves it to a fetching
//! peer, verifying the bytes survive the round trip; paste mode (`-o`) has a
//! helper own the selection while the main thread fetches it and writes the
//! result to standard output. Incremental transfers, target fallback, and
//! peer chunk caps all behave exactly as they would against a real display
//! backend.

use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroize;

use selagent::engine::{fetch, serve, ChunkPolicy};
use selagent::input;
use selagent::proto::loopback::LoopbackServer;
use selagent::proto::Display;
use selagent::{AgentConfig, SelectionKind, TargetSpec};

#[derive(Debug, Parser)]
#[command(
    name = "selagent",
    version,
    about = "Selection transfer agent, exercised over an in-process display"
)]
struct Args {
    /// Copy: read the payload and serve paste requests (the default).
    #[arg(short = 'i', long = "in", conflicts_with = "out")]
    r#in: bool,

    /// Paste: fetch the selection and write it to standard output.
    #[arg(short = 'o', long = "out")]
    out: bool,

    /// Paste requests to serve before exiting; 0 serves until the idle
    /// timeout fires or ownership is revoked.
    #[arg(short = 'l', long, default_value_t = 1)]
    loops: u64,

    /// Selection to use; any unambiguous prefix of primary, secondary,
    /// clipboard or buffer-cut.
    #[arg(long, default_value = "primary", value_parser = parse_selection)]
    selection: SelectionKind,

    /// Offer or request this target instead of UTF-8 text.
    #[arg(short = 't', long)]
    target: Option<String>,

    /// Use legacy STRING text instead of UTF8_STRING.
    #[arg(long)]
    noutf8: bool,

    /// Drop a single trailing newline from the payload.
    #[arg(long)]
    rmlastnl: bool,

    /// Zero the payload buffer when the session ends.
    #[arg(long)]
    sensitive: bool,

    /// Give up after this many milliseconds without protocol activity;
    /// 0 waits forever.
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    wait: u64,

    /// Cap incremental chunks at this many bytes.
    #[arg(long, value_name = "BYTES")]
    chunk_cap: Option<usize>,

    /// Accepted for familiarity; the only transport is the in-process
    /// display, so this is ignored.
    #[arg(long, value_name = "NAME")]
    display: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Files to read the payload from; standard input when absent.
    files: Vec<PathBuf>,
}

fn parse_selection(s: &str) -> Result<SelectionKind, String> {
    s.parse()
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "selagent=info",
        1 => "selagent=debug",
        _ => "selagent=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    if let Some(name) = &args.display {
        warn!(display = %name, "external displays are not supported; using the in-process display");
    }

    let target = match (&args.target, args.noutf8) {
        (Some(name), _) => TargetSpec::Custom(name.clone()),
        (None, true) => TargetSpec::PlainText,
        (None, false) => TargetSpec::Utf8Text,
    };
    // An explicitly requested target is what the caller wants, exactly.
    let disable_fallback = args.target.is_some() || args.noutf8;
    let chunk = ChunkPolicy {
        global_cap: args.chunk_cap,
        ..ChunkPolicy::default()
    };
    let config = AgentConfig {
        selection: args.selection,
        target,
        loops: args.loops,
        idle_timeout: match args.wait {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        },
        sensitive: args.sensitive,
        trim_trailing_newline: args.rmlastnl,
        disable_fallback,
        chunk,
    };

    let mut payload = input::read_payload(&args.files, config.trim_trailing_newline)
        .context("reading payload")?;

    // Explicit direction flags win; the default is copy mode.
    let paste = args.out && !args.r#in;
    let server = LoopbackServer::new();
    if paste {
        run_paste(&server, &config, payload)
    } else {
        run_copy(&server, &config, &mut payload)
    }
}

/// Serve the payload from the main thread while a helper connection fetches
/// it back `loops` times and verifies the bytes.
fn run_copy(
    server: &LoopbackServer,
    config: &AgentConfig,
    payload: &mut [u8],
) -> anyhow::Result<()> {
    let owner = server.connect();
    let peer = server.connect();
    let mut expected = payload.to_vec();
    let fetch_cfg = config.clone();
    let rounds = config.loops.max(1);

    let helper = thread::spawn(move || -> anyhow::Result<()> {
        let sel = peer.intern_atom(fetch_cfg.selection.name());
        wait_for_owner(&peer, sel)?;
        for round in 0..rounds {
            let result = fetch(&peer, &fetch_cfg)?;
            if result.data[..] != expected[..] {
                bail!("round {round}: fetched payload does not match the input");
            }
            debug!(round, bytes = result.data.len(), "round trip verified");
        }
        if fetch_cfg.sensitive {
            expected.zeroize();
        }
        Ok(())
    });

    let summary = serve(&owner, config, payload)?;
    helper.join().expect("fetch helper panicked")?;
    info!(served = summary.served, "loopback round trip verified");
    Ok(())
}

/// Have a helper connection own the selection while the main thread fetches
/// it and writes the content to standard output.
fn run_paste(
    server: &LoopbackServer,
    config: &AgentConfig,
    mut payload: Vec<u8>,
) -> anyhow::Result<()> {
    let owner = server.connect();
    let requestor = server.connect();
    let serve_cfg = AgentConfig {
        loops: 1,
        ..config.clone()
    };

    let helper = thread::spawn(move || serve(&owner, &serve_cfg, &mut payload));

    let sel = requestor.intern_atom(config.selection.name());
    wait_for_owner(&requestor, sel)?;
    let result = fetch(&requestor, config)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&result.data).context("writing payload")?;
    stdout.flush()?;

    let summary = helper.join().expect("serve helper panicked")?;
    debug!(served = summary.served, "serve helper finished");
    Ok(())
}

fn wait_for_owner<D: Display>(display: &D, selection: selagent::Atom) -> anyhow::Result<()> {
    for _ in 0..500 {
        if display.selection_owner(selection).is_some() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(2));
    }
    bail!("selection owner never appeared")
}
