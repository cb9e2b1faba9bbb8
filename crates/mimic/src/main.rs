//! mimic - record mouse and keyboard input, then play it back
//!
//! Running `mimic` with no subcommand records until a stop gesture, saves the
//! recording, waits a few seconds and replays it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mimic_core::prelude::*;
use mimic_recorder::prelude::*;

#[derive(Parser)]
#[command(name = "mimic")]
#[command(about = "Record mouse and keyboard input, then play it back")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Recording file
    #[arg(short, long, global = true, default_value = "recording.json")]
    file: PathBuf,
    /// Record layout used when saving
    #[arg(long, global = true, value_enum, default_value_t = SchemaArg::Flat)]
    schema: SchemaArg,
    /// Seconds to wait before playback starts
    #[arg(long, global = true, default_value = "3")]
    delay: u64,
    /// Abort playback on unknown keys or buttons instead of skipping them
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until a stop gesture and save
    Record,
    /// Play a saved recording
    Play,
    /// Summarize a saved recording
    Show {
        #[arg(long)]
        all: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaArg {
    Flat,
    Tagged,
}

impl From<SchemaArg> for Schema {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::Flat => Schema::Flat,
            SchemaArg::Tagged => Schema::Tagged,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let store = JsonFileStore::new(&cli.file).schema(cli.schema.into());

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_stop.raise()) {
        tracing::warn!(error = %e, "cannot install Ctrl+C handler");
    }

    let result = match cli.command {
        None => cycle(&store, &stop, cli.delay, cli.strict),
        Some(Commands::Record) => record(&store, &stop).map(|_| ()),
        Some(Commands::Play) => play(&store, &stop, cli.delay, cli.strict),
        Some(Commands::Show { all }) => show(&store, all),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Record, save, wait, play
fn cycle(store: &JsonFileStore, stop: &StopSignal, delay: u64, strict: bool) -> Result<()> {
    let sequence = record(store, stop)?;
    if stop.is_raised() {
        println!("Interrupted, skipping playback");
        return Ok(());
    }
    countdown(delay, stop);
    replay(&sequence, stop, strict)
}

fn record(store: &JsonFileStore, stop: &StopSignal) -> Result<EventSequence> {
    println!("Recording (press two mouse buttons together, or q+esc, to stop)");
    let session = RecordingSession::new().stop_on(stop.clone());
    let sequence = session
        .record(Arc::new(NativeSource::new()))
        .context("recording failed")?;

    store.save(&sequence)?;
    println!("{} events recorded", sequence.len());
    println!("Saved: {}", store.path().display());
    Ok(sequence)
}

fn play(store: &JsonFileStore, stop: &StopSignal, delay: u64, strict: bool) -> Result<()> {
    let sequence = store.load()?;
    println!("Replaying {} ({} events)", store.path().display(), sequence.len());
    countdown(delay, stop);
    replay(&sequence, stop, strict)
}

fn replay(sequence: &EventSequence, stop: &StopSignal, strict: bool) -> Result<()> {
    if stop.is_raised() {
        println!("Interrupted");
        return Ok(());
    }
    let mut player = Player::new(NativeSink::new())
        .strict(strict)
        .cancel_on(stop.clone());
    let report = player.play(sequence).context("playback failed")?;

    println!(
        "Done! {} moves, {} clicks, {} scrolls, {} key presses, {} key releases",
        report.moves, report.clicks, report.scrolls, report.key_presses, report.key_releases
    );
    for skipped in &report.skipped {
        println!("  skipped #{}: {}", skipped.index, skipped.reason);
    }
    if report.cancelled {
        println!("Playback cancelled");
    }
    Ok(())
}

fn show(store: &JsonFileStore, all: bool) -> Result<()> {
    let (schema, sequence) = store.load_detected()?;
    println!("File: {}", store.path().display());
    println!("Layout: {}", schema.name());
    println!("Events: {}", sequence.len());
    if let Some(last) = sequence.events().last() {
        println!("Duration: {:.3}s", last.timestamp);
    }

    let (mut moves, mut clicks, mut scrolls, mut presses, mut releases) = (0, 0, 0, 0, 0);
    for e in &sequence {
        match &e.kind {
            EventKind::MouseMove { .. } => moves += 1,
            EventKind::MouseClick { .. } => clicks += 1,
            EventKind::MouseScroll { .. } => scrolls += 1,
            EventKind::KeyPress { .. } => presses += 1,
            EventKind::KeyRelease { .. } => releases += 1,
        }
    }
    println!(
        "\nSummary: {} moves, {} clicks, {} scrolls, {} key presses, {} key releases",
        moves, clicks, scrolls, presses, releases
    );
    if all {
        for (i, e) in sequence.iter().enumerate() {
            println!("{}: {:>9.3}s {}", i, e.timestamp, describe(&e.kind));
        }
    }
    Ok(())
}

fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::MouseMove { x, y } => format!("move to ({x}, {y})"),
        EventKind::MouseClick {
            x,
            y,
            button,
            pressed,
        } => format!(
            "{} {button} at ({x}, {y})",
            if *pressed { "press" } else { "release" }
        ),
        EventKind::MouseScroll { dx, dy, .. } => format!("scroll ({dx}, {dy})"),
        EventKind::KeyPress { key } => format!("key down {key}"),
        EventKind::KeyRelease { key } => format!("key up {key}"),
    }
}

fn countdown(seconds: u64, stop: &StopSignal) {
    if seconds == 0 {
        return;
    }
    println!("Starting in {} seconds...", seconds);
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline && !stop.is_raised() {
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    let Some(err) = err.downcast_ref::<Error>() else {
        return 1;
    };
    match err.root().code() {
        ErrorCode::HookInstall => 2,
        ErrorCode::Persistence => 3,
        ErrorCode::MalformedRecord => 4,
        _ => 1,
    }
}
