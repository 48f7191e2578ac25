//! reel - record, edit and replay keyboard/mouse action groups
//!
//! Every command prints a JSON envelope `{ success, data, error }` on stdout.
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use actionreel_core::prelude::*;
use actionreel_recorder::prelude::*;
use actionreel_recorder::{summarize, CaptureSink, MemoryStore, RecorderError};

#[derive(Parser)]
#[command(name = "reel")]
#[command(about = "Record, edit and replay keyboard/mouse action groups")]
#[command(version)]
struct Cli {
    /// Data directory (default: $ACTIONREEL_HOME or ~/.actionreel)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record captured events (JSON lines) into a group. Ctrl+C or end of input stops.
    Record {
        #[arg(short, long)]
        name: String,
        /// Read events from a file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// List groups
    List {
        /// Show deleted groups instead
        #[arg(long)]
        deleted: bool,
    },
    /// Show a group as summarized entries
    Show {
        name: String,
        /// Every item instead of the summary
        #[arg(long)]
        all: bool,
    },
    /// Print a group as editable text
    Export {
        name: String,
        /// Plain text instead of JSON
        #[arg(long)]
        raw: bool,
    },
    /// Replace a group's items with edited text
    Edit {
        name: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Replay a group
    Replay {
        name: String,
        #[arg(long)]
        no_interpolation: bool,
        /// Interpolation steps per move
        #[arg(long)]
        steps: Option<u32>,
        /// Delay between interpolation steps (ms)
        #[arg(long)]
        step_delay: Option<u64>,
        #[arg(long)]
        sensitivity: Option<f64>,
        #[arg(long)]
        ultra_smooth: bool,
        /// Log input instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete a group (kept on disk, flagged deleted)
    Delete { name: String },
    /// Restore a deleted group
    Restore { name: String },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error: could not encode output: {}", e),
    }
}

#[derive(Serialize)]
struct GroupInfo {
    id: Uuid,
    name: String,
    #[serde(rename = "type")]
    group_type: String,
    items: usize,
    duration_ms: i64,
    created_at: DateTime<Utc>,
    is_local: bool,
    deleted: bool,
}

impl GroupInfo {
    fn of(g: &ActionGroup) -> Self {
        Self {
            id: g.id,
            name: g.name.clone(),
            group_type: g.group_type.clone(),
            items: g.items.len(),
            duration_ms: g.duration().num_milliseconds(),
            created_at: g.created_at,
            is_local: g.is_local,
            deleted: g.deleted,
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        print_json(&Output::<()>::err(to_error(e)));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let setup = Setup::global().ensure(cli.dir.as_deref(), init_logging)?;
    let mut library = open_library(&setup.data_dir);

    match cli.command {
        Commands::Record { name, input } => record(&mut library, &name, input.as_deref()),
        Commands::List { deleted } => list(&library, deleted),
        Commands::Show { name, all } => show(&library, &name, all),
        Commands::Export { name, raw } => export(&library, &name, raw),
        Commands::Edit { name, file } => edit(&mut library, &name, &file),
        Commands::Replay {
            name,
            no_interpolation,
            steps,
            step_delay,
            sensitivity,
            ultra_smooth,
            dry_run,
        } => {
            let group = find(&library, &name)?.clone();
            let mut config = ReplayConfig::from_modifiers(&group.modifiers);
            if no_interpolation {
                config.use_interpolation = false;
            }
            if let Some(steps) = steps {
                config.movement_steps = steps;
            }
            if let Some(ms) = step_delay {
                config.movement_delay_ms = ms;
            }
            if let Some(s) = sensitivity {
                config.set_sensitivity(s).map_err(anyhow::Error::msg)?;
            }
            if ultra_smooth {
                config.ultra_smooth_mode = true;
            }
            replay(group, config, dry_run)
        }
        Commands::Delete { name } => {
            let id = library.delete(&name)?;
            print_json(&Output::ok(serde_json::json!({"deleted": name, "id": id})));
            Ok(())
        }
        Commands::Restore { name } => {
            let id = library.restore(&name)?;
            print_json(&Output::ok(serde_json::json!({"restored": name, "id": id})));
            Ok(())
        }
    }
}

/// Structured error for the envelope, whatever layer it came from
fn to_error(e: anyhow::Error) -> Error {
    if let Some(err) = e.downcast_ref::<Error>() {
        return err.clone();
    }
    match e.downcast::<RecorderError>() {
        Ok(err) => err.into(),
        Err(other) => Error::from(other),
    }
}

fn open_library(data_dir: &Path) -> Library {
    let store: Arc<dyn GroupStore> = match JsonlStore::with_dir(data_dir.join("groups")) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            let reason = format!("{:#}", e);
            warn!(error = %reason, "group directory unavailable, using memory only");
            Arc::new(MemoryStore::new())
        }
    };
    Library::open(store)
}

fn find<'a>(library: &'a Library, name: &str) -> Result<&'a ActionGroup> {
    library
        .find(name)
        .ok_or_else(|| RecorderError::GroupNotFound(name.to_string()).into())
}

// ── Commands ────────────────────────────────────────────────────────────────

fn record(library: &mut Library, name: &str, input: Option<&Path>) -> Result<()> {
    let reader: Box<dyn BufRead + Send> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let (sink, handle) = Recorder::new().start(name)?;
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || { r.store(false, Ordering::SeqCst); })?;

    eprintln!("Recording: {} (Ctrl+C or end of input to stop)", name);
    let feeder = thread::spawn(move || feed(reader, sink));

    while running.load(Ordering::SeqCst) && handle.is_running() && !feeder.is_finished() {
        if let Some(fb) = handle.try_feedback() {
            eprint!("\r{} actions ({} filtered)", fb.accepted, fb.dropped);
            io::stderr().flush()?;
        }
        thread::sleep(Duration::from_millis(50));
    }
    eprintln!();

    // A feeder still blocked on stdin is left behind; its sink fails once the session stops.
    let rejected = if feeder.is_finished() {
        feeder.join().unwrap_or(0)
    } else {
        0
    };

    let id = library.finish_recording(handle)?;
    let group = id.and_then(|id| library.get(&id)).map(GroupInfo::of);
    print_json(&Output::ok(serde_json::json!({
        "name": name,
        "group": group,
        "unreadable_lines": rejected,
    })));
    Ok(())
}

/// Queue JSON-line events until input ends or the session closes.
/// Returns the number of lines that were not valid events.
fn feed(reader: Box<dyn BufRead + Send>, sink: CaptureSink) -> usize {
    let mut rejected = 0;
    for (n, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "input closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ActionItem>(&line) {
            Ok(item) => {
                // Blocks while the queue is full
                if sink.send(item).is_err() {
                    warn!(line = n + 1, "session closed, remaining input ignored");
                    break;
                }
            }
            Err(e) => {
                warn!(line = n + 1, error = %e, "not an action event");
                rejected += 1;
            }
        }
    }
    rejected
}

fn list(library: &Library, deleted: bool) -> Result<()> {
    let groups: Vec<GroupInfo> = if deleted {
        library.deleted().map(GroupInfo::of).collect()
    } else {
        library.active().map(GroupInfo::of).collect()
    };
    print_json(&Output::ok(groups));
    Ok(())
}

fn show(library: &Library, name: &str, all: bool) -> Result<()> {
    let group = find(library, name)?;
    let data = if all {
        serde_json::json!({ "group": GroupInfo::of(group), "items": group.items })
    } else {
        serde_json::json!({ "group": GroupInfo::of(group), "entries": summarize(&group.items) })
    };
    print_json(&Output::ok(data));
    Ok(())
}

fn export(library: &Library, name: &str, raw: bool) -> Result<()> {
    let group = find(library, name)?;
    let text = group.to_text();
    if raw {
        println!("{}", text);
    } else {
        print_json(&Output::ok(serde_json::json!({ "name": group.name, "text": text })));
    }
    Ok(())
}

fn edit(library: &mut Library, name: &str, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let outcome = library.apply_edit(name, &text)?;
    print_json(&Output::ok(outcome));
    Ok(())
}

fn replay(group: ActionGroup, config: ReplayConfig, dry_run: bool) -> Result<()> {
    let synth: Arc<dyn InputSynth> = if dry_run {
        Arc::new(LogSynth)
    } else {
        Arc::from(actionreel_core::system_input()?)
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(async move {
        let controller = ReplayController::new(synth);
        let handle = controller.start(group, config)?;
        let token = handle.cancel_token();
        ctrlc::set_handler(move || token.cancel())?;
        info!(group = handle.name(), "replaying (Ctrl+C to stop)");
        Ok::<_, anyhow::Error>(handle.join().await?)
    })?;

    print_json(&Output::ok(report));
    Ok(())
}
