//! Arena Sim - headless runner
//!
//! Loads a scenario (an INIT payload as JSON), runs it on the executor
//! thread through a controller session and prints a JSON summary.

use arena_sim::core::config::{EngineConfig, LoopMode};
use arena_sim::core::error::{Result, SimError};
use arena_sim::protocol::control::CommandKind;
use arena_sim::protocol::output::FrameSnapshot;
use arena_sim::protocol::payload::InitPayload;
use arena_sim::runtime::{ControllerSession, LifecycleUpdate, SessionEvent};

use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Headless runner for arena scenarios
#[derive(Parser, Debug)]
#[command(name = "arena-sim")]
#[command(about = "Run a scenario headless and print a JSON summary")]
struct Args {
    /// Scenario file: an INIT payload in JSON
    #[arg(long)]
    scenario: PathBuf,

    /// Stop after this many frames
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Engine configuration (TOML); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Step as fast as possible instead of in real time
    #[arg(long)]
    fast_forward: bool,

    /// Operator id the session is hosted under
    #[arg(long, default_value = "host")]
    operator: String,

    /// Include the last frame snapshot in the output
    #[arg(long)]
    snapshot: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    frames: u64,
    render_commands: usize,
    domain_events: usize,
    /// Members with hp left, per camp
    survivors: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_snapshot: Option<FrameSnapshot>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arena_sim=info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if args.fast_forward {
        config.frame_loop.mode = LoopMode::FastForward;
    }
    if config.output.snapshot_every_n_frames == 0 {
        tracing::warn!("Snapshots are disabled in the config; using one per frame to track progress");
        config.output.snapshot_every_n_frames = 1;
    }

    let payload: InitPayload = serde_json::from_str(&fs::read_to_string(&args.scenario)?)?;
    tracing::info!(
        "Scenario {} with {} members",
        args.scenario.display(),
        payload.member_count()
    );

    let rt = Runtime::new()?;
    let summary = rt.block_on(run(config, payload, &args))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn expect_success(update: LifecycleUpdate) -> Result<()> {
    if update.success {
        Ok(())
    } else {
        Err(SimError::Validation(format!(
            "{} failed: {}",
            update.kind,
            update.error.unwrap_or_default()
        )))
    }
}

async fn run(config: EngineConfig, payload: InitPayload, args: &Args) -> Result<RunSummary> {
    let mut session = ControllerSession::start(config, args.operator.clone())?;

    expect_success(session.command(CommandKind::Init, Some(payload)).await?)?;
    expect_success(session.command(CommandKind::Start, None).await?)?;

    let mut render_commands = 0;
    let mut domain_events = 0;
    let mut last: Option<FrameSnapshot> = None;

    while let Some(event) = session.next_event().await {
        match event {
            SessionEvent::Snapshot(snapshot) => {
                let done = snapshot.frame_number >= args.frames;
                if snapshot.frame_number % 60 == 0 {
                    tracing::info!("Frame {} ({:.1} fps)", snapshot.frame_number, snapshot.engine.fps);
                }
                last = Some(snapshot);
                if done {
                    break;
                }
            }
            SessionEvent::Render(commands) => render_commands += commands.len(),
            SessionEvent::Domain(batch) => domain_events += batch.events.len(),
            SessionEvent::Lifecycle(update) => {
                tracing::info!("{} -> {}", update.kind, update.state);
            }
            SessionEvent::TimedOut { kind } => {
                return Err(SimError::Timeout(format!("{} was not confirmed", kind)));
            }
        }
    }

    expect_success(session.command(CommandKind::Stop, None).await?)?;
    session.shutdown().await?;

    let mut survivors = BTreeMap::new();
    if let Some(snapshot) = &last {
        for member in &snapshot.members {
            let count = survivors.entry(member.camp_id.clone()).or_insert(0);
            if member.hp.current > 0.0 {
                *count += 1;
            }
        }
    }

    Ok(RunSummary {
        frames: last.as_ref().map_or(0, |s| s.frame_number),
        render_commands,
        domain_events,
        survivors,
        final_snapshot: if args.snapshot { last } else { None },
    })
}
