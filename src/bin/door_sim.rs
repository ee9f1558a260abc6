//! door-sim binary
//!
//! Loads a door description, instantiates it into a headless scene, plays a
//! scripted sequence of user actions against it and runs its timers for a
//! while. Every scene call is logged.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                    | Default      | Description                          |
//! |------------------------|--------------|--------------------------------------|
//! | `DOOR_CACHE_TTL_SECS`  | `10`         | Lifetime of cached structure loads   |
//! | `DOOR_DEFAULT_VOLUME`  | `1.0`        | Volume when the door specifies none  |
//! | `DOOR_PASSWORD_PROMPT` | `Password:`  | Terminal prompt text                 |
//! | `DOOR_TIMER_POLICY`    | `detached`   | `detached` or `supersede`            |
//! | `DOOR_TICK_RATE_HZ`    | `30`         | Timer tick rate                      |

use anyhow::{Context, Result};
use clap::Parser;
use door_engine::{
    applet::AutomaticDoorApplet,
    cache::{HttpFetcher, StructureCache},
    clock::SystemClock,
    document::{DoorSource, RawDoorStructure},
    driver::DoorDriver,
    scene::{HeadlessScene, SceneEvent, SharedScene},
    structure::PartKind,
    types::{DoorConfig, TimerPolicy, UserId},
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "door-sim", about = "Headless door engine simulator", version)]
struct Args {
    /// Door description: an http(s) URL or a path to a JSON file
    #[arg(long, env = "DOOR_SOURCE")]
    source: String,

    /// Optional TOML config file
    #[arg(long, env = "DOOR_CONFIG")]
    config: Option<String>,

    /// Users joining the scene
    #[arg(long = "user")]
    users: Vec<String>,

    /// User walking into the door sensor after joining
    #[arg(long)]
    approach: Option<String>,

    /// Click the door handle once
    #[arg(long)]
    use_handle: bool,

    /// Lock the door after the scripted actions
    #[arg(long)]
    lock: bool,

    /// Seconds to keep the timers running
    #[arg(long, default_value_t = 10.0)]
    run_for: f32,

    /// Override the configured timer policy
    #[arg(long, value_parser = parse_policy)]
    timer_policy: Option<TimerPolicy>,
}

fn parse_policy(s: &str) -> Result<TimerPolicy, String> {
    match s {
        "detached" => Ok(TimerPolicy::Detached),
        "supersede" => Ok(TimerPolicy::Supersede),
        other => Err(format!("unknown timer policy '{}'", other)),
    }
}

fn load_config(args: &Args) -> Result<DoorConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = &args.config {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }
    let mut cfg: DoorConfig = builder
        .add_source(config::Environment::with_prefix("DOOR").try_parsing(true))
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    if let Some(policy) = args.timer_policy {
        cfg.timer_policy = policy;
    }
    Ok(cfg)
}

/// Negative values run no time at all; non-finite ones are rejected.
fn run_duration(secs: f32) -> Result<Duration> {
    Duration::try_from_secs_f32(secs.max(0.0))
        .with_context(|| format!("invalid --run-for value {}", secs))
}

fn load_source(source: &str) -> Result<DoorSource> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(DoorSource::Url(source.to_string()));
    }
    let text = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read door description {}", source))?;
    let raw: RawDoorStructure = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a door description", source))?;
    Ok(DoorSource::Inline(raw))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("door_engine=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let source = load_source(&args.source)?;

    tracing::info!(
        "Starting door-sim (source='{}', policy={:?}, run_for={}s)",
        args.source,
        config.timer_policy,
        args.run_for,
    );

    let clock = Arc::new(SystemClock::new());
    let cache = Arc::new(StructureCache::from_config(
        Arc::new(HttpFetcher::default()),
        clock.clone(),
        &config,
    ));

    let headless = HeadlessScene::shared();
    let scene: SharedScene = headless.clone();
    let tick_rate_hz = config.tick_rate_hz;
    let applet = Arc::new(Mutex::new(AutomaticDoorApplet::new(scene, clock, config)));

    let driver = DoorDriver::new(applet.clone(), cache, tick_rate_hz);
    driver
        .start(&source)
        .await
        .context("Failed to start door")?;

    // Scripted actions
    {
        let mut applet = applet.lock();
        for user in &args.users {
            applet.handle_event(SceneEvent::UserJoined(UserId::new(user.as_str())));
        }

        if let Some(user) = &args.approach {
            let user = UserId::new(user.as_str());
            let marker = applet.marker_of(&user);
            let trigger = applet.engine().trigger();
            match (marker, trigger) {
                (Some(other), Some(trigger)) => {
                    applet.handle_event(SceneEvent::TriggerEntered { trigger, other })
                }
                _ => log::warn!("Cannot approach: {} has not joined or door is not automatic", user),
            }
        }

        if args.use_handle {
            match applet.engine().part_object(PartKind::Handle) {
                Some(object) => applet.handle_event(SceneEvent::Clicked {
                    object,
                    user: UserId::new("door-sim"),
                }),
                None => log::warn!("Door has no handle"),
            }
        }

        if args.lock {
            applet.engine_mut().set_locked(true);
        }
    }

    let run_for = run_duration(args.run_for)?;
    driver
        .run(async move {
            tokio::select! {
                _ = tokio::time::sleep(run_for) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        })
        .await;

    let engine_state = {
        let applet = applet.lock();
        (applet.engine().is_open(), applet.engine().is_locked())
    };
    let scene = headless.lock();
    log::info!(
        "door-sim finished: open={}, locked={}, {} scene calls, {} sounds played, {} live objects",
        engine_state.0,
        engine_state.1,
        scene.calls().len(),
        scene.played_sounds().len(),
        scene.live_count(),
    );
    Ok(())
}
