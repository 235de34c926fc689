//! `rush-server`: headless round server.
//!
//! Drives an [`Orchestrator`] over the flat reference world at the configured
//! tick rate, with optional bots so a round can run without a game client.
//!
//! ```text
//! rush-server [--config rush.toml] [--preset casual|standard|hardcore]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rush_core::config::GeneralConfig;
use rush_core::metrics::TickBudgetMonitor;
use rush_core::notify::{ChannelNotifier, Notice};
use rush_core::persistence::SqliteStore;
use rush_core::sim::FlatWorld;
use rush_core::Orchestrator;
use rush_host::bridge::EntityRegistry;
use rush_host::config::{HostConfig, RulePreset};
use rush_host::hooks;
use rush_host::systems::dispatch;

type Server = Orchestrator<FlatWorld, SqliteStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_tracing(&config.rush.general);
    info!(
        preset = %config.server.preset,
        tps = config.rush.general.ticks_per_second,
        db = %config.rush.persistence.path,
        "Starting rush server"
    );

    let store = SqliteStore::open(&config.rush.persistence.path, &config.rush.persistence)
        .with_context(|| format!("opening {}", config.rush.persistence.path))?;
    let world = FlatWorld::with_seed(config.rush.general.seed.unwrap_or(0x5eed));
    let (notifier, notices) = ChannelNotifier::channel();
    tokio::spawn(present(notices));

    let mut orch = Orchestrator::new(config.rush.clone(), world, store, notifier);
    let mut registry = EntityRegistry::new();
    let bots = admit_bots(&mut orch, &mut registry, config.server.bots);

    let tps = u64::from(config.rush.general.ticks_per_second.max(1));
    let status_every = config.rush.ticks(config.server.status_interval_seconds).max(1);
    let monitor = TickBudgetMonitor::new(config.server.tick_budget_ms);
    let mut interval = tokio::time::interval(Duration::from_micros(1_000_000 / tps));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                {
                    let _guard = monitor.begin_tick();
                    orch.tick();
                    if orch.now() % tps == 0 {
                        drive_bots(&mut orch, &mut registry, &bots);
                    }
                }
                if monitor.is_over_budget() {
                    warn!(tick = orch.now(), budget_ms = monitor.budget_ms(), "Tick over budget");
                }
                if orch.now() % status_every == 0 {
                    let status = orch.status();
                    info!(
                        phase = %status.phase,
                        seconds_left = status.seconds_left,
                        online = status.online,
                        containers = status.containers_active,
                        npcs = status.npcs_active,
                        encounters = status.encounters,
                        "Status"
                    );
                }
            }
            result = &mut shutdown => {
                result.context("listening for shutdown signal")?;
                break;
            }
        }
    }

    info!("Shutting down");
    orch.shutdown();
    let timings = monitor.percentiles();
    info!(p50 = timings.p50, p99 = timings.p99, max = timings.max, "Tick timings");
    if config.server.backup_on_exit {
        orch.store().create_rotating_backup().context("writing backup")?;
    }
    Ok(())
}

fn load_config() -> Result<HostConfig> {
    let mut path: Option<PathBuf> = None;
    let mut preset = RulePreset::Standard;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => path = Some(args.next().context("--config needs a path")?.into()),
            "--preset" => {
                let name = args.next().context("--preset needs a name")?;
                preset = name.parse().map_err(anyhow::Error::msg)?;
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    match path {
        Some(path) => HostConfig::from_file(&path).with_context(|| format!("loading {}", path.display())),
        None => Ok(HostConfig::for_preset(preset)),
    }
}

fn init_tracing(general: &GeneralConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if general.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Log every notice as one JSON line until the orchestrator goes away.
async fn present(mut notices: UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        match serde_json::to_string(&notice) {
            Ok(line) => info!(target: "rush::notice", "{line}"),
            Err(e) => warn!(error = %e, "Notice not serializable"),
        }
    }
}

fn admit_bots(orch: &mut Server, registry: &mut EntityRegistry, count: u32) -> Vec<u64> {
    (1..=u64::from(count))
        .map(|uid| {
            let name = format!("bot{uid}");
            let id = registry.player(uid);
            orch.env_mut().add_participant_with_id(id, &name);
            if let Err(reason) = dispatch(orch, registry, hooks::on_join(uid, name)) {
                warn!(uid, %reason, "Bot not admitted");
            }
            uid
        })
        .collect()
}

/// Once per second one bot eats something, so standings move.
fn drive_bots(orch: &mut Server, registry: &mut EntityRegistry, bots: &[u64]) {
    if bots.is_empty() || orch.current_phase() != rush_core::Phase::Active {
        return;
    }
    let second = orch.now() / u64::from(orch.config().general.ticks_per_second.max(1));
    let index = usize::try_from(second).unwrap_or(0) % bots.len();
    let _ = dispatch(orch, registry, hooks::on_item_consume(bots[index], "BREAD"));
}
