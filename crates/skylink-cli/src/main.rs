use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use skylink_fc::autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs, AutodetectResult};
use skylink_fc::mode::mode_names;
use skylink_fc::runtime::open_serial;
use skylink_fc::{spawn_link, FcConfig, LinkEvent, Location, SpawnedLink};
use skylink_wire::MessageKind;

#[derive(Debug, Parser)]
#[command(name = "skylink", version, about = "skylink - MAVLink vehicle link client")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config file.
    Doctor,
    /// Probe serial ports/bauds for MAVLink heartbeats.
    Autodetect,
    /// Stream link events until interrupted.
    Run {
        /// One JSON object per line instead of log-style text.
        #[arg(long)]
        json: bool,
    },
    /// Download and print the mission.
    Waypoints,
    /// Download and print the parameter table.
    Params,
    /// Switch flight mode by name (RTL, LOITER, GUIDED, ...).
    Mode { name: String },
    /// Send a guided target, altitude relative to home.
    Guided { lat: f64, lon: f64, alt: f32 },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    link: FcConfig,

    /// How long one-shot commands wait for the vehicle. Default 30s.
    command_timeout_s: Option<u64>,
}

impl Config {
    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_s.unwrap_or(30))
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Autodetect => autodetect(&cfg).await?,
        Command::Run { json } => run(&cfg, json).await?,
        Command::Waypoints => waypoints(&cfg).await?,
        Command::Params => params(&cfg).await?,
        Command::Mode { name } => mode(&cfg, &name).await?,
        Command::Guided { lat, lon, alt } => guided(&cfg, lat, lon, alt).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    let fc = &cfg.link;

    if fc.autodetect {
        info!("doctor: autodetect enabled (OK)");
        if let Some(devs) = &fc.candidate_devs {
            anyhow::ensure!(!devs.is_empty(), "link.candidate_devs is empty");
        }
        if let Some(bauds) = &fc.candidate_bauds {
            anyhow::ensure!(bauds.iter().all(|b| *b > 0), "link.candidate_bauds contains 0");
        }
    } else {
        anyhow::ensure!(fc.serial_dev.as_ref().map(|s| !s.is_empty()).unwrap_or(false), "link.serial_dev missing");
        anyhow::ensure!(fc.baud.unwrap_or(0) > 0, "link.baud invalid");
    }

    anyhow::ensure!(fc.sys_id != fc.target_sys, "link.sys_id must differ from link.target_sys");
    anyhow::ensure!(fc.retry_attempts != Some(0), "link.retry_attempts must be at least 1");
    anyhow::ensure!(fc.retry_interval_ms != Some(0), "link.retry_interval_ms must be positive");
    if let Some(hz) = fc.send_heartbeat_hz {
        anyhow::ensure!((0.0..=50.0).contains(&hz), "link.send_heartbeat_hz out of range: {}", hz);
    }

    let s = fc.link_settings();
    info!(
        "doctor: target {}/{} retry {}x{:?} liveness {:?} params {:?}",
        s.target_sys, s.target_comp, s.retry.attempts, s.retry.interval, s.liveness_timeout, s.param_completion
    );
    info!("doctor: OK");
    Ok(())
}

async fn autodetect(cfg: &Config) -> Result<()> {
    let res = run_autodetect(&cfg.link).await?;
    if let Some((dev, baud)) = res.chosen {
        println!("CHOSEN: {} @ {}", dev, baud);
    } else {
        println!("CHOSEN: none");
    }
    for p in res.probes {
        println!("probe dev={} baud={} hb={} {}ms note={}", p.dev, p.baud, p.hb_seen, p.elapsed_ms, p.note);
    }
    Ok(())
}

#[derive(Serialize)]
struct Stamped<'a> {
    ts_unix_ms: i64,
    #[serde(flatten)]
    event: &'a LinkEvent,
}

async fn run(cfg: &Config, json: bool) -> Result<()> {
    info!("run: starting");
    let mut link = connect(&cfg.link).await?;

    loop {
        tokio::select! {
            ev = link.events.recv() => {
                let Some(ev) = ev else { break };
                print_event(&ev, json)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("run: interrupted");
                break;
            }
        }
    }

    if let Ok(snap) = link.handle.snapshot().await {
        info!("run: final stats {:?}", snap.stats);
    }
    Ok(())
}

fn print_event(ev: &LinkEvent, json: bool) -> Result<()> {
    let ts_unix_ms = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    if json {
        println!("{}", serde_json::to_string(&Stamped { ts_unix_ms, event: ev })?);
        return Ok(());
    }
    match ev {
        LinkEvent::WaypointsDownloaded(items) => println!("{} waypoints: {}", ts_unix_ms, items.len()),
        LinkEvent::ParametersDownloaded(table) => {
            println!("{} params: {}/{}", ts_unix_ms, table.filled(), table.total())
        }
        other => println!("{} {:?}", ts_unix_ms, other),
    }
    Ok(())
}

async fn waypoints(cfg: &Config) -> Result<()> {
    let mut link = connect(&cfg.link).await?;
    let ev = wait_for(&mut link, cfg.command_timeout(), |e| {
        matches!(e, LinkEvent::WaypointsDownloaded(_)) || failed(e, &[MessageKind::MissionCount, MessageKind::MissionItem])
    })
    .await?;
    let LinkEvent::WaypointsDownloaded(items) = ev else {
        anyhow::bail!("waypoint download failed: {:?}", ev);
    };
    for item in &items {
        println!("{}", serde_json::to_string(item)?);
    }
    info!("waypoints: {} items", items.len());
    Ok(())
}

async fn params(cfg: &Config) -> Result<()> {
    let mut link = connect(&cfg.link).await?;
    let ev = wait_for(&mut link, cfg.command_timeout(), |e| {
        matches!(e, LinkEvent::ParametersDownloaded(_)) || failed(e, &[MessageKind::ParamValue])
    })
    .await?;
    let LinkEvent::ParametersDownloaded(table) = ev else {
        anyhow::bail!("parameter download failed: {:?}", ev);
    };
    for (index, p) in table.present() {
        println!("{:4} {:16} {}", index, p.name, p.value);
    }
    if !table.is_filled() {
        warn!("params: only {} of {} received", table.filled(), table.total());
    }
    Ok(())
}

async fn mode(cfg: &Config, name: &str) -> Result<()> {
    let mut link = connect(&cfg.link).await?;
    wait_for(&mut link, cfg.command_timeout(), |e| matches!(e, LinkEvent::VehicleFound)).await?;
    let code = link
        .handle
        .set_mode(name)
        .await
        .with_context(|| format!("set mode {} (known: {})", name, mode_names().collect::<Vec<_>>().join(", ")))?;
    info!("mode: sent {} ({}), waiting for heartbeat", name, code);

    let want = name.to_ascii_uppercase();
    wait_for(&mut link, cfg.command_timeout(), |e| matches!(e, LinkEvent::ModeChanged(m) if *m == want)).await?;
    println!("mode: {}", want);
    Ok(())
}

async fn guided(cfg: &Config, lat: f64, lon: f64, alt: f32) -> Result<()> {
    anyhow::ensure!((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon), "coordinates out of range");
    let mut link = connect(&cfg.link).await?;
    wait_for(&mut link, cfg.command_timeout(), |e| matches!(e, LinkEvent::VehicleFound)).await?;

    let target = Location { lat, lon, alt_m: alt, relative_alt_m: alt, heading_deg: None };
    link.handle.set_guided(target).await.context("send guided target")?;
    let ev = wait_for(&mut link, cfg.command_timeout(), |e| {
        matches!(e, LinkEvent::GuidedAck { .. }) || failed(e, &[MessageKind::MissionAck])
    })
    .await?;
    match ev {
        LinkEvent::GuidedAck { result: 0 } => println!("guided: accepted"),
        LinkEvent::GuidedAck { result } => anyhow::bail!("guided target rejected (result {})", result),
        other => anyhow::bail!("guided target not acknowledged: {:?}", other),
    }
    Ok(())
}

fn failed(ev: &LinkEvent, kinds: &[MessageKind]) -> bool {
    match ev {
        LinkEvent::ExchangeFailed { expected, .. } | LinkEvent::DownloadInterrupted { expected } => {
            kinds.contains(expected)
        }
        _ => false,
    }
}

async fn wait_for(link: &mut SpawnedLink, timeout: Duration, want: impl Fn(&LinkEvent) -> bool) -> Result<LinkEvent> {
    let events = &mut link.events;
    let wait = async {
        while let Some(ev) = events.recv().await {
            if want(&ev) {
                return Some(ev);
            }
        }
        None
    };
    tokio::time::timeout(timeout, wait)
        .await
        .context("timed out waiting for vehicle")?
        .context("link closed")
}

async fn connect(fc: &FcConfig) -> Result<SpawnedLink> {
    let (dev, baud) = resolve_fc_port(fc).await?;
    let port = open_serial(&dev, baud)?;
    info!("link: {} @ {} as {}/{}", dev, baud, fc.sys_id, fc.comp_id);
    let (reader, writer) = tokio::io::split(port);
    Ok(spawn_link(fc.link_settings(), fc.runtime_options(), reader, writer))
}

async fn run_autodetect(fc: &FcConfig) -> Result<AutodetectResult> {
    let devs = fc.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
    let bauds = fc.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
    autodetect_fc(devs, bauds, fc.heartbeat_timeout(), fc.target_sys).await
}

async fn resolve_fc_port(fc: &FcConfig) -> Result<(String, u32)> {
    if fc.autodetect {
        let res = run_autodetect(fc).await?;
        if let Some((dev, baud)) = res.chosen {
            return Ok((dev, baud));
        }
        anyhow::bail!("autodetect failed: no heartbeat found");
    } else {
        let dev = fc.serial_dev.clone().context("link.serial_dev missing (autodetect=false)")?;
        let baud = fc.baud.context("link.baud missing (autodetect=false)")?;
        Ok((dev, baud))
    }
}
