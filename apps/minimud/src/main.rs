mod conn;
mod eventlog;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use mudcore::{FileStore, Liveness, Locator, SessionKey, World, WorldConfig};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

fn usage_and_exit() -> ! {
    eprintln!(
        "minimud (world server)\n\n\
USAGE:\n  minimud [--bind HOST:PORT] [--data-dir DIR] [--log-dir DIR]\n\n\
ENV:\n  MINIMUD_BIND               default 0.0.0.0:7000\n  MINIMUD_DATA_DIR           default world (zones/ and players/ live here)\n  MINIMUD_LOG_DIR            default . (old logs move to <dir>/logs)\n  MINIMUD_TICK_MS            default 1000\n  MINIMUD_POLL_MS            default 50\n  MINIMUD_IDLE_TIMEOUT_S     default 300\n  MINIMUD_START_ROOM         optional; zone.room (default: first room)\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
    data_dir: PathBuf,
    log_dir: PathBuf,
    tick: Duration,
    poll: Duration,
    idle_timeout: Duration,
    start: Option<Locator>,
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or_else(|_| usage_and_exit()),
        Err(_) => default,
    }
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("MINIMUD_BIND")
        .unwrap_or_else(|_| "0.0.0.0:7000".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());
    let mut data_dir: PathBuf = std::env::var("MINIMUD_DATA_DIR")
        .unwrap_or_else(|_| "world".to_string())
        .into();
    let mut log_dir: PathBuf = std::env::var("MINIMUD_LOG_DIR")
        .unwrap_or_else(|_| ".".to_string())
        .into();

    let tick = Duration::from_millis(env_u64("MINIMUD_TICK_MS", 1000).max(1));
    let poll = Duration::from_millis(env_u64("MINIMUD_POLL_MS", 50).max(1));
    let idle_timeout = Duration::from_secs(env_u64("MINIMUD_IDLE_TIMEOUT_S", 300));
    let start = std::env::var("MINIMUD_START_ROOM")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| Locator::parse(&v).unwrap_or_else(|| usage_and_exit()));

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--data-dir" => {
                data_dir = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "--log-dir" => {
                log_dir = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        data_dir,
        log_dir,
        tick,
        poll,
        idle_timeout,
        start,
    }
}

struct Accepted {
    key: SessionKey,
    transport: conn::NetTransport,
}

async fn accept_task(listener: TcpListener, tx: mpsc::UnboundedSender<Accepted>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                warn!(err = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let _ = stream.set_nodelay(true);
        let transport = conn::spawn(stream, peer.to_string());
        let accepted = Accepted {
            key: SessionKey::from(peer.to_string()),
            transport,
        };
        if tx.send(accepted).is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = parse_args();
    let started = chrono::Local::now().naive_local();
    let log_path = eventlog::init(&cfg.log_dir, started)?;
    info!(log = %log_path.display(), "minimud starting");

    let world_cfg = WorldConfig {
        tick_length: cfg.tick,
        idle_timeout: cfg.idle_timeout,
        start: cfg.start.clone(),
        ..WorldConfig::default()
    };
    let store = FileStore::new(&cfg.data_dir);
    let mut world = World::new(world_cfg, Box::new(store))
        .with_context(|| format!("initialize world from {}", cfg.data_dir.display()))?;

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!(bind = %cfg.bind, data_dir = %cfg.data_dir.display(), "listening");

    let (accept_tx, mut accept_rx) = mpsc::unbounded_channel::<Accepted>();
    let acceptor = tokio::spawn(accept_task(listener, accept_tx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(cfg.poll);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while world.is_running() {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted; cleaning up the world");
                world.cleanup();
                break;
            }
            _ = poll.tick() => {}
        }

        while let Ok(a) = accept_rx.try_recv() {
            world.connect(a.key, Box::new(a.transport));
        }
        world.poll();
        for key in world.inactive_sessions() {
            world.disconnect(&key);
        }
    }

    acceptor.abort();
    let liveness = world.liveness();
    // Dropping the world drops every transport; writers flush and close.
    drop(world);
    tokio::time::sleep(Duration::from_millis(250)).await;

    if liveness == Liveness::RebootRequested {
        info!("rebooting server");
        return reboot();
    }
    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
fn reboot() -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("locate executable")?;
    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err).with_context(|| format!("exec {}", exe.display()))
}

#[cfg(not(unix))]
fn reboot() -> anyhow::Result<()> {
    anyhow::bail!("reboot by re-exec is only supported on unix")
}
