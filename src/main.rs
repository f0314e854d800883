//! tinyircd - minimalist IRC server.
//!
//! Per-connection tasks feed a single daemon arbiter that owns all global
//! state; each room runs as its own actor; transcripts and room metadata
//! flow into dedicated sink tasks. See DESIGN.md for the full picture.

mod client;
mod config;
mod daemon;
mod listener;
mod persist;
mod room;

use crate::config::{Args, Config};
use crate::daemon::{ClientEvent, Daemon};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .init();

    let config = Config::from_args(args).map_err(|e| {
        error!(error = %e, "invalid configuration");
        e
    })?;

    info!(
        hostname = %config.hostname,
        version = env!("CARGO_PKG_VERSION"),
        "tinyircd starting"
    );

    let (log_tx, log_task) = persist::spawn_transcript_writer(config.logdir.clone());
    if let Some(dir) = &config.logdir {
        info!(dir = %dir.display(), "transcript writer initialized");
    }
    let (state_tx, state_task) = persist::spawn_state_keeper(config.statedir.clone());

    let mut daemon = Daemon::new(&config, log_tx, state_tx);
    if let Some(dir) = &config.statedir {
        for state in persist::load_rooms(dir)? {
            info!(room = %state.name, "loaded room state");
            daemon.register_room(&state.name, state.topic, state.key);
        }
        info!(dir = %dir.display(), "state keeper initialized");
    }
    if config.passwords.is_some() {
        daemon.reload_passwords();
    }

    let (events_tx, events_rx) = mpsc::channel(64);

    if let Some(bind) = config.bind {
        let sock = TcpListener::bind(bind).await?;
        info!(%bind, "listening");
        tokio::spawn(listener::accept_loop(
            sock,
            config.hostname.clone(),
            events_tx.clone(),
        ));
    }
    if let Some(tls) = &config.tls {
        let acceptor = listener::tls_acceptor(&tls.cert, &tls.key)?;
        let sock = TcpListener::bind(tls.bind).await?;
        info!(bind = %tls.bind, "TLS listening");
        tokio::spawn(listener::accept_loop_tls(
            sock,
            acceptor,
            config.hostname.clone(),
            events_tx.clone(),
        ));
    }

    daemon::spawn_ticker(events_tx.clone());

    // SIGHUP refreshes the passwords file.
    if config.passwords.is_some() {
        let tx = events_tx.clone();
        let mut hups = signal(SignalKind::hangup())?;
        tokio::spawn(async move {
            while hups.recv().await.is_some() {
                info!("SIGHUP: refreshing passwords");
                if tx.send(ClientEvent::Rehash).await.is_err() {
                    break;
                }
            }
        });
    }

    // SIGINT/SIGTERM shut the server down cooperatively.
    {
        let tx = events_tx.clone();
        let mut terms = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terms.recv() => {}
            }
            info!("shutting down");
            let _ = tx.send(ClientEvent::Term).await;
        });
    }

    daemon.run(events_rx).await;

    // The daemon and all room actors are gone, so the sinks' channels are
    // closed; waiting on them flushes trailing transcript/state writes.
    let _ = log_task.await;
    let _ = state_task.await;
    Ok(())
}
