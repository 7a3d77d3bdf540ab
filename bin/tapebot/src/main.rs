use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    Config, FeedCommand, InstrumentSource, OutboundEvent, PositionCommand, TickEvent,
};
use feed::{
    FeedSession, HttpBarSource, HttpInstrumentSource, InstrumentRegistry, StaticAuth, Watchlist,
    WsTransport,
};
use positions::{PositionManager, RiskParams, SqliteStore};
use scheduler::Scheduler;
use strategy::SignalEngine;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!("TapeBot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let db = SqlitePool::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to database: {e}"));
    sqlx::migrate!("../../migrations")
        .run(&db)
        .await
        .unwrap_or_else(|e| panic!("Database migration failed: {e}"));
    info!("Database ready");

    // ── Channels ──────────────────────────────────────────────────────────────
    let (events_tx, _) = broadcast::channel::<OutboundEvent>(1024);
    let (tick_tx, _) = broadcast::channel::<TickEvent>(1024);
    let (feed_cmd_tx, feed_cmd_rx) = mpsc::channel::<FeedCommand>(64);
    let (pos_cmd_tx, pos_cmd_rx) = mpsc::channel::<PositionCommand>(128);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Instrument master + watchlist ─────────────────────────────────────────
    let master = HttpInstrumentSource::new(cfg.instrument_master_url.clone());
    let registry = match master.fetch().await {
        Ok(records) => InstrumentRegistry::new(records),
        Err(e) => {
            // Degraded mode: ticks come through with unresolved symbols
            error!(error = %e, "Instrument master fetch failed");
            let _ = events_tx.send(OutboundEvent::Error {
                message: format!("instrument master unavailable: {e}"),
            });
            InstrumentRegistry::empty()
        }
    };

    let watchlist = match Watchlist::load(&cfg.watchlist_path) {
        Ok(list) => list,
        Err(e) => panic!("Watchlist load failed: {e}"),
    };
    let instruments = watchlist.resolve(&registry);
    if instruments.is_empty() {
        warn!("Watchlist resolved to zero instruments");
    }
    info!(count = instruments.len(), "Watchlist resolved");

    // ── Position manager ──────────────────────────────────────────────────────
    let manager = PositionManager::new(
        pos_cmd_rx,
        tick_tx.subscribe(),
        events_tx.clone(),
        Arc::new(SqliteStore::new(db.clone())),
        RiskParams {
            quantity: cfg.quantity,
            risk_pct: cfg.risk_pct,
            reward_ratio: cfg.reward_ratio,
            mtm_min_change: cfg.mtm_min_change,
        },
    );
    let open_positions = manager.positions_handle();
    let watched_tokens: Vec<String> = instruments.iter().map(|i| i.token.clone()).collect();
    manager.recover(&watched_tokens).await;

    // ── Feed session ──────────────────────────────────────────────────────────
    let auth = Arc::new(StaticAuth::new(
        cfg.streaming_credential.clone(),
        cfg.session_credential.clone(),
    ));
    let transport = Arc::new(WsTransport::new(cfg.feed_ws_url.clone()));
    let session = FeedSession::new(
        auth,
        transport,
        registry,
        feed_cmd_rx,
        events_tx.clone(),
        tick_tx.clone(),
        Duration::from_secs(cfg.retry_delay_secs),
    );

    // ── Signal engine ─────────────────────────────────────────────────────────
    let bars = Arc::new(HttpBarSource::new(
        cfg.candle_api_url.clone(),
        cfg.session_credential.clone(),
    ));
    let signal_engine = SignalEngine::new(
        instruments.clone(),
        bars,
        open_positions.clone(),
        pos_cmd_tx.clone(),
        Duration::from_secs(cfg.signal_refresh_secs),
    );

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let square_off = Scheduler::new(
        pos_cmd_tx.clone(),
        open_positions.clone(),
        Duration::from_secs(cfg.scheduler_interval_secs),
        cfg.square_off_time,
    );

    // ── Outbound event drain ──────────────────────────────────────────────────
    // JSON lines on stdout are the client boundary for now
    let mut events_rx = events_tx.subscribe();
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "Event serialization failed"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Outbound event drain lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    tokio::spawn(session.run());
    tokio::spawn(manager.run());
    tokio::spawn(signal_engine.run(shutdown_rx.clone()));
    tokio::spawn(square_off.run(shutdown_rx));

    // Initial subscriptions, one command per segment
    let mut by_segment: HashMap<_, Vec<String>> = HashMap::new();
    for inst in &instruments {
        by_segment
            .entry(inst.segment)
            .or_default()
            .push(inst.token.clone());
    }
    for (segment, tokens) in by_segment {
        if feed_cmd_tx
            .send(FeedCommand::Subscribe { segment, tokens })
            .await
            .is_err()
        {
            error!("Feed command channel closed before startup finished");
            return;
        }
    }

    info!("All subsystems started. Waiting for shutdown signal.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Shutdown signal listener failed");
    }
    info!("Shutdown signal received. Exiting.");
    let _ = feed_cmd_tx.send(FeedCommand::Shutdown).await;
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(Duration::from_millis(200)).await;
}
