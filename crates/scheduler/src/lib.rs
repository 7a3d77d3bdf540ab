use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, Utc};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info};

use common::{Position, PositionCommand};

pub const SQUARE_OFF_REASON: &str = "Market close auto square-off";

/// Periodic session supervisor. Reports the open book on every pass and,
/// once the local clock passes the square-off cutoff, tells the position
/// manager to flatten everything. The square-off command is sent on each
/// late pass; the manager makes repeats harmless.
pub struct Scheduler {
    command_tx: mpsc::Sender<PositionCommand>,
    open: Arc<RwLock<HashMap<String, Position>>>,
    interval: Duration,
    cutoff: NaiveTime,
}

impl Scheduler {
    pub fn new(
        command_tx: mpsc::Sender<PositionCommand>,
        open: Arc<RwLock<HashMap<String, Position>>>,
        interval: Duration,
        cutoff: NaiveTime,
    ) -> Self {
        Self {
            command_tx,
            open,
            interval,
            cutoff,
        }
    }

    /// Run the supervision loop. Call from `tokio::spawn`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(cutoff = %self.cutoff, interval = ?self.interval, "Scheduler running");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // The cutoff is wall-clock exchange time
                    let now = Local::now().time();
                    if !self.run_once(now).await {
                        return;
                    }
                }
                _ = shutdown.changed() => {
                    info!("Scheduler shutting down");
                    return;
                }
            }
        }
    }

    /// One supervision pass at the given wall-clock time. Returns false
    /// when the command channel is gone.
    pub async fn run_once(&self, now: NaiveTime) -> bool {
        let open_count = self.open.read().await.len();
        debug!(open = open_count, time = %now, "Scheduler pass");

        if now >= self.cutoff && open_count > 0 {
            info!(open = open_count, cutoff = %self.cutoff, "Past square-off cutoff");
            if self
                .command_tx
                .send(PositionCommand::SquareOffAll {
                    reason: SQUARE_OFF_REASON.to_string(),
                })
                .await
                .is_err()
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::{Confidence, ExchangeSegment, OutboundEvent, SignalAction, TradeSignal};
    use positions::{MemoryStore, PositionManager, RiskParams};
    use tokio::sync::broadcast;

    fn entry(token: &str, price: f64) -> PositionCommand {
        PositionCommand::Signal {
            token: token.into(),
            symbol: format!("{token}-EQ"),
            segment: ExchangeSegment::NseCash,
            signal: TradeSignal {
                action: SignalAction::Buy,
                reason: "+DI 25.00 > 20 (strong uptrend)".into(),
                confidence: Some(Confidence::High),
            },
            reference_price: price,
        }
    }

    #[tokio::test]
    async fn past_cutoff_every_open_position_closes_exactly_once() {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (_tick_tx, tick_rx) = broadcast::channel(8);
        let (events_tx, mut events_rx) = broadcast::channel(64);
        let manager = PositionManager::new(
            command_rx,
            tick_rx,
            events_tx,
            Arc::new(MemoryStore::new()),
            RiskParams::default(),
        );
        let open = manager.positions_handle();
        tokio::spawn(manager.run());

        command_tx.send(entry("T1", 100.0)).await.unwrap();
        command_tx.send(entry("T2", 50.0)).await.unwrap();
        for _ in 0..2 {
            loop {
                let event = tokio::time::timeout(Duration::from_secs(1), events_rx.recv())
                    .await
                    .unwrap()
                    .unwrap();
                if matches!(event, OutboundEvent::PositionOpened { .. }) {
                    break;
                }
            }
        }

        let scheduler = Scheduler::new(
            command_tx.clone(),
            open.clone(),
            Duration::from_secs(30),
            NaiveTime::from_hms_opt(15, 25, 0).unwrap(),
        );

        // Before the cutoff nothing happens
        assert!(scheduler.run_once(NaiveTime::from_hms_opt(14, 0, 0).unwrap()).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(open.read().await.len(), 2);

        // Past the cutoff both positions flatten
        assert!(scheduler.run_once(NaiveTime::from_hms_opt(15, 25, 0).unwrap()).await);
        let mut closed = 0;
        while closed < 2 {
            let event = tokio::time::timeout(Duration::from_secs(1), events_rx.recv())
                .await
                .unwrap()
                .unwrap();
            if let OutboundEvent::PositionClosed { position } = event {
                assert_eq!(position.exit_reason.as_deref(), Some(SQUARE_OFF_REASON));
                closed += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(open.read().await.is_empty());

        // A later pass finds an empty book and stays quiet
        assert!(scheduler.run_once(NaiveTime::from_hms_opt(15, 26, 0).unwrap()).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            events_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn closed_command_channel_stops_the_scheduler() {
        let (command_tx, command_rx) = mpsc::channel::<PositionCommand>(1);
        drop(command_rx);
        let open: Arc<RwLock<HashMap<String, Position>>> = Arc::new(RwLock::new(HashMap::new()));
        // Seed a fake open position so the pass attempts to send
        {
            let mut guard = open.write().await;
            guard.insert(
                "T1".into(),
                Position {
                    id: "p1".into(),
                    token: "T1".into(),
                    symbol: "T1-EQ".into(),
                    segment: ExchangeSegment::NseCash,
                    side: common::Side::Long,
                    entry_price: 100.0,
                    quantity: 1.0,
                    target: 101.5,
                    stoploss: 99.0,
                    mtm: 0.0,
                    status: common::PositionStatus::Open,
                    opened_at: Utc::now(),
                    exit_price: None,
                    exit_time: None,
                    exit_reason: None,
                },
            );
        }

        let scheduler = Scheduler::new(
            command_tx,
            open,
            Duration::from_secs(30),
            NaiveTime::from_hms_opt(15, 25, 0).unwrap(),
        );
        assert!(!scheduler.run_once(NaiveTime::from_hms_opt(15, 30, 0).unwrap()).await);
    }
}
