use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use common::{BarSource, CurrentSide, InstrumentRecord, Position, PositionCommand};

use crate::evaluator;
use crate::indicators;

/// Periodic signal refresh: fetches recent bars per watched instrument,
/// computes the indicator snapshot, evaluates both rule sets against the
/// current exposure, and forwards the resulting signals to the position
/// manager. A bar-fetch failure for one instrument is logged and skipped.
pub struct SignalEngine {
    instruments: Vec<InstrumentRecord>,
    bars: Arc<dyn BarSource>,
    open_positions: Arc<RwLock<HashMap<String, Position>>>,
    command_tx: mpsc::Sender<PositionCommand>,
    interval: Duration,
}

impl SignalEngine {
    pub fn new(
        instruments: Vec<InstrumentRecord>,
        bars: Arc<dyn BarSource>,
        open_positions: Arc<RwLock<HashMap<String, Position>>>,
        command_tx: mpsc::Sender<PositionCommand>,
        interval: Duration,
    ) -> Self {
        Self {
            instruments,
            bars,
            open_positions,
            command_tx,
            interval,
        }
    }

    /// Run the refresh loop. Call from `tokio::spawn`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            instruments = self.instruments.len(),
            interval = ?self.interval,
            "SignalEngine running"
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_once().await,
                _ = shutdown.changed() => {
                    info!("SignalEngine shutting down");
                    return;
                }
            }
        }
    }

    /// One refresh pass over every watched instrument.
    pub async fn refresh_once(&self) {
        for inst in &self.instruments {
            let bars = match self.bars.recent_bars(inst.segment, &inst.token).await {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol = %inst.trading_symbol, error = %e, "Bar fetch failed — skipping instrument");
                    continue;
                }
            };
            let Some(reference_price) = bars.last().map(|b| b.close) else {
                debug!(symbol = %inst.trading_symbol, "No bars returned");
                continue;
            };

            let snapshot = indicators::snapshot(&bars);
            let side: CurrentSide = {
                let open = self.open_positions.read().await;
                open.get(&inst.token)
                    .filter(|p| p.is_open())
                    .map(|p| p.side)
                    .into()
            };

            for signal in evaluator::evaluate(&snapshot, side) {
                debug!(
                    symbol = %inst.trading_symbol,
                    action = %signal.action,
                    reason = %signal.reason,
                    "Signal generated"
                );
                let cmd = PositionCommand::Signal {
                    token: inst.token.clone(),
                    symbol: inst.trading_symbol.clone(),
                    segment: inst.segment,
                    signal,
                    reference_price,
                };
                if self.command_tx.send(cmd).await.is_err() {
                    warn!("Position command channel closed — stopping signal engine");
                    return;
                }
            }
        }
    }
}
