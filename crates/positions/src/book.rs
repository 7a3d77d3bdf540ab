use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use common::{
    ExchangeSegment, OutboundEvent, Position, PositionCommand, PositionStatus, PositionStore,
    Side, SignalAction, TickEvent, TradeSignal,
};

pub const TARGET_REACHED: &str = "Target reached";
pub const STOPLOSS_HIT: &str = "Stoploss hit";

/// Entry sizing and exit parameters applied to every new position.
#[derive(Debug, Clone)]
pub struct RiskParams {
    pub quantity: f64,
    /// Adverse move from entry that places the stoploss (0.01 = 1%).
    pub risk_pct: f64,
    /// Reward:risk ratio that places the target (1.5 = 1.5:1).
    pub reward_ratio: f64,
    /// Minimum absolute MTM change worth persisting and emitting.
    pub mtm_min_change: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            quantity: 1.0,
            risk_pct: 0.01,
            reward_ratio: 1.5,
            mtm_min_change: 0.05,
        }
    }
}

/// Owns every position mutation. A single task drives `run()`, consuming the
/// command channel and the tick broadcast through one `select!` loop, so all
/// updates for all instruments are serialized and the one-open-position-per-
/// instrument invariant cannot race. Other components read through the shared
/// open-positions handle only.
pub struct PositionManager {
    command_rx: mpsc::Receiver<PositionCommand>,
    tick_rx: broadcast::Receiver<TickEvent>,
    events: broadcast::Sender<OutboundEvent>,
    store: Arc<dyn PositionStore>,
    open: Arc<RwLock<HashMap<String, Position>>>,
    params: RiskParams,
}

impl PositionManager {
    pub fn new(
        command_rx: mpsc::Receiver<PositionCommand>,
        tick_rx: broadcast::Receiver<TickEvent>,
        events: broadcast::Sender<OutboundEvent>,
        store: Arc<dyn PositionStore>,
        params: RiskParams,
    ) -> Self {
        Self {
            command_rx,
            tick_rx,
            events,
            store,
            open: Arc::new(RwLock::new(HashMap::new())),
            params,
        }
    }

    /// Shared read handle for the scheduler and the signal engine.
    pub fn positions_handle(&self) -> Arc<RwLock<HashMap<String, Position>>> {
        self.open.clone()
    }

    /// Reload open positions from the store after a restart. Call before
    /// spawning `run()`.
    pub async fn recover(&self, tokens: &[String]) {
        let mut open = self.open.write().await;
        for token in tokens {
            match self.store.find_open(token).await {
                Ok(Some(pos)) => {
                    info!(token = %token, symbol = %pos.symbol, "Recovered open position");
                    open.insert(token.clone(), pos);
                }
                Ok(None) => {}
                Err(e) => warn!(token = %token, error = %e, "Open-position lookup failed"),
            }
        }
    }

    /// Run the manager loop. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("PositionManager running");
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            warn!("Position command channel closed — PositionManager exiting");
                            return;
                        }
                    }
                }
                tick = self.tick_rx.recv() => {
                    match tick {
                        Ok(tick) => self.handle_tick(tick).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(dropped = n, "PositionManager tick channel lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("Tick broadcast closed — PositionManager exiting");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: PositionCommand) {
        match cmd {
            PositionCommand::Signal {
                token,
                symbol,
                segment,
                signal,
                reference_price,
            } => {
                self.handle_signal(token, symbol, segment, signal, reference_price)
                    .await
            }
            PositionCommand::Close {
                token,
                exit_price,
                reason,
            } => {
                self.close_position(&token, exit_price, &reason).await;
            }
            PositionCommand::SquareOffAll { reason } => self.square_off_all(&reason).await,
        }
    }

    async fn handle_signal(
        &mut self,
        token: String,
        symbol: String,
        segment: ExchangeSegment,
        signal: TradeSignal,
        reference_price: f64,
    ) {
        match signal.action {
            SignalAction::Buy | SignalAction::Sell => {
                let side = if signal.action == SignalAction::Buy {
                    Side::Long
                } else {
                    Side::Short
                };

                let mut open = self.open.write().await;
                if open.contains_key(&token) {
                    // Not an error: duplicate entries are expected when both
                    // rules fire in the same cycle
                    warn!(
                        symbol = %symbol,
                        action = %signal.action,
                        "Signal ignored — open position already exists"
                    );
                    return;
                }

                let position = self.build_position(token.clone(), symbol, segment, side, reference_price);
                open.insert(token, position.clone());
                drop(open);

                info!(
                    symbol = %position.symbol,
                    side = %position.side,
                    entry = position.entry_price,
                    target = position.target,
                    stoploss = position.stoploss,
                    reason = %signal.reason,
                    "Position opened"
                );
                self.persist(&position).await;
                let _ = self
                    .events
                    .send(OutboundEvent::PositionOpened { position });
            }
            SignalAction::Exit => {
                self.close_position(&token, reference_price, &signal.reason)
                    .await;
            }
        }
    }

    fn build_position(
        &self,
        token: String,
        symbol: String,
        segment: ExchangeSegment,
        side: Side,
        entry_price: f64,
    ) -> Position {
        let risk = entry_price * self.params.risk_pct;
        let reward = risk * self.params.reward_ratio;
        let (target, stoploss) = match side {
            Side::Long => (entry_price + reward, entry_price - risk),
            Side::Short => (entry_price - reward, entry_price + risk),
        };

        Position {
            id: uuid::Uuid::new_v4().to_string(),
            token,
            symbol,
            segment,
            side,
            entry_price,
            quantity: self.params.quantity,
            target,
            stoploss,
            mtm: 0.0,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        }
    }

    async fn handle_tick(&mut self, tick: TickEvent) {
        // One write-lock scope for the in-place update; the close (if any)
        // re-acquires the lock, which is safe because this task is the only
        // writer.
        let outcome = {
            let mut open = self.open.write().await;
            let Some(pos) = open.get_mut(&tick.token) else {
                return;
            };

            let mtm = pos.pnl_at(tick.ltp);
            let significant = (mtm - pos.mtm).abs() > self.params.mtm_min_change;
            if significant {
                pos.mtm = round2(mtm);
            }

            (pos.clone(), significant, breach_reason(pos, tick.ltp))
        };
        let (snapshot, significant, breach) = outcome;

        if significant {
            self.persist(&snapshot).await;
            let _ = self.events.send(OutboundEvent::MtmUpdate {
                token: tick.token.clone(),
                symbol: tick.symbol.clone(),
                ltp: tick.ltp,
                mtm: snapshot.mtm,
                entry_price: snapshot.entry_price,
            });
        }

        if let Some(reason) = breach {
            if let Some(closed) = self.close_position(&tick.token, tick.ltp, reason).await {
                info!(
                    symbol = %tick.symbol,
                    price = tick.ltp,
                    reason = %reason,
                    "Auto exit"
                );
                let _ = self.events.send(OutboundEvent::AutoExit {
                    token: tick.token,
                    symbol: tick.symbol,
                    exit_price: tick.ltp,
                    exit_reason: reason.to_string(),
                    mtm: closed.mtm,
                });
            }
        }
    }

    /// Close one open position. Idempotent: closing an absent or
    /// already-closed position is a reported no-op.
    async fn close_position(
        &mut self,
        token: &str,
        exit_price: f64,
        reason: &str,
    ) -> Option<Position> {
        let removed = self.open.write().await.remove(token);
        let Some(mut position) = removed else {
            debug!(token = %token, "Nothing to close");
            return None;
        };

        position.status = PositionStatus::Closed;
        position.exit_price = Some(exit_price);
        position.exit_time = Some(Utc::now());
        position.exit_reason = Some(reason.to_string());
        position.mtm = round2(position.pnl_at(exit_price));

        info!(
            symbol = %position.symbol,
            exit = exit_price,
            pnl = position.mtm,
            reason = %reason,
            "Position closed"
        );
        self.persist(&position).await;
        let _ = self.events.send(OutboundEvent::PositionClosed {
            position: position.clone(),
        });
        Some(position)
    }

    /// Force-close every open position at its entry price. The entry price
    /// is a documented approximation for the unavailable latest tick.
    async fn square_off_all(&mut self, reason: &str) {
        let targets: Vec<(String, f64)> = {
            let open = self.open.read().await;
            open.values()
                .map(|p| (p.token.clone(), p.entry_price))
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        info!(count = targets.len(), reason = %reason, "Squaring off open positions");
        for (token, entry_price) in targets {
            self.close_position(&token, entry_price, reason).await;
        }
    }

    async fn persist(&self, position: &Position) {
        if let Err(e) = self.store.save(position).await {
            warn!(symbol = %position.symbol, error = %e, "Position persist failed");
            let _ = self.events.send(OutboundEvent::Error {
                message: format!("persist failed for {}: {e}", position.symbol),
            });
        }
    }
}

/// Auto-exit check. Target breach: the price has covered at least 99% of the
/// entry-to-target distance in the favorable direction. Stoploss breach: the
/// price is at or past the stop in the adverse direction.
fn breach_reason(pos: &Position, ltp: f64) -> Option<&'static str> {
    match pos.side {
        Side::Long => {
            if ltp >= pos.entry_price + 0.99 * (pos.target - pos.entry_price) {
                Some(TARGET_REACHED)
            } else if ltp <= pos.stoploss {
                Some(STOPLOSS_HIT)
            } else {
                None
            }
        }
        Side::Short => {
            if ltp <= pos.entry_price - 0.99 * (pos.entry_price - pos.target) {
                Some(TARGET_REACHED)
            } else if ltp >= pos.stoploss {
                Some(STOPLOSS_HIT)
            } else {
                None
            }
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ─── Tests ────────────────────────────────────────────────────────────────────
