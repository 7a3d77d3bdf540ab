use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use common::{
    BrokerAuth, FeedCommand, FeedStatus, FeedTransport, OutboundEvent, Tick, TickEvent,
    TransportEvent,
};

use crate::registry::InstrumentRegistry;

/// Lifecycle of one streaming session across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    Connected,
    Streaming,
    Reconnecting,
    Closed,
}

/// The feed session state machine. Owns the transport event stream for the
/// current connection and the control command channel, and drives both from
/// one loop. On any transport error or close it re-authenticates and
/// reconnects after a flat retry delay, then replays every live
/// subscription. Only `Shutdown` ends the session.
pub struct FeedSession {
    auth: Arc<dyn BrokerAuth>,
    transport: Arc<dyn FeedTransport>,
    registry: InstrumentRegistry,
    commands: mpsc::Receiver<FeedCommand>,
    events: broadcast::Sender<OutboundEvent>,
    ticks: broadcast::Sender<TickEvent>,
    retry_delay: Duration,
    state: SessionState,
}

impl FeedSession {
    pub fn new(
        auth: Arc<dyn BrokerAuth>,
        transport: Arc<dyn FeedTransport>,
        registry: InstrumentRegistry,
        commands: mpsc::Receiver<FeedCommand>,
        events: broadcast::Sender<OutboundEvent>,
        ticks: broadcast::Sender<TickEvent>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            auth,
            transport,
            registry,
            commands,
            events,
            ticks,
            retry_delay,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session until shutdown. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        loop {
            self.state = SessionState::Authenticating;
            let tokens = match self.auth.login().await {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(error = %e, "Feed login failed");
                    self.emit_status(FeedStatus::Error, format!("login failed: {e}"));
                    if self.enter_retry().await {
                        return;
                    }
                    continue;
                }
            };

            info!("Connecting feed transport");
            let mut stream = match self.transport.connect(&tokens).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Feed connect failed");
                    self.emit_status(FeedStatus::Error, format!("connect failed: {e}"));
                    if self.enter_retry().await {
                        return;
                    }
                    continue;
                }
            };
            self.state = SessionState::Connected;

            // Inner loop: one connection's lifetime.
            let keep_running = self.drive_connection(&mut stream).await;
            if !keep_running {
                self.transport.close().await;
                self.state = SessionState::Closed;
                self.emit_status(FeedStatus::Disconnected, "shutdown".into());
                info!("Feed session closed");
                return;
            }

            if self.enter_retry().await {
                return;
            }
        }
    }

    /// Drive one connection until it drops. Returns false on shutdown.
    async fn drive_connection(&mut self, stream: &mut mpsc::Receiver<TransportEvent>) -> bool {
        loop {
            tokio::select! {
                event = stream.recv() => {
                    match event {
                        Some(TransportEvent::Opened) => {
                            self.state = SessionState::Streaming;
                            self.emit_status(FeedStatus::Connected, "stream opened".into());
                            self.resubscribe_all().await;
                        }
                        Some(TransportEvent::Tick(tick)) => self.handle_tick(tick),
                        Some(TransportEvent::Error(message)) => {
                            warn!(error = %message, "Feed transport error");
                            self.emit_status(FeedStatus::Error, message);
                            return true;
                        }
                        Some(TransportEvent::Closed) | None => {
                            info!("Feed connection closed");
                            return true;
                        }
                    }
                }
                cmd = self.commands.recv() => {
                    if !self.handle_command(cmd, true).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Flat-delay retry wait. Commands keep being served so the
    /// subscription book stays current for the replay after reconnect.
    /// Returns true on shutdown.
    async fn enter_retry(&mut self) -> bool {
        self.state = SessionState::Reconnecting;
        self.emit_status(
            FeedStatus::Reconnecting,
            format!("retrying in {}s", self.retry_delay.as_secs()),
        );
        let deadline = tokio::time::sleep(self.retry_delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return false,
                cmd = self.commands.recv() => {
                    if !self.handle_command(cmd, false).await {
                        self.transport.close().await;
                        self.state = SessionState::Closed;
                        self.emit_status(FeedStatus::Disconnected, "shutdown".into());
                        return true;
                    }
                }
            }
        }
    }

    /// Apply one control command. `live` says whether a streaming connection
    /// is up and transport calls should be issued. Returns false on
    /// shutdown or a closed command channel.
    async fn handle_command(&mut self, cmd: Option<FeedCommand>, live: bool) -> bool {
        match cmd {
            Some(FeedCommand::Subscribe { segment, tokens }) => {
                let added = self.registry.subscribe(segment, &tokens);
                if added.is_empty() {
                    debug!(segment = %segment, "Subscribe: nothing new");
                } else if live {
                    if let Err(e) = self.transport.subscribe(segment, &added).await {
                        warn!(segment = %segment, error = %e, "Subscribe failed");
                        self.emit_status(FeedStatus::Error, format!("subscribe failed: {e}"));
                    } else {
                        info!(segment = %segment, count = added.len(), "Subscribed");
                    }
                }
                true
            }
            Some(FeedCommand::Unsubscribe { segment, tokens }) => {
                let removed = self.registry.unsubscribe(segment, &tokens);
                if !removed.is_empty() && live {
                    if let Err(e) = self.transport.unsubscribe(segment, &removed).await {
                        warn!(segment = %segment, error = %e, "Unsubscribe failed");
                    } else {
                        info!(segment = %segment, count = removed.len(), "Unsubscribed");
                    }
                }
                true
            }
            Some(FeedCommand::Shutdown) => {
                info!("Feed shutdown requested");
                false
            }
            None => {
                warn!("Feed command channel closed");
                false
            }
        }
    }

    /// Replay the whole subscription book onto a fresh connection.
    async fn resubscribe_all(&mut self) {
        for (segment, tokens) in self.registry.active() {
            match self.transport.subscribe(segment, &tokens).await {
                Ok(()) => info!(segment = %segment, count = tokens.len(), "Resubscribed"),
                Err(e) => {
                    warn!(segment = %segment, error = %e, "Resubscribe failed");
                    self.emit_status(FeedStatus::Error, format!("resubscribe failed: {e}"));
                }
            }
        }
    }

    fn handle_tick(&mut self, tick: Tick) {
        let ltp = tick.price();
        let symbol = self.registry.symbol_for(&tick.token);
        let event = TickEvent {
            token: tick.token.clone(),
            symbol: symbol.clone(),
            ltp,
        };
        let _ = self.ticks.send(event);
        let _ = self.events.send(OutboundEvent::Tick {
            token: tick.token,
            symbol,
            ltp,
        });
    }

    fn emit_status(&self, state: FeedStatus, detail: String) {
        let _ = self.events.send(OutboundEvent::Status { state, detail });
    }
}
