use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Bar, ExchangeSegment, InstrumentRecord, Result, Tick};

/// Credentials returned by the broker session collaborator. The streaming
/// credential is good for exactly one streaming connection; refresh is
/// handled outside this core.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub streaming_credential: String,
    pub session_credential: String,
}

/// Broker authentication/session collaborator. The login protocol itself
/// (TOTP exchange, token refresh) lives outside this core; failures must
/// carry an explicit reason.
#[async_trait]
pub trait BrokerAuth: Send + Sync {
    async fn login(&self) -> Result<SessionTokens>;

    /// Mid-session refresh.
    async fn relogin(&self) -> Result<SessionTokens>;
}

/// Point-in-time instrument master fetch. A failure must not crash the
/// session; callers degrade to "no symbol resolution available".
#[async_trait]
pub trait InstrumentSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<InstrumentRecord>>;
}

/// Events produced by a streaming transport connection. The feed session
/// state machine is driven entirely by this stream; there are no
/// free-floating callbacks.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Transport handshake completed; subscriptions may be issued.
    Opened,
    Tick(Tick),
    Error(String),
    Closed,
}

/// Streaming transport collaborator. `connect` yields the event stream for
/// one connection; a fresh call is required after `Closed`.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self, tokens: &SessionTokens) -> Result<mpsc::Receiver<TransportEvent>>;

    async fn subscribe(&self, segment: ExchangeSegment, tokens: &[String]) -> Result<()>;

    async fn unsubscribe(&self, segment: ExchangeSegment, tokens: &[String]) -> Result<()>;

    async fn close(&self);
}

/// Historical-bar collaborator used by the periodic signal refresh.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Recent bars for one instrument, oldest first.
    async fn recent_bars(&self, segment: ExchangeSegment, token: &str) -> Result<Vec<Bar>>;
}

/// Position persistence contract. Storage technology is a collaborator
/// detail; the core only needs save and open-lookup.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn save(&self, position: &crate::Position) -> Result<()>;

    async fn find_open(&self, token: &str) -> Result<Option<crate::Position>>;
}
