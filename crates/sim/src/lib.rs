//! Scripted collaborators for exercising the feed session without a live
//! broker connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use common::{
    BrokerAuth, Error, ExchangeSegment, FeedTransport, Result, SessionTokens, TransportEvent,
};

/// Auth stub that either always succeeds or fails a fixed number of times
/// before succeeding.
pub struct ScriptedAuth {
    failures_left: AtomicUsize,
    logins: AtomicUsize,
}

impl ScriptedAuth {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            logins: AtomicUsize::new(0),
        }
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    fn tokens() -> SessionTokens {
        SessionTokens {
            streaming_credential: "feed-token".into(),
            session_credential: "session-token".into(),
        }
    }
}

#[async_trait]
impl BrokerAuth for ScriptedAuth {
    async fn login(&self) -> Result<SessionTokens> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::Auth("scripted login failure".into()));
        }
        Ok(Self::tokens())
    }

    async fn relogin(&self) -> Result<SessionTokens> {
        self.login().await
    }
}

/// Transport stub driven by per-connection event scripts. Each `connect`
/// pops the next script and plays its events into the returned channel; the
/// sender is retained so the connection stays open after the script is
/// exhausted until the script ends with `Closed`.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
    held_senders: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    connects: AtomicUsize,
    subscriptions: Mutex<Vec<(ExchangeSegment, Vec<String>)>>,
    unsubscriptions: Mutex<Vec<(ExchangeSegment, Vec<String>)>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Vec<TransportEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub async fn subscriptions(&self) -> Vec<(ExchangeSegment, Vec<String>)> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn unsubscriptions(&self) -> Vec<(ExchangeSegment, Vec<String>)> {
        self.unsubscriptions.lock().await.clone()
    }

    /// Push live events into the most recent open connection.
    pub async fn inject(&self, event: TransportEvent) {
        let senders = self.held_senders.lock().await;
        if let Some(tx) = senders.last() {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&self, _tokens: &SessionTokens) -> Result<mpsc::Receiver<TransportEvent>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::Transport("no scripted connection left".into()))?;

        let (tx, rx) = mpsc::channel(64);
        for event in script {
            let _ = tx.send(event).await;
        }
        self.held_senders.lock().await.push(tx);
        Ok(rx)
    }

    async fn subscribe(&self, segment: ExchangeSegment, tokens: &[String]) -> Result<()> {
        self.subscriptions
            .lock()
            .await
            .push((segment, tokens.to_vec()));
        Ok(())
    }

    async fn unsubscribe(&self, segment: ExchangeSegment, tokens: &[String]) -> Result<()> {
        self.unsubscriptions
            .lock()
            .await
            .push((segment, tokens.to_vec()));
        Ok(())
    }

    async fn close(&self) {
        self.held_senders.lock().await.clear();
    }
}
