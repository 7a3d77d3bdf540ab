use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use common::{Error, ExchangeSegment, FeedTransport, Result, SessionTokens, Tick, TransportEvent};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const SUBSCRIBE_ACTION: u8 = 1;
const UNSUBSCRIBE_ACTION: u8 = 0;
const LTP_MODE: u8 = 1;

/// WebSocket implementation of the streaming transport. One `connect` call
/// yields the event stream for one connection; the write half is kept for
/// subscribe frames until the reader sees the connection drop.
pub struct WsTransport {
    url: String,
    writer: Mutex<Option<WsSink>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            writer: Mutex::new(None),
        }
    }

    async fn send_frame(&self, frame: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => sink
                .send(Message::Text(frame))
                .await
                .map_err(|e| Error::Transport(e.to_string())),
            None => Err(Error::Transport("not connected".into())),
        }
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&self, tokens: &SessionTokens) -> Result<mpsc::Receiver<TransportEvent>> {
        let url = url::Url::parse(&self.url).map_err(|e| Error::Transport(e.to_string()))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Transport(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            format!("Bearer {}", tokens.session_credential)
                .parse()
                .map_err(|_| Error::Transport("bad session credential".into()))?,
        );
        headers.insert(
            "x-feed-token",
            tokens
                .streaming_credential
                .parse()
                .map_err(|_| Error::Transport("bad streaming credential".into()))?,
        );

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        info!(url = %self.url, "Feed WebSocket connected");

        let (sink, mut read) = stream.split();
        *self.writer.lock().await = Some(sink);

        let (event_tx, event_rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            // Handshake is complete once connect_async returns.
            if event_tx.send(TransportEvent::Opened).await.is_err() {
                return;
            }
            while let Some(msg) = read.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => match parse_tick(&text) {
                        Some(tick) => TransportEvent::Tick(tick),
                        None => {
                            debug!(frame = %text, "Skipping non-tick frame");
                            continue;
                        }
                    },
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Binary(_)) => {
                        continue;
                    }
                    Ok(Message::Close(_)) => TransportEvent::Closed,
                    Ok(Message::Frame(_)) => continue,
                    Err(e) => TransportEvent::Error(e.to_string()),
                };
                let terminal = !matches!(event, TransportEvent::Tick(_));
                if event_tx.send(event).await.is_err() || terminal {
                    return;
                }
            }
            let _ = event_tx.send(TransportEvent::Closed).await;
        });

        Ok(event_rx)
    }

    async fn subscribe(&self, segment: ExchangeSegment, tokens: &[String]) -> Result<()> {
        self.send_frame(action_frame(SUBSCRIBE_ACTION, segment, tokens))
            .await
    }

    async fn unsubscribe(&self, segment: ExchangeSegment, tokens: &[String]) -> Result<()> {
        self.send_frame(action_frame(UNSUBSCRIBE_ACTION, segment, tokens))
            .await
    }

    async fn close(&self) {
        if let Some(mut sink) = self.writer.lock().await.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                warn!(error = %e, "WebSocket close failed");
            }
        }
    }
}

/// Subscribe/unsubscribe frame in the wire format the feed expects.
fn action_frame(action: u8, segment: ExchangeSegment, tokens: &[String]) -> String {
    json!({
        "correlationID": "tapebot",
        "action": action,
        "params": {
            "mode": LTP_MODE,
            "tokenList": [{
                "exchangeType": segment.wire_code(),
                "tokens": tokens,
            }],
        },
    })
    .to_string()
}

#[derive(Deserialize)]
struct RawTick {
    token: String,
    last_traded_price: i64,
}

/// Parse one text frame into a tick. Frames without the tick fields
/// (heartbeats, acks) return None and are skipped.
fn parse_tick(text: &str) -> Option<Tick> {
    let raw: RawTick = serde_json::from_str(text).ok()?;
    Some(Tick {
        token: raw.token,
        ltp_paise: raw.last_traded_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_carries_wire_code_and_tokens() {
        let frame = action_frame(
            SUBSCRIBE_ACTION,
            ExchangeSegment::NseFo,
            &["26009".into(), "26000".into()],
        );
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["action"], 1);
        assert_eq!(value["params"]["mode"], 1);
        assert_eq!(value["params"]["tokenList"][0]["exchangeType"], 2);
        assert_eq!(value["params"]["tokenList"][0]["tokens"][0], "26009");
    }

    #[test]
    fn unsubscribe_frame_uses_action_zero() {
        let frame = action_frame(UNSUBSCRIBE_ACTION, ExchangeSegment::NseCash, &["3045".into()]);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["action"], 0);
    }

    #[test]
    fn parses_tick_frames_and_skips_the_rest() {
        let tick = parse_tick(r#"{"token":"3045","last_traded_price":62345}"#).unwrap();
        assert_eq!(tick.token, "3045");
        assert!((tick.price() - 623.45).abs() < 1e-9);

        assert!(parse_tick(r#"{"status":"connected"}"#).is_none());
        assert!(parse_tick("pong").is_none());
    }
}
