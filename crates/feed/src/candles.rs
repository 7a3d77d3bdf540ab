use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use common::{Bar, BarSource, Error, ExchangeSegment, Result};

const CANDLE_INTERVAL: &str = "FIVE_MINUTE";
const LOOKBACK_HOURS: i64 = 6;

/// Historical candles from the broker's REST candle endpoint. Each call
/// fetches a rolling lookback window ending now, oldest bar first.
pub struct HttpBarSource {
    client: reqwest::Client,
    url: String,
    session_credential: String,
}

impl HttpBarSource {
    pub fn new(url: impl Into<String>, session_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            session_credential: session_credential.into(),
        }
    }
}

#[async_trait]
impl BarSource for HttpBarSource {
    async fn recent_bars(&self, segment: ExchangeSegment, token: &str) -> Result<Vec<Bar>> {
        let to = Utc::now();
        let from = to - Duration::hours(LOOKBACK_HOURS);
        let body = json!({
            "exchange": segment.master_code(),
            "symboltoken": token,
            "interval": CANDLE_INTERVAL,
            "fromdate": from.format("%Y-%m-%d %H:%M").to_string(),
            "todate": to.format("%Y-%m-%d %H:%M").to_string(),
        });

        let response: CandleResponse = self
            .client
            .post(&self.url)
            .bearer_auth(&self.session_credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("candle body: {e}")))?;

        let bars = bars_from_rows(response.data)?;
        debug!(token = %token, count = bars.len(), "Fetched candles");
        Ok(bars)
    }
}

#[derive(Deserialize)]
struct CandleResponse {
    #[serde(default)]
    data: Vec<CandleRow>,
}

/// One candle row: `[timestamp, open, high, low, close, volume]`.
type CandleRow = (String, f64, f64, f64, f64, f64);

fn bars_from_rows(rows: Vec<CandleRow>) -> Result<Vec<Bar>> {
    rows.into_iter()
        .map(|(ts, open, high, low, close, volume)| {
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::MalformedResponse(format!("candle timestamp '{ts}': {e}")))?;
            Ok(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candle_rows_in_order() {
        let response: CandleResponse = serde_json::from_str(
            r#"{"data":[
                ["2024-03-01T09:15:00+05:30", 100.0, 101.5, 99.5, 101.0, 1200.0],
                ["2024-03-01T09:20:00+05:30", 101.0, 102.0, 100.5, 101.8, 950.0]
            ]}"#,
        )
        .unwrap();

        let bars = bars_from_rows(response.data).unwrap();
        assert_eq!(bars.len(), 2);
        assert!((bars[0].close - 101.0).abs() < 1e-9);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn rejects_bad_timestamps() {
        let rows = vec![("not-a-time".to_string(), 1.0, 1.0, 1.0, 1.0, 0.0)];
        assert!(bars_from_rows(rows).is_err());
    }

    #[test]
    fn missing_data_field_yields_no_bars() {
        let response: CandleResponse = serde_json::from_str(r#"{"status":true}"#).unwrap();
        assert!(bars_from_rows(response.data).unwrap().is_empty());
    }
}
