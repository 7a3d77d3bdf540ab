use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use common::{Error, ExchangeSegment, InstrumentRecord, InstrumentSource, Result};

/// Instrument master fetched once at startup from the broker's published
/// scrip dump. Rows with an unrecognized exchange segment are dropped.
pub struct HttpInstrumentSource {
    client: reqwest::Client,
    url: String,
}

impl HttpInstrumentSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl InstrumentSource for HttpInstrumentSource {
    async fn fetch(&self) -> Result<Vec<InstrumentRecord>> {
        let rows: Vec<MasterRow> = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::InstrumentMaster(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::InstrumentMaster(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::InstrumentMaster(format!("malformed master: {e}")))?;

        let records = records_from_rows(rows);
        info!(count = records.len(), "Instrument master loaded");
        Ok(records)
    }
}

#[derive(Deserialize)]
struct MasterRow {
    token: String,
    symbol: String,
    exch_seg: String,
}

fn records_from_rows(rows: Vec<MasterRow>) -> Vec<InstrumentRecord> {
    let mut skipped = 0usize;
    let records: Vec<_> = rows
        .into_iter()
        .filter_map(|row| match ExchangeSegment::from_master_code(&row.exch_seg) {
            Some(segment) => Some(InstrumentRecord {
                token: row.token,
                trading_symbol: row.symbol,
                segment,
            }),
            None => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        debug!(skipped, "Dropped master rows with unknown segments");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rows_and_drops_unknown_segments() {
        let rows: Vec<MasterRow> = serde_json::from_str(
            r#"[
                {"token":"3045","symbol":"SBIN-EQ","exch_seg":"NSE"},
                {"token":"26009","symbol":"BANKNIFTY","exch_seg":"NFO"},
                {"token":"1","symbol":"WEIRD","exch_seg":"XYZ"}
            ]"#,
        )
        .unwrap();

        let records = records_from_rows(rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].trading_symbol, "SBIN-EQ");
        assert_eq!(records[0].segment, ExchangeSegment::NseCash);
        assert_eq!(records[1].segment, ExchangeSegment::NseFo);
    }
}
