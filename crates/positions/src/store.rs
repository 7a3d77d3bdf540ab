use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use common::{Error, Position, PositionStatus, PositionStore, Result};

/// SQLite-backed position store. One row per position, upserted on every
/// state change.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionStore for SqliteStore {
    async fn save(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions
                (id, token, symbol, segment, side, entry_price, quantity,
                 target, stoploss, mtm, status, opened_at,
                 exit_price, exit_time, exit_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                mtm = excluded.mtm,
                status = excluded.status,
                exit_price = excluded.exit_price,
                exit_time = excluded.exit_time,
                exit_reason = excluded.exit_reason
            "#,
        )
        .bind(&position.id)
        .bind(&position.token)
        .bind(&position.symbol)
        .bind(position.segment.to_string())
        .bind(position.side.to_string())
        .bind(position.entry_price)
        .bind(position.quantity)
        .bind(position.target)
        .bind(position.stoploss)
        .bind(position.mtm)
        .bind(position.status.to_string())
        .bind(position.opened_at.to_rfc3339())
        .bind(position.exit_price)
        .bind(position.exit_time.map(|t| t.to_rfc3339()))
        .bind(&position.exit_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_open(&self, token: &str) -> Result<Option<Position>> {
        let row = sqlx::query(
            r#"
            SELECT id, token, symbol, segment, side, entry_price, quantity,
                   target, stoploss, mtm, status, opened_at,
                   exit_price, exit_time, exit_reason
            FROM positions
            WHERE token = ?1 AND status = 'OPEN'
            LIMIT 1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(position_from_row).transpose()
    }
}

fn position_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Position> {
    let segment: String = row.try_get("segment")?;
    let side: String = row.try_get("side")?;
    let status: String = row.try_get("status")?;
    let opened_at: String = row.try_get("opened_at")?;
    let exit_time: Option<String> = row.try_get("exit_time")?;

    Ok(Position {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        symbol: row.try_get("symbol")?,
        segment: segment
            .parse()
            .map_err(|e: String| Error::Other(format!("bad segment column: {e}")))?,
        side: side
            .parse()
            .map_err(|e: String| Error::Other(format!("bad side column: {e}")))?,
        entry_price: row.try_get("entry_price")?,
        quantity: row.try_get("quantity")?,
        target: row.try_get("target")?,
        stoploss: row.try_get("stoploss")?,
        mtm: row.try_get("mtm")?,
        status: if status == "OPEN" {
            PositionStatus::Open
        } else {
            PositionStatus::Closed
        },
        opened_at: parse_timestamp(&opened_at)?,
        exit_price: row.try_get("exit_price")?,
        exit_time: exit_time.as_deref().map(parse_timestamp).transpose()?,
        exit_reason: row.try_get("exit_reason")?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("bad timestamp column: {e}")))
}

/// In-memory store used by tests and simulated runs.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, Position>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved rows, for assertions.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn save(&self, position: &Position) -> Result<()> {
        self.rows
            .lock()
            .await
            .insert(position.id.clone(), position.clone());
        Ok(())
    }

    async fn find_open(&self, token: &str) -> Result<Option<Position>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .find(|p| p.token == token && p.is_open())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExchangeSegment, Side};

    fn sample(token: &str) -> Position {
        Position {
            id: uuid::Uuid::new_v4().to_string(),
            token: token.into(),
            symbol: format!("{token}-EQ"),
            segment: ExchangeSegment::NseCash,
            side: Side::Long,
            entry_price: 100.0,
            quantity: 1.0,
            target: 101.5,
            stoploss: 99.0,
            mtm: 0.0,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        }
    }

    #[tokio::test]
    async fn memory_store_finds_only_open_positions() {
        let store = MemoryStore::new();
        let mut pos = sample("T1");
        store.save(&pos).await.unwrap();

        assert!(store.find_open("T1").await.unwrap().is_some());
        assert!(store.find_open("T2").await.unwrap().is_none());

        pos.status = PositionStatus::Closed;
        store.save(&pos).await.unwrap();
        assert!(store.find_open("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_upserts_by_id() {
        let store = MemoryStore::new();
        let mut pos = sample("T1");
        store.save(&pos).await.unwrap();
        pos.mtm = 3.5;
        store.save(&pos).await.unwrap();

        assert_eq!(store.len().await, 1);
        let loaded = store.find_open("T1").await.unwrap().unwrap();
        assert!((loaded.mtm - 3.5).abs() < 1e-9);
    }
}
