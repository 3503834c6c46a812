use std::str::FromStr;

use chrono::{DateTime, Utc};
use freightdesk_models::{Quote, QuoteSource, QuoteStatus};
use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Schema of the local quote ledger.
pub const QUOTE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS quotes (
    id            TEXT PRIMARY KEY,
    cargo_id      TEXT NOT NULL,
    price         TEXT NOT NULL,
    status        TEXT NOT NULL,
    source        TEXT NOT NULL,
    counter_price TEXT,
    message       TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_quotes_cargo ON quotes(cargo_id);
CREATE INDEX IF NOT EXISTS idx_quotes_status ON quotes(status);
";

const QUOTE_COLUMNS: &str =
    "id, cargo_id, price, status, source, counter_price, created_at, updated_at";

/// Raw column values of one ledger row, before parsing.
struct RawQuote {
    id: String,
    cargo_id: String,
    price: String,
    status: String,
    source: String,
    counter_price: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawQuote {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cargo_id: row.get(1)?,
            price: row.get(2)?,
            status: row.get(3)?,
            source: row.get(4)?,
            counter_price: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_quote(self) -> Result<Quote, StoreError> {
        Ok(Quote {
            remote_id: Some(self.id.clone()),
            id: self.id,
            cargo_id: self.cargo_id,
            price: parse_decimal("price", &self.price)?,
            status: parse_tag::<QuoteStatus>("status", &self.status)?,
            source: parse_tag::<QuoteSource>("source", &self.source)?,
            counter_price: self
                .counter_price
                .as_deref()
                .map(|v| parse_decimal("counter_price", v))
                .transpose()?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|_| StoreError::Corrupt {
        column,
        value: value.to_string(),
    })
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: value.to_string(),
        })
}

/// Enum columns hold the serde snake_case tag.
fn parse_tag<T: DeserializeOwned>(column: &'static str, value: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        StoreError::Corrupt {
            column,
            value: value.to_string(),
        }
    })
}

fn tag<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Read-write SQLite quote ledger.
///
/// Stands in for the marketplace's quote storage when the engine runs
/// standalone: submitted quotes are inserted here and status feedback is
/// recorded against them.
pub struct QuoteLedger {
    conn: Connection,
}

impl QuoteLedger {
    /// Open (or create) the ledger file. Enables WAL so readers don't block the writer.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(QUOTE_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Open an in-memory ledger. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(QUOTE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Insert a quote together with the optional cover message.
    pub fn insert(&self, quote: &Quote, message: Option<&str>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO quotes \
             (id, cargo_id, price, status, source, counter_price, message, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                quote.id,
                quote.cargo_id,
                quote.price.to_string(),
                tag(&quote.status)?,
                tag(&quote.source)?,
                quote.counter_price.map(|p| p.to_string()),
                message,
                quote.created_at.to_rfc3339(),
                quote.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a quote by id. Returns None if it was never stored.
    pub fn get(&self, id: &str) -> Result<Option<Quote>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?1"))?;

        match stmt.query_row(rusqlite::params![id], RawQuote::from_row) {
            Ok(raw) => Ok(Some(raw.into_quote()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// All quotes for a cargo, oldest first.
    pub fn list_by_cargo(&self, cargo_id: &str) -> Result<Vec<Quote>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE cargo_id = ?1 ORDER BY created_at ASC"
        ))?;

        let rows = stmt
            .query_map(rusqlite::params![cargo_id], RawQuote::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawQuote::into_quote).collect()
    }

    /// Quotes still awaiting a final answer (`pending` or `countered`), oldest first.
    pub fn list_open(&self) -> Result<Vec<Quote>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE status IN ('pending', 'countered') \
             ORDER BY created_at ASC"
        ))?;

        let rows = stmt
            .query_map([], RawQuote::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawQuote::into_quote).collect()
    }

    /// Record a status change. The caller is responsible for transition legality.
    pub fn update_status(
        &self,
        id: &str,
        status: QuoteStatus,
        counter_price: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE quotes SET status = ?2, counter_price = COALESCE(?3, counter_price), \
             updated_at = ?4 WHERE id = ?1",
            rusqlite::params![
                id,
                tag(&status)?,
                counter_price.map(|p| p.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM quotes", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
