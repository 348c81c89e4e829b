//! The local bar store (`spec.md` §4.F, §6): one table per `(symbol, timeframe)` keyed on
//! `time`, written only by the [`super::worker::DataSyncWorker`] and read by the backtester and
//! strategies. Grounded on `examples/cooprefr-bettersys/rust-backend/src/signals/db_storage.rs`'s
//! `parking_lot::Mutex<rusqlite::Connection>` + WAL pattern, kept on this crate's `thiserror`
//! error style rather than that example's `anyhow`.

use super::error::DataSyncError;
use crate::model::bar::Timeframe;
use crate::model::Bar;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

pub struct BarStore {
    conn: Mutex<Connection>,
}

impl BarStore {
    pub fn open(path: &Path) -> Result<Self, DataSyncError> {
        let conn = Connection::open(path).map_err(|source| DataSyncError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, DataSyncError> {
        let conn = Connection::open_in_memory().map_err(|source| DataSyncError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn table_name(symbol: &str, timeframe: Timeframe) -> String {
        let cleaned: String = symbol.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        format!("bars_{}_{}", cleaned.to_ascii_lowercase(), timeframe.as_str().to_ascii_lowercase())
    }

    /// Creates the `(symbol, timeframe)` table if it does not already exist (`spec.md` §4.F
    /// "ensure table exists with PK `time`").
    pub fn ensure_table(&self, symbol: &str, timeframe: Timeframe) -> Result<(), DataSyncError> {
        let table = Self::table_name(symbol, timeframe);
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    time INTEGER PRIMARY KEY,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    tick_volume INTEGER NOT NULL,
                    spread INTEGER NOT NULL,
                    real_volume INTEGER NOT NULL
                )"
            ),
            [],
        )?;
        Ok(())
    }

    /// The latest bar time already stored for this pair, used to resolve an omitted `fromDate`
    /// (`spec.md` §4.F "resolve `fromDate = max(time)+1`").
    pub fn max_time(&self, symbol: &str, timeframe: Timeframe) -> Result<Option<DateTime<Utc>>, DataSyncError> {
        let table = Self::table_name(symbol, timeframe);
        let conn = self.conn.lock();
        let raw: Option<i64> = conn.query_row(&format!("SELECT MAX(time) FROM {table}"), [], |row| row.get(0))?;
        Ok(raw.and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
    }

    /// Inserts `bars`, silently skipping any whose `time` already exists (`spec.md` §4.F
    /// "insert with `ON CONFLICT(time) DO NOTHING`"). Returns the count actually inserted.
    pub fn insert_bars(&self, symbol: &str, timeframe: Timeframe, bars: &[Bar]) -> Result<usize, DataSyncError> {
        let table = Self::table_name(symbol, timeframe);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (time, open, high, low, close, tick_volume, spread, real_volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(time) DO NOTHING"
            ))?;
            for bar in bars {
                inserted += stmt.execute(params![
                    bar.time.timestamp(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.tick_volume,
                    bar.spread,
                    bar.real_volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Returns the time-sorted, time-unique bar set in `[t0, t1]` (`spec.md` §8 Testable
    /// Property 6).
    pub fn get_range(&self, symbol: &str, timeframe: Timeframe, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Result<Vec<Bar>, DataSyncError> {
        let table = Self::table_name(symbol, timeframe);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT time, open, high, low, close, tick_volume, spread, real_volume FROM {table}
             WHERE time >= ?1 AND time <= ?2 ORDER BY time ASC"
        ))?;
        let rows = stmt.query_map(params![t0.timestamp(), t1.timestamp()], |row| {
            let secs: i64 = row.get(0)?;
            Ok(Bar {
                time: Utc.timestamp_opt(secs, 0).single().expect("stored bar timestamp was written by this process"),
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                tick_volume: row.get(5)?,
                spread: row.get(6)?,
                real_volume: row.get(7)?,
            })
        })?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row?);
        }
        Ok(bars)
    }
}
