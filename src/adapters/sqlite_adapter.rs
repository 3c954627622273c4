//! SQLite signal store.

use crate::domain::error::FactorwalkError;
use crate::domain::observation::{FactorObservation, PriceObservation};
use crate::ports::config_port::ConfigPort;
use crate::ports::signal_store::SignalStore;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Row, params, params_from_iter, types::Value};
use std::collections::BTreeSet;

pub struct SqliteSignalStore {
    pool: Pool<SqliteConnectionManager>,
}

fn store_err(e: r2d2::Error) -> FactorwalkError {
    FactorwalkError::Store {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> FactorwalkError {
    FactorwalkError::StoreQuery {
        reason: e.to_string(),
    }
}

fn date_column(row: &Row<'_>, index: usize) -> rusqlite::Result<NaiveDate> {
    let date_str: String = row.get(index)?;
    NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            date_str.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

/// `?5, ?6, ...` for an `IN (...)` list whose first parameter is `?first`.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl SqliteSignalStore {
    /// Opens `[store] path` with a pool of `[store] pool_size` connections.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FactorwalkError> {
        let db_path =
            config
                .get_string("store", "path")
                .ok_or_else(|| FactorwalkError::ConfigMissing {
                    section: "store".into(),
                    key: "path".into(),
                })?;
        let pool_size = config.get_int("store", "pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open(db_path: &str, pool_size: u32) -> Result<Self, FactorwalkError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(store_err)?;
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, FactorwalkError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(store_err)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FactorwalkError> {
        self.pool.get().map_err(store_err)
    }

    pub fn initialize_schema(&self) -> Result<(), FactorwalkError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS factor_scores (
                    ticker TEXT NOT NULL,
                    region TEXT NOT NULL,
                    date TEXT NOT NULL,
                    factor_name TEXT NOT NULL,
                    score REAL NOT NULL,
                    percentile REAL NOT NULL,
                    PRIMARY KEY (ticker, region, date, factor_name)
                );
                CREATE INDEX IF NOT EXISTS idx_factor_scores_name_date
                    ON factor_scores(factor_name, region, date);
                CREATE TABLE IF NOT EXISTS prices (
                    ticker TEXT NOT NULL,
                    region TEXT NOT NULL,
                    date TEXT NOT NULL,
                    close REAL NOT NULL,
                    PRIMARY KEY (ticker, region, date)
                );
                CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(region, date);",
            )
            .map_err(query_err)
    }

    pub fn insert_factor_scores(
        &self,
        region: &str,
        observations: &[FactorObservation],
    ) -> Result<(), FactorwalkError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for obs in observations {
            tx.execute(
                "INSERT OR REPLACE INTO factor_scores
                     (ticker, region, date, factor_name, score, percentile)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    obs.ticker,
                    region,
                    obs.date.format("%Y-%m-%d").to_string(),
                    obs.factor_name,
                    obs.score,
                    obs.percentile
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_prices(
        &self,
        region: &str,
        prices: &[PriceObservation],
    ) -> Result<(), FactorwalkError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for price in prices {
            tx.execute(
                "INSERT OR REPLACE INTO prices (ticker, region, date, close)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    price.ticker,
                    region,
                    price.date.format("%Y-%m-%d").to_string(),
                    price.close
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }
}

/// Region, start and end first, then the members of `names`.
fn query_params(
    region: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    names: &BTreeSet<String>,
) -> Vec<Value> {
    let mut values = vec![
        Value::Text(region.to_string()),
        Value::Text(start_date.format("%Y-%m-%d").to_string()),
        Value::Text(end_date.format("%Y-%m-%d").to_string()),
    ];
    values.extend(names.iter().map(|n| Value::Text(n.clone())));
    values
}

impl SignalStore for SqliteSignalStore {
    fn get_factor_scores(
        &self,
        factor_names: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<FactorObservation>, FactorwalkError> {
        if factor_names.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let query = format!(
            "SELECT ticker, date, factor_name, score, percentile
             FROM factor_scores
             WHERE region = ?1 AND date >= ?2 AND date <= ?3 AND factor_name IN ({})
             ORDER BY date ASC, factor_name ASC, ticker ASC",
            placeholders(4, factor_names.len())
        );
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map(
                params_from_iter(query_params(region, start_date, end_date, factor_names)),
                |row| {
                    Ok(FactorObservation {
                        ticker: row.get(0)?,
                        date: date_column(row, 1)?,
                        factor_name: row.get(2)?,
                        score: row.get(3)?,
                        percentile: row.get(4)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FactorwalkError> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let query = format!(
            "SELECT ticker, date, close
             FROM prices
             WHERE region = ?1 AND date >= ?2 AND date <= ?3 AND ticker IN ({})
             ORDER BY ticker ASC, date ASC",
            placeholders(4, tickers.len())
        );
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map(
                params_from_iter(query_params(region, start_date, end_date, tickers)),
                |row| {
                    Ok(PriceObservation {
                        ticker: row.get(0)?,
                        date: date_column(row, 1)?,
                        close: row.get(2)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}
