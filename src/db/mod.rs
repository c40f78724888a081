//! Data access runtime: pooled query execution with portable `?` placeholders.

mod params;
mod row;

pub use params::PgBindValue;
pub use row::row_to_json;

use crate::config::DbConfig;
use crate::error::AppError;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Handle to the connection pool. Explicit rather than process-global so
/// tests can hold several isolated instances. Cloning shares the pool.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Create the pool at startup. An unreachable database fails here, not
    /// lazily at first query.
    pub async fn connect(cfg: &DbConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .min_connections(cfg.min_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
            .connect(&cfg.url())
            .await?;
        tracing::info!(host = %cfg.host, database = %cfg.database, "database pool created");
        Ok(Db { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Db { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool: in-flight checkouts complete and return; further
    /// acquisitions fail.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("database pool closed");
    }

    /// Execute a read. Rows decode to JSON objects; `limit` caps the rows
    /// returned. An empty result is an empty vec, never an error.
    pub async fn query(
        &self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Value>, AppError> {
        let sql = expand_placeholders(sql);
        tracing::debug!(sql = %sql, params = ?args, "query");
        let mut query = sqlx::query(&sql);
        for a in args {
            query = query.bind(PgBindValue::from_json(a));
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut out: Vec<Value> = rows.iter().map(row_to_json).collect();
        if let Some(n) = limit {
            out.truncate(n);
        }
        tracing::debug!(rows = out.len(), "rows returned");
        Ok(out)
    }

    /// Execute a write; returns the affected row count. With `autocommit`
    /// off the statement runs inside an explicit transaction: commit on
    /// success, rollback before the original error propagates on failure.
    pub async fn execute(
        &self,
        sql: &str,
        args: &[Value],
        autocommit: bool,
    ) -> Result<u64, AppError> {
        let sql = expand_placeholders(sql);
        tracing::debug!(sql = %sql, params = ?args, autocommit, "execute");
        if autocommit {
            let mut query = sqlx::query(&sql);
            for a in args {
                query = query.bind(PgBindValue::from_json(a));
            }
            let done = query.execute(&self.pool).await?;
            return Ok(done.rows_affected());
        }
        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&sql);
        for a in args {
            query = query.bind(PgBindValue::from_json(a));
        }
        match query.execute(&mut *tx).await {
            Ok(done) => {
                tx.commit().await?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                tx.rollback().await?;
                Err(AppError::Db(e))
            }
        }
    }
}

/// Rewrite portable `?` placeholders to PostgreSQL `$1..$n`. Templates never
/// embed driver-specific syntax directly.
pub fn expand_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0u32;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}
