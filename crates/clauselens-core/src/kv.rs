//! Namespaced key-value store abstraction
//!
//! The managed persistence backend is consumed through the [`KvStore`]
//! trait: string keys to JSON records, grouped by namespace, with get,
//! set, delete and prefix scan. [`SqliteKv`] is the durable default;
//! [`MemoryKv`] backs unit tests.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Namespaced persistent mapping from string keys to JSON records.
///
/// Scans return entries in lexicographic key order.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>, KvError>;

    /// Upsert
    async fn set(&self, ns: &str, key: &str, value: Value) -> Result<(), KvError>;

    async fn delete(&self, ns: &str, key: &str) -> Result<(), KvError>;

    /// All entries in `ns` whose key starts with `prefix`.
    async fn scan(&self, ns: &str, prefix: &str) -> Result<Vec<(String, Value)>, KvError>;

    /// Atomic read-modify-write of one record. `f` receives the current
    /// value (`None` when absent) and returns the value to store, or
    /// `None` to leave the record untouched. Concurrent `modify` calls on
    /// the same key never lose an update.
    async fn modify(
        &self,
        ns: &str,
        key: &str,
        f: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    ) -> Result<Option<Value>, KvError>;
}

// ── SQLite backend ────────────────────────────────────────────────────────

/// SQLite-backed key-value store
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Connect to the database and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, KvError> {
        tracing::info!("Connecting to database: {}", database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), KvError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                ns TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (ns, key)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

/// Escape LIKE wildcards so a prefix containing `%` or `_` matches literally.
fn escape_like(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>, KvError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_records WHERE ns = ? AND key = ?")
                .bind(ns)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, ns: &str, key: &str, value: Value) -> Result<(), KvError> {
        let raw = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO kv_records (ns, key, value) VALUES (?, ?, ?)
            ON CONFLICT (ns, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(ns)
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<(), KvError> {
        sqlx::query("DELETE FROM kv_records WHERE ns = ? AND key = ?")
            .bind(ns)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn scan(&self, ns: &str, prefix: &str) -> Result<Vec<(String, Value)>, KvError> {
        let pattern = format!("{}%", escape_like(prefix));
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT key, value FROM kv_records
            WHERE ns = ? AND key LIKE ? ESCAPE '\'
            ORDER BY key
            "#,
        )
        .bind(ns)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (key, raw) in rows {
            out.push((key, serde_json::from_str(&raw)?));
        }
        Ok(out)
    }

    async fn modify(
        &self,
        ns: &str,
        key: &str,
        f: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    ) -> Result<Option<Value>, KvError> {
        let mut tx = self.pool.begin().await?;
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_records WHERE ns = ? AND key = ?")
                .bind(ns)
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;
        let current = match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        };

        let Some(next) = f(current) else {
            return Ok(None);
        };

        let raw = serde_json::to_string(&next)?;
        sqlx::query(
            r#"
            INSERT INTO kv_records (ns, key, value) VALUES (?, ?, ?)
            ON CONFLICT (ns, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(ns)
        .bind(key)
        .bind(raw)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(next))
    }
}

// ── In-memory backend ─────────────────────────────────────────────────────

/// In-memory key-value store for tests and fakes
#[derive(Default)]
pub struct MemoryKv {
    namespaces: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, ns: &str, key: &str) -> Result<Option<Value>, KvError> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(ns).and_then(|m| m.get(key)).cloned())
    }

    async fn set(&self, ns: &str, key: &str, value: Value) -> Result<(), KvError> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(ns.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<(), KvError> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(m) = namespaces.get_mut(ns) {
            m.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, ns: &str, prefix: &str) -> Result<Vec<(String, Value)>, KvError> {
        let namespaces = self.namespaces.read().await;
        let Some(m) = namespaces.get(ns) else {
            return Ok(Vec::new());
        };
        // BTreeMap iteration is already lexicographic
        Ok(m.range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn modify(
        &self,
        ns: &str,
        key: &str,
        f: &(dyn Fn(Option<Value>) -> Option<Value> + Send + Sync),
    ) -> Result<Option<Value>, KvError> {
        // Held across the read and the write, so the step is atomic
        let mut namespaces = self.namespaces.write().await;
        let current = namespaces.get(ns).and_then(|m| m.get(key)).cloned();

        let Some(next) = f(current) else {
            return Ok(None);
        };

        namespaces
            .entry(ns.to_string())
            .or_default()
            .insert(key.to_string(), next.clone());
        Ok(Some(next))
    }
}
