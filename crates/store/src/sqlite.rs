//! SQLite-backed credential store using sqlx.
//!
//! Schema: `credentials(id, name, attributes, created_at, updated_at)` where
//! `attributes` holds the attribute bag as a JSON object.

use async_trait::async_trait;
use ghgate_types::{Credential, CredentialStore, GateError, traits::Result};
use serde_json::{Map, Value};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, time::Duration};

/// How long a connection waits for another writer before failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type CredentialRow = (String, String, String, i64, i64);

/// A persistent [`CredentialStore`] backed by `SQLite`.
pub struct SqliteCredentialStore {
    /// Connection pool to the `SQLite` database.
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Connects to a `SQLite` database (e.g. `"sqlite:./credentials.db"` or `"sqlite::memory:"`).
    ///
    /// Automatically creates the database file if it does not exist and
    /// creates the schema. In-memory databases use a single connection so
    /// every query sees the same database.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if the connection or table creation fails.
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS credentials (
                id          TEXT    PRIMARY KEY NOT NULL,
                name        TEXT    NOT NULL DEFAULT '',
                attributes  TEXT    NOT NULL DEFAULT '{}',
                created_at  INTEGER NOT NULL DEFAULT (unixepoch()),
                updated_at  INTEGER NOT NULL DEFAULT (unixepoch())
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

fn to_sql_ts(ts: u64) -> i64 {
    i64::try_from(ts).unwrap_or(i64::MAX)
}

fn from_row((id, name, attributes, created_at, updated_at): CredentialRow) -> Result<Credential> {
    let attributes: Map<String, Value> = serde_json::from_str(&attributes)
        .map_err(|e| GateError::Storage(format!("corrupt attributes for {id}: {e}")))?;
    Ok(Credential {
        id,
        name,
        attributes,
        created_at: u64::try_from(created_at).unwrap_or(0),
        updated_at: u64::try_from(updated_at).unwrap_or(0),
    })
}

fn attributes_json(credential: &Credential) -> Result<String> {
    serde_json::to_string(&credential.attributes).map_err(|e| GateError::Storage(e.to_string()))
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(&self, id: &str) -> Result<Option<Credential>> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT id, name, attributes, created_at, updated_at FROM credentials WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(from_row).transpose()
    }

    async fn put(&self, credential: &Credential) -> Result<()> {
        let json = attributes_json(credential)?;
        sqlx::query(
            "INSERT INTO credentials (id, name, attributes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 attributes = excluded.attributes,
                 updated_at = excluded.updated_at",
        )
        .bind(&credential.id)
        .bind(&credential.name)
        .bind(&json)
        .bind(to_sql_ts(credential.created_at))
        .bind(to_sql_ts(credential.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read-modify-write inside a single transaction. The write lock is taken
    /// up front so concurrent merges queue on the busy timeout instead of
    /// deadlocking on a read-to-write lock upgrade.
    async fn merge_attributes(&self, id: &str, patch: Map<String, Value>) -> Result<Credential> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT id, name, attributes, created_at, updated_at FROM credentials WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut credential = row
            .map(from_row)
            .transpose()?
            .ok_or_else(|| GateError::NotFound(id.to_string()))?;
        credential.merge(patch);

        sqlx::query("UPDATE credentials SET attributes = ?, updated_at = ? WHERE id = ?")
            .bind(attributes_json(&credential)?)
            .bind(to_sql_ts(credential.updated_at))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(credential_id = %id, "credential attributes merged");
        Ok(credential)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Credential>> {
        let rows: Vec<CredentialRow> = sqlx::query_as(
            "SELECT id, name, attributes, created_at, updated_at FROM credentials
             ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(from_row).collect()
    }
}
