//! libSQL durable backend.
//!
//! One `leads` row per sender with the serialized context plus a bare
//! `version` column — the conditional `UPDATE ... WHERE version = ?` is what
//! implements compare-and-swap. A `seen_messages` table doubles as a durable
//! dedupe tier for deployments that want the guard to survive restarts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::context::LeadContext;
use crate::error::StoreError;
use crate::store::traits::{DedupeStore, DurableStore};

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS leads (
            sender_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            context TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_leads_updated ON leads(updated_at);

        CREATE TABLE IF NOT EXISTS seen_messages (
            message_id TEXT PRIMARY KEY,
            seen_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_seen_expires ON seen_messages(expires_at);
    "#,
}];

/// libSQL-backed durable store.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Lead database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Apply pending migrations, tracking applied versions in `_migrations`.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            (),
        )
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to create _migrations table: {e}")))?;

        let current = current_migration_version(conn).await?;
        for migration in MIGRATIONS {
            if migration.version > current {
                info!(
                    version = migration.version,
                    name = migration.name,
                    "Applying migration"
                );
                conn.execute_batch(migration.sql).await.map_err(|e| {
                    StoreError::Backend(format!(
                        "Migration V{} ({}) failed: {e}",
                        migration.version, migration.name
                    ))
                })?;
                conn.execute(
                    "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
                    params![migration.version, migration.name],
                )
                .await
                .map_err(|e| {
                    StoreError::Backend(format!("Failed to record migration: {e}"))
                })?;
            }
        }
        Ok(())
    }
}

async fn current_migration_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to query migration version: {e}")))?;
    match rows
        .next()
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to read migration version: {e}")))?
    {
        Some(row) => row
            .get(0)
            .map_err(|e| StoreError::Backend(format!("Failed to parse migration version: {e}"))),
        None => Ok(0),
    }
}

fn encode(ctx: &LeadContext) -> Result<String, StoreError> {
    serde_json::to_string(ctx).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(raw: &str) -> Result<LeadContext, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl DurableStore for LibSqlStore {
    async fn fetch(&self, sender_id: &str) -> Result<Option<LeadContext>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT context FROM leads WHERE sender_id = ?1",
                params![sender_id],
            )
            .await
            .map_err(|e| StoreError::Unavailable(format!("fetch: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Unavailable(format!("fetch: {e}")))?
        {
            Some(row) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| StoreError::Backend(format!("fetch row parse: {e}")))?;
                Ok(Some(decode(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_if_absent(&self, ctx: &LeadContext) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "INSERT INTO leads (sender_id, version, context, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(sender_id) DO NOTHING",
                params![
                    ctx.sender_id.as_str(),
                    ctx.version as i64,
                    encode(ctx)?,
                    ctx.created_at.to_rfc3339(),
                    ctx.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Unavailable(format!("insert_if_absent: {e}")))?;
        Ok(affected == 1)
    }

    async fn update_if_version(
        &self,
        expected_version: u64,
        ctx: &LeadContext,
    ) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE leads SET version = ?1, context = ?2, updated_at = ?3
                 WHERE sender_id = ?4 AND version = ?5",
                params![
                    ctx.version as i64,
                    encode(ctx)?,
                    ctx.updated_at.to_rfc3339(),
                    ctx.sender_id.as_str(),
                    expected_version as i64,
                ],
            )
            .await
            .map_err(|e| StoreError::Unavailable(format!("update_if_version: {e}")))?;
        Ok(affected == 1)
    }
}

#[async_trait]
impl DedupeStore for LibSqlStore {
    async fn insert_if_new(&self, message_id: &str, ttl: Duration) -> Result<bool, StoreError> {
        let conn = self.conn();
        let now = Utc::now();

        // Sweep expired entries so a redelivery outside the window counts as new.
        conn.execute(
            "DELETE FROM seen_messages WHERE expires_at <= ?1",
            params![now.to_rfc3339()],
        )
        .await
        .map_err(|e| StoreError::Unavailable(format!("dedupe sweep: {e}")))?;

        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| StoreError::Backend(format!("dedupe ttl: {e}")))?;
        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO seen_messages (message_id, seen_at, expires_at)
                 VALUES (?1, ?2, ?3)",
                params![message_id, now.to_rfc3339(), expires_at.to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Unavailable(format!("dedupe insert: {e}")))?;
        Ok(affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::Stage;

    fn ctx(sender: &str) -> LeadContext {
        LeadContext::new(sender, Stage::Intro)
    }

    #[tokio::test]
    async fn insert_fetch_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let lead = ctx("+5511999990001");
        assert!(store.insert_if_absent(&lead).await.unwrap());

        let fetched = store.fetch("+5511999990001").await.unwrap().unwrap();
        assert_eq!(fetched.sender_id, lead.sender_id);
        assert_eq!(fetched.version, 1);
        assert!(store.fetch("+5599").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_if_absent_reports_existing() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.insert_if_absent(&ctx("+55")).await.unwrap());
        assert!(!store.insert_if_absent(&ctx("+55")).await.unwrap());
    }

    #[tokio::test]
    async fn update_if_version_enforces_cas() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut lead = ctx("+55");
        store.insert_if_absent(&lead).await.unwrap();

        lead.city = Some("Recife".into());
        lead.mark_mutated();
        assert!(store.update_if_version(1, &lead).await.unwrap());

        let stored = store.fetch("+55").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.city.as_deref(), Some("Recife"));

        // Second writer with the same stale expectation loses.
        assert!(!store.update_if_version(1, &lead).await.unwrap());
        // Unknown sender is a conflict, not an upsert.
        assert!(!store.update_if_version(1, &ctx("+99")).await.unwrap());
    }

    #[tokio::test]
    async fn dedupe_table_detects_duplicates_until_expiry() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.insert_if_new("m1", Duration::from_secs(60)).await.unwrap());
        assert!(!store.insert_if_new("m1", Duration::from_secs(60)).await.unwrap());

        // A zero-TTL entry expires immediately and re-inserts as new.
        assert!(store.insert_if_new("m2", Duration::ZERO).await.unwrap());
        assert!(store.insert_if_new("m2", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn migrations_are_idempotent_and_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.db");

        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.insert_if_absent(&ctx("+55")).await.unwrap();
        }

        // Reopen: migrations re-run (no-op) and data is still there.
        let store = LibSqlStore::new_local(&path).await.unwrap();
        let stored = store.fetch("+55").await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Intro);
    }
}
