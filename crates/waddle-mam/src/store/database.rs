//! libSQL archive store.
//!
//! Records live in a single `mam_archive` table keyed by an autoincrement
//! sequence number, which is the archive order. A single connection is shared
//! behind an async mutex; write transactions hold the mutex until they commit
//! or roll back, so readers only ever see committed archives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Row, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use super::{ArchiveStore, ArchiveTransaction, StoreError};
use crate::types::{ArchiveMetadata, ArchivedMessage, Filters};

/// SQL schema for the message archive.
pub const MAM_SCHEMA: &str = r#"
-- Message Archive Management (XEP-0313) records
CREATE TABLE IF NOT EXISTS mam_archive (
    -- Archive order; record ids are random tokens and carry no order
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    -- Local part of the archive owner's JID
    archive_id TEXT NOT NULL,
    -- Archive id assigned at capture time
    id TEXT NOT NULL,
    -- Sender JID as routed, and its bare form
    from_jid TEXT NOT NULL,
    from_bare TEXT NOT NULL,
    -- Recipient JID as routed, and its bare form
    to_jid TEXT NOT NULL,
    to_bare TEXT NOT NULL,
    -- Serialized message stanza
    payload TEXT NOT NULL,
    -- Capture time in microseconds since the Unix epoch
    stamp INTEGER NOT NULL,
    UNIQUE (archive_id, id)
);

-- Archive scans and oldest-first eviction
CREATE INDEX IF NOT EXISTS idx_mam_archive_seq
    ON mam_archive(archive_id, seq);

-- start/end filters
CREATE INDEX IF NOT EXISTS idx_mam_archive_stamp
    ON mam_archive(archive_id, stamp);
"#;

const SELECT_COLUMNS: &str = "SELECT archive_id, id, from_jid, to_jid, payload, stamp FROM mam_archive";

/// libSQL-based archive store.
#[derive(Clone)]
pub struct LibSqlArchiveStore {
    /// Database connection.
    /// For in-memory databases, this must be a persistent connection.
    conn: Arc<Mutex<Connection>>,
    /// Whether the schema has been initialized.
    initialized: Arc<AtomicBool>,
}

impl LibSqlArchiveStore {
    /// Create a store over an existing connection.
    pub fn new(conn: Connection) -> Self {
        Self::from_shared(Arc::new(Mutex::new(conn)))
    }

    /// Create from an `Arc<Mutex<Connection>>` shared with other components.
    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:").build().await?;
        let store = Self::new(db.connect()?);
        store.initialize().await?;
        Ok(store)
    }

    /// Open (or create) a database file.
    pub async fn open_local(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(path.as_ref()).build().await?;
        let store = Self::new(db.connect()?);
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize the database schema if not already done.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), StoreError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        conn.execute_batch(MAM_SCHEMA).await?;

        self.initialized.store(true, Ordering::Release);
        debug!("MAM archive schema initialized");

        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for LibSqlArchiveStore {
    async fn begin(&self) -> Result<Box<dyn ArchiveTransaction>, StoreError> {
        self.initialize().await?;

        let conn = self.conn.clone().lock_owned().await;
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to begin: {}", e)))?;

        Ok(Box::new(LibSqlTransaction { conn: Some(conn) }))
    }

    #[instrument(skip(self, filters), fields(archive = %archive_id))]
    async fn fetch_messages(
        &self,
        archive_id: &str,
        filters: &Filters,
    ) -> Result<Vec<ArchivedMessage>, StoreError> {
        self.initialize().await?;

        let (sql, params) = build_fetch_query(archive_id, filters);
        debug!(sql = %sql, params = params.len(), "Executing archive fetch");

        let conn = self.conn.lock().await;
        let mut rows = conn.query(&sql, Params::Positional(params)).await?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await? {
            messages.push(row_to_message(&row)?);
        }

        debug!(count = messages.len(), "Archive fetch completed");
        Ok(messages)
    }

    #[instrument(skip(self))]
    async fn fetch_metadata(
        &self,
        archive_id: &str,
    ) -> Result<Option<ArchiveMetadata>, StoreError> {
        self.initialize().await?;

        let conn = self.conn.lock().await;

        let Some((start_id, start_timestamp)) = fetch_edge(&conn, archive_id, "ASC").await? else {
            return Ok(None);
        };
        let Some((end_id, end_timestamp)) = fetch_edge(&conn, archive_id, "DESC").await? else {
            return Ok(None);
        };

        Ok(Some(ArchiveMetadata {
            start_id,
            start_timestamp,
            end_id,
            end_timestamp,
        }))
    }

    #[instrument(skip(self))]
    async fn delete_archive(&self, archive_id: &str) -> Result<u64, StoreError> {
        self.initialize().await?;

        let conn = self.conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM mam_archive WHERE archive_id = ?1",
                [archive_id],
            )
            .await?;

        debug!(deleted, "Deleted MAM archive");
        Ok(deleted)
    }
}

/// Write transaction holding the store connection exclusively.
struct LibSqlTransaction {
    /// `None` once committed or rolled back.
    conn: Option<OwnedMutexGuard<Connection>>,
}

impl LibSqlTransaction {
    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn
            .as_deref()
            .ok_or_else(|| StoreError::Transaction("Transaction already finished".to_string()))
    }
}

#[async_trait]
impl ArchiveTransaction for LibSqlTransaction {
    async fn insert_message(&mut self, message: &ArchivedMessage) -> Result<(), StoreError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO mam_archive (
                archive_id, id, from_jid, from_bare, to_jid, to_bare, payload, stamp
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            libsql::params![
                message.archive_id.clone(),
                message.id.clone(),
                message.from.clone(),
                message.from_bare().to_string(),
                message.to.clone(),
                message.to_bare().to_string(),
                message.payload.clone(),
                message.timestamp.timestamp_micros(),
            ],
        )
        .await?;

        debug!(archive_id = %message.archive_id, id = %message.id, "Inserted archive message");
        Ok(())
    }

    async fn delete_oldest_messages(
        &mut self,
        archive_id: &str,
        keep: usize,
    ) -> Result<u64, StoreError> {
        let conn = self.conn()?;

        // The (keep + 1)-th newest record and everything older goes.
        let evicted = conn
            .execute(
                r#"
                DELETE FROM mam_archive
                WHERE archive_id = ?1
                  AND seq <= (
                      SELECT seq FROM mam_archive
                      WHERE archive_id = ?1
                      ORDER BY seq DESC
                      LIMIT 1 OFFSET ?2
                  )
                "#,
                libsql::params![archive_id.to_string(), keep as i64],
            )
            .await?;

        if evicted > 0 {
            debug!(archive_id, evicted, keep, "Evicted oldest archive messages");
        }
        Ok(evicted)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let Some(conn) = self.conn.take() else {
            return Err(StoreError::Transaction("Transaction already finished".to_string()));
        };

        if let Err(e) = conn.execute("COMMIT", ()).await {
            if let Err(rollback_err) = conn.execute("ROLLBACK", ()).await {
                warn!(error = %rollback_err, "Rollback after failed commit also failed");
            }
            return Err(StoreError::Transaction(format!("Failed to commit: {}", e)));
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        conn.execute("ROLLBACK", ())
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to roll back: {}", e)))?;
        Ok(())
    }
}

impl Drop for LibSqlTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        // The guard moves into the task so no other transaction can start
        // before the rollback has run.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.execute("ROLLBACK", ()).await {
                        warn!(error = %e, "Failed to roll back abandoned archive transaction");
                    }
                });
            }
            Err(_) => warn!("Archive transaction dropped outside a runtime, rollback skipped"),
        }
    }
}

/// Build the filtered fetch statement and its positional parameters.
fn build_fetch_query(archive_id: &str, filters: &Filters) -> (String, Vec<Value>) {
    fn bind(params: &mut Vec<Value>, value: Value) -> usize {
        params.push(value);
        params.len()
    }

    let mut sql = format!("{} WHERE archive_id = ?1", SELECT_COLUMNS);
    let mut params = vec![Value::Text(archive_id.to_string())];

    if let Some(start) = &filters.start {
        let idx = bind(&mut params, Value::Integer(start.timestamp_micros()));
        sql.push_str(&format!(" AND stamp >= ?{}", idx));
    }

    if let Some(end) = &filters.end {
        let idx = bind(&mut params, Value::Integer(end.timestamp_micros()));
        sql.push_str(&format!(" AND stamp < ?{}", idx));
    }

    // A bare "with" matches every resource of the correspondent; a full one
    // matches that resource only.
    if let Some(with) = &filters.with {
        if with.resource().is_some() {
            let idx = bind(&mut params, Value::Text(with.to_string()));
            sql.push_str(&format!(" AND (from_jid = ?{idx} OR to_jid = ?{idx})"));
        } else {
            let idx = bind(&mut params, Value::Text(with.to_bare().to_string()));
            sql.push_str(&format!(" AND (from_bare = ?{idx} OR to_bare = ?{idx})"));
        }
    }

    // Anchors resolve through the sequence column. A missing anchor yields
    // NULL and therefore no rows.
    if let Some(before_id) = &filters.before_id {
        let idx = bind(&mut params, Value::Text(before_id.clone()));
        sql.push_str(&format!(
            " AND seq < (SELECT seq FROM mam_archive WHERE archive_id = ?1 AND id = ?{})",
            idx
        ));
    }

    if let Some(after_id) = &filters.after_id {
        let idx = bind(&mut params, Value::Text(after_id.clone()));
        sql.push_str(&format!(
            " AND seq > (SELECT seq FROM mam_archive WHERE archive_id = ?1 AND id = ?{})",
            idx
        ));
    }

    if !filters.ids.is_empty() {
        let placeholders: Vec<String> = filters
            .ids
            .iter()
            .map(|id| format!("?{}", bind(&mut params, Value::Text(id.clone()))))
            .collect();
        sql.push_str(&format!(" AND id IN ({})", placeholders.join(", ")));
    }

    sql.push_str(" ORDER BY seq ASC");
    (sql, params)
}

async fn fetch_edge(
    conn: &Connection,
    archive_id: &str,
    direction: &str,
) -> Result<Option<(String, DateTime<Utc>)>, StoreError> {
    let sql = format!(
        "SELECT id, stamp FROM mam_archive WHERE archive_id = ?1 ORDER BY seq {} LIMIT 1",
        direction
    );
    let mut rows = conn.query(&sql, [archive_id]).await?;

    match rows.next().await? {
        Some(row) => {
            let id: String = row.get(0)?;
            let stamp: i64 = row.get(1)?;
            Ok(Some((id, micros_to_datetime(stamp)?)))
        }
        None => Ok(None),
    }
}

fn row_to_message(row: &Row) -> Result<ArchivedMessage, StoreError> {
    let stamp: i64 = row.get(5)?;
    Ok(ArchivedMessage {
        archive_id: row.get(0)?,
        id: row.get(1)?,
        from: row.get(2)?,
        to: row.get(3)?,
        payload: row.get(4)?,
        timestamp: micros_to_datetime(stamp)?,
    })
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Serialization(format!("Invalid timestamp: {}", micros)))
}
