//! Archive store contract.
//!
//! The store owns archived records once inserted and guarantees a stable
//! insertion order per archive, independent of the opaque record ids.
//! Writes go through [`ArchiveTransaction`] so that an insertion and the
//! capacity eviction that follows it commit or roll back together.

mod database;

pub use self::database::{LibSqlArchiveStore, MAM_SCHEMA};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ArchiveMetadata, ArchivedMessage, Filters};

/// Errors that can occur during archive storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl From<libsql::Error> for StoreError {
    fn from(e: libsql::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Transactional record store holding every account archive.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Open a write transaction.
    ///
    /// Concurrent readers never observe the effects of an open transaction.
    async fn begin(&self) -> Result<Box<dyn ArchiveTransaction>, StoreError>;

    /// Fetch the records of an archive matching all set filters, oldest first.
    async fn fetch_messages(
        &self,
        archive_id: &str,
        filters: &Filters,
    ) -> Result<Vec<ArchivedMessage>, StoreError>;

    /// Oldest and newest record markers, or `None` for an empty archive.
    async fn fetch_metadata(&self, archive_id: &str)
        -> Result<Option<ArchiveMetadata>, StoreError>;

    /// Delete every record of an archive. Returns the number removed.
    async fn delete_archive(&self, archive_id: &str) -> Result<u64, StoreError>;
}

/// Write transaction over the archive store.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait ArchiveTransaction: Send {
    /// Append a record to its archive.
    async fn insert_message(&mut self, message: &ArchivedMessage) -> Result<(), StoreError>;

    /// Delete the oldest records of an archive so that at most `keep` remain.
    /// Returns the number of evicted records.
    async fn delete_oldest_messages(
        &mut self,
        archive_id: &str,
        keep: usize,
    ) -> Result<u64, StoreError>;

    /// Make all changes of the transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all changes of the transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
