pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CitizenKey, DuplicatePolicy, KeyField, KeyFilter, PollingStation};

#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection-level errors (I/O, file access)
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Query execution errors
    #[error("Database query error: {0}")]
    Query(String),

    /// A write violated a uniqueness or foreign key constraint
    #[error("Database constraint violation: {0}")]
    Constraint(String),

    /// Connection pool exhausted or closed
    #[error("Database pool exhausted")]
    PoolExhausted,

    /// A citizen points at a station that was never stored
    #[error("Citizen references a missing polling station")]
    DanglingStation,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for citizen keys and polling stations.
///
/// Records are written once by a single batch and are read-only afterwards,
/// so implementations need no coordination between concurrent readers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates the tables if they are missing. Safe to call repeatedly.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// Opens the single all-or-nothing write batch used by ingestion.
    async fn begin_batch(&self, policy: DuplicatePolicy) -> StoreResult<Box<dyn BatchWriter>>;

    /// Every stored key matching the filter exactly, in no particular order.
    async fn find_keys(&self, filter: &KeyFilter) -> StoreResult<Vec<CitizenKey>>;

    /// Joins a stored key to its polling station.
    async fn station_for(&self, key: &CitizenKey) -> StoreResult<Option<PollingStation>>;

    async fn count_keys(&self) -> StoreResult<u64>;

    /// Number of distinct value combinations over the given columns.
    async fn count_distinct(&self, fields: &[KeyField]) -> StoreResult<u64>;

    /// Waits for every connection to be released. Reads fail afterwards.
    async fn close(&self);
}

/// An open write batch. Dropping it without calling `commit` discards
/// every write made through it.
#[async_trait]
pub trait BatchWriter: Send {
    /// Inserts the station unless one with the same id already exists.
    async fn put_station(&mut self, station: &PollingStation) -> StoreResult<()>;

    /// Inserts the key under the batch's duplicate policy.
    async fn put_key(&mut self, key: &CitizenKey) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
