use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};

use super::{BatchWriter, RecordStore, StoreError, StoreResult};
use crate::types::{CitizenKey, DuplicatePolicy, FieldSet, KeyField, KeyFilter, PollingStation};

const CREATE_POLLING_STATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS polling_stations (
        id TEXT PRIMARY KEY,
        poblacion TEXT NOT NULL,
        distrito TEXT NOT NULL,
        seccion TEXT NOT NULL,
        mesa TEXT NOT NULL,
        dircol TEXT NOT NULL
    )
"#;

const CREATE_CITIZENS: &str = r#"
    CREATE TABLE IF NOT EXISTS citizens (
        citizen_id TEXT NOT NULL,
        day TEXT NOT NULL,
        year TEXT NOT NULL,
        fn TEXT NOT NULL,
        sn1 TEXT NOT NULL,
        sn2 TEXT NOT NULL,
        postCode TEXT NOT NULL,
        colele TEXT NOT NULL,
        PRIMARY KEY (citizen_id, day, year, fn, sn1, sn2, postCode),
        FOREIGN KEY (colele) REFERENCES polling_stations (id)
    )
"#;

const KEY_COLUMNS: &str = "citizen_id, day, year, fn, sn1, sn2, postCode, colele";

const INSERT_STATION: &str = r#"
    INSERT OR IGNORE INTO polling_stations (id, poblacion, distrito, seccion, mesa, dircol)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

const INSERT_KEY: &str = r#"
    INSERT INTO citizens (citizen_id, day, year, fn, sn1, sn2, postCode, colele)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const REPLACE_KEY: &str = r#"
    INSERT OR REPLACE INTO citizens (citizen_id, day, year, fn, sn1, sn2, postCode, colele)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const SELECT_STATION: &str = r#"
    SELECT p.id, p.poblacion, p.distrito, p.seccion, p.mesa, p.dircol
    FROM citizens c
    JOIN polling_stations p ON c.colele = p.id
    WHERE c.citizen_id = ? AND c.day = ? AND c.year = ? AND c.fn = ?
      AND c.sn1 = ? AND c.sn2 = ? AND c.postCode = ?
"#;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, FromRow)]
struct StationRow {
    id: String,
    poblacion: String,
    distrito: String,
    seccion: String,
    mesa: String,
    dircol: String,
}

impl From<StationRow> for PollingStation {
    fn from(row: StationRow) -> Self {
        PollingStation {
            id: row.id,
            locality: row.poblacion,
            district: row.distrito,
            section: row.seccion,
            table: row.mesa,
            address: row.dircol,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::PoolExhausted,

            sqlx::Error::Io(_) => StoreError::Connection(err.to_string()),

            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() =>
            {
                StoreError::Constraint(err.to_string())
            }

            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// SQLite implementation of RecordStore
pub struct SqliteStore {
    pool: SqlitePool,
    // SELECT statements keyed by the set of filtered columns
    statements: DashMap<FieldSet, Arc<str>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            statements: DashMap::new(),
        }
    }

    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &Path, config: &PoolConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// A private in-memory database. Pinned to a single connection that is
    /// never recycled, since every SQLite memory connection is its own
    /// database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn select_statement(&self, fields: FieldSet) -> Arc<str> {
        if let Some(sql) = self.statements.get(&fields) {
            return sql.clone();
        }

        let clause = fields
            .iter()
            .map(|field| format!("{} = ?", field.column()))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql: Arc<str> = format!("SELECT {KEY_COLUMNS} FROM citizens WHERE {clause}").into();

        self.statements.insert(fields, sql.clone());
        sql
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(CREATE_POLLING_STATIONS)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_CITIZENS).execute(&self.pool).await?;
        Ok(())
    }

    async fn begin_batch(&self, policy: DuplicatePolicy) -> StoreResult<Box<dyn BatchWriter>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteBatch { tx, policy }))
    }

    async fn find_keys(&self, filter: &KeyFilter) -> StoreResult<Vec<CitizenKey>> {
        let sql = self.select_statement(filter.fields());

        let mut query = sqlx::query_as::<_, CitizenKey>(&sql);
        for (_, value) in filter.iter() {
            query = query.bind(value);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn station_for(&self, key: &CitizenKey) -> StoreResult<Option<PollingStation>> {
        let row = sqlx::query_as::<_, StationRow>(SELECT_STATION)
            .bind(&key.citizen_id)
            .bind(&key.day)
            .bind(&key.year)
            .bind(&key.given_name)
            .bind(&key.surname1)
            .bind(&key.surname2)
            .bind(&key.post_code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PollingStation::from))
    }

    async fn count_keys(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM citizens")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn count_distinct(&self, fields: &[KeyField]) -> StoreResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }

        let columns = fields
            .iter()
            .map(|field| field.column())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT COUNT(*) FROM (SELECT DISTINCT {columns} FROM citizens)");

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn close(&self) {
        self.pool.close().await
    }
}

struct SqliteBatch {
    tx: Transaction<'static, Sqlite>,
    policy: DuplicatePolicy,
}

#[async_trait]
impl BatchWriter for SqliteBatch {
    async fn put_station(&mut self, station: &PollingStation) -> StoreResult<()> {
        sqlx::query(INSERT_STATION)
            .bind(&station.id)
            .bind(&station.locality)
            .bind(&station.district)
            .bind(&station.section)
            .bind(&station.table)
            .bind(&station.address)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn put_key(&mut self, key: &CitizenKey) -> StoreResult<()> {
        let sql = match self.policy {
            DuplicatePolicy::Replace => REPLACE_KEY,
            DuplicatePolicy::Reject => INSERT_KEY,
        };

        sqlx::query(sql)
            .bind(&key.citizen_id)
            .bind(&key.day)
            .bind(&key.year)
            .bind(&key.given_name)
            .bind(&key.surname1)
            .bind(&key.surname2)
            .bind(&key.post_code)
            .bind(&key.station)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
