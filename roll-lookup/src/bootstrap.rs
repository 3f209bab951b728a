//! Startup sequence: decide what the data directory holds, prepare the
//! database accordingly and import the extract when there is one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::config::Config;
use crate::ingest::IngestError;
use crate::schema::SchemaError;
use crate::service::LookupService;
use crate::source::{ColumnLayout, RollReader, SourceEncoding, SourceError};
use crate::stats::log_report;
use crate::store::sqlite::SqliteStore;
use crate::store::StoreError;
use crate::types::RollEntry;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("no extract (.csv/.txt) or database (.db) found in {0}")]
    NoData(PathBuf),
    #[error("failed to prepare data directory: {0}")]
    Io(#[from] io::Error),
    #[error("invalid key configuration: {0}")]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("extract reader task failed: {0}")]
    Reader(#[from] JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPlan {
    /// Rebuild the database from the extract, then remove the extract.
    Import { extract: PathBuf, database: PathBuf },
    /// Serve an existing database as is.
    Serve { database: PathBuf },
}

impl DataPlan {
    pub fn database(&self) -> &Path {
        match self {
            DataPlan::Import { database, .. } | DataPlan::Serve { database } => database,
        }
    }
}

/// Scans `data_dir`. An extract always wins over an existing database; if
/// several candidates exist the first by name is used.
pub fn plan(data_dir: &Path, database_file: &str) -> Result<DataPlan, BootstrapError> {
    let mut entries = fs::read_dir(data_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    entries.sort();

    let extract = entries
        .iter()
        .find(|path| has_extension(path, &["csv", "txt"]))
        .cloned();
    let database = entries
        .iter()
        .find(|path| has_extension(path, &["db"]))
        .cloned();

    match (extract, database) {
        (Some(extract), database) => Ok(DataPlan::Import {
            extract,
            database: database.unwrap_or_else(|| data_dir.join(database_file)),
        }),
        (None, Some(database)) => Ok(DataPlan::Serve { database }),
        (None, None) => Err(BootstrapError::NoData(data_dir.to_path_buf())),
    }
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| wanted.iter().any(|w| ext.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

/// Opens the store the plan points at. An import starts from an empty
/// database file.
pub async fn open_service(
    config: &Config,
    plan: &DataPlan,
) -> Result<LookupService, BootstrapError> {
    let schema = config.key_schema()?;

    if let DataPlan::Import { database, .. } = plan {
        remove_database(database)?;
    }

    let store = SqliteStore::open(plan.database(), &config.pool_config()).await?;
    let service = LookupService::new(Arc::new(store), schema, config.duplicate_policy);
    service.ensure_schema().await?;

    Ok(service)
}

fn remove_database(database: &Path) -> io::Result<()> {
    let mut files = vec![database.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = database.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }

    for path in files {
        match fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "Removed stale database file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads the extract on the blocking pool so the probes keep being served.
/// Reading stops at the first source error, which the import then reports.
async fn read_extract(
    extract: &Path,
    encoding: SourceEncoding,
) -> Result<Vec<Result<RollEntry, SourceError>>, BootstrapError> {
    let extract = extract.to_path_buf();
    let rows = tokio::task::spawn_blocking(move || -> Result<_, SourceError> {
        let reader = RollReader::from_path(&extract, ColumnLayout::default(), encoding)?;
        let mut rows = Vec::new();
        for row in reader {
            let failed = row.is_err();
            rows.push(row);
            if failed {
                break;
            }
        }
        Ok(rows)
    })
    .await??;

    Ok(rows)
}

/// Runs the import when the plan has one, then opens the readiness gate.
pub async fn load(
    service: &LookupService,
    plan: &DataPlan,
    encoding: SourceEncoding,
) -> Result<(), BootstrapError> {
    if let DataPlan::Import { extract, .. } = plan {
        info!(extract = %extract.display(), "Importing roll extract");

        let rows = read_extract(extract, encoding).await?;
        service.ingest(rows).await?;

        let report = service.uniqueness().await?;
        log_report(&report);

        if let Err(e) = fs::remove_file(extract) {
            warn!(extract = %extract.display(), error = %e, "Failed to remove imported extract");
        }
    }

    service.readiness().mark_ready();
    info!(database = %plan.database().display(), "Ready to serve lookups");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plan_prefers_extract() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("roll.CSV"), "").unwrap();
        fs::write(dir.path().join("old.db"), "").unwrap();
        fs::write(dir.path().join("notes.md"), "").unwrap();

        assert_eq!(
            plan(dir.path(), "citizens.db").unwrap(),
            DataPlan::Import {
                extract: dir.path().join("roll.CSV"),
                database: dir.path().join("old.db"),
            }
        );
    }

    #[test]
    fn test_plan_names_new_database() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("roll.txt"), "").unwrap();

        assert_eq!(
            plan(dir.path(), "citizens.db").unwrap().database(),
            dir.path().join("citizens.db")
        );
    }

    #[test]
    fn test_plan_serves_existing_database() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("citizens.db"), "").unwrap();

        assert_eq!(
            plan(dir.path(), "other.db").unwrap(),
            DataPlan::Serve {
                database: dir.path().join("citizens.db"),
            }
        );
    }

    #[test]
    fn test_plan_fails_on_empty_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested.csv")).unwrap();

        assert!(matches!(
            plan(dir.path(), "citizens.db"),
            Err(BootstrapError::NoData(_))
        ));
    }

    #[tokio::test]
    async fn test_read_extract_collects_rows() {
        let dir = TempDir::new().unwrap();
        let extract = dir.path().join("roll.csv");
        let mut row = vec![""; 29];
        row[6] = "C1";
        row[25] = "010190";
        row[27] = "12345678Z";
        fs::write(&extract, format!("header\n{}\n", row.join(";"))).unwrap();

        let rows = read_extract(&extract, SourceEncoding::Utf8).await.unwrap();

        assert_eq!(rows.len(), 1);
        let entry = rows[0].as_ref().unwrap();
        assert_eq!(entry.person.document_id, "12345678Z");
        assert_eq!(entry.station.id, "C1");
    }

    #[tokio::test]
    async fn test_read_extract_reports_missing_file() {
        let dir = TempDir::new().unwrap();

        let err = read_extract(&dir.path().join("gone.csv"), SourceEncoding::Utf8)
            .await
            .unwrap_err();
        assert!(
            matches!(err, BootstrapError::Source(SourceError::Open(_))),
            "{err:?}"
        );
    }

    #[test]
    fn test_remove_database_takes_sidecars() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("citizens.db");
        fs::write(&database, "").unwrap();
        fs::write(dir.path().join("citizens.db-wal"), "").unwrap();

        remove_database(&database).unwrap();
        remove_database(&database).unwrap();

        assert!(!database.exists());
        assert!(!dir.path().join("citizens.db-wal").exists());
    }
}
