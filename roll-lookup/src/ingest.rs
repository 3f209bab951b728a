use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::metrics_consts::{INGEST_DURATION, ROWS_IMPORTED, ROWS_READ, ROWS_SKIPPED};
use crate::schema::KeySchema;
use crate::source::SourceError;
use crate::store::{RecordStore, StoreError};
use crate::types::{DuplicatePolicy, RollEntry};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("ingestion rolled back, store failure: {0}")]
    Store(#[from] StoreError),
    #[error("ingestion rolled back, source failure: {0}")]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub rows_read: u64,
    pub rows_imported: u64,
    pub rows_skipped: u64,
}

/// Writes every entry that normalizes cleanly in one all-or-nothing batch.
///
/// Entries failing normalization are skipped and counted. A store or source
/// failure drops the open batch, which rolls back everything written so far.
pub async fn ingest<I>(
    store: &dyn RecordStore,
    schema: &KeySchema,
    policy: DuplicatePolicy,
    rows: I,
) -> Result<IngestReport, IngestError>
where
    I: IntoIterator<Item = Result<RollEntry, SourceError>>,
    I::IntoIter: Send,
{
    let start = Instant::now();
    let mut report = IngestReport::default();
    let mut batch = store.begin_batch(policy).await?;

    for entry in rows {
        let entry = entry?;
        report.rows_read += 1;

        let key = match schema.build_key(&entry.person) {
            Ok(key) => key,
            Err(e) => {
                // Row number only: the rejected values are personal data.
                warn!(row = report.rows_read, error = %e, "Skipping roll entry");
                report.rows_skipped += 1;
                continue;
            }
        };

        batch.put_station(&entry.station).await?;
        batch.put_key(&key).await?;
        report.rows_imported += 1;
    }

    batch.commit().await?;

    metrics::counter!(ROWS_READ).increment(report.rows_read);
    metrics::counter!(ROWS_IMPORTED).increment(report.rows_imported);
    metrics::counter!(ROWS_SKIPPED).increment(report.rows_skipped);
    metrics::histogram!(INGEST_DURATION).record(start.elapsed().as_millis() as f64);

    info!(
        rows_read = report.rows_read,
        rows_imported = report.rows_imported,
        rows_skipped = report.rows_skipped,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Roll import finished"
    );

    Ok(report)
}
