use std::sync::Arc;

use crate::ingest::{ingest, IngestError, IngestReport};
use crate::readiness::ReadinessGate;
use crate::resolver::{resolve, Outcome, ResolveError};
use crate::schema::KeySchema;
use crate::source::SourceError;
use crate::stats::{uniqueness_report, UniquenessLine};
use crate::store::{RecordStore, StoreError};
use crate::types::{DuplicatePolicy, LookupQuery, RollEntry};

/// Everything an operation needs: the store, the schema built from config,
/// the duplicate policy and the readiness gate. Cheap to clone.
#[derive(Clone)]
pub struct LookupService {
    store: Arc<dyn RecordStore>,
    schema: Arc<KeySchema>,
    policy: DuplicatePolicy,
    readiness: ReadinessGate,
}

impl LookupService {
    pub fn new(store: Arc<dyn RecordStore>, schema: KeySchema, policy: DuplicatePolicy) -> Self {
        Self {
            store,
            schema: Arc::new(schema),
            policy,
            readiness: ReadinessGate::new(),
        }
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.store.ensure_schema().await
    }

    /// Imports the roll. Does not open the readiness gate; that is left to
    /// the caller once every bootstrap step has finished.
    pub async fn ingest<I>(&self, rows: I) -> Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = Result<RollEntry, SourceError>>,
        I::IntoIter: Send,
    {
        ingest(self.store.as_ref(), &self.schema, self.policy, rows).await
    }

    pub async fn resolve(&self, query: &LookupQuery) -> Result<Outcome, ResolveError> {
        if !self.readiness.is_ready() {
            return Err(ResolveError::NotReady);
        }
        resolve(self.store.as_ref(), &self.schema, query).await
    }

    pub async fn close(&self) {
        self.store.close().await
    }

    pub async fn uniqueness(&self) -> Result<Vec<UniquenessLine>, StoreError> {
        uniqueness_report(self.store.as_ref(), &self.schema).await
    }
}
