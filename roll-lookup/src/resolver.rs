//! Classifies a partial lookup as not found, resolved or ambiguous.
//!
//! An ambiguous lookup only ever reports the *names* of the fields that
//! tell the candidates apart. Candidate values and station data stay
//! behind this boundary.

use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::metrics_consts::{RESOLVE_DURATION, RESOLVE_OUTCOMES};
use crate::schema::{KeySchema, NormalizationError};
use crate::store::{RecordStore, StoreError};
use crate::types::{CitizenKey, KeyField, LookupQuery, PollingStation};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("roll is still being imported")]
    NotReady,
    #[error("invalid lookup: {0}")]
    InvalidQuery(#[from] NormalizationError),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// The single record a lookup resolved to, joined to its station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub key: CitizenKey,
    pub station: PollingStation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NotFound,
    Resolved(Resolution),
    /// Names of the fields on which the candidates differ, in declaration
    /// order.
    Ambiguous(Vec<KeyField>),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::NotFound => "not_found",
            Outcome::Resolved(_) => "resolved",
            Outcome::Ambiguous(_) => "ambiguous",
        }
    }
}

pub async fn resolve(
    store: &dyn RecordStore,
    schema: &KeySchema,
    query: &LookupQuery,
) -> Result<Outcome, ResolveError> {
    let start = Instant::now();
    let filter = schema.filter_for(query)?;
    let candidates = store.find_keys(&filter).await?;

    let outcome = match candidates.as_slice() {
        [] => Outcome::NotFound,
        [only] => {
            let station = store
                .station_for(only)
                .await?
                .ok_or(StoreError::DanglingStation)?;
            Outcome::Resolved(Resolution {
                key: only.clone(),
                station,
            })
        }
        [first, rest @ ..] => Outcome::Ambiguous(differing_fields(first, rest)),
    };

    debug!(
        filtered_on = filter.fields().iter().count(),
        candidates = candidates.len(),
        outcome = outcome.label(),
        "Resolved lookup"
    );
    metrics::counter!(RESOLVE_OUTCOMES, &[("outcome", outcome.label())]).increment(1);
    metrics::histogram!(RESOLVE_DURATION).record(start.elapsed().as_millis() as f64);

    Ok(outcome)
}

/// Every key field on which at least one candidate disagrees with `first`.
/// The station reference is not a key field and is never reported.
/// Walking the fields in the outer loop keeps the declaration order and
/// yields each name once.
pub fn differing_fields(first: &CitizenKey, rest: &[CitizenKey]) -> Vec<KeyField> {
    KeyField::UNIQUE
        .into_iter()
        .filter(|field| {
            rest.iter()
                .any(|candidate| candidate.get(*field) != first.get(*field))
        })
        .collect()
}
