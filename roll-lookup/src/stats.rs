//! How well each key combination tells citizens apart, computed once after
//! an import so operators can judge the configured truncation.

use std::fmt;

use tracing::info;

use crate::metrics_consts::UNIQUE_KEY_RATIO;
use crate::schema::KeySchema;
use crate::store::{RecordStore, StoreResult};
use crate::types::KeyField;

#[derive(Debug, Clone, PartialEq)]
pub struct UniquenessLine {
    pub fields: Vec<KeyField>,
    /// Distinct combinations over stored rows, as a percentage.
    pub percent: f64,
}

impl UniquenessLine {
    pub fn label(&self) -> String {
        self.fields
            .iter()
            .map(|field| field.column())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for UniquenessLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {:.2}%", self.label(), self.percent)
    }
}

/// `citizen_id` alone, then `citizen_id` with each column field, sorted by
/// descending uniqueness. Empty when nothing is stored.
pub async fn uniqueness_report(
    store: &dyn RecordStore,
    schema: &KeySchema,
) -> StoreResult<Vec<UniquenessLine>> {
    let total = store.count_keys().await?;
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut combinations = vec![vec![KeyField::CitizenId]];
    combinations.extend(
        schema
            .columns()
            .map(|field| vec![KeyField::CitizenId, field]),
    );

    let mut lines = Vec::with_capacity(combinations.len());
    for fields in combinations {
        let distinct = store.count_distinct(&fields).await?;
        lines.push(UniquenessLine {
            fields,
            percent: distinct as f64 * 100.0 / total as f64,
        });
    }

    lines.sort_by(|a, b| b.percent.total_cmp(&a.percent));
    Ok(lines)
}

pub fn log_report(lines: &[UniquenessLine]) {
    for line in lines {
        metrics::gauge!(UNIQUE_KEY_RATIO, &[("fields", line.label())]).set(line.percent);
        info!("{line}");
    }
}
