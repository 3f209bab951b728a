pub const ROWS_READ: &str = "roll_lookup_rows_read";
pub const ROWS_IMPORTED: &str = "roll_lookup_rows_imported";
pub const ROWS_SKIPPED: &str = "roll_lookup_rows_skipped";
pub const INGEST_DURATION: &str = "roll_lookup_ingest_duration_ms";
pub const RESOLVE_OUTCOMES: &str = "roll_lookup_resolve_outcomes";
pub const RESOLVE_DURATION: &str = "roll_lookup_resolve_duration_ms";
pub const UNIQUE_KEY_RATIO: &str = "roll_lookup_unique_key_ratio";
