//! Declarative description of the citizen key.
//!
//! A [`KeySchema`] is built once at startup and shared read-only between the
//! ingestion pipeline and the resolver. The same field specs drive both
//! directions: `build_key` for rows coming out of the extract and
//! `filter_for` for partial data coming from callers.

use std::str::FromStr;

use thiserror::Error;

use crate::normalize::{
    normalize_case, pad_day, split_date, truncate, DatePart, NormalizeError, Truncation,
};
use crate::types::{CitizenKey, KeyField, KeyFilter, LookupQuery, PersonalRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing required field {0}")]
    MissingRequiredField(KeyField),
    #[error("invalid value for {field}: {source}")]
    Invalid {
        field: KeyField,
        #[source]
        source: NormalizeError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("the first field must be the primary citizen_id field")]
    MissingPrimary,
    #[error("only citizen_id can be the primary field, got {0}")]
    InvalidPrimary(KeyField),
    #[error("field {0} appears more than once")]
    DuplicateField(KeyField),
    #[error("the station reference cannot be part of the key")]
    StationInKey,
    #[error("field {0} is folded into the opaque key and must be required")]
    OptionalOpaqueField(KeyField),
    #[error("invalid truncation for {0}: {1}")]
    InvalidTruncation(KeyField, NormalizeError),
    #[error("document width must be 0 or at least 3 characters, got {0}")]
    DocumentTooNarrow(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePolicy {
    Upper,
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The document-id-derived field every lookup must supply.
    Primary,
    /// Stored in its own column and usable as an optional filter.
    Column,
    /// Folded into the primary key string next to the document id.
    Opaque,
}

/// Where optional fields go when a schema is built from [`SchemaOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    Columns,
    Opaque,
}

impl FromStr for KeyLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "columns" => Ok(KeyLayout::Columns),
            "opaque" => Ok(KeyLayout::Opaque),
            _ => Err(format!("Unknown key layout: {s}, must be COLUMNS or OPAQUE")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: KeyField,
    pub case: CasePolicy,
    pub truncation: Option<Truncation>,
    pub required: bool,
    pub placement: Placement,
}

impl FieldSpec {
    pub fn primary() -> Self {
        Self::new(KeyField::CitizenId, Placement::Primary)
    }

    pub fn column(field: KeyField) -> Self {
        Self::new(field, Placement::Column)
    }

    /// Opaque components are always required: a caller could never supply
    /// "nothing" for a fragment of the primary key string.
    pub fn opaque(field: KeyField) -> Self {
        Self {
            required: true,
            ..Self::new(field, Placement::Opaque)
        }
    }

    fn new(field: KeyField, placement: Placement) -> Self {
        let case = match field {
            KeyField::CitizenId
            | KeyField::GivenName
            | KeyField::Surname1
            | KeyField::Surname2 => CasePolicy::Upper,
            _ => CasePolicy::Preserve,
        };
        let required = matches!(field, KeyField::CitizenId | KeyField::Day | KeyField::Year);

        Self {
            field,
            case,
            truncation: None,
            required,
            placement,
        }
    }

    pub fn truncated(mut self, truncation: Truncation) -> Self {
        self.truncation = Some(truncation);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    fn source<'a>(&self, record: &'a PersonalRecord) -> &'a str {
        match self.field {
            KeyField::CitizenId => &record.document_id,
            KeyField::Day | KeyField::Year => &record.birth_date,
            KeyField::GivenName => &record.given_name,
            KeyField::Surname1 => &record.surname1,
            KeyField::Surname2 => &record.surname2,
            KeyField::PostCode => &record.post_code,
            KeyField::Station => &record.station_id,
        }
    }

    /// Normalizes a value for storage. `raw` is the full source attribute,
    /// so date fields get the whole birth date here.
    fn derive(&self, raw: &str) -> Result<String, NormalizationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return match self.required {
                true => Err(NormalizationError::MissingRequiredField(self.field)),
                false => Ok(String::new()),
            };
        }

        let value = match self.field {
            KeyField::Day => split_date(raw, DatePart::Day),
            KeyField::Year => split_date(raw, DatePart::Year),
            _ => Ok(raw.to_string()),
        }
        .map_err(|source| self.invalid(source))?;

        self.shape(value)
    }

    /// Normalizes a caller-supplied value. Date fields arrive as parts here,
    /// not as full dates.
    fn derive_query(&self, raw: &str) -> Result<String, NormalizationError> {
        let value = match self.field {
            KeyField::Day => split_date(&pad_day(raw), DatePart::Day),
            KeyField::Year => split_date(raw, DatePart::Year),
            _ => Ok(raw.trim().to_string()),
        }
        .map_err(|source| self.invalid(source))?;

        self.shape(value)
    }

    fn shape(&self, value: String) -> Result<String, NormalizationError> {
        let value = match self.case {
            CasePolicy::Upper => normalize_case(&value),
            CasePolicy::Preserve => value,
        };

        match self.truncation {
            Some(policy) => truncate(&value, policy).map_err(|source| self.invalid(source)),
            None => Ok(value),
        }
    }

    fn invalid(&self, source: NormalizeError) -> NormalizationError {
        NormalizationError::Invalid {
            field: self.field,
            source,
        }
    }
}

/// Values consumed from configuration to build the process-wide schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOptions {
    /// 0 keeps the whole document id.
    pub document_chars: usize,
    pub document_from_start: bool,
    pub document_keep_letter: bool,
    pub name_chars: usize,
    pub day: bool,
    pub year: bool,
    pub given_name: bool,
    pub surname1: bool,
    pub surname2: bool,
    pub post_code: bool,
    pub layout: KeyLayout,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            document_chars: 0,
            document_from_start: false,
            document_keep_letter: false,
            name_chars: 2,
            day: false,
            year: false,
            given_name: false,
            surname1: false,
            surname2: false,
            post_code: false,
            layout: KeyLayout::Columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    fields: Vec<FieldSpec>,
}

impl KeySchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        match fields.first() {
            None => return Err(SchemaError::MissingPrimary),
            Some(first) if first.placement != Placement::Primary => {
                return Err(SchemaError::MissingPrimary)
            }
            Some(_) => {}
        }

        let mut seen = Vec::with_capacity(fields.len());
        for spec in &fields {
            if spec.field == KeyField::Station {
                return Err(SchemaError::StationInKey);
            }
            if spec.placement == Placement::Primary && spec.field != KeyField::CitizenId {
                return Err(SchemaError::InvalidPrimary(spec.field));
            }
            if spec.placement != Placement::Primary && spec.field == KeyField::CitizenId {
                return Err(SchemaError::DuplicateField(spec.field));
            }
            if spec.placement == Placement::Opaque && !spec.required {
                return Err(SchemaError::OptionalOpaqueField(spec.field));
            }
            if let Some(truncation) = spec.truncation {
                truncation
                    .validate()
                    .map_err(|e| SchemaError::InvalidTruncation(spec.field, e))?;
            }
            if seen.contains(&spec.field) {
                return Err(SchemaError::DuplicateField(spec.field));
            }
            seen.push(spec.field);
        }

        Ok(Self { fields })
    }

    pub fn from_options(options: &SchemaOptions) -> Result<Self, SchemaError> {
        let truncation = match (
            options.document_chars,
            options.document_from_start,
            options.document_keep_letter,
        ) {
            (0, _, _) => None,
            (n @ 1..=2, _, _) => return Err(SchemaError::DocumentTooNarrow(n)),
            (n, true, false) => Some(Truncation::KeepFirst(n)),
            (n, true, true) => Some(Truncation::KeepFirstPlusLastChar(n)),
            (n, false, false) => Some(Truncation::KeepLast(n)),
            (n, false, true) => Some(Truncation::KeepLastPlusLastChar(n)),
        };
        let mut primary = FieldSpec::primary();
        primary.truncation = truncation;

        let optional = [
            (KeyField::Day, options.day),
            (KeyField::Year, options.year),
            (KeyField::GivenName, options.given_name),
            (KeyField::Surname1, options.surname1),
            (KeyField::Surname2, options.surname2),
            (KeyField::PostCode, options.post_code),
        ];

        let mut fields = vec![primary];
        for (field, enabled) in optional {
            if !enabled {
                continue;
            }
            let mut spec = match options.layout {
                KeyLayout::Columns => FieldSpec::column(field),
                KeyLayout::Opaque => FieldSpec::opaque(field),
            };
            if matches!(
                field,
                KeyField::GivenName | KeyField::Surname1 | KeyField::Surname2
            ) {
                spec = spec.truncated(Truncation::KeepFirst(options.name_chars));
            }
            fields.push(spec);
        }

        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn has_opaque(&self) -> bool {
        self.fields
            .iter()
            .any(|spec| spec.placement == Placement::Opaque)
    }

    /// Fields stored in their own column, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = KeyField> + '_ {
        self.fields
            .iter()
            .filter(|spec| spec.placement == Placement::Column)
            .map(|spec| spec.field)
    }

    pub fn build_key(&self, record: &PersonalRecord) -> Result<CitizenKey, NormalizationError> {
        let mut key = CitizenKey {
            station: record.station_id.trim().to_string(),
            ..Default::default()
        };
        let mut primary = Vec::new();

        for spec in &self.fields {
            let value = spec.derive(spec.source(record))?;
            match spec.placement {
                Placement::Primary | Placement::Opaque => primary.push(value),
                Placement::Column => key.set(spec.field, value),
            }
        }

        key.citizen_id = self.encode_primary(primary);
        Ok(key)
    }

    /// Re-derives the stored representation of whatever the caller supplied.
    /// Unset column fields stay out of the filter; values for fields that
    /// are not part of this schema are ignored.
    pub fn filter_for(&self, query: &LookupQuery) -> Result<KeyFilter, NormalizationError> {
        let mut primary = Vec::new();
        let mut columns = Vec::new();

        for spec in &self.fields {
            match (spec.placement, query.value(spec.field)) {
                (Placement::Primary | Placement::Opaque, Some(raw)) => {
                    primary.push(spec.derive_query(raw)?)
                }
                (Placement::Primary | Placement::Opaque, None) => {
                    return Err(NormalizationError::MissingRequiredField(spec.field))
                }
                (Placement::Column, Some(raw)) => {
                    columns.push((spec.field, spec.derive_query(raw)?))
                }
                (Placement::Column, None) => {}
            }
        }

        let mut filter = KeyFilter::new(self.encode_primary(primary));
        for (field, value) in columns {
            filter.insert(field, value);
        }
        if let Some(station) = query.value(KeyField::Station) {
            filter.insert(KeyField::Station, station.trim());
        }

        Ok(filter)
    }

    /// Length-tagged concatenation, so that differently split inputs can
    /// never encode to the same key.
    fn encode_primary(&self, components: Vec<String>) -> String {
        if !self.has_opaque() {
            return components.into_iter().next().unwrap_or_default();
        }

        components
            .iter()
            .map(|c| format!("{}:{}", c.chars().count(), c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(document_id: &str, birth_date: &str) -> PersonalRecord {
        PersonalRecord {
            document_id: document_id.to_string(),
            birth_date: birth_date.to_string(),
            given_name: "Juana".to_string(),
            surname1: "Núñez".to_string(),
            surname2: "Pérez".to_string(),
            post_code: "28001".to_string(),
            station_id: "COLEGIO 1".to_string(),
        }
    }

    fn full_options() -> SchemaOptions {
        SchemaOptions {
            document_chars: 4,
            document_keep_letter: true,
            day: true,
            year: true,
            given_name: true,
            surname1: true,
            surname2: true,
            post_code: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_key_with_all_columns() {
        let schema = KeySchema::from_options(&full_options()).unwrap();
        let key = schema.build_key(&record("12345678z", "010190")).unwrap();

        assert_eq!(
            key,
            CitizenKey {
                citizen_id: "5678Z".to_string(),
                day: "01".to_string(),
                year: "90".to_string(),
                given_name: "JU".to_string(),
                surname1: "NÚ".to_string(),
                surname2: "PÉ".to_string(),
                post_code: "28001".to_string(),
                station: "COLEGIO 1".to_string(),
            }
        );
    }

    #[test]
    fn test_build_key_is_deterministic() {
        let schema = KeySchema::from_options(&full_options()).unwrap();
        let row = record("12345678Z", "311299");
        assert_eq!(schema.build_key(&row), schema.build_key(&row));
    }

    #[test]
    fn test_fields_outside_schema_are_empty() {
        let options = SchemaOptions {
            day: true,
            year: true,
            ..Default::default()
        };
        let schema = KeySchema::from_options(&options).unwrap();
        let key = schema.build_key(&record("12345678Z", "010190")).unwrap();

        assert_eq!(key.citizen_id, "12345678Z");
        assert_eq!(key.day, "01");
        assert_eq!(key.year, "90");
        assert_eq!(key.given_name, "");
        assert_eq!(key.post_code, "");
    }

    #[test]
    fn test_missing_document_is_rejected() {
        let schema = KeySchema::from_options(&SchemaOptions::default()).unwrap();
        assert_eq!(
            schema.build_key(&record("  ", "010190")),
            Err(NormalizationError::MissingRequiredField(KeyField::CitizenId))
        );
    }

    #[test]
    fn test_malformed_birth_date_is_rejected() {
        let options = SchemaOptions {
            day: true,
            ..Default::default()
        };
        let schema = KeySchema::from_options(&options).unwrap();
        assert_eq!(
            schema.build_key(&record("12345678Z", "7")),
            Err(NormalizationError::Invalid {
                field: KeyField::Day,
                source: NormalizeError::MalformedDate,
            })
        );
    }

    #[test]
    fn test_optional_name_may_be_empty() {
        let schema = KeySchema::from_options(&full_options()).unwrap();
        let mut row = record("12345678Z", "010190");
        row.surname2 = String::new();

        let key = schema.build_key(&row).unwrap();
        assert_eq!(key.surname2, "");
    }

    #[test]
    fn test_opaque_layout_encodes_with_length_tags() {
        let options = SchemaOptions {
            day: true,
            given_name: true,
            layout: KeyLayout::Opaque,
            ..full_options_without_columns()
        };
        let schema = KeySchema::from_options(&options).unwrap();
        let key = schema.build_key(&record("12345678Z", "010190")).unwrap();

        assert_eq!(key.citizen_id, "5:5678Z2:012:JU");
        assert_eq!(key.day, "");
        assert_eq!(key.given_name, "");
        assert_eq!(schema.columns().count(), 0);
    }

    fn full_options_without_columns() -> SchemaOptions {
        SchemaOptions {
            document_chars: 4,
            document_keep_letter: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_opaque_encoding_does_not_collide_on_split_points() {
        let schema = KeySchema::new(vec![
            FieldSpec::primary(),
            FieldSpec::opaque(KeyField::GivenName),
        ])
        .unwrap();

        let mut a = record("AB", "");
        a.given_name = "1".to_string();
        let mut b = record("A", "");
        b.given_name = "B1".to_string();

        let a = schema.build_key(&a).unwrap();
        let b = schema.build_key(&b).unwrap();
        assert_ne!(a.citizen_id, b.citizen_id);
    }

    #[test]
    fn test_filter_contains_only_supplied_fields() {
        let schema = KeySchema::from_options(&full_options()).unwrap();
        let query = LookupQuery::new("5678z")
            .with(KeyField::Day, "1")
            .with(KeyField::Surname1, "núñez")
            .with(KeyField::Year, "");

        let filter = schema.filter_for(&query).unwrap();
        assert_eq!(
            filter,
            KeyFilter::new("5678Z")
                .with(KeyField::Day, "01")
                .with(KeyField::Surname1, "NÚ")
        );
    }

    #[test]
    fn test_filter_rederives_full_inputs() {
        let schema = KeySchema::from_options(&full_options()).unwrap();
        let row = record("12345678Z", "010190");
        let key = schema.build_key(&row).unwrap();

        let query = LookupQuery::new(row.document_id)
            .with(KeyField::Day, "01")
            .with(KeyField::Year, "1990")
            .with(KeyField::GivenName, row.given_name);
        let filter = schema.filter_for(&query).unwrap();

        assert!(filter.matches(&key));
    }

    #[test]
    fn test_filter_ignores_fields_outside_schema() {
        let schema = KeySchema::from_options(&SchemaOptions::default()).unwrap();
        let query = LookupQuery::new("12345678Z").with(KeyField::GivenName, "JU");

        assert_eq!(schema.filter_for(&query).unwrap(), KeyFilter::new("12345678Z"));
    }

    #[test]
    fn test_filter_keeps_station_reference() {
        let schema = KeySchema::from_options(&SchemaOptions::default()).unwrap();
        let query = LookupQuery::new("12345678Z").with(KeyField::Station, " COLEGIO 1 ");

        assert_eq!(
            schema.filter_for(&query).unwrap(),
            KeyFilter::new("12345678Z").with(KeyField::Station, "COLEGIO 1")
        );
    }

    #[test]
    fn test_opaque_filter_requires_every_component() {
        let options = SchemaOptions {
            day: true,
            layout: KeyLayout::Opaque,
            ..Default::default()
        };
        let schema = KeySchema::from_options(&options).unwrap();

        assert_eq!(
            schema.filter_for(&LookupQuery::new("12345678Z")),
            Err(NormalizationError::MissingRequiredField(KeyField::Day))
        );
        assert_eq!(
            schema
                .filter_for(&LookupQuery::new("12345678Z").with(KeyField::Day, "3"))
                .unwrap(),
            KeyFilter::new("9:12345678Z2:03")
        );
    }

    #[test]
    fn test_schema_validation() {
        assert_eq!(KeySchema::new(vec![]), Err(SchemaError::MissingPrimary));
        assert_eq!(
            KeySchema::new(vec![FieldSpec::column(KeyField::Day)]),
            Err(SchemaError::MissingPrimary)
        );
        assert_eq!(
            KeySchema::new(vec![
                FieldSpec::primary(),
                FieldSpec::column(KeyField::Day),
                FieldSpec::opaque(KeyField::Day),
            ]),
            Err(SchemaError::DuplicateField(KeyField::Day))
        );
        assert_eq!(
            KeySchema::new(vec![
                FieldSpec::primary(),
                FieldSpec::column(KeyField::Station)
            ]),
            Err(SchemaError::StationInKey)
        );
        assert_eq!(
            KeySchema::new(vec![
                FieldSpec::primary(),
                FieldSpec::opaque(KeyField::PostCode).required(false)
            ]),
            Err(SchemaError::OptionalOpaqueField(KeyField::PostCode))
        );
        assert_eq!(
            KeySchema::new(vec![
                FieldSpec::primary(),
                FieldSpec::column(KeyField::GivenName).truncated(Truncation::KeepFirst(0))
            ]),
            Err(SchemaError::InvalidTruncation(
                KeyField::GivenName,
                NormalizeError::InvalidPolicy(0)
            ))
        );
    }

    #[test]
    fn test_document_width_must_be_zero_or_three_plus() {
        for chars in [1, 2] {
            let options = SchemaOptions {
                document_chars: chars,
                ..Default::default()
            };
            assert_eq!(
                KeySchema::from_options(&options),
                Err(SchemaError::DocumentTooNarrow(chars))
            );
        }
    }

    #[test]
    fn test_key_layout_from_str() {
        assert_eq!("OPAQUE".parse::<KeyLayout>().unwrap(), KeyLayout::Opaque);
        assert_eq!("columns".parse::<KeyLayout>().unwrap(), KeyLayout::Columns);
        assert!("mixed".parse::<KeyLayout>().is_err());
    }
}
